//! # Gauss-Jordan elimination
//!
//! Dense solve of `N·a = b` with partial (row) pivoting. The normal matrices built by the
//! solver carry zero diagonals on their Lagrange rows, so pivoting is required.

use nalgebra::{DMatrix, DVector};

use crate::{constants::PIVOT_EPS, xover_errors::XoverError};

/// Solve the square system `matrix · x = rhs`.
///
/// Arguments
/// -----------------
/// * `matrix` – `m × m` system matrix, consumed as workspace.
/// * `rhs` – Right-hand side of length `m`, consumed and returned as the solution.
///
/// Return
/// ----------
/// * The solution vector.
/// * [`XoverError::SingularMatrix`] with the column where the largest available pivot fell
///   below [`PIVOT_EPS`] (relative to the largest entry of the matrix).
/// * [`XoverError::InvalidParameter`] if the shapes do not match.
pub fn gauss_jordan(
    mut matrix: DMatrix<f64>,
    mut rhs: DVector<f64>,
) -> Result<DVector<f64>, XoverError> {
    let m = matrix.nrows();
    if matrix.ncols() != m || rhs.len() != m {
        return Err(XoverError::InvalidParameter(format!(
            "cannot solve a {}x{} system with a right-hand side of length {}",
            m,
            matrix.ncols(),
            rhs.len()
        )));
    }
    let scale = matrix.amax().max(1.0);

    for col in 0..m {
        let (offset, pivot) = matrix
            .view((col, col), (m - col, 1))
            .iter()
            .enumerate()
            .fold((0, 0.0_f64), |best, (k, &v)| {
                if v.abs() > best.1.abs() {
                    (k, v)
                } else {
                    best
                }
            });
        if !(pivot.abs() > PIVOT_EPS * scale) {
            return Err(XoverError::SingularMatrix { column: col, pivot });
        }
        let pivot_row = col + offset;
        if pivot_row != col {
            matrix.swap_rows(col, pivot_row);
            rhs.swap_rows(col, pivot_row);
        }

        let inv = 1.0 / pivot;
        matrix.row_mut(col).scale_mut(inv);
        rhs[col] *= inv;
        let pivot_rhs = rhs[col];

        for row in 0..m {
            if row == col {
                continue;
            }
            let factor = matrix[(row, col)];
            if factor == 0.0 {
                continue;
            }
            for k in col..m {
                let v = matrix[(col, k)];
                matrix[(row, k)] -= factor * v;
            }
            rhs[row] -= factor * pivot_rhs;
        }
    }
    Ok(rhs)
}
