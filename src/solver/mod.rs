//! # Systematic correction solver
//!
//! Least-squares fit of one correction function per track so that the crossover errors
//! between tracks are minimized.
//!
//! Model
//! -----------------
//! A correction is a sum of basis functions `C(p) = Σ a_r f_r`. For a crossover `k` between
//! tracks `i` and `j`, the adjusted error is `e_k = coe_k + C_j(k) - C_i(k)` and the solver
//! minimizes `Σ w_k² e_k²`. The available models are listed in [`CorrectionModel`].
//!
//! Models carrying a constant offset only fix the corrections up to one level per group of
//! tracks that cross each other (a *cluster*, see [`clusters`]). One Lagrange multiplier per
//! cluster forces the offsets of its tracks to sum to zero.
//!
//! Pipeline
//! -----------------
//! 1. [`records`] – Model-specific crossover records, read from the solver table.
//! 2. [`clusters`] – Connectivity of the tracks.
//! 3. [`normal_equations`] – Normal matrix assembly, solve and statistics.
//! 4. [`gauss_jordan`] – Dense linear solve with partial pivoting.
//!
//! Example
//! -----------------
//! ```rust, no_run
//! use xoverdb::solver::{records::read_solver_table_file, solve, CorrectionModel, SolveParams};
//! use camino::Utf8Path;
//!
//! let params = SolveParams::builder()
//!     .model(CorrectionModel::DistanceDrift)
//!     .use_weights(true)
//!     .build()?;
//! let input = read_solver_table_file(Utf8Path::new("faa.coe"), "MGD77", "faa", &params)?;
//! let table = solve(&input, &params)?;
//! table.write(std::io::stdout())?;
//! # Ok::<(), xoverdb::xover_errors::XoverError>(())
//! ```

pub mod clusters;
pub mod gauss_jordan;
pub mod normal_equations;
pub mod records;

use std::fmt;

use crate::{constants::RADEG, xover_errors::XoverError};

pub use normal_equations::{solve, CorrectionTable, SolveStats, SolveSummary, TrackCorrection};
pub use records::{RecordTerms, SolverInput, SolverRecord};

/// Family of basis functions fitted to every track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrectionModel {
    /// `c`
    #[default]
    Constant,
    /// `c + s·d`, with `d` the distance along track
    DistanceDrift,
    /// `c + s·(t - T)`, with `T` the start time of the track
    TimeDrift,
    /// `c + s·sin²(lat)`
    Latitude,
    /// `c + a·cos h + b·cos 2h + d·sin h + e·sin 2h`, with `h` the heading
    Heading,
    /// `s·z`, a pure scale on the observed value
    Scale,
    /// `c + s·z`
    ScaleOffset,
}

impl CorrectionModel {
    /// Number of coefficients fitted per track.
    pub fn n_par(&self) -> usize {
        match self {
            CorrectionModel::Constant | CorrectionModel::Scale => 1,
            CorrectionModel::DistanceDrift
            | CorrectionModel::TimeDrift
            | CorrectionModel::Latitude
            | CorrectionModel::ScaleOffset => 2,
            CorrectionModel::Heading => 5,
        }
    }

    /// True when the first coefficient is an additive offset.
    pub fn has_offset(&self) -> bool {
        !matches!(self, CorrectionModel::Scale)
    }

    /// Drift models whose variable is normalized to `[0, 1]` before the solve.
    pub fn is_drift(&self) -> bool {
        matches!(
            self,
            CorrectionModel::DistanceDrift | CorrectionModel::TimeDrift
        )
    }

    /// Single-letter code: `c d t g h s S`.
    pub fn code(&self) -> char {
        match self {
            CorrectionModel::Constant => 'c',
            CorrectionModel::DistanceDrift => 'd',
            CorrectionModel::TimeDrift => 't',
            CorrectionModel::Latitude => 'g',
            CorrectionModel::Heading => 'h',
            CorrectionModel::Scale => 's',
            CorrectionModel::ScaleOffset => 'S',
        }
    }

    pub fn from_code(code: char) -> Result<Self, XoverError> {
        match code {
            'c' => Ok(CorrectionModel::Constant),
            'd' => Ok(CorrectionModel::DistanceDrift),
            't' => Ok(CorrectionModel::TimeDrift),
            'g' => Ok(CorrectionModel::Latitude),
            'h' => Ok(CorrectionModel::Heading),
            's' => Ok(CorrectionModel::Scale),
            'S' => Ok(CorrectionModel::ScaleOffset),
            other => Err(XoverError::InvalidParameter(format!(
                "unknown correction model '{other}'"
            ))),
        }
    }

    /// Value of basis function `r` for one side of a crossover record.
    ///
    /// Arguments
    /// -----------------
    /// * `terms` – The model-specific values of the record.
    /// * `r` – Index of the basis function, `< n_par`.
    /// * `side` – 0 for track one, 1 for track two.
    ///
    /// Return
    /// ----------
    /// * `f_r(side)`, or `NaN` if `terms` does not belong to this model.
    pub fn basis(&self, terms: &RecordTerms, r: usize, side: usize) -> f64 {
        match (self, terms) {
            (CorrectionModel::Constant, RecordTerms::Constant) => 1.0,
            (
                CorrectionModel::DistanceDrift | CorrectionModel::TimeDrift,
                RecordTerms::Drift(x),
            ) => {
                if r == 0 {
                    1.0
                } else {
                    x[side]
                }
            }
            (CorrectionModel::Latitude, RecordTerms::Latitude(lat)) => {
                if r == 0 {
                    1.0
                } else {
                    (lat * RADEG).sin().powi(2)
                }
            }
            (CorrectionModel::Heading, RecordTerms::Heading(h)) => {
                let h = h[side] * RADEG;
                match r {
                    0 => 1.0,
                    1 => h.cos(),
                    2 => (2.0 * h).cos(),
                    3 => h.sin(),
                    _ => (2.0 * h).sin(),
                }
            }
            (CorrectionModel::Scale, RecordTerms::Scale(z)) => z[side],
            (CorrectionModel::ScaleOffset, RecordTerms::Scale(z)) => {
                if r == 0 {
                    1.0
                } else {
                    z[side]
                }
            }
            _ => f64::NAN,
        }
    }

    /// True when `terms` carries the values this model needs.
    pub fn accepts(&self, terms: &RecordTerms) -> bool {
        matches!(
            (self, terms),
            (CorrectionModel::Constant, RecordTerms::Constant)
                | (
                    CorrectionModel::DistanceDrift | CorrectionModel::TimeDrift,
                    RecordTerms::Drift(_)
                )
                | (CorrectionModel::Latitude, RecordTerms::Latitude(_))
                | (CorrectionModel::Heading, RecordTerms::Heading(_))
                | (
                    CorrectionModel::Scale | CorrectionModel::ScaleOffset,
                    RecordTerms::Scale(_)
                )
        )
    }
}

impl fmt::Display for CorrectionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CorrectionModel::Constant => "constant offset",
            CorrectionModel::DistanceDrift => "offset and drift in distance",
            CorrectionModel::TimeDrift => "offset and drift in time",
            CorrectionModel::Latitude => "offset and sin²(latitude) trend",
            CorrectionModel::Heading => "offset and heading harmonics",
            CorrectionModel::Scale => "scale",
            CorrectionModel::ScaleOffset => "offset and scale",
        };
        write!(f, "{name}")
    }
}

/// Options of [`solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolveParams {
    pub model: CorrectionModel,
    /// Use the weight column of the solver table (otherwise every crossover weighs 1)
    pub use_weights: bool,
    /// Report plain instead of weighted statistics
    pub unweighted_stats: bool,
}

impl Default for SolveParams {
    fn default() -> Self {
        SolveParams {
            model: CorrectionModel::Constant,
            use_weights: false,
            unweighted_stats: false,
        }
    }
}

impl SolveParams {
    pub fn builder() -> SolveParamsBuilder {
        SolveParamsBuilder {
            params: SolveParams::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveParamsBuilder {
    params: SolveParams,
}

impl SolveParamsBuilder {
    pub fn model(mut self, v: CorrectionModel) -> Self {
        self.params.model = v;
        self
    }

    pub fn use_weights(mut self, v: bool) -> Self {
        self.params.use_weights = v;
        self
    }

    pub fn unweighted_stats(mut self, v: bool) -> Self {
        self.params.unweighted_stats = v;
        self
    }

    pub fn build(self) -> Result<SolveParams, XoverError> {
        Ok(self.params)
    }
}
