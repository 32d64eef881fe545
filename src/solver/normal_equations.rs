//! # Normal equations and correction table
//!
//! Builds `N·a = b` directly from the crossover records (the design matrix is never formed),
//! solves it and reports the corrections.
//!
//! Unknowns
//! -----------------
//! Track `p` gets `R(p) = min(n_par, crossings(p))` coefficients; its block starts at column
//! `col_off(p) = Σ_{q<p} R(q)`. Models with an offset append one Lagrange multiplier per cluster,
//! for `m = Σ R + n_clusters` unknowns in total.
//!
//! Rows
//! -----------------
//! For the row of parameter `s` of track `p` and every crossover `k` between `i` and `j` that
//! involves `p` (`sgn = +1`, side `t = 0` when `p = i`, else `sgn = -1`, `t = 1`):
//!
//! ```text
//! N[row, col_off(i) + r] += sgn·w²·f_r(0)·f_s(t)
//! N[row, col_off(j) + r] -= sgn·w²·f_r(1)·f_s(t)
//! b[row]                 += sgn·w²·coe·f_s(t)
//! ```
//!
//! Both terms are added when `i = j`, so a track crossing itself only constrains the parts of
//! its correction that differ between the two passes.
//!
//! The offset row of every track carries a `1` in its cluster's multiplier column and the
//! multiplier row carries a `1` at each member's offset, which keeps `N` symmetric.

use std::{fmt, io::Write};

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use tracing::{info, warn};

use super::{
    clusters::{adjacency, find_clusters, Clusters},
    gauss_jordan::gauss_jordan,
    records::{RecordTerms, SolverInput, SolverRecord},
    CorrectionModel, SolveParams,
};
use crate::{format::fmt_g, xover_errors::XoverError};

/// Number and position of the coefficients of every track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterLayout {
    counts: Vec<usize>,
    col_off: Vec<usize>,
    n_unknowns: usize,
}

impl ParameterLayout {
    /// Layout for `input` under `model`, warning about every track that cannot get all
    /// `n_par` coefficients.
    pub fn new(input: &SolverInput, model: CorrectionModel) -> Self {
        let n_par = model.n_par();
        let crossings = input.crossings_per_track();
        let mut counts = Vec::with_capacity(crossings.len());
        let mut col_off = Vec::with_capacity(crossings.len());
        let mut n_unknowns = 0;

        for (p, &n_x) in crossings.iter().enumerate() {
            if n_x < n_par {
                warn!(
                    "Track {} only has {n_x} crossings so can only solve for {n_x} of the {n_par} parameters",
                    input.tracks[p]
                );
            }
            let r = n_x.min(n_par);
            col_off.push(n_unknowns);
            counts.push(r);
            n_unknowns += r;
        }
        ParameterLayout {
            counts,
            col_off,
            n_unknowns,
        }
    }

    /// `R(track)`
    pub fn count(&self, track: usize) -> usize {
        self.counts[track]
    }

    /// First column of `track`'s coefficients.
    pub fn offset(&self, track: usize) -> usize {
        self.col_off[track]
    }

    pub fn n_unknowns(&self) -> usize {
        self.n_unknowns
    }

    /// Correction of `track` on one side of a record, from a solution vector.
    fn correction(
        &self,
        model: CorrectionModel,
        solution: &DVector<f64>,
        track: usize,
        terms: &RecordTerms,
        side: usize,
    ) -> f64 {
        let off = self.col_off[track];
        (0..self.counts[track])
            .map(|r| solution[off + r] * model.basis(terms, r, side))
            .sum()
    }
}

/// Square system `matrix · a = rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    pub matrix: DMatrix<f64>,
    pub rhs: DVector<f64>,
}

/// Assemble the normal equations.
///
/// Arguments
/// -----------------
/// * `model` – Basis functions of the fit.
/// * `records` – Crossovers, drift variables already normalized.
/// * `layout` – Coefficient layout, see [`ParameterLayout`].
/// * `clusters` – Track clusters when the model has an offset, `None` otherwise.
pub fn assemble(
    model: CorrectionModel,
    records: &[SolverRecord],
    layout: &ParameterLayout,
    clusters: Option<&Clusters>,
) -> NormalEquations {
    let n = layout.n_unknowns();
    let m = n + clusters.map_or(0, Clusters::n_clusters);
    let mut matrix = DMatrix::<f64>::zeros(m, m);
    let mut rhs = DVector::<f64>::zeros(m);

    for rec in records {
        let [i, j] = rec.tracks;
        let w2 = rec.weight * rec.weight;
        // For an internal crossover both sides belong to the same track and both rows apply
        for (p, sgn, t) in [(i, 1.0, 0), (j, -1.0, 1)] {
            let sw2 = sgn * w2;
            for s in 0..layout.count(p) {
                let row = layout.offset(p) + s;
                let f_s = model.basis(&rec.terms, s, t);
                for r in 0..layout.count(i) {
                    matrix[(row, layout.offset(i) + r)] +=
                        sw2 * model.basis(&rec.terms, r, 0) * f_s;
                }
                for r in 0..layout.count(j) {
                    matrix[(row, layout.offset(j) + r)] -=
                        sw2 * model.basis(&rec.terms, r, 1) * f_s;
                }
                rhs[row] += sw2 * rec.coe * f_s;
            }
        }
    }

    if let Some(clusters) = clusters {
        for p in 0..layout.counts.len() {
            if layout.count(p) == 0 {
                continue;
            }
            let offset_col = layout.offset(p);
            let lagrange = n + clusters.cluster_of(p);
            matrix[(offset_col, lagrange)] = 1.0;
            matrix[(lagrange, offset_col)] = 1.0;
        }
    }
    NormalEquations { matrix, rhs }
}

// -------------------------------------------------------------------------------------------------
// Statistics
// -------------------------------------------------------------------------------------------------

/// Mean, standard deviation and rms of crossover errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveStats {
    pub n: usize,
    pub mean: f64,
    pub stdev: f64,
    pub rms: f64,
}

impl SolveStats {
    /// Statistics of `(error, weight)` pairs; weights are replaced by 1 when `unweighted`.
    pub fn from_weighted(values: impl IntoIterator<Item = (f64, f64)>, unweighted: bool) -> Self {
        let (mut n, mut sw, mut sx, mut sxx) = (0usize, 0.0, 0.0, 0.0);
        for (e, w) in values {
            let w = if unweighted { 1.0 } else { w };
            n += 1;
            sw += w;
            sx += w * e;
            sxx += w * e * e;
        }
        let nf = n as f64;
        SolveStats {
            n,
            mean: sx / sw,
            stdev: ((nf * sxx - sx * sx) / (sw * sw * (nf - 1.0) / nf)).sqrt(),
            rms: (sxx / sw).sqrt(),
        }
    }
}

impl fmt::Display for SolveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean {} st.dev. {} rms {}",
            fmt_g(self.mean),
            fmt_g(self.stdev),
            fmt_g(self.rms)
        )
    }
}

/// Size of the solved problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveSummary {
    pub n_tracks: usize,
    pub n_crossovers: usize,
    pub n_clusters: usize,
    pub n_unknowns: usize,
}

// -------------------------------------------------------------------------------------------------
// Correction table
// -------------------------------------------------------------------------------------------------

/// Fitted coefficients of one track, padded with zeros up to `n_par`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackCorrection {
    pub name: String,
    pub coefficients: Vec<f64>,
}

impl TrackCorrection {
    /// Symbolic terms of the correction, in the order they are written.
    pub fn terms(&self, model: CorrectionModel, field: &str) -> Vec<String> {
        let a = |r: usize| self.coefficients.get(r).copied().unwrap_or(0.0);
        let g = |r: usize| fmt_g(a(r));
        match model {
            CorrectionModel::Constant => vec![g(0)],
            CorrectionModel::DistanceDrift => vec![g(0), format!("{}*((dist))", g(1))],
            CorrectionModel::TimeDrift => vec![g(0), format!("{}*((time-T))", g(1))],
            CorrectionModel::Latitude => vec![g(0), format!("{}*sin((lat))^2", g(1))],
            CorrectionModel::Heading => vec![
                g(0),
                format!("{}*cos((azim))", g(1)),
                format!("{}*cos(2*(azim))", g(2)),
                format!("{}*sin((azim))", g(3)),
                format!("{}*sin(2*(azim))", g(4)),
            ],
            CorrectionModel::Scale => vec![format!("{}*(({field}))", fmt_g(1.0 - a(0)))],
            CorrectionModel::ScaleOffset => {
                vec![g(0), format!("{}*(({field}))", fmt_g(1.0 - a(1)))]
            }
        }
    }
}

/// Result of [`solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionTable {
    pub tag: String,
    pub field: String,
    pub model: CorrectionModel,
    pub corrections: Vec<TrackCorrection>,
    /// Statistics of the crossover errors before correction
    pub before: SolveStats,
    /// Statistics of the adjusted errors `coe + C_j - C_i`
    pub after: SolveStats,
    pub summary: SolveSummary,
}

impl CorrectionTable {
    pub fn get(&self, name: &str) -> Option<&TrackCorrection> {
        self.corrections.iter().find(|c| c.name == name)
    }

    /// One `track<TAB>field<TAB>term...` line per track.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.corrections.iter().map(|c| {
            std::iter::once(c.name.clone())
                .chain(std::iter::once(self.field.clone()))
                .chain(c.terms(self.model, &self.field))
                .join("\t")
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), XoverError> {
        for line in self.lines() {
            writeln!(writer, "{line}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CorrectionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
// Solve
// -------------------------------------------------------------------------------------------------

/// Divide the drift variables by their global range; returns the range used.
fn normalize_drift(records: &mut [SolverRecord]) -> f64 {
    let (lo, hi) = records
        .iter()
        .filter_map(|rec| match rec.terms {
            RecordTerms::Drift(x) => Some(x),
            _ => None,
        })
        .flatten()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;
    if !(range.is_finite() && range > 0.0) {
        return 1.0;
    }
    for rec in records.iter_mut() {
        if let RecordTerms::Drift(x) = &mut rec.terms {
            x.iter_mut().for_each(|v| *v /= range);
        }
    }
    range
}

/// Fit the corrections of every track.
///
/// Arguments
/// -----------------
/// * `input` – Crossover records, see [`super::records`].
/// * `params` – Model and statistics options. The model of `params` must match the records.
///
/// Return
/// ----------
/// * The correction table with before/after statistics.
/// * [`XoverError::EmptyDatabase`] without records, [`XoverError::InvalidParameter`] for
///   records that do not fit the model, [`XoverError::SingularMatrix`] if the system cannot be
///   solved.
pub fn solve(input: &SolverInput, params: &SolveParams) -> Result<CorrectionTable, XoverError> {
    let model = params.model;
    if input.model != model {
        return Err(XoverError::InvalidParameter(format!(
            "records prepared for a {} model, asked to fit a {} model",
            input.model, model
        )));
    }
    input.validate()?;
    if input.records.is_empty() {
        return Err(XoverError::EmptyDatabase);
    }

    let mut records = input.records.clone();
    let range = if model.is_drift() {
        normalize_drift(&mut records)
    } else {
        1.0
    };

    let before = SolveStats::from_weighted(
        records.iter().map(|rec| (rec.coe, rec.weight)),
        params.unweighted_stats,
    );

    let layout = ParameterLayout::new(input, model);
    let clusters = model
        .has_offset()
        .then(|| find_clusters(&adjacency(input.n_tracks(), &records)));
    let n_clusters = clusters.as_ref().map_or(0, Clusters::n_clusters);
    info!(
        "Number of unknowns is {} and number of constraints is {n_clusters}",
        layout.n_unknowns()
    );

    let NormalEquations { matrix, rhs } = assemble(model, &records, &layout, clusters.as_ref());
    let solution = gauss_jordan(matrix, rhs)?;

    let after = SolveStats::from_weighted(
        records.iter().map(|rec| {
            let [i, j] = rec.tracks;
            let c_i = layout.correction(model, &solution, i, &rec.terms, 0);
            let c_j = layout.correction(model, &solution, j, &rec.terms, 1);
            (rec.coe + (c_j - c_i), rec.weight)
        }),
        params.unweighted_stats,
    );
    info!("Before correction: {before}");
    info!("After correction: {after}");

    let corrections = input
        .tracks
        .iter()
        .enumerate()
        .map(|(p, name)| {
            let mut coefficients = vec![0.0; model.n_par()];
            let off = layout.offset(p);
            for (r, slot) in coefficients.iter_mut().take(layout.count(p)).enumerate() {
                *slot = solution[off + r];
            }
            if model.is_drift() {
                coefficients[1] /= range;
            }
            TrackCorrection {
                name: name.clone(),
                coefficients,
            }
        })
        .collect();

    Ok(CorrectionTable {
        tag: input.tag.clone(),
        field: input.field.clone(),
        model,
        corrections,
        before,
        after,
        summary: SolveSummary {
            n_tracks: input.n_tracks(),
            n_crossovers: records.len(),
            n_clusters,
            n_unknowns: layout.n_unknowns() + n_clusters,
        },
    })
}
