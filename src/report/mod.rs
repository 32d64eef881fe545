//! # Crossover report
//!
//! Per-track residual statistics of a [`CoeDatabase`] and the relative track weights derived
//! from them.
//!
//! Residuals
//! -----------------
//! A crossover contributes `z_1 − z_2` to its first track and `z_2 − z_1` to its second track,
//! so a track with a positive mean reads high compared with the tracks it crosses. An internal
//! crossover contributes both residuals to the same track.
//!
//! Weights
//! -----------------
//! Only tracks with more than `min_crossovers` crossovers are reported. Their raw weight is the
//! inverse of the sum of their squared residuals, so a track with more crossovers of the same
//! size weighs less. The weights are then rescaled so their mean over the reported tracks is 1.
//! A track whose residuals are all zero gets the largest finite raw weight among the others.
//!
//! See also
//! ------------
//! * [`adjust`] – Adjustment splines built from the report weights.
//! * [`display`] – Table rendering of a [`CoeReport`].

pub mod adjust;
pub mod display;

use std::{fmt, io::Write};

use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    coe::{listing::TrackWeights, CoeDatabase},
    constants::FastHashMap,
    format::fmt_g,
    solver::SolveStats,
    xover_errors::XoverError,
};

/// Options of [`build_report`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportParams {
    /// Tracks need strictly more crossovers than this to be reported
    pub min_crossovers: usize,
    /// Weights applied to the residual statistics
    pub weights: TrackWeights,
    /// Ignore `weights` in the statistics
    pub unweighted: bool,
}

impl ReportParams {
    pub fn builder() -> ReportParamsBuilder {
        ReportParamsBuilder {
            params: ReportParams::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportParamsBuilder {
    params: ReportParams,
}

impl ReportParamsBuilder {
    pub fn min_crossovers(mut self, v: usize) -> Self {
        self.params.min_crossovers = v;
        self
    }

    pub fn fixed_weight(mut self, v: f64) -> Self {
        self.params.weights = TrackWeights::Fixed(v);
        self
    }

    pub fn track_weights(mut self, v: FastHashMap<String, f64>) -> Self {
        self.params.weights = TrackWeights::PerTrack(v);
        self
    }

    pub fn unweighted(mut self, v: bool) -> Self {
        self.params.unweighted = v;
        self
    }

    pub fn build(self) -> Result<ReportParams, XoverError> {
        let p = self.params;
        match &p.weights {
            TrackWeights::Fixed(w) if !(*w > 0.0 && w.is_finite()) => {
                Err(XoverError::InvalidParameter(format!(
                    "fixed weight {w} must be positive"
                )))
            }
            TrackWeights::PerTrack(map) if map.values().any(|w| !(*w > 0.0)) => Err(
                XoverError::InvalidParameter("track weights must be positive".into()),
            ),
            _ => Ok(p),
        }
    }
}

/// Statistics of one reported track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackReport {
    pub name: String,
    /// Dense id in the source database
    pub id: usize,
    pub stats: SolveStats,
    /// Relative weight, mean 1 over the reported tracks
    pub weight: f64,
}

/// Report over every qualifying track of a database.
#[derive(Debug, Clone, PartialEq)]
pub struct CoeReport {
    pub tag: String,
    pub field: String,
    pub tracks: Vec<TrackReport>,
    /// Statistics of every crossover error of the database
    pub total: SolveStats,
}

impl CoeReport {
    /// Relative weight of the track with dense id `id`, if it was reported.
    pub fn weight_of(&self, id: usize) -> Option<f64> {
        self.tracks.iter().find(|t| t.id == id).map(|t| t.weight)
    }

    pub fn get(&self, name: &str) -> Option<&TrackReport> {
        self.tracks.iter().find(|t| t.name == name)
    }

    /// Text form of the report, one line per track plus the `# Tag` line, the column header and
    /// a closing `TOTAL` line.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        let head = [
            format!("# Tag: {} {}", self.tag, self.field),
            "# track\tn\tmean\tstdev\trms\tweight".to_string(),
        ];
        let body = self.tracks.iter().map(|t| {
            [
                t.name.clone(),
                t.stats.n.to_string(),
                fmt_g(t.stats.mean),
                fmt_g(t.stats.stdev),
                fmt_g(t.stats.rms),
                fmt_g(t.weight),
            ]
            .iter()
            .join("\t")
        });
        let total = [
            "TOTAL".to_string(),
            self.total.n.to_string(),
            fmt_g(self.total.mean),
            fmt_g(self.total.stdev),
            fmt_g(self.total.rms),
            fmt_g(1.0),
        ]
        .iter()
        .join("\t");
        head.into_iter().chain(body).chain(std::iter::once(total))
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), XoverError> {
        for line in self.lines() {
            writeln!(writer, "{line}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CoeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Per-track residual statistics and relative weights of `db`.
///
/// Arguments
/// -----------------
/// * `db` – Crossover database, usually the output of
///   [`crate::coe::dbase_reader::read_coe_database`].
/// * `params` – Minimum crossover count and weights.
///
/// Return
/// ----------
/// * The report, tracks in dense id order.
/// * [`XoverError::EmptyDatabase`] if `db` holds no finite crossover error.
pub fn build_report(db: &CoeDatabase, params: &ReportParams) -> Result<CoeReport, XoverError> {
    let counts = db.crossings_per_track();
    let mut residuals: Vec<Vec<(f64, f64)>> = vec![Vec::new(); db.n_tracks()];
    let mut all = Vec::with_capacity(db.n_crossovers());
    let mut skipped = 0usize;

    for pair in &db.pairs {
        let [first, second] = &pair.tracks;
        let w = params.weights.composite(&first.name, &second.name);
        for xover in &pair.crossovers {
            let z = xover.coe();
            if !z.is_finite() {
                skipped += 1;
                continue;
            }
            residuals[first.id].push((z, w));
            residuals[second.id].push((-z, w));
            all.push((z, w));
        }
    }
    if skipped > 0 {
        warn!("Skipped {skipped} crossovers without a finite {} error", db.field);
    }
    if all.is_empty() {
        return Err(XoverError::EmptyDatabase);
    }

    let mut tracks: Vec<TrackReport> = residuals
        .iter()
        .enumerate()
        .filter(|(id, res)| counts[*id] > params.min_crossovers && !res.is_empty())
        .map(|(id, res)| {
            let stats = SolveStats::from_weighted(res.iter().copied(), params.unweighted);
            let sum_sq: f64 = res.iter().map(|(r, _)| r * r).sum();
            TrackReport {
                name: db.tracks[id].clone(),
                id,
                stats,
                weight: 1.0 / sum_sq,
            }
        })
        .collect();

    let max_finite = tracks
        .iter()
        .map(|t| t.weight)
        .filter(|w| w.is_finite())
        .fold(None, |acc: Option<f64>, w| Some(acc.map_or(w, |a| a.max(w))))
        .unwrap_or(1.0);
    for t in tracks.iter_mut().filter(|t| !t.weight.is_finite()) {
        t.weight = max_finite;
    }
    if !tracks.is_empty() {
        let mean = tracks.iter().map(|t| t.weight).sum::<f64>() / tracks.len() as f64;
        for t in &mut tracks {
            t.weight /= mean;
        }
    }

    info!(
        "Report on {} of {} tracks, {} crossovers",
        tracks.len(),
        db.n_tracks(),
        all.len()
    );
    Ok(CoeReport {
        tag: db.tag.clone(),
        field: db.field.clone(),
        tracks,
        total: SolveStats::from_weighted(all, params.unweighted),
    })
}
