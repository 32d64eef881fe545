//! # Crossover listing
//!
//! Per-track crossover statistics and the conversion of a [`CoeDatabase`] into the
//! model-specific records of the [`crate::solver`].
//!
//! Track selection
//! -----------------
//! * **Minimum count** – pairs where either track has fewer than `min_crossovers` crossovers in
//!   the whole database are left out.
//! * **Asymmetry** – `(n_after - n_before) / n` where `n_before` / `n_after` count the crossovers
//!   lying before / after the middle of the track. The middle is the mid time from the pair
//!   header when available, otherwise half of the track length. Tracks with `|asymmetry|` above
//!   `max_asymmetry` are left out, since a drift fitted to one half of a track is poorly
//!   constrained.
//!
//! Weights
//! -----------------
//! Each crossover gets the composite weight `sqrt(1 / (1/w_1² + 1/w_2²))` of its two tracks'
//! weights (tracks missing from the weight list weigh 1), or a fixed weight.

use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
};

use camino::Utf8Path;
use tracing::{info, warn};

use super::{CoeDatabase, CoePair, Crossover};
use crate::{
    constants::FastHashMap,
    solver::{
        records::{write_solver_table, RecordTerms, SolverInput, SolverRecord},
        CorrectionModel,
    },
    xover_errors::XoverError,
};

/// Source of the per-crossover weight.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackWeights {
    /// Same weight for every crossover
    Fixed(f64),
    /// Weight per track name
    PerTrack(FastHashMap<String, f64>),
}

impl Default for TrackWeights {
    fn default() -> Self {
        TrackWeights::Fixed(1.0)
    }
}

impl TrackWeights {
    /// Composite weight of a crossover between `first` and `second`.
    pub fn composite(&self, first: &str, second: &str) -> f64 {
        match self {
            TrackWeights::Fixed(w) => *w,
            TrackWeights::PerTrack(weights) => {
                let inv_sq: f64 = [first, second]
                    .iter()
                    .map(|name| {
                        let w = weights.get(*name).copied().unwrap_or(1.0);
                        1.0 / (w * w)
                    })
                    .sum();
                (1.0 / inv_sq).sqrt()
            }
        }
    }
}

/// Read a `name weight` list; `#` lines are comments.
///
/// Return
/// ----------
/// * [`XoverError::MalformedRecord`] for a line without a positive numeric weight.
pub fn read_track_weights(path: &Utf8Path) -> Result<FastHashMap<String, f64>, XoverError> {
    let file = File::open(path)?;
    let mut weights = FastHashMap::default();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or_default();
        let weight = words
            .next()
            .and_then(|w| w.parse::<f64>().ok())
            .filter(|w| *w > 0.0)
            .ok_or_else(|| XoverError::MalformedRecord {
                line: idx + 1,
                reason: format!("expected '<track> <weight>' with a positive weight, got '{line}'"),
            })?;
        weights.insert(name.to_string(), weight);
    }
    Ok(weights)
}

/// Options of [`select_tracks`] and [`extract_records`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListingParams {
    pub min_crossovers: usize,
    /// Largest accepted `|asymmetry|`, in `(0, 1]`
    pub max_asymmetry: Option<f64>,
    pub weights: TrackWeights,
}

impl ListingParams {
    pub fn builder() -> ListingParamsBuilder {
        ListingParamsBuilder {
            params: ListingParams::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListingParamsBuilder {
    params: ListingParams,
}

impl ListingParamsBuilder {
    pub fn min_crossovers(mut self, v: usize) -> Self {
        self.params.min_crossovers = v;
        self
    }

    pub fn max_asymmetry(mut self, v: f64) -> Self {
        self.params.max_asymmetry = Some(v);
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

    pub fn build(self) -> Result<ListingParams, XoverError> {
        let p = self.params;
        if let Some(a) = p.max_asymmetry {
            if !(a > 0.0 && a <= 1.0) {
                return Err(XoverError::InvalidParameter(format!(
                    "asymmetry limit {a} must be in (0, 1]"
                )));
            }
        }
        match &p.weights {
            TrackWeights::Fixed(w) if !(*w > 0.0 && w.is_finite()) => {
                return Err(XoverError::InvalidParameter(format!(
                    "fixed weight {w} must be positive"
                )));
            }
            TrackWeights::PerTrack(map) if map.values().any(|w| !(*w > 0.0)) => {
                return Err(XoverError::InvalidParameter(
                    "track weights must be positive".into(),
                ));
            }
            _ => {}
        }
        Ok(p)
    }
}

/// Crossover totals of one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub name: String,
    pub n_crossovers: usize,
    pub asymmetry: f64,
}

/// Middle of a track as seen from one pair: mid time, or half length.
fn track_middle(pair: &CoePair, side: usize) -> (f64, f64) {
    let t = &pair.tracks[side];
    let mid_time = if t.has_time() {
        0.5 * (t.start + t.stop)
    } else {
        f64::NAN
    };
    let length = if t.length.is_finite() {
        t.length
    } else {
        pair.summary().dist_range[side].1
    };
    (mid_time, 0.5 * length)
}

/// `(n_after - n_before) / n` for every track; `NaN` for a track without crossovers.
pub fn asymmetry(db: &CoeDatabase) -> Vec<f64> {
    let mut before = vec![0usize; db.n_tracks()];
    let mut after = vec![0usize; db.n_tracks()];
    for pair in &db.pairs {
        let middles = [track_middle(pair, 0), track_middle(pair, 1)];
        for xover in &pair.crossovers {
            for (side, &(mid_time, mid_dist)) in middles.iter().enumerate() {
                let s = &xover.sides[side];
                let late = if s.time.is_finite() && mid_time.is_finite() {
                    s.time > mid_time
                } else {
                    s.dist > mid_dist
                };
                let id = pair.tracks[side].id;
                if late {
                    after[id] += 1;
                } else {
                    before[id] += 1;
                }
            }
        }
    }
    before
        .iter()
        .zip(&after)
        .map(|(&b, &a)| (a as f64 - b as f64) / (a + b) as f64)
        .collect()
}

/// Crossover count and asymmetry of every track, in id order.
pub fn track_summaries(db: &CoeDatabase) -> Vec<TrackSummary> {
    let counts = db.crossings_per_track();
    db.tracks
        .iter()
        .zip(counts)
        .zip(asymmetry(db))
        .map(|((name, n_crossovers), asymmetry)| TrackSummary {
            name: name.clone(),
            n_crossovers,
            asymmetry,
        })
        .collect()
}

/// Drop the pairs involving a track that fails the count or asymmetry limits.
///
/// Counts and asymmetries are evaluated on the whole database before anything is removed.
pub fn select_tracks(db: &CoeDatabase, params: &ListingParams) -> CoeDatabase {
    let counts = db.crossings_per_track();
    let symm = params.max_asymmetry.map(|_| asymmetry(db));
    let accepted: Vec<bool> = (0..db.n_tracks())
        .map(|id| {
            let enough = counts[id] >= params.min_crossovers;
            let balanced = match (&symm, params.max_asymmetry) {
                (Some(s), Some(max)) => s[id].abs() <= max,
                _ => true,
            };
            enough && balanced
        })
        .collect();

    let rejected = accepted.iter().filter(|ok| !**ok).count();
    if rejected > 0 {
        info!("{rejected} of {} tracks rejected by the listing limits", db.n_tracks());
    }
    let mut selected = db.clone();
    selected.retain_pairs(|pair| pair.tracks.iter().all(|t| accepted[t.id]));
    selected
}

fn record_terms(model: CorrectionModel, pair: &CoePair, xover: &Crossover) -> RecordTerms {
    let sides = &xover.sides;
    match model {
        CorrectionModel::Constant => RecordTerms::Constant,
        CorrectionModel::DistanceDrift => RecordTerms::Drift([sides[0].dist, sides[1].dist]),
        CorrectionModel::TimeDrift => {
            let since_start = |k: usize| {
                let start = pair.tracks[k].start;
                if start.is_finite() {
                    sides[k].time - start
                } else {
                    sides[k].time
                }
            };
            RecordTerms::Drift([since_start(0), since_start(1)])
        }
        CorrectionModel::Latitude => RecordTerms::Latitude(xover.y),
        CorrectionModel::Heading => RecordTerms::Heading([sides[0].heading, sides[1].heading]),
        CorrectionModel::Scale | CorrectionModel::ScaleOffset => {
            RecordTerms::Scale([sides[0].value, sides[1].value])
        }
    }
}

/// Convert the crossovers of `db` into solver records for `model`.
///
/// Crossovers whose error or model variables are `NaN` are skipped with a warning. Tracks left
/// without any record are dropped and the remaining ids renumbered in database order.
pub fn extract_records(
    db: &CoeDatabase,
    model: CorrectionModel,
    weights: &TrackWeights,
) -> Result<SolverInput, XoverError> {
    if model == CorrectionModel::TimeDrift && !db.has_time {
        return Err(XoverError::MissingColumn(format!(
            "{}: a time drift needs crossover times",
            db.field
        )));
    }
    let mut records = Vec::with_capacity(db.n_crossovers());
    let mut n_nan = 0usize;
    for pair in &db.pairs {
        let weight = weights.composite(&pair.tracks[0].name, &pair.tracks[1].name);
        for xover in &pair.crossovers {
            let terms = record_terms(model, pair, xover);
            let finite = match terms {
                RecordTerms::Constant => true,
                RecordTerms::Latitude(v) => v.is_finite(),
                RecordTerms::Drift(v) | RecordTerms::Heading(v) | RecordTerms::Scale(v) => {
                    v.iter().all(|x| x.is_finite())
                }
            };
            if !finite || xover.coe().is_nan() {
                n_nan += 1;
                continue;
            }
            records.push(SolverRecord {
                tracks: [pair.tracks[0].id, pair.tracks[1].id],
                coe: xover.coe(),
                weight,
                terms,
            });
        }
    }
    if n_nan > 0 {
        warn!("{n_nan} crossovers with NaN values left out of the solver records");
    }

    // tracks without any record have no equation; ids are compacted in database order
    let mut used = vec![false; db.tracks.len()];
    records
        .iter()
        .flat_map(|r| r.tracks)
        .for_each(|id| used[id] = true);
    let mut new_id = vec![usize::MAX; db.tracks.len()];
    let mut tracks = Vec::with_capacity(db.tracks.len());
    for (id, name) in db.tracks.iter().enumerate().filter(|(id, _)| used[*id]) {
        new_id[id] = tracks.len();
        tracks.push(name.clone());
    }
    if tracks.len() < db.tracks.len() {
        warn!(
            "{} tracks have no usable crossover and are left out of the solver records",
            db.tracks.len() - tracks.len()
        );
        for record in &mut records {
            record.tracks = record.tracks.map(|id| new_id[id]);
        }
    }

    Ok(SolverInput {
        tag: db.tag.clone(),
        field: db.field.clone(),
        model,
        tracks,
        records,
    })
}

/// Select tracks, extract the records of `model` and write them as a solver table.
///
/// Return
/// ----------
/// * The records written, tracks renumbered after selection.
pub fn write_solver_listing<W: Write>(
    writer: W,
    db: &CoeDatabase,
    model: CorrectionModel,
    params: &ListingParams,
) -> Result<SolverInput, XoverError> {
    let selected = select_tracks(db, params);
    let input = extract_records(&selected, model, &params.weights)?;
    write_solver_table(writer, &input)?;
    info!(
        "Listed {} {} crossovers of {} tracks for the solver",
        input.n_crossovers(),
        input.field,
        input.n_tracks()
    );
    Ok(input)
}
