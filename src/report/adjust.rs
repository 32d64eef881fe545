//! # Adjustment splines
//!
//! Along-track corrections that close the crossover errors of the reported tracks. Each
//! discrepancy is split between the two tracks in proportion to the other track's weight, so the
//! better track moves less. Tracks left out of the report weigh 1 on the other side of the split
//! but get no spline.
//!
//! A spline is a list of `(distance, correction)` knots, anchored at `(0, 0)` and at the largest
//! known extent of the track, sorted by distance, with the corrections of repeated distances
//! averaged.

use std::{fs::File, io::Write};

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use tracing::{debug, info};

use super::CoeReport;
use crate::{
    coe::CoeDatabase, constants::ADJUST_EXTENSION, format::fmt_g, xover_errors::XoverError,
};

/// Knots of one track's adjustment spline.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackAdjustment {
    pub name: String,
    /// `(distance, correction)`, strictly increasing in distance
    pub knots: Vec<(f64, f64)>,
}

impl TrackAdjustment {
    /// Linear interpolation of the correction at `dist`, zero outside the knots.
    pub fn correction_at(&self, dist: f64) -> f64 {
        let idx = self.knots.partition_point(|(d, _)| *d < dist);
        match (idx.checked_sub(1).and_then(|i| self.knots.get(i)), self.knots.get(idx)) {
            (_, Some(&(d1, c1))) if d1 == dist => c1,
            (Some(&(d0, c0)), Some(&(d1, c1))) => c0 + (c1 - c0) * (dist - d0) / (d1 - d0),
            _ => 0.0,
        }
    }
}

/// Build the adjustment spline of every track of `report`.
///
/// Arguments
/// -----------------
/// * `db` – Database the report was built from.
/// * `report` – Report providing the qualifying tracks and their weights.
///
/// Return
/// ----------
/// * One [`TrackAdjustment`] per reported track, in report order.
pub fn adjustment_splines(db: &CoeDatabase, report: &CoeReport) -> Vec<TrackAdjustment> {
    let mut weights: Vec<Option<f64>> = vec![None; db.n_tracks()];
    for t in &report.tracks {
        if let Some(slot) = weights.get_mut(t.id) {
            *slot = Some(t.weight);
        }
    }
    let mut knots: Vec<Vec<(f64, f64)>> = vec![Vec::new(); db.n_tracks()];

    for pair in &db.pairs {
        let ids = [pair.tracks[0].id, pair.tracks[1].id];
        if weights[ids[0]].is_none() && weights[ids[1]].is_none() {
            continue;
        }
        let w0 = weights[ids[0]].unwrap_or(1.0);
        let w1 = weights[ids[1]].unwrap_or(1.0);
        for xover in &pair.crossovers {
            let z = xover.coe();
            if !z.is_finite() {
                continue;
            }
            let corrections = [-z * w1 / (w0 + w1), z * w0 / (w0 + w1)];
            for side in 0..2 {
                let dist = xover.sides[side].dist;
                if weights[ids[side]].is_some() && dist.is_finite() {
                    knots[ids[side]].push((dist, corrections[side]));
                }
            }
        }
    }

    let extents = db.track_extents();
    report
        .tracks
        .iter()
        .map(|t| {
            let mut track_knots = std::mem::take(&mut knots[t.id]);
            track_knots.push((0.0, 0.0));
            if extents[t.id] > 0.0 {
                track_knots.push((extents[t.id], 0.0));
            }
            track_knots.sort_by_key(|(d, _)| OrderedFloat(*d));
            let knots = track_knots
                .into_iter()
                .chunk_by(|(d, _)| OrderedFloat(*d))
                .into_iter()
                .map(|(d, group)| {
                    let (n, sum) = group.fold((0usize, 0.0), |(n, s), (_, c)| (n + 1, s + c));
                    (d.into_inner(), sum / n as f64)
                })
                .collect_vec();
            debug!("Track {}: {} adjustment knots", t.name, knots.len());
            TrackAdjustment {
                name: t.name.clone(),
                knots,
            }
        })
        .collect()
}

/// Write the knots of `adjustment` as tab-separated `distance correction` lines.
pub fn write_adjustment<W: Write>(
    writer: W,
    adjustment: &TrackAdjustment,
) -> Result<(), XoverError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(writer);
    for (d, c) in &adjustment.knots {
        wtr.write_record([fmt_g(*d), fmt_g(*c)])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write one `<dir>/<track>.<field>.adj` file per adjustment.
///
/// Return
/// ----------
/// * The paths written, in the order of `adjustments`.
pub fn write_adjustment_files(
    dir: &Utf8Path,
    field: &str,
    adjustments: &[TrackAdjustment],
) -> Result<Vec<Utf8PathBuf>, XoverError> {
    let mut written = Vec::with_capacity(adjustments.len());
    for adj in adjustments {
        let path = dir.join(format!("{}.{field}.{ADJUST_EXTENSION}", adj.name));
        write_adjustment(File::create(&path)?, adj)?;
        written.push(path);
    }
    info!("Wrote {} adjustment files to {dir}", written.len());
    Ok(written)
}
