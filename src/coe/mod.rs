//! # Crossover error (COE) database
//!
//! In-memory form of the crossover database produced by the external crossover finder, grouped
//! by track pair.
//!
//! ## Overview
//!
//! - [`Crossover`] – One crossing point with the values seen by each of the two tracks.
//! - [`CoePair`] – All crossovers between two tracks, with the start/stop time and length each
//!   track declares in the pair header.
//! - [`CoeDatabase`] – Every retained pair plus the dense numbering of the tracks involved.
//!
//! ## Units
//!
//! - Times are seconds since 1970-01-01 UTC (`NaN` when the database has no time).
//! - Distances and speeds use the units of the tag (`-Nd`, `-Ns`).
//! - Headings are degrees clockwise from north.
//!
//! ## See also
//!
//! - [`dbase_reader`] – Parsing and filtering of the text database.
//! - [`listing`] – Per-track statistics, weights and solver records.

pub mod dbase_reader;
pub mod listing;

use crate::constants::FastHashMap;

/// Values observed by one track at a crossover.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoeSide {
    pub time: f64,
    pub dist: f64,
    pub heading: f64,
    pub speed: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossover {
    pub x: f64,
    pub y: f64,
    pub sides: [CoeSide; 2],
}

impl Crossover {
    /// Crossover error, track one minus track two.
    pub fn coe(&self) -> f64 {
        self.sides[0].value - self.sides[1].value
    }

    /// Mean of the two observed values.
    pub fn mean(&self) -> f64 {
        0.5 * (self.sides[0].value + self.sides[1].value)
    }

    fn swap(&mut self) {
        self.sides.swap(0, 1);
    }
}

/// One track as declared in a pair header.
#[derive(Debug, Clone, PartialEq)]
pub struct PairTrack {
    pub name: String,
    /// Dense id in [`CoeDatabase::tracks`]
    pub id: usize,
    pub year: i32,
    pub start: f64,
    pub stop: f64,
    pub length: f64,
}

impl PairTrack {
    pub fn has_time(&self) -> bool {
        self.start.is_finite() && self.stop.is_finite()
    }
}

/// Observed extent of a track's crossovers inside one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairSummary {
    pub n_crossovers: usize,
    /// `(min, max)` along-track distance of the crossovers, per side
    pub dist_range: [(f64, f64); 2],
    /// `(min, max)` time of the crossovers, per side (`NaN` without time)
    pub time_range: [(f64, f64); 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoePair {
    pub tracks: [PairTrack; 2],
    pub crossovers: Vec<Crossover>,
}

fn finite_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values
        .filter(|v| v.is_finite())
        .fold((f64::NAN, f64::NAN), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

impl CoePair {
    /// A track crossing itself.
    pub fn is_internal(&self) -> bool {
        self.tracks[0].name == self.tracks[1].name
    }

    pub fn n_crossovers(&self) -> usize {
        self.crossovers.len()
    }

    /// Exchange the roles of the two tracks.
    pub fn swap(&mut self) {
        self.tracks.swap(0, 1);
        self.crossovers.iter_mut().for_each(Crossover::swap);
    }

    /// Side (0 or 1) on which track `id` appears first.
    pub fn side_of(&self, id: usize) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    pub fn summary(&self) -> PairSummary {
        let range = |side: usize, pick: fn(&CoeSide) -> f64| {
            finite_range(self.crossovers.iter().map(|c| pick(&c.sides[side])))
        };
        PairSummary {
            n_crossovers: self.crossovers.len(),
            dist_range: [range(0, |s| s.dist), range(1, |s| s.dist)],
            time_range: [range(0, |s| s.time), range(1, |s| s.time)],
        }
    }
}

/// Crossovers of one tag and one data field, grouped by track pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoeDatabase {
    pub tag: String,
    pub field: String,
    pub has_time: bool,
    pub geographic: bool,
    /// Track names indexed by dense id, in order of first appearance
    pub tracks: Vec<String>,
    pub pairs: Vec<CoePair>,
}

impl CoeDatabase {
    pub fn n_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn n_pairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn n_crossovers(&self) -> usize {
        self.pairs.iter().map(CoePair::n_crossovers).sum()
    }

    pub fn track_id(&self, name: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t == name)
    }

    /// Crossovers touching each track; an internal crossover counts once.
    pub fn crossings_per_track(&self) -> Vec<usize> {
        let mut counts = vec![0; self.tracks.len()];
        for pair in &self.pairs {
            counts[pair.tracks[0].id] += pair.n_crossovers();
            if !pair.is_internal() {
                counts[pair.tracks[1].id] += pair.n_crossovers();
            }
        }
        counts
    }

    /// Largest declared (or observed) along-track extent of every track.
    pub fn track_extents(&self) -> Vec<f64> {
        let mut extents = vec![0.0_f64; self.tracks.len()];
        for pair in &self.pairs {
            let summary = pair.summary();
            for side in 0..2 {
                let declared = pair.tracks[side].length;
                let observed = summary.dist_range[side].1;
                let extent = if declared.is_finite() { declared } else { observed };
                if extent.is_finite() {
                    let slot = &mut extents[pair.tracks[side].id];
                    *slot = slot.max(extent);
                }
            }
        }
        extents
    }

    /// Keep only the pairs for which `keep` is true and renumber the tracks left.
    pub fn retain_pairs(&mut self, mut keep: impl FnMut(&CoePair) -> bool) {
        self.pairs.retain(|p| keep(p));
        self.renumber();
    }

    /// Dense ids in order of first appearance over the current pairs.
    pub(crate) fn renumber(&mut self) {
        let mut ids: FastHashMap<String, usize> = FastHashMap::default();
        let mut names = Vec::new();
        for pair in &mut self.pairs {
            for track in &mut pair.tracks {
                track.id = *ids.entry(track.name.clone()).or_insert_with(|| {
                    names.push(track.name.clone());
                    names.len() - 1
                });
            }
        }
        self.tracks = names;
    }
}

#[cfg(test)]
pub(crate) mod coe_test_utils {
    use super::*;

    pub fn side(time: f64, dist: f64, heading: f64, value: f64) -> CoeSide {
        CoeSide {
            time,
            dist,
            heading,
            speed: 10.0,
            value,
        }
    }

    pub fn track(name: &str, length: f64) -> PairTrack {
        PairTrack {
            name: name.to_string(),
            id: 0,
            year: 2000,
            start: f64::NAN,
            stop: f64::NAN,
            length,
        }
    }

    /// Pair whose crossovers are `(dist_1, dist_2, value_1, value_2)` at latitude 10.
    pub fn pair(a: &str, b: &str, xovers: &[(f64, f64, f64, f64)]) -> CoePair {
        CoePair {
            tracks: [track(a, 100.0), track(b, 100.0)],
            crossovers: xovers
                .iter()
                .map(|&(d1, d2, z1, z2)| Crossover {
                    x: 0.0,
                    y: 10.0,
                    sides: [side(f64::NAN, d1, 0.0, z1), side(f64::NAN, d2, 90.0, z2)],
                })
                .collect(),
        }
    }

    pub fn database(pairs: Vec<CoePair>) -> CoeDatabase {
        let mut db = CoeDatabase {
            tag: "TEST".into(),
            field: "faa".into(),
            has_time: false,
            geographic: true,
            tracks: Vec::new(),
            pairs,
        };
        db.renumber();
        db
    }
}

#[cfg(test)]
mod coe_tests {
    use super::coe_test_utils::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_counts_and_ids() {
        let db = database(vec![
            pair("a", "b", &[(1.0, 2.0, 5.0, 3.0), (4.0, 8.0, 1.0, 1.5)]),
            pair("b", "c", &[(3.0, 3.0, 0.0, 0.0)]),
            pair("c", "c", &[(1.0, 9.0, 2.0, 2.0)]),
        ]);
        assert_eq!(db.tracks, vec!["a", "b", "c"]);
        assert_eq!(db.n_crossovers(), 4);
        assert_eq!(db.crossings_per_track(), vec![2, 3, 2]);
        assert!(db.pairs[2].is_internal());
        assert_relative_eq!(db.pairs[0].crossovers[0].coe(), 2.0);
    }

    #[test]
    fn test_summary_and_swap() {
        let mut p = pair("a", "b", &[(1.0, 20.0, 5.0, 3.0), (4.0, 8.0, 1.0, 1.5)]);
        let s = p.summary();
        assert_eq!(s.dist_range, [(1.0, 4.0), (8.0, 20.0)]);
        assert!(s.time_range[0].0.is_nan());

        p.swap();
        assert_eq!(p.tracks[0].name, "b");
        assert_relative_eq!(p.crossovers[0].coe(), -2.0);
    }

    #[test]
    fn test_retain_renumbers() {
        let mut db = database(vec![
            pair("a", "b", &[(1.0, 2.0, 5.0, 3.0)]),
            pair("c", "d", &[(1.0, 2.0, 5.0, 3.0)]),
        ]);
        db.retain_pairs(|p| p.tracks[0].name == "c");
        assert_eq!(db.tracks, vec!["c", "d"]);
        assert_eq!(db.pairs[0].tracks[1].id, 1);
    }
}
