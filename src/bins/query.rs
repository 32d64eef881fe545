//! # Bin query engine
//!
//! Region and field-presence queries over a loaded [`Database`].
//!
//! Query modes
//! -----------------
//! * [`BinQuery::tracks`] – Tracks seen in the region. A track's flags are the OR of its
//!   bin-local flags over every bin of the region, and the predicate is evaluated on that union
//!   (or on the whole-track registry flags with [`QueryParams::global_flags`]).
//! * [`BinQuery::bin_centers`] – Center of every bin of the region holding at least one track
//!   whose bin-local flags satisfy the predicate, once per bin.
//! * [`BinQuery::pairs`] – Unordered pairs of qualifying tracks that share at least one bin of
//!   the region. These are the candidates handed to the external crossover finder.
//!
//! See also
//! -----------------
//! * [`crate::bins::grid::BinGrid::bin_range`] – Region to bin conversion with longitude wrap.
//! * [`crate::bitmatrix::BitMatrix`] – Pair accumulation.

use crate::{
    bins::{registry::TrackEntry, store::Database},
    bitmatrix::BitMatrix,
    constants::{BinId, FieldFlags, TrackId},
    tag::Region,
    xover_errors::XoverError,
};

/// Field-presence predicate; both halves are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldPredicate {
    /// Every bit of this mask must be present
    pub require_all: Option<FieldFlags>,
    /// No bit of this mask may be present
    pub require_none: Option<FieldFlags>,
}

impl FieldPredicate {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn all_of(mask: FieldFlags) -> Self {
        Self {
            require_all: Some(mask),
            require_none: None,
        }
    }

    pub fn none_of(mut self, mask: FieldFlags) -> Self {
        self.require_none = Some(mask);
        self
    }

    pub fn matches(&self, flags: FieldFlags) -> bool {
        self.require_all.is_none_or(|m| flags & m == m)
            && self.require_none.is_none_or(|m| flags & m == 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    /// Region to scan; the whole grid when `None`
    pub region: Option<Region>,
    pub predicate: FieldPredicate,
    /// Test the predicate on whole-track flags instead of in-region flags
    pub global_flags: bool,
    /// Report a track paired with itself (internal crossover candidates)
    pub self_pairs: bool,
    /// Keep only pairs with at least one member in this set
    pub subset: Option<Vec<TrackId>>,
}

impl QueryParams {
    pub fn builder() -> QueryParamsBuilder {
        QueryParamsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryParamsBuilder {
    params: QueryParams,
}

impl QueryParamsBuilder {
    pub fn region(mut self, v: Region) -> Self {
        self.params.region = Some(v);
        self
    }
    pub fn predicate(mut self, v: FieldPredicate) -> Self {
        self.params.predicate = v;
        self
    }
    pub fn global_flags(mut self, v: bool) -> Self {
        self.params.global_flags = v;
        self
    }
    pub fn self_pairs(mut self, v: bool) -> Self {
        self.params.self_pairs = v;
        self
    }
    pub fn subset(mut self, v: Vec<TrackId>) -> Self {
        self.params.subset = Some(v);
        self
    }

    pub fn build(self) -> Result<QueryParams, XoverError> {
        if let Some(r) = self.params.region {
            if !(r.west <= r.east && r.south <= r.north) {
                return Err(XoverError::InvalidParameter(format!(
                    "query region {r} is empty"
                )));
            }
        }
        Ok(self.params)
    }
}

/// Candidate pair of tracks sharing a bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPair<'a> {
    pub first: &'a TrackEntry,
    pub second: &'a TrackEntry,
}

pub struct BinQuery<'a> {
    db: &'a Database,
}

impl<'a> BinQuery<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn bins_in(&self, params: &QueryParams) -> Vec<BinId> {
        let region = params.region.unwrap_or_else(|| self.db.grid.region());
        self.db.grid.bin_range(&region).bin_ids().collect()
    }

    fn entries_by_id(&self) -> Vec<Option<&'a TrackEntry>> {
        let mut entries = vec![None; self.db.registry.len()];
        for entry in self.db.registry.iter() {
            if let Some(slot) = entries.get_mut(entry.id as usize) {
                *slot = Some(entry);
            }
        }
        entries
    }

    /// OR of the bin-local flags of each track over the region, `None` for unseen tracks.
    fn region_flags(&self, bins: &[BinId]) -> Vec<Option<FieldFlags>> {
        let mut flags = vec![None; self.db.registry.len()];
        for &bin in bins {
            for m in self.db.index.tracks_in_bin(bin) {
                if let Some(slot) = flags.get_mut(m.track_id as usize) {
                    *slot = Some(slot.unwrap_or(0) | m.flags);
                }
            }
        }
        flags
    }

    /// Per track id: seen in the region and satisfying the predicate.
    fn qualifying(&self, params: &QueryParams, bins: &[BinId]) -> Vec<bool> {
        let entries = self.entries_by_id();
        self.region_flags(bins)
            .iter()
            .zip(entries)
            .map(|(in_region, entry)| match (in_region, entry) {
                (Some(_), Some(e)) if params.global_flags => params.predicate.matches(e.flags),
                (Some(flags), _) => params.predicate.matches(*flags),
                (None, _) => false,
            })
            .collect()
    }

    /// Tracks of the region satisfying the predicate, in name order.
    pub fn tracks(&self, params: &QueryParams) -> Vec<&'a TrackEntry> {
        let bins = self.bins_in(params);
        let keep = self.qualifying(params, &bins);
        self.db
            .registry
            .iter()
            .filter(|e| keep.get(e.id as usize).copied().unwrap_or(false))
            .collect()
    }

    /// Centers of the bins holding a track whose bin-local flags satisfy the predicate.
    pub fn bin_centers(&self, params: &QueryParams) -> Result<Vec<(f64, f64)>, XoverError> {
        let entries = self.entries_by_id();
        let track_flags = |id: TrackId| entries.get(id as usize).copied().flatten().map(|e| e.flags);

        let mut centers = Vec::new();
        for bin in self.bins_in(params) {
            let hit = self.db.index.tracks_in_bin(bin).any(|m| {
                let flags = if params.global_flags {
                    track_flags(m.track_id).unwrap_or(m.flags)
                } else {
                    m.flags
                };
                params.predicate.matches(flags)
            });
            if hit {
                centers.push(self.db.grid.center_of(bin)?);
            }
        }
        Ok(centers)
    }

    /// Pair matrix of qualifying tracks sharing a bin of the region.
    pub fn pair_matrix(&self, params: &QueryParams) -> BitMatrix {
        let bins = self.bins_in(params);
        let keep = self.qualifying(params, &bins);
        let mut matrix = BitMatrix::new(self.db.registry.len());

        for bin in bins {
            let members: Vec<usize> = self
                .db
                .index
                .tracks_in_bin(bin)
                .map(|m| m.track_id as usize)
                .filter(|&id| keep.get(id).copied().unwrap_or(false))
                .collect();
            for (k, &a) in members.iter().enumerate() {
                if params.self_pairs {
                    matrix.set(a, a);
                }
                for &b in &members[k + 1..] {
                    matrix.set_symmetric(a, b);
                }
            }
        }
        matrix
    }

    /// Candidate pairs, each once, ordered by (lower id, higher id).
    pub fn pairs(&self, params: &QueryParams) -> Vec<TrackPair<'a>> {
        let entries = self.entries_by_id();
        let in_subset = |id: usize| {
            params
                .subset
                .as_ref()
                .is_none_or(|s| s.contains(&(id as TrackId)))
        };

        self.pair_matrix(params)
            .upper_ones()
            .filter(|&(a, b)| in_subset(a) || in_subset(b))
            .filter_map(|(a, b)| {
                Some(TrackPair {
                    first: entries.get(a).copied().flatten()?,
                    second: entries.get(b).copied().flatten()?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod query_tests {
    use super::*;
    use crate::{
        bins::updater::{BinUpdater, TrackBins, UpdateMode},
        tag::TagConfig,
    };

    /// 10 x 10 Cartesian grid of unit bins.
    fn database(tracks: &[(&str, Vec<(BinId, FieldFlags)>)]) -> Database {
        let config = TagConfig::builder("Q")
            .format("xy")
            .region(Region::new(0.0, 10.0, 0.0, 10.0))
            .build()
            .unwrap();
        let mut db = Database::new(config).unwrap();
        let batch: Vec<_> = tracks
            .iter()
            .map(|(name, bins)| TrackBins::new(name, bins.clone()))
            .collect();
        BinUpdater::new(&mut db, UpdateMode::Insert)
            .apply_batch(&batch)
            .unwrap();
        db
    }

    fn names(entries: &[&TrackEntry]) -> Vec<String> {
        entries.iter().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn test_predicate() {
        let p = FieldPredicate::all_of(0b011).none_of(0b100);
        assert!(p.matches(0b011));
        assert!(p.matches(0b1011));
        assert!(!p.matches(0b001));
        assert!(!p.matches(0b111));
        assert!(FieldPredicate::any().matches(0));
    }

    #[test]
    fn test_track_listing_uses_region_union() {
        let db = database(&[
            ("a", vec![(0, 0b01), (1, 0b10)]),
            ("b", vec![(1, 0b01), (55, 0b10)]),
            ("c", vec![(55, 0b11)]),
        ]);
        let q = BinQuery::new(&db);
        let row0 = Region::new(0.0, 2.0, 0.0, 1.0);

        let params = QueryParams::builder()
            .region(row0)
            .predicate(FieldPredicate::all_of(0b11))
            .build()
            .unwrap();
        assert_eq!(names(&q.tracks(&params)), vec!["a"]);

        let params = QueryParams::builder()
            .region(row0)
            .predicate(FieldPredicate::all_of(0b11))
            .global_flags(true)
            .build()
            .unwrap();
        assert_eq!(names(&q.tracks(&params)), vec!["a", "b"]);

        let all = QueryParams::default();
        assert_eq!(names(&q.tracks(&all)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_bin_centers_once_per_bin() {
        let db = database(&[("a", vec![(1, 1), (2, 2)]), ("b", vec![(1, 1)])]);
        let params = QueryParams::builder()
            .predicate(FieldPredicate::all_of(1))
            .build()
            .unwrap();
        let centers = BinQuery::new(&db).bin_centers(&params).unwrap();
        assert_eq!(centers, vec![(1.5, 0.5)]);
    }

    #[test]
    fn test_pairs() {
        let db = database(&[
            ("a", vec![(1, 1), (2, 1)]),
            ("b", vec![(2, 1), (3, 1)]),
            ("c", vec![(3, 1)]),
            ("d", vec![(9, 1)]),
        ]);
        let q = BinQuery::new(&db);
        let pair_names = |params: &QueryParams| -> Vec<(String, String)> {
            q.pairs(params)
                .iter()
                .map(|p| (p.first.name.clone(), p.second.name.clone()))
                .collect()
        };

        let all = QueryParams::default();
        assert_eq!(
            pair_names(&all),
            vec![("a".to_string(), "b".to_string()), ("b".to_string(), "c".to_string())]
        );

        let only_c = QueryParams::builder().subset(vec![2]).build().unwrap();
        assert_eq!(pair_names(&only_c), vec![("b".to_string(), "c".to_string())]);

        let with_self = QueryParams::builder()
            .region(Region::new(9.0, 10.0, 0.0, 1.0))
            .self_pairs(true)
            .build()
            .unwrap();
        assert_eq!(pair_names(&with_self), vec![("d".to_string(), "d".to_string())]);
    }
}
