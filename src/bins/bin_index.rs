//! # Sparse bin index
//!
//! Maps a bin id to the tracks crossing that bin, each with the data fields present on the
//! segment of the track inside the bin.
//!
//! Invariants
//! -----------------
//! * A bin without tracks is never stored.
//! * A track appears at most once per bin; adding it again ORs the field flags.
//! * Members keep their insertion order, which is also the on-disk order.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::constants::{BinId, FieldFlags, TrackId};

/// One track inside one bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinMember {
    pub track_id: TrackId,
    pub flags: FieldFlags,
}

/// Tracks of a single bin; most bins hold only a handful.
pub type BinMembers = SmallVec<[BinMember; 4]>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinIndex {
    bins: BTreeMap<BinId, BinMembers>,
}

impl BinIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Register `track_id` in `bin_id`, merging the flags if it is already there.
    pub fn add_track_to_bin(&mut self, bin_id: BinId, track_id: TrackId, flags: FieldFlags) {
        let members = self.bins.entry(bin_id).or_default();
        match members.iter_mut().find(|m| m.track_id == track_id) {
            Some(member) => member.flags |= flags,
            None => members.push(BinMember { track_id, flags }),
        }
    }

    /// Drop every occurrence of `track_id`; bins left empty disappear.
    ///
    /// Return
    /// ----------
    /// * The number of bins the track was removed from.
    pub fn remove_track(&mut self, track_id: TrackId) -> usize {
        let mut removed = 0;
        self.bins.retain(|_, members| {
            let before = members.len();
            members.retain(|m| m.track_id != track_id);
            removed += before - members.len();
            !members.is_empty()
        });
        removed
    }

    pub fn tracks_in_bin(&self, bin_id: BinId) -> impl Iterator<Item = &BinMember> {
        self.bins.get(&bin_id).into_iter().flatten()
    }

    /// Non-empty bins in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (BinId, &[BinMember])> {
        self.bins.iter().map(|(&id, members)| (id, members.as_slice()))
    }

    /// Number of `(bin, track)` memberships.
    pub fn n_memberships(&self) -> usize {
        self.bins.values().map(|m| m.len()).sum()
    }

    pub fn max_track_id(&self) -> Option<TrackId> {
        self.bins
            .values()
            .flat_map(|members| members.iter().map(|m| m.track_id))
            .max()
    }

    /// Bins visited by `track_id`, ascending.
    pub fn bins_of_track(&self, track_id: TrackId) -> Vec<BinId> {
        self.iter()
            .filter(|(_, members)| members.iter().any(|m| m.track_id == track_id))
            .map(|(id, _)| id)
            .collect()
    }

    /// Rewrite track ids through a remap table indexed by old id.
    ///
    /// Members whose old id maps to `None` (or falls outside the table) are dropped.
    pub fn remap_tracks(&mut self, remap: &[Option<TrackId>]) {
        self.bins.retain(|_, members| {
            members.retain(|m| match remap.get(m.track_id as usize).copied().flatten() {
                Some(new_id) => {
                    m.track_id = new_id;
                    true
                }
                None => false,
            });
            !members.is_empty()
        });
    }
}
