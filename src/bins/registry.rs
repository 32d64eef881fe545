//! # Track registry
//!
//! Name-sorted list of every track known to a database, with its dense numeric id and the
//! union of the data fields found along the track.
//!
//! Invariants
//! -----------------
//! * Entries are kept in strictly increasing name order (lookups are binary searches).
//! * Once persisted, ids form `0..n_tracks` without gaps or duplicates, see [`Registry::validate`].
//!
//! Id allocation
//! -----------------
//! [`Registry::assign_id`] hands out either an id freed earlier in the same update batch or
//! `max_id + 1`. Holes left by deletions that were not refilled are closed by
//! [`Registry::compact`] before saving.

use std::fmt;

use crate::{
    constants::{FieldFlags, TrackId},
    xover_errors::XoverError,
};

/// Track name as stored in the registry: directory and everything after the first `.` removed.
///
/// `data/a0012.mgd77` and `a0012.nc` both become `a0012`.
pub fn canonical_track_name(raw: &str) -> &str {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    base.split('.').next().unwrap_or(base)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEntry {
    pub name: String,
    pub id: TrackId,
    pub flags: FieldFlags,
}

impl fmt::Display for TrackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.name, self.id, self.flags)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: Vec<TrackEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
    }

    /// Id of the track called `name`, if registered.
    pub fn find(&self, name: &str) -> Option<TrackId> {
        self.get(name).map(|entry| entry.id)
    }

    pub fn get(&self, name: &str) -> Option<&TrackEntry> {
        self.position(name).ok().map(|pos| &self.entries[pos])
    }

    /// Entry holding `id` (linear scan).
    pub fn by_id(&self, id: TrackId) -> Option<&TrackEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn name_of(&self, id: TrackId) -> Option<&str> {
        self.by_id(id).map(|entry| entry.name.as_str())
    }

    /// Insert a track at its sorted position.
    ///
    /// Return
    /// ----------
    /// * [`XoverError::DuplicateTrack`] if the name is already registered.
    pub fn insert_sorted(
        &mut self,
        name: &str,
        id: TrackId,
        flags: FieldFlags,
    ) -> Result<(), XoverError> {
        match self.position(name) {
            Ok(_) => Err(XoverError::DuplicateTrack(name.to_string())),
            Err(pos) => {
                self.entries.insert(
                    pos,
                    TrackEntry {
                        name: name.to_string(),
                        id,
                        flags,
                    },
                );
                Ok(())
            }
        }
    }

    /// Remove a track by name and return its entry.
    pub fn remove(&mut self, name: &str) -> Result<TrackEntry, XoverError> {
        match self.position(name) {
            Ok(pos) => Ok(self.entries.remove(pos)),
            Err(_) => Err(XoverError::TrackNotFound(name.to_string())),
        }
    }

    /// Remove a track by id and return its entry.
    pub fn remove_id(&mut self, id: TrackId) -> Result<TrackEntry, XoverError> {
        match self.entries.iter().position(|entry| entry.id == id) {
            Some(pos) => Ok(self.entries.remove(pos)),
            None => Err(XoverError::TrackNotFound(format!("id {id}"))),
        }
    }

    /// One past the largest id in use, `0` for an empty registry.
    pub fn next_id(&self) -> TrackId {
        self.entries
            .iter()
            .map(|entry| entry.id + 1)
            .max()
            .unwrap_or(0)
    }

    /// Reuse an id freed in the current batch, or allocate the next one.
    pub fn assign_id(&self, reuse: Option<TrackId>) -> TrackId {
        reuse.unwrap_or_else(|| self.next_id())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackEntry> {
        self.entries.iter()
    }

    /// Track names indexed by id.
    ///
    /// Only meaningful on a registry that passes [`Registry::validate`]; missing ids yield `None`.
    pub fn names_by_id(&self) -> Vec<Option<&str>> {
        let mut names = vec![None; self.next_id() as usize];
        for entry in &self.entries {
            names[entry.id as usize] = Some(entry.name.as_str());
        }
        names
    }

    /// Check that ids are exactly `0..n_tracks` and names strictly sorted.
    pub fn validate(&self) -> Result<(), XoverError> {
        if let Some(w) = self.entries.windows(2).find(|w| w[0].name >= w[1].name) {
            return Err(XoverError::IdSpaceGap(format!(
                "registry not sorted at {} / {}",
                w[0].name, w[1].name
            )));
        }
        let n = self.entries.len();
        let mut seen = vec![false; n];
        for entry in &self.entries {
            let id = entry.id as usize;
            if id >= n {
                return Err(XoverError::IdSpaceGap(format!(
                    "track {} has id {id} but only {n} tracks are registered",
                    entry.name
                )));
            }
            if std::mem::replace(&mut seen[id], true) {
                return Err(XoverError::IdSpaceGap(format!(
                    "id {id} is used twice (second by {})",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    /// Renumber ids to `0..n_tracks`, preserving their relative order.
    ///
    /// Return
    /// ----------
    /// * A remap table indexed by old id: `Some(new_id)` for every id still in use.
    pub fn compact(&mut self) -> Vec<Option<TrackId>> {
        let mut old_ids: Vec<TrackId> = self.entries.iter().map(|entry| entry.id).collect();
        old_ids.sort_unstable();

        let mut remap = vec![None; self.next_id() as usize];
        for (new_id, &old_id) in old_ids.iter().enumerate() {
            remap[old_id as usize] = Some(new_id as TrackId);
        }
        for entry in &mut self.entries {
            if let Some(new_id) = remap[entry.id as usize] {
                entry.id = new_id;
            }
        }
        remap
    }

    /// True when some ids are missing from `0..n_tracks`.
    pub fn has_gaps(&self) -> bool {
        self.next_id() as usize != self.entries.len()
    }
}
