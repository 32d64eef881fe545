//! # Bin updater
//!
//! Merges per-track bin listings into a loaded [`Database`], or removes tracks from it.
//!
//! Input format
//! -----------------
//! The bin listing is produced by an external per-track scanner:
//!
//! ```text
//! # comment
//! > a0012.mgd77
//! 12.5  -3.5  31692  5
//! 13.5  -3.5  31693  7
//! > b0077
//! ...
//! ```
//!
//! A `>` line starts a track (directory and extension are stripped from the name). Data lines
//! carry at least four fields, the third being the bin id and the fourth the field flags of the
//! track inside that bin. Malformed lines are skipped with a warning and counted.
//!
//! Modes
//! -----------------
//! * [`UpdateMode::Insert`] – New tracks are added; tracks already registered are skipped.
//! * [`UpdateMode::Delete`] – Registered tracks are removed; unknown ones are skipped.
//! * [`UpdateMode::Replace`] – Registered tracks are removed and re-inserted under the same id;
//!   unknown ones are inserted.
//!
//! Everything happens in memory. Ids left unused by deletions are closed at the end of the batch
//! so that the saved registry always holds `0..n_tracks`. Persist with
//! [`crate::bins::store::Store::save`], or use [`update_database`] which loads, applies and saves
//! only when something changed.

use std::io::BufRead;

use camino::Utf8Path;
use tracing::{info, warn};

use crate::{
    bins::{
        registry::{canonical_track_name, Registry},
        store::{Database, Store},
    },
    constants::{BinId, FieldFlags, TrackId},
    xover_errors::XoverError,
};

#[cfg(feature = "progress")]
use crate::progress_bar::BatchProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Insert,
    Delete,
    Replace,
}

/// Bins visited by one track, as read from a bin listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackBins {
    pub name: String,
    pub bins: Vec<(BinId, FieldFlags)>,
}

impl TrackBins {
    pub fn new(name: &str, bins: Vec<(BinId, FieldFlags)>) -> Self {
        Self {
            name: name.to_string(),
            bins,
        }
    }

    /// Union of the bin-local flags.
    pub fn track_flags(&self) -> FieldFlags {
        self.bins.iter().fold(0, |acc, &(_, flags)| acc | flags)
    }
}

/// Parsed bin listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinListing {
    pub tracks: Vec<TrackBins>,
    pub skipped_lines: usize,
}

/// Id of a batch entry as it moves through the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSlot {
    /// No id yet
    Fresh,
    /// The entry deleted its previous registration and may take that id back
    PendingReuse(TrackId),
    /// Id recorded in the registry
    Committed(TrackId),
}

impl IdSlot {
    /// Resolve the slot to the id recorded in the registry.
    fn commit(self, registry: &Registry) -> TrackId {
        match self {
            IdSlot::Fresh => registry.assign_id(None),
            IdSlot::PendingReuse(id) => registry.assign_id(Some(id)),
            IdSlot::Committed(id) => id,
        }
    }
}

/// Final state of one batch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Skipped,
    Inserted(TrackId),
    Replaced(TrackId),
    Deleted(TrackId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub memberships_added: usize,
    pub compacted: bool,
    pub outcomes: Vec<(String, TrackOutcome)>,
}

impl UpdateSummary {
    pub fn n_processed(&self) -> usize {
        self.outcomes.len()
    }

    /// True when the database content differs from what was loaded.
    pub fn is_modified(&self) -> bool {
        self.inserted + self.replaced + self.deleted > 0 || self.compacted
    }

    fn record(&mut self, name: &str, outcome: TrackOutcome) {
        match outcome {
            TrackOutcome::Skipped => self.skipped += 1,
            TrackOutcome::Inserted(_) => self.inserted += 1,
            TrackOutcome::Replaced(_) => self.replaced += 1,
            TrackOutcome::Deleted(_) => self.deleted += 1,
        }
        self.outcomes.push((name.to_string(), outcome));
    }
}

fn track_name(header: &str) -> Option<&str> {
    header
        .split_whitespace()
        .next()
        .map(canonical_track_name)
        .filter(|name| !name.is_empty())
}

/// Read a bin listing.
///
/// Arguments
/// -----------------
/// * `reader` – Source of the listing.
/// * `n_bins` – Number of bins of the target grid; larger bin ids are rejected.
///
/// Return
/// ----------
/// * The tracks in input order and the number of lines skipped as malformed.
pub fn read_bin_listing<R: BufRead>(reader: R, n_bins: usize) -> Result<BinListing, XoverError> {
    let mut listing = BinListing::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            match track_name(header) {
                Some(name) => listing.tracks.push(TrackBins::new(name, Vec::new())),
                None => {
                    warn!("Line {}: segment header without a track name", line_no + 1);
                    listing.skipped_lines += 1;
                }
            }
            continue;
        }

        match parse_bin_line(line, line_no + 1, n_bins) {
            Ok(entry) => match listing.tracks.last_mut() {
                Some(track) => track.bins.push(entry),
                None => {
                    warn!("Line {}: bin record before any track header", line_no + 1);
                    listing.skipped_lines += 1;
                }
            },
            Err(err) => {
                warn!("{err}, line skipped");
                listing.skipped_lines += 1;
            }
        }
    }
    Ok(listing)
}

pub fn read_bin_listing_file(path: &Utf8Path, n_bins: usize) -> Result<BinListing, XoverError> {
    let file = std::fs::File::open(path)?;
    read_bin_listing(std::io::BufReader::new(file), n_bins)
}

fn parse_bin_line(
    line: &str,
    line_no: usize,
    n_bins: usize,
) -> Result<(BinId, FieldFlags), XoverError> {
    let malformed = |reason: String| XoverError::MalformedRecord {
        line: line_no,
        reason,
    };
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(malformed(format!("expected 4 fields, found {}", fields.len())));
    }
    let bin: BinId = fields[2]
        .parse()
        .map_err(|_| malformed(format!("bad bin index {}", fields[2])))?;
    if bin as usize >= n_bins {
        return Err(malformed(format!("bin index {bin} beyond the {n_bins} bins of the grid")));
    }
    let flags: FieldFlags = fields[3]
        .parse()
        .map_err(|_| malformed(format!("bad field flags {}", fields[3])))?;
    Ok((bin, flags))
}

/// Applies batch entries to an in-memory database.
pub struct BinUpdater<'a> {
    db: &'a mut Database,
    mode: UpdateMode,
    summary: UpdateSummary,
}

impl<'a> BinUpdater<'a> {
    pub fn new(db: &'a mut Database, mode: UpdateMode) -> Self {
        Self {
            db,
            mode,
            summary: UpdateSummary::default(),
        }
    }

    /// Apply one entry.
    ///
    /// Return
    /// ----------
    /// * The outcome of the entry. Errors are structural (bin id outside the grid, registry
    ///   inconsistency) and leave the batch unusable.
    pub fn apply(&mut self, track: &TrackBins) -> Result<TrackOutcome, XoverError> {
        let n_bins = self.db.grid.n_bins();
        if self.mode != UpdateMode::Delete {
            if let Some(&(bin, _)) = track.bins.iter().find(|(bin, _)| *bin as usize >= n_bins) {
                return Err(XoverError::BadBinIndex(format!(
                    "track {} lists bin {bin} beyond the {n_bins} bins of the grid",
                    track.name
                )));
            }
        }
        let existing = self.db.registry.find(&track.name);

        let slot = match (self.mode, existing) {
            (UpdateMode::Insert, Some(id)) => {
                warn!("Track {} already registered with id {id}, skipped", track.name);
                return Ok(self.finish(track, TrackOutcome::Skipped));
            }
            (UpdateMode::Delete, None) => {
                warn!("Track {} is not registered, nothing to delete", track.name);
                return Ok(self.finish(track, TrackOutcome::Skipped));
            }
            (UpdateMode::Delete, Some(id)) => {
                self.unregister(&track.name, id)?;
                return Ok(self.finish(track, TrackOutcome::Deleted(id)));
            }
            (UpdateMode::Replace, Some(id)) => {
                self.unregister(&track.name, id)?;
                IdSlot::PendingReuse(id)
            }
            (_, None) => IdSlot::Fresh,
        };
        let reused = matches!(slot, IdSlot::PendingReuse(_));

        let id = slot.commit(&self.db.registry);
        for &(bin, flags) in &track.bins {
            self.db.index.add_track_to_bin(bin, id, flags);
        }
        self.db
            .registry
            .insert_sorted(&track.name, id, track.track_flags())?;
        self.summary.memberships_added += track.bins.len();

        let outcome = if reused {
            TrackOutcome::Replaced(id)
        } else {
            TrackOutcome::Inserted(id)
        };
        Ok(self.finish(track, outcome))
    }

    fn unregister(&mut self, name: &str, id: TrackId) -> Result<(), XoverError> {
        self.db.index.remove_track(id);
        self.db.registry.remove(name)?;
        Ok(())
    }

    fn finish(&mut self, track: &TrackBins, outcome: TrackOutcome) -> TrackOutcome {
        self.summary.record(&track.name, outcome);
        outcome
    }

    /// Apply a whole batch and close any hole left in the id space.
    pub fn apply_batch(mut self, tracks: &[TrackBins]) -> Result<UpdateSummary, XoverError> {
        #[cfg(feature = "progress")]
        let mut progress = BatchProgress::new(tracks.len());

        for track in tracks {
            self.apply(track)?;
            #[cfg(feature = "progress")]
            progress.step(&track.name);
        }

        #[cfg(feature = "progress")]
        progress.finish();

        Ok(self.finish_batch())
    }

    /// Compact ids if needed and return the summary.
    pub fn finish_batch(mut self) -> UpdateSummary {
        if self.db.registry.has_gaps() {
            let remap = self.db.registry.compact();
            self.db.index.remap_tracks(&remap);
            self.summary.compacted = true;
        }
        let s = &self.summary;
        info!(
            "Processed {} tracks: {} inserted, {} replaced, {} deleted, {} skipped",
            s.n_processed(),
            s.inserted,
            s.replaced,
            s.deleted,
            s.skipped
        );
        self.summary
    }
}

/// Load a database, apply a bin listing and save it back if anything changed.
pub fn update_database(
    store: &Store,
    tag: &str,
    listing: &BinListing,
    mode: UpdateMode,
) -> Result<UpdateSummary, XoverError> {
    let mut db = store.load(tag)?;
    let summary = BinUpdater::new(&mut db, mode).apply_batch(&listing.tracks)?;
    if summary.is_modified() {
        store.save(&db)?;
    } else {
        info!("Database {tag} unchanged, nothing saved");
    }
    Ok(summary)
}
