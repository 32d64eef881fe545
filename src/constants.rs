//! # Constants and type definitions for xoverdb
//!
//! This module centralizes the **file layout names**, **numerical tolerances**, and **common type
//! aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - On-disk naming of a tagged database (`<TAG>/<TAG>.tag`, `<TAG>_tracks.d`, `<TAG>_index.b`)
//! - Tolerances used by the bin grid and the normal-equation solver
//! - Core type aliases for track ids, bin ids and field-presence flags
//!
//! These definitions are shared by the bin database ([`crate::bins`]), the crossover reader
//! ([`crate::coe`]) and the correction solver ([`crate::solver`]).

use std::collections::{HashMap, HashSet};

// -------------------------------------------------------------------------------------------------
// Database layout
// -------------------------------------------------------------------------------------------------

/// Environment variable holding the root directory of all tagged databases
pub const HOME_ENV_VAR: &str = "X2SYS_HOME";

/// Extension of the tag (configuration) file: `<TAG>/<TAG>.tag`
pub const TAG_EXTENSION: &str = "tag";

/// Suffix of the track registry file: `<TAG>/<TAG>_tracks.d`
pub const TRACKS_SUFFIX: &str = "_tracks.d";

/// Suffix of the packed bin index file: `<TAG>/<TAG>_index.b`
pub const INDEX_SUFFIX: &str = "_index.b";

/// Suffix appended to the previous generation of a database file
pub const BACKUP_SUFFIX: &str = "_old";

/// Suffix of the scratch file written before it is renamed into place
pub const TEMP_SUFFIX: &str = ".tmp";

/// Extension of the per-track adjustment spline files: `<track>.<field>.adj`
pub const ADJUST_EXTENSION: &str = "adj";

// -------------------------------------------------------------------------------------------------
// Numerical tolerances and conversions
// -------------------------------------------------------------------------------------------------

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Full longitude turn in degrees
pub const TURN_DEG: f64 = 360.0;

/// Tolerance used for floating-point comparisons of grid edges
pub const EPS: f64 = 1e-6;

/// Smallest admissible pivot magnitude in Gauss-Jordan elimination
pub const PIVOT_EPS: f64 = 1e-12;

/// Number of bits in one word of a [`crate::bitmatrix::BitMatrix`] row
pub const WORD_BITS: usize = 32;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Dense track identifier, in `[0, n_tracks)`
pub type TrackId = u32;

/// Bin identifier, `row * n_cols + col`
pub type BinId = u32;

/// Bitmask of data fields, one bit per field present
pub type FieldFlags = u32;

/// Angle in degrees
pub type Degree = f64;

/// Hash map with the `ahash` hasher, used for name lookups on hot paths
pub type FastHashMap<K, V> = HashMap<K, V, ahash::RandomState>;

/// Hash set with the `ahash` hasher
pub type FastHashSet<K> = HashSet<K, ahash::RandomState>;
