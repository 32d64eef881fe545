//! # Bin database
//!
//! The spatial side of the engine: which tracks visit which bins of a fixed grid.
//!
//! ## Modules
//!
//! - [`grid`] – Coordinate to bin mapping, region to bin ranges.
//! - [`registry`] – Name-sorted track registry with dense ids.
//! - [`bin_index`] – Sparse bin → tracks map.
//! - [`store`] – Tag, registry and index files, with backup-preserving replacement.
//! - [`updater`] – Bin-listing ingestion (insert, delete, replace).
//! - [`query`] – Track, bin-center and pair-candidate queries.
//!
//! ## Typical usage
//!
//! ```rust, no_run
//! use xoverdb::bins::{
//!     query::{BinQuery, FieldPredicate, QueryParams},
//!     store::Store,
//!     updater::{read_bin_listing_file, update_database, UpdateMode},
//! };
//! use camino::Utf8Path;
//!
//! let store = Store::from_env()?;
//! let db = store.load("MGD77")?;
//! let listing = read_bin_listing_file(Utf8Path::new("new_tracks.bix"), db.grid.n_bins())?;
//! let summary = update_database(&store, "MGD77", &listing, UpdateMode::Insert)?;
//! println!("{} tracks inserted", summary.inserted);
//!
//! let db = store.load("MGD77")?;
//! let params = QueryParams::builder()
//!     .predicate(FieldPredicate::all_of(0b100))
//!     .build()?;
//! for pair in BinQuery::new(&db).pairs(&params) {
//!     println!("{} {}", pair.first.name, pair.second.name);
//! }
//! # Ok::<(), xoverdb::xover_errors::XoverError>(())
//! ```

pub mod bin_index;
pub mod grid;
pub mod query;
pub mod registry;
pub mod store;
pub mod updater;

pub use grid::{BinCoord, BinGrid};
