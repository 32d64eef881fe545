#![allow(dead_code)]

use std::fmt::Write;

use camino::Utf8PathBuf;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::TempDir;
use xoverdb::{
    bins::{
        store::{Database, Store},
        updater::TrackBins,
    },
    tag::{LonConvention, Region, TagConfig},
};

pub const SEED: u64 = 0x5EED_C0E;

/// Store rooted in a fresh temporary directory; keep the `TempDir` alive for the test.
pub fn temp_store() -> (TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let home = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, Store::new(home))
}

/// Cartesian 10 x 10 grid of unit bins.
pub fn cartesian_config(tag: &str) -> TagConfig {
    TagConfig::builder(tag)
        .format("xyz")
        .increment(1.0, 1.0)
        .region(Region::new(0.0, 10.0, 0.0, 10.0))
        .build()
        .unwrap()
}

pub fn geographic_config(tag: &str) -> TagConfig {
    TagConfig::builder(tag)
        .format("mgd77")
        .geographic(LonConvention::ZeroTo360)
        .increment(1.0, 1.0)
        .region(Region::GLOBAL_360)
        .build()
        .unwrap()
}

pub fn create_database(store: &Store, tag: &str) -> Database {
    store.create(cartesian_config(tag)).unwrap()
}

/// `n_tracks` tracks named `t000`, `t001`, ... visiting random bins of a `n_bins` grid.
pub fn random_tracks(rng: &mut StdRng, n_tracks: usize, n_bins: u32) -> Vec<TrackBins> {
    (0..n_tracks)
        .map(|k| {
            let n = rng.random_range(1..8);
            let bins = (0..n)
                .map(|_| (rng.random_range(0..n_bins), rng.random_range(1..8u32)))
                .collect();
            TrackBins::new(&format!("t{k:03}"), bins)
        })
        .collect()
}

pub fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

/// Text crossover database for the field `faa` where every track reads the true value plus its
/// own offset.
///
/// Arguments
/// -----------------
/// * `tag` – Value of the `# Tag:` line.
/// * `offsets` – `(track, offset)` for every track.
/// * `pairs` – Index pairs into `offsets`, each with its number of crossovers.
pub fn coe_database_text(
    rng: &mut StdRng,
    tag: &str,
    offsets: &[(&str, f64)],
    pairs: &[(usize, usize, usize)],
) -> String {
    let mut text = String::new();
    writeln!(text, "# Tag: {tag}").unwrap();
    writeln!(text, "# Command: x2sys_cross synthetic -T{tag}").unwrap();
    writeln!(
        text,
        "# lon lat t_1 t_2 dist_1 dist_2 head_1 head_2 vel_1 vel_2 faa_1 faa_2"
    )
    .unwrap();
    for &(a, b, n) in pairs {
        let ((name_a, off_a), (name_b, off_b)) = (offsets[a], offsets[b]);
        writeln!(
            text,
            "> {name_a}.mgd77 2001 {name_b}.mgd77 2002 NaN/NaN/500 NaN/NaN/500"
        )
        .unwrap();
        for _ in 0..n {
            let lon: f64 = rng.random_range(1.0..9.0);
            let lat: f64 = rng.random_range(1.0..9.0);
            let d1: f64 = rng.random_range(0.0..500.0);
            let d2: f64 = rng.random_range(0.0..500.0);
            let truth: f64 = rng.random_range(-50.0..50.0);
            writeln!(
                text,
                "{lon:.4} {lat:.4} NaN NaN {d1:.3} {d2:.3} 45 135 10 10 {:.6} {:.6}",
                truth + off_a,
                truth + off_b
            )
            .unwrap();
        }
    }
    text
}
