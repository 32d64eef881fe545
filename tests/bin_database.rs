mod common;

use std::collections::BTreeSet;

use common::{create_database, random_tracks, seeded_rng, temp_store};
use xoverdb::bins::{
    query::{BinQuery, FieldPredicate, QueryParams},
    store::encode_index,
    updater::{read_bin_listing, update_database, BinListing, BinUpdater, TrackBins, UpdateMode},
};
use xoverdb::tag::Region;

fn listing(tracks: Vec<TrackBins>) -> BinListing {
    BinListing {
        tracks,
        skipped_lines: 0,
    }
}

#[test]
fn test_two_track_scenario() {
    let (_dir, store) = temp_store();
    create_database(&store, "AB");

    let text = "> A.xyz\n0.5 0.5 1 1\n0.5 0.5 2 1\n> B.xyz\n0.5 0.5 2 1\n0.5 0.5 3 1\n";
    let batch = read_bin_listing(text.as_bytes(), 100).unwrap();
    let summary = update_database(&store, "AB", &batch, UpdateMode::Insert).unwrap();
    assert_eq!(summary.inserted, 2);

    let db = store.load("AB").unwrap();
    let bin_two = QueryParams::builder()
        .region(Region::new(2.2, 2.8, 0.2, 0.8))
        .predicate(FieldPredicate::all_of(0b01))
        .build()
        .unwrap();
    let query = BinQuery::new(&db);
    let names: Vec<&str> = query
        .tracks(&bin_two)
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, vec!["A", "B"]);
    let pairs = query.pairs(&bin_two);
    assert_eq!(pairs.len(), 1);
    assert_eq!((pairs[0].first.name.as_str(), pairs[0].second.name.as_str()), ("A", "B"));

    let delete = listing(vec![TrackBins::new("A", Vec::new())]);
    let summary = update_database(&store, "AB", &delete, UpdateMode::Delete).unwrap();
    assert_eq!(summary.deleted, 1);
    assert!(summary.compacted);

    let db = store.load("AB").unwrap();
    let names: Vec<&str> = BinQuery::new(&db)
        .tracks(&bin_two)
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, vec!["B"]);
    assert_eq!(db.registry.find("B"), Some(0));
    assert_eq!(db.index.tracks_in_bin(1).count(), 0);
    assert_eq!(db.index.iter().map(|(bin, _)| bin).collect::<Vec<_>>(), vec![2, 3]);
}

#[test]
fn test_saved_files_round_trip() {
    let (_dir, store) = temp_store();
    let mut db = create_database(&store, "RT");
    let mut rng = seeded_rng();
    let tracks = random_tracks(&mut rng, 25, db.grid.n_bins() as u32);
    BinUpdater::new(&mut db, UpdateMode::Insert)
        .apply_batch(&tracks)
        .unwrap();
    store.save(&db).unwrap();

    let loaded = store.load("RT").unwrap();
    assert_eq!(loaded.registry, db.registry);
    assert_eq!(loaded.index, db.index);
    let on_disk = std::fs::read(store.index_file("RT")).unwrap();
    assert_eq!(on_disk, encode_index(&loaded.index));

    // a second save of the loaded image writes the same bytes
    let registry_before = std::fs::read(store.tracks_file("RT")).unwrap();
    store.save(&loaded).unwrap();
    assert_eq!(std::fs::read(store.index_file("RT")).unwrap(), on_disk);
    assert_eq!(std::fs::read(store.tracks_file("RT")).unwrap(), registry_before);
}

#[test]
fn test_index_is_sparse_and_ids_dense() {
    let (_dir, store) = temp_store();
    let mut db = create_database(&store, "SP");
    let mut rng = seeded_rng();
    let tracks = random_tracks(&mut rng, 40, db.grid.n_bins() as u32);
    BinUpdater::new(&mut db, UpdateMode::Insert)
        .apply_batch(&tracks)
        .unwrap();

    let visited: BTreeSet<u32> = tracks
        .iter()
        .flat_map(|t| t.bins.iter().map(|(bin, _)| *bin))
        .collect();
    assert_eq!(db.index.len(), visited.len());
    assert!(db.index.iter().all(|(_, members)| !members.is_empty()));

    // delete every third track; survivors are renumbered without holes
    let doomed: Vec<TrackBins> = tracks
        .iter()
        .step_by(3)
        .map(|t| TrackBins::new(&t.name, Vec::new()))
        .collect();
    let summary = BinUpdater::new(&mut db, UpdateMode::Delete)
        .apply_batch(&doomed)
        .unwrap();
    assert_eq!(summary.deleted, doomed.len());
    assert!(db.registry.validate().is_ok());
    let mut ids: Vec<u32> = db.registry.iter().map(|e| e.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..db.registry.len() as u32).collect::<Vec<_>>());
    assert!(db.validate().is_ok());
    store.save(&db).unwrap();
}

#[test]
fn test_pairs_match_shared_bins() {
    let (_dir, store) = temp_store();
    let mut db = create_database(&store, "PQ");
    let mut rng = seeded_rng();
    let tracks = random_tracks(&mut rng, 30, db.grid.n_bins() as u32);
    BinUpdater::new(&mut db, UpdateMode::Insert)
        .apply_batch(&tracks)
        .unwrap();

    let mut expected = BTreeSet::new();
    for (i, a) in tracks.iter().enumerate() {
        for b in &tracks[i + 1..] {
            let shared = a
                .bins
                .iter()
                .any(|(bin, _)| b.bins.iter().any(|(other, _)| other == bin));
            if shared {
                let (ia, ib) = (db.registry.find(&a.name).unwrap(), db.registry.find(&b.name).unwrap());
                expected.insert((ia.min(ib), ia.max(ib)));
            }
        }
    }

    let found: BTreeSet<(u32, u32)> = BinQuery::new(&db)
        .pairs(&QueryParams::default())
        .iter()
        .map(|p| (p.first.id, p.second.id))
        .collect();
    assert_eq!(found, expected);
}

#[test]
fn test_repeated_insert_is_idempotent() {
    let (_dir, store) = temp_store();
    let db = create_database(&store, "ID");
    let mut rng = seeded_rng();
    let batch = listing(random_tracks(&mut rng, 10, db.grid.n_bins() as u32));

    let first = update_database(&store, "ID", &batch, UpdateMode::Insert).unwrap();
    assert_eq!(first.inserted, 10);
    let index_bytes = std::fs::read(store.index_file("ID")).unwrap();
    let registry_bytes = std::fs::read(store.tracks_file("ID")).unwrap();

    let second = update_database(&store, "ID", &batch, UpdateMode::Insert).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 10);
    assert!(!second.is_modified());
    assert_eq!(std::fs::read(store.index_file("ID")).unwrap(), index_bytes);
    assert_eq!(std::fs::read(store.tracks_file("ID")).unwrap(), registry_bytes);
}

#[test]
fn test_replace_keeps_id() {
    let (_dir, store) = temp_store();
    create_database(&store, "RP");
    let batch = listing(vec![
        TrackBins::new("a", vec![(1, 1)]),
        TrackBins::new("b", vec![(2, 1)]),
    ]);
    update_database(&store, "RP", &batch, UpdateMode::Insert).unwrap();
    let before = store.load("RP").unwrap().registry.find("a");

    let replace = listing(vec![TrackBins::new("a", vec![(5, 4), (6, 4)])]);
    let summary = update_database(&store, "RP", &replace, UpdateMode::Replace).unwrap();
    assert_eq!(summary.replaced, 1);

    let db = store.load("RP").unwrap();
    let id = db.registry.find("a");
    assert_eq!(id, before);
    assert_eq!(db.registry.get("a").unwrap().flags, 4);
    assert_eq!(db.index.bins_of_track(id.unwrap()), vec![5, 6]);
}
