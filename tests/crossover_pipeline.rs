mod common;

use approx::assert_relative_eq;
use camino::Utf8Path;
use common::{coe_database_text, geographic_config, seeded_rng};
use xoverdb::{
    coe::{
        dbase_reader::{read_coe_database, ReadParams},
        listing::{extract_records, write_solver_listing, ListingParams, TrackWeights},
        CoeDatabase,
    },
    report::{
        adjust::{adjustment_splines, write_adjustment_files},
        build_report, ReportParams,
    },
    solver::{
        records::read_solver_table, solve, CorrectionModel, SolveParams,
    },
};

const OFFSETS: [(&str, f64); 4] = [("ship1", 1.5), ("ship2", -0.5), ("ship3", -1.0), ("ship4", 0.0)];

fn read_text(text: &str) -> CoeDatabase {
    let params = ReadParams::builder("faa").build().unwrap();
    read_coe_database(text.as_bytes(), &geographic_config("SYN"), &params).unwrap()
}

#[test]
fn test_constant_offsets_recovered_through_solver_table() {
    let mut rng = seeded_rng();
    let text = coe_database_text(
        &mut rng,
        "SYN",
        &OFFSETS,
        &[(0, 1, 4), (1, 2, 3), (2, 3, 5), (0, 2, 2), (3, 1, 3)],
    );
    let db = read_text(&text);
    assert_eq!(db.n_tracks(), 4);
    assert_eq!(db.n_crossovers(), 17);

    let params = ListingParams::builder().build().unwrap();
    let mut table = Vec::new();
    let listed = write_solver_listing(&mut table, &db, CorrectionModel::Constant, &params).unwrap();
    assert_eq!(listed.n_crossovers(), 17);

    let solve_params = SolveParams::default();
    let input = read_solver_table(table.as_slice(), "SYN", "faa", &solve_params).unwrap();
    assert_eq!(input.records, listed.records);

    let corrections = solve(&input, &solve_params).unwrap();
    assert_eq!(corrections.summary.n_clusters, 1);
    assert_eq!(corrections.summary.n_unknowns, 5);
    for (name, offset) in OFFSETS {
        let c = corrections.get(name).unwrap();
        assert_relative_eq!(c.coefficients[0], offset, epsilon = 1e-5);
    }
    assert!(corrections.before.rms > 0.5);
    assert_relative_eq!(corrections.after.rms, 0.0, epsilon = 1e-5);
}

#[test]
fn test_disconnected_surveys_get_one_constraint_each() {
    let mut rng = seeded_rng();
    // ship1-ship2 and ship3-ship4 never cross each other
    let text = coe_database_text(&mut rng, "SYN", &OFFSETS, &[(0, 1, 3), (2, 3, 3)]);
    let db = read_text(&text);
    let input = extract_records(&db, CorrectionModel::Constant, &TrackWeights::default()).unwrap();
    let corrections = solve(&input, &SolveParams::default()).unwrap();

    assert_eq!(corrections.summary.n_clusters, 2);
    assert_eq!(corrections.summary.n_unknowns, 4 + 2);
    // each survey is solved up to its own mean
    assert_relative_eq!(corrections.get("ship1").unwrap().coefficients[0], 1.0, epsilon = 1e-5);
    assert_relative_eq!(corrections.get("ship2").unwrap().coefficients[0], -1.0, epsilon = 1e-5);
    assert_relative_eq!(corrections.get("ship3").unwrap().coefficients[0], -0.5, epsilon = 1e-5);
    assert_relative_eq!(corrections.get("ship4").unwrap().coefficients[0], 0.5, epsilon = 1e-5);
}

#[test]
fn test_chain_forms_single_cluster() {
    let mut rng = seeded_rng();
    // ship1 - ship2 - ship3 only
    let text = coe_database_text(&mut rng, "SYN", &OFFSETS[..3], &[(0, 1, 2), (1, 2, 2)]);
    let db = read_text(&text);
    let input = extract_records(&db, CorrectionModel::Constant, &TrackWeights::default()).unwrap();
    let corrections = solve(&input, &SolveParams::default()).unwrap();
    assert_eq!(corrections.summary.n_clusters, 1);
    assert_eq!(corrections.summary.n_unknowns, 3 + 1);
}

#[test]
fn test_report_and_adjustment_files() {
    let mut rng = seeded_rng();
    let text = coe_database_text(
        &mut rng,
        "SYN",
        &OFFSETS,
        &[(0, 1, 4), (1, 2, 4), (2, 3, 4), (3, 0, 4)],
    );
    let db = read_text(&text);
    let report = build_report(&db, &ReportParams::builder().min_crossovers(5).build().unwrap())
        .unwrap();
    assert_eq!(report.tracks.len(), 4);
    assert_eq!(report.total.n, 16);
    let mean_weight = report.tracks.iter().map(|t| t.weight).sum::<f64>() / 4.0;
    assert_relative_eq!(mean_weight, 1.0, epsilon = 1e-12);

    let dir = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(dir.path()).unwrap();
    let adjustments = adjustment_splines(&db, &report);
    let paths = write_adjustment_files(dir, "faa", &adjustments).unwrap();
    assert_eq!(paths.len(), 4);
    assert!(dir.join("ship1.faa.adj").is_file());

    let first = std::fs::read_to_string(&paths[0]).unwrap();
    let knots: Vec<(f64, f64)> = first
        .lines()
        .map(|l| {
            let (d, c) = l.split_once('\t').unwrap();
            (d.parse().unwrap(), c.parse().unwrap())
        })
        .collect();
    assert_eq!(knots.first(), Some(&(0.0, 0.0)));
    assert_eq!(knots.last(), Some(&(500.0, 0.0)));
    assert!(knots.windows(2).all(|w| w[0].0 < w[1].0));
}
