//! Table rendering of a [`CoeReport`] with `comfy_table`.
//!
//! ```rust,ignore
//! let report = build_report(&db, &ReportParams::default())?;
//! println!("{}", report.table().sorted_by_rms(true).precision(4));
//! ```

use std::fmt;

use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};
use ordered_float::OrderedFloat;

use super::{CoeReport, TrackReport};
use crate::{format::fmt_g_prec, solver::SolveStats};

/// Display adaptor of a [`CoeReport`].
pub struct ReportTable<'a> {
    report: &'a CoeReport,
    precision: usize,
    sorted_by_rms: bool,
}

impl<'a> ReportTable<'a> {
    pub fn new(report: &'a CoeReport) -> Self {
        Self {
            report,
            precision: 6,
            sorted_by_rms: false,
        }
    }

    /// Significant digits of the statistics columns.
    pub fn precision(mut self, digits: usize) -> Self {
        self.precision = digits.max(1);
        self
    }

    /// List the tracks from the lowest to the highest rms.
    pub fn sorted_by_rms(mut self, yes: bool) -> Self {
        self.sorted_by_rms = yes;
        self
    }

    fn stats_cells(&self, stats: &SolveStats, weight: f64) -> Vec<Cell> {
        [stats.mean, stats.stdev, stats.rms, weight]
            .into_iter()
            .map(|v| Cell::new(fmt_g_prec(v, self.precision)).set_alignment(CellAlignment::Right))
            .collect()
    }

    fn render(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Track"),
            Cell::new("N").set_alignment(CellAlignment::Right),
            Cell::new(format!("Mean {}", self.report.field)),
            Cell::new("St.dev."),
            Cell::new("RMS"),
            Cell::new("Weight"),
        ]);

        let mut tracks: Vec<&TrackReport> = self.report.tracks.iter().collect();
        if self.sorted_by_rms {
            tracks.sort_by_key(|t| OrderedFloat(t.stats.rms));
        }
        for t in tracks {
            let mut cells = vec![
                Cell::new(&t.name),
                Cell::new(t.stats.n).set_alignment(CellAlignment::Right),
            ];
            cells.extend(self.stats_cells(&t.stats, t.weight));
            table.add_row(Row::from(cells));
        }

        let mut total = vec![
            Cell::new("TOTAL"),
            Cell::new(self.report.total.n).set_alignment(CellAlignment::Right),
        ];
        total.extend(self.stats_cells(&self.report.total, 1.0));
        table.add_row(Row::from(total));
        table.to_string()
    }
}

impl fmt::Display for ReportTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Crossover report for {} ({})", self.report.tag, self.report.field)?;
        write!(f, "{}", self.render())
    }
}

impl CoeReport {
    /// Table view of the report.
    pub fn table(&self) -> ReportTable<'_> {
        ReportTable::new(self)
    }
}

#[cfg(test)]
mod display_tests {
    use crate::{
        coe::coe_test_utils::{database, pair},
        report::{build_report, ReportParams},
    };

    #[test]
    fn test_table_contents() {
        let db = database(vec![
            pair("A", "B", &[(10.0, 20.0, 1.0, 0.0), (30.0, 40.0, -1.0, 0.0)]),
            pair("B", "C", &[(50.0, 20.0, 0.0, 2.0), (60.0, 40.0, 0.0, -2.0)]),
        ]);
        let report = build_report(&db, &ReportParams::default()).unwrap();
        let text = report.table().sorted_by_rms(true).to_string();
        assert!(text.starts_with("Crossover report for TEST (faa)"));
        assert!(text.contains("TOTAL"));
        assert!(text.contains("Mean faa"));
        // rms of A, B and C are 1, sqrt(2.5) and 2
        let pos = |name: &str| text.find(&format!("│ {name} ")).unwrap();
        assert!(pos("A") < pos("B"));
        assert!(pos("B") < pos("C"));
    }
}
