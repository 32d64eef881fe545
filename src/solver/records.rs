//! # Solver records
//!
//! One record per crossover, holding only the values the selected [`CorrectionModel`] needs.
//!
//! The solver table is tab-delimited text:
//!
//! ```text
//! # Tag: MGD77 faa
//! # trk_1	trk_2	dist_1	dist_2	faa	weight
//! a0012	b0200	120.5	433	1.5	0.7071
//! ```
//!
//! | model | columns after the two track names |
//! |---|---|
//! | constant | `coe` |
//! | distance / time drift | `x_1 x_2 coe` |
//! | latitude | `lat coe` |
//! | heading | `head_1 head_2 coe` |
//! | scale, scale+offset | `z_1 z_2` (the error is `z_1 - z_2`) |
//!
//! The trailing weight column is optional and defaults to 1. Records whose error is `NaN` and
//! rows that do not parse are skipped.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Write},
};

use camino::Utf8Path;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use super::{CorrectionModel, SolveParams};
use crate::{constants::FastHashMap, xover_errors::XoverError};

/// Model-specific values of one crossover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordTerms {
    Constant,
    /// Distance or time (since track start) on each side
    Drift([f64; 2]),
    /// Latitude of the crossover
    Latitude(f64),
    /// Heading on each side, degrees
    Heading([f64; 2]),
    /// Observed value on each side
    Scale([f64; 2]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverRecord {
    /// Ids of track one and two in [`SolverInput::tracks`]
    pub tracks: [usize; 2],
    pub coe: f64,
    pub weight: f64,
    pub terms: RecordTerms,
}

/// Everything the solver needs: named tracks and their crossover records.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverInput {
    pub tag: String,
    pub field: String,
    pub model: CorrectionModel,
    pub tracks: Vec<String>,
    pub records: Vec<SolverRecord>,
}

impl SolverInput {
    pub fn n_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn n_crossovers(&self) -> usize {
        self.records.len()
    }

    /// Crossovers touching each track; an internal crossover counts twice.
    pub fn crossings_per_track(&self) -> Vec<usize> {
        let mut counts = vec![0; self.tracks.len()];
        for rec in &self.records {
            counts[rec.tracks[0]] += 1;
            counts[rec.tracks[1]] += 1;
        }
        counts
    }

    /// Check that ids are in range and every record fits the model.
    pub fn validate(&self) -> Result<(), XoverError> {
        let n = self.tracks.len();
        for (k, rec) in self.records.iter().enumerate() {
            if rec.tracks.iter().any(|&id| id >= n) {
                return Err(XoverError::InvalidParameter(format!(
                    "record {k} refers to track {:?} but only {n} tracks are known",
                    rec.tracks
                )));
            }
            if !self.model.accepts(&rec.terms) {
                return Err(XoverError::InvalidParameter(format!(
                    "record {k} does not carry the values of a {} model",
                    self.model
                )));
            }
        }
        Ok(())
    }
}

fn unit_weight() -> f64 {
    1.0
}

// -------------------------------------------------------------------------------------------------
// Table rows
// -------------------------------------------------------------------------------------------------

/// One line of the solver table for a given model.
trait TableRow: Serialize + DeserializeOwned {
    fn into_parts(self) -> ([String; 2], f64, f64, RecordTerms);

    fn from_parts(names: [&str; 2], rec: &SolverRecord) -> Option<Self>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ConstantRow {
    trk_1: String,
    trk_2: String,
    coe: f64,
    #[serde(default = "unit_weight")]
    weight: f64,
}

impl TableRow for ConstantRow {
    fn into_parts(self) -> ([String; 2], f64, f64, RecordTerms) {
        ([self.trk_1, self.trk_2], self.coe, self.weight, RecordTerms::Constant)
    }

    fn from_parts(names: [&str; 2], rec: &SolverRecord) -> Option<Self> {
        matches!(rec.terms, RecordTerms::Constant).then(|| ConstantRow {
            trk_1: names[0].to_string(),
            trk_2: names[1].to_string(),
            coe: rec.coe,
            weight: rec.weight,
        })
    }
}

/// Drift and heading rows: one value per side, then the error.
#[derive(Debug, Serialize, Deserialize)]
struct SidedRow {
    trk_1: String,
    trk_2: String,
    v_1: f64,
    v_2: f64,
    coe: f64,
    #[serde(default = "unit_weight")]
    weight: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent)]
struct DriftRow(SidedRow);

#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent)]
struct HeadingRow(SidedRow);

impl SidedRow {
    fn new(names: [&str; 2], values: [f64; 2], rec: &SolverRecord) -> Self {
        SidedRow {
            trk_1: names[0].to_string(),
            trk_2: names[1].to_string(),
            v_1: values[0],
            v_2: values[1],
            coe: rec.coe,
            weight: rec.weight,
        }
    }
}

impl TableRow for DriftRow {
    fn into_parts(self) -> ([String; 2], f64, f64, RecordTerms) {
        let r = self.0;
        ([r.trk_1, r.trk_2], r.coe, r.weight, RecordTerms::Drift([r.v_1, r.v_2]))
    }

    fn from_parts(names: [&str; 2], rec: &SolverRecord) -> Option<Self> {
        match rec.terms {
            RecordTerms::Drift(x) => Some(DriftRow(SidedRow::new(names, x, rec))),
            _ => None,
        }
    }
}

impl TableRow for HeadingRow {
    fn into_parts(self) -> ([String; 2], f64, f64, RecordTerms) {
        let r = self.0;
        ([r.trk_1, r.trk_2], r.coe, r.weight, RecordTerms::Heading([r.v_1, r.v_2]))
    }

    fn from_parts(names: [&str; 2], rec: &SolverRecord) -> Option<Self> {
        match rec.terms {
            RecordTerms::Heading(h) => Some(HeadingRow(SidedRow::new(names, h, rec))),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LatitudeRow {
    trk_1: String,
    trk_2: String,
    lat: f64,
    coe: f64,
    #[serde(default = "unit_weight")]
    weight: f64,
}

impl TableRow for LatitudeRow {
    fn into_parts(self) -> ([String; 2], f64, f64, RecordTerms) {
        (
            [self.trk_1, self.trk_2],
            self.coe,
            self.weight,
            RecordTerms::Latitude(self.lat),
        )
    }

    fn from_parts(names: [&str; 2], rec: &SolverRecord) -> Option<Self> {
        match rec.terms {
            RecordTerms::Latitude(lat) => Some(LatitudeRow {
                trk_1: names[0].to_string(),
                trk_2: names[1].to_string(),
                lat,
                coe: rec.coe,
                weight: rec.weight,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ScaleRow {
    trk_1: String,
    trk_2: String,
    z_1: f64,
    z_2: f64,
    #[serde(default = "unit_weight")]
    weight: f64,
}

impl TableRow for ScaleRow {
    fn into_parts(self) -> ([String; 2], f64, f64, RecordTerms) {
        (
            [self.trk_1, self.trk_2],
            self.z_1 - self.z_2,
            self.weight,
            RecordTerms::Scale([self.z_1, self.z_2]),
        )
    }

    fn from_parts(names: [&str; 2], rec: &SolverRecord) -> Option<Self> {
        match rec.terms {
            RecordTerms::Scale(z) => Some(ScaleRow {
                trk_1: names[0].to_string(),
                trk_2: names[1].to_string(),
                z_1: z[0],
                z_2: z[1],
                weight: rec.weight,
            }),
            _ => None,
        }
    }
}

/// Column names written in the comment line of the table.
fn column_names(model: CorrectionModel, field: &str) -> Vec<String> {
    let mut cols = vec!["trk_1".to_string(), "trk_2".to_string()];
    match model {
        CorrectionModel::Constant => cols.push(field.to_string()),
        CorrectionModel::DistanceDrift => cols.extend(["dist_1".into(), "dist_2".into(), field.into()]),
        CorrectionModel::TimeDrift => cols.extend(["t_1".into(), "t_2".into(), field.into()]),
        CorrectionModel::Latitude => cols.extend(["lat".into(), field.into()]),
        CorrectionModel::Heading => cols.extend(["head_1".into(), "head_2".into(), field.into()]),
        CorrectionModel::Scale | CorrectionModel::ScaleOffset => {
            cols.extend([format!("{field}_1"), format!("{field}_2")])
        }
    }
    cols.push("weight".into());
    cols
}

// -------------------------------------------------------------------------------------------------
// Reading
// -------------------------------------------------------------------------------------------------

fn read_rows<T: TableRow, R: Read>(
    reader: R,
    use_weights: bool,
    tracks: &mut Vec<String>,
) -> Result<Vec<SolverRecord>, XoverError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut ids: FastHashMap<String, usize> = FastHashMap::default();
    let mut records = Vec::new();
    let mut n_nan = 0usize;
    let mut n_bad = 0usize;

    for row in csv_reader.deserialize::<T>() {
        let row = match row {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                warn!("Line {line}: malformed solver record skipped ({e})");
                n_bad += 1;
                continue;
            }
        };
        let (names, coe, weight, terms) = row.into_parts();
        if coe.is_nan() {
            n_nan += 1;
            continue;
        }
        let mut pair = [0usize; 2];
        for (slot, name) in pair.iter_mut().zip(names) {
            *slot = match ids.get(&name) {
                Some(&id) => id,
                None => {
                    let id = tracks.len();
                    ids.insert(name.clone(), id);
                    tracks.push(name);
                    id
                }
            };
        }
        records.push(SolverRecord {
            tracks: pair,
            coe,
            weight: if use_weights { weight } else { 1.0 },
            terms,
        });
    }
    if n_nan > 0 {
        warn!("{n_nan} crossovers with a NaN error skipped while reading the solver table");
    }
    if n_bad > 0 {
        warn!("{n_bad} malformed rows skipped while reading the solver table");
    }
    Ok(records)
}

/// Read a solver table.
///
/// Arguments
/// -----------------
/// * `reader` – Table text, starting with the `# Tag: <TAG> <field>` line.
/// * `tag`, `field` – Expected tag and data field.
/// * `params` – Model of the table and whether its weight column is used.
///
/// Return
/// ----------
/// * The records with tracks numbered in order of first appearance.
/// * [`XoverError::TagMismatch`] or [`XoverError::MissingColumn`] if the first line names
///   another tag or field, [`XoverError::CsvError`] if the table cannot be read. Malformed
///   rows are skipped with a warning.
pub fn read_solver_table<R: BufRead>(
    mut reader: R,
    tag: &str,
    field: &str,
    params: &SolveParams,
) -> Result<SolverInput, XoverError> {
    let mut first = String::new();
    reader.read_line(&mut first)?;
    let mut words = first
        .trim()
        .strip_prefix("# Tag:")
        .unwrap_or_default()
        .split_whitespace();
    let (found_tag, found_field) = (words.next().unwrap_or(""), words.next().unwrap_or(""));
    if found_tag != tag {
        return Err(XoverError::TagMismatch {
            expected: tag.to_string(),
            found: found_tag.to_string(),
        });
    }
    if found_field != field {
        return Err(XoverError::MissingColumn(format!(
            "{field}: solver table holds '{found_field}'"
        )));
    }

    let mut tracks = Vec::new();
    let w = params.use_weights;
    let records = match params.model {
        CorrectionModel::Constant => read_rows::<ConstantRow, _>(reader, w, &mut tracks)?,
        CorrectionModel::DistanceDrift | CorrectionModel::TimeDrift => {
            read_rows::<DriftRow, _>(reader, w, &mut tracks)?
        }
        CorrectionModel::Latitude => read_rows::<LatitudeRow, _>(reader, w, &mut tracks)?,
        CorrectionModel::Heading => read_rows::<HeadingRow, _>(reader, w, &mut tracks)?,
        CorrectionModel::Scale | CorrectionModel::ScaleOffset => {
            read_rows::<ScaleRow, _>(reader, w, &mut tracks)?
        }
    };
    info!(
        "Found {} {field} crossover records over {} tracks",
        records.len(),
        tracks.len()
    );

    Ok(SolverInput {
        tag: tag.to_string(),
        field: field.to_string(),
        model: params.model,
        tracks,
        records,
    })
}

/// [`read_solver_table`] on a file.
pub fn read_solver_table_file(
    path: &Utf8Path,
    tag: &str,
    field: &str,
    params: &SolveParams,
) -> Result<SolverInput, XoverError> {
    let file = File::open(path)?;
    read_solver_table(BufReader::new(file), tag, field, params)
}

// -------------------------------------------------------------------------------------------------
// Writing
// -------------------------------------------------------------------------------------------------

fn write_rows<T: TableRow, W: Write>(
    writer: W,
    input: &SolverInput,
) -> Result<(), XoverError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(writer);
    for rec in &input.records {
        let names = [
            input.tracks[rec.tracks[0]].as_str(),
            input.tracks[rec.tracks[1]].as_str(),
        ];
        let row = T::from_parts(names, rec).ok_or_else(|| {
            XoverError::InvalidParameter(format!(
                "record {names:?} does not carry the values of a {} model",
                input.model
            ))
        })?;
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write `input` as a solver table readable by [`read_solver_table`].
pub fn write_solver_table<W: Write>(mut writer: W, input: &SolverInput) -> Result<(), XoverError> {
    input.validate()?;
    writeln!(writer, "# Tag: {} {}", input.tag, input.field)?;
    writeln!(writer, "# {}", column_names(input.model, &input.field).join("\t"))?;
    match input.model {
        CorrectionModel::Constant => write_rows::<ConstantRow, _>(writer, input),
        CorrectionModel::DistanceDrift | CorrectionModel::TimeDrift => {
            write_rows::<DriftRow, _>(writer, input)
        }
        CorrectionModel::Latitude => write_rows::<LatitudeRow, _>(writer, input),
        CorrectionModel::Heading => write_rows::<HeadingRow, _>(writer, input),
        CorrectionModel::Scale | CorrectionModel::ScaleOffset => {
            write_rows::<ScaleRow, _>(writer, input)
        }
    }
}

#[cfg(test)]
mod records_tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn params(model: CorrectionModel, use_weights: bool) -> SolveParams {
        SolveParams::builder()
            .model(model)
            .use_weights(use_weights)
            .build()
            .unwrap()
    }

    #[test]
    fn test_read_drift_table() {
        let text = "# Tag: TEST faa\n# trk_1\ttrk_2\tdist_1\tdist_2\tfaa\tweight\n\
                    a\tb\t10\t20\t1.5\t0.5\n\
                    b\tc\t5\t7\tNaN\t1\n\
                    c\ta\t1\t2\t-0.5\n";
        let input = read_solver_table(
            Cursor::new(text),
            "TEST",
            "faa",
            &params(CorrectionModel::DistanceDrift, true),
        )
        .unwrap();
        assert_eq!(input.tracks, vec!["a", "b", "c"]);
        assert_eq!(input.n_crossovers(), 2);
        assert_eq!(input.records[0].terms, RecordTerms::Drift([10.0, 20.0]));
        assert_relative_eq!(input.records[0].weight, 0.5);
        assert_relative_eq!(input.records[1].weight, 1.0);
        assert_eq!(input.records[1].tracks, [2, 0]);
        assert_eq!(input.crossings_per_track(), vec![2, 1, 1]);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let text = "# Tag: TEST faa\n\
                    a\tb\t1.5\n\
                    b\tc\tabc\n\
                    c\n\
                    c\ta\t-0.5\n";
        let input = read_solver_table(
            Cursor::new(text),
            "TEST",
            "faa",
            &params(CorrectionModel::Constant, false),
        )
        .unwrap();
        assert_eq!(input.n_crossovers(), 2);
        assert_eq!(input.tracks, vec!["a", "b", "c"]);
        assert_eq!(input.records[1].tracks, [2, 0]);
        assert_relative_eq!(input.records[1].coe, -0.5);
    }

    #[test]
    fn test_weights_ignored_unless_requested() {
        let text = "# Tag: TEST faa\na\tb\t2.0\t0.25\n";
        let input = read_solver_table(
            Cursor::new(text),
            "TEST",
            "faa",
            &params(CorrectionModel::Constant, false),
        )
        .unwrap();
        assert_relative_eq!(input.records[0].weight, 1.0);
    }

    #[test]
    fn test_scale_error_is_difference() {
        let text = "# Tag: TEST mag\nx\ty\t105\t100\n";
        let input = read_solver_table(
            Cursor::new(text),
            "TEST",
            "mag",
            &params(CorrectionModel::Scale, false),
        )
        .unwrap();
        assert_relative_eq!(input.records[0].coe, 5.0);
    }

    #[test]
    fn test_header_mismatch() {
        let p = params(CorrectionModel::Constant, false);
        let err = read_solver_table(Cursor::new("# Tag: OTHER faa\n"), "TEST", "faa", &p);
        assert!(matches!(err, Err(XoverError::TagMismatch { .. })));
        let err = read_solver_table(Cursor::new("# Tag: TEST mag\n"), "TEST", "faa", &p);
        assert!(matches!(err, Err(XoverError::MissingColumn(_))));
    }

    #[test]
    fn test_write_then_read_heading_table() {
        let input = SolverInput {
            tag: "TEST".into(),
            field: "mag".into(),
            model: CorrectionModel::Heading,
            tracks: vec!["a".into(), "b".into()],
            records: vec![SolverRecord {
                tracks: [1, 0],
                coe: 12.5,
                weight: 0.75,
                terms: RecordTerms::Heading([45.0, 270.0]),
            }],
        };
        let mut buf = Vec::new();
        write_solver_table(&mut buf, &input).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("# Tag: TEST mag\n# trk_1\ttrk_2\thead_1\thead_2\tmag\tweight\n"));

        let back = read_solver_table(
            Cursor::new(text),
            "TEST",
            "mag",
            &params(CorrectionModel::Heading, true),
        )
        .unwrap();
        assert_eq!(back.tracks, vec!["b", "a"]);
        assert_eq!(back.records[0].terms, input.records[0].terms);
        assert_relative_eq!(back.records[0].weight, 0.75);
    }

    #[test]
    fn test_write_rejects_mismatched_terms() {
        let input = SolverInput {
            tag: "TEST".into(),
            field: "faa".into(),
            model: CorrectionModel::Latitude,
            tracks: vec!["a".into(), "b".into()],
            records: vec![SolverRecord {
                tracks: [0, 1],
                coe: 1.0,
                weight: 1.0,
                terms: RecordTerms::Constant,
            }],
        };
        assert!(matches!(
            write_solver_table(Vec::new(), &input),
            Err(XoverError::InvalidParameter(_))
        ));
    }
}
