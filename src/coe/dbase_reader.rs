//! # Crossover database reader
//!
//! Reads the text database written by the external crossover finder and keeps the pairs and
//! crossovers selected by [`ReadParams`].
//!
//! File layout
//! -----------------
//! ```text
//! # Tag: MGD77
//! # Command: x2sys_cross ...
//! # lon lat t_1 t_2 dist_1 dist_2 head_1 head_2 vel_1 vel_2 faa_1 faa_2 depth_1 depth_2
//! > a0012 1998 b0200 2003 1998-05-01T00:00:00/1998-05-09T12:00:00/1450.2 NaN/NaN/800
//! 211.5 -12.25 NaN NaN 120.5 433.0 45.0 130.0 5.1 4.8 12.4 10.9 -3200 -3190
//! ```
//!
//! * `i_1 i_2` in place of `t_1 t_2` means the tracks carry no time; both time columns are
//!   then ignored.
//! * A field may be stored as `<f>_X <f>_M` (crossover value and mean). Per-track values are
//!   rebuilt as `M + X/2` and `M - X/2`.
//! * Pair headers may stop after the two years; start, stop and length are then `NaN`.
//!
//! Filters
//! -----------------
//! Applied in this order: crossover kind, ignore list, single track, duplicate pair, then per
//! crossover the region. Pairs without any crossover left are dropped and the surviving tracks
//! are numbered in order of first appearance.

use std::{
    fs::File,
    io::{BufRead, BufReader},
};

use camino::Utf8Path;
use nom::{
    bytes::complete::take_till1,
    character::complete::{char, i32 as year, space0, space1},
    combinator::{all_consuming, map, opt},
    sequence::preceded,
    IResult, Parser,
};
use tracing::{info, warn};

use super::{CoeDatabase, CoePair, CoeSide, Crossover, PairTrack};
use crate::{
    bins::registry::canonical_track_name,
    constants::FastHashSet,
    tag::{Region, TagConfig},
    time::parse_time,
    xover_errors::XoverError,
};

/// Number of fixed columns before the data fields.
const FIXED_COLUMNS: usize = 10;

/// Which crossovers to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoeKind {
    /// A track crossing itself
    Internal,
    /// Two different tracks
    #[default]
    External,
    Both,
}

impl CoeKind {
    fn accepts(&self, internal: bool) -> bool {
        match self {
            CoeKind::Internal => internal,
            CoeKind::External => !internal,
            CoeKind::Both => true,
        }
    }
}

/// Selection applied while reading a crossover database.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadParams {
    /// Data field whose crossovers are read, e.g. `faa`
    pub field: String,
    pub kind: CoeKind,
    /// Keep only crossovers located inside this region
    pub region: Option<Region>,
    /// Tracks whose pairs are discarded
    pub ignore: Vec<String>,
    /// Keep only pairs involving this track
    pub single_track: Option<String>,
    /// With `single_track`, leave pairs as stored instead of putting the track on side one
    pub both_sides: bool,
}

impl ReadParams {
    pub fn builder(field: &str) -> ReadParamsBuilder {
        ReadParamsBuilder {
            params: ReadParams {
                field: field.to_string(),
                kind: CoeKind::default(),
                region: None,
                ignore: Vec::new(),
                single_track: None,
                both_sides: false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadParamsBuilder {
    params: ReadParams,
}

impl ReadParamsBuilder {
    pub fn kind(mut self, v: CoeKind) -> Self {
        self.params.kind = v;
        self
    }

    pub fn region(mut self, v: Region) -> Self {
        self.params.region = Some(v);
        self
    }

    pub fn ignore<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.params.ignore = names
            .into_iter()
            .map(|n| canonical_track_name(n.as_ref()).to_string())
            .collect();
        self
    }

    pub fn single_track(mut self, name: &str) -> Self {
        self.params.single_track = Some(canonical_track_name(name).to_string());
        self
    }

    pub fn both_sides(mut self, v: bool) -> Self {
        self.params.both_sides = v;
        self
    }

    pub fn build(self) -> Result<ReadParams, XoverError> {
        let p = self.params;
        if p.field.is_empty() || p.field.contains(char::is_whitespace) {
            return Err(XoverError::InvalidParameter(format!(
                "invalid field name '{}'",
                p.field
            )));
        }
        if let Some(r) = &p.region {
            if r.south > r.north {
                return Err(XoverError::InvalidParameter(format!(
                    "region {r} has south > north"
                )));
            }
        }
        if p.single_track.as_deref() == Some("") {
            return Err(XoverError::InvalidParameter("empty single track name".into()));
        }
        Ok(p)
    }
}

// -------------------------------------------------------------------------------------------------
// Column header
// -------------------------------------------------------------------------------------------------

/// Where the requested field sits in a data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub has_time: bool,
    /// Column of the first of the two values
    pub value_col: usize,
    /// Values stored as crossover/mean (`_X _M`) rather than per track (`_1 _2`)
    pub crossover_mean: bool,
    /// Columns expected on a data line
    pub n_columns: usize,
}

impl ColumnLayout {
    /// Locate `field` in the `# lon lat ...` column line.
    ///
    /// Return
    /// ----------
    /// * [`XoverError::MissingColumn`] when the line is too short or lacks `field`.
    pub fn parse(line: &str, field: &str) -> Result<Self, XoverError> {
        let tokens: Vec<&str> = line
            .trim_start_matches('#')
            .split_whitespace()
            .collect();
        if tokens.len() < FIXED_COLUMNS + 2 {
            return Err(XoverError::MissingColumn(format!(
                "{field}: column line has only {} columns",
                tokens.len()
            )));
        }
        let has_time = !tokens[2].starts_with("i_");
        let crossover_mean = !tokens[FIXED_COLUMNS].ends_with('1');

        let value_col = tokens
            .iter()
            .enumerate()
            .skip(FIXED_COLUMNS)
            .find(|(_, t)| t.rsplit_once('_').map(|(name, _)| name) == Some(field))
            .map(|(col, _)| col)
            .ok_or_else(|| XoverError::MissingColumn(field.to_string()))?;

        if value_col + 1 >= tokens.len() {
            return Err(XoverError::MissingColumn(format!(
                "{field}: second value column is missing"
            )));
        }
        Ok(ColumnLayout {
            has_time,
            value_col,
            crossover_mean,
            n_columns: tokens.len(),
        })
    }

    /// Build a crossover from the whitespace-separated columns of a data line.
    ///
    /// Unparsable numbers become `NaN`; `None` if the line is too short.
    fn crossover(&self, cols: &[&str]) -> Option<Crossover> {
        if cols.len() <= self.value_col + 1 {
            return None;
        }
        let num = |i: usize| cols[i].parse::<f64>().unwrap_or(f64::NAN);
        let time = |i: usize| {
            if self.has_time {
                parse_time(cols[i]).unwrap_or(f64::NAN)
            } else {
                f64::NAN
            }
        };
        let (z0, z1) = if self.crossover_mean {
            let (x, m) = (num(self.value_col), num(self.value_col + 1));
            (m + 0.5 * x, m - 0.5 * x)
        } else {
            (num(self.value_col), num(self.value_col + 1))
        };
        let side = |k: usize, value: f64| CoeSide {
            time: time(2 + k),
            dist: num(4 + k),
            heading: num(6 + k),
            speed: num(8 + k),
            value,
        };
        Some(Crossover {
            x: num(0),
            y: num(1),
            sides: [side(0, z0), side(1, z1)],
        })
    }
}

// -------------------------------------------------------------------------------------------------
// Pair header
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct RawPairHeader<'a> {
    names: [&'a str; 2],
    years: [i32; 2],
    extents: Option<[(&'a str, &'a str, &'a str); 2]>,
}

fn word(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace()).parse(input)
}

fn slash_item(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c == '/' || c.is_whitespace()).parse(input)
}

/// `start/stop/dist`
fn extent(input: &str) -> IResult<&str, (&str, &str, &str)> {
    (
        slash_item,
        preceded(char('/'), slash_item),
        preceded(char('/'), slash_item),
    )
        .parse(input)
}

fn pair_header(input: &str) -> IResult<&str, RawPairHeader<'_>> {
    map(
        (
            preceded((char('>'), space0), word),
            preceded(space1, year),
            preceded(space1, word),
            preceded(space1, year),
            opt((preceded(space1, extent), preceded(space1, extent))),
            space0,
        ),
        |(n1, y1, n2, y2, extents, _)| RawPairHeader {
            names: [n1, n2],
            years: [y1, y2],
            extents: extents.map(|(e1, e2)| [e1, e2]),
        },
    )
    .parse(input)
}

/// Build the two [`PairTrack`] of a `>` line. Ids are filled in later.
fn parse_pair_header(line: &str, line_no: usize) -> Result<[PairTrack; 2], XoverError> {
    let (_, raw) = all_consuming(pair_header)
        .parse(line)
        .map_err(|e| XoverError::NomParsingError(format!("line {line_no}: {e}")))?;

    let track = |k: usize| -> Result<PairTrack, XoverError> {
        let (start, stop, length) = match raw.extents {
            None => (f64::NAN, f64::NAN, f64::NAN),
            Some(ext) => {
                let (start, stop, dist) = ext[k];
                let (start, stop) = if start == "NaN" || stop == "NaN" {
                    (f64::NAN, f64::NAN)
                } else {
                    (parse_time(start)?, parse_time(stop)?)
                };
                (start, stop, dist.parse().unwrap_or(f64::NAN))
            }
        };
        Ok(PairTrack {
            name: canonical_track_name(raw.names[k]).to_string(),
            id: 0,
            year: raw.years[k],
            start,
            stop,
            length,
        })
    };
    Ok([track(0)?, track(1)?])
}

// -------------------------------------------------------------------------------------------------
// Reader
// -------------------------------------------------------------------------------------------------

/// Pair being filled while its data lines are read; `None` once it has been rejected.
///
/// Records are stored in file order and `flip` is applied when the pair is closed.
struct OpenPair {
    pair: Option<CoePair>,
    flip: bool,
}

/// Keep a finished pair if it still holds crossovers, putting the selected track on side 0.
fn close_pair(open: Option<OpenPair>, pairs: &mut Vec<CoePair>) {
    let Some(OpenPair {
        pair: Some(mut pair),
        flip,
    }) = open
    else {
        return;
    };
    if pair.crossovers.is_empty() {
        return;
    }
    if flip {
        pair.swap();
    }
    pairs.push(pair);
}

/// Filter state shared by all pairs of one read.
struct PairFilter<'p> {
    params: &'p ReadParams,
    ignore: FastHashSet<&'p str>,
    seen: FastHashSet<(String, String)>,
}

impl<'p> PairFilter<'p> {
    fn new(params: &'p ReadParams) -> Self {
        PairFilter {
            params,
            ignore: params.ignore.iter().map(String::as_str).collect(),
            seen: FastHashSet::default(),
        }
    }

    /// Decide whether a pair is read and whether it must be flipped for a single-track selection.
    fn admit(&mut self, tracks: [PairTrack; 2], line_no: usize) -> OpenPair {
        let mut flip = false;
        let pair = self.accept(tracks, &mut flip, line_no);
        OpenPair { pair, flip }
    }

    fn accept(
        &mut self,
        tracks: [PairTrack; 2],
        flip: &mut bool,
        line_no: usize,
    ) -> Option<CoePair> {
        let internal = tracks[0].name == tracks[1].name;
        if !self.params.kind.accepts(internal) {
            return None;
        }
        if tracks.iter().any(|t| self.ignore.contains(t.name.as_str())) {
            return None;
        }
        if let Some(one) = &self.params.single_track {
            match tracks.iter().position(|t| &t.name == one) {
                None => return None,
                Some(1) if !self.params.both_sides => *flip = true,
                Some(_) => {}
            }
        }

        let key = if tracks[0].name <= tracks[1].name {
            (tracks[0].name.clone(), tracks[1].name.clone())
        } else {
            (tracks[1].name.clone(), tracks[0].name.clone())
        };
        if !self.seen.insert(key) {
            warn!(
                "Line {line_no}: pair {} - {} already read, skipped",
                tracks[0].name, tracks[1].name
            );
            return None;
        }
        Some(CoePair {
            tracks,
            crossovers: Vec::new(),
        })
    }
}

/// Read and filter a crossover database.
///
/// Arguments
/// -----------------
/// * `reader` – Source of the database text.
/// * `config` – Tag the database must belong to.
/// * `params` – Field and filters, see [`ReadParams`].
///
/// Return
/// ----------
/// * The retained pairs, possibly none.
/// * [`XoverError::TagMismatch`] if the `# Tag:` line is absent or names another tag,
///   [`XoverError::MissingColumn`] if the field is not in the database,
///   [`XoverError::NomParsingError`] / [`XoverError::InvalidTime`] on a bad pair header,
///   [`XoverError::MalformedRecord`] on data before the first pair header.
pub fn read_coe_database<R: BufRead>(
    reader: R,
    config: &TagConfig,
    params: &ReadParams,
) -> Result<CoeDatabase, XoverError> {
    let mut found_tag: Option<String> = None;
    let mut layout: Option<ColumnLayout> = None;
    let mut filter = PairFilter::new(params);
    let mut current: Option<OpenPair> = None;
    let mut pairs = Vec::new();
    let mut n_read = 0usize;
    let mut n_outside = 0usize;
    let mut n_bad = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(comment) = trimmed.strip_prefix('#') {
            let comment = comment.trim();
            if let Some(tag) = comment.strip_prefix("Tag:") {
                let tag = tag.trim().to_string();
                if tag != config.tag {
                    return Err(XoverError::TagMismatch {
                        expected: config.tag.clone(),
                        found: tag,
                    });
                }
                found_tag = Some(tag);
            } else if comment.starts_with("lon") && layout.is_none() {
                layout = Some(ColumnLayout::parse(trimmed, &params.field)?);
            }
            continue;
        }

        if found_tag.is_none() {
            return Err(XoverError::TagMismatch {
                expected: config.tag.clone(),
                found: "<none>".into(),
            });
        }
        let Some(layout) = layout else {
            return Err(XoverError::MissingColumn(format!(
                "{}: no column line before line {line_no}",
                params.field
            )));
        };

        if trimmed.starts_with('>') {
            close_pair(current.take(), &mut pairs);
            let tracks = parse_pair_header(trimmed, line_no)?;
            current = Some(filter.admit(tracks, line_no));
            continue;
        }

        let Some(open) = current.as_mut() else {
            return Err(XoverError::MalformedRecord {
                line: line_no,
                reason: "crossover record before any pair header".into(),
            });
        };
        let Some(pair) = open.pair.as_mut() else {
            continue;
        };

        let cols: Vec<&str> = trimmed.split_whitespace().collect();
        let Some(xover) = layout.crossover(&cols) else {
            warn!(
                "Line {line_no}: expected {} columns, found {}, record skipped",
                layout.n_columns,
                cols.len()
            );
            n_bad += 1;
            continue;
        };
        n_read += 1;
        if let Some(region) = &params.region {
            if !region.contains(xover.x, xover.y, config.is_geographic()) {
                n_outside += 1;
                continue;
            }
        }
        pair.crossovers.push(xover);
    }
    close_pair(current.take(), &mut pairs);

    if found_tag.is_none() {
        return Err(XoverError::TagMismatch {
            expected: config.tag.clone(),
            found: "<none>".into(),
        });
    }
    let layout = layout.ok_or_else(|| XoverError::MissingColumn(params.field.clone()))?;

    let mut db = CoeDatabase {
        tag: config.tag.clone(),
        field: params.field.clone(),
        has_time: layout.has_time,
        geographic: config.is_geographic(),
        tracks: Vec::new(),
        pairs,
    };
    db.renumber();

    info!(
        "Read {n_read} {} crossovers: kept {} in {} pairs over {} tracks ({n_outside} outside region, {n_bad} malformed)",
        params.field,
        db.n_crossovers(),
        db.n_pairs(),
        db.n_tracks()
    );
    Ok(db)
}

/// [`read_coe_database`] on a file.
pub fn read_coe_database_file(
    path: &Utf8Path,
    config: &TagConfig,
    params: &ReadParams,
) -> Result<CoeDatabase, XoverError> {
    let file = File::open(path)?;
    read_coe_database(BufReader::new(file), config, params)
}

/// Read a list of track names, one per line (`#` comments and blank lines skipped).
///
/// Only the first word of each line is used; names are reduced to their canonical form.
pub fn read_name_list(path: &Utf8Path) -> Result<Vec<String>, XoverError> {
    let file = File::open(path)?;
    let mut names = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.split_whitespace().next() {
            names.push(canonical_track_name(name).to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod dbase_reader_tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    const DB: &str = "\
# Tag: TEST
# Command: x2sys_cross a.nc b.nc -TTEST
# lon lat t_1 t_2 dist_1 dist_2 head_1 head_2 vel_1 vel_2 depth_1 depth_2 faa_1 faa_2
> a.nc 2001 b.nc 2002 2001-01-01T00:00:00/2001-01-02T00:00:00/120 NaN/NaN/80.5
10.0 5.0 978307200 NaN 12.0 40.0 90 180 5 6 -100 -110 3.0 1.0
20.0 6.0 978310800 NaN 30.0 60.0 90 180 5 6 -100 -110 4.0 2.5
> b.nc 2002 c.nc 2003
359.5 -2.0 NaN NaN 2.0 7.0 0 90 5 5 -50 -60 1.0 1.5
> a 2001 a 2001
15.0 5.0 NaN NaN 3.0 90.0 0 180 5 5 -1 -1 0.0 0.0
> b 2002 a 2001
11.0 5.0 NaN NaN 3.0 9.0 0 180 5 5 -1 -1 9.0 9.0
";

    fn config() -> TagConfig {
        TagConfig::builder("TEST")
            .format("mgd77")
            .geographic(crate::tag::LonConvention::ZeroTo360)
            .increment(1.0, 1.0)
            .region(Region::GLOBAL_360)
            .build()
            .unwrap()
    }

    fn read(params: &ReadParams) -> Result<CoeDatabase, XoverError> {
        read_coe_database(Cursor::new(DB), &config(), params)
    }

    #[test]
    fn test_read_external_pairs() {
        let db = read(&ReadParams::builder("faa").build().unwrap()).unwrap();
        assert!(db.has_time);
        assert_eq!(db.n_pairs(), 2);
        assert_eq!(db.tracks, vec!["a", "b", "c"]);
        assert_eq!(db.n_crossovers(), 3);

        let first = &db.pairs[0];
        assert_eq!(first.tracks[0].year, 2001);
        assert_relative_eq!(first.tracks[0].start, 978_307_200.0, epsilon = 1e-3);
        assert_relative_eq!(first.tracks[0].stop - first.tracks[0].start, 86_400.0, epsilon = 1e-3);
        assert!(first.tracks[1].start.is_nan());
        assert_relative_eq!(first.tracks[1].length, 80.5);
        assert_relative_eq!(first.crossovers[1].coe(), 1.5);
        assert!(first.crossovers[0].sides[1].time.is_nan());

        let second = &db.pairs[1];
        assert!(second.tracks[0].length.is_nan());
        assert_eq!(second.tracks[1].id, 2);
    }

    #[test]
    fn test_duplicate_pair_is_skipped() {
        // "b a" repeats "a b" and is dropped
        let db = read(&ReadParams::builder("faa").build().unwrap()).unwrap();
        assert!(db
            .pairs
            .iter()
            .all(|p| p.crossovers.iter().all(|c| c.sides[0].value != 9.0)));
    }

    #[test]
    fn test_internal_and_region() {
        let params = ReadParams::builder("faa")
            .kind(CoeKind::Internal)
            .build()
            .unwrap();
        let db = read(&params).unwrap();
        assert_eq!(db.n_pairs(), 1);
        assert!(db.pairs[0].is_internal());

        let params = ReadParams::builder("faa")
            .kind(CoeKind::Both)
            .region(Region::new(-5.0, 12.0, 0.0, 10.0))
            .build()
            .unwrap();
        let db = read(&params).unwrap();
        // 10/5 is inside and 359.5 wraps to -0.5 but y=-2 is outside
        assert_eq!(db.n_crossovers(), 1);
        assert_eq!(db.tracks, vec!["a", "b"]);
    }

    #[test]
    fn test_region_filter_with_far_longitudes() {
        let text = "\
# Tag: TEST
# lon lat t_1 t_2 dist_1 dist_2 head_1 head_2 vel_1 vel_2 faa_1 faa_2
> a 2001 b 2002
1e300 5.0 NaN NaN 1 2 0 90 5 5 3.0 1.0
-1e300 5.0 NaN NaN 1 2 0 90 5 5 3.0 1.0
inf 5.0 NaN NaN 1 2 0 90 5 5 3.0 1.0
NaN 5.0 NaN NaN 1 2 0 90 5 5 3.0 1.0
370.0 5.0 NaN NaN 1 2 0 90 5 5 3.0 1.0
";
        let params = ReadParams::builder("faa")
            .region(Region::GLOBAL_360)
            .build()
            .unwrap();
        let db = read_coe_database(Cursor::new(text), &config(), &params).unwrap();
        // the two finite far longitudes wrap into the turn, inf and NaN do not
        assert_eq!(db.n_crossovers(), 3);
        assert_relative_eq!(db.pairs[0].crossovers[2].x, 370.0);
    }

    #[test]
    fn test_single_track_orientation() {
        let params = ReadParams::builder("faa").single_track("b.nc").build().unwrap();
        let db = read(&params).unwrap();
        assert_eq!(db.n_pairs(), 2);
        assert!(db.pairs.iter().all(|p| p.tracks[0].name == "b"));
        assert_relative_eq!(db.pairs[0].crossovers[0].coe(), -2.0);
        // side 0 of every record now holds the values read for track b
        let first = &db.pairs[0].crossovers[0];
        assert_relative_eq!(first.sides[0].dist, 40.0);
        assert_relative_eq!(first.sides[0].value, 1.0);
        assert_relative_eq!(first.sides[1].value, 3.0);
        assert!(first.sides[0].time.is_nan());
        assert_relative_eq!(db.pairs[0].crossovers[1].coe(), -1.5);
        assert_eq!(db.pairs[0].tracks[1].name, "a");

        let params = ReadParams::builder("faa")
            .single_track("b")
            .both_sides(true)
            .build()
            .unwrap();
        let db = read(&params).unwrap();
        assert_eq!(db.pairs[0].tracks[0].name, "a");
    }

    #[test]
    fn test_ignore_list() {
        let params = ReadParams::builder("faa").ignore(["c"]).build().unwrap();
        let db = read(&params).unwrap();
        assert_eq!(db.tracks, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_column_and_tag() {
        let params = ReadParams::builder("mag").build().unwrap();
        assert_eq!(read(&params), Err(XoverError::MissingColumn("mag".into())));

        let other = TagConfig::builder("OTHER")
            .format("mgd77")
            .increment(1.0, 1.0)
            .region(Region::new(0.0, 10.0, 0.0, 10.0))
            .build()
            .unwrap();
        let err = read_coe_database(Cursor::new(DB), &other, &params).unwrap_err();
        assert!(matches!(err, XoverError::TagMismatch { .. }));
    }

    #[test]
    fn test_crossover_mean_columns() {
        let text = "\
# Tag: TEST
# lon lat i_1 i_2 dist_1 dist_2 head_1 head_2 vel_1 vel_2 faa_X faa_M
> a 2001 b 2002
1 1 10 20 0 0 0 0 0 0 4.0 10.0
";
        let params = ReadParams::builder("faa").build().unwrap();
        let db = read_coe_database(Cursor::new(text), &config(), &params).unwrap();
        assert!(!db.has_time);
        let x = db.pairs[0].crossovers[0];
        assert_relative_eq!(x.sides[0].value, 12.0);
        assert_relative_eq!(x.sides[1].value, 8.0);
        assert!(x.sides[0].time.is_nan());
    }

    #[test]
    fn test_short_lines_are_skipped() {
        let text = "\
# Tag: TEST
# lon lat t_1 t_2 dist_1 dist_2 head_1 head_2 vel_1 vel_2 faa_1 faa_2
> a 2001 b 2002
1 1 2
1 1 0 0 0 0 0 0 0 0 5 4
";
        let params = ReadParams::builder("faa").build().unwrap();
        let db = read_coe_database(Cursor::new(text), &config(), &params).unwrap();
        assert_eq!(db.n_crossovers(), 1);
    }

    #[test]
    fn test_pair_header_errors() {
        assert!(matches!(
            parse_pair_header("> a 2001 b", 3),
            Err(XoverError::NomParsingError(_))
        ));
        assert!(matches!(
            parse_pair_header("> a 2001 b 2002 soon/later/1 NaN/NaN/2", 3),
            Err(XoverError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_read_name_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("skip.lis")).unwrap();
        std::fs::write(&path, "# bad cruises\na0012.mgd77\n\n  b77 extra\n").unwrap();
        assert_eq!(read_name_list(&path).unwrap(), vec!["a0012", "b77"]);
    }
}
