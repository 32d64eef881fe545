//! # Tag files: database geometry and units
//!
//! Every crossover database is identified by a **tag** (a short upper-case name such as
//! `MGD77`). The tag owns a directory `<home>/<TAG>/` whose `<TAG>.tag` file holds a single
//! line of flag-style options fixed at creation time:
//!
//! ```text
//! # TAG file for system: MGD77
//! #
//! -Dmgd77 -Emgd77 -Gd -I1/1 -Ndk -Nse -R-180/180/-90/90 -Cg -Wt3600 -Wd10
//! ```
//!
//! Options
//! -----------------
//! * `-D<format>` – Name of the track format definition used by the external scanner.
//! * `-E<suffix>` – File suffix of the track files (defaults to the format name).
//! * `-G[d|g]` – Geographic coordinates; `d` for `-180/180` longitudes, `g` (default) for `0/360`.
//! * `-I<dx>[/<dy>]` – Bin size.
//! * `-R<w>/<e>/<s>/<n>` – Domain of the bin grid (`-Rg` and `-Rd` are global shorthands).
//! * `-Nd<u>`, `-Ns<u>` – Distance and speed units, one of `c e f k M n`.
//! * `-C<c|f|g|e>` – Distance calculation (Cartesian, flat Earth, great circle, geodesic).
//! * `-Wt<gap>`, `-Wd<gap>` – Maximum time and distance gaps along a track.
//!
//! Lines starting with `#` are comments; only the first non-comment line is read.
//!
//! Validation
//! -----------------
//! Geographic tags get `k`/`e` units and great-circle distances unless told otherwise, and the
//! following combinations are rejected with [`XoverError::ConflictingTagOptions`]:
//! a `0/360` convention with negative longitude bounds, a `-180/180` convention with both bounds
//! positive, Cartesian distances, or Cartesian units.
//!
//! See also
//! -----------------
//! * [`crate::bins::BinGrid::from_config`] – Builds the bin grid from a [`TagConfig`].
//! * [`crate::bins::store::Store`] – Reads and writes the tag file.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, one_of},
    combinator::{all_consuming, map, opt, rest},
    number::complete::double,
    sequence::{preceded, separated_pair},
    IResult, Parser,
};

use crate::{constants::TURN_DEG, format::fmt_g, xover_errors::XoverError};

/// Accepted distance and speed unit codes.
pub const UNIT_CODES: &str = "cefkMn";

/// Longitude convention of a geographic tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LonConvention {
    /// Longitudes in `[0, 360)` (`-Gg` or `-G`)
    ZeroTo360,
    /// Longitudes in `[-180, 180)` (`-Gd`)
    Minus180To180,
}

/// Along-track distance calculation mode (`-C`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceCalc {
    Cartesian,
    FlatEarth,
    GreatCircle,
    Geodesic,
}

impl DistanceCalc {
    fn code(self) -> char {
        match self {
            DistanceCalc::Cartesian => 'c',
            DistanceCalc::FlatEarth => 'f',
            DistanceCalc::GreatCircle => 'g',
            DistanceCalc::Geodesic => 'e',
        }
    }

    fn from_code(c: char) -> Option<Self> {
        match c {
            'c' => Some(DistanceCalc::Cartesian),
            'f' => Some(DistanceCalc::FlatEarth),
            'g' => Some(DistanceCalc::GreatCircle),
            'e' => Some(DistanceCalc::Geodesic),
            _ => None,
        }
    }
}

/// Rectangular region `west/east/south/north`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl Region {
    pub const GLOBAL_360: Region = Region {
        west: 0.0,
        east: 360.0,
        south: -90.0,
        north: 90.0,
    };

    pub const GLOBAL_180: Region = Region {
        west: -180.0,
        east: 180.0,
        south: -90.0,
        north: 90.0,
    };

    pub fn new(west: f64, east: f64, south: f64, north: f64) -> Self {
        Region {
            west,
            east,
            south,
            north,
        }
    }

    /// Test whether `(x, y)` falls in the region, wrapping `x` by full turns when `geographic`.
    pub fn contains(&self, x: f64, y: f64, geographic: bool) -> bool {
        if !(x.is_finite() && y >= self.south && y <= self.north) {
            return false;
        }
        if !geographic {
            return x >= self.west && x <= self.east;
        }
        (x - self.west).rem_euclid(TURN_DEG) + self.west <= self.east
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            fmt_g(self.west),
            fmt_g(self.east),
            fmt_g(self.south),
            fmt_g(self.north)
        )
    }
}

/// Parsed content of a `<TAG>.tag` file.
#[derive(Debug, Clone, PartialEq)]
pub struct TagConfig {
    pub tag: String,
    pub format: String,
    pub suffix: String,
    pub geographic: Option<LonConvention>,
    pub dx: f64,
    pub dy: f64,
    pub region: Region,
    pub dist_unit: char,
    pub speed_unit: char,
    pub dist_calc: DistanceCalc,
    pub time_gap: Option<f64>,
    pub dist_gap: Option<f64>,
}

impl TagConfig {
    pub fn builder(tag: &str) -> TagConfigBuilder {
        TagConfigBuilder::new(tag)
    }

    pub fn is_geographic(&self) -> bool {
        self.geographic.is_some()
    }

    /// A geographic grid spanning a full turn wraps around in longitude.
    pub fn is_periodic(&self) -> bool {
        self.is_geographic()
            && ((self.region.east - self.region.west) - TURN_DEG).abs() < crate::constants::EPS
    }

    /// Parse the content of a tag file.
    ///
    /// Arguments
    /// -----------------
    /// * `tag` – Name of the tag the file belongs to.
    /// * `content` – Full text of the tag file.
    ///
    /// Return
    /// ----------
    /// * The validated configuration, or [`XoverError::InvalidTag`] on an unknown or malformed
    ///   option, or [`XoverError::ConflictingTagOptions`].
    pub fn parse(tag: &str, content: &str) -> Result<Self, XoverError> {
        let line = content
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .ok_or_else(|| XoverError::InvalidTag(format!("{tag}: no option line")))?;

        let mut builder = TagConfigBuilder::new(tag);
        for token in line.split_whitespace().filter(|t| t.starts_with('-')) {
            let (_, option) = all_consuming(tag_option)
                .parse(token)
                .map_err(|e| XoverError::InvalidTag(format!("{tag}: bad option {token} ({e})")))?;
            builder = builder.apply(option);
        }
        builder.build()
    }

    /// The single option line stored in the tag file.
    pub fn option_line(&self) -> String {
        let mut parts = vec![format!("-D{}", self.format), format!("-E{}", self.suffix)];
        match self.geographic {
            Some(LonConvention::ZeroTo360) => parts.push("-Gg".into()),
            Some(LonConvention::Minus180To180) => parts.push("-Gd".into()),
            None => {}
        }
        parts.push(format!("-I{}/{}", fmt_g(self.dx), fmt_g(self.dy)));
        parts.push(format!("-Nd{}", self.dist_unit));
        parts.push(format!("-Ns{}", self.speed_unit));
        parts.push(format!("-R{}", self.region));
        parts.push(format!("-C{}", self.dist_calc.code()));
        if let Some(gap) = self.time_gap {
            parts.push(format!("-Wt{}", fmt_g(gap)));
        }
        if let Some(gap) = self.dist_gap {
            parts.push(format!("-Wd{}", fmt_g(gap)));
        }
        parts.join(" ")
    }

    /// Full text of the tag file.
    pub fn to_file_content(&self) -> String {
        format!("# TAG file for system: {}\n#\n{}\n", self.tag, self.option_line())
    }
}

// -------------------------------------------------------------------------------------------------
// nom parsers for one option token
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TagOption {
    Format(String),
    Suffix(String),
    Geographic(LonConvention),
    Increment(f64, f64),
    Domain(Region),
    DistUnit(char),
    SpeedUnit(char),
    DistCalc(DistanceCalc),
    TimeGap(f64),
    DistGap(f64),
    Gaps(f64, f64),
    Deprecated,
}

fn increment(input: &str) -> IResult<&str, (f64, f64)> {
    map((double, opt(preceded(char('/'), double))), |(dx, dy)| {
        (dx, dy.unwrap_or(dx))
    })
    .parse(input)
}

fn region(input: &str) -> IResult<&str, Region> {
    alt((
        map(
            (
                double,
                preceded(char('/'), double),
                preceded(char('/'), double),
                preceded(char('/'), double),
            ),
            |(w, e, s, n)| Region::new(w, e, s, n),
        ),
        map(char('g'), |_| Region::GLOBAL_360),
        map(char('d'), |_| Region::GLOBAL_180),
    ))
    .parse(input)
}

fn tag_option(input: &str) -> IResult<&str, TagOption> {
    preceded(
        char('-'),
        alt((
            map(preceded(char('D'), rest), |s: &str| {
                TagOption::Format(s.to_string())
            }),
            map(preceded(char('E'), rest), |s: &str| {
                TagOption::Suffix(s.to_string())
            }),
            map(preceded(char('G'), opt(one_of("dg"))), |c| {
                TagOption::Geographic(match c {
                    Some('d') => LonConvention::Minus180To180,
                    _ => LonConvention::ZeroTo360,
                })
            }),
            map(preceded(char('I'), increment), |(dx, dy)| {
                TagOption::Increment(dx, dy)
            }),
            map(preceded(char('R'), region), TagOption::Domain),
            map(preceded(tag("Nd"), one_of(UNIT_CODES)), TagOption::DistUnit),
            map(preceded(tag("Ns"), one_of(UNIT_CODES)), TagOption::SpeedUnit),
            map(preceded(char('C'), one_of("cfge")), |c| {
                TagOption::DistCalc(DistanceCalc::from_code(c).unwrap_or(DistanceCalc::Cartesian))
            }),
            map(preceded(tag("Wt"), double), TagOption::TimeGap),
            map(preceded(tag("Wd"), double), TagOption::DistGap),
            map(
                preceded(char('W'), separated_pair(double, char('/'), double)),
                |(t, d)| TagOption::Gaps(t, d),
            ),
            map((one_of("mM"), rest), |_| TagOption::Deprecated),
        )),
    )
    .parse(input)
}

// -------------------------------------------------------------------------------------------------
// Builder
// -------------------------------------------------------------------------------------------------

/// Fluent builder for [`TagConfig`], also used by [`TagConfig::parse`].
#[derive(Debug, Clone)]
pub struct TagConfigBuilder {
    tag: String,
    format: String,
    suffix: Option<String>,
    geographic: Option<LonConvention>,
    dx: f64,
    dy: f64,
    region: Region,
    dist_unit: Option<char>,
    speed_unit: Option<char>,
    dist_calc: Option<DistanceCalc>,
    time_gap: Option<f64>,
    dist_gap: Option<f64>,
}

impl TagConfigBuilder {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            format: String::new(),
            suffix: None,
            geographic: None,
            dx: 1.0,
            dy: 1.0,
            region: Region::GLOBAL_360,
            dist_unit: None,
            speed_unit: None,
            dist_calc: None,
            time_gap: None,
            dist_gap: None,
        }
    }

    pub fn format(mut self, v: &str) -> Self {
        self.format = v.to_string();
        self
    }
    pub fn suffix(mut self, v: &str) -> Self {
        self.suffix = Some(v.to_string());
        self
    }
    pub fn geographic(mut self, v: LonConvention) -> Self {
        self.geographic = Some(v);
        self
    }
    pub fn increment(mut self, dx: f64, dy: f64) -> Self {
        self.dx = dx;
        self.dy = dy;
        self
    }
    pub fn region(mut self, v: Region) -> Self {
        self.region = v;
        self
    }
    pub fn dist_unit(mut self, v: char) -> Self {
        self.dist_unit = Some(v);
        self
    }
    pub fn speed_unit(mut self, v: char) -> Self {
        self.speed_unit = Some(v);
        self
    }
    pub fn dist_calc(mut self, v: DistanceCalc) -> Self {
        self.dist_calc = Some(v);
        self
    }
    pub fn time_gap(mut self, v: f64) -> Self {
        self.time_gap = Some(v);
        self
    }
    pub fn dist_gap(mut self, v: f64) -> Self {
        self.dist_gap = Some(v);
        self
    }

    fn apply(self, option: TagOption) -> Self {
        match option {
            TagOption::Format(v) => self.format(&v),
            TagOption::Suffix(v) => self.suffix(&v),
            TagOption::Geographic(v) => self.geographic(v),
            TagOption::Increment(dx, dy) => self.increment(dx, dy),
            TagOption::Domain(v) => self.region(v),
            TagOption::DistUnit(v) => self.dist_unit(v),
            TagOption::SpeedUnit(v) => self.speed_unit(v),
            TagOption::DistCalc(v) => self.dist_calc(v),
            TagOption::TimeGap(v) => self.time_gap(v),
            TagOption::DistGap(v) => self.dist_gap(v),
            TagOption::Gaps(t, d) => self.time_gap(t).dist_gap(d),
            TagOption::Deprecated => self,
        }
    }

    /// Validate the options and fill in the geographic defaults.
    pub fn build(self) -> Result<TagConfig, XoverError> {
        let invalid = |msg: String| XoverError::InvalidTag(format!("{}: {msg}", self.tag));
        let conflict = |msg: &str| XoverError::ConflictingTagOptions(format!("{}: {msg}", self.tag));

        if self.tag.is_empty() || self.tag.contains(['/', '\\', ' ']) {
            return Err(invalid("tag name must be a plain word".into()));
        }
        if self.format.is_empty() {
            return Err(invalid("missing -D format".into()));
        }
        if !(self.dx.is_finite() && self.dx > 0.0 && self.dy.is_finite() && self.dy > 0.0) {
            return Err(invalid(format!("bin size {}/{} must be > 0", self.dx, self.dy)));
        }
        let r = self.region;
        if !(r.west < r.east && r.south < r.north) {
            return Err(invalid(format!("empty region {r}")));
        }
        if self.time_gap.is_some_and(|g| g < 0.0) || self.dist_gap.is_some_and(|g| g < 0.0) {
            return Err(invalid("maximum gap must be > 0".into()));
        }
        for unit in [self.dist_unit, self.speed_unit].into_iter().flatten() {
            if !UNIT_CODES.contains(unit) {
                return Err(invalid(format!("unknown unit {unit}")));
            }
        }

        let (dist_unit, speed_unit, dist_calc) = match self.geographic {
            Some(convention) => {
                let du = self.dist_unit.unwrap_or('k');
                let su = self.speed_unit.unwrap_or('e');
                let calc = self.dist_calc.unwrap_or(DistanceCalc::GreatCircle);

                match convention {
                    LonConvention::ZeroTo360 if r.west < 0.0 || r.east < 0.0 => {
                        return Err(conflict("-R and -G (0/360) settings contradict each other"))
                    }
                    LonConvention::Minus180To180 if r.west > 0.0 && r.east > 0.0 => {
                        return Err(conflict("-R and -Gd settings contradict each other"))
                    }
                    _ => {}
                }
                if calc == DistanceCalc::Cartesian {
                    return Err(conflict("-C and -G settings contradict each other"));
                }
                if du == 'c' {
                    return Err(conflict("-Nd and -G settings contradict each other"));
                }
                if su == 'c' {
                    return Err(conflict("-Ns and -G settings contradict each other"));
                }
                (du, su, calc)
            }
            None => (
                self.dist_unit.unwrap_or('c'),
                self.speed_unit.unwrap_or('c'),
                self.dist_calc.unwrap_or(DistanceCalc::Cartesian),
            ),
        };

        Ok(TagConfig {
            suffix: self.suffix.clone().unwrap_or_else(|| self.format.clone()),
            tag: self.tag,
            format: self.format,
            geographic: self.geographic,
            dx: self.dx,
            dy: self.dy,
            region: r,
            dist_unit,
            speed_unit,
            dist_calc,
            time_gap: self.time_gap,
            dist_gap: self.dist_gap,
        })
    }
}
