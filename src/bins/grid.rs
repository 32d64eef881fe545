//! # Bin grid geometry
//!
//! Maps survey coordinates to bin identifiers over the fixed grid declared in the tag file.
//!
//! Layout
//! -----------------
//! * `n_cols = round((east - west) / dx)`, `n_rows = round((north - south) / dy)`.
//! * `bin_id = row * n_cols + col`, rows counted from the south edge, columns from the west edge.
//! * A coordinate lying exactly on the east (north) edge belongs to the last column (row).
//! * On a periodic grid (geographic, 360° wide) longitudes wrap into `[west, west + 360)`.
//!
//! Error Handling
//! -----------------
//! Any coordinate outside the domain (or `NaN`) yields [`XoverError::BadBinIndex`].

use std::ops::Range;

use crate::{
    constants::{BinId, TURN_DEG},
    tag::{Region, TagConfig},
    xover_errors::XoverError,
};

/// Column, row and identifier of one bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinCoord {
    pub col: usize,
    pub row: usize,
    pub id: BinId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinGrid {
    west: f64,
    east: f64,
    south: f64,
    north: f64,
    dx: f64,
    dy: f64,
    n_cols: usize,
    n_rows: usize,
    periodic: bool,
}

/// Bins covered by a region: a contiguous row range and a (possibly wrapped) column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinRange {
    pub rows: Range<usize>,
    pub cols: Vec<usize>,
    n_cols: usize,
}

impl BinRange {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }

    /// Bin identifiers in the range, row by row.
    pub fn bin_ids(&self) -> impl Iterator<Item = BinId> + '_ {
        self.rows.clone().flat_map(move |row| {
            self.cols
                .iter()
                .map(move |&col| (row * self.n_cols + col) as BinId)
        })
    }
}

impl BinGrid {
    pub fn new(region: Region, dx: f64, dy: f64, periodic: bool) -> Result<Self, XoverError> {
        if !(dx > 0.0 && dy > 0.0) {
            return Err(XoverError::InvalidTag(format!("bin size {dx}/{dy} must be > 0")));
        }
        let n_cols = ((region.east - region.west) / dx).round();
        let n_rows = ((region.north - region.south) / dy).round();
        if !(n_cols >= 1.0 && n_rows >= 1.0) || n_cols * n_rows > BinId::MAX as f64 {
            return Err(XoverError::InvalidTag(format!(
                "region {region} with bin size {dx}/{dy} gives an unusable grid"
            )));
        }
        Ok(Self {
            west: region.west,
            east: region.east,
            south: region.south,
            north: region.north,
            dx,
            dy,
            n_cols: n_cols as usize,
            n_rows: n_rows as usize,
            periodic,
        })
    }

    pub fn from_config(config: &TagConfig) -> Result<Self, XoverError> {
        Self::new(config.region, config.dx, config.dy, config.is_periodic())
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_bins(&self) -> usize {
        self.n_cols * self.n_rows
    }

    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    /// Domain covered by the grid.
    pub fn region(&self) -> Region {
        Region::new(self.west, self.east, self.south, self.north)
    }

    fn wrap_x(&self, x: f64) -> f64 {
        (x - self.west).rem_euclid(TURN_DEG) + self.west
    }

    /// Locate the bin holding `(x, y)`.
    ///
    /// Arguments
    /// -----------------
    /// * `x` – Abscissa (longitude on geographic grids).
    /// * `y` – Ordinate (latitude on geographic grids).
    ///
    /// Return
    /// ----------
    /// * The bin column, row and identifier, or [`XoverError::BadBinIndex`] when the point lies
    ///   outside the domain.
    pub fn bin_of(&self, x: f64, y: f64) -> Result<BinCoord, XoverError> {
        let out = || XoverError::BadBinIndex(format!("({x}, {y}) outside the grid"));

        if !(y >= self.south && y <= self.north) {
            return Err(out());
        }
        let x = if self.periodic { self.wrap_x(x) } else { x };
        if !(x >= self.west && x <= self.east) {
            return Err(out());
        }

        let row = if y == self.north {
            self.n_rows - 1
        } else {
            (((y - self.south) / self.dy).floor() as usize).min(self.n_rows - 1)
        };
        let col = if x == self.east {
            self.n_cols - 1
        } else {
            (((x - self.west) / self.dx).floor() as usize).min(self.n_cols - 1)
        };

        Ok(BinCoord {
            col,
            row,
            id: (row * self.n_cols + col) as BinId,
        })
    }

    /// Column and row of a bin identifier.
    pub fn coord_of(&self, id: BinId) -> Result<BinCoord, XoverError> {
        let idx = id as usize;
        if idx >= self.n_bins() {
            return Err(XoverError::BadBinIndex(format!(
                "bin {id} beyond the {} bins of the grid",
                self.n_bins()
            )));
        }
        Ok(BinCoord {
            col: idx % self.n_cols,
            row: idx / self.n_cols,
            id,
        })
    }

    /// Geographic center `(x, y)` of a bin.
    pub fn center_of(&self, id: BinId) -> Result<(f64, f64), XoverError> {
        let c = self.coord_of(id)?;
        Ok((
            self.west + (c.col as f64 + 0.5) * self.dx,
            self.south + (c.row as f64 + 0.5) * self.dy,
        ))
    }

    /// Index range of the cells overlapped by `[lo, hi]` along one axis.
    fn cell_span(lo: f64, hi: f64, origin: f64, step: f64, n: usize) -> Range<usize> {
        let first = ((lo - origin) / step).floor().max(0.0) as usize;
        // A bound sitting exactly on a cell edge does not pull in the next cell
        let last = (((hi - origin) / step).ceil() - 1.0).max(first as f64) as usize;
        first.min(n)..(last + 1).min(n)
    }

    /// Bins overlapped by a region.
    ///
    /// On a periodic grid the region may cross the longitude seam; the column list then wraps
    /// and never repeats a column.
    pub fn bin_range(&self, region: &Region) -> BinRange {
        let empty = BinRange {
            rows: 0..0,
            cols: Vec::new(),
            n_cols: self.n_cols,
        };
        let south = region.south.max(self.south);
        let north = region.north.min(self.north);
        if south > north || region.west > region.east {
            return empty;
        }
        let rows = Self::cell_span(south, north, self.south, self.dy, self.n_rows);

        let cols: Vec<usize> = if self.periodic {
            let width = region.east - region.west;
            if width >= TURN_DEG {
                (0..self.n_cols).collect()
            } else {
                let west = self.wrap_x(region.west);
                let span = Self::cell_span(west, west + width, self.west, self.dx, 2 * self.n_cols);
                let mut cols: Vec<usize> = span.map(|c| c % self.n_cols).collect();
                cols.truncate(self.n_cols);
                cols
            }
        } else {
            let west = region.west.max(self.west);
            let east = region.east.min(self.east);
            if west > east {
                return empty;
            }
            Self::cell_span(west, east, self.west, self.dx, self.n_cols).collect()
        };

        BinRange {
            rows,
            cols,
            n_cols: self.n_cols,
        }
    }
}
