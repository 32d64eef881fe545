//! # Square bit matrix over track ids
//!
//! A dense `n × n` boolean matrix stored as `n` rows of `ceil(n / 32)` `u32` words.
//! Two parts of the crate need one:
//!
//! - the pair-candidate query ([`crate::bins::query`]), which marks every pair of tracks
//!   sharing a bin,
//! - the connectivity analysis of the solver ([`crate::solver::clusters`]), which marks every
//!   pair of tracks sharing a crossover.
//!
//! Memory is `n² / 8` bytes, which stays small for survey-sized databases.

use crate::constants::WORD_BITS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMatrix {
    n: usize,
    words_per_row: usize,
    words: Vec<u32>,
}

impl BitMatrix {
    /// Create an all-zero `n × n` matrix.
    pub fn new(n: usize) -> Self {
        let words_per_row = n.div_ceil(WORD_BITS);
        Self {
            n,
            words_per_row,
            words: vec![0; n * words_per_row],
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn words_per_row(&self) -> usize {
        self.words_per_row
    }

    #[inline]
    fn locate(&self, row: usize, col: usize) -> (usize, u32) {
        debug_assert!(row < self.n && col < self.n);
        let word = row * self.words_per_row + col / WORD_BITS;
        (word, 1u32 << (col % WORD_BITS))
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize) {
        let (w, mask) = self.locate(row, col);
        self.words[w] |= mask;
    }

    /// Set both `(a, b)` and `(b, a)`.
    #[inline]
    pub fn set_symmetric(&mut self, a: usize, b: usize) {
        self.set(a, b);
        self.set(b, a);
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> bool {
        let (w, mask) = self.locate(row, col);
        self.words[w] & mask != 0
    }

    /// Columns set in `row`, ascending.
    pub fn row_ones(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        let start = row * self.words_per_row;
        self.words[start..start + self.words_per_row]
            .iter()
            .enumerate()
            .flat_map(move |(k, &word)| {
                (0..WORD_BITS)
                    .filter(move |bit| word & (1u32 << bit) != 0)
                    .map(move |bit| k * WORD_BITS + bit)
            })
    }

    /// Every set bit with `row <= col`, in row-major order.
    ///
    /// For a symmetric matrix this lists each unordered pair exactly once.
    pub fn upper_ones(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n).flat_map(move |row| {
            self.row_ones(row)
                .filter(move |&col| col >= row)
                .map(move |col| (row, col))
        })
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
