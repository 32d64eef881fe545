pub mod bins;
pub mod bitmatrix;
pub mod coe;
pub mod constants;
pub mod format;
pub mod report;
pub mod solver;
pub mod tag;
pub mod time;
pub mod xover_errors;

#[cfg(feature = "progress")]
pub mod progress_bar;
