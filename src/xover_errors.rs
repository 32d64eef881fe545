use thiserror::Error;

#[derive(Error, Debug)]
pub enum XoverError {
    #[error("Track already registered: {0}")]
    DuplicateTrack(String),

    #[error("Track not found: {0}")]
    TrackNotFound(String),

    #[error("Track id space is not contiguous: {0}")]
    IdSpaceGap(String),

    #[error("Bin index out of the grid domain: {0}")]
    BadBinIndex(String),

    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Normal equation matrix is singular (pivot {pivot:e} in column {column})")]
    SingularMatrix { column: usize, pivot: f64 },

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid tag definition: {0}")]
    InvalidTag(String),

    #[error("Conflicting tag options: {0}")]
    ConflictingTagOptions(String),

    #[error("Tag mismatch: expected {expected}, found {found}")]
    TagMismatch { expected: String, found: String },

    #[error("Column not found in crossover database: {0}")]
    MissingColumn(String),

    #[error("Error during the nom parsing: {0}")]
    NomParsingError(String),

    #[error("Invalid time value: {0}")]
    InvalidTime(String),

    #[error("No crossovers left after filtering")]
    EmptyDatabase,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl PartialEq for XoverError {
    fn eq(&self, other: &Self) -> bool {
        use XoverError::*;
        match (self, other) {
            (DuplicateTrack(a), DuplicateTrack(b)) => a == b,
            (TrackNotFound(a), TrackNotFound(b)) => a == b,
            (IdSpaceGap(a), IdSpaceGap(b)) => a == b,
            (BadBinIndex(a), BadBinIndex(b)) => a == b,
            (
                MalformedRecord { line: la, reason: ra },
                MalformedRecord { line: lb, reason: rb },
            ) => la == lb && ra == rb,
            (SingularMatrix { column: a, .. }, SingularMatrix { column: b, .. }) => a == b,

            // Wrapped errors are not comparable: same variant means equal
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,

            (InvalidTag(a), InvalidTag(b)) => a == b,
            (ConflictingTagOptions(a), ConflictingTagOptions(b)) => a == b,
            (
                TagMismatch {
                    expected: ea,
                    found: fa,
                },
                TagMismatch {
                    expected: eb,
                    found: fb,
                },
            ) => ea == eb && fa == fb,
            (MissingColumn(a), MissingColumn(b)) => a == b,
            (NomParsingError(a), NomParsingError(b)) => a == b,
            (InvalidTime(a), InvalidTime(b)) => a == b,
            (InvalidParameter(a), InvalidParameter(b)) => a == b,

            (EmptyDatabase, EmptyDatabase) => true,

            _ => false,
        }
    }
}
