use thiserror::Error;

#[derive(Debug, Error)]
pub enum MartiniError {
    #[error("{what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported encoding {0:?}, expected one of \"terrarium\" or \"mapbox\"")]
    UnsupportedEncoding(String),

    #[error("expected grid size to be 2^n+1, got {0}")]
    InvalidGridSize(usize),

    #[error("max error must be a non-negative number, got {0}")]
    InvalidThreshold(f32),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
