use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid numeric type selector: {0}")]
    InvalidType(String),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("invalid delta ({0}, {1})")]
    InvalidDelta(i32, i32),

    #[error("cell ({0}, {1}) out of bounds")]
    OutOfBounds(usize, usize),

    #[error("max recursion depth reached at ({0}, {1})")]
    MaxDepthExceeded(usize, usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
