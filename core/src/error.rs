use thiserror::Error;

/// Failures while decoding a variable-byte buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer truncated after {consumed} bytes")]
    Truncated { consumed: usize },

    #[error("encoded value does not fit in 64 bits")]
    Overflow,
}

/// Main error type for snapshot and decode operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Codec(#[from] CodecError),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

impl Error {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }

    /// True when the failure came from malformed input rather than the filesystem.
    pub fn is_corruption(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            Error::Codec(_) | Error::Corrupt(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
