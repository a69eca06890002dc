use std::fmt::Debug;
use thiserror::Error;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
pub enum KdTreeError {
    /// The input point collection was malformed. No tree is produced.
    #[error("Construction error: {0}")]
    Construction(String),

    /// The leading bytes of a stream are not the kd-tree magic number.
    #[error("wrong magic number in kdtree data")]
    BadMagic,

    /// The stream ended before the named field was fully read.
    #[error("unexpected end of input while reading {field}")]
    UnexpectedEof { field: &'static str },

    /// The stream was written by an incompatible format revision.
    #[error("Got v{found} data when expected v{expected}.")]
    UnsupportedVersion { found: u8, expected: u8 },

    /// The stream is complete but its contents are inconsistent.
    #[error("Invalid kdtree data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl KdTreeError {
    /// Map an I/O failure while reading `field`, keeping end-of-input distinct from other errors.
    pub(crate) fn from_read(err: std::io::Error, field: &'static str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            KdTreeError::UnexpectedEof { field }
        } else {
            KdTreeError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, KdTreeError>;
