//! The error type shared by the whole library.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::ecc::BchError;

/// The external resources needed before any correction can begin
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Resource {
    Image,
    OutputDir,
    Config,
}

impl Resource {
    /// The status reported to the caller when this resource is missing
    pub fn status(self) -> i32 {
        match self {
            Resource::Image => -1,
            Resource::OutputDir => -2,
            Resource::Config => -3,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Image => "image file",
            Resource::OutputDir => "output directory",
            Resource::Config => "configuration file",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The configuration is inconsistent or incomplete; detected before any page is touched.
    #[error("configuration error: {0}")]
    Config(String),

    /// A page had more bitflips than its ECC can fix, and the layout is strict about it.
    #[error("uncorrectable bitflips in page at: {offset:#010x} (partition {partition})")]
    Uncorrectable { partition: String, offset: u64 },

    /// The corrected output didn't come out at the precomputed size. This is a bug.
    #[error("partition {partition}: corrected {actual} bytes, expected {expected}")]
    SizeMismatch {
        partition: String,
        expected: usize,
        actual: usize,
    },

    #[error("{resource} {} not found", path.display())]
    MissingResource { resource: Resource, path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for building an [`Error::Config`]
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

impl From<BchError> for Error {
    fn from(value: BchError) -> Self {
        Error::Config(value.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Like `anyhow::ensure!`, but producing an [`Error::Config`]
macro_rules! ensure_config {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::Error::Config(format!($($arg)+)));
        }
    };
}
pub(crate) use ensure_config;
