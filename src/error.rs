use std::io;
use std::path::PathBuf;

/// Error taxonomy for the block log.
///
/// `NotFound` and `UnexpectedEndOfSegment` are ordinary, expected outcomes
/// that callers are meant to match on; everything else indicates that the
/// manager could not complete the requested operation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found")]
    NotFound,

    /// A length varint was read but the payload (or the varint itself) was
    /// truncated mid-file. Only ever surfaced past the checkpointed extent
    /// of the current segment; the recovery scanner absorbs it internally.
    #[error("unexpected end of segment")]
    UnexpectedEndOfSegment,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("index error: {0}")]
    Index(#[from] sled::Error),

    #[error("startup precondition failed: {0}")]
    StartupPrecondition(String),

    #[error("malformed bytes on decode: {0}")]
    Decode(String),

    #[error("config error loading {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
