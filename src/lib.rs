//! Append-only, crash-recoverable block log with a secondary key-value
//! index over block numbers, block hashes, and transaction ids.
//!
//! The log itself is a sequence of fixed-capacity segment files holding
//! length-prefixed, opaque block payloads. A durable checkpoint tracks the
//! current segment, its confirmed size, and the chain height; an embedded
//! key-value store (`sled`) indexes block and transaction locations for
//! point lookups. See [`Manager`] for the entry point.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod index;
pub mod manager;
pub mod recovery;
pub mod segment;
pub mod stream;
pub mod types;
pub mod varint;

pub use config::Config;
pub use error::{Error, Result};
pub use manager::{BlockIterator, Manager};
pub use types::{BlockCodec, BlockEnvelope, BlockNum, BlockchainInfo, FileLocPointer, SegmentNum, TxOffset};
