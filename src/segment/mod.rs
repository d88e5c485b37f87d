pub mod naming;
pub mod reader;
pub mod writer;

pub use naming::{derive_segment_path, parse_segment_suffix, SEGMENT_PREFIX};
pub use reader::{Reader, RecordOutcome};
pub use writer::Writer;
