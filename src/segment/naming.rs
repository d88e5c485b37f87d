use std::path::{Path, PathBuf};

use crate::types::SegmentNum;

pub const SEGMENT_PREFIX: &str = "blockfile_";
const SUFFIX_WIDTH: usize = 6;

/// `deriveSegmentPath(rootDir, suffixNum) = rootDir + "/" + "blockfile_" + zeroPad6(suffixNum)`
pub fn derive_segment_path(root_dir: &Path, suffix_num: SegmentNum) -> PathBuf {
    root_dir.join(format!("{SEGMENT_PREFIX}{suffix_num:0width$}", width = SUFFIX_WIDTH))
}

/// Parses a `blockfile_NNNNNN` file name back into its suffix number.
pub fn parse_segment_suffix(file_name: &str) -> Option<SegmentNum> {
    file_name
        .strip_prefix(SEGMENT_PREFIX)
        .filter(|s| s.len() == SUFFIX_WIDTH && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let p = derive_segment_path(Path::new("/tmp/chain"), 7);
        assert_eq!(p, Path::new("/tmp/chain/blockfile_000007"));
        let name = p.file_name().unwrap().to_str().unwrap();
        assert_eq!(parse_segment_suffix(name), Some(7));
    }

    #[test]
    fn rejects_unrelated_names() {
        assert_eq!(parse_segment_suffix("blockfile_abcdef"), None);
        assert_eq!(parse_segment_suffix("blockfile_1"), None);
        assert_eq!(parse_segment_suffix("index.db"), None);
    }
}
