use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// Zero-padding width that keeps `count` indices in lexical order.
///
/// Never narrower than `min_digits`, widened when the largest index needs it.
pub fn padded_width(min_digits: usize, count: usize) -> usize {
    let largest = count.saturating_sub(1);
    min_digits.max(largest.to_string().len())
}

/// `0042.jpg` style frame file name
pub fn frame_file_name(index: usize, width: usize, extension: &str) -> String {
    format!("{:0width$}.{}", index, extension, width = width)
}

/// `batch_0003.mp4` style segment file name
pub fn segment_file_name(index: usize, width: usize) -> String {
    format!("batch_{:0width$}.mp4", index, width = width)
}

/// One image of a frame sequence, with its position carried explicitly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    pub index: usize,
    pub path: PathBuf,
}

impl FrameRecord {
    fn stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|s| s.to_str())
    }
}

/// Ordered set of frame images
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameSequence {
    frames: Vec<FrameRecord>,
}

impl FrameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame; its index is its position in the sequence
    pub fn push(&mut self, path: PathBuf) {
        let index = self.frames.len();
        self.frames.push(FrameRecord { index, path });
    }

    /// Every regular, non-hidden file in `dir`, in lexical file-name order
    pub fn scan<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.is_file() && !is_hidden(&path) {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut sequence = Self::new();
        for path in paths {
            sequence.push(path);
        }
        Ok(sequence)
    }

    /// Map this sequence onto the same-named files in another directory.
    ///
    /// Files are matched by stem, so a tool that changes the extension
    /// (`0001.jpg` -> `0001.png`) still lines up. Records keep their index.
    /// Returns the rebased sequence and how many records had no match.
    pub fn rebase<P: AsRef<Path>>(&self, dir: P) -> Result<(Self, usize)> {
        let available = Self::scan(dir.as_ref())?;
        let by_stem: HashMap<&str, &Path> = available
            .frames
            .iter()
            .filter_map(|r| r.stem().map(|s| (s, r.path.as_path())))
            .collect();

        let mut frames = Vec::with_capacity(self.frames.len());
        let mut missing = 0;
        for record in &self.frames {
            match record.stem().and_then(|s| by_stem.get(s)) {
                Some(path) => frames.push(FrameRecord {
                    index: record.index,
                    path: path.to_path_buf(),
                }),
                None => {
                    debug!("No counterpart for frame {} in {:?}", record.index, dir.as_ref());
                    missing += 1;
                }
            }
        }

        Ok((Self { frames }, missing))
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameRecord> {
        self.frames.iter()
    }
}

/// One encoded segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentRecord {
    pub index: usize,
    pub path: PathBuf,
    pub frame_count: usize,
}

impl SegmentRecord {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_padding_widens_past_min_digits() {
        assert_eq!(padded_width(4, 0), 4);
        assert_eq!(padded_width(4, 10_000), 4);
        assert_eq!(padded_width(4, 10_001), 5);
        assert_eq!(frame_file_name(7, 4, "jpg"), "0007.jpg");
        assert_eq!(segment_file_name(12, 4), "batch_0012.mp4");
        assert_eq!(segment_file_name(12345, 5), "batch_12345.mp4");
    }

    #[test]
    fn test_scan_sorts_lexically_and_skips_hidden() {
        let dir = tempdir().unwrap();
        for name in ["0002.png", "0000.png", ".DS_Store", "0001.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let sequence = FrameSequence::scan(dir.path()).unwrap();
        let names: Vec<_> = sequence
            .iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0000.png", "0001.png", "0002.png"]);
        assert_eq!(sequence.frames()[2].index, 2);
    }

    #[test]
    fn test_rebase_matches_by_stem_and_keeps_index() {
        let source = tempdir().unwrap();
        let restored = tempdir().unwrap();

        let mut sequence = FrameSequence::new();
        for i in 0..3 {
            let path = source.path().join(frame_file_name(i, 4, "jpg"));
            std::fs::write(&path, b"x").unwrap();
            sequence.push(path);
        }
        // Frame 1 was never restored
        std::fs::write(restored.path().join("0000.png"), b"x").unwrap();
        std::fs::write(restored.path().join("0002.png"), b"x").unwrap();

        let (rebased, missing) = sequence.rebase(restored.path()).unwrap();
        assert_eq!(missing, 1);
        assert_eq!(rebased.len(), 2);
        assert_eq!(rebased.frames()[1].index, 2);
        assert_eq!(rebased.frames()[1].path, restored.path().join("0002.png"));
    }
}
