//! Segment file naming and cleanup
//!
//! A segment file is named `<base>.<sequence><code><ext>` where `code` is the
//! big-endian 16-bit duration in three URL-safe base64 characters, e.g.
//! sequence 42 lasting 6000 ms is `live.42F3A.ts`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::segment::Segment;
use crate::media::MediaFormat;

/// Three-character code of a duration in milliseconds
pub fn duration_code(duration: u16) -> String {
    URL_SAFE_NO_PAD.encode(duration.to_be_bytes())
}

/// File name of a segment; `ext` includes its dot
pub fn segment_name(base: &str, sequence: u32, duration: u16, ext: &str) -> String {
    format!("{base}.{sequence}{}{ext}", duration_code(duration))
}

/// Parsed segment file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile<'a> {
    pub base: &'a str,
    pub sequence: u32,
    pub duration: u16,
}

/// Recover base, sequence and duration from a file name ending in `ext`.
pub fn parse_segment_name<'a>(file_name: &'a str, ext: &str) -> Option<SegmentFile<'a>> {
    let stem = file_name.strip_suffix(ext)?;
    let (base, tail) = stem.rsplit_once('.')?;
    if base.is_empty() || tail.len() < 4 || !tail.is_ascii() {
        return None;
    }
    let (digits, code) = tail.split_at(tail.len() - 3);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sequence = digits.parse().ok()?;
    let bytes = URL_SAFE_NO_PAD.decode(code).ok()?;
    let duration = u16::from_be_bytes(bytes.try_into().ok()?);
    Some(SegmentFile {
        base,
        sequence,
        duration,
    })
}

/// Remove the `base`/`ext` segment files whose sequence falls outside
/// `first..first + count`. Other files in `dir` are left alone.
///
/// Returns the number of files removed.
pub fn clear(dir: &Path, base: &str, ext: &str, first: u32, count: u32) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(file) = parse_segment_name(name, ext) else {
            continue;
        };
        if file.base != base || file.sequence.wrapping_sub(first) < count {
            continue;
        }
        fs::remove_file(entry.path())?;
        tracing::debug!(file = %name, "stale segment removed");
        removed += 1;
    }
    Ok(removed)
}

/// Persists completed segments of one stream into a directory
#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: PathBuf,
    base: String,
    format: MediaFormat,
}

impl SegmentStore {
    pub fn new(dir: impl Into<PathBuf>, base: impl Into<String>, format: MediaFormat) -> Self {
        Self {
            dir: dir.into(),
            base: base.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> MediaFormat {
        self.format
    }

    /// Write `segment` as number `sequence`, then drop files outside the
    /// live window `first..first + count`.
    pub fn save(&self, sequence: u32, segment: &Segment, first: u32, count: u32) {
        let ext = self.format.extension();
        let name = segment_name(&self.base, sequence, segment.duration(), ext);
        if let Err(e) = fs::write(self.dir.join(&name), segment.encode(self.format)) {
            tracing::warn!(file = %name, error = %e, "failed to write segment");
            return;
        }
        if let Err(e) = clear(&self.dir, &self.base, ext, first, count) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "failed to clear stale segments");
        }
    }
}
