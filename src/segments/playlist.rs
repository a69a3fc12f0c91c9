//! HLS media playlist

use std::fmt::Write;

use super::files::segment_name;
use super::Segments;

/// Render the live window as an M3U8 media playlist.
///
/// Segment URIs are the file names written by the segment store, relative
/// to the playlist.
pub fn render(segments: &Segments, base: &str, ext: &str) -> String {
    let target = (segments.max_duration() as u32).div_ceil(1000).max(1);

    let mut out = String::with_capacity(128 + segments.count() * 48);
    out.push_str("#EXTM3U\n#EXT-X-VERSION:3\n");
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{target}");
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", segments.sequence());

    for (sequence, segment) in segments.iter() {
        if segment.is_discontinuous() {
            out.push_str("#EXT-X-DISCONTINUITY\n");
        }
        let _ = writeln!(out, "#EXTINF:{:.3},", segment.duration() as f64 / 1000.0);
        out.push_str(&segment_name(base, sequence, segment.duration(), ext));
        out.push('\n');
    }

    if segments.is_ended() {
        out.push_str("#EXT-X-ENDLIST\n");
    }
    out
}
