//! Deterministic ranking among the formats a track is offered in.
//!
//! Audio-only formats win; without any, formats that merely carry audio are
//! considered. Within a group the highest audio bitrate (falling back to
//! the total bitrate) wins, ties go to the smallest format id.

use std::cmp::Ordering;

use super::backend::StreamFormat;

fn has(codec: Option<&str>) -> bool {
    codec.is_some_and(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"))
}

fn is_audio_only(f: &StreamFormat) -> bool {
    has(f.audio_codec.as_deref()) && !has(f.video_codec.as_deref())
}

fn bitrate(f: &StreamFormat) -> f64 {
    f.audio_bitrate.or(f.total_bitrate).unwrap_or(0.0)
}

fn rank(a: &StreamFormat, b: &StreamFormat) -> Ordering {
    bitrate(b)
        .total_cmp(&bitrate(a))
        .then_with(|| a.format_id.cmp(&b.format_id))
}

/// Best streamable audio format, if any.
pub fn best_audio_format(formats: &[StreamFormat]) -> Option<&StreamFormat> {
    let streamable = |f: &&StreamFormat| f.url.as_deref().is_some_and(|u| !u.is_empty());

    let audio_only: Vec<&StreamFormat> = formats
        .iter()
        .filter(|f| is_audio_only(f))
        .filter(streamable)
        .collect();

    let mut candidates = if audio_only.is_empty() {
        formats
            .iter()
            .filter(|f| has(f.audio_codec.as_deref()))
            .filter(streamable)
            .collect()
    } else {
        audio_only
    };

    candidates.sort_by(|a, b| rank(a, b));
    candidates.into_iter().next()
}
