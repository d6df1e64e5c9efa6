use rsmpeg::avutil::AVFrame;

use crate::stream::MediaType;
use crate::time::Ticks;

/// How a subtitle stream encodes its payload text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleTextType {
    /// Plain text, possibly with SRT-style `<...>` markup.
    Text,
    /// Advanced SubStation Alpha dialogue lines.
    Ass,
    /// Bitmap subtitles; carried through as a placeholder without pixels.
    Bitmap,
}

/// Raw subtitle payload extracted from the legacy decode API. The native
/// rectangle memory is released during decode, so this is plain Rust data.
#[derive(Debug, Clone)]
pub struct SubtitleSource {
    pub text_type: SubtitleTextType,
    pub rects: Vec<String>,
}

/// The decoded payload backing a [`Frame`].
pub(crate) enum FrameSource {
    Audio(AVFrame),
    Video(AVFrame),
    Subtitle(SubtitleSource),
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameSource::Audio(_) => write!(f, "FrameSource::Audio"),
            FrameSource::Video(_) => write!(f, "FrameSource::Video"),
            FrameSource::Subtitle(source) => write!(f, "FrameSource::Subtitle({source:?})"),
        }
    }
}

/// A decoded unit on its way from the codec to a block buffer.
///
/// The frame owns its native memory through `source`; releasing it exactly
/// once makes the frame stale, after which it may no longer be materialised.
#[derive(Debug)]
pub struct Frame {
    media_type: MediaType,
    stream_index: usize,
    start_time: Ticks,
    duration: Ticks,
    /// Size of the compressed input that produced this frame, for statistics.
    compressed_size: usize,
    source: Option<FrameSource>,
}

impl Frame {
    pub(crate) fn new(
        media_type: MediaType,
        stream_index: usize,
        start_time: Ticks,
        duration: Ticks,
        compressed_size: usize,
        source: FrameSource,
    ) -> Self {
        Self {
            media_type,
            stream_index,
            start_time,
            duration,
            compressed_size,
            source: Some(source),
        }
    }

    #[inline]
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    #[inline]
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    #[inline]
    pub fn start_time(&self) -> Ticks {
        self.start_time
    }

    #[inline]
    pub fn duration(&self) -> Ticks {
        self.duration
    }

    #[inline]
    pub fn end_time(&self) -> Ticks {
        self.start_time + self.duration
    }

    #[inline]
    pub fn compressed_size(&self) -> usize {
        self.compressed_size
    }

    /// A stale frame has given up its native memory and cannot be materialised.
    #[inline]
    pub fn is_stale(&self) -> bool {
        self.source.is_none()
    }

    pub(crate) fn source(&self) -> Option<&FrameSource> {
        self.source.as_ref()
    }

    /// Free the native payload. Safe to call more than once.
    pub fn release(&mut self) {
        self.source = None;
    }
}

unsafe impl Send for Frame {}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtitle_frame(start_ms: i64, duration_ms: i64) -> Frame {
        Frame::new(
            MediaType::Subtitle,
            0,
            Ticks::from_millis(start_ms),
            Ticks::from_millis(duration_ms),
            0,
            FrameSource::Subtitle(SubtitleSource {
                text_type: SubtitleTextType::Text,
                rects: vec!["hello".into()],
            }),
        )
    }

    #[test]
    fn end_time_is_start_plus_duration() {
        let frame = subtitle_frame(1_000, 500);
        assert_eq!(frame.end_time(), Ticks::from_millis(1_500));
    }

    #[test]
    fn release_marks_stale() {
        let mut frame = subtitle_frame(0, 100);
        assert!(!frame.is_stale());
        frame.release();
        assert!(frame.is_stale());
        frame.release();
        assert!(frame.is_stale());
    }
}
