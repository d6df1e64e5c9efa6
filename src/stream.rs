use std::collections::HashMap;

use rsmpeg::ffi;

use crate::error::MediaError;
use crate::rational::Rational;
use crate::time::Ticks;

/// The three media types the engine plays back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
    Subtitle,
}

impl MediaType {
    pub const ALL: [MediaType; 3] = [MediaType::Audio, MediaType::Video, MediaType::Subtitle];

    pub fn from_native(value: ffi::AVMediaType) -> Result<Self, MediaError> {
        match value {
            ffi::AVMEDIA_TYPE_AUDIO => Ok(MediaType::Audio),
            ffi::AVMEDIA_TYPE_VIDEO => Ok(MediaType::Video),
            ffi::AVMEDIA_TYPE_SUBTITLE => Ok(MediaType::Subtitle),
            _ => Err(MediaError::UnknownMediaType),
        }
    }

    pub(crate) fn to_native(self) -> ffi::AVMediaType {
        match self {
            MediaType::Audio => ffi::AVMEDIA_TYPE_AUDIO,
            MediaType::Video => ffi::AVMEDIA_TYPE_VIDEO,
            MediaType::Subtitle => ffi::AVMEDIA_TYPE_SUBTITLE,
        }
    }

    fn type_char(self) -> char {
        match self {
            MediaType::Audio => 'a',
            MediaType::Video => 'v',
            MediaType::Subtitle => 's',
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Subtitle => "subtitle",
        };
        write!(f, "{name}")
    }
}

/// A textual stream selector: `<index>`, `<type-char>`, `<type-char>:<index>`
/// or empty (matches everything).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSpecifier {
    Any,
    Index(usize),
    Type(MediaType),
    TypeIndex(MediaType, usize),
}

impl StreamSpecifier {
    pub fn parse(input: &str) -> Option<Self> {
        if input.is_empty() {
            return Some(StreamSpecifier::Any);
        }
        if let Ok(index) = input.parse::<usize>() {
            return Some(StreamSpecifier::Index(index));
        }

        let mut parts = input.splitn(2, ':');
        let media_type = match parts.next()? {
            "a" => MediaType::Audio,
            "v" => MediaType::Video,
            "s" => MediaType::Subtitle,
            _ => return None,
        };
        match parts.next() {
            None => Some(StreamSpecifier::Type(media_type)),
            Some(rest) => rest
                .parse::<usize>()
                .ok()
                .map(|index| StreamSpecifier::TypeIndex(media_type, index)),
        }
    }

    pub fn matches(&self, media_type: MediaType, stream_index: usize) -> bool {
        match self {
            StreamSpecifier::Any => true,
            StreamSpecifier::Index(index) => *index == stream_index,
            StreamSpecifier::Type(wanted) => *wanted == media_type,
            StreamSpecifier::TypeIndex(wanted, index) => {
                *wanted == media_type && *index == stream_index
            }
        }
    }
}

impl std::fmt::Display for StreamSpecifier {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StreamSpecifier::Any => Ok(()),
            StreamSpecifier::Index(index) => write!(f, "{index}"),
            StreamSpecifier::Type(t) => write!(f, "{}", t.type_char()),
            StreamSpecifier::TypeIndex(t, index) => write!(f, "{}:{index}", t.type_char()),
        }
    }
}

/// Immutable facts about a selected stream, captured at open time so the rest
/// of the engine never needs to reach back into the native stream structure.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    pub media_type: MediaType,
    pub codec_name: String,
    pub time_base: Rational,
    /// First timestamp the stream reports, already on the tick scale.
    pub start_time: Ticks,
    pub duration: Ticks,
    /// Average frame rate for video streams, zero when unknown.
    pub frame_rate: Rational,
    pub is_attached_picture: bool,
    pub metadata: HashMap<String, String>,
}

impl std::fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "StreamInfo {{ index: {}, type: {}, codec: {}, time_base: {} }}",
            self.index, self.media_type, self.codec_name, self.time_base
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_specifiers() {
        assert_eq!(StreamSpecifier::parse(""), Some(StreamSpecifier::Any));
        assert_eq!(StreamSpecifier::parse("3"), Some(StreamSpecifier::Index(3)));
        assert_eq!(
            StreamSpecifier::parse("a"),
            Some(StreamSpecifier::Type(MediaType::Audio))
        );
        assert_eq!(
            StreamSpecifier::parse("v:2"),
            Some(StreamSpecifier::TypeIndex(MediaType::Video, 2))
        );
        assert_eq!(StreamSpecifier::parse("x"), None);
        assert_eq!(StreamSpecifier::parse("a:x"), None);
    }

    #[test]
    fn specifier_matching() {
        let spec = StreamSpecifier::parse("a:1").unwrap();
        assert!(spec.matches(MediaType::Audio, 1));
        assert!(!spec.matches(MediaType::Audio, 0));
        assert!(!spec.matches(MediaType::Video, 1));

        assert!(StreamSpecifier::Any.matches(MediaType::Subtitle, 9));
        assert!(StreamSpecifier::Index(2).matches(MediaType::Video, 2));
    }
}
