use std::ffi::CString;
use std::path::{Path, PathBuf};

use url::Url;

/// Addressable media input: a local file path or a URL.
///
/// Byte-stream inputs are handled separately through
/// [`MediaInputStream`](crate::iostream::MediaInputStream); everything the
/// native demuxer can open by name goes through a `Location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Network(Url),
}

impl Location {
    /// Parse a user-supplied source string. Anything that parses as a URL with
    /// a scheme longer than one character is treated as a network location;
    /// the rest (including Windows drive letters) as a file path.
    pub fn parse(input: &str) -> Self {
        match Url::parse(input) {
            Ok(url) if url.scheme().len() > 1 => Location::Network(url),
            _ => Location::File(PathBuf::from(input)),
        }
    }

    /// URL scheme in lowercase, if this is a network location.
    pub fn scheme(&self) -> Option<&str> {
        match self {
            Location::File(_) => None,
            Location::Network(url) => Some(url.scheme()),
        }
    }

    /// Schemes whose reads block on the network and must be paced rather than
    /// retried (rtp/udp push streams).
    pub fn is_realtime_scheme(&self) -> bool {
        matches!(self.scheme(), Some("rtp") | Some("udp"))
    }

    pub fn as_str(&self) -> String {
        match self {
            Location::File(path) => path.display().to_string(),
            Location::Network(url) => url.to_string(),
        }
    }

    /// NUL-terminated form for the native open call.
    pub(crate) fn as_cstring(&self) -> CString {
        CString::new(self.as_str()).unwrap_or_default()
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        Location::parse(value)
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        Location::parse(&value)
    }
}

impl From<&Path> for Location {
    fn from(value: &Path) -> Self {
        Location::File(value.to_path_buf())
    }
}

impl From<PathBuf> for Location {
    fn from(value: PathBuf) -> Self {
        Location::File(value)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_and_paths() {
        assert!(matches!(Location::parse("rtsp://host/stream"), Location::Network(_)));
        assert!(matches!(Location::parse("media/clip.mp4"), Location::File(_)));
        assert!(matches!(Location::parse("C:\\media\\clip.mp4"), Location::File(_)));
    }

    #[test]
    fn realtime_schemes() {
        assert!(Location::parse("udp://239.0.0.1:1234").is_realtime_scheme());
        assert!(Location::parse("rtp://host:5004").is_realtime_scheme());
        assert!(!Location::parse("rtsp://host/stream").is_realtime_scheme());
        assert!(!Location::parse("clip.mp4").is_realtime_scheme());
    }
}
