use libc::c_int;
use rsmpeg::error::RsmpegError;
use rsmpeg::ffi;
use thiserror::Error;

/// `AVERROR(EAGAIN)`: the native call wants more input before it can produce output.
pub(crate) const AVERROR_EAGAIN: c_int = -(ffi::EAGAIN as c_int);

/// Errors surfaced by the playback engine. Failures inside the ffmpeg backend are
/// wrapped in `Backend`.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The container could not be opened or exposes no usable audio or video stream.
    #[error("failed to open media: {0}")]
    OpenFailed(String),

    /// No decoder is registered for the stream's codec id.
    #[error("no decoder found for codec '{0}'")]
    DecoderNotFound(String),

    /// A decoder was found but its codec context could not be opened.
    #[error("failed to open codec '{0}'")]
    CodecOpenFailed(String),

    /// The demuxer reported an unrecoverable read error.
    #[error("failed to read from input: {0}")]
    ReadFailed(String),

    /// A seek request could not be satisfied; the position is unchanged.
    #[error("seek failed: {0}")]
    SeekFailed(String),

    /// A single frame could not be materialised into a block.
    #[error("failed to convert frame: {0}")]
    ConvertFailed(String),

    /// The engine (or a handle into it) was used after `close`.
    #[error("media engine has been disposed")]
    Disposed,

    /// The command was pre-empted by `close` or by a newer coalescing seek.
    #[error("command was cancelled")]
    Cancelled,

    /// A media type outside audio/video/subtitle was requested.
    #[error("unknown media type")]
    UnknownMediaType,

    #[error(transparent)]
    Backend(#[from] RsmpegError),
}

pub type Result<T> = std::result::Result<T, MediaError>;

/// Render a raw `AVERROR` code through `av_strerror`.
pub(crate) fn averror_string(code: c_int) -> String {
    let mut buffer = [0u8; ffi::AV_ERROR_MAX_STRING_SIZE as usize];
    unsafe {
        if ffi::av_strerror(code, buffer.as_mut_ptr() as *mut libc::c_char, buffer.len()) < 0 {
            return format!("unknown error code {code}");
        }
    }
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..end]).into_owned()
}
