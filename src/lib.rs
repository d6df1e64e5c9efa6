pub mod block;
pub mod buffer;
pub mod circular;
pub mod clock;
pub mod commands;
pub mod component;
pub mod container;
pub mod engine;
pub mod error;
mod filtergraph;
mod flags;
pub mod frame;
pub mod init;
pub mod iostream;
pub mod location;
pub mod options;
pub mod packet;
pub mod queue;
pub mod rational;
pub mod render;
pub mod stream;
pub mod time;
mod workers;

pub use block::{AudioBlock, Block, BlockPayload, SubtitleBlock, VideoBlock};
pub use buffer::BlockBuffer;
pub use circular::CircularBuffer;
pub use clock::RealTimeClock;
pub use commands::CommandHandle;
pub use component::subtitle::{strip_ass_formatting, strip_srt_formatting};
pub use component::{ComponentStatistics, DecoderState, MediaComponent};
pub use container::{Container, MediaInfo, MediaSource};
pub use engine::{EngineEvent, EngineStatistics, MediaEngine};
pub use error::{MediaError, Result};
pub use frame::{Frame, SubtitleTextType};
pub use init::{initialize, InitFlags};
pub use iostream::MediaInputStream;
pub use location::Location;
pub use options::{AudioOutputSpec, LogLevel, MediaOptions};
pub use packet::Packet;
pub use rational::Rational;
pub use render::{AudioRingRenderer, BlockRenderer, RendererSet};
pub use rsmpeg::ffi;
pub use stream::{MediaType, StreamInfo, StreamSpecifier};
pub use time::{Ticks, TICKS_PER_MILLISECOND, TICKS_PER_SECOND};

/// Canonical audio sample format of materialised blocks.
pub const AUDIO_SAMPLE_FORMAT: ffi::AVSampleFormat = ffi::AV_SAMPLE_FMT_S16;
/// Canonical pixel format of materialised blocks.
pub const VIDEO_PIXEL_FORMAT: ffi::AVPixelFormat = ffi::AV_PIX_FMT_BGR24;
