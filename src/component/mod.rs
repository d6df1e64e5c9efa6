pub mod audio;
pub mod subtitle;
pub mod video;

use std::ffi::CStr;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use libc::c_int;
use parking_lot::{Condvar, Mutex};
use rsmpeg::avcodec::{AVCodec, AVCodecContext};
use rsmpeg::avformat::AVFormatContextInput;
use rsmpeg::error::RsmpegError;
use rsmpeg::ffi;

use crate::block::{Block, BlockPayload};
use crate::error::{averror_string, MediaError, Result};
use crate::frame::{Frame, FrameSource};
use crate::options::{DictionaryRef, MediaOptions};
use crate::packet::Packet;
use crate::queue::{FrameQueue, PacketQueue};
use crate::rational::Rational;
use crate::stream::{MediaType, StreamInfo};
use crate::time::Ticks;

use self::audio::AudioConverter;
use self::subtitle::SubtitleConverter;
use self::video::VideoConverter;

/// Decoder-side state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No packet seen since creation or the last flush.
    Idle,
    /// At least one real packet has been sent.
    Active,
    /// A null drain packet has been sent; buffered frames are being emitted.
    Draining,
    /// The codec reported that no more output remains.
    Flushed,
}

/// Codec context plus the bookkeeping the decode protocol needs. Lives behind
/// the component's decode mutex.
pub(crate) struct ComponentDecoder {
    codec_ctx: AVCodecContext,
    state: DecoderState,
    /// Packets already pushed to the codec, released once output appears.
    sent: PacketQueue,
    media_type: MediaType,
    stream_index: usize,
    time_base: Rational,
    start_time_offset: Ticks,
    /// Duration of the previous frame, the fallback when a frame reports none.
    last_duration: Ticks,
    frame_rate: Rational,
}

unsafe impl Send for ComponentDecoder {}

/// Type-specialised materialisation state. Lives behind the component's
/// convert mutex so conversion can overlap with decoding.
pub(crate) enum Converter {
    Audio(AudioConverter),
    Video(VideoConverter),
    Subtitle(SubtitleConverter),
}

unsafe impl Send for Converter {}

/// Lifetime counters for one component, taken as a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ComponentStatistics {
    pub packets_received: u64,
    pub frames_decoded: u64,
    pub pending_packets: usize,
    pub pending_frames: usize,
    pub buffered_duration: Ticks,
}

/// One selected stream: its codec, pending queues, and materialisation state.
///
/// The packet queue, frame queue, decoder and converter each sit behind their
/// own lock, so the reader, decoder and block workers only contend when they
/// touch the same stage of the same stream.
pub struct MediaComponent {
    pub info: StreamInfo,
    /// Offset subtracted from all timestamps so external positions are 0-based.
    pub start_time_offset: Ticks,
    pub duration: Ticks,
    packets: Mutex<PacketQueue>,
    packets_ready: Condvar,
    frames: Mutex<FrameQueue>,
    decoder: Mutex<ComponentDecoder>,
    converter: Mutex<Converter>,
    packets_received: AtomicU64,
    frames_decoded: AtomicU64,
}

impl MediaComponent {
    /// Open the codec for `stream_index` and build the component around it.
    ///
    /// Container-level start time and duration serve as fallbacks when the
    /// stream itself reports no timestamps.
    pub(crate) fn open(
        input: &AVFormatContextInput,
        stream_index: usize,
        media_type: MediaType,
        options: &MediaOptions,
        container_start: Ticks,
        container_duration: Ticks,
    ) -> Result<Self> {
        let stream = input
            .streams()
            .get(stream_index)
            .ok_or(RsmpegError::FindStreamInfoError(
                ffi::AVERROR_STREAM_NOT_FOUND,
            ))?;

        let codec_id = stream.codecpar().codec_id;
        let codec_name = unsafe {
            CStr::from_ptr(ffi::avcodec_get_name(codec_id))
                .to_string_lossy()
                .into_owned()
        };

        let decoder = AVCodec::find_decoder(codec_id)
            .ok_or_else(|| MediaError::DecoderNotFound(codec_name.clone()))?;

        let mut codec_ctx = AVCodecContext::new(&decoder);
        codec_ctx.set_time_base(stream.time_base);
        codec_ctx.apply_codecpar(&stream.codecpar())?;

        unsafe {
            let ctx = codec_ctx.as_mut_ptr();
            (*ctx).pkt_timebase = stream.time_base;
            (*ctx).thread_count = 0;
            if options.enable_fast_decoding {
                (*ctx).flags2 |= ffi::AV_CODEC_FLAG2_FAST as c_int;
            }
            if options.enable_low_res {
                (*ctx).lowres = (*decoder.as_ptr()).max_lowres as c_int;
            }
        }

        let mut codec_options = options.codec_dictionary(media_type, stream_index);
        let ret = unsafe {
            ffi::avcodec_open2(codec_ctx.as_mut_ptr(), ptr::null(), codec_options.as_mut_ptr_ref())
        };
        if ret < 0 {
            return Err(MediaError::CodecOpenFailed(format!(
                "{codec_name}: {}",
                averror_string(ret)
            )));
        }
        for (key, value) in codec_options.iter() {
            tracing::warn!(target: "component", codec = %codec_name, key, value,
                "codec option not recognised");
        }

        let time_base = Rational::from(stream.time_base);
        let start_time = if stream.start_time == ffi::AV_NOPTS_VALUE {
            container_start
        } else {
            Ticks::from_stream_units(stream.start_time, time_base)
        };
        let duration = if stream.duration == ffi::AV_NOPTS_VALUE || stream.duration <= 0 {
            container_duration
        } else {
            Ticks::from_stream_units(stream.duration, time_base)
        };
        let frame_rate = Rational::from(stream.avg_frame_rate);
        let is_attached_picture =
            crate::flags::AvDispositionFlags::from_bits_truncate(stream.disposition as libc::c_uint)
                .contains(crate::flags::AvDispositionFlags::ATTACHED_PIC);
        let metadata = unsafe { DictionaryRef::wrap(stream.metadata) }.to_map();

        let info = StreamInfo {
            index: stream_index,
            media_type,
            codec_name,
            time_base,
            start_time,
            duration,
            frame_rate,
            is_attached_picture,
            metadata,
        };

        tracing::debug!(target: "component", stream = %info, "component opened");

        let converter = match media_type {
            MediaType::Audio => Converter::Audio(AudioConverter::new(options.audio_output)),
            MediaType::Video => {
                Converter::Video(VideoConverter::new(options.video_filter_graph.clone()))
            }
            MediaType::Subtitle => Converter::Subtitle(SubtitleConverter::new()),
        };

        Ok(Self {
            start_time_offset: start_time,
            duration,
            packets: Mutex::new(PacketQueue::new()),
            packets_ready: Condvar::new(),
            frames: Mutex::new(FrameQueue::new()),
            decoder: Mutex::new(ComponentDecoder {
                codec_ctx,
                state: DecoderState::Idle,
                sent: PacketQueue::new(),
                media_type,
                stream_index,
                time_base,
                start_time_offset: start_time,
                last_duration: Ticks::ZERO,
                frame_rate,
            }),
            converter: Mutex::new(converter),
            packets_received: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            info,
        })
    }

    #[inline]
    pub fn media_type(&self) -> MediaType {
        self.info.media_type
    }

    #[inline]
    pub fn stream_index(&self) -> usize {
        self.info.index
    }

    /// Hand a packet read from the demuxer to this component.
    pub(crate) fn enqueue_packet(&self, packet: Packet) {
        if !packet.is_drain() {
            self.packets_received.fetch_add(1, Ordering::Relaxed);
        }
        self.packets.lock().push(packet);
        self.packets_ready.notify_all();
    }

    pub(crate) fn enqueue_drain_packet(&self) {
        self.enqueue_packet(Packet::drain(self.info.index, self.info.time_base));
    }

    /// Total duration of the packets waiting to be decoded.
    pub fn buffered_duration(&self) -> Ticks {
        self.packets.lock().duration()
    }

    /// Bytes held by the pending packet queue.
    pub fn buffered_length(&self) -> usize {
        self.packets.lock().buffer_length()
    }

    pub fn pending_packet_count(&self) -> usize {
        self.packets.lock().len()
    }

    /// Block until a packet is available or the timeout passes.
    pub(crate) fn wait_for_packets(&self, timeout: Duration) -> bool {
        let mut queue = self.packets.lock();
        if !queue.is_empty() {
            return true;
        }
        self.packets_ready.wait_for(&mut queue, timeout);
        !queue.is_empty()
    }

    pub(crate) fn push_frame(&self, frame: Frame) {
        self.frames.lock().push(frame);
    }

    pub(crate) fn pop_frame(&self) -> Option<Frame> {
        self.frames.lock().pop()
    }

    pub fn pending_frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn decoder_state(&self) -> DecoderState {
        self.decoder.lock().state
    }

    /// Dequeue one packet and run the codec's send/receive protocol on it.
    /// Returns all frames the codec produced, already on the tick scale.
    pub(crate) fn decode_next(&self) -> Result<Vec<Frame>> {
        let packet = match self.packets.lock().pop() {
            Some(packet) => packet,
            None => return Ok(Vec::new()),
        };

        let mut decoder = self.decoder.lock();
        match decoder.decode(packet) {
            Ok(frames) => {
                self.frames_decoded
                    .fetch_add(frames.len() as u64, Ordering::Relaxed);
                Ok(frames)
            }
            Err(error) => {
                // A failing packet leaves the codec in an undefined spot;
                // flush so the next keyframe restarts it cleanly.
                decoder.flush();
                Err(error)
            }
        }
    }

    /// Snapshot of the component's counters and queue depths.
    pub fn statistics(&self) -> ComponentStatistics {
        let (pending_packets, buffered_duration) = {
            let packets = self.packets.lock();
            (packets.len(), packets.duration())
        };
        ComponentStatistics {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            pending_packets,
            pending_frames: self.frames.lock().len(),
            buffered_duration,
        }
    }

    /// Materialise `frame` into `block` using this component's converter.
    pub(crate) fn materialise(&self, frame: &Frame, block: &mut Block) -> Result<()> {
        if frame.is_stale() {
            return Err(MediaError::ConvertFailed(
                "frame released before materialisation".into(),
            ));
        }
        let mut converter = self.converter.lock();
        match (&mut *converter, frame.source(), block.payload_mut()) {
            (Converter::Audio(audio), Some(FrameSource::Audio(native)), BlockPayload::Audio(target)) => {
                audio.materialise(native, target)
            }
            (Converter::Video(video), Some(FrameSource::Video(native)), BlockPayload::Video(target)) => {
                video.materialise(native, self.info.time_base, target)
            }
            (
                Converter::Subtitle(subtitle),
                Some(FrameSource::Subtitle(source)),
                BlockPayload::Subtitle(target),
            ) => subtitle.materialise(source, target),
            _ => Err(MediaError::ConvertFailed(
                "frame and block media types do not match".into(),
            )),
        }
    }

    /// Drop all pending packets and frames and reset the codec. The decoder
    /// returns to `Idle` regardless of its previous state.
    pub(crate) fn clear_queues(&self) {
        self.packets.lock().clear();
        self.frames.lock().clear();
        let mut decoder = self.decoder.lock();
        decoder.sent.clear();
        decoder.flush();
    }
}

impl ComponentDecoder {
    fn decode(&mut self, packet: Packet) -> Result<Vec<Frame>> {
        if self.media_type == MediaType::Subtitle {
            return subtitle::decode_subtitle(self, packet);
        }
        self.decode_audio_video(packet)
    }

    /// New-style send/receive loop shared by audio and video.
    fn decode_audio_video(&mut self, packet: Packet) -> Result<Vec<Frame>> {
        let compressed_size = packet.size();

        if packet.is_drain() {
            self.codec_ctx.send_packet(None)?;
            if self.state != DecoderState::Flushed {
                self.state = DecoderState::Draining;
            }
        } else {
            self.codec_ctx.send_packet(packet.as_native())?;
            if self.state == DecoderState::Idle {
                self.state = DecoderState::Active;
            }
        }
        self.sent.push(packet);

        let mut frames = Vec::new();
        loop {
            match self.codec_ctx.receive_frame() {
                Ok(native) => frames.push(self.wrap_frame(native, compressed_size)),
                Err(RsmpegError::DecoderDrainError) => break,
                Err(RsmpegError::DecoderFlushedError) => {
                    if self.state == DecoderState::Draining {
                        self.state = DecoderState::Flushed;
                    }
                    break;
                }
                Err(error) => return Err(error.into()),
            }
        }

        if !frames.is_empty() {
            self.sent.clear();
        }
        Ok(frames)
    }

    /// Wrap a raw decoded frame, normalising its timing to 0-based ticks.
    fn wrap_frame(&mut self, native: rsmpeg::avutil::AVFrame, compressed_size: usize) -> Frame {
        let pts_units = if native.best_effort_timestamp != ffi::AV_NOPTS_VALUE {
            native.best_effort_timestamp
        } else if native.pts != ffi::AV_NOPTS_VALUE {
            native.pts
        } else {
            native.pkt_dts
        };
        let start_time =
            Ticks::from_stream_units(pts_units, self.time_base) - self.start_time_offset;

        let duration = match self.media_type {
            MediaType::Audio if native.sample_rate > 0 => Ticks::from_seconds_f64(
                native.nb_samples as f64 / native.sample_rate as f64,
            ),
            _ if native.duration > 0 => {
                Ticks::from_stream_units(native.duration, self.time_base)
            }
            _ if !self.frame_rate.is_zero() && self.frame_rate.as_f64() > 0.0 => {
                Ticks::from_seconds_f64(1.0 / self.frame_rate.as_f64())
            }
            _ => self.last_duration,
        };
        self.last_duration = duration;

        let source = match self.media_type {
            MediaType::Audio => FrameSource::Audio(native),
            _ => FrameSource::Video(native),
        };
        Frame::new(
            self.media_type,
            self.stream_index,
            start_time,
            duration,
            compressed_size,
            source,
        )
    }

    pub(crate) fn flush(&mut self) {
        unsafe {
            ffi::avcodec_flush_buffers(self.codec_ctx.as_mut_ptr());
        }
        self.state = DecoderState::Idle;
    }

    pub(crate) fn codec_ptr(&mut self) -> *mut ffi::AVCodecContext {
        self.codec_ctx.as_mut_ptr()
    }
}
