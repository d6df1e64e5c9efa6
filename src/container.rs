use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use libc::c_int;
use parking_lot::Mutex;
use rsmpeg::avcodec::AVPacket;
use rsmpeg::avformat::AVFormatContextInput;
use rsmpeg::ffi;

use crate::block::Block;
use crate::component::MediaComponent;
use crate::error::{averror_string, MediaError, Result, AVERROR_EAGAIN};
use crate::flags::{AvFormatFlags, AvSeekFlags};
use crate::frame::Frame;
use crate::iostream::{AvioBridge, MediaInputStream};
use crate::location::Location;
use crate::options::{DictionaryRef, MediaOptions};
use crate::packet::Packet;
use crate::stream::MediaType;
use crate::time::Ticks;

/// Minimum spacing between demuxer reads on realtime network inputs.
const REALTIME_READ_INTERVAL: Duration = Duration::from_millis(10);

/// Frame-count threshold that triggers a drop pass while seeking.
const SEEK_DROP_THRESHOLD: usize = 24;

/// What the engine is asked to play: something the demuxer can open by name,
/// or a host supplied byte stream.
pub enum MediaSource {
    Location(Location),
    Stream(Box<dyn MediaInputStream>),
}

impl From<Location> for MediaSource {
    fn from(value: Location) -> Self {
        MediaSource::Location(value)
    }
}

impl From<&str> for MediaSource {
    fn from(value: &str) -> Self {
        MediaSource::Location(Location::parse(value))
    }
}

impl From<String> for MediaSource {
    fn from(value: String) -> Self {
        MediaSource::Location(Location::parse(&value))
    }
}

impl From<Box<dyn MediaInputStream>> for MediaSource {
    fn from(value: Box<dyn MediaInputStream>) -> Self {
        MediaSource::Stream(value)
    }
}

/// Container-level facts captured at open time.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub format_name: String,
    pub metadata: HashMap<String, String>,
    pub start_time: Ticks,
    pub duration: Ticks,
    pub bit_rate: i64,
    pub is_stream_realtime: bool,
    pub is_seekable: bool,
    pub seeks_by_bytes: bool,
}

/// Demuxer handle plus the read-side state it protects. Sits behind the
/// container's read lock.
struct Demux {
    input: AVFormatContextInput,
    /// Keeps the custom AVIO callbacks alive for stream inputs. Declared
    /// after `input` so the format context closes first.
    _io_bridge: Option<AvioBridge>,
    requires_picture_attachments: bool,
    last_read_time: Option<Instant>,
}

unsafe impl Send for Demux {}

/// Selected components, at most one per media type.
pub struct ComponentSet {
    audio: Option<Arc<MediaComponent>>,
    video: Option<Arc<MediaComponent>>,
    subtitle: Option<Arc<MediaComponent>>,
}

impl ComponentSet {
    pub fn get(&self, media_type: MediaType) -> Option<&Arc<MediaComponent>> {
        match media_type {
            MediaType::Audio => self.audio.as_ref(),
            MediaType::Video => self.video.as_ref(),
            MediaType::Subtitle => self.subtitle.as_ref(),
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<MediaComponent>> {
        [&self.audio, &self.video, &self.subtitle]
            .into_iter()
            .filter_map(Option::as_ref)
    }

    pub fn by_index(&self, stream_index: usize) -> Option<&Arc<MediaComponent>> {
        self.all().find(|c| c.stream_index() == stream_index)
    }

    pub fn len(&self) -> usize {
        self.all().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The component whose timeline drives seek precision and end-of-media:
    /// video, unless the video stream is attached-picture-only.
    pub fn main(&self) -> Option<&Arc<MediaComponent>> {
        match (&self.video, &self.audio) {
            (Some(video), Some(audio)) if video.info.is_attached_picture => Some(audio),
            (Some(video), _) => Some(video),
            (None, Some(audio)) => Some(audio),
            (None, None) => self.subtitle.as_ref(),
        }
    }
}

/// Owns the demuxer and the per-stream components.
///
/// Locking: the demuxer sits behind one mutex (the read path); every
/// component carries its own decode and convert mutexes, so reading,
/// decoding and materialising different streams proceed concurrently.
pub struct Container {
    pub source: Option<Location>,
    pub options: MediaOptions,
    pub media_info: MediaInfo,
    /// Minimum of the component start offsets, the origin of the 0-based
    /// external timeline.
    pub media_start_time_offset: Ticks,
    components: ComponentSet,
    demux: Mutex<Demux>,
    at_end_of_stream: AtomicBool,
}

/// One read step outcome, used by the reader worker to decide how to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A packet was dispatched to the component owning this media type.
    Packet(MediaType),
    /// A packet arrived for a stream no component owns, or a transient error.
    Skipped,
    /// The demuxer reached end of stream; drain packets were enqueued.
    EndOfStream,
}

impl Container {
    /// Open `source`, probe its format, select the best stream per media
    /// type and construct their components.
    pub fn open(source: MediaSource, options: MediaOptions) -> Result<Self> {
        crate::init::ensure_initialized();
        unsafe {
            ffi::av_log_set_level(options.log_level.to_native());
        }

        let (location, io_bridge) = match source {
            MediaSource::Location(location) => (Some(location), None),
            MediaSource::Stream(stream) => (None, Some(AvioBridge::new(stream)?)),
        };

        let mut format_options = options.format_dictionary();
        let forced_format = match options.forced_input_format.as_deref() {
            None => ptr::null(),
            Some(name) => {
                let name = CString::new(name)
                    .map_err(|_| MediaError::OpenFailed("input format name contains NUL".into()))?;
                let format = unsafe { ffi::av_find_input_format(name.as_ptr()) };
                if format.is_null() {
                    tracing::warn!(target: "container", format = options.forced_input_format,
                        "forced input format not found, probing instead");
                }
                format
            }
        };

        let url = location
            .as_ref()
            .map(Location::as_cstring)
            .unwrap_or_default();

        let input = unsafe {
            let mut ctx = ffi::avformat_alloc_context();
            if ctx.is_null() {
                return Err(MediaError::OpenFailed("format context allocation".into()));
            }
            if options.generate_pts {
                (*ctx).flags |= ffi::AVFMT_FLAG_GENPTS as c_int;
            }
            if let Some(bridge) = &io_bridge {
                (*ctx).pb = bridge.ctx();
                (*ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;
            }

            let ret = ffi::avformat_open_input(
                &mut ctx,
                url.as_ptr(),
                forced_format,
                format_options.as_mut_ptr_ref(),
            );
            if ret < 0 {
                return Err(MediaError::OpenFailed(averror_string(ret)));
            }
            for (key, value) in format_options.iter() {
                tracing::warn!(target: "container", key, value, "format option not recognised");
            }

            let ret = ffi::avformat_find_stream_info(ctx, ptr::null_mut());
            if ret < 0 {
                tracing::warn!(target: "container", error = %averror_string(ret),
                    "stream info probing failed, continuing with header data");
            }

            AVFormatContextInput::from_raw(ptr::NonNull::new(ctx).unwrap())
        };

        let media_info = Self::probe_media_info(&input, location.as_ref());
        tracing::info!(target: "container",
            format = %media_info.format_name,
            duration = %media_info.duration,
            realtime = media_info.is_stream_realtime,
            by_bytes = media_info.seeks_by_bytes,
            "container opened");

        let components = Self::select_components(&input, &options, &media_info)?;
        if components.get(MediaType::Audio).is_none() && components.get(MediaType::Video).is_none()
        {
            return Err(MediaError::OpenFailed(
                "no usable audio or video stream".into(),
            ));
        }

        let media_start_time_offset = components
            .all()
            .map(|component| component.start_time_offset)
            .min()
            .unwrap_or(media_info.start_time);

        let container = Self {
            source: location,
            options,
            media_info,
            media_start_time_offset,
            components,
            demux: Mutex::new(Demux {
                input,
                _io_bridge: io_bridge,
                requires_picture_attachments: true,
                last_read_time: None,
            }),
            at_end_of_stream: AtomicBool::new(false),
        };

        // Leave the read head at the very beginning so the first reads are
        // deterministic even after probing consumed packets.
        if container.media_info.is_seekable {
            let mut demux = container.demux.lock();
            if let Err(error) = container.seek_to_start(&mut demux) {
                tracing::warn!(target: "container", %error, "initial seek to start failed");
            }
        }

        Ok(container)
    }

    fn probe_media_info(input: &AVFormatContextInput, location: Option<&Location>) -> MediaInfo {
        unsafe {
            let ctx = input.as_ptr();
            let format_name = CStr::from_ptr((*(*ctx).iformat).name)
                .to_string_lossy()
                .into_owned();
            let metadata = DictionaryRef::wrap((*ctx).metadata).to_map();

            let start_time = if (*ctx).start_time == ffi::AV_NOPTS_VALUE {
                Ticks::ZERO
            } else {
                Ticks::from_av_time((*ctx).start_time)
            };
            let duration = if (*ctx).duration == ffi::AV_NOPTS_VALUE {
                Ticks::ZERO
            } else {
                Ticks::from_av_time((*ctx).duration)
            };
            let bit_rate = (*ctx).bit_rate;

            let is_stream_realtime = matches!(format_name.as_str(), "rtp" | "rtsp" | "sdp")
                || location.map(Location::is_realtime_scheme).unwrap_or(false);

            let format_flags =
                AvFormatFlags::from_bits_truncate((*(*ctx).iformat).flags as libc::c_uint);
            let seeks_by_bytes = format_flags.contains(AvFormatFlags::TS_DISCONT)
                && bit_rate > 0
                && format_name != "ogg";

            let pb = (*ctx).pb;
            let is_seekable = !pb.is_null() && (*pb).seekable != 0;

            MediaInfo {
                format_name,
                metadata,
                start_time,
                duration,
                bit_rate,
                is_stream_realtime,
                is_seekable,
                seeks_by_bytes,
            }
        }
    }

    /// Select the best stream per media type, preferring video first, then
    /// audio related to it, then subtitles related to either.
    fn select_components(
        input: &AVFormatContextInput,
        options: &MediaOptions,
        media_info: &MediaInfo,
    ) -> Result<ComponentSet> {
        let find_best = |media_type: MediaType, related: Option<usize>| -> Option<usize> {
            let related = related.map(|index| index as c_int).unwrap_or(-1);
            let ret = unsafe {
                ffi::av_find_best_stream(
                    input.as_ptr() as *mut _,
                    media_type.to_native(),
                    -1,
                    related,
                    ptr::null_mut(),
                    0,
                )
            };
            (ret >= 0).then_some(ret as usize)
        };

        let video_index = (!options.is_video_disabled)
            .then(|| find_best(MediaType::Video, None))
            .flatten();
        let audio_index = (!options.is_audio_disabled)
            .then(|| find_best(MediaType::Audio, video_index))
            .flatten();
        let subtitle_index = (!options.is_subtitle_disabled)
            .then(|| find_best(MediaType::Subtitle, audio_index.or(video_index)))
            .flatten();

        let open_component = |media_type: MediaType, index: Option<usize>| {
            let index = index?;
            match MediaComponent::open(
                input,
                index,
                media_type,
                options,
                media_info.start_time,
                media_info.duration,
            ) {
                Ok(component) => Some(Arc::new(component)),
                Err(error) => {
                    // A broken stream removes its component, not the engine.
                    tracing::warn!(target: "container", %media_type, stream = index, %error,
                        "component initialisation failed, stream skipped");
                    None
                }
            }
        };

        Ok(ComponentSet {
            video: open_component(MediaType::Video, video_index),
            audio: open_component(MediaType::Audio, audio_index),
            subtitle: open_component(MediaType::Subtitle, subtitle_index),
        })
    }

    #[inline]
    pub fn components(&self) -> &ComponentSet {
        &self.components
    }

    #[inline]
    pub fn is_at_end_of_stream(&self) -> bool {
        self.at_end_of_stream.load(Ordering::Acquire)
    }

    /// Read one packet from the demuxer and dispatch it to the owning
    /// component's queue.
    pub fn read(&self) -> Result<ReadOutcome> {
        let mut demux = self.demux.lock();
        self.read_locked(&mut demux)
    }

    fn read_locked(&self, demux: &mut Demux) -> Result<ReadOutcome> {
        if self.media_info.is_stream_realtime {
            if let Some(last) = demux.last_read_time {
                let since = last.elapsed();
                if since < REALTIME_READ_INTERVAL {
                    std::thread::sleep(REALTIME_READ_INTERVAL - since);
                }
            }
        }

        if demux.requires_picture_attachments {
            self.inject_picture_attachments(demux);
            demux.requires_picture_attachments = false;
        }

        let mut packet = AVPacket::new();
        let ret = unsafe { ffi::av_read_frame(demux.input.as_mut_ptr(), packet.as_mut_ptr()) };
        demux.last_read_time = Some(Instant::now());

        if ret >= 0 {
            let stream_index = packet.stream_index as usize;
            return Ok(match self.components.by_index(stream_index) {
                Some(component) => {
                    let media_type = component.media_type();
                    component.enqueue_packet(Packet::from_native(packet, component.info.time_base));
                    ReadOutcome::Packet(media_type)
                }
                None => ReadOutcome::Skipped,
            });
        }

        let reached_eof = ret == ffi::AVERROR_EOF || unsafe {
            let pb = (*demux.input.as_ptr()).pb;
            !pb.is_null() && ffi::avio_feof(pb) != 0
        };
        if reached_eof {
            if !self.at_end_of_stream.swap(true, Ordering::AcqRel) {
                tracing::debug!(target: "container", "end of stream, draining components");
                for component in self.components.all() {
                    component.enqueue_drain_packet();
                }
            }
            return Ok(ReadOutcome::EndOfStream);
        }

        if ret == AVERROR_EAGAIN {
            return Ok(ReadOutcome::Skipped);
        }

        // The demuxer's own error flag separates transient hiccups from a
        // dead input.
        let fatal = unsafe {
            let pb = (*demux.input.as_ptr()).pb;
            !pb.is_null() && (*pb).error < 0
        };
        if fatal {
            Err(MediaError::ReadFailed(averror_string(ret)))
        } else {
            tracing::debug!(target: "container", error = %averror_string(ret),
                "recoverable read error");
            Ok(ReadOutcome::Skipped)
        }
    }

    /// Re-inject attached pictures (cover art): a one-shot video packet
    /// followed by a drain so the video side materialises and finishes.
    fn inject_picture_attachments(&self, demux: &mut Demux) {
        let Some(video) = self.components.get(MediaType::Video) else {
            return;
        };
        if !video.info.is_attached_picture {
            return;
        }

        unsafe {
            let ctx = demux.input.as_ptr();
            let stream = *(*ctx).streams.add(video.stream_index());
            let cloned = ffi::av_packet_clone(&(*stream).attached_pic);
            if cloned.is_null() {
                tracing::warn!(target: "container", "attached picture clone failed");
                return;
            }
            let native = AVPacket::from_raw(ptr::NonNull::new(cloned).unwrap());
            video.enqueue_packet(Packet::from_native(native, video.info.time_base));
        }
        video.enqueue_drain_packet();
        tracing::debug!(target: "container", "attached picture injected");
    }

    /// Dequeue one packet per component, run the decoders, and return all
    /// produced frames ordered by start time.
    pub fn decode(&self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        for component in self.components.all() {
            match component.decode_next() {
                Ok(produced) => frames.extend(produced),
                Err(error) => {
                    // Packet-level failures flush the codec and move on.
                    tracing::warn!(target: "container",
                        media_type = %component.media_type(), %error,
                        "packet decode failed");
                }
            }
        }
        frames.sort_by_key(Frame::start_time);
        Ok(frames)
    }

    /// Materialise `frame` into `block` through the owning component,
    /// optionally releasing the frame's native memory afterwards.
    pub fn convert(&self, frame: &mut Frame, block: &mut Block, release: bool) -> Result<()> {
        let component = self
            .components
            .by_index(frame.stream_index())
            .ok_or_else(|| {
                MediaError::ConvertFailed(format!(
                    "no component owns stream {}",
                    frame.stream_index()
                ))
            })?;
        component.materialise(frame, block)?;
        block.set_timing(frame.start_time(), frame.end_time(), frame.stream_index());
        if release {
            frame.release();
        }
        Ok(())
    }

    /// Drop every queued packet and frame and reset all codecs to `Idle`.
    pub fn clear_packet_queues(&self) {
        for component in self.components.all() {
            component.clear_queues();
        }
    }

    fn seek_to_start(&self, demux: &mut Demux) -> Result<()> {
        let flags = if self.media_info.seeks_by_bytes {
            AvSeekFlags::BACKWARD | AvSeekFlags::BYTE
        } else {
            AvSeekFlags::BACKWARD
        };
        let timestamp = unsafe {
            let start = (*demux.input.as_ptr()).start_time;
            if start == ffi::AV_NOPTS_VALUE {
                0
            } else {
                start
            }
        };
        let ret = unsafe {
            ffi::av_seek_frame(demux.input.as_mut_ptr(), -1, timestamp, flags.bits() as c_int)
        };
        if ret < 0 {
            return Err(MediaError::SeekFailed(averror_string(ret)));
        }

        self.clear_packet_queues();
        demux.requires_picture_attachments = true;
        self.at_end_of_stream.store(false, Ordering::Release);
        Ok(())
    }

    /// Precision seek: keyframe-seek, then decode toward `target` until every
    /// relevant component has frames bracketing it, stepping the request one
    /// second earlier whenever the keyframe landed past the target.
    ///
    /// Returns the surviving frames sorted by start time; the caller
    /// materialises them.
    pub fn seek(&self, target: Ticks) -> Result<Vec<Frame>> {
        let mut demux = self.demux.lock();

        if target <= Ticks::ZERO {
            self.seek_to_start(&mut demux)?;
            return Ok(Vec::new());
        }
        if !self.media_info.is_seekable {
            tracing::warn!(target: "container", "input is not seekable, seek ignored");
            return Ok(Vec::new());
        }
        let main = self
            .components
            .main()
            .ok_or_else(|| MediaError::SeekFailed("no main component".into()))?;
        let main_index = main.stream_index();
        let main_time_base = main.info.time_base;
        let main_offset = main.start_time_offset;
        let main_duration = main.duration;

        let target = target.clamp(
            main_offset.min(main_duration),
            main_offset.max(main_duration),
        );
        let mut relative_target = if self.media_info.seeks_by_bytes {
            target
        } else {
            target + main_offset
        };

        let mut produced: Vec<Frame> = Vec::new();
        loop {
            let at_start = relative_target <= main_offset;
            let ret = if at_start {
                self.seek_to_start(&mut demux)?;
                0
            } else if self.media_info.seeks_by_bytes {
                let byte_position =
                    (self.media_info.bit_rate as f64 * relative_target.as_seconds_f64() / 8.0)
                        as i64;
                unsafe {
                    ffi::av_seek_frame(
                        demux.input.as_mut_ptr(),
                        -1,
                        byte_position,
                        (AvSeekFlags::BACKWARD | AvSeekFlags::BYTE).bits() as c_int,
                    )
                }
            } else {
                unsafe {
                    ffi::av_seek_frame(
                        demux.input.as_mut_ptr(),
                        main_index as c_int,
                        relative_target.to_stream_units(main_time_base),
                        AvSeekFlags::BACKWARD.bits() as c_int,
                    )
                }
            };
            if ret < 0 {
                for frame in &mut produced {
                    frame.release();
                }
                return Err(MediaError::SeekFailed(averror_string(ret)));
            }

            if !at_start {
                self.clear_packet_queues();
                demux.requires_picture_attachments = true;
                self.at_end_of_stream.store(false, Ordering::Release);
            }

            self.decode_toward_target(&mut demux, target, &mut produced)?;

            let range_ok = |media_type: MediaType| -> bool {
                let Some(component) = self.components.get(media_type) else {
                    return true;
                };
                let starts: Vec<Ticks> = produced
                    .iter()
                    .filter(|frame| frame.media_type() == media_type)
                    .map(Frame::start_time)
                    .collect();
                if starts.is_empty() {
                    // Empty non-main streams are ignored; an empty main
                    // stream means the landing point is wrong.
                    return component.stream_index() != main_index;
                }
                starts.iter().min().copied().unwrap_or(Ticks::MAX) <= target
            };

            if at_start || (range_ok(MediaType::Audio) && range_ok(MediaType::Video)) {
                break;
            }

            // Landed past the target: discard and retry a second earlier.
            for frame in &mut produced {
                frame.release();
            }
            produced.clear();
            relative_target -= Ticks::from_seconds(1);
        }

        produced.sort_by_key(Frame::start_time);
        Ok(produced)
    }

    /// Read-and-decode until end of stream or every relevant component has
    /// decoded past `target`, trimming redundant leading frames as they
    /// accumulate.
    fn decode_toward_target(
        &self,
        demux: &mut Demux,
        target: Ticks,
        produced: &mut Vec<Frame>,
    ) -> Result<()> {
        let relevant: Vec<MediaType> = self
            .components
            .all()
            .filter(|component| {
                matches!(
                    component.media_type(),
                    MediaType::Audio | MediaType::Video
                )
            })
            .map(|component| component.media_type())
            .collect();

        loop {
            if self.is_at_end_of_stream() {
                return Ok(());
            }
            self.read_locked(demux)?;
            produced.extend(self.decode()?);

            if produced.len() >= SEEK_DROP_THRESHOLD {
                Self::drop_redundant_frames(produced, target);
            }

            let done = relevant.iter().all(|&media_type| {
                produced
                    .iter()
                    .filter(|frame| frame.media_type() == media_type)
                    .map(Frame::start_time)
                    .max()
                    .map(|max_start| max_start >= target)
                    .unwrap_or(false)
            });
            if done {
                return Ok(());
            }
        }
    }

    /// Drop every frame whose successor (per media type) still starts at or
    /// before the target; only the closest predecessor of the target needs
    /// to survive.
    fn drop_redundant_frames(produced: &mut Vec<Frame>, target: Ticks) {
        produced.sort_by_key(Frame::start_time);
        for media_type in MediaType::ALL {
            let starts: Vec<Ticks> = produced
                .iter()
                .filter(|frame| frame.media_type() == media_type)
                .map(Frame::start_time)
                .collect();
            if starts.len() < 2 {
                continue;
            }
            produced.retain_mut(|frame| {
                if frame.media_type() != media_type {
                    return true;
                }
                let position = starts
                    .iter()
                    .position(|&start| start == frame.start_time())
                    .unwrap_or(0);
                let successor_covers = starts
                    .get(position + 1)
                    .map(|&next| next <= target)
                    .unwrap_or(false);
                if successor_covers {
                    frame.release();
                    false
                } else {
                    true
                }
            });
        }
    }

    /// Stop using the demuxer and dispose of every component. The engine
    /// stops its workers before calling this.
    pub fn close(self) {
        tracing::debug!(target: "container", "container closing");
        self.clear_packet_queues();
        drop(self);
    }
}

unsafe impl Send for Container {}
unsafe impl Sync for Container {}
