use crate::frame::SubtitleTextType;
use crate::stream::MediaType;
use crate::time::Ticks;

/// Decoded audio in the engine's canonical output format: packed signed
/// 16-bit little-endian PCM, channels interleaved.
#[derive(Debug, Default)]
pub struct AudioBlock {
    pub buffer: Vec<u8>,
    pub channel_count: i32,
    pub sample_rate: i32,
    pub samples_per_channel: i32,
}

impl AudioBlock {
    /// Number of payload bytes: `samples_per_channel × channel_count × 2`.
    pub fn buffer_length(&self) -> usize {
        self.samples_per_channel as usize * self.channel_count as usize * 2
    }
}

/// Decoded video in packed 24-bit BGR with a row stride of at least
/// `pixel_width × 3`.
#[derive(Debug, Default)]
pub struct VideoBlock {
    pub buffer: Vec<u8>,
    pub stride: usize,
    pub pixel_width: i32,
    pub pixel_height: i32,
    pub aspect_numerator: i32,
    pub aspect_denominator: i32,
}

/// Parsed subtitle text, already stripped of SRT/ASS formatting.
#[derive(Debug, Default)]
pub struct SubtitleBlock {
    pub lines: Vec<String>,
    pub text_type: Option<SubtitleTextType>,
}

#[derive(Debug)]
pub enum BlockPayload {
    Audio(AudioBlock),
    Video(VideoBlock),
    Subtitle(SubtitleBlock),
}

/// A fixed-format, reusable playback unit. Blocks are preallocated by their
/// block buffer and shuttle between its pool and playback list; the payload
/// buffers persist across fills so steady-state playback does not allocate.
#[derive(Debug)]
pub struct Block {
    start_time: Ticks,
    end_time: Ticks,
    stream_index: usize,
    payload: BlockPayload,
}

impl Block {
    /// Factory: create an empty block of the right subtype for a media type.
    pub fn for_media_type(media_type: MediaType) -> Block {
        let payload = match media_type {
            MediaType::Audio => BlockPayload::Audio(AudioBlock::default()),
            MediaType::Video => BlockPayload::Video(VideoBlock::default()),
            MediaType::Subtitle => BlockPayload::Subtitle(SubtitleBlock::default()),
        };
        Block {
            start_time: Ticks::ZERO,
            end_time: Ticks::ZERO,
            stream_index: 0,
            payload,
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self.payload {
            BlockPayload::Audio(_) => MediaType::Audio,
            BlockPayload::Video(_) => MediaType::Video,
            BlockPayload::Subtitle(_) => MediaType::Subtitle,
        }
    }

    #[inline]
    pub fn start_time(&self) -> Ticks {
        self.start_time
    }

    #[inline]
    pub fn end_time(&self) -> Ticks {
        self.end_time
    }

    #[inline]
    pub fn duration(&self) -> Ticks {
        self.end_time - self.start_time
    }

    /// Midpoint of the block's range, used for render scheduling.
    pub fn mid_time(&self) -> Ticks {
        Ticks::from_raw(self.start_time.value() + self.duration().value() / 2)
    }

    #[inline]
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// True when `position` falls inside `[start_time, end_time)`.
    pub fn contains(&self, position: Ticks) -> bool {
        position >= self.start_time && position < self.end_time
    }

    #[inline]
    pub fn payload(&self) -> &BlockPayload {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut BlockPayload {
        &mut self.payload
    }

    pub(crate) fn set_timing(&mut self, start_time: Ticks, end_time: Ticks, stream_index: usize) {
        self.start_time = start_time;
        self.end_time = end_time.max(start_time);
        self.stream_index = stream_index;
    }

    pub fn as_audio(&self) -> Option<&AudioBlock> {
        match &self.payload {
            BlockPayload::Audio(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoBlock> {
        match &self.payload {
            BlockPayload::Video(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_subtitle(&self) -> Option<&SubtitleBlock> {
        match &self.payload {
            BlockPayload::Subtitle(block) => Some(block),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_picks_subtype() {
        assert!(Block::for_media_type(MediaType::Audio).as_audio().is_some());
        assert!(Block::for_media_type(MediaType::Video).as_video().is_some());
        assert!(Block::for_media_type(MediaType::Subtitle).as_subtitle().is_some());
    }

    #[test]
    fn timing_invariants() {
        let mut block = Block::for_media_type(MediaType::Video);
        block.set_timing(Ticks::from_millis(100), Ticks::from_millis(140), 1);

        assert_eq!(block.duration(), Ticks::from_millis(40));
        assert_eq!(block.mid_time(), Ticks::from_millis(120));
        assert!(block.contains(Ticks::from_millis(100)));
        assert!(block.contains(Ticks::from_millis(139)));
        assert!(!block.contains(Ticks::from_millis(140)));

        // end before start is clamped so duration never goes negative
        block.set_timing(Ticks::from_millis(100), Ticks::from_millis(50), 1);
        assert_eq!(block.duration(), Ticks::ZERO);
    }

    #[test]
    fn audio_buffer_length() {
        let block = AudioBlock {
            buffer: vec![0; 1920],
            channel_count: 2,
            sample_rate: 48_000,
            samples_per_channel: 480,
        };
        assert_eq!(block.buffer_length(), 1920);
    }
}
