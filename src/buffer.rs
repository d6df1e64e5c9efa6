use std::collections::VecDeque;

use crate::block::Block;
use crate::error::Result;
use crate::frame::Frame;
use crate::stream::MediaType;
use crate::time::Ticks;

/// Default block counts per media type. Audio blocks are short, so more of
/// them cover a comparable time span.
pub fn default_capacity(media_type: MediaType) -> usize {
    match media_type {
        MediaType::Audio => 64,
        MediaType::Video => 32,
        MediaType::Subtitle => 8,
    }
}

/// A capped, time-ordered sequence of decoded blocks for one media type.
///
/// Every block is owned by exactly one of the pool or the playback list, and
/// `pool.len() + playback.len() == capacity` outside of `add`. The playback
/// list is strictly increasing by start time; no two entries share one.
#[derive(Debug)]
pub struct BlockBuffer {
    media_type: MediaType,
    capacity: usize,
    pool: VecDeque<Block>,
    playback: Vec<Block>,
}

impl BlockBuffer {
    pub fn new(media_type: MediaType, capacity: usize) -> Self {
        assert!(capacity > 0, "block buffer capacity must be positive");
        let pool = (0..capacity)
            .map(|_| Block::for_media_type(media_type))
            .collect();
        Self {
            media_type,
            capacity,
            pool,
            playback: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.playback.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.playback.is_empty()
    }

    /// Fraction of the capacity currently holding playback blocks.
    pub fn capacity_percent(&self) -> f64 {
        self.playback.len() as f64 / self.capacity as f64
    }

    /// Materialise `frame` into a recycled block and insert it in timestamp
    /// order. A playback block with the same start time is evicted first;
    /// when the pool is empty the oldest playback block is recycled.
    ///
    /// `fill` receives the frame and the target block and performs the
    /// type-specific materialisation.
    pub fn add<F>(&mut self, frame: &Frame, fill: F) -> Result<usize>
    where
        F: FnOnce(&Frame, &mut Block) -> Result<()>,
    {
        if let Ok(existing) = self
            .playback
            .binary_search_by_key(&frame.start_time(), Block::start_time)
        {
            self.pool.push_back(self.playback.remove(existing));
        }
        if self.pool.is_empty() {
            let oldest = self.playback.remove(0);
            self.pool.push_back(oldest);
        }

        let mut block = self.pool.pop_front().expect("pool cannot be empty here");
        if let Err(error) = fill(frame, &mut block) {
            self.pool.push_back(block);
            return Err(error);
        }
        block.set_timing(frame.start_time(), frame.end_time(), frame.stream_index());

        let position = match self
            .playback
            .binary_search_by_key(&block.start_time(), Block::start_time)
        {
            Ok(position) | Err(position) => position,
        };
        self.playback.insert(position, block);
        Ok(position)
    }

    /// Greatest index whose block starts at or before `position`; `0` when
    /// `position` precedes the range, the last index when it follows it, and
    /// `None` only when the buffer is empty.
    pub fn index_of(&self, position: Ticks) -> Option<usize> {
        if self.playback.is_empty() {
            return None;
        }

        // Binary narrowing first, then a short linear walk; mirrors the way
        // lookups cluster around the render position.
        let mut low = 0usize;
        let mut high = self.playback.len() - 1;
        while high.saturating_sub(low) > 2 {
            let mid = (low + high) / 2;
            if self.playback[mid].start_time() <= position {
                low = mid;
            } else {
                high = mid;
            }
        }

        let mut index = low;
        while index + 1 < self.playback.len()
            && self.playback[index + 1].start_time() <= position
        {
            index += 1;
        }
        Some(index)
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.playback.get(index)
    }

    /// The block after `index`, if any.
    pub fn next(&self, index: usize) -> Option<&Block> {
        self.playback.get(index + 1)
    }

    /// The block whose range contains `position`, if any.
    pub fn block_at(&self, position: Ticks) -> Option<(usize, &Block)> {
        let index = self.index_of(position)?;
        let block = &self.playback[index];
        block.contains(position).then_some((index, block))
    }

    pub fn range_start_time(&self) -> Ticks {
        self.playback
            .first()
            .map(Block::start_time)
            .unwrap_or(Ticks::ZERO)
    }

    pub fn range_end_time(&self) -> Ticks {
        self.playback
            .last()
            .map(Block::end_time)
            .unwrap_or(Ticks::ZERO)
    }

    pub fn range_duration(&self) -> Ticks {
        self.range_end_time() - self.range_start_time()
    }

    /// True when every playback block has the same duration.
    pub fn is_monotonic(&self) -> bool {
        let mut durations = self.playback.iter().map(Block::duration);
        match durations.next() {
            None => true,
            Some(first) => durations.all(|duration| duration == first),
        }
    }

    /// Return all playback blocks to the pool without deallocating them.
    pub fn clear(&mut self) {
        self.pool.extend(self.playback.drain(..));
    }

    /// Release all block memory. The buffer is unusable afterwards.
    pub fn dispose(&mut self) {
        self.pool.clear();
        self.playback.clear();
        self.capacity = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockPayload;
    use crate::frame::{FrameSource, SubtitleSource, SubtitleTextType};

    fn frame_at(start_ms: i64, duration_ms: i64) -> Frame {
        Frame::new(
            MediaType::Subtitle,
            0,
            Ticks::from_millis(start_ms),
            Ticks::from_millis(duration_ms),
            0,
            FrameSource::Subtitle(SubtitleSource {
                text_type: SubtitleTextType::Text,
                rects: vec![format!("line at {start_ms}")],
            }),
        )
    }

    fn fill_lines(frame: &Frame, block: &mut Block) -> Result<()> {
        if let BlockPayload::Subtitle(subtitle) = block.payload_mut() {
            subtitle.lines = vec![format!("{}", frame.start_time().as_millis())];
        }
        Ok(())
    }

    fn buffer_with(frames: &[(i64, i64)]) -> BlockBuffer {
        let mut buffer = BlockBuffer::new(MediaType::Subtitle, 8);
        for &(start, duration) in frames {
            buffer.add(&frame_at(start, duration), fill_lines).unwrap();
        }
        buffer
    }

    #[test]
    fn blocks_stay_ordered_regardless_of_insert_order() {
        let buffer = buffer_with(&[(300, 100), (100, 100), (200, 100)]);
        let starts: Vec<i64> = (0..buffer.len())
            .map(|i| buffer.get(i).unwrap().start_time().as_millis())
            .collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn duplicate_start_time_is_replaced() {
        let buffer = buffer_with(&[(100, 100), (100, 100)]);
        assert_eq!(buffer.len(), 1);
        // pool + playback always equals capacity
        assert_eq!(buffer.pool.len() + buffer.playback.len(), buffer.capacity());
    }

    #[test]
    fn pool_exhaustion_evicts_oldest() {
        let mut buffer = BlockBuffer::new(MediaType::Subtitle, 3);
        for start in [0, 100, 200, 300] {
            buffer.add(&frame_at(start, 100), fill_lines).unwrap();
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.range_start_time(), Ticks::from_millis(100));
        assert_eq!(buffer.range_end_time(), Ticks::from_millis(400));
    }

    #[test]
    fn index_of_invariant() {
        let buffer = buffer_with(&[(100, 100), (200, 100), (300, 100)]);

        for t in [0, 50, 100, 150, 250, 299, 300, 1_000] {
            let position = Ticks::from_millis(t);
            let index = buffer.index_of(position).unwrap();
            let block = buffer.get(index).unwrap();
            if position >= buffer.range_start_time() {
                assert!(block.start_time() <= position, "t={t}");
            } else {
                assert_eq!(index, 0);
            }
            if let Some(next) = buffer.next(index) {
                if position >= buffer.range_start_time() {
                    assert!(next.start_time() > position, "t={t}");
                }
            }
        }

        assert!(BlockBuffer::new(MediaType::Subtitle, 4)
            .index_of(Ticks::ZERO)
            .is_none());
    }

    #[test]
    fn block_at_requires_containment() {
        let buffer = buffer_with(&[(100, 50)]);
        assert!(buffer.block_at(Ticks::from_millis(120)).is_some());
        assert!(buffer.block_at(Ticks::from_millis(160)).is_none());
        assert!(buffer.block_at(Ticks::from_millis(50)).is_none());
    }

    #[test]
    fn monotonic_means_uniform_durations() {
        assert!(buffer_with(&[(0, 40), (40, 40), (80, 40)]).is_monotonic());
        assert!(!buffer_with(&[(0, 40), (40, 60)]).is_monotonic());
        assert!(BlockBuffer::new(MediaType::Video, 2).is_monotonic());
    }

    #[test]
    fn clear_recycles_without_deallocating() {
        let mut buffer = buffer_with(&[(0, 40), (40, 40)]);
        assert_eq!(buffer.capacity_percent(), 0.25);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.pool.len(), buffer.capacity());
    }

    #[test]
    fn failed_fill_returns_block_to_pool() {
        let mut buffer = BlockBuffer::new(MediaType::Subtitle, 2);
        let result = buffer.add(&frame_at(0, 40), |_, _| {
            Err(crate::error::MediaError::ConvertFailed("boom".into()))
        });
        assert!(result.is_err());
        assert!(buffer.is_empty());
        assert_eq!(buffer.pool.len(), buffer.capacity());
    }
}
