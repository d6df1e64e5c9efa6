use std::sync::Arc;

use parking_lot::Mutex;

use crate::block::Block;
use crate::circular::CircularBuffer;
use crate::stream::MediaType;
use crate::time::Ticks;

/// Host-supplied sink for materialised blocks of one media type.
///
/// `update` is invoked from the render worker whenever the clock enters a
/// block that has not been delivered yet; the remaining callbacks follow the
/// engine lifecycle.
pub trait BlockRenderer: Send {
    /// Paint or play `block`. `render_index` is the block's position inside
    /// its buffer at the time of the call.
    fn update(&mut self, block: &Block, clock_position: Ticks, render_index: usize);

    fn on_started(&mut self) {}

    fn on_stopped(&mut self) {}

    fn on_seek_completed(&mut self) {}
}

/// The renderers registered with the engine, at most one per media type.
#[derive(Default)]
pub struct RendererSet {
    audio: Option<Box<dyn BlockRenderer>>,
    video: Option<Box<dyn BlockRenderer>>,
    subtitle: Option<Box<dyn BlockRenderer>>,
}

impl RendererSet {
    pub fn set(&mut self, media_type: MediaType, renderer: Box<dyn BlockRenderer>) {
        match media_type {
            MediaType::Audio => self.audio = Some(renderer),
            MediaType::Video => self.video = Some(renderer),
            MediaType::Subtitle => self.subtitle = Some(renderer),
        }
    }

    pub fn get_mut(&mut self, media_type: MediaType) -> Option<&mut Box<dyn BlockRenderer>> {
        match media_type {
            MediaType::Audio => self.audio.as_mut(),
            MediaType::Video => self.video.as_mut(),
            MediaType::Subtitle => self.subtitle.as_mut(),
        }
    }

    pub fn notify_started(&mut self) {
        self.for_each(|renderer| renderer.on_started());
    }

    pub fn notify_stopped(&mut self) {
        self.for_each(|renderer| renderer.on_stopped());
    }

    pub fn notify_seek_completed(&mut self) {
        self.for_each(|renderer| renderer.on_seek_completed());
    }

    fn for_each(&mut self, mut callback: impl FnMut(&mut Box<dyn BlockRenderer>)) {
        for renderer in [&mut self.audio, &mut self.video, &mut self.subtitle]
            .into_iter()
            .flatten()
        {
            callback(renderer);
        }
    }
}

/// An audio renderer that accumulates block PCM into a byte ring.
///
/// The host's audio callback drains the shared ring at device pace; block
/// boundaries disappear, which keeps the output glitch-free across uneven
/// block durations. Seeks and stops flush the ring so stale samples never
/// play at the new position.
pub struct AudioRingRenderer {
    ring: Arc<Mutex<CircularBuffer>>,
}

impl AudioRingRenderer {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(CircularBuffer::new(capacity_bytes))),
        }
    }

    /// Shared handle for the host side to drain from its audio callback.
    pub fn ring(&self) -> Arc<Mutex<CircularBuffer>> {
        Arc::clone(&self.ring)
    }
}

impl BlockRenderer for AudioRingRenderer {
    fn update(&mut self, block: &Block, _clock_position: Ticks, _render_index: usize) {
        let Some(audio) = block.as_audio() else {
            return;
        };
        let payload = &audio.buffer[..audio.buffer_length().min(audio.buffer.len())];
        let mut ring = self.ring.lock();
        if !ring.write(payload) {
            // The device is behind; skip ahead rather than stall the engine.
            let mut scratch = vec![0u8; payload.len().min(ring.length())];
            let _ = ring.read(&mut scratch);
            let _ = ring.write(payload);
        }
    }

    fn on_stopped(&mut self) {
        self.ring.lock().clear();
    }

    fn on_seek_completed(&mut self) {
        self.ring.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{AudioBlock, Block, BlockPayload};

    fn audio_block(samples: i32) -> Block {
        let mut block = Block::for_media_type(MediaType::Audio);
        if let BlockPayload::Audio(audio) = block.payload_mut() {
            *audio = AudioBlock {
                buffer: vec![0x11; samples as usize * 4],
                channel_count: 2,
                sample_rate: 48_000,
                samples_per_channel: samples,
            };
        }
        block
    }

    #[test]
    fn ring_renderer_accumulates_and_flushes() {
        let mut renderer = AudioRingRenderer::new(4_096);
        let ring = renderer.ring();

        renderer.update(&audio_block(128), Ticks::ZERO, 0);
        assert_eq!(ring.lock().readable_count(), 128 * 4);

        renderer.on_seek_completed();
        assert_eq!(ring.lock().readable_count(), 0);
    }

    #[test]
    fn ring_renderer_overwrites_when_behind() {
        let mut renderer = AudioRingRenderer::new(512);
        let ring = renderer.ring();

        renderer.update(&audio_block(100), Ticks::ZERO, 0);
        renderer.update(&audio_block(100), Ticks::ZERO, 1);
        // 800 bytes offered to a 512-byte ring: the newest payload survives.
        assert!(ring.lock().readable_count() <= 512);
        assert!(ring.lock().readable_count() >= 400);
    }
}

