use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};

use crate::buffer::{default_capacity, BlockBuffer};
use crate::clock::RealTimeClock;
use crate::component::DecoderState;
use crate::container::Container;
use crate::engine::EngineEvent;
use crate::render::RendererSet;
use crate::stream::MediaType;
use crate::time::Ticks;

/// Per-component packet backlog the reader aims for.
const TARGET_QUEUE_DURATION: Ticks = Ticks::from_seconds(1);
/// Upper bound on the bytes held across all packet queues.
const MAX_QUEUE_BYTES: usize = 16 * 1024 * 1024;
/// Decoded frames allowed to pile up per component before decoding pauses.
const MAX_PENDING_FRAMES: usize = 16;
/// Render clock granularity.
const RENDER_INTERVAL: Duration = Duration::from_millis(10);
/// Minimum spacing of position-changed events.
const POSITION_REPORT_INTERVAL: Ticks = Ticks::from_millis(250);
/// Main-buffer fill level that ends a buffering phase.
const BUFFERING_ENDED_THRESHOLD: f64 = 0.25;

const WORKER_IDLE_WAIT: Duration = Duration::from_millis(2);
const READER_IDLE_WAIT: Duration = Duration::from_millis(10);

fn media_type_slot(media_type: MediaType) -> usize {
    match media_type {
        MediaType::Audio => 0,
        MediaType::Video => 1,
        MediaType::Subtitle => 2,
    }
}

/// One preallocated block buffer per selected component.
pub(crate) struct BufferSet {
    buffers: [Option<Arc<Mutex<BlockBuffer>>>; 3],
}

impl BufferSet {
    pub(crate) fn for_container(container: &Container) -> Self {
        let mut buffers: [Option<Arc<Mutex<BlockBuffer>>>; 3] = [None, None, None];
        for component in container.components().all() {
            let media_type = component.media_type();
            buffers[media_type_slot(media_type)] = Some(Arc::new(Mutex::new(BlockBuffer::new(
                media_type,
                default_capacity(media_type),
            ))));
        }
        Self { buffers }
    }

    pub(crate) fn get(&self, media_type: MediaType) -> Option<&Arc<Mutex<BlockBuffer>>> {
        self.buffers[media_type_slot(media_type)].as_ref()
    }

    pub(crate) fn clear_all(&self) {
        for buffer in self.buffers.iter().flatten() {
            buffer.lock().clear();
        }
    }

    pub(crate) fn dispose_all(&self) {
        for buffer in self.buffers.iter().flatten() {
            buffer.lock().dispose();
        }
    }
}

#[derive(Default)]
struct GateState {
    hold: bool,
    parked: usize,
}

/// Cooperative pause point for the pipeline workers. The command worker
/// raises the gate, waits until every worker is parked at a checkpoint,
/// performs its surgery (seek, close), then releases.
pub(crate) struct WorkerGate {
    workers: usize,
    state: Mutex<GateState>,
    signal: Condvar,
}

impl WorkerGate {
    fn new(workers: usize) -> Self {
        Self {
            workers,
            state: Mutex::new(GateState::default()),
            signal: Condvar::new(),
        }
    }

    /// Called by workers once per loop turn. Parks while the gate is held.
    pub(crate) fn checkpoint(&self, stop: &AtomicBool) {
        let mut state = self.state.lock();
        if !state.hold {
            return;
        }
        state.parked += 1;
        self.signal.notify_all();
        while state.hold && !stop.load(Ordering::Acquire) {
            self.signal
                .wait_for(&mut state, Duration::from_millis(50));
        }
        state.parked -= 1;
        self.signal.notify_all();
    }

    /// Raise the gate and wait for all workers to park.
    pub(crate) fn hold(&self, stop: &AtomicBool) {
        let mut state = self.state.lock();
        state.hold = true;
        self.signal.notify_all();
        while state.parked < self.workers && !stop.load(Ordering::Acquire) {
            self.signal
                .wait_for(&mut state, Duration::from_millis(50));
        }
    }

    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        state.hold = false;
        self.signal.notify_all();
    }
}

/// Everything the pipeline workers share.
pub(crate) struct PipelineShared {
    pub(crate) container: Arc<Container>,
    pub(crate) buffers: BufferSet,
    pub(crate) clock: Arc<RealTimeClock>,
    pub(crate) renderers: Arc<Mutex<RendererSet>>,
    pub(crate) events: Sender<EngineEvent>,
    pub(crate) buffering: AtomicBool,
    pub(crate) ended: AtomicBool,
    last_rendered: Mutex<[Option<Ticks>; 3]>,
    last_reported_position: Mutex<Ticks>,
}

impl PipelineShared {
    pub(crate) fn new(
        container: Arc<Container>,
        clock: Arc<RealTimeClock>,
        renderers: Arc<Mutex<RendererSet>>,
        events: Sender<EngineEvent>,
    ) -> Self {
        let buffers = BufferSet::for_container(&container);
        Self {
            container,
            buffers,
            clock,
            renderers,
            events,
            buffering: AtomicBool::new(true),
            ended: AtomicBool::new(false),
            last_rendered: Mutex::new([None, None, None]),
            last_reported_position: Mutex::new(Ticks::ZERO),
        }
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Forget which blocks were delivered; the next tick re-renders.
    pub(crate) fn reset_render_state(&self) {
        *self.last_rendered.lock() = [None, None, None];
        self.ended.store(false, Ordering::Release);
    }

    pub(crate) fn begin_buffering(&self) {
        if !self.buffering.swap(true, Ordering::AcqRel) {
            self.emit(EngineEvent::BufferingStarted);
        }
    }

    fn main_buffer(&self) -> Option<&Arc<Mutex<BlockBuffer>>> {
        let main = self.container.components().main()?;
        self.buffers.get(main.media_type())
    }
}

/// The running worker threads plus their stop/pause controls.
pub(crate) struct WorkerSet {
    stop: Arc<AtomicBool>,
    gate: Arc<WorkerGate>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerSet {
    /// Spawn the reader, decoder, block and render workers over `shared`.
    pub(crate) fn spawn(shared: Arc<PipelineShared>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(WorkerGate::new(4));

        let spawn = |name: &str, body: fn(&PipelineShared, &AtomicBool, &WorkerGate)| {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            let gate = Arc::clone(&gate);
            std::thread::Builder::new()
                .name(format!("rsplayback-{name}"))
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        gate.checkpoint(&stop);
                        body(&shared, &stop, &gate);
                    }
                })
                .expect("worker thread spawn")
        };

        let handles = vec![
            spawn("reader", reader_turn),
            spawn("decoder", decoder_turn),
            spawn("blocks", block_turn),
            spawn("render", render_turn),
        ];

        Self {
            stop,
            gate,
            handles,
        }
    }

    pub(crate) fn gate(&self) -> &WorkerGate {
        &self.gate
    }

    pub(crate) fn stop_token(&self) -> &AtomicBool {
        &self.stop
    }

    /// Signal cooperative stop and join every worker.
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.gate.release();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerSet {
    fn drop(&mut self) {
        self.stop();
    }
}

/// True while any component still wants packets and memory allows it.
fn wants_more_packets(container: &Container) -> bool {
    let mut total_bytes = 0usize;
    let mut any_low = false;
    for component in container.components().all() {
        total_bytes += component.buffered_length();
        if component.buffered_duration() < TARGET_QUEUE_DURATION {
            any_low = true;
        }
    }
    any_low && total_bytes < MAX_QUEUE_BYTES
}

fn reader_turn(shared: &PipelineShared, _stop: &AtomicBool, _gate: &WorkerGate) {
    let container = &shared.container;
    if container.is_at_end_of_stream() || !wants_more_packets(container) {
        std::thread::sleep(READER_IDLE_WAIT);
        return;
    }
    if let Err(error) = container.read() {
        tracing::error!(target: "workers", %error, "reader failed");
        shared.emit(EngineEvent::MediaFailed {
            error: error.to_string(),
        });
        std::thread::sleep(Duration::from_millis(100));
    }
}

fn decoder_turn(shared: &PipelineShared, _stop: &AtomicBool, _gate: &WorkerGate) {
    let container = &shared.container;

    let backlogged = container
        .components()
        .all()
        .any(|component| component.pending_frame_count() > MAX_PENDING_FRAMES);
    if backlogged {
        std::thread::sleep(WORKER_IDLE_WAIT);
        return;
    }

    match container.decode() {
        Ok(frames) if frames.is_empty() => {
            // Nothing decodable yet; wait for the reader to feed a queue.
            let waited = container
                .components()
                .all()
                .next()
                .map(|component| component.wait_for_packets(Duration::from_millis(5)))
                .unwrap_or(false);
            if !waited {
                std::thread::sleep(WORKER_IDLE_WAIT);
            }
        }
        Ok(frames) => {
            for frame in frames {
                if let Some(component) =
                    container.components().by_index(frame.stream_index())
                {
                    component.push_frame(frame);
                }
            }
        }
        Err(error) => {
            tracing::warn!(target: "workers", %error, "decode turn failed");
        }
    }
}

fn block_turn(shared: &PipelineShared, _stop: &AtomicBool, _gate: &WorkerGate) {
    let container = &shared.container;
    let mut materialised_any = false;

    for component in container.components().all() {
        let Some(buffer) = shared.buffers.get(component.media_type()) else {
            continue;
        };
        let Some(mut frame) = component.pop_frame() else {
            continue;
        };

        let result = buffer
            .lock()
            .add(&frame, |frame, block| component.materialise(frame, block));
        match result {
            Ok(_) => materialised_any = true,
            Err(error) => {
                // One bad frame is dropped; the pipeline keeps going.
                tracing::warn!(target: "workers",
                    media_type = %component.media_type(), %error,
                    "frame materialisation failed");
            }
        }
        frame.release();
    }

    if !materialised_any {
        std::thread::sleep(WORKER_IDLE_WAIT);
    }
}

fn render_turn(shared: &PipelineShared, _stop: &AtomicBool, _gate: &WorkerGate) {
    std::thread::sleep(RENDER_INTERVAL);

    let position = shared.clock.position();

    // Deliver the block under the clock for each media type, once per block.
    for media_type in MediaType::ALL {
        let Some(buffer) = shared.buffers.get(media_type) else {
            continue;
        };
        let buffer = buffer.lock();
        let Some((index, block)) = buffer.block_at(position) else {
            continue;
        };

        let slot = media_type_slot(media_type);
        let mut last_rendered = shared.last_rendered.lock();
        if last_rendered[slot] == Some(block.start_time()) {
            continue;
        }

        let mut renderers = shared.renderers.lock();
        if let Some(renderer) = renderers.get_mut(media_type) {
            renderer.update(block, position, index);
            last_rendered[slot] = Some(block.start_time());
        }
    }

    // Buffering ends once the main buffer has a working margin (or the
    // stream already ended).
    if shared.buffering.load(Ordering::Acquire) {
        let filled = shared
            .main_buffer()
            .map(|buffer| buffer.lock().capacity_percent())
            .unwrap_or(0.0);
        if filled >= BUFFERING_ENDED_THRESHOLD || shared.container.is_at_end_of_stream() {
            shared.buffering.store(false, Ordering::Release);
            shared.emit(EngineEvent::BufferingEnded);
        }
    }

    if shared.clock.is_running() {
        let mut last_reported = shared.last_reported_position.lock();
        if position - *last_reported >= POSITION_REPORT_INTERVAL {
            shared.emit(EngineEvent::PositionChanged {
                old: *last_reported,
                new: position,
            });
            *last_reported = position;
        }
    }

    // End of media: stream drained, decoder flushed, clock past the last
    // block of the main component.
    if shared.container.is_at_end_of_stream() && !shared.ended.load(Ordering::Acquire) {
        if let Some(main) = shared.container.components().main() {
            let drained = main.decoder_state() == DecoderState::Flushed
                && main.pending_frame_count() == 0;
            let past_end = shared
                .buffers
                .get(main.media_type())
                .map(|buffer| {
                    let buffer = buffer.lock();
                    buffer.is_empty() || position >= buffer.range_end_time()
                })
                .unwrap_or(true);
            if drained && past_end && !shared.ended.swap(true, Ordering::AcqRel) {
                shared.clock.pause();
                shared.emit(EngineEvent::MediaEnded);
            }
        }
    }
}
