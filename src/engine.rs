use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::clock::RealTimeClock;
use crate::commands::{CommandHandle, CommandManager, CommandRecord};
use crate::component::ComponentStatistics;
use crate::container::{Container, MediaInfo, MediaSource};
use crate::error::{MediaError, Result};
use crate::options::MediaOptions;
use crate::render::{BlockRenderer, RendererSet};
use crate::stream::MediaType;
use crate::time::Ticks;
use crate::workers::{PipelineShared, WorkerSet};

/// Notifications the engine pushes to the host.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    MediaOpening { source: String },
    MediaOpened,
    MediaClosing,
    MediaClosed,
    MediaEnded,
    PositionChanged { old: Ticks, new: Ticks },
    BufferingStarted,
    BufferingEnded,
    MediaFailed { error: String },
}

/// Per-component pipeline snapshots of the open media.
#[derive(Debug, Clone, Default)]
pub struct EngineStatistics {
    pub audio: Option<ComponentStatistics>,
    pub video: Option<ComponentStatistics>,
    pub subtitle: Option<ComponentStatistics>,
}

/// An open container with its pipeline workers.
struct PlaybackSession {
    shared: Arc<PipelineShared>,
    workers: Mutex<WorkerSet>,
}

struct EngineInner {
    options: Mutex<MediaOptions>,
    clock: Arc<RealTimeClock>,
    renderers: Arc<Mutex<RendererSet>>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    manager: CommandManager,
    session: Mutex<Option<PlaybackSession>>,
    disposed: AtomicBool,
}

/// The public playback engine.
///
/// Every lifecycle operation is asynchronous: it enqueues a command for the
/// command worker and returns a [`CommandHandle`] the host can wait on.
/// Events stream through the channel returned by [`events`](Self::events).
pub struct MediaEngine {
    inner: Arc<EngineInner>,
    command_worker: Option<JoinHandle<()>>,
}

impl MediaEngine {
    pub fn new() -> Self {
        Self::with_options(MediaOptions::default())
    }

    pub fn with_options(options: MediaOptions) -> Self {
        crate::init::ensure_initialized();

        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (manager, command_rx) = CommandManager::new();
        let inner = Arc::new(EngineInner {
            options: Mutex::new(options),
            clock: Arc::new(RealTimeClock::new()),
            renderers: Arc::new(Mutex::new(RendererSet::default())),
            events_tx,
            events_rx,
            manager,
            session: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let worker_inner = Arc::clone(&inner);
        let command_worker = std::thread::Builder::new()
            .name("rsplayback-commands".into())
            .spawn(move || command_worker(worker_inner, command_rx))
            .expect("command worker spawn");

        Self {
            inner,
            command_worker: Some(command_worker),
        }
    }

    /// Register the host renderer for one media type. Takes effect on the
    /// next delivered block.
    pub fn set_renderer(&self, media_type: MediaType, renderer: Box<dyn BlockRenderer>) {
        self.inner.renderers.lock().set(media_type, renderer);
    }

    pub fn set_options(&self, options: MediaOptions) {
        *self.inner.options.lock() = options;
    }

    /// Receiver for engine events; clones share the same stream.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.inner.events_rx.clone()
    }

    pub fn open(&self, source: impl Into<MediaSource>) -> CommandHandle {
        if self.is_disposed() {
            return CommandHandle::ready(Err(MediaError::Disposed));
        }
        self.inner.manager.open(source.into())
    }

    pub fn close(&self) -> CommandHandle {
        if self.is_disposed() {
            return CommandHandle::ready(Err(MediaError::Disposed));
        }
        self.inner.manager.close()
    }

    /// Re-open the current source, preserving position and speed ratio.
    pub fn change_media(&self) -> CommandHandle {
        if self.is_disposed() {
            return CommandHandle::ready(Err(MediaError::Disposed));
        }
        self.inner.manager.change_media()
    }

    pub fn play(&self) -> CommandHandle {
        if self.is_disposed() {
            return CommandHandle::ready(Err(MediaError::Disposed));
        }
        self.inner.manager.play()
    }

    pub fn pause(&self) -> CommandHandle {
        if self.is_disposed() {
            return CommandHandle::ready(Err(MediaError::Disposed));
        }
        self.inner.manager.pause()
    }

    pub fn stop(&self) -> CommandHandle {
        if self.is_disposed() {
            return CommandHandle::ready(Err(MediaError::Disposed));
        }
        self.inner.manager.stop()
    }

    /// Seek to a 0-based position. Rapid requests coalesce: the newest
    /// target wins and all callers complete together.
    pub fn seek(&self, position: Ticks) -> CommandHandle {
        if self.is_disposed() {
            return CommandHandle::ready(Err(MediaError::Disposed));
        }
        self.inner.manager.seek(position)
    }

    pub fn position(&self) -> Ticks {
        self.inner.clock.position()
    }

    pub fn speed_ratio(&self) -> f64 {
        self.inner.clock.speed_ratio()
    }

    /// Change playback speed; the observable position is preserved.
    pub fn set_speed_ratio(&self, ratio: f64) {
        self.inner.clock.set_speed_ratio(ratio);
    }

    pub fn is_open(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.clock.is_running()
    }

    /// Container-level facts of the open media, if any.
    pub fn media_info(&self) -> Option<MediaInfo> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|session| session.shared.container.media_info.clone())
    }

    /// Duration of the main component, if media is open.
    pub fn duration(&self) -> Option<Ticks> {
        self.inner
            .session
            .lock()
            .as_ref()
            .and_then(|session| session.shared.container.components().main().map(|main| main.duration))
    }

    /// Pipeline counters per component, if media is open.
    pub fn statistics(&self) -> Option<EngineStatistics> {
        let session = self.inner.session.lock();
        let session = session.as_ref()?;
        let components = session.shared.container.components();
        let snapshot = |media_type: MediaType| {
            components
                .get(media_type)
                .map(|component| component.statistics())
        };
        Some(EngineStatistics {
            audio: snapshot(MediaType::Audio),
            video: snapshot(MediaType::Video),
            subtitle: snapshot(MediaType::Subtitle),
        })
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl Default for MediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MediaEngine {
    fn drop(&mut self) {
        self.inner.disposed.store(true, Ordering::Release);
        self.inner.manager.shutdown();
        if let Some(worker) = self.command_worker.take() {
            let _ = worker.join();
        }
    }
}

fn command_worker(inner: Arc<EngineInner>, commands: Receiver<CommandRecord>) {
    for record in commands {
        match record {
            CommandRecord::Open { source, promise } => {
                let result = execute_open(&inner, source);
                if let Err(error) = &result {
                    inner.emit(EngineEvent::MediaFailed {
                        error: error.to_string(),
                    });
                }
                promise.fulfil(result);
            }
            CommandRecord::Close { promise } => {
                promise.fulfil(execute_close(&inner));
            }
            CommandRecord::ChangeMedia { promise } => {
                promise.fulfil(execute_change_media(&inner));
            }
            CommandRecord::Play { promise } => {
                promise.fulfil(execute_play(&inner));
            }
            CommandRecord::Pause { promise } => {
                promise.fulfil(execute_pause(&inner));
            }
            CommandRecord::Stop { promise } => {
                promise.fulfil(execute_stop(&inner));
            }
            CommandRecord::Seek => {
                // Re-run until the target we executed is still the wanted
                // one; coalesced requests all complete together.
                loop {
                    let Some(target) = inner.manager.current_seek_target() else {
                        break;
                    };
                    let result = execute_seek(&inner, target);
                    if let Err(error) = &result {
                        tracing::warn!(target: "commands", %error, "seek failed");
                    }
                    if let Some(waiters) = inner.manager.finish_seek_if_current(target) {
                        for waiter in waiters {
                            waiter.fulfil(match &result {
                                Ok(()) => Ok(()),
                                Err(error) => Err(error.duplicate()),
                            });
                        }
                        break;
                    }
                }
            }
            CommandRecord::Shutdown => {
                let _ = execute_close(&inner);
                break;
            }
        }
    }
}

impl EngineInner {
    fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }
}

fn execute_open(inner: &Arc<EngineInner>, source: MediaSource) -> Result<()> {
    if inner.session.lock().is_some() {
        return Err(MediaError::OpenFailed("media is already open".into()));
    }

    let source_name = match &source {
        MediaSource::Location(location) => location.to_string(),
        MediaSource::Stream(_) => "<byte stream>".to_string(),
    };
    inner.emit(EngineEvent::MediaOpening {
        source: source_name,
    });

    let options = inner.options.lock().clone();
    let container = Arc::new(Container::open(source, options)?);

    let shared = Arc::new(PipelineShared::new(
        Arc::clone(&container),
        Arc::clone(&inner.clock),
        Arc::clone(&inner.renderers),
        inner.events_tx.clone(),
    ));
    let workers = WorkerSet::spawn(Arc::clone(&shared));

    inner.clock.reset();
    *inner.session.lock() = Some(PlaybackSession {
        shared,
        workers: Mutex::new(workers),
    });

    inner.emit(EngineEvent::MediaOpened);
    inner.emit(EngineEvent::BufferingStarted);
    Ok(())
}

fn execute_close(inner: &Arc<EngineInner>) -> Result<()> {
    // Close pre-empts everything else that may be waiting.
    for waiter in inner.manager.cancel_pending_seek() {
        waiter.fulfil(Err(MediaError::Cancelled));
    }

    let Some(session) = inner.session.lock().take() else {
        return Ok(());
    };
    inner.emit(EngineEvent::MediaClosing);

    {
        let mut workers = session.workers.lock();
        workers.stop();
    }
    inner.renderers.lock().notify_stopped();
    session.shared.buffers.dispose_all();

    let PlaybackSession { shared, workers } = session;
    drop(workers);
    if let Ok(shared) = Arc::try_unwrap(shared) {
        if let Ok(container) = Arc::try_unwrap(shared.container) {
            container.close();
        }
    }

    inner.clock.reset();
    inner.emit(EngineEvent::MediaClosed);
    Ok(())
}

fn execute_change_media(inner: &Arc<EngineInner>) -> Result<()> {
    let source = {
        let session = inner.session.lock();
        let session = session
            .as_ref()
            .ok_or_else(|| MediaError::OpenFailed("no media is open".into()))?;
        session
            .shared
            .container
            .source
            .clone()
            .ok_or_else(|| MediaError::OpenFailed("change media requires a url source".into()))?
    };

    // Re-open around the same source while keeping the observable state.
    let position = inner.clock.position();
    let speed_ratio = inner.clock.speed_ratio();
    let was_running = inner.clock.is_running();

    execute_close(inner)?;
    execute_open(inner, MediaSource::Location(source))?;

    inner.clock.set_speed_ratio(speed_ratio);
    if position > Ticks::ZERO {
        execute_seek(inner, position)?;
    }
    if was_running {
        inner.clock.play();
    }
    Ok(())
}

fn execute_play(inner: &Arc<EngineInner>) -> Result<()> {
    if inner.session.lock().is_none() {
        return Err(MediaError::OpenFailed("no media is open".into()));
    }
    inner.renderers.lock().notify_started();
    inner.clock.play();
    Ok(())
}

fn execute_pause(inner: &Arc<EngineInner>) -> Result<()> {
    if inner.session.lock().is_none() {
        return Err(MediaError::OpenFailed("no media is open".into()));
    }
    inner.clock.pause();
    Ok(())
}

fn execute_stop(inner: &Arc<EngineInner>) -> Result<()> {
    if inner.session.lock().is_none() {
        return Err(MediaError::OpenFailed("no media is open".into()));
    }
    inner.clock.pause();
    execute_seek(inner, Ticks::ZERO)?;
    inner.clock.reset();
    inner.renderers.lock().notify_stopped();
    Ok(())
}

/// Quiesce the pipeline, run the container seek, reposition the clock and
/// hand the surviving frames back to the block worker.
fn execute_seek(inner: &Arc<EngineInner>, target: Ticks) -> Result<()> {
    let session = inner.session.lock();
    let session = session
        .as_ref()
        .ok_or_else(|| MediaError::SeekFailed("no media is open".into()))?;
    let shared = &session.shared;
    let workers = session.workers.lock();

    let old_position = inner.clock.position();
    let was_running = inner.clock.is_running();
    inner.clock.pause();

    workers.gate().hold(workers.stop_token());
    let result = (|| -> Result<()> {
        let frames = shared.container.seek(target)?;
        shared.buffers.clear_all();
        for frame in frames {
            if let Some(component) = shared
                .container
                .components()
                .by_index(frame.stream_index())
            {
                component.push_frame(frame);
            }
        }

        let duration = shared
            .container
            .components()
            .main()
            .map(|main| main.duration)
            .unwrap_or(Ticks::MAX);
        let new_position = target.clamp(Ticks::ZERO, duration.max(Ticks::ZERO));
        inner.clock.set_position(new_position);

        shared.reset_render_state();
        shared.begin_buffering();
        inner.renderers.lock().notify_seek_completed();
        inner.emit(EngineEvent::PositionChanged {
            old: old_position,
            new: new_position,
        });
        Ok(())
    })();
    workers.gate().release();

    if was_running && result.is_ok() {
        inner.clock.play();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_without_media_fail() {
        let engine = MediaEngine::new();
        assert!(engine.play().wait().is_err());
        assert!(engine.pause().wait().is_err());
        assert!(engine.stop().wait().is_err());
        assert!(engine.seek(Ticks::from_millis(100)).wait().is_err());
        assert!(!engine.is_open());
    }

    #[test]
    fn close_without_media_is_a_no_op() {
        let engine = MediaEngine::new();
        assert!(engine.close().wait().is_ok());
    }

    #[test]
    fn clock_state_is_queryable() {
        let engine = MediaEngine::new();
        assert_eq!(engine.position(), Ticks::ZERO);
        assert!(!engine.is_playing());

        engine.set_speed_ratio(1.5);
        assert_eq!(engine.speed_ratio(), 1.5);
    }

    #[test]
    fn open_of_missing_file_fails_and_reports() {
        let engine = MediaEngine::new();
        let events = engine.events();

        let result = engine.open("definitely-not-here-494213.mp4").wait();
        assert!(matches!(result, Err(MediaError::OpenFailed(_))));
        assert!(!engine.is_open());
        assert!(engine.media_info().is_none());
        assert!(engine.statistics().is_none());

        let mut saw_opening = false;
        let mut saw_failed = false;
        while let Ok(event) = events.try_recv() {
            match event {
                EngineEvent::MediaOpening { .. } => saw_opening = true,
                EngineEvent::MediaFailed { .. } => saw_failed = true,
                _ => {}
            }
        }
        assert!(saw_opening);
        assert!(saw_failed);

        // The engine stays usable for a later close.
        assert!(engine.close().wait().is_ok());
    }
}
