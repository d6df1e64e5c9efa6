use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::container::MediaSource;
use crate::error::{MediaError, Result};
use crate::time::Ticks;

impl MediaError {
    /// Best-effort copy for fanning one command result out to several
    /// waiters. Backend errors lose their native payload but keep the text.
    pub(crate) fn duplicate(&self) -> MediaError {
        use MediaError::*;
        match self {
            OpenFailed(message) => OpenFailed(message.clone()),
            DecoderNotFound(message) => DecoderNotFound(message.clone()),
            CodecOpenFailed(message) => CodecOpenFailed(message.clone()),
            ReadFailed(message) => ReadFailed(message.clone()),
            SeekFailed(message) => SeekFailed(message.clone()),
            ConvertFailed(message) => ConvertFailed(message.clone()),
            Disposed => Disposed,
            Cancelled => Cancelled,
            UnknownMediaType => UnknownMediaType,
            Backend(error) => ReadFailed(error.to_string()),
        }
    }
}

/// Completion side of an asynchronous engine command.
pub(crate) struct Promise {
    sender: Sender<Result<()>>,
}

impl Promise {
    fn new() -> (Promise, CommandHandle) {
        let (sender, receiver) = bounded(1);
        (Promise { sender }, CommandHandle { receiver })
    }

    pub(crate) fn fulfil(self, result: Result<()>) {
        let _ = self.sender.send(result);
    }
}

/// Handle returned by every asynchronous engine operation. Dropping it
/// detaches from the command without cancelling it.
pub struct CommandHandle {
    receiver: Receiver<Result<()>>,
}

impl CommandHandle {
    /// A handle that is already complete, used for fast-path rejections.
    pub(crate) fn ready(result: Result<()>) -> Self {
        let (promise, handle) = Promise::new();
        promise.fulfil(result);
        handle
    }

    /// Block until the command completes.
    pub fn wait(self) -> Result<()> {
        self.receiver
            .recv()
            .unwrap_or(Err(MediaError::Cancelled))
    }

    /// Non-blocking completion check.
    pub fn try_wait(&self) -> Option<Result<()>> {
        self.receiver.try_recv().ok()
    }
}

/// Records consumed by the command worker, one per user-visible operation.
/// Seeks travel through the coalescing slot instead of carrying a payload.
pub(crate) enum CommandRecord {
    Open { source: MediaSource, promise: Promise },
    Close { promise: Promise },
    ChangeMedia { promise: Promise },
    Play { promise: Promise },
    Pause { promise: Promise },
    Stop { promise: Promise },
    Seek,
    Shutdown,
}

/// The seek currently owned by the command worker. New requests mutate the
/// target in place and add their waiter; the in-flight execution re-checks
/// the slot and reruns until the target it executed is still the wanted one.
pub(crate) struct PendingSeek {
    pub target: Ticks,
    pub waiters: Vec<Promise>,
}

/// Serialises user-visible lifecycle operations onto the command worker.
///
/// `Open`/`Close` exclusivity falls out of the single worker consuming the
/// queue in order; `Seek` coalesces through the shared pending slot.
pub(crate) struct CommandManager {
    sender: Sender<CommandRecord>,
    pending_seek: Arc<Mutex<Option<PendingSeek>>>,
}

impl CommandManager {
    pub(crate) fn new() -> (Self, Receiver<CommandRecord>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (
            Self {
                sender,
                pending_seek: Arc::new(Mutex::new(None)),
            },
            receiver,
        )
    }

    fn submit(&self, build: impl FnOnce(Promise) -> CommandRecord) -> CommandHandle {
        let (promise, handle) = Promise::new();
        if self.sender.send(build(promise)).is_err() {
            return CommandHandle::ready(Err(MediaError::Disposed));
        }
        handle
    }

    pub(crate) fn open(&self, source: MediaSource) -> CommandHandle {
        self.submit(|promise| CommandRecord::Open { source, promise })
    }

    pub(crate) fn close(&self) -> CommandHandle {
        self.submit(|promise| CommandRecord::Close { promise })
    }

    pub(crate) fn change_media(&self) -> CommandHandle {
        self.submit(|promise| CommandRecord::ChangeMedia { promise })
    }

    pub(crate) fn play(&self) -> CommandHandle {
        self.submit(|promise| CommandRecord::Play { promise })
    }

    pub(crate) fn pause(&self) -> CommandHandle {
        self.submit(|promise| CommandRecord::Pause { promise })
    }

    pub(crate) fn stop(&self) -> CommandHandle {
        self.submit(|promise| CommandRecord::Stop { promise })
    }

    /// Request a seek. When one is already pending or running, its target is
    /// replaced and this request completes together with it.
    pub(crate) fn seek(&self, target: Ticks) -> CommandHandle {
        let (promise, handle) = Promise::new();
        let mut pending = self.pending_seek.lock();
        match pending.as_mut() {
            Some(record) => {
                record.target = target;
                record.waiters.push(promise);
            }
            None => {
                *pending = Some(PendingSeek {
                    target,
                    waiters: vec![promise],
                });
                drop(pending);
                if self.sender.send(CommandRecord::Seek).is_err() {
                    if let Some(record) = self.pending_seek.lock().take() {
                        for waiter in record.waiters {
                            waiter.fulfil(Err(MediaError::Disposed));
                        }
                    }
                }
            }
        }
        handle
    }

    /// The target the command worker should execute next, if any.
    pub(crate) fn current_seek_target(&self) -> Option<Ticks> {
        self.pending_seek.lock().as_ref().map(|record| record.target)
    }

    /// Complete the pending seek if its target still matches the one that
    /// was executed; otherwise keep it so the worker runs again.
    pub(crate) fn finish_seek_if_current(&self, executed: Ticks) -> Option<Vec<Promise>> {
        let mut pending = self.pending_seek.lock();
        match pending.as_ref() {
            Some(record) if record.target == executed => {
                Some(pending.take().expect("checked above").waiters)
            }
            _ => None,
        }
    }

    /// Cancel any pending seek, returning its waiters for `Cancelled`
    /// completion. Used by `Close`.
    pub(crate) fn cancel_pending_seek(&self) -> Vec<Promise> {
        self.pending_seek
            .lock()
            .take()
            .map(|record| record.waiters)
            .unwrap_or_default()
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.sender.send(CommandRecord::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_completes_with_result() {
        let handle = CommandHandle::ready(Ok(()));
        assert!(handle.wait().is_ok());

        let handle = CommandHandle::ready(Err(MediaError::Disposed));
        assert!(matches!(handle.wait(), Err(MediaError::Disposed)));
    }

    #[test]
    fn seek_requests_coalesce() {
        let (manager, receiver) = CommandManager::new();

        let first = manager.seek(Ticks::from_millis(1_000));
        let second = manager.seek(Ticks::from_millis(2_000));

        // Only one record was enqueued for both requests.
        assert!(matches!(receiver.try_recv(), Ok(CommandRecord::Seek)));
        assert!(receiver.try_recv().is_err());

        // The worker sees the newest target.
        assert_eq!(
            manager.current_seek_target(),
            Some(Ticks::from_millis(2_000))
        );

        // Finishing with a stale target keeps the record alive.
        assert!(manager
            .finish_seek_if_current(Ticks::from_millis(1_000))
            .is_none());

        let waiters = manager
            .finish_seek_if_current(Ticks::from_millis(2_000))
            .expect("target matches");
        assert_eq!(waiters.len(), 2);
        for waiter in waiters {
            waiter.fulfil(Ok(()));
        }
        assert!(first.wait().is_ok());
        assert!(second.wait().is_ok());
    }

    #[test]
    fn cancel_returns_waiters() {
        let (manager, _receiver) = CommandManager::new();
        let handle = manager.seek(Ticks::from_millis(500));

        let waiters = manager.cancel_pending_seek();
        assert_eq!(waiters.len(), 1);
        for waiter in waiters {
            waiter.fulfil(Err(MediaError::Cancelled));
        }
        assert!(matches!(handle.wait(), Err(MediaError::Cancelled)));
    }
}
