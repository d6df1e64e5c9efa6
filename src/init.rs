use std::sync::Once;

use bitflags::bitflags;
use parking_lot::Mutex;
use rsmpeg::ffi;

bitflags! {
    /// Optional native subsystems brought up during initialisation.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct InitFlags: u32 {
        /// Initialise the network layer for rtsp/udp/http inputs.
        const NETWORK = 1;
    }
}

impl Default for InitFlags {
    fn default() -> Self {
        InitFlags::NETWORK
    }
}

static INIT: Once = Once::new();
static CONFIGURED_FLAGS: Mutex<Option<InitFlags>> = Mutex::new(None);

/// One-shot global initialisation of the native library.
///
/// The first call wins; later calls with different flags are logged and
/// ignored, because the native state is process-wide.
pub fn initialize(flags: InitFlags) {
    let mut configured = CONFIGURED_FLAGS.lock();
    if let Some(existing) = *configured {
        if existing != flags {
            tracing::warn!(target: "engine",
                ?existing, requested = ?flags,
                "native library already initialised, flags ignored");
        }
        return;
    }

    INIT.call_once(|| {
        unsafe {
            ffi::av_log_set_level(ffi::AV_LOG_WARNING as libc::c_int);
            if flags.contains(InitFlags::NETWORK) {
                ffi::avformat_network_init();
            }
        }
        tracing::debug!(target: "engine", ?flags, "native library initialised");
    });
    *configured = Some(flags);
}

/// Initialise with defaults when the host has not done so explicitly.
pub(crate) fn ensure_initialized() {
    initialize(InitFlags::default());
}
