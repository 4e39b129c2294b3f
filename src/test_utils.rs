use std::sync::{Mutex, MutexGuard, OnceLock};

/// Global lock for tests that touch process-wide signal state.
/// The SIGCHLD disposition and the wake-pipe descriptor are shared by the
/// whole process, so tests that boot a supervisor must hold this lock for
/// the supervisor's entire lifetime.
pub static SIGNAL_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn signal_lock() -> MutexGuard<'static, ()> {
    SIGNAL_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
