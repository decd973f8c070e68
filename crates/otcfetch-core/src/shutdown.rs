//! Graceful shutdown support via atomic flag

use std::sync::atomic::AtomicBool;

/// Global shutdown flag, set by the SIGTERM/SIGINT handler.
///
/// The fetch loop polls it before every request.
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}
