//! Process-wide logging setup shared by the binaries.

pub mod logging;

pub use logging::{try_init, InitError, LogConfig, LogFormat};

/// Initialize JSON logging filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    let _ = try_init(&LogConfig::from_env());
}
