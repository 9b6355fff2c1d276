//! Tracing and logging setup shared by the binaries.

pub mod tracing;

pub use tracing::LogFormat;

/// Initialize process-wide tracing with the given output format.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}
