//! Engine error taxonomy.
//!
//! Startup failures (no adapter, broken kernel) are fatal and surface as
//! `Err` from construction. Per-frame GPU faults are logged and the frame is
//! skipped; they never propagate out of the frame callback.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FluidError {
    /// No usable graphics backend. The caller must fall back to a static
    /// background and stop calling into the engine.
    #[error("no compatible GPU context: {reason}")]
    ContextUnavailable { reason: String },

    /// A kernel's WGSL failed validation at startup, with the backend log.
    #[error("kernel '{kernel}' failed to compile: {log}")]
    ShaderCompile { kernel: &'static str, log: String },

    /// Pipeline creation for a kernel failed after the shader validated.
    #[error("kernel '{kernel}' failed to build a pipeline: {log}")]
    PipelineBuild { kernel: &'static str, log: String },

    /// A texture readback (capture or diagnostics) could not be mapped.
    #[error("GPU readback failed: {0}")]
    Readback(String),

    /// Method called on a disposed engine.
    #[error("engine has been disposed")]
    Disposed,
}
