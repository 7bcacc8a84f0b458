//! Setup-time errors.
//!
//! Everything here is reported while the output is being configured. The
//! tick path has no error type: a missing buffer or an empty audio ring is
//! substituted with blank output, never reported.

use platform::{ConfigError, OutOfRangeError};
use thiserror_no_std::Error;

/// Errors returned by engine and pipeline setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DviError {
    /// Timing, pin or margin configuration rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Audio parameter outside its legal range.
    #[error("audio parameter out of range: {0}")]
    OutOfRange(#[from] OutOfRangeError),
    /// The tick source is already attached to an engine.
    #[error("tick source already registered")]
    AlreadyRegistered,
    /// `allocate_audio_buffer` was called twice.
    #[error("audio buffer already allocated")]
    AudioBufferAlreadyAllocated,
    /// Audio storage must hold at least one sample.
    #[error("audio buffer storage is empty")]
    EmptyAudioBuffer,
    /// A provisioned or supplied buffer has the wrong length for the mode.
    #[error("buffer holds {actual} elements, mode needs {expected}")]
    BufferSizeMismatch {
        /// Length the timing requires.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },
    /// A scaled encode span runs past the end of the source or destination.
    #[error("scaled span exceeds the line")]
    ScaledSpanOutOfBounds,
    /// The pipeline has not been given its buffers yet.
    #[error("buffer pools not provisioned")]
    NotProvisioned,
    /// The pipeline has already been provisioned with buffers.
    #[error("buffer pools already provisioned")]
    AlreadyProvisioned,
    /// Another engine is already driving the pipeline.
    #[error("pipeline already has an engine")]
    PipelineInUse,
}
