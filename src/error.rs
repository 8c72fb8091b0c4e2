//! Pipeline error taxonomy.
//!
//! These map 1:1 onto the integer status codes the FFI facade (`ffi` module)
//! returns to the host; see `ffi::status_code`.

use thiserror::Error;

/// Errors surfaced by the pipeline's public and FFI-facing operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    /// Null reference, out-of-range slot id, empty frames, or zero channels.
    #[error("invalid parameters")]
    InvalidParams,

    /// A stage's lazy scratch growth failed to allocate.
    #[error("out of memory")]
    OutOfMemory,

    /// Slot id is in range but the slot is Empty.
    #[error("filter not found in slot")]
    FilterNotFound,

    /// Block channel count or sample rate does not match the pipeline.
    #[error("unsupported audio format")]
    UnsupportedFormat,

    /// Stage creation did not produce usable state (e.g. external denoiser
    /// failed to initialize).
    #[error("stage initialization failed")]
    InitializationFailed,

    /// Requested stage kind is outside the known enum.
    #[error("invalid filter type")]
    InvalidFilterType,

    /// The stage kind's backing capability is compiled out (feature flag).
    #[error("backing library not available")]
    LibraryNotAvailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_have_distinct_messages() {
        let variants = [
            PipelineError::InvalidParams,
            PipelineError::OutOfMemory,
            PipelineError::FilterNotFound,
            PipelineError::UnsupportedFormat,
            PipelineError::InitializationFailed,
            PipelineError::InvalidFilterType,
            PipelineError::LibraryNotAvailable,
        ];
        let mut messages: Vec<String> = variants.iter().map(|e| e.to_string()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), variants.len());
    }
}
