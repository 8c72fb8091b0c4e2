//! Real-time microphone DSP chain.
//!
//! A single-source capture pipeline: gain, 3-band EQ, compressor, noise
//! gate/expander, noise suppression, limiter, polarity invert and upward
//! compression stages, hosted behind a fixed-capacity slot array
//! ([`chain::ChainManager`]) and a C-ABI facade ([`ffi`]) for embedding in a
//! non-Rust host.
//!
//! The audio-thread entry point is [`ChainManager::process`]; everything
//! else (`update_slot`, `remove_slot`, `reset`) is a control-thread
//! operation the host must serialize against `process` itself — see the
//! module docs on `chain` for the concurrency contract.

pub mod audio;
pub mod chain;
pub mod config;
pub mod error;
pub mod ffi;
pub mod stage;

pub use audio::AudioBlock;
pub use chain::ChainManager;
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use stage::{Stage, StageKind, StageParams};
