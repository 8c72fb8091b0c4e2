//! Trivial scalar gain stage.

use super::Stage;
use crate::audio::{db_to_lin, AudioBlock};
use crate::error::PipelineError;
use crate::stage::{StageKind, StageParams};

/// Gain parameters: a single dB value, required to lie in [-30, +30].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainParams {
    pub gain_db: f32,
}

impl Default for GainParams {
    fn default() -> Self {
        Self { gain_db: 0.0 }
    }
}

impl GainParams {
    fn validate(&self) -> Result<(), PipelineError> {
        if !self.gain_db.is_finite() || !(-30.0..=30.0).contains(&self.gain_db) {
            return Err(PipelineError::InvalidParams);
        }
        Ok(())
    }
}

/// Stateless-across-blocks gain stage: caches the linear multiplier so
/// `process` never touches a logarithm.
pub struct GainStage {
    params: GainParams,
    g: f32,
}

impl GainStage {
    pub fn new(params: GainParams) -> Result<Self, PipelineError> {
        params.validate()?;
        Ok(Self {
            g: db_to_lin(params.gain_db),
            params,
        })
    }
}

impl Stage for GainStage {
    fn kind(&self) -> StageKind {
        StageKind::Gain
    }

    fn update(&mut self, params: &StageParams) -> Result<(), PipelineError> {
        let StageParams::Gain(p) = params else {
            return Err(PipelineError::InvalidParams);
        };
        p.validate()?;
        self.params = *p;
        self.g = db_to_lin(self.params.gain_db);
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock) -> Result<(), PipelineError> {
        for c in 0..block.channels() {
            for s in block.channel_mut(c) {
                *s *= self.g;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        // Stateless across blocks.
    }

    fn latency_ns(&self) -> i64 {
        0
    }
}
