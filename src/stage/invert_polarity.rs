//! Trivial per-sample polarity inversion.

use super::Stage;
use crate::audio::AudioBlock;
use crate::error::PipelineError;
use crate::stage::{StageKind, StageParams};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InvertPolarityParams {
    pub enabled: bool,
}

impl Default for InvertPolarityParams {
    fn default() -> Self {
        Self { enabled: true }
    }
}

pub struct InvertPolarityStage {
    params: InvertPolarityParams,
}

impl InvertPolarityStage {
    pub fn new(params: InvertPolarityParams) -> Self {
        Self { params }
    }
}

impl Stage for InvertPolarityStage {
    fn kind(&self) -> StageKind {
        StageKind::InvertPolarity
    }

    fn update(&mut self, params: &StageParams) -> Result<(), PipelineError> {
        let StageParams::InvertPolarity(p) = params else {
            return Err(PipelineError::InvalidParams);
        };
        self.params = *p;
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock) -> Result<(), PipelineError> {
        if !self.params.enabled {
            return Ok(());
        }
        for c in 0..block.channels() {
            for s in block.channel_mut(c) {
                *s = -*s;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn latency_ns(&self) -> i64 {
        0
    }
}
