//! Peak limiter: brick-wall gain reduction (zero attack) with smooth release.

use super::Stage;
use crate::audio::{db_to_lin, AudioBlock};
use crate::error::PipelineError;
use crate::stage::{StageKind, StageParams};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimiterParams {
    pub threshold_db: f32,
    pub release_ms: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            threshold_db: -6.0,
            release_ms: 60.0,
        }
    }
}

impl LimiterParams {
    fn validate(&self) -> Result<(), PipelineError> {
        if !self.threshold_db.is_finite() {
            return Err(PipelineError::InvalidParams);
        }
        if !self.release_ms.is_finite() || self.release_ms <= 0.0 {
            return Err(PipelineError::InvalidParams);
        }
        Ok(())
    }
}

pub struct LimiterStage {
    params: LimiterParams,
    sample_rate: u32,
    threshold: f32,
    release_coef: f32,
    gain: Vec<f32>,
}

impl LimiterStage {
    pub fn new(channel_count: usize, sample_rate: u32, params: LimiterParams) -> Result<Self, PipelineError> {
        params.validate()?;
        let sr = sample_rate as f32;
        Ok(Self {
            threshold: db_to_lin(params.threshold_db),
            release_coef: (-1.0 / (sr * params.release_ms / 1000.0)).exp(),
            params,
            sample_rate,
            gain: vec![1.0; channel_count],
        })
    }
}

impl Stage for LimiterStage {
    fn kind(&self) -> StageKind {
        StageKind::Limiter
    }

    fn update(&mut self, params: &StageParams) -> Result<(), PipelineError> {
        let StageParams::Limiter(p) = params else {
            return Err(PipelineError::InvalidParams);
        };
        p.validate()?;
        self.params = *p;
        self.threshold = db_to_lin(p.threshold_db);
        let sr = self.sample_rate as f32;
        self.release_coef = (-1.0 / (sr * p.release_ms / 1000.0)).exp();
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock) -> Result<(), PipelineError> {
        if self.gain.len() < block.channels() {
            self.gain.resize(block.channels(), 1.0);
        }
        let (threshold, r) = (self.threshold, self.release_coef);
        for c in 0..block.channels() {
            let mut gain = self.gain[c];
            for s in block.channel_mut(c) {
                let ax = s.abs();
                let needed = if ax > threshold { threshold / ax } else { 1.0 };
                gain = if needed < gain {
                    needed
                } else {
                    (gain + r * (1.0 - gain)).min(1.0)
                };
                *s *= gain;
            }
            self.gain[c] = gain;
        }
        Ok(())
    }

    fn reset(&mut self) {
        for g in self.gain.iter_mut() {
            *g = 1.0;
        }
    }

    fn latency_ns(&self) -> i64 {
        0
    }
}
