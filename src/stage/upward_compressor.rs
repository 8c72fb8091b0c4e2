//! Upward compressor: boosts quiet passages up toward a threshold instead of
//! attenuating loud ones.
//!
//! Shares the downward Compressor's envelope pass exactly — same
//! shared-scalar, sequential-per-channel carry — but the apply pass only
//! ever raises gain, and only below threshold.

use super::Stage;
use crate::audio::{db_to_lin, lin_to_db, AudioBlock};
use crate::error::PipelineError;
use crate::stage::{StageKind, StageParams};

/// Safety ceiling on the boost applied to quiet signal (see DESIGN.md Open
/// Questions for the reasoning behind this bound).
const MAX_BOOST_DB: f32 = 12.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpwardCompressorParams {
    pub ratio: f32,
    pub threshold_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub output_gain_db: f32,
}

impl Default for UpwardCompressorParams {
    fn default() -> Self {
        Self {
            ratio: 2.0,
            threshold_db: -30.0,
            attack_ms: 10.0,
            release_ms: 50.0,
            output_gain_db: 0.0,
        }
    }
}

impl UpwardCompressorParams {
    fn validate(&self) -> Result<(), PipelineError> {
        if !self.ratio.is_finite() || !(1.0..=20.0).contains(&self.ratio) {
            return Err(PipelineError::InvalidParams);
        }
        if !self.threshold_db.is_finite() || !self.output_gain_db.is_finite() {
            return Err(PipelineError::InvalidParams);
        }
        if !self.attack_ms.is_finite() || self.attack_ms <= 0.0 {
            return Err(PipelineError::InvalidParams);
        }
        if !self.release_ms.is_finite() || self.release_ms <= 0.0 {
            return Err(PipelineError::InvalidParams);
        }
        Ok(())
    }
}

struct Coefs {
    a: f32,
    r: f32,
    slope: f32,
    out_g: f32,
}

fn compute_coefs(sample_rate: u32, p: &UpwardCompressorParams) -> Coefs {
    let sr = sample_rate as f32;
    Coefs {
        a: (-1.0 / (sr * p.attack_ms / 1000.0)).exp(),
        r: (-1.0 / (sr * p.release_ms / 1000.0)).exp(),
        slope: 1.0 - 1.0 / p.ratio,
        out_g: db_to_lin(p.output_gain_db),
    }
}

pub struct UpwardCompressorStage {
    params: UpwardCompressorParams,
    sample_rate: u32,
    coefs: Coefs,
    env: f32,
    max_env: Vec<f32>,
}

impl UpwardCompressorStage {
    pub fn new(sample_rate: u32, params: UpwardCompressorParams) -> Result<Self, PipelineError> {
        params.validate()?;
        let coefs = compute_coefs(sample_rate, &params);
        Ok(Self {
            params,
            sample_rate,
            coefs,
            env: 0.0,
            max_env: Vec::new(),
        })
    }

    fn ensure_capacity(&mut self, frames: usize) {
        if self.max_env.len() < frames {
            self.max_env.resize(frames, 0.0);
        }
    }
}

impl Stage for UpwardCompressorStage {
    fn kind(&self) -> StageKind {
        StageKind::UpwardCompressor
    }

    fn update(&mut self, params: &StageParams) -> Result<(), PipelineError> {
        let StageParams::UpwardCompressor(p) = params else {
            return Err(PipelineError::InvalidParams);
        };
        p.validate()?;
        self.params = *p;
        self.coefs = compute_coefs(self.sample_rate, &self.params);
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock) -> Result<(), PipelineError> {
        let frames = block.frames();
        self.ensure_capacity(frames);
        for v in self.max_env[..frames].iter_mut() {
            *v = 0.0;
        }

        let (a, r) = (self.coefs.a, self.coefs.r);
        for c in 0..block.channels() {
            let mut env = self.env;
            for (i, &x) in block.channel(c).iter().enumerate() {
                let ax = x.abs();
                env = if env < ax {
                    ax + a * (env - ax)
                } else {
                    ax + r * (env - ax)
                };
                if env > self.max_env[i] {
                    self.max_env[i] = env;
                }
            }
            self.env = env;
        }

        let (slope, threshold_db, out_g) = (self.coefs.slope, self.params.threshold_db, self.coefs.out_g);
        for c in 0..block.channels() {
            for (i, s) in block.channel_mut(c).iter_mut().enumerate() {
                let env_db = lin_to_db(self.max_env[i]);
                let over_db = (threshold_db - env_db).max(0.0);
                let gain_db = (slope * over_db).clamp(0.0, MAX_BOOST_DB);
                *s *= db_to_lin(gain_db) * out_g;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.env = 0.0;
    }

    fn latency_ns(&self) -> i64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stage: &mut UpwardCompressorStage, frames: usize, value: impl Fn(usize) -> f32) -> Vec<f32> {
        let mut data: Vec<f32> = (0..frames).map(value).collect();
        let mut ptrs = vec![data.as_mut_ptr()];
        let mut block = unsafe { AudioBlock::from_raw(&mut ptrs, frames, 48000, 0) };
        stage.process(&mut block).unwrap();
        data
    }

    #[test]
    fn boosts_quiet_signal_toward_threshold() {
        let mut stage = UpwardCompressorStage::new(
            48000,
            UpwardCompressorParams {
                ratio: 2.0,
                threshold_db: -10.0,
                attack_ms: 1.0,
                release_ms: 10.0,
                output_gain_db: 0.0,
            },
        )
        .unwrap();
        let amp = db_to_lin(-40.0);
        let out = run(&mut stage, 4800, |i| {
            (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 48000.0).sin() * amp
        });
        let tail = &out[out.len() - 1200..];
        let peak = crate::audio::peak_level(tail);
        assert!(peak > amp, "expected boosted peak > {amp}, got {peak}");
    }

    #[test]
    fn loud_signal_above_threshold_unboosted() {
        let mut stage = UpwardCompressorStage::new(48000, UpwardCompressorParams::default()).unwrap();
        let out = run(&mut stage, 4800, |i| {
            (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 48000.0).sin()
        });
        let tail = &out[out.len() - 1200..];
        let peak = crate::audio::peak_level(tail);
        assert!(peak <= 1.01);
    }

    #[test]
    fn reset_sets_envelope_to_zero() {
        let mut stage = UpwardCompressorStage::new(48000, UpwardCompressorParams::default()).unwrap();
        let _ = run(&mut stage, 480, |_| 0.3);
        stage.reset();
        assert_eq!(stage.env, 0.0);
    }

    #[test]
    fn invalid_ratio_rejected_at_construction_and_update() {
        let mut params = UpwardCompressorParams::default();
        params.ratio = 30.0;
        assert_eq!(
            UpwardCompressorStage::new(48000, params).unwrap_err(),
            PipelineError::InvalidParams
        );

        let mut stage = UpwardCompressorStage::new(48000, UpwardCompressorParams::default()).unwrap();
        let mut bad = UpwardCompressorParams::default();
        bad.release_ms = -1.0;
        assert_eq!(
            stage.update(&StageParams::UpwardCompressor(bad)).unwrap_err(),
            PipelineError::InvalidParams
        );
    }
}
