//! Downward compressor with a single scalar envelope shared across channels.
//!
//! The envelope is intentionally *not* decorrelated per channel: it carries
//! one running envelope through the channels sequentially within a block,
//! so the last channel processed "wins" the carry-over into the next
//! block. This is unusual but is the tested, intended behavior.

use super::Stage;
use crate::audio::{db_to_lin, lin_to_db, AudioBlock};
use crate::error::PipelineError;
use crate::stage::{StageKind, StageParams};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressorParams {
    pub ratio: f32,
    pub threshold_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub output_gain_db: f32,
}

impl Default for CompressorParams {
    /// Matches the documented default: ratio 10, threshold -18 dB, attack 6 ms,
    /// release 60 ms, unity output gain.
    fn default() -> Self {
        Self {
            ratio: 10.0,
            threshold_db: -18.0,
            attack_ms: 6.0,
            release_ms: 60.0,
            output_gain_db: 0.0,
        }
    }
}

impl CompressorParams {
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

fn compute_coefs(sample_rate: u32, p: &CompressorParams) -> Coefs {
    let sr = sample_rate as f32;
    Coefs {
        a: (-1.0 / (sr * p.attack_ms / 1000.0)).exp(),
        r: (-1.0 / (sr * p.release_ms / 1000.0)).exp(),
        slope: 1.0 - 1.0 / p.ratio,
        out_g: db_to_lin(p.output_gain_db),
    }
}

pub struct CompressorStage {
    params: CompressorParams,
    sample_rate: u32,
    coefs: Coefs,
    env: f32,
    /// Scratch buffer for the per-sample envelope pass. Grows monotonically,
    /// sized to the largest block seen since the last reset; never shrinks.
    max_env: Vec<f32>,
}

impl CompressorStage {
    pub fn new(sample_rate: u32, params: CompressorParams) -> Result<Self, PipelineError> {
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
            log::warn!(
                "compressor: growing envelope scratch buffer {} -> {} samples on the audio thread",
                self.max_env.len(),
                frames
            );
            self.max_env.resize(frames, 0.0);
        }
    }
}

impl Stage for CompressorStage {
    fn kind(&self) -> StageKind {
        StageKind::Compressor
    }

    fn update(&mut self, params: &StageParams) -> Result<(), PipelineError> {
        let StageParams::Compressor(p) = params else {
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

        // Pass 1: channel-interleaved envelope, shared scalar carry.
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

        // Pass 2: apply gain reduction derived from the shared envelope.
        let (slope, threshold_db, out_g) = (self.coefs.slope, self.params.threshold_db, self.coefs.out_g);
        for c in 0..block.channels() {
            for (i, s) in block.channel_mut(c).iter_mut().enumerate() {
                let env_db = lin_to_db(self.max_env[i]);
                let gain_db = slope * (threshold_db - env_db);
                let g = db_to_lin(gain_db.min(0.0));
                *s *= g * out_g;
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

    fn run(stage: &mut CompressorStage, channels: usize, frames: usize, value: impl Fn(usize) -> f32) -> Vec<Vec<f32>> {
        let mut data: Vec<Vec<f32>> = (0..channels).map(|_| (0..frames).map(&value).collect()).collect();
        let mut ptrs: Vec<*mut f32> = data.iter_mut().map(|v| v.as_mut_ptr()).collect();
        let mut block = unsafe { AudioBlock::from_raw(&mut ptrs, frames, 48000, 0) };
        stage.process(&mut block).unwrap();
        data
    }

    #[test]
    fn no_op_above_ceiling_threshold() {
        let mut stage = CompressorStage::new(
            48000,
            CompressorParams {
                ratio: 4.0,
                threshold_db: 60.0,
                attack_ms: 5.0,
                release_ms: 50.0,
                output_gain_db: 0.0,
            },
        )
        .unwrap();
        let out = run(&mut stage, 1, 480, |i| {
            (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 48000.0).sin() * 0.5
        });
        let input: Vec<f32> = (0..480)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 48000.0).sin() * 0.5)
            .collect();
        for (o, i) in out[0].iter().zip(input.iter()) {
            assert!((o - i).abs() < 1e-5);
        }
    }

    #[test]
    fn attenuates_loud_steady_state_signal() {
        let mut stage = CompressorStage::new(
            48000,
            CompressorParams {
                ratio: 4.0,
                threshold_db: -20.0,
                attack_ms: 1.0,
                release_ms: 10.0,
                output_gain_db: 0.0,
            },
        )
        .unwrap();
        let amp = crate::audio::db_to_lin(-10.0);
        let out = run(&mut stage, 1, 4800, |i| {
            (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 48000.0).sin() * amp
        });
        let input_rms = {
            let n = 1200;
            let tail = &out[0][out[0].len() - n..];
            crate::audio::rms_level(tail)
        };
        let expected_in_rms = amp / std::f32::consts::SQRT_2;
        let attenuation_db = 20.0 * (input_rms / expected_in_rms).log10();
        assert!((attenuation_db - (-7.5)).abs() < 1.0, "got {attenuation_db} dB");
    }

    #[test]
    fn reset_idempotent_and_silence_stays_silent() {
        let mut stage = CompressorStage::new(48000, CompressorParams::default()).unwrap();
        let _ = run(&mut stage, 2, 480, |i| (i as f32 / 480.0) * 0.8);
        stage.reset();
        stage.reset();
        let out = run(&mut stage, 1, 64, |_| 0.0);
        assert!(out[0].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn invalid_ratio_rejected_at_construction_and_update() {
        let mut params = CompressorParams::default();
        params.ratio = 0.5;
        assert_eq!(
            CompressorStage::new(48000, params).unwrap_err(),
            PipelineError::InvalidParams
        );

        let mut stage = CompressorStage::new(48000, CompressorParams::default()).unwrap();
        let mut bad = CompressorParams::default();
        bad.attack_ms = f32::NAN;
        assert_eq!(
            stage.update(&StageParams::Compressor(bad)).unwrap_err(),
            PipelineError::InvalidParams
        );
    }
}
