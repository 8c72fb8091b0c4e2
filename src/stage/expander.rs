//! Expander/gate: per-channel RMS or peak envelope with ballistic gain
//! smoothing, expanding (attenuating) the signal below threshold.

use super::Stage;
use crate::audio::{db_to_lin, lin_to_db, AudioBlock};
use crate::error::PipelineError;
use crate::stage::{StageKind, StageParams};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detector {
    Rms,
    Peak,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpanderPreset {
    Expander,
    Gate,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExpanderParams {
    pub ratio: f32,
    pub threshold_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub output_gain_db: f32,
    pub knee_width: f32,
    pub detector: Detector,
    pub preset: ExpanderPreset,
}

impl Default for ExpanderParams {
    fn default() -> Self {
        Self {
            ratio: 2.0,
            threshold_db: -30.0,
            attack_ms: 10.0,
            release_ms: 50.0,
            output_gain_db: 0.0,
            knee_width: 1.0,
            detector: Detector::Rms,
            preset: ExpanderPreset::Expander,
        }
    }
}

impl ExpanderParams {
    fn validate(&self) -> Result<(), PipelineError> {
        if !self.ratio.is_finite() || !self.threshold_db.is_finite() || !self.output_gain_db.is_finite() {
            return Err(PipelineError::InvalidParams);
        }
        if !self.knee_width.is_finite() {
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
    rms_coef: f32,
    out_g: f32,
}

fn compute_coefs(sample_rate: u32, p: &ExpanderParams) -> Coefs {
    let sr = sample_rate as f32;
    Coefs {
        a: (-1.0 / (sr * p.attack_ms / 1000.0)).exp(),
        r: (-1.0 / (sr * p.release_ms / 1000.0)).exp(),
        slope: 1.0 - p.ratio,
        rms_coef: 2.0f32.powf(-100.0 / sr),
        out_g: db_to_lin(p.output_gain_db),
    }
}

#[derive(Clone, Copy, Default)]
struct ChannelState {
    runave: f32,
    gain_db: f32,
}

pub struct ExpanderStage {
    params: ExpanderParams,
    sample_rate: u32,
    coefs: Coefs,
    channels: Vec<ChannelState>,
    env_scratch: Vec<f32>,
}

impl ExpanderStage {
    pub fn new(channel_count: usize, sample_rate: u32, params: ExpanderParams) -> Result<Self, PipelineError> {
        params.validate()?;
        let coefs = compute_coefs(sample_rate, &params);
        Ok(Self {
            params,
            sample_rate,
            coefs,
            channels: vec![ChannelState::default(); channel_count],
            env_scratch: Vec::new(),
        })
    }

    fn ensure_capacity(&mut self, channels: usize, frames: usize) {
        if self.channels.len() < channels {
            self.channels.resize(channels, ChannelState::default());
        }
        if self.env_scratch.len() < frames {
            self.env_scratch.resize(frames, 0.0);
        }
    }
}

impl Stage for ExpanderStage {
    fn kind(&self) -> StageKind {
        StageKind::Expander
    }

    fn update(&mut self, params: &StageParams) -> Result<(), PipelineError> {
        let StageParams::Expander(p) = params else {
            return Err(PipelineError::InvalidParams);
        };
        p.validate()?;
        self.params = *p;
        self.coefs = compute_coefs(self.sample_rate, p);
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock) -> Result<(), PipelineError> {
        let frames = block.frames();
        self.ensure_capacity(block.channels(), frames);
        let (a, r, slope, rms_coef, out_g) = (
            self.coefs.a,
            self.coefs.r,
            self.coefs.slope,
            self.coefs.rms_coef,
            self.coefs.out_g,
        );
        let threshold_db = self.params.threshold_db;
        let detector = self.params.detector;

        for c in 0..block.channels() {
            let st = &mut self.channels[c];

            // Step 1: envelope.
            let mut runave = st.runave;
            {
                let samples = block.channel(c);
                for (i, &x) in samples.iter().enumerate() {
                    self.env_scratch[i] = match detector {
                        Detector::Rms => {
                            runave = rms_coef * runave + (1.0 - rms_coef) * x * x;
                            runave.max(0.0).sqrt()
                        }
                        Detector::Peak => x.abs(),
                    };
                }
            }
            st.runave = runave;

            // Step 2 + 3: gain ballistics and application.
            let mut prev = st.gain_db;
            for (i, s) in block.channel_mut(c).iter_mut().enumerate() {
                let env_db = lin_to_db(self.env_scratch[i]).max(-120.0);
                let diff = threshold_db - env_db;
                let target_db = if diff > 0.0 {
                    (slope * diff).max(-60.0)
                } else {
                    0.0
                };
                prev = if target_db > prev {
                    a * prev + (1.0 - a) * target_db
                } else {
                    r * prev + (1.0 - r) * target_db
                };
                let g = db_to_lin(prev.min(0.0));
                *s *= g * out_g;
            }
            st.gain_db = prev;
        }
        Ok(())
    }

    fn reset(&mut self) {
        for st in self.channels.iter_mut() {
            *st = ChannelState::default();
        }
    }

    fn latency_ns(&self) -> i64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stage: &mut ExpanderStage, channels: usize, frames: usize, value: impl Fn(usize) -> f32) -> Vec<Vec<f32>> {
        let mut data: Vec<Vec<f32>> = (0..channels).map(|_| (0..frames).map(&value).collect()).collect();
        let mut ptrs: Vec<*mut f32> = data.iter_mut().map(|v| v.as_mut_ptr()).collect();
        let mut block = unsafe { AudioBlock::from_raw(&mut ptrs, frames, 48000, 0) };
        stage.process(&mut block).unwrap();
        data
    }

    #[test]
    fn quiet_tone_attenuated_at_least_20db() {
        let mut stage = ExpanderStage::new(1, 48000, ExpanderParams::default()).unwrap();
        let amp = crate::audio::db_to_lin(-50.0);
        let out = run(&mut stage, 1, 4800, |i| {
            (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 48000.0).sin() * amp
        });
        let tail = &out[0][out[0].len() - 1200..];
        let peak = crate::audio::peak_level(tail);
        assert!(peak < amp * crate::audio::db_to_lin(-20.0));
    }

    #[test]
    fn loud_tone_passes_near_unity() {
        let mut stage = ExpanderStage::new(1, 48000, ExpanderParams::default()).unwrap();
        let out = run(&mut stage, 1, 4800, |i| {
            (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 48000.0).sin()
        });
        let tail = &out[0][out[0].len() - 1200..];
        let peak = crate::audio::peak_level(tail);
        assert!(peak > 0.9);
    }

    #[test]
    fn reset_zeroes_per_channel_state() {
        let mut stage = ExpanderStage::new(2, 48000, ExpanderParams::default()).unwrap();
        let _ = run(&mut stage, 2, 480, |i| (i as f32 / 480.0) - 0.5);
        stage.reset();
        assert!(stage.channels.iter().all(|c| c.runave == 0.0 && c.gain_db == 0.0));
    }

    #[test]
    fn non_finite_attack_is_rejected() {
        let mut params = ExpanderParams::default();
        params.attack_ms = f32::NAN;
        assert_eq!(
            ExpanderStage::new(1, 48000, params).unwrap_err(),
            PipelineError::InvalidParams
        );

        let mut stage = ExpanderStage::new(1, 48000, ExpanderParams::default()).unwrap();
        let mut bad = ExpanderParams::default();
        bad.release_ms = 0.0;
        assert_eq!(
            stage.update(&StageParams::Expander(bad)).unwrap_err(),
            PipelineError::InvalidParams
        );
    }
}
