//! Hysteresis noise gate: separate open/close thresholds plus a hold timer,
//! avoiding rapid open/close chatter around a single threshold.

use super::Stage;
use crate::audio::{lin_to_db, AudioBlock};
use crate::error::PipelineError;
use crate::stage::{StageKind, StageParams};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseGateParams {
    pub open_threshold_db: f32,
    pub close_threshold_db: f32,
    pub attack_ms: f32,
    pub hold_ms: f32,
    pub release_ms: f32,
}

impl Default for NoiseGateParams {
    fn default() -> Self {
        Self {
            open_threshold_db: -26.0,
            close_threshold_db: -32.0,
            attack_ms: 25.0,
            hold_ms: 200.0,
            release_ms: 150.0,
        }
    }
}

impl NoiseGateParams {
    fn validate(&self) -> Result<(), PipelineError> {
        if !self.open_threshold_db.is_finite() || !self.close_threshold_db.is_finite() {
            return Err(PipelineError::InvalidParams);
        }
        if self.close_threshold_db > self.open_threshold_db {
            return Err(PipelineError::InvalidParams);
        }
        if !self.attack_ms.is_finite() || self.attack_ms <= 0.0 {
            return Err(PipelineError::InvalidParams);
        }
        if !self.release_ms.is_finite() || self.release_ms <= 0.0 {
            return Err(PipelineError::InvalidParams);
        }
        if !self.hold_ms.is_finite() || self.hold_ms < 0.0 {
            return Err(PipelineError::InvalidParams);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum GateState {
    Closed,
    Opening,
    Open,
    Holding,
    Closing,
}

#[derive(Clone, Copy)]
struct ChannelState {
    env: f32,
    gain: f32,
    state: GateState,
    hold_remaining: u32,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            env: 0.0,
            gain: 0.0,
            state: GateState::Closed,
            hold_remaining: 0,
        }
    }
}

struct Coefs {
    a: f32,
    r: f32,
    hold_samples: u32,
}

fn compute_coefs(sample_rate: u32, p: &NoiseGateParams) -> Coefs {
    let sr = sample_rate as f32;
    Coefs {
        a: (-1.0 / (sr * p.attack_ms / 1000.0)).exp(),
        r: (-1.0 / (sr * p.release_ms / 1000.0)).exp(),
        hold_samples: (sr * p.hold_ms / 1000.0).round() as u32,
    }
}

pub struct NoiseGateStage {
    params: NoiseGateParams,
    sample_rate: u32,
    coefs: Coefs,
    channels: Vec<ChannelState>,
}

impl NoiseGateStage {
    pub fn new(channel_count: usize, sample_rate: u32, params: NoiseGateParams) -> Result<Self, PipelineError> {
        params.validate()?;
        let coefs = compute_coefs(sample_rate, &params);
        Ok(Self {
            params,
            sample_rate,
            coefs,
            channels: vec![ChannelState::default(); channel_count],
        })
    }
}

impl Stage for NoiseGateStage {
    fn kind(&self) -> StageKind {
        StageKind::NoiseGate
    }

    fn update(&mut self, params: &StageParams) -> Result<(), PipelineError> {
        let StageParams::NoiseGate(p) = params else {
            return Err(PipelineError::InvalidParams);
        };
        p.validate()?;
        self.params = *p;
        self.coefs = compute_coefs(self.sample_rate, p);
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock) -> Result<(), PipelineError> {
        if self.channels.len() < block.channels() {
            self.channels.resize(block.channels(), ChannelState::default());
        }
        let (a, r, hold_samples) = (self.coefs.a, self.coefs.r, self.coefs.hold_samples);
        let (open_db, close_db) = (self.params.open_threshold_db, self.params.close_threshold_db);

        for c in 0..block.channels() {
            let st = &mut self.channels[c];
            for s in block.channel_mut(c) {
                let ax = s.abs();
                st.env += (if ax > st.env { a } else { r }) * (ax - st.env);
                let env_db = lin_to_db(st.env);

                match st.state {
                    GateState::Closed | GateState::Closing if env_db >= open_db => {
                        st.state = GateState::Opening;
                    }
                    _ => {}
                }

                match st.state {
                    GateState::Opening => {
                        st.gain += a * (1.0 - st.gain);
                        if st.gain >= 0.999 {
                            st.gain = 1.0;
                            st.state = GateState::Open;
                        }
                    }
                    GateState::Open => {
                        if env_db < close_db {
                            st.state = GateState::Holding;
                            st.hold_remaining = hold_samples;
                        }
                    }
                    GateState::Holding => {
                        if env_db >= open_db {
                            st.state = GateState::Open;
                        } else if st.hold_remaining == 0 {
                            st.state = GateState::Closing;
                        } else {
                            st.hold_remaining -= 1;
                        }
                    }
                    GateState::Closing => {
                        st.gain += r * (0.0 - st.gain);
                        if st.gain <= 0.001 {
                            st.gain = 0.0;
                            st.state = GateState::Closed;
                        }
                    }
                    GateState::Closed => {}
                }

                *s *= st.gain;
            }
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

    fn run(stage: &mut NoiseGateStage, frames: usize, value: impl Fn(usize) -> f32) -> Vec<f32> {
        let mut data: Vec<f32> = (0..frames).map(value).collect();
        let mut ptrs = vec![data.as_mut_ptr()];
        let mut block = unsafe { AudioBlock::from_raw(&mut ptrs, frames, 48000, 0) };
        stage.process(&mut block).unwrap();
        data
    }

    #[test]
    fn opens_on_loud_signal_and_closes_on_silence() {
        let mut stage = NoiseGateStage::new(1, 48000, NoiseGateParams::default()).unwrap();
        let loud = run(&mut stage, 4800, |_| 0.5);
        assert!(loud[4799].abs() > 0.4);

        let silence = run(&mut stage, 48000 * 2, |_| 0.0);
        assert!(silence[silence.len() - 1].abs() < 1e-6);
    }

    #[test]
    fn stays_open_during_hold_window() {
        let mut stage = NoiseGateStage::new(
            1,
            48000,
            NoiseGateParams {
                hold_ms: 500.0,
                ..NoiseGateParams::default()
            },
        )
        .unwrap();
        let _ = run(&mut stage, 4800, |_| 0.5);
        // 100ms of silence: well within the 500ms hold window, so the gate
        // must still be fully open (Holding, not yet Closing).
        let _ = run(&mut stage, 4800, |_| 0.0);
        assert!(matches!(stage.channels[0].state, GateState::Holding));
        assert!(stage.channels[0].gain > 0.99);
    }

    #[test]
    fn reset_clears_state_machine() {
        let mut stage = NoiseGateStage::new(1, 48000, NoiseGateParams::default()).unwrap();
        let _ = run(&mut stage, 4800, |_| 0.5);
        stage.reset();
        assert!(matches!(stage.channels[0].state, GateState::Closed));
        assert_eq!(stage.channels[0].gain, 0.0);
    }

    #[test]
    fn close_above_open_threshold_is_rejected() {
        let params = NoiseGateParams {
            open_threshold_db: -40.0,
            close_threshold_db: -30.0,
            ..NoiseGateParams::default()
        };
        assert_eq!(
            NoiseGateStage::new(1, 48000, params).unwrap_err(),
            PipelineError::InvalidParams
        );
    }
}
