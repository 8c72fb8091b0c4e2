//! Noise suppression front end: a scalar fallback (`Simple`) and a framed
//! delegate to an external denoiser (`FrameDenoiser`).
//!
//! The external denoiser is treated as a black-box frame processor with a
//! fixed contract (480 samples mono @ 48 kHz, pre-scaled by 2^15). It is
//! represented here as the `FrameDenoiser` trait — the capability boundary —
//! never as a vendored binding. Production deployments plug in a real
//! implementation; this crate ships a deterministic mock for tests.

use super::Stage;
use crate::audio::{db_to_lin, AudioBlock};
use crate::error::PipelineError;
use crate::stage::{StageKind, StageParams};

/// Fixed contract of the external frame denoiser.
pub const FRAME_SIZE: usize = 480;
const FRAME_DENOISER_RATE: u32 = 48_000;
const PCM_SCALE: f32 = 32_768.0; // 2^15

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoiseSuppressMethod {
    Simple,
    FrameDenoiser,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseSuppressParams {
    pub method: NoiseSuppressMethod,
    pub suppress_level_db: f32,
    pub intensity: f32,
}

impl Default for NoiseSuppressParams {
    fn default() -> Self {
        Self {
            method: NoiseSuppressMethod::FrameDenoiser,
            suppress_level_db: -30.0,
            intensity: 1.0,
        }
    }
}

impl NoiseSuppressParams {
    fn validate(&self) -> Result<(), PipelineError> {
        if !self.suppress_level_db.is_finite() || !(-60.0..=0.0).contains(&self.suppress_level_db) {
            return Err(PipelineError::InvalidParams);
        }
        if !self.intensity.is_finite() || !(0.0..=1.0).contains(&self.intensity) {
            return Err(PipelineError::InvalidParams);
        }
        Ok(())
    }
}

/// Capability boundary for an external 10 ms frame denoiser.
///
/// Implementations receive 480 mono samples pre-scaled by 2^15 (matching the
/// PCM convention of the referenced RNN-based library) and must fill the
/// same buffer with the denoised frame in place.
pub trait FrameDenoiser: Send {
    fn process_frame(&mut self, frame: &mut [f32; FRAME_SIZE]);
}

/// Deterministic mock used in tests and as a safe default when no real
/// backend has been wired in: attenuates the frame by a fixed amount rather
/// than performing real spectral denoising.
pub struct MockFrameDenoiser {
    attenuation: f32,
}

impl MockFrameDenoiser {
    pub fn new(attenuation_db: f32) -> Self {
        Self {
            attenuation: db_to_lin(attenuation_db),
        }
    }
}

impl Default for MockFrameDenoiser {
    fn default() -> Self {
        Self::new(-6.0)
    }
}

impl FrameDenoiser for MockFrameDenoiser {
    fn process_frame(&mut self, frame: &mut [f32; FRAME_SIZE]) {
        for s in frame.iter_mut() {
            *s *= self.attenuation;
        }
    }
}

pub struct NoiseSuppressStage {
    params: NoiseSuppressParams,
    sample_rate: u32,
    simple_gain: f32,
    denoiser: Box<dyn FrameDenoiser>,
    /// Accumulates incoming samples until a full 480-sample frame is ready.
    ring: Vec<f32>,
    ring_len: usize,
    /// Denoised samples ready to be drained back into the output stream.
    out_queue: Vec<f32>,
    out_pos: usize,
    /// Guards the one-time pass-through diagnostic.
    warned_unsupported_rate: bool,
}

impl NoiseSuppressStage {
    pub fn new(sample_rate: u32, params: NoiseSuppressParams) -> Result<Self, PipelineError> {
        params.validate()?;
        if params.method == NoiseSuppressMethod::FrameDenoiser && !cfg!(feature = "frame_denoiser") {
            return Err(PipelineError::LibraryNotAvailable);
        }
        Ok(Self {
            simple_gain: db_to_lin(params.suppress_level_db),
            params,
            sample_rate,
            denoiser: Box::new(MockFrameDenoiser::default()),
            ring: vec![0.0; FRAME_SIZE],
            ring_len: 0,
            out_queue: vec![0.0; FRAME_SIZE],
            out_pos: FRAME_SIZE,
            warned_unsupported_rate: false,
        })
    }

    /// Swap in a real denoiser backend. Exposed for hosts that bind an
    /// actual external library behind the `FrameDenoiser` trait.
    pub fn set_denoiser(&mut self, denoiser: Box<dyn FrameDenoiser>) {
        self.denoiser = denoiser;
    }

    fn process_channel0_frame_denoiser(&mut self, buf: &mut [f32]) {
        if self.sample_rate != FRAME_DENOISER_RATE {
            if !self.warned_unsupported_rate {
                log::warn!(
                    "noise_suppress: FrameDenoiser requires {} Hz, pipeline is {} Hz; passing through",
                    FRAME_DENOISER_RATE,
                    self.sample_rate
                );
                self.warned_unsupported_rate = true;
            }
            return;
        }

        for sample in buf.iter_mut() {
            if self.out_pos < FRAME_SIZE {
                *sample = self.out_queue[self.out_pos] / PCM_SCALE;
                self.out_pos += 1;
                continue;
            }

            self.ring[self.ring_len] = *sample * PCM_SCALE;
            self.ring_len += 1;
            *sample = 0.0;

            if self.ring_len == FRAME_SIZE {
                let mut frame = [0.0f32; FRAME_SIZE];
                frame.copy_from_slice(&self.ring);
                self.denoiser.process_frame(&mut frame);
                self.out_queue.copy_from_slice(&frame);
                self.out_pos = 0;
                self.ring_len = 0;
            }
        }
    }
}

impl Stage for NoiseSuppressStage {
    fn kind(&self) -> StageKind {
        StageKind::NoiseSuppress
    }

    fn update(&mut self, params: &StageParams) -> Result<(), PipelineError> {
        let StageParams::NoiseSuppress(p) = params else {
            return Err(PipelineError::InvalidParams);
        };
        p.validate()?;
        if p.method == NoiseSuppressMethod::FrameDenoiser && !cfg!(feature = "frame_denoiser") {
            return Err(PipelineError::LibraryNotAvailable);
        }
        self.params = *p;
        self.simple_gain = db_to_lin(p.suppress_level_db);
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock) -> Result<(), PipelineError> {
        if block.channels() == 0 {
            return Ok(());
        }
        match self.params.method {
            NoiseSuppressMethod::Simple => {
                let gain = self.simple_gain;
                for s in block.channel_mut(0) {
                    *s *= gain;
                }
            }
            NoiseSuppressMethod::FrameDenoiser => {
                let mut ch0 = vec![0.0f32; block.frames()];
                ch0.copy_from_slice(block.channel(0));
                self.process_channel0_frame_denoiser(&mut ch0);
                block.channel_mut(0).copy_from_slice(&ch0);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.ring.iter_mut().for_each(|s| *s = 0.0);
        self.ring_len = 0;
        self.out_queue.iter_mut().for_each(|s| *s = 0.0);
        self.out_pos = FRAME_SIZE;
    }

    fn latency_ns(&self) -> i64 {
        match self.params.method {
            NoiseSuppressMethod::Simple => 0,
            NoiseSuppressMethod::FrameDenoiser => {
                if self.sample_rate == 0 {
                    0
                } else {
                    (FRAME_SIZE as i64 * 1_000_000_000) / self.sample_rate as i64
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stage: &mut NoiseSuppressStage, channels: usize, frames: usize, value: impl Fn(usize) -> f32) -> Vec<Vec<f32>> {
        let mut data: Vec<Vec<f32>> = (0..channels).map(|_| (0..frames).map(&value).collect()).collect();
        let mut ptrs: Vec<*mut f32> = data.iter_mut().map(|v| v.as_mut_ptr()).collect();
        let mut block = unsafe { AudioBlock::from_raw(&mut ptrs, frames, 48000, 0) };
        stage.process(&mut block).unwrap();
        data
    }

    #[test]
    fn simple_method_attenuates_channel0_only() {
        let mut stage = NoiseSuppressStage::new(
            48000,
            NoiseSuppressParams {
                method: NoiseSuppressMethod::Simple,
                suppress_level_db: -20.0,
                intensity: 1.0,
            },
        )
        .unwrap();
        let out = run(&mut stage, 2, 8, |_| 1.0);
        let expected = db_to_lin(-20.0);
        assert!((out[0][0] - expected).abs() < 1e-6);
        assert_eq!(out[1][0], 1.0);
    }

    #[test]
    fn frame_denoiser_drains_after_one_full_frame() {
        let mut stage = NoiseSuppressStage::new(
            48000,
            NoiseSuppressParams {
                method: NoiseSuppressMethod::FrameDenoiser,
                suppress_level_db: -30.0,
                intensity: 1.0,
            },
        )
        .unwrap();
        // First frame: all silence fed in, nothing useful drains out yet
        // (ring buffer fills, no prior output queued).
        let out1 = run(&mut stage, 1, FRAME_SIZE, |_| 0.1);
        assert!(out1[0].iter().all(|&s| s == 0.0));
        // Second frame: previous frame's denoised output drains.
        let out2 = run(&mut stage, 1, FRAME_SIZE, |_| 0.0);
        assert!(out2[0].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn non_48k_rate_passes_through_and_warns_once() {
        let mut stage = NoiseSuppressStage::new(
            44100,
            NoiseSuppressParams {
                method: NoiseSuppressMethod::FrameDenoiser,
                suppress_level_db: -30.0,
                intensity: 1.0,
            },
        )
        .unwrap();
        let out = run(&mut stage, 1, 256, |i| (i as f32) / 256.0);
        let input: Vec<f32> = (0..256).map(|i| (i as f32) / 256.0).collect();
        assert_eq!(out[0], input);
        assert!(stage.warned_unsupported_rate);
    }

    #[test]
    fn reset_clears_ring_and_drops_partial_output() {
        let mut stage = NoiseSuppressStage::new(
            48000,
            NoiseSuppressParams {
                method: NoiseSuppressMethod::FrameDenoiser,
                suppress_level_db: -30.0,
                intensity: 1.0,
            },
        )
        .unwrap();
        let _ = run(&mut stage, 1, 100, |_| 0.2);
        stage.reset();
        assert_eq!(stage.ring_len, 0);
        assert_eq!(stage.out_pos, FRAME_SIZE);
    }

    #[test]
    fn out_of_range_suppress_level_is_rejected() {
        let params = NoiseSuppressParams {
            method: NoiseSuppressMethod::Simple,
            suppress_level_db: -90.0,
            intensity: 1.0,
        };
        assert_eq!(
            NoiseSuppressStage::new(48000, params).unwrap_err(),
            PipelineError::InvalidParams
        );
    }

    #[test]
    fn out_of_range_intensity_is_rejected() {
        let params = NoiseSuppressParams {
            method: NoiseSuppressMethod::Simple,
            suppress_level_db: -20.0,
            intensity: 1.5,
        };
        assert_eq!(
            NoiseSuppressStage::new(48000, params).unwrap_err(),
            PipelineError::InvalidParams
        );
    }
}
