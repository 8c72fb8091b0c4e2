//! 3-band equalizer: cascaded first-order low/high splitters with fixed
//! crossovers at 800 Hz and 5000 Hz.

use super::Stage;
use crate::audio::{db_to_lin, AudioBlock};
use crate::error::PipelineError;
use crate::stage::{StageKind, StageParams};

const LOW_MID_CROSSOVER_HZ: f32 = 800.0;
const MID_HIGH_CROSSOVER_HZ: f32 = 5000.0;

/// Denormal-prevention DC bias, `1 / (2^32 - 1)`. Load-bearing: without it,
/// subnormal floats dominate CPU time on long silence. Do not round this.
const DENORMAL_EPS: f32 = 1.0 / 4_294_967_295.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Equalizer3Params {
    pub low_db: f32,
    pub mid_db: f32,
    pub high_db: f32,
}

impl Default for Equalizer3Params {
    fn default() -> Self {
        Self {
            low_db: 0.0,
            mid_db: 0.0,
            high_db: 0.0,
        }
    }
}

impl Equalizer3Params {
    fn validate(&self) -> Result<(), PipelineError> {
        if !self.low_db.is_finite() || !self.mid_db.is_finite() || !self.high_db.is_finite() {
            return Err(PipelineError::InvalidParams);
        }
        Ok(())
    }
}

/// Per-channel filter delay state for one band split.
#[derive(Clone, Copy, Default)]
struct ChannelState {
    lf: [f32; 4],
    hf: [f32; 4],
    sd1: f32,
    sd2: f32,
    sd3: f32,
}

pub struct Equalizer3Stage {
    params: Equalizer3Params,
    sample_rate: u32,
    lf_coef: f32,
    hf_coef: f32,
    g_low: f32,
    g_mid: f32,
    g_high: f32,
    channels: Vec<ChannelState>,
}

impl Equalizer3Stage {
    pub fn new(channel_count: usize, sample_rate: u32, params: Equalizer3Params) -> Result<Self, PipelineError> {
        params.validate()?;
        let (lf_coef, hf_coef) = Self::compute_coefs(sample_rate);
        Ok(Self {
            g_low: db_to_lin(params.low_db),
            g_mid: db_to_lin(params.mid_db),
            g_high: db_to_lin(params.high_db),
            params,
            sample_rate,
            lf_coef,
            hf_coef,
            channels: vec![ChannelState::default(); channel_count],
        })
    }

    fn compute_coefs(sample_rate: u32) -> (f32, f32) {
        let sr = sample_rate as f32;
        (
            2.0 * (std::f32::consts::PI * LOW_MID_CROSSOVER_HZ / sr).sin(),
            2.0 * (std::f32::consts::PI * MID_HIGH_CROSSOVER_HZ / sr).sin(),
        )
    }
}

impl Stage for Equalizer3Stage {
    fn kind(&self) -> StageKind {
        StageKind::Equalizer3
    }

    fn update(&mut self, params: &StageParams) -> Result<(), PipelineError> {
        let StageParams::Equalizer3(p) = params else {
            return Err(PipelineError::InvalidParams);
        };
        p.validate()?;
        self.params = *p;
        self.g_low = db_to_lin(p.low_db);
        self.g_mid = db_to_lin(p.mid_db);
        self.g_high = db_to_lin(p.high_db);
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock) -> Result<(), PipelineError> {
        if self.channels.len() < block.channels() {
            self.channels.resize(block.channels(), ChannelState::default());
        }
        let lf_coef = self.lf_coef;
        let hf_coef = self.hf_coef;
        let (g_low, g_mid, g_high) = (self.g_low, self.g_mid, self.g_high);
        for c in 0..block.channels() {
            let st = &mut self.channels[c];
            for x_ref in block.channel_mut(c) {
                let x = *x_ref;

                st.lf[0] += lf_coef * (x - st.lf[0]) + DENORMAL_EPS;
                st.lf[1] += lf_coef * (st.lf[0] - st.lf[1]);
                st.lf[2] += lf_coef * (st.lf[1] - st.lf[2]);
                st.lf[3] += lf_coef * (st.lf[2] - st.lf[3]);
                let low = st.lf[3];

                st.hf[0] += hf_coef * (x - st.hf[0]) + DENORMAL_EPS;
                st.hf[1] += hf_coef * (st.hf[0] - st.hf[1]);
                st.hf[2] += hf_coef * (st.hf[1] - st.hf[2]);
                st.hf[3] += hf_coef * (st.hf[2] - st.hf[3]);
                let high = st.sd3 - st.hf[3];
                let mid = st.sd3 - (high + low);

                *x_ref = g_low * low + g_mid * mid + g_high * high;

                st.sd3 = st.sd2;
                st.sd2 = st.sd1;
                st.sd1 = x;
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
        if self.sample_rate == 0 {
            0
        } else {
            (3_000_000_000i64) / self.sample_rate as i64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_channel(frames: usize, sample_rate: u32, params: Equalizer3Params) -> Equalizer3Stage {
        Equalizer3Stage::new(1, sample_rate, params).unwrap()
    }

    fn run(stage: &mut Equalizer3Stage, data: &mut [f32]) {
        let mut ptrs = vec![data.as_mut_ptr()];
        let frames = data.len();
        let mut block = unsafe { AudioBlock::from_raw(&mut ptrs, frames, 48000, 0) };
        stage.process(&mut block).unwrap();
    }

    #[test]
    fn dc_converges_at_unity_gain() {
        let mut stage = one_channel(1024, 48000, Equalizer3Params::default());
        let mut data = vec![0.5f32; 1024];
        run(&mut stage, &mut data);
        assert!((data[1023] - 0.5).abs() < 0.001);
    }

    #[test]
    fn reset_zeroes_state_but_keeps_coefficients() {
        let mut stage = one_channel(256, 48000, Equalizer3Params::default());
        let mut data = vec![0.5f32; 256];
        run(&mut stage, &mut data);
        let coef_before = stage.lf_coef;
        stage.reset();
        assert_eq!(stage.lf_coef, coef_before);
        assert_eq!(stage.channels[0].lf, [0.0; 4]);
        let mut silence = vec![0.0f32; 16];
        run(&mut stage, &mut silence);
        assert!(silence.iter().all(|&s| s.abs() < 1e-9));
    }

    #[test]
    fn tilt_boosts_low_band_relative_to_high() {
        let mut low_tilt = one_channel(
            4800,
            48000,
            Equalizer3Params {
                low_db: 12.0,
                mid_db: 0.0,
                high_db: -12.0,
            },
        );
        let mut flat = one_channel(4800, 48000, Equalizer3Params::default());
        let sample = |i: usize| (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 48000.0).sin() * 0.2;
        let mut tilted_data: Vec<f32> = (0..4800).map(sample).collect();
        let mut flat_data: Vec<f32> = (0..4800).map(sample).collect();
        run(&mut low_tilt, &mut tilted_data);
        run(&mut flat, &mut flat_data);
        let tail = 4700..4800;
        let tilted_peak = tilted_data[tail.clone()]
            .iter()
            .fold(0.0f32, |m, &s| m.max(s.abs()));
        let flat_peak = flat_data[tail].iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        assert!(tilted_peak > flat_peak * 1.5);
    }

    #[test]
    fn non_finite_band_gain_is_rejected() {
        let params = Equalizer3Params {
            low_db: f32::NAN,
            ..Equalizer3Params::default()
        };
        assert_eq!(
            Equalizer3Stage::new(1, 48000, params).unwrap_err(),
            PipelineError::InvalidParams
        );
    }
}
