//! C-ABI facade: a fixed set of `extern "C"` entry points over an opaque
//! handle, following the same shape as a typical BASS-style processor
//! wrapper (typed config structs in, status code out) but without any
//! Windows/BASS coupling — there is no `extern "system"` requirement here,
//! so every entry point uses the portable C ABI.

use std::ffi::c_void;
use std::os::raw::c_char;
use std::ptr;

use crate::audio::AudioBlock;
use crate::chain::ChainManager;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::stage::expander::{Detector, ExpanderParams, ExpanderPreset};
use crate::stage::noise_suppress::{NoiseSuppressMethod, NoiseSuppressParams};
use crate::stage::{StageKind, StageParams};

pub const STATUS_SUCCESS: i32 = 0;
pub const STATUS_INVALID_PARAMS: i32 = 1;
pub const STATUS_OUT_OF_MEMORY: i32 = 2;
pub const STATUS_FILTER_NOT_FOUND: i32 = 3;
pub const STATUS_UNSUPPORTED_FORMAT: i32 = 4;
pub const STATUS_INITIALIZATION_FAILED: i32 = 5;
pub const STATUS_INVALID_FILTER_TYPE: i32 = 6;
pub const STATUS_LIBRARY_NOT_AVAILABLE: i32 = 7;

fn status_code(err: PipelineError) -> i32 {
    match err {
        PipelineError::InvalidParams => STATUS_INVALID_PARAMS,
        PipelineError::OutOfMemory => STATUS_OUT_OF_MEMORY,
        PipelineError::FilterNotFound => STATUS_FILTER_NOT_FOUND,
        PipelineError::UnsupportedFormat => STATUS_UNSUPPORTED_FORMAT,
        PipelineError::InitializationFailed => STATUS_INITIALIZATION_FAILED,
        PipelineError::InvalidFilterType => STATUS_INVALID_FILTER_TYPE,
        PipelineError::LibraryNotAvailable => STATUS_LIBRARY_NOT_AVAILABLE,
    }
}

fn to_status(result: Result<(), PipelineError>) -> i32 {
    match result {
        Ok(()) => STATUS_SUCCESS,
        Err(e) => status_code(e),
    }
}

/// Stage kind codes, matching `StageKind::ALL`'s enumeration order.
pub const KIND_GAIN: u32 = 0;
pub const KIND_NOISE_SUPPRESS: u32 = 1;
pub const KIND_NOISE_GATE: u32 = 2;
pub const KIND_COMPRESSOR: u32 = 3;
pub const KIND_LIMITER: u32 = 4;
pub const KIND_EXPANDER: u32 = 5;
pub const KIND_UPWARD_COMPRESSOR: u32 = 6;
pub const KIND_EQUALIZER3: u32 = 7;
pub const KIND_INVERT_POLARITY: u32 = 8;

fn kind_from_code(code: u32) -> Option<StageKind> {
    match code {
        KIND_GAIN => Some(StageKind::Gain),
        KIND_NOISE_SUPPRESS => Some(StageKind::NoiseSuppress),
        KIND_NOISE_GATE => Some(StageKind::NoiseGate),
        KIND_COMPRESSOR => Some(StageKind::Compressor),
        KIND_LIMITER => Some(StageKind::Limiter),
        KIND_EXPANDER => Some(StageKind::Expander),
        KIND_UPWARD_COMPRESSOR => Some(StageKind::UpwardCompressor),
        KIND_EQUALIZER3 => Some(StageKind::Equalizer3),
        KIND_INVERT_POLARITY => Some(StageKind::InvertPolarity),
        _ => None,
    }
}

fn kind_to_code(kind: StageKind) -> u32 {
    match kind {
        StageKind::Gain => KIND_GAIN,
        StageKind::NoiseSuppress => KIND_NOISE_SUPPRESS,
        StageKind::NoiseGate => KIND_NOISE_GATE,
        StageKind::Compressor => KIND_COMPRESSOR,
        StageKind::Limiter => KIND_LIMITER,
        StageKind::Expander => KIND_EXPANDER,
        StageKind::UpwardCompressor => KIND_UPWARD_COMPRESSOR,
        StageKind::Equalizer3 => KIND_EQUALIZER3,
        StageKind::InvertPolarity => KIND_INVERT_POLARITY,
    }
}

/// Per-kind parameter payloads, laid out for C interop. Only the field set
/// matching `FfiStageParams::kind` is read.
#[repr(C)]
#[derive(Clone, Copy)]
pub union FfiParamsPayload {
    pub gain: FfiGainParams,
    pub noise_suppress: FfiNoiseSuppressParams,
    pub noise_gate: FfiNoiseGateParams,
    pub compressor: FfiCompressorParams,
    pub limiter: FfiLimiterParams,
    pub expander: FfiExpanderParams,
    pub upward_compressor: FfiUpwardCompressorParams,
    pub equalizer3: FfiEqualizer3Params,
    pub invert_polarity: FfiInvertPolarityParams,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiStageParams {
    pub kind: u32,
    pub payload: FfiParamsPayload,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct FfiGainParams {
    pub gain_db: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct FfiNoiseSuppressParams {
    /// 0 = Simple, 1 = FrameDenoiser.
    pub method: u32,
    pub suppress_level_db: f32,
    pub intensity: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct FfiNoiseGateParams {
    pub open_threshold_db: f32,
    pub close_threshold_db: f32,
    pub attack_ms: f32,
    pub hold_ms: f32,
    pub release_ms: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct FfiCompressorParams {
    pub ratio: f32,
    pub threshold_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub output_gain_db: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct FfiLimiterParams {
    pub threshold_db: f32,
    pub release_ms: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct FfiExpanderParams {
    pub ratio: f32,
    pub threshold_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub output_gain_db: f32,
    pub knee_width: f32,
    /// 0 = Rms, 1 = Peak.
    pub detector: u32,
    /// 0 = Expander, 1 = Gate.
    pub preset: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct FfiUpwardCompressorParams {
    pub ratio: f32,
    pub threshold_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub output_gain_db: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct FfiEqualizer3Params {
    pub low_db: f32,
    pub mid_db: f32,
    pub high_db: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct FfiInvertPolarityParams {
    /// BOOL: nonzero = enabled.
    pub enabled: i32,
}

/// Converts a tagged FFI payload into the internal `StageParams`. Returns
/// `None` for an unrecognized kind code.
///
/// # Safety
/// The union field read is selected by `ffi.kind`; the caller must have
/// populated the matching field.
unsafe fn from_ffi(ffi: &FfiStageParams) -> Option<StageParams> {
    let kind = kind_from_code(ffi.kind)?;
    Some(match kind {
        StageKind::Gain => StageParams::Gain(crate::stage::gain::GainParams {
            gain_db: ffi.payload.gain.gain_db,
        }),
        StageKind::NoiseSuppress => {
            let p = ffi.payload.noise_suppress;
            StageParams::NoiseSuppress(NoiseSuppressParams {
                method: if p.method == 0 {
                    NoiseSuppressMethod::Simple
                } else {
                    NoiseSuppressMethod::FrameDenoiser
                },
                suppress_level_db: p.suppress_level_db,
                intensity: p.intensity,
            })
        }
        StageKind::NoiseGate => {
            let p = ffi.payload.noise_gate;
            StageParams::NoiseGate(crate::stage::noise_gate::NoiseGateParams {
                open_threshold_db: p.open_threshold_db,
                close_threshold_db: p.close_threshold_db,
                attack_ms: p.attack_ms,
                hold_ms: p.hold_ms,
                release_ms: p.release_ms,
            })
        }
        StageKind::Compressor => {
            let p = ffi.payload.compressor;
            StageParams::Compressor(crate::stage::compressor::CompressorParams {
                ratio: p.ratio,
                threshold_db: p.threshold_db,
                attack_ms: p.attack_ms,
                release_ms: p.release_ms,
                output_gain_db: p.output_gain_db,
            })
        }
        StageKind::Limiter => {
            let p = ffi.payload.limiter;
            StageParams::Limiter(crate::stage::limiter::LimiterParams {
                threshold_db: p.threshold_db,
                release_ms: p.release_ms,
            })
        }
        StageKind::Expander => {
            let p = ffi.payload.expander;
            StageParams::Expander(ExpanderParams {
                ratio: p.ratio,
                threshold_db: p.threshold_db,
                attack_ms: p.attack_ms,
                release_ms: p.release_ms,
                output_gain_db: p.output_gain_db,
                knee_width: p.knee_width,
                detector: if p.detector == 0 { Detector::Rms } else { Detector::Peak },
                preset: if p.preset == 0 {
                    ExpanderPreset::Expander
                } else {
                    ExpanderPreset::Gate
                },
            })
        }
        StageKind::UpwardCompressor => {
            let p = ffi.payload.upward_compressor;
            StageParams::UpwardCompressor(crate::stage::upward_compressor::UpwardCompressorParams {
                ratio: p.ratio,
                threshold_db: p.threshold_db,
                attack_ms: p.attack_ms,
                release_ms: p.release_ms,
                output_gain_db: p.output_gain_db,
            })
        }
        StageKind::Equalizer3 => {
            let p = ffi.payload.equalizer3;
            StageParams::Equalizer3(crate::stage::equalizer3::Equalizer3Params {
                low_db: p.low_db,
                mid_db: p.mid_db,
                high_db: p.high_db,
            })
        }
        StageKind::InvertPolarity => {
            let p = ffi.payload.invert_polarity;
            StageParams::InvertPolarity(crate::stage::invert_polarity::InvertPolarityParams {
                enabled: p.enabled != 0,
            })
        }
    })
}

fn to_ffi(params: &StageParams) -> FfiStageParams {
    let kind = kind_to_code(params.kind());
    let payload = match params {
        StageParams::Gain(p) => FfiParamsPayload {
            gain: FfiGainParams { gain_db: p.gain_db },
        },
        StageParams::NoiseSuppress(p) => FfiParamsPayload {
            noise_suppress: FfiNoiseSuppressParams {
                method: if p.method == NoiseSuppressMethod::Simple { 0 } else { 1 },
                suppress_level_db: p.suppress_level_db,
                intensity: p.intensity,
            },
        },
        StageParams::NoiseGate(p) => FfiParamsPayload {
            noise_gate: FfiNoiseGateParams {
                open_threshold_db: p.open_threshold_db,
                close_threshold_db: p.close_threshold_db,
                attack_ms: p.attack_ms,
                hold_ms: p.hold_ms,
                release_ms: p.release_ms,
            },
        },
        StageParams::Compressor(p) => FfiParamsPayload {
            compressor: FfiCompressorParams {
                ratio: p.ratio,
                threshold_db: p.threshold_db,
                attack_ms: p.attack_ms,
                release_ms: p.release_ms,
                output_gain_db: p.output_gain_db,
            },
        },
        StageParams::Limiter(p) => FfiParamsPayload {
            limiter: FfiLimiterParams {
                threshold_db: p.threshold_db,
                release_ms: p.release_ms,
            },
        },
        StageParams::Expander(p) => FfiParamsPayload {
            expander: FfiExpanderParams {
                ratio: p.ratio,
                threshold_db: p.threshold_db,
                attack_ms: p.attack_ms,
                release_ms: p.release_ms,
                output_gain_db: p.output_gain_db,
                knee_width: p.knee_width,
                detector: if p.detector == Detector::Rms { 0 } else { 1 },
                preset: if p.preset == ExpanderPreset::Expander { 0 } else { 1 },
            },
        },
        StageParams::UpwardCompressor(p) => FfiParamsPayload {
            upward_compressor: FfiUpwardCompressorParams {
                ratio: p.ratio,
                threshold_db: p.threshold_db,
                attack_ms: p.attack_ms,
                release_ms: p.release_ms,
                output_gain_db: p.output_gain_db,
            },
        },
        StageParams::Equalizer3(p) => FfiParamsPayload {
            equalizer3: FfiEqualizer3Params {
                low_db: p.low_db,
                mid_db: p.mid_db,
                high_db: p.high_db,
            },
        },
        StageParams::InvertPolarity(p) => FfiParamsPayload {
            invert_polarity: FfiInvertPolarityParams {
                enabled: p.enabled as i32,
            },
        },
    };
    FfiStageParams { kind, payload }
}

/// Create a new chain manager for `config`. Returns null if `config` is null
/// or fails `PipelineConfig::is_valid`.
#[no_mangle]
pub unsafe extern "C" fn mic_dsp_create(config: *const PipelineConfig) -> *mut c_void {
    if config.is_null() {
        return ptr::null_mut();
    }
    let cfg = *config;
    if !cfg.is_valid() {
        return ptr::null_mut();
    }
    let chain = Box::new(ChainManager::new(cfg));
    Box::into_raw(chain) as *mut c_void
}

/// Destroy a handle created by `mic_dsp_create`. A null handle is a no-op.
#[no_mangle]
pub unsafe extern "C" fn mic_dsp_destroy(handle: *mut c_void) {
    if handle.is_null() {
        return;
    }
    drop(Box::from_raw(handle as *mut ChainManager));
}

/// Process one block in place. `channel_ptrs` must point to exactly
/// `config.channels` non-null, non-aliasing `f32` buffers, each readable and
/// writable for `frames` samples.
#[no_mangle]
pub unsafe extern "C" fn mic_dsp_process(
    handle: *mut c_void,
    channel_ptrs: *mut *mut f32,
    channel_count: usize,
    frames: usize,
    timestamp_ns: i64,
) -> i32 {
    if handle.is_null() || channel_ptrs.is_null() {
        return STATUS_INVALID_PARAMS;
    }
    let chain = &mut *(handle as *mut ChainManager);
    let ptrs_slice = std::slice::from_raw_parts_mut(channel_ptrs, channel_count);
    let sample_rate = chain.config().sample_rate;
    let mut block = AudioBlock::from_raw(ptrs_slice, frames, sample_rate, timestamp_ns);
    to_status(chain.process(&mut block))
}

/// Create-or-update the stage occupying `slot_id`.
#[no_mangle]
pub unsafe extern "C" fn mic_dsp_update_filter(
    handle: *mut c_void,
    slot_id: usize,
    params: *const FfiStageParams,
    enabled: i32,
) -> i32 {
    if handle.is_null() || params.is_null() {
        return STATUS_INVALID_PARAMS;
    }
    let chain = &mut *(handle as *mut ChainManager);
    let Some(stage_params) = from_ffi(&*params) else {
        return STATUS_INVALID_FILTER_TYPE;
    };
    to_status(chain.update_slot(slot_id, &stage_params, enabled != 0))
}

/// Destroy the stage occupying `slot_id`, clearing it.
#[no_mangle]
pub unsafe extern "C" fn mic_dsp_remove_filter(handle: *mut c_void, slot_id: usize) -> i32 {
    if handle.is_null() {
        return STATUS_INVALID_PARAMS;
    }
    let chain = &mut *(handle as *mut ChainManager);
    to_status(chain.remove_slot(slot_id))
}

/// Sum of the reported latency (ns) across enabled, occupied slots. Returns
/// 0 for a null handle.
#[no_mangle]
pub unsafe extern "C" fn mic_dsp_get_latency_ns(handle: *mut c_void) -> i64 {
    if handle.is_null() {
        return 0;
    }
    let chain = &*(handle as *const ChainManager);
    chain.latency_ns()
}

/// Reset every occupied stage's DSP state without touching params.
#[no_mangle]
pub unsafe extern "C" fn mic_dsp_reset(handle: *mut c_void) -> i32 {
    if handle.is_null() {
        return STATUS_INVALID_PARAMS;
    }
    let chain = &mut *(handle as *mut ChainManager);
    chain.reset();
    STATUS_SUCCESS
}

/// Fill `out_config` with the documented default pipeline configuration.
#[no_mangle]
pub unsafe extern "C" fn mic_dsp_get_default_config(out_config: *mut PipelineConfig) -> i32 {
    if out_config.is_null() {
        return STATUS_INVALID_PARAMS;
    }
    *out_config = PipelineConfig::default();
    STATUS_SUCCESS
}

/// Fill `out_params` with the documented default parameters for `kind`.
#[no_mangle]
pub unsafe extern "C" fn mic_dsp_get_default_filter_params(kind: u32, out_params: *mut FfiStageParams) -> i32 {
    if out_params.is_null() {
        return STATUS_INVALID_PARAMS;
    }
    let Some(kind) = kind_from_code(kind) else {
        return STATUS_INVALID_FILTER_TYPE;
    };
    *out_params = to_ffi(&StageParams::default_for(kind));
    STATUS_SUCCESS
}

/// Whether `kind`'s backing capability is compiled in (see the
/// `frame_denoiser` feature).
#[no_mangle]
pub extern "C" fn mic_dsp_is_filter_supported(kind: u32) -> i32 {
    match kind_from_code(kind) {
        Some(kind) => kind.is_supported() as i32,
        None => 0,
    }
}

/// Static, null-terminated display name for `kind`, or null if unrecognized.
#[no_mangle]
pub extern "C" fn mic_dsp_get_filter_name(kind: u32) -> *const c_char {
    static NAMES: [&[u8]; 9] = [
        b"gain\0",
        b"noise_suppress\0",
        b"noise_gate\0",
        b"compressor\0",
        b"limiter\0",
        b"expander\0",
        b"upward_compressor\0",
        b"equalizer3\0",
        b"invert_polarity\0",
    ];
    match kind_from_code(kind) {
        Some(kind) => NAMES[kind_to_code(kind) as usize].as_ptr() as *const c_char,
        None => ptr::null(),
    }
}
