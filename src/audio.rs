//! Audio format primitives: dB/linear conversion, block validation, level metering.
//!
//! A block is always a reference into host-owned memory: the pipeline never
//! allocates or retains channel data across `process` calls.

use crate::error::PipelineError;

/// Floor added before `log10` so that silence maps to a large negative
/// number instead of `-inf`.
const LOG_EPS: f32 = 1e-20;

/// Convert decibels to a linear amplitude multiplier.
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Convert a linear amplitude to decibels, clamped away from `-inf`.
#[inline]
pub fn lin_to_db(x: f32) -> f32 {
    20.0 * x.max(LOG_EPS).log10()
}

/// Peak (max absolute sample) of a buffer.
pub fn peak_level(buf: &[f32]) -> f32 {
    buf.iter().fold(0.0f32, |m, &s| m.max(s.abs()))
}

/// RMS level of a buffer. Returns 0.0 for an empty buffer.
pub fn rms_level(buf: &[f32]) -> f32 {
    if buf.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = buf.iter().map(|&s| s * s).sum();
    (sum_sq / buf.len() as f32).sqrt()
}

/// A planar float audio block borrowed from the host for the duration of one
/// `process` call. Holds raw channel pointers, not owned slices, so that
/// constructing one never allocates.
///
/// # Safety
/// `ptrs` must contain exactly `channels` valid, non-null, non-aliasing
/// pointers, each readable/writable for `frames` contiguous `f32` values,
/// for the lifetime `'a`.
pub struct AudioBlock<'a> {
    ptrs: &'a mut [*mut f32],
    frames: usize,
    channels: usize,
    sample_rate: u32,
    timestamp_ns: i64,
}

impl<'a> AudioBlock<'a> {
    /// Build a block from raw per-channel pointers.
    ///
    /// # Safety
    /// See the struct-level safety section.
    pub unsafe fn from_raw(
        ptrs: &'a mut [*mut f32],
        frames: usize,
        sample_rate: u32,
        timestamp_ns: i64,
    ) -> Self {
        let channels = ptrs.len();
        Self {
            ptrs,
            frames,
            channels,
            sample_rate,
            timestamp_ns,
        }
    }

    /// Build a block from a caller-owned pointer scratch array and a set of
    /// channel slices. `ptr_scratch` must have exactly `slices.len()`
    /// elements; it is filled in and then borrowed for the block's lifetime,
    /// so no allocation happens here (the caller typically supplies a small
    /// stack array, since `channels` is bounded to 8).
    pub fn from_slices(
        ptr_scratch: &'a mut [*mut f32],
        slices: &mut [&'a mut [f32]],
        sample_rate: u32,
        timestamp_ns: i64,
    ) -> Self {
        assert_eq!(ptr_scratch.len(), slices.len());
        let channels = slices.len();
        let frames = slices.first().map(|s| s.len()).unwrap_or(0);
        for (slot, s) in ptr_scratch.iter_mut().zip(slices.iter_mut()) {
            *slot = s.as_mut_ptr();
        }
        Self {
            ptrs: ptr_scratch,
            frames,
            channels,
            sample_rate,
            timestamp_ns,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    /// Borrow channel `c` as a mutable sample slice.
    #[inline]
    pub fn channel_mut(&mut self, c: usize) -> &mut [f32] {
        debug_assert!(c < self.channels);
        // SAFETY: invariant established at construction (`from_raw`/`from_slices`).
        unsafe { std::slice::from_raw_parts_mut(self.ptrs[c], self.frames) }
    }

    /// Borrow channel `c` as an immutable sample slice.
    #[inline]
    pub fn channel(&self, c: usize) -> &[f32] {
        debug_assert!(c < self.channels);
        // SAFETY: invariant established at construction (`from_raw`/`from_slices`).
        unsafe { std::slice::from_raw_parts(self.ptrs[c], self.frames) }
    }
}

/// Validate a block against the pipeline's fixed format.
///
/// Rejects zero channels, zero frames, a null channel pointer, or a mismatch
/// against `expected_channels`/`expected_rate` (when those are nonzero).
pub fn validate(
    block: &AudioBlock,
    expected_channels: u32,
    expected_rate: u32,
) -> Result<(), PipelineError> {
    if block.channels == 0 || block.frames == 0 {
        return Err(PipelineError::InvalidParams);
    }
    for &p in block.ptrs.iter() {
        if p.is_null() {
            return Err(PipelineError::InvalidParams);
        }
    }
    if expected_channels != 0 && block.channels as u32 != expected_channels {
        return Err(PipelineError::UnsupportedFormat);
    }
    if expected_rate != 0 && block.sample_rate != expected_rate {
        return Err(PipelineError::UnsupportedFormat);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_round_trip() {
        assert!((db_to_lin(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_lin(6.0) - 1.995_262_3).abs() < 1e-5);
        assert!((lin_to_db(1.0) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn lin_to_db_never_infinite() {
        assert!(lin_to_db(0.0).is_finite());
        assert!(lin_to_db(0.0) < -300.0);
    }

    #[test]
    fn peak_and_rms() {
        let buf = [0.5f32, -1.0, 0.25, -0.25];
        assert_eq!(peak_level(&buf), 1.0);
        let expected_rms = ((0.25 + 1.0 + 0.0625 + 0.0625) / 4.0f32).sqrt();
        assert!((rms_level(&buf) - expected_rms).abs() < 1e-6);
    }

    #[test]
    fn validate_rejects_mismatched_format() {
        let mut l = vec![0.0f32; 4];
        let mut r = vec![0.0f32; 4];
        let mut slices: [&mut [f32]; 2] = [&mut l, &mut r];
        let mut ptrs = [std::ptr::null_mut(); 2];
        let block = AudioBlock::from_slices(&mut ptrs, &mut slices, 48000, 0);
        assert!(validate(&block, 2, 48000).is_ok());
        assert!(validate(&block, 1, 48000).is_err());
        assert!(validate(&block, 2, 44100).is_err());
    }

    #[test]
    fn validate_rejects_empty_frames() {
        let mut slices: [&mut [f32]; 0] = [];
        let mut ptrs: [*mut f32; 0] = [];
        let block = AudioBlock::from_slices(&mut ptrs, &mut slices, 48000, 0);
        assert!(validate(&block, 0, 0).is_err());
    }
}
