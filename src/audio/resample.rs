//! Sample conversion helpers used by the capture callback and the decoder.
//!
//! Devices rarely offer 16 kHz mono directly, so captured buffers are
//! downmixed with [`stereo_to_mono`], brought to 16 kHz with
//! [`resample_to_16k`] and quantised with [`f32_to_i16`].
//!
//! Every helper writes into a caller-owned buffer, clearing it first.  The
//! capture callback keeps its buffers across calls, so once they have grown
//! to the device's buffer size the conversion runs without allocating.

use super::frame::SAMPLE_RATE;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// `out` receives `samples.len() / channels` samples; an incomplete trailing
/// frame is dropped.  `channels == 0` yields nothing.
///
/// ```rust
/// use obs_voice_control::audio::stereo_to_mono;
///
/// let mut mono = Vec::new();
/// stereo_to_mono(&[0.5_f32, -0.5, 0.2, 0.4], 2, &mut mono); // L R L R
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16, out: &mut Vec<f32>) {
    out.clear();
    match channels {
        0 => {}
        1 => out.extend_from_slice(samples),
        n => {
            let n = n as usize;
            out.extend(
                samples
                    .chunks_exact(n)
                    .map(|frame| frame.iter().sum::<f32>() / n as f32),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// resample_to_16k
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` Hz to 16 000 Hz using linear
/// interpolation.  Already-16 kHz input is copied unchanged.
///
/// ```rust
/// use obs_voice_control::audio::resample_to_16k;
///
/// let mut out = Vec::new();
/// resample_to_16k(&[0.5_f32; 480], 48_000, &mut out); // 10 ms @ 48 kHz
/// assert_eq!(out.len(), 160);
/// ```
pub fn resample_to_16k(samples: &[f32], source_rate: u32, out: &mut Vec<f32>) {
    out.clear();
    if source_rate == SAMPLE_RATE || source_rate == 0 {
        out.extend_from_slice(samples);
        return;
    }
    if samples.is_empty() {
        return;
    }

    let ratio = SAMPLE_RATE as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;

    out.extend((0..output_len).map(|i| {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;
        match (samples.get(idx), samples.get(idx + 1)) {
            (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
            (Some(a), None) => *a,
            _ => 0.0,
        }
    }));
}

// ---------------------------------------------------------------------------
// i16 <-> f32
// ---------------------------------------------------------------------------

/// Quantise `[-1.0, 1.0]` samples to `i16`, clamping out-of-range input.
pub fn f32_to_i16(samples: &[f32], out: &mut Vec<i16>) {
    out.clear();
    out.extend(
        samples
            .iter()
            .map(|s| (s * 32_768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16),
    );
}

/// Scale `i16` samples to `[-1.0, 1.0)`.
pub fn i16_to_f32(samples: &[i16], out: &mut Vec<f32>) {
    out.clear();
    out.extend(samples.iter().map(|&s| s as f32 / 32_768.0));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(samples: &[f32], channels: u16) -> Vec<f32> {
        let mut out = Vec::new();
        stereo_to_mono(samples, channels, &mut out);
        out
    }

    fn resampled(samples: &[f32], rate: u32) -> Vec<f32> {
        let mut out = Vec::new();
        resample_to_16k(samples, rate, &mut out);
        out
    }

    #[test]
    fn mono_input_is_copied() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(mono(&input, 1), input);
    }

    #[test]
    fn two_channels_are_averaged() {
        let out = mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_channels_yield_nothing() {
        assert!(mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn output_buffer_is_cleared_and_reused() {
        let mut out = vec![9.0_f32; 64];
        stereo_to_mono(&[0.25_f32, 0.25], 2, &mut out);
        assert_eq!(out, vec![0.25]);
        assert!(out.capacity() >= 64);
    }

    #[test]
    fn resample_16k_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(resampled(&input, 16_000), input);
    }

    #[test]
    fn resample_48k_thirds_the_length() {
        assert_eq!(resampled(&[0.5_f32; 480], 48_000).len(), 160);
    }

    #[test]
    fn resample_44100_is_close_to_one_second() {
        let out = resampled(&vec![0.0_f32; 44_100], 44_100);
        assert!(out.len().abs_diff(16_000) <= 1, "got {}", out.len());
    }

    #[test]
    fn resample_keeps_dc_level() {
        for s in resampled(&[0.25_f32; 441], 44_100) {
            assert!((s - 0.25).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    #[test]
    fn quantisation_clamps_and_round_trips_scale() {
        let mut q = Vec::new();
        f32_to_i16(&[0.0, 0.5, 2.0, -2.0], &mut q);
        assert_eq!(q, vec![0, 16_384, i16::MAX, i16::MIN]);

        let mut back = Vec::new();
        i16_to_f32(&[16_384, i16::MIN], &mut back);
        assert!((back[0] - 0.5).abs() < 1e-6);
        assert!((back[1] + 1.0).abs() < 1e-6);
    }
}
