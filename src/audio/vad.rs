//! Energy-based voice activity detection.
//!
//! Audio is examined in 30 ms windows (480 samples @ 16 kHz).  A window is
//! *voiced* when its RMS amplitude exceeds the threshold.  The decoder's
//! endpointer uses [`VadDetector::voice_span`] to learn where speech sits
//! inside each frame, and [`VadDetector::trim_silence`] to cut the silent
//! margins off a finished segment before transcription.

/// Analysis window: 30 ms at 16 kHz.
const WINDOW: usize = 480;

#[derive(Debug, Clone)]
pub struct VadDetector {
    rms_threshold: f32,
}

impl VadDetector {
    /// `rms_threshold` is in `[0.0, 1.0]`; `0.01` suits a quiet room, noisy
    /// rooms want `0.02`–`0.05`.
    pub fn new(rms_threshold: f32) -> Self {
        Self { rms_threshold }
    }

    /// Sample range `[start, end)` from the first to the last voiced window,
    /// or `None` for pure silence.
    pub fn voice_span(&self, audio: &[f32]) -> Option<(usize, usize)> {
        let windows: Vec<&[f32]> = audio.chunks(WINDOW).collect();
        let first = windows.iter().position(|w| self.voiced(w))?;
        let last = windows.iter().rposition(|w| self.voiced(w)).unwrap_or(first);

        let start = first * WINDOW;
        let end = ((last + 1) * WINDOW).min(audio.len());
        Some((start, end))
    }

    /// Sub-slice of `audio` with leading and trailing silence removed.
    pub fn trim_silence<'a>(&self, audio: &'a [f32]) -> &'a [f32] {
        match self.voice_span(audio) {
            Some((start, end)) => &audio[start..end],
            None => &audio[0..0],
        }
    }

    fn voiced(&self, window: &[f32]) -> bool {
        if window.is_empty() {
            return false;
        }
        let mean_sq = window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32;
        mean_sq.sqrt() > self.rms_threshold
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(silent_pre: usize, voice: usize, silent_post: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; silent_pre];
        v.extend(vec![0.5_f32; voice]);
        v.extend(vec![0.0_f32; silent_post]);
        v
    }

    #[test]
    fn span_covers_only_the_voiced_windows() {
        let vad = VadDetector::new(0.01);
        assert_eq!(vad.voice_span(&signal(480, 960, 480)), Some((480, 1_440)));
    }

    #[test]
    fn silence_has_no_span() {
        let vad = VadDetector::new(0.01);
        assert_eq!(vad.voice_span(&vec![0.0_f32; 1_440]), None);
        assert_eq!(vad.voice_span(&[]), None);
    }

    #[test]
    fn trim_removes_margins() {
        let vad = VadDetector::new(0.01);
        assert_eq!(vad.trim_silence(&signal(480, 480, 480)).len(), 480);
        assert!(vad.trim_silence(&vec![0.0_f32; 960]).is_empty());
    }

    #[test]
    fn quiet_hum_below_threshold_is_silence() {
        let vad = VadDetector::new(0.05);
        assert_eq!(vad.voice_span(&vec![0.01_f32; 960]), None);
    }
}
