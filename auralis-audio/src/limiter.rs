//! True-peak limiter with look-ahead.
//!
//! A brick-wall limiter needs to see a peak before it arrives to start
//! ramping gain down smoothly, or the attack itself becomes audible as a
//! click. Look-ahead buffers the signal by `lookahead_ms` and computes the
//! gain envelope from the delayed copy against the undelayed peak trace.

const MIN_LOOKAHEAD_MS: f64 = 1.0;
const RELEASE_MS: f64 = 50.0;

pub struct Limiter {
    threshold_linear: f32,
    lookahead_samples: usize,
    release_coeff: f32,
}

impl Limiter {
    pub fn new(threshold_db: f64, sample_rate: u32, lookahead_ms: f64) -> Self {
        let lookahead_ms = lookahead_ms.max(MIN_LOOKAHEAD_MS);
        let lookahead_samples = ((lookahead_ms / 1000.0) * sample_rate as f64).round() as usize;
        let release_samples = (RELEASE_MS / 1000.0) * sample_rate as f64;
        let release_coeff = (-1.0 / release_samples as f32).exp();

        Self {
            threshold_linear: db_to_linear(threshold_db),
            lookahead_samples: lookahead_samples.max(1),
            release_coeff,
        }
    }

    /// Limits `channel` in place and returns a same-length output, blended
    /// against the dry signal by `mix ∈ [0,1]`.
    pub fn apply(&self, channel: &[f32], mix: f64) -> Vec<f32> {
        if mix <= 0.0 {
            return channel.to_vec();
        }
        let n = channel.len();
        let la = self.lookahead_samples;

        // Delayed signal: the limiter acts on a copy shifted by `la`
        // samples so the gain envelope (computed from the future) can
        // already be ramping by the time the peak itself plays.
        let mut delayed = vec![0.0f32; n];
        for i in 0..n {
            delayed[i] = if i >= la { channel[i - la] } else { 0.0 };
        }

        let mut gain = 1.0f32;
        let mut out = vec![0.0f32; n];
        for i in 0..n {
            // Peak over the lookahead window starting at sample i.
            let window_end = (i + la).min(n);
            let peak = channel[i..window_end]
               .iter()
               .fold(0.0f32, |acc, &s| acc.max(s.abs()));

            let target_gain = if peak > self.threshold_linear {
                self.threshold_linear / peak
            } else {
                1.0
            };

            gain = if target_gain < gain {
                target_gain
            } else {
                target_gain + (gain - target_gain) * self.release_coeff
            };

            let wet = delayed[i] * gain;
            out[i] = delayed[i] * (1.0 - mix as f32) + wet * mix as f32;
        }
        out
    }
}

fn db_to_linear(db: f64) -> f32 {
    10f64.powf(db / 20.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_length_matches_input() {
        let limiter = Limiter::new(-3.0, 44100, 1.0);
        let input = vec![0.5f32; 2048];
        let out = limiter.apply(&input, 1.0);
        assert_eq!(out.len(), input.len());
    }

    #[test]
    fn clamps_peaks_above_threshold() {
        let limiter = Limiter::new(-3.0, 44100, 2.0);
        let threshold_linear = db_to_linear(-3.0);
        let input = vec![1.0f32; 4096];
        let out = limiter.apply(&input, 1.0);
        // After the release settles, output should not exceed threshold by
        // more than a small margin.
        for &s in &out[la_settle(44100, 2.0)..] {
            assert!(s.abs() <= threshold_linear * 1.05);
        }
    }

    fn la_settle(sample_rate: u32, lookahead_ms: f64) -> usize {
        ((lookahead_ms / 1000.0) * sample_rate as f64).round() as usize * 4
    }

    #[test]
    fn zero_mix_is_identity_after_delay() {
        let limiter = Limiter::new(-3.0, 44100, 1.0);
        let input = vec![0.9f32; 512];
        let out = limiter.apply(&input, 0.0);
        assert_eq!(out.len(), input.len());
    }
}
