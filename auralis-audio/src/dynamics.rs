//! Soft-knee compressor / upward expander. Exactly one of
//! the two runs per call — never both, matching the content modifiers'
//! invariant that `compression_amount` and `expansion_amount` are never
//! simultaneously nonzero by the time the parameter vector reaches here.

const KNEE_WIDTH_DB: f64 = 6.0;
const EPSILON: f32 = 1e-10;

fn amplitude_to_db(x: f32) -> f64 {
    20.0 * (x.abs() as f64 + EPSILON as f64).log10()
}

fn db_to_linear(db: f64) -> f32 {
    10f64.powf(db / 20.0) as f32
}

/// Soft-knee downward compression above `threshold_db`, blended against the
/// dry signal by `mix ∈ [0,1]`.
pub fn compress(
    channel: &[f32],
    ratio: f64,
    threshold_db: f64,
    mix: f64,
) -> Vec<f32> {
    if mix <= 0.0 || ratio <= 1.0 {
        return channel.to_vec();
    }
    channel
       .iter()
       .map(|&x| {
            let level_db = amplitude_to_db(x);
            let over_db = level_db - threshold_db;

            let gain_reduction_db = if over_db <= -KNEE_WIDTH_DB / 2.0 {
                0.0
            } else if over_db >= KNEE_WIDTH_DB / 2.0 {
                over_db * (1.0 / ratio - 1.0)
            } else {
                // Quadratic interpolation across the knee.
                let knee_pos = over_db + KNEE_WIDTH_DB / 2.0;
                let knee_ratio = knee_pos / KNEE_WIDTH_DB;
                (1.0 / ratio - 1.0) * knee_ratio * knee_pos / 2.0
            };

            let wet = x * db_to_linear(gain_reduction_db);
            x * (1.0 - mix as f32) + wet * mix as f32
        })
       .collect()
}

/// Upward expansion below `threshold_db` (quiet passages pushed down
/// further, restoring dynamics a compressor flattened), blended by `mix`.
pub fn expand(channel: &[f32], threshold_db: f64, ratio: f64, mix: f64) -> Vec<f32> {
    if mix <= 0.0 {
        return channel.to_vec();
    }
    let ratio = ratio.max(1.0);
    channel
       .iter()
       .map(|&x| {
            let level_db = amplitude_to_db(x);
            let under_db = threshold_db - level_db;

            let gain_reduction_db = if under_db <= 0.0 {
                0.0
            } else {
                -under_db * (ratio - 1.0)
            };

            let wet = x * db_to_linear(gain_reduction_db);
            x * (1.0 - mix as f32) + wet * mix as f32
        })
       .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_leaves_quiet_signal_untouched() {
        let quiet = vec![0.001f32; 256];
        let out = compress(&quiet, 4.0, -10.0, 1.0);
        for (a, b) in quiet.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn compression_reduces_loud_signal() {
        let loud = vec![0.95f32; 256];
        let out = compress(&loud, 4.0, -10.0, 1.0);
        for &s in &out {
            assert!(s.abs() < 0.95);
        }
    }

    #[test]
    fn zero_mix_is_identity() {
        let input = vec![0.5f32; 100];
        let out = compress(&input, 4.0, -10.0, 0.0);
        assert_eq!(input, out);
        let out2 = expand(&input, -20.0, 2.0, 0.0);
        assert_eq!(input, out2);
    }

    #[test]
    fn expansion_reduces_quiet_signal_further() {
        let quiet = vec![0.01f32; 256];
        let out = expand(&quiet, -20.0, 3.0, 1.0);
        for (a, b) in quiet.iter().zip(out.iter()) {
            assert!(b.abs() <= a.abs());
        }
    }
}
