//! Inter-chunk level smoother (C4). Per streaming session —
//! never shared across sessions, never reused across tracks without
//! [`LevelSmoother::reset`].

const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Default)]
pub struct LevelSmoother {
    max_level_change_db: f64,
    rms_history: Vec<f64>,
    gain_history: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct SmoothStats {
    pub mean_rms: Option<f64>,
    pub min_rms: Option<f64>,
    pub max_rms: Option<f64>,
    pub total_adjustments: usize,
    pub total_chunks: usize,
    pub max_gain_adjustment: f64,
}

impl LevelSmoother {
    pub fn new(max_level_change_db: f64) -> Self {
        Self {
            max_level_change_db,
            rms_history: Vec::new(),
            gain_history: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.rms_history.clear();
        self.gain_history.clear();
    }

    fn calculate_rms_db(chunk: &[f32]) -> f64 {
        if chunk.is_empty() {
            return f64::NEG_INFINITY;
        }
        let sum_sq: f64 = chunk.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (sum_sq / chunk.len() as f64).sqrt();
        20.0 * (rms + EPSILON).log10()
    }

    /// Smooths `chunk` (the core region only) against the session's RMS
    /// history. Never reorders, drops or extends: always returns a
    /// same-length buffer. `chunk_index` is the session-relative index of
    /// the chunk being emitted (not the global `k`, though in practice they
    /// coincide for a session started at `k=0`).
    pub fn smooth(&mut self, chunk: &[f32], chunk_index: usize) -> (Vec<f32>, f64, bool) {
        let current_rms = Self::calculate_rms_db(chunk);

        if chunk_index == 0 || self.rms_history.is_empty() {
            self.rms_history.push(current_rms);
            self.gain_history.push(0.0);
            return (chunk.to_vec(), 0.0, false);
        }

        let previous_rms = *self.rms_history.last().unwrap();
        let level_diff_db = current_rms - previous_rms;

        if level_diff_db.abs() <= self.max_level_change_db {
            self.rms_history.push(current_rms);
            self.gain_history.push(0.0);
            return (chunk.to_vec(), 0.0, false);
        }

        let target_diff = if level_diff_db > 0.0 {
            self.max_level_change_db
        } else {
            -self.max_level_change_db
        };
        let required_adjustment_db = target_diff - level_diff_db;
        let gain_linear = 10f64.powf(required_adjustment_db / 20.0) as f32;

        let adjusted: Vec<f32> = chunk.iter().map(|&s| s * gain_linear).collect();
        let adjusted_rms = Self::calculate_rms_db(&adjusted);

        self.rms_history.push(adjusted_rms);
        self.gain_history.push(required_adjustment_db);

        (adjusted, required_adjustment_db, true)
    }

    pub fn current_rms(&self) -> Option<f64> {
        self.rms_history.last().copied()
    }

    pub fn history(&self) -> &[f64] {
        &self.rms_history
    }

    pub fn stats(&self) -> SmoothStats {
        if self.rms_history.is_empty() {
            return SmoothStats {
                mean_rms: None,
                min_rms: None,
                max_rms: None,
                total_adjustments: 0,
                total_chunks: 0,
                max_gain_adjustment: 0.0,
            };
        }
        let mean = self.rms_history.iter().sum::<f64>() / self.rms_history.len() as f64;
        let min = self.rms_history.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = self.rms_history.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let total_adjustments = self.gain_history.iter().filter(|g| g.abs() > 0.01).count();
        let max_gain_adjustment = self
           .gain_history
           .iter()
           .cloned()
           .fold(0.0f64, |acc, g| acc.max(g.abs()));

        SmoothStats {
            mean_rms: Some(mean),
            min_rms: Some(min),
            max_rms: Some(max),
            total_adjustments,
            total_chunks: self.rms_history.len(),
            max_gain_adjustment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_chunk_is_never_adjusted() {
        let mut s = LevelSmoother::new(1.5);
        let chunk = vec![0.9f32; 1000];
        let (out, gain, adjusted) = s.smooth(&chunk, 0);
        assert_eq!(out, chunk);
        assert_eq!(gain, 0.0);
        assert!(!adjusted);
    }

    #[test]
    fn small_jump_is_not_adjusted() {
        let mut s = LevelSmoother::new(1.5);
        s.smooth(&vec![0.5f32; 1000], 0);
        let (_, _, adjusted) = s.smooth(&vec![0.55f32; 1000], 1);
        assert!(!adjusted);
    }

    #[test]
    fn large_jump_triggers_adjustment() {
        let mut s = LevelSmoother::new(1.5);
        s.smooth(&vec![0.05f32; 1000], 0);
        let (_, gain, adjusted) = s.smooth(&vec![0.9f32; 1000], 1);
        assert!(adjusted);
        assert!(gain < 0.0); // a loud jump requires negative (attenuating) gain
    }

    proptest! {
        #[test]
        fn p5_history_step_never_exceeds_bound(
            levels in prop::collection::vec(0.0001f32..1.0, 2..20),
        ) {
            let max_change = 1.5;
            let mut s = LevelSmoother::new(max_change);
            for (i, &level) in levels.iter().enumerate() {
                s.smooth(&vec![level; 2000], i);
            }
            let history = s.history();
            for w in history.windows(2) {
                prop_assert!((w[1] - w[0]).abs() <= max_change + 1e-6);
            }
        }
    }
}
