//! Chunk boundary arithmetic. Pure functions of `(total_duration, sample_rate)`
//! plus the four geometry constants — no I/O, no async, nothing fallible.
//!
//! Chunk model: chunk `k` covers core interval `[k*interval, k*interval +
//! duration]` (clamped to `total_duration`), with `duration - interval`
//! seconds of overlap against its neighbor. Processing additionally loads
//! `context` seconds on each side of the core when available.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkGeometry {
    total_duration: f64,
    sample_rate: u32,
    chunk_duration: f64,
    chunk_interval: f64,
    overlap_duration: f64,
    context_duration: f64,
}

/// Default geometry constants (default: 15/10/5/5 s).
pub const DEFAULT_CHUNK_DURATION_S: f64 = 15.0;
pub const DEFAULT_CHUNK_INTERVAL_S: f64 = 10.0;
pub const DEFAULT_OVERLAP_DURATION_S: f64 = 5.0;
pub const DEFAULT_CONTEXT_DURATION_S: f64 = 5.0;

impl ChunkGeometry {
    pub fn new(total_duration: f64, sample_rate: u32) -> Self {
        Self::with_durations(
            total_duration,
            sample_rate,
            DEFAULT_CHUNK_DURATION_S,
            DEFAULT_CHUNK_INTERVAL_S,
            DEFAULT_OVERLAP_DURATION_S,
            DEFAULT_CONTEXT_DURATION_S,
        )
    }

    pub fn with_durations(
        total_duration: f64,
        sample_rate: u32,
        chunk_duration: f64,
        chunk_interval: f64,
        overlap_duration: f64,
        context_duration: f64,
    ) -> Self {
        debug_assert!(total_duration >= 0.0);
        debug_assert!(chunk_interval > 0.0);
        Self {
            total_duration,
            sample_rate,
            chunk_duration,
            chunk_interval,
            overlap_duration,
            context_duration,
        }
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// `ceil(total_duration / chunk_interval)`, minimum 1 (a zero-duration
    /// or sub-chunk track is still one chunk, per the edge case).
    pub fn total_chunks(&self) -> usize {
        if self.total_duration <= 0.0 {
            return 1;
        }
        (self.total_duration / self.chunk_interval).ceil().max(1.0) as usize
    }

    pub fn is_last(&self, k: usize) -> bool {
        k + 1 >= self.total_chunks()
    }

    pub fn overlap_samples(&self) -> usize {
        (self.overlap_duration * self.sample_rate as f64).round() as usize
    }

    fn context_samples(&self) -> usize {
        (self.context_duration * self.sample_rate as f64).round() as usize
    }

    /// `(load_start, load_end, core_start, core_end)` in seconds.
    pub fn boundaries_seconds(&self, k: usize, with_context: bool) -> (f64, f64, f64, f64) {
        let core_start = k as f64 * self.chunk_interval;
        let core_end = (core_start + self.chunk_duration).min(self.total_duration);

        let (load_start, load_end) = if with_context {
            (
                (core_start - self.context_duration).max(0.0),
                (core_end + self.context_duration).min(self.total_duration),
            )
        } else {
            (core_start, core_end)
        };

        (load_start, load_end, core_start, core_end)
    }

    /// The same boundaries converted to sample indices.
    pub fn boundaries_samples(&self, k: usize, with_context: bool) -> (usize, usize, usize, usize) {
        let (load_start, load_end, core_start, core_end) = self.boundaries_seconds(k, with_context);
        let sr = self.sample_rate as f64;
        (
            (load_start * sr) as usize,
            (load_end * sr) as usize,
            (core_start * sr) as usize,
            (core_end * sr) as usize,
        )
    }

    /// Samples of context to drop from the start/end of a loaded-with-context
    /// buffer for chunk `k` (no leading context at `k=0`, no trailing context
    /// on the last chunk).
    pub fn context_trim_samples(&self, k: usize) -> (usize, usize) {
        let context_samples = self.context_samples();
        let trim_start = if k > 0 { context_samples } else { 0 };
        let trim_end = if self.is_last(k) { 0 } else { context_samples };
        (trim_start, trim_end)
    }

    /// How to slice a processed buffer (which still carries its context) down
    /// to the segment that gets emitted/cached for chunk `k`.
    pub fn segment_boundaries(&self, k: usize, n_processed_samples: usize) -> (usize, usize) {
        let context_samples = self.context_samples();
        let is_last = self.is_last(k);

        let segment_start = if k == 0 { 0 } else { context_samples };

        let chunk_duration_samples =
            (self.chunk_duration * self.sample_rate as f64).round() as usize;
        let segment_end = if is_last {
            let chunk_start_time = k as f64 * self.chunk_interval;
            let remaining_duration = (self.total_duration - chunk_start_time).max(0.0);
            let remaining_samples = (remaining_duration * self.sample_rate as f64).round() as usize;
            segment_start + remaining_samples
        } else {
            segment_start + chunk_duration_samples
        };

        (
            segment_start.min(n_processed_samples),
            segment_end.min(n_processed_samples),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_chunk_for_short_track() {
        let g = ChunkGeometry::new(3.0, 44100);
        assert_eq!(g.total_chunks(), 1);
        assert!(g.is_last(0));
    }

    #[test]
    fn exact_multiple_has_no_short_final_chunk() {
        // T = 20s, interval = 10s -> chunks at [0,10), [10,20)
        let g = ChunkGeometry::new(20.0, 44100);
        assert_eq!(g.total_chunks(), 2);
        let (_, _, _, core_end) = g.boundaries_seconds(1, false);
        assert_eq!(core_end, 20.0);
    }

    #[test]
    fn first_chunk_has_no_leading_context() {
        let g = ChunkGeometry::new(60.0, 44100);
        let (load_start, _, core_start, _) = g.boundaries_seconds(0, true);
        assert_eq!(load_start, core_start);
        assert_eq!(load_start, 0.0);
    }

    #[test]
    fn last_chunk_has_no_trailing_context() {
        let g = ChunkGeometry::new(18.0, 44100);
        let last_k = g.total_chunks() - 1;
        let (_, load_end, _, core_end) = g.boundaries_seconds(last_k, true);
        assert_eq!(load_end, core_end);
        assert_eq!(load_end, 18.0);
    }

    #[test]
    fn segment_boundaries_match_s1_scenario() {
        // T=18s, sr=44100: chunk 0 core [0,15), chunk 1 core [10,18)
        let g = ChunkGeometry::new(18.0, 44100);
        assert_eq!(g.total_chunks(), 2);

        let n_processed = 44100 * 20; // some processed buffer with context
        let (s0, e0) = g.segment_boundaries(0, n_processed);
        assert_eq!(s0, 0);
        assert_eq!(e0, 15 * 44100); // chunk 0's full CHUNK_DURATION, no trailing trim here by this formula

        let (s1, e1) = g.segment_boundaries(1, n_processed);
        // segment_start skips leading context
        assert_eq!(s1, 5 * 44100);
    }

    proptest! {
        #[test]
        fn p1_core_intervals_cover_total_duration_exactly(
            total_duration in 0.1f64..600.0,
            sr in 8000u32..96000,
        ) {
            let g = ChunkGeometry::new(total_duration, sr);
            let n = g.total_chunks();
            // coverage: first chunk starts at 0, last chunk ends at total_duration
            let (_, _, first_core_start, _) = g.boundaries_seconds(0, false);
            prop_assert_eq!(first_core_start, 0.0);
            let (_, _, _, last_core_end) = g.boundaries_seconds(n - 1, false);
            prop_assert!((last_core_end - total_duration).abs() < 1e-9);

            // adjacency: chunk k+1's core start <= chunk k's core end (overlap or touch)
            for k in 0..n.saturating_sub(1) {
                let (_, _, _, core_end_k) = g.boundaries_seconds(k, false);
                let (_, _, core_start_k1, _) = g.boundaries_seconds(k + 1, false);
                prop_assert!(core_start_k1 <= core_end_k + 1e-9);
            }
        }

        #[test]
        fn p2_segment_boundaries_independent_of_sample_rate(
            total_duration in 1.0f64..300.0,
            sr_a in 8000u32..96000,
            sr_b in 8000u32..96000,
            k_frac in 0.0f64..1.0,
        ) {
            let ga = ChunkGeometry::new(total_duration, sr_a);
            let gb = ChunkGeometry::new(total_duration, sr_b);
            let n = ga.total_chunks();
            prop_assert_eq!(n, gb.total_chunks());
            let k = ((n - 1) as f64 * k_frac) as usize;

            let context_a = (DEFAULT_CONTEXT_DURATION_S * sr_a as f64).round() as usize;
            let context_b = (DEFAULT_CONTEXT_DURATION_S * sr_b as f64).round() as usize;
            let big_enough_a = context_a * 3;
            let big_enough_b = context_b * 3;

            let (sa, ea) = ga.segment_boundaries(k, big_enough_a);
            let (sb, eb) = gb.segment_boundaries(k, big_enough_b);

            // durations (in seconds) implied by the two sample rates should match
            let dur_a = (ea - sa) as f64 / sr_a as f64;
            let dur_b = (eb - sb) as f64 / sr_b as f64;
            prop_assert!((dur_a - dur_b).abs() < 1e-3);
        }
    }
}
