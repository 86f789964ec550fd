//! Composition-root configuration.
//!
//! One flat, serde-deserializable struct built once in `auralis-server::main`
//! and passed down by reference — no `lazy_static`/`OnceCell` globals.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuralisConfig {
    /// Seconds: chunk length, interval between chunk starts, overlap and
    /// leading/trailing context. Immutable at runtime.
    pub chunk_duration_s: f64,
    pub chunk_interval_s: f64,
    pub overlap_duration_s: f64,
    pub context_duration_s: f64,

    pub max_concurrent_streams: usize,
    pub send_queue_maxsize: usize,
    pub xfade_ms: u64,
    pub max_level_change_db: f64,

    pub cache_dir: std::path::PathBuf,
    pub tier1_bytes: u64,
    pub tier2_bytes: u64,
    /// Tier-2 headroom layered on top of `tier2_bytes` at normal pressure
    /// (degradation level 0: 36 MB + 45 MB headroom).
    pub tier2_headroom_bytes: u64,

    pub mem_check_interval_s: u64,
    pub worker_check_interval_s: u64,

    /// Per-priority worker timeouts, indexed by priority 0..=4.
    pub priority_timeouts_s: [u64; 5],

    /// Sub-message framing size for `audio_chunk.samples_b64`: large enough
    /// that base64-encoded frames stay under the 64 KiB inbound/outbound
    /// message cap.
    pub stream_frame_samples: usize,

    pub max_inbound_message_bytes: usize,
    pub max_inbound_messages_per_s: u32,

    pub bind_addr: String,
}

impl Default for AuralisConfig {
    fn default() -> Self {
        Self {
            chunk_duration_s: 15.0,
            chunk_interval_s: 10.0,
            overlap_duration_s: 5.0,
            context_duration_s: 5.0,

            max_concurrent_streams: 4,
            send_queue_maxsize: 8,
            xfade_ms: 200,
            max_level_change_db: 1.5,

            cache_dir: std::env::temp_dir().join("auralis_chunks"),
            tier1_bytes: 18 * 1024 * 1024,
            tier2_bytes: 36 * 1024 * 1024,
            tier2_headroom_bytes: 45 * 1024 * 1024,

            mem_check_interval_s: 5,
            worker_check_interval_s: 1,
            priority_timeouts_s: [20, 30, 60, 90, 90],

            stream_frame_samples: 16_384,

            max_inbound_message_bytes: 64 * 1024,
            max_inbound_messages_per_s: 10,

            bind_addr: "127.0.0.1:7878".to_string(),
        }
    }
}

impl AuralisConfig {
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_duration_s)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_interval_s)
    }

    pub fn overlap_duration(&self) -> Duration {
        Duration::from_secs_f64(self.overlap_duration_s)
    }

    pub fn context_duration(&self) -> Duration {
        Duration::from_secs_f64(self.context_duration_s)
    }

    pub fn mem_check_interval(&self) -> Duration {
        Duration::from_secs(self.mem_check_interval_s)
    }

    pub fn worker_check_interval(&self) -> Duration {
        Duration::from_secs(self.worker_check_interval_s)
    }

    pub fn priority_timeout(&self, priority: usize) -> Duration {
        Duration::from_secs(self.priority_timeouts_s[priority.min(4)])
    }

    /// Tier-2 ceiling at normal memory pressure, including headroom
    /// (degradation level 0).
    pub fn tier2_bytes_with_headroom(&self) -> u64 {
        self.tier2_bytes + self.tier2_headroom_bytes
    }
}

/// Exit codes for the `auralis-server` CLI harness. The
/// CLI itself is out of scope but the process still needs to report these.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const CONFIG_ERROR: i32 = 2;
    pub const CACHE_DIR_UNWRITABLE: i32 = 3;
    pub const TRANSPORT_BIND_FAILED: i32 = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AuralisConfig::default();
        assert_eq!(cfg.chunk_duration_s, 15.0);
        assert_eq!(cfg.chunk_interval_s, 10.0);
        assert_eq!(cfg.overlap_duration_s, 5.0);
        assert_eq!(cfg.context_duration_s, 5.0);
        assert_eq!(cfg.max_concurrent_streams, 4);
        assert_eq!(cfg.send_queue_maxsize, 8);
        assert_eq!(cfg.xfade_ms, 200);
        assert_eq!(cfg.max_level_change_db, 1.5);
        assert_eq!(cfg.tier2_bytes_with_headroom(), 81 * 1024 * 1024);
    }
}
