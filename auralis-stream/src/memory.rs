//! Memory monitor & degradation (C9). Samples process/system
//! memory on a fixed interval and drives the cache's ceilings and the
//! worker's pause/throughput controls through four degradation levels.

use auralis_cache::Cache;
use auralis_core::AuralisConfig;
use auralis_worker::{PresetPredictor, Throughput, Worker};
use auralis_chunk::TrackLibrary;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use sysinfo::System;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationLevel {
    Normal = 0,
    Warning = 1,
    Critical = 2,
    Emergency = 3,
}

impl DegradationLevel {
    /// `(tier1_bytes, tier2_bytes)` for each level (table). Level
    /// 0's Tier 2 figure already folds in the configured headroom.
    fn ceilings(self, config: &AuralisConfig) -> (u64, u64) {
        match self {
            DegradationLevel::Normal => (config.tier1_bytes, config.tier2_bytes_with_headroom()),
            DegradationLevel::Warning => (12 * 1024 * 1024, 18 * 1024 * 1024),
            DegradationLevel::Critical => (9 * 1024 * 1024, 0),
            DegradationLevel::Emergency => (6 * 1024 * 1024, 0),
        }
    }

    fn from_fraction(used_fraction: f64, sample_latency_elevated: bool) -> Self {
        if used_fraction >= 0.85 && sample_latency_elevated {
            DegradationLevel::Emergency
        } else if used_fraction >= 0.85 {
            DegradationLevel::Critical
        } else if used_fraction >= 0.75 {
            DegradationLevel::Warning
        } else {
            DegradationLevel::Normal
        }
    }

    fn throughput(self) -> Throughput {
        match self {
            DegradationLevel::Normal | DegradationLevel::Warning => Throughput::Normal,
            DegradationLevel::Critical => Throughput::Reduced,
            DegradationLevel::Emergency => Throughput::Paused,
        }
    }
}

/// Samples used-memory fraction; swappable for tests without pulling in
/// real system state.
pub trait MemorySampler: Send + Sync {
    fn used_fraction(&mut self) -> f64;
    /// Whether the worker's own sample processing is lagging — the second
    /// condition for the emergency degradation level. The worker itself is
    /// the natural source for this; left `false` unless a caller wires it up.
    fn worker_latency_elevated(&self) -> bool {
        false
    }
}

pub struct SysinfoSampler {
    system: System,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self { system }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SysinfoSampler {
    fn used_fraction(&mut self) -> f64 {
        self.system.refresh_memory();
        let total = self.system.total_memory().max(1);
        self.system.used_memory() as f64 / total as f64
    }
}

pub struct MemoryMonitor<L: TrackLibrary> {
    cache: Arc<Cache>,
    worker: Arc<Worker<L>>,
    config: AuralisConfig,
    level: AtomicU8,
}

impl<L: TrackLibrary> MemoryMonitor<L> {
    pub fn new(cache: Arc<Cache>, worker: Arc<Worker<L>>, config: AuralisConfig) -> Self {
        Self {
            cache,
            worker,
            config,
            level: AtomicU8::new(DegradationLevel::Normal as u8),
        }
    }

    pub fn current_level(&self) -> DegradationLevel {
        match self.level.load(Ordering::SeqCst) {
            1 => DegradationLevel::Warning,
            2 => DegradationLevel::Critical,
            3 => DegradationLevel::Emergency,
            _ => DegradationLevel::Normal,
        }
    }

    /// One sampling pass; applies the new level's ceilings/throughput only
    /// when the level actually changes. Degradation never interrupts an
    /// in-progress chunk emission — transitions are idempotent no-ops
    /// between changes.
    pub fn tick(&self, sampler: &mut dyn MemorySampler) {
        let used = sampler.used_fraction();
        let new_level = DegradationLevel::from_fraction(used, sampler.worker_latency_elevated());
        let old = self.current_level();
        if new_level == old {
            return;
        }

        let (t1, t2) = new_level.ceilings(&self.config);
        self.cache.set_ceilings(t1, t2);
        self.worker.set_throughput(new_level.throughput());
        self.level.store(new_level as u8, Ordering::SeqCst);
        info!(?used, from = ?old, to = ?new_level, "memory degradation level changed");
    }

    /// Runs forever, waking every `mem_check_interval_s`.
    pub async fn run(self: Arc<Self>, mut sampler: Box<dyn MemorySampler>) {
        loop {
            tokio::time::sleep(self.config.mem_check_interval()).await;
            self.tick(sampler.as_mut());
        }
    }
}
