//! Two-tier cache (C6).
//!
//! Guarded by a single [`parking_lot::Mutex`] rather than the reentrant
//! mutex the design notes mention: nothing in this crate calls back into a
//! locked operation from inside another one, so a plain mutex gives the
//! same "no I/O under the lock" guarantee without the ergonomic cost of
//! interior mutability a true reentrant wrapper would need (see DESIGN.md).

use crate::entry::CacheEntry;
use auralis_core::{CacheKey, Error, Preset, QuantizedIntensity, Result, Tier, TierHint, TrackId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
struct PlaybackState {
    track_id: Option<TrackId>,
    chunk_idx: u32,
    preset: Option<Preset>,
    intensity: Option<QuantizedIntensity>,
}

struct CacheState {
    tier1: HashMap<CacheKey, CacheEntry>,
    tier2: HashMap<CacheKey, CacheEntry>,
    tier1_ceiling: u64,
    tier2_ceiling: u64,
    playback: PlaybackState,
}

/// Hit/miss/eviction counters, "get_statistics"-style introspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub tier1_size_bytes: u64,
    pub tier2_size_bytes: u64,
}

pub struct Cache {
    state: Mutex<CacheState>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    cache_dir: PathBuf,
}

impl Cache {
    /// Truncates (or creates) `dir` and returns a cache rooted there. Any
    /// files already present are removed on startup.
    pub fn bootstrap(dir: &Path, tier1_bytes: u64, tier2_bytes: u64) -> Result<Self> {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;

        Ok(Self {
            state: Mutex::new(CacheState {
                tier1: HashMap::new(),
                tier2: HashMap::new(),
                tier1_ceiling: tier1_bytes,
                tier2_ceiling: tier2_bytes,
                playback: PlaybackState::default(),
            }),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            cache_dir: dir.to_path_buf(),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, key: &CacheKey) -> Option<(PathBuf, Tier)> {
        let now = self.tick();
        let mut state = self.state.lock();
        let found = if let Some(e) = state.tier1.get_mut(key) {
            e.last_access_at = now;
            e.access_count += 1;
            Some((e.payload_path.clone(), Tier::Hot))
        } else if let Some(e) = state.tier2.get_mut(key) {
            e.last_access_at = now;
            e.access_count += 1;
            Some((e.payload_path.clone(), Tier::Warm))
        } else {
            None
        };
        drop(state);

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn contains(&self, key: &CacheKey) -> (bool, Option<Tier>) {
        let state = self.state.lock();
        if state.tier1.contains_key(key) {
            (true, Some(Tier::Hot))
        } else if state.tier2.contains_key(key) {
            (true, Some(Tier::Warm))
        } else {
            (false, None)
        }
    }

    /// Routes a new entry into Tier 1 or Tier 2 per `tier_hint`, evicting as
    /// needed to stay within each tier's ceiling before insertion.
    pub fn put(&self, mut entry: CacheEntry, tier_hint: TierHint) {
        let now = self.tick();
        entry.created_at = now;
        entry.last_access_at = now;

        let mut state = self.state.lock();
        let tier = match tier_hint {
            TierHint::Explicit(t) => t,
            TierHint::Auto => {
                if Self::is_current_or_next(&state.playback, &entry.key) {
                    Tier::Hot
                } else {
                    Tier::Warm
                }
            }
        };
        entry.tier = tier;

        match tier {
            Tier::Hot => {
                Self::evict_locked(
                    &mut state.tier1,
                    state.tier1_ceiling,
                    entry.size_bytes,
                    &self.evictions,
                    &state.playback,
                    false,
                );
                state.tier1.insert(entry.key, entry);
            }
            Tier::Warm => {
                Self::evict_locked(
                    &mut state.tier2,
                    state.tier2_ceiling,
                    entry.size_bytes,
                    &self.evictions,
                    &state.playback,
                    true,
                );
                state.tier2.insert(entry.key, entry);
            }
        }
    }

    fn is_current_or_next(playback: &PlaybackState, key: &CacheKey) -> bool {
        let (Some(track_id), Some(preset), Some(intensity)) =
            (playback.track_id, playback.preset, playback.intensity)
        else {
            return false;
        };
        key.track_id == track_id
            && key.preset == preset
            && key.intensity == intensity
            && (key.chunk_idx == playback.chunk_idx || key.chunk_idx == playback.chunk_idx + 1)
    }

    fn total_size(map: &HashMap<CacheKey, CacheEntry>) -> u64 {
        map.values().map(|e| e.size_bytes).sum()
    }

    /// Evicts entries by LRU (oldest `last_access_at` first) until
    /// `size + needed_bytes <= ceiling`. When `pin_current_track_originals`
    /// is set (Tier 2 only), the current track's original chunks are
    /// skipped as eviction candidates.
    fn evict_locked(
        map: &mut HashMap<CacheKey, CacheEntry>,
        ceiling: u64,
        needed_bytes: u64,
        evictions: &AtomicU64,
        playback: &PlaybackState,
        pin_current_track_originals: bool,
    ) {
        loop {
            let current_size = Self::total_size(map);
            if current_size + needed_bytes <= ceiling {
                return;
            }

            let victim = map
               .values()
               .filter(|e| {
                    if !pin_current_track_originals {
                        return true;
                    }
                    let is_pinned = playback.track_id == Some(e.key.track_id)
                        && e.key.is_original();
                    !is_pinned
                })
               .min_by_key(|e| e.last_access_at)
               .map(|e| e.key);

            match victim {
                Some(key) => {
                    if let Some(e) = map.remove(&key) {
                        let _ = std::fs::remove_file(&e.payload_path);
                        evictions.fetch_add(1, Ordering::Relaxed);
                    }
                }
                None => {
                    // Everything left is pinned; the single-entry-too-large
                    // case (CacheError) is handled by the caller
                    // before it ever calls put.
                    warn!("cache eviction could not make room: all remaining entries pinned");
                    return;
                }
            }
        }
    }

    /// Public `evict_to_fit`, usable ahead of an insert the
    /// caller wants to pre-clear room for.
    pub fn evict_to_fit(&self, tier: Tier, needed_bytes: u64) {
        let mut state = self.state.lock();
        match tier {
            Tier::Hot => {
                let ceiling = state.tier1_ceiling;
                let playback = state.playback;
                Self::evict_locked(&mut state.tier1, ceiling, needed_bytes, &self.evictions, &playback, false);
            }
            Tier::Warm => {
                let ceiling = state.tier2_ceiling;
                let playback = state.playback;
                Self::evict_locked(&mut state.tier2, ceiling, needed_bytes, &self.evictions, &playback, true);
            }
        }
    }

    /// Inserts a single entry, refusing and reporting `CacheError` if it is
    /// larger than its tier's ceiling outright.
    pub fn try_put(&self, entry: CacheEntry, tier_hint: TierHint) -> Result<()> {
        let ceiling = {
            let state = self.state.lock();
            match tier_hint {
                TierHint::Explicit(Tier::Hot) => state.tier1_ceiling,
                TierHint::Explicit(Tier::Warm) => state.tier2_ceiling,
                TierHint::Auto => {
                    if Self::is_current_or_next(&state.playback, &entry.key) {
                        state.tier1_ceiling
                    } else {
                        state.tier2_ceiling
                    }
                }
            }
        };
        if entry.size_bytes > ceiling {
            return Err(Error::cache(format!(
                "entry {} ({} bytes) exceeds tier ceiling {ceiling}",
                entry.key, entry.size_bytes
            )));
        }
        self.put(entry, tier_hint);
        Ok(())
    }

    /// Updates which chunks count as "current/next" for future `Auto`
    /// inserts, and purges/relaxes Tier 1 per the three cases.
    pub fn update_playback_position(
        &self,
        track_id: TrackId,
        chunk_idx: u32,
        preset: Preset,
        intensity: f64,
    ) {
        let intensity = QuantizedIntensity::quantize(intensity);
        let mut state = self.state.lock();
        let previous = state.playback;

        let track_changed = previous.track_id != Some(track_id);
        if track_changed {
            let removed = state.tier1.len();
            state.tier1.clear();
            info!(removed, "track change: Tier 1 purged");
        }
        // Preset/intensity change for the same track: entries whose key no
        // longer matches simply become eligible for ordinary LRU eviction —
        // nothing to do here beyond updating `playback`, since `is_current_or_next`
        // is evaluated fresh on every future `put`/`evict_locked` call.

        state.playback = PlaybackState {
            track_id: Some(track_id),
            chunk_idx,
            preset: Some(preset),
            intensity: Some(intensity),
        };
    }

    /// Resizes both tiers, evicting immediately if either new ceiling is
    /// below the tier's current size (degradation transitions).
    pub fn set_ceilings(&self, tier1_bytes: u64, tier2_bytes: u64) {
        let mut state = self.state.lock();
        state.tier1_ceiling = tier1_bytes;
        state.tier2_ceiling = tier2_bytes;
        let playback = state.playback;
        Self::evict_locked(&mut state.tier1, tier1_bytes, 0, &self.evictions, &playback, false);
        Self::evict_locked(&mut state.tier2, tier2_bytes, 0, &self.evictions, &playback, true);
    }

    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        for e in state.tier1.values().chain(state.tier2.values()) {
            let _ = std::fs::remove_file(&e.payload_path);
        }
        state.tier1.clear();
        state.tier2.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            tier1_size_bytes: Self::total_size(&state.tier1),
            tier2_size_bytes: Self::total_size(&state.tier2),
        }
    }

    pub fn tier_size(&self, tier: Tier) -> u64 {
        let state = self.state.lock();
        match tier {
            Tier::Hot => Self::total_size(&state.tier1),
            Tier::Warm => Self::total_size(&state.tier2),
        }
    }

    pub fn tier_ceiling(&self, tier: Tier) -> u64 {
        let state = self.state.lock();
        match tier {
            Tier::Hot => state.tier1_ceiling,
            Tier::Warm => state.tier2_ceiling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auralis_core::FileSignature;
    use tempfile::tempdir;

    fn make_entry(cache_dir: &Path, track: u64, preset: Preset, chunk: u32, size: u64) -> CacheEntry {
        let key = CacheKey::new(
            TrackId(track),
            FileSignature::compute("x", 1, std::time::SystemTime::UNIX_EPOCH),
            preset,
            1.0,
            chunk,
        );
        let path = cache_dir.join(key.file_name());
        std::fs::write(&path, vec![0u8; size as usize]).unwrap();
        CacheEntry {
            key,
            payload_path: path,
            sample_rate: 44100,
            channels: 2,
            sample_count: 1000,
            size_bytes: size,
            created_at: 0,
            last_access_at: 0,
            access_count: 0,
            tier: Tier::Hot,
            probability: 1.0,
        }
    }

    #[test]
    fn p3_ceiling_never_exceeded() {
        let dir = tempdir().unwrap();
        let cache = Cache::bootstrap(dir.path(), 100, 1000).unwrap();

        for i in 0..10u64 {
            let entry = make_entry(dir.path(), i, Preset::None, 0, 40);
            cache.put(entry, TierHint::Explicit(Tier::Hot));
            assert!(cache.tier_size(Tier::Hot) <= cache.tier_ceiling(Tier::Hot));
        }
    }

    #[test]
    fn p4_contains_implies_file_exists() {
        let dir = tempdir().unwrap();
        let cache = Cache::bootstrap(dir.path(), 10_000, 10_000).unwrap();
        let entry = make_entry(dir.path(), 1, Preset::Adaptive, 0, 100);
        let path = entry.payload_path.clone();
        cache.put(entry.clone(), TierHint::Explicit(Tier::Warm));

        let (present, tier) = cache.contains(&entry.key);
        assert!(present);
        assert_eq!(tier, Some(Tier::Warm));
        assert!(path.exists());
    }

    #[test]
    fn none_and_adaptive_do_not_collide_in_cache() {
        let dir = tempdir().unwrap();
        let cache = Cache::bootstrap(dir.path(), 10_000, 10_000).unwrap();
        let original = make_entry(dir.path(), 1, Preset::None, 0, 10);
        let processed = make_entry(dir.path(), 1, Preset::Adaptive, 0, 10);
        cache.put(original.clone(), TierHint::Explicit(Tier::Hot));
        cache.put(processed.clone(), TierHint::Explicit(Tier::Hot));

        assert!(cache.contains(&original.key).0);
        assert!(cache.contains(&processed.key).0);
        assert_eq!(cache.tier_size(Tier::Hot), 20);
    }

    #[test]
    fn track_change_purges_tier1() {
        let dir = tempdir().unwrap();
        let cache = Cache::bootstrap(dir.path(), 10_000, 10_000).unwrap();
        let entry = make_entry(dir.path(), 1, Preset::Adaptive, 0, 10);
        cache.put(entry.clone(), TierHint::Explicit(Tier::Hot));
        assert!(cache.contains(&entry.key).0);

        cache.update_playback_position(TrackId(2), 0, Preset::Adaptive, 1.0);
        assert!(!cache.contains(&entry.key).0);
    }

    #[test]
    fn pinned_current_track_original_survives_tier2_pressure() {
        let dir = tempdir().unwrap();
        let cache = Cache::bootstrap(dir.path(), 10_000, 50).unwrap();
        cache.update_playback_position(TrackId(1), 0, Preset::Adaptive, 1.0);

        let pinned = make_entry(dir.path(), 1, Preset::None, 0, 30);
        cache.put(pinned.clone(), TierHint::Explicit(Tier::Warm));

        // Try to push in enough Tier-2 entries to force eviction under
        // pressure; the pinned original chunk of the *current* track must
        // never be chosen as the victim.
        for i in 0..5u64 {
            let other = make_entry(dir.path(), 9, Preset::Punchy, i as u32, 30);
            cache.put(other, TierHint::Explicit(Tier::Warm));
        }

        assert!(cache.contains(&pinned.key).0);
    }
}
