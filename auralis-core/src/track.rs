//! Track identity: an integer id plus a file signature.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::SystemTime;

/// Integer identifier for a track, as handed back by the library
/// collaborator (`get_track`). Opaque to the core: it never
/// derives meaning from the value, only equality and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash of `{filepath, size, mtime}`. Embedded in every cache key
/// so that if the underlying file changes, previously cached chunks become
/// unreachable instead of serving stale audio — the cache never needs to
/// actively invalidate anything, an old signature simply stops matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileSignature(u64);

impl FileSignature {
    /// Stats `path` and folds its size/mtime into a signature. The normal
    /// way to obtain one in production code; [`FileSignature::compute`]
    /// stays available for callers (tests, mostly) that already have the
    /// metadata in hand.
    pub fn for_path(path: &str) -> crate::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(Self::compute(path, meta.len(), mtime))
    }

    pub fn compute(path: &str, size_bytes: u64, mtime: SystemTime) -> Self {
        let mtime_nanos = mtime
           .duration_since(SystemTime::UNIX_EPOCH)
           .map(|d| d.as_nanos())
           .unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update(size_bytes.to_le_bytes());
        hasher.update(mtime_nanos.to_le_bytes());
        let digest = hasher.finalize();

        // Fold the 256-bit digest into a u64: the signature only needs to be
        // collision-resistant enough to key an in-process cache, not to be
        // cryptographically unforgeable.
        let mut folded = [0u8; 8];
        for (i, byte) in digest.iter().enumerate() {
            folded[i % 8] ^= byte;
        }
        Self(u64::from_le_bytes(folded))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// What the library collaborator hands back for `get_track`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: TrackId,
    pub file_path: String,
    pub duration_s: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_changes_when_any_component_changes() {
        let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000);
        let a = FileSignature::compute("/music/a.flac", 1000, t);
        let b = FileSignature::compute("/music/a.flac", 1001, t);
        let c = FileSignature::compute("/music/b.flac", 1000, t);
        let d = FileSignature::compute(
            "/music/a.flac",
            1000,
            t + std::time::Duration::from_secs(1),
        );
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn signature_is_deterministic() {
        let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(42);
        let a = FileSignature::compute("/music/a.flac", 1000, t);
        let b = FileSignature::compute("/music/a.flac", 1000, t);
        assert_eq!(a, b);
    }
}
