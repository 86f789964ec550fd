//! Cache entry record.

use auralis_core::{CacheKey, Tier};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_count: u64,
    pub size_bytes: u64,
    pub created_at: u64,
    pub last_access_at: u64,
    pub access_count: u64,
    pub tier: Tier,
    pub probability: f64,
}
