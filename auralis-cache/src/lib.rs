//! Two-tier hot/warm cache for mastered audio chunks (C6).
//!
//! Non-persistent by design: [`Cache::bootstrap`] truncates its directory on
//! every startup. Mastered audio is cheap to regenerate and keyed on a file
//! signature, so there is nothing worth surviving a restart for — see
//! DESIGN.md for the longer version of that argument.

mod cache;
mod entry;

pub use cache::{Cache, CacheStats};
pub use entry::CacheEntry;
