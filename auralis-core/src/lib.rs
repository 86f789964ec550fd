//! Shared types for the Auralis streaming-mastering core: error taxonomy,
//! configuration, track identity, cache keys and preset definitions.

pub mod cache_key;
pub mod config;
pub mod error;
pub mod preset;
pub mod track;

pub use cache_key::{CacheKey, QuantizedIntensity, Tier, TierHint};
pub use config::AuralisConfig;
pub use error::{Error, Result};
pub use preset::{Preset, ProcessingParameters, SpectrumPosition};
pub use track::{FileSignature, TrackId, TrackInfo};
