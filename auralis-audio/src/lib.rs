//! Audio I/O adapter (C2), DSP stage (C3) and level smoother (C4).

pub mod analysis;
pub mod biquad;
pub mod content_modifiers;
pub mod dsp;
pub mod dynamics;
pub mod eq;
pub mod io;
pub mod level_smoother;
pub mod limiter;

pub use dsp::{core_frame_range_from_geometry, process};
pub use io::{open, read_range, write_wav, AudioHeader, WavSubtype};
pub use level_smoother::LevelSmoother;
