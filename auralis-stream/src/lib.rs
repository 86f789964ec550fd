//! Streaming controller (C8) and memory monitor (C9): the session-facing
//! half of the Auralis core. Transport-agnostic — see [`controller::Transport`]
//! for the seam `auralis-server` fills in with an actual WebSocket.

pub mod controller;
pub mod crossfade;
pub mod memory;
pub mod message;

pub use controller::{PlaybackObserver, SessionState, StreamController, Transport};
pub use memory::{DegradationLevel, MemoryMonitor, MemorySampler, SysinfoSampler};
pub use message::{parse_inbound, InboundMessage, OutboundMessage, ParseError};
