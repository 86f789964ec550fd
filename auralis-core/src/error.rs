//! Shared error taxonomy for every crate in the Auralis streaming core.
//!
//! One enum rather than a per-crate `Error` because C2-C9 are tiers of a
//! single pipeline that all need to agree on the same failure vocabulary:
//! the streaming controller (C8) matches on the error kind produced deep
//! inside the chunk processor (C5) to decide whether to emit
//! `stream_error{recovery_position}` or end the session cleanly.

/// Result type alias used throughout the Auralis core crates.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds a session can surface to a client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File missing, permission denied, disk full, or a short read past EOF
    /// at the start of the requested range.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported or corrupt audio input.
    #[error("decode error: {0}")]
    Decode(String),

    /// Non-finite samples, invalid preset parameters, or filter instability.
    #[error("DSP error: {0}")]
    Dsp(String),

    /// Chunk processing exceeded its priority budget.
    #[error("processing timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A cache ceiling cannot be honored, e.g. a single entry exceeds the
    /// tier ceiling outright.
    #[error("cache error: {0}")]
    Cache(String),

    /// Client disconnected, sent an oversized/rate-limited/malformed
    /// message, or an unknown message type.
    #[error("transport error: {0}")]
    Transport(String),

    /// Unknown track id, or the underlying file has been deleted.
    #[error("not found: {0}")]
    NotFound(String),

    /// No streaming permit available within the acquisition timeout.
    #[error("server busy: no stream permit available")]
    Busy,
}

impl Error {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn dsp(msg: impl Into<String>) -> Self {
        Self::Dsp(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// True for the error kinds the streaming controller treats as
    /// recoverable mid-session: emit `stream_error` with a recovery
    /// position and end the session, rather than propagating a hard fault.
    pub fn is_chunk_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Decode(_) | Error::Dsp(_) | Error::Timeout(_)
        )
    }

    /// A short machine-readable code for the `stream_error{code}` wire field.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "io_error",
            Error::Decode(_) => "decode_error",
            Error::Dsp(_) => "dsp_error",
            Error::Timeout(_) => "timeout",
            Error::Cache(_) => "cache_error",
            Error::Transport(_) => "transport_error",
            Error::NotFound(_) => "not_found",
            Error::Busy => "busy",
        }
    }
}
