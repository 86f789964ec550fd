//! Wire message contract for a duplex text-message channel, each message
//! `{type, data}`. Transport-agnostic — `auralis-server` is the only crate
//! that knows these are carried over a WebSocket.

use auralis_core::Preset;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    Play {
        track_id: u64,
        preset: String,
        intensity: f64,
    },
    Seek {
        track_id: u64,
        position_s: f64,
    },
    Pause,
    Stop,
    Cancel,
    PresetChange {
        preset: String,
        intensity: f64,
    },
    Ping,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    StreamStart {
        track_id: u64,
        preset: String,
        intensity: f64,
        sample_rate: u32,
        channels: u16,
        total_chunks: u32,
        total_duration: f64,
        stream_type: &'static str,
    },
    AudioChunk {
        chunk_index: u32,
        frame_index: u32,
        total_chunks: u32,
        samples_b64: String,
        sample_count: usize,
    },
    StreamEnd {
        track_id: u64,
        total_samples: u64,
        duration: f64,
    },
    StreamError {
        error: String,
        recovery_position: Option<f64>,
        code: String,
    },
    Pong,
    /// Covers malformed JSON (`invalid_json`) and unrecognized `type` values
    /// (`validation_error`).
    Error {
        code: &'static str,
        message: String,
    },
}

impl OutboundMessage {
    pub fn invalid_json(detail: impl Into<String>) -> Self {
        OutboundMessage::Error {
            code: "invalid_json",
            message: detail.into(),
        }
    }

    pub fn validation_error(detail: impl Into<String>) -> Self {
        OutboundMessage::Error {
            code: "validation_error",
            message: detail.into(),
        }
    }
}

/// Parses raw inbound text. Malformed JSON and unrecognized `type`
/// values are distinguished so the caller can pick the right error code.
pub fn parse_inbound(text: &str) -> Result<InboundMessage, ParseError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| ParseError::ValidationError(e.to_string()))
}

#[derive(Debug, Clone)]
pub enum ParseError {
    InvalidJson(String),
    ValidationError(String),
}

pub fn parse_preset(s: &str) -> Option<Preset> {
    Preset::parse(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_message() {
        let text = r#"{"type":"play","data":{"track_id":7,"preset":"adaptive","intensity":0.8}}"#;
        let msg = parse_inbound(text).unwrap();
        matches!(msg, InboundMessage::Play { track_id: 7,.. });
    }

    #[test]
    fn malformed_json_is_distinguished_from_unknown_type() {
        assert!(matches!(
            parse_inbound("not json"),
            Err(ParseError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_inbound(r#"{"type":"not_a_real_type","data":{}}"#),
            Err(ParseError::ValidationError(_))
        ));
    }

    #[test]
    fn serializes_stream_start_with_type_and_data_envelope() {
        let msg = OutboundMessage::StreamStart {
            track_id: 1,
            preset: "adaptive".into(),
            intensity: 1.0,
            sample_rate: 44100,
            channels: 2,
            total_chunks: 4,
            total_duration: 40.0,
            stream_type: "pcm_f32le",
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "stream_start");
        assert_eq!(json["data"]["sample_rate"], 44100);
    }
}
