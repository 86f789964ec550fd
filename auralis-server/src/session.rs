//! Per-connection message loop: one WebSocket maps to at most one
//! active streaming session at a time. `play`/`seek`/`preset_change` each
//! retire whatever session is currently running before starting the next.

use crate::rate_limit::TokenBucket;
use crate::AppState;
use auralis_core::{FileSignature, Preset, TrackId};
use auralis_stream::{
    parse_inbound, InboundMessage, OutboundMessage, ParseError, PlaybackObserver, StreamController,
};
use auralis_chunk::TrackLibrary;
use auralis_worker::{PlaybackSnapshot, Worker};
use crate::library::DirectoryLibrary;
use axum::extract::ws::{Message, WebSocket};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ws::{spawn_sender, SessionTransport, WsTransport};

struct ActiveSession {
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    track_id: TrackId,
    preset: Preset,
    intensity: f64,
}

struct WorkerObserver {
    worker: Arc<Worker<DirectoryLibrary>>,
    track_id: TrackId,
}

impl PlaybackObserver for WorkerObserver {
    fn on_chunk_advance(&self, chunk_idx: u32) {
        self.worker.advance_chunk(self.track_id, chunk_idx);
    }
}

async fn retire(current: &mut Option<ActiveSession>, app: &Arc<AppState>) {
    if let Some(s) = current.take() {
        s.active.store(false, Ordering::SeqCst);
        let _ = s.handle.await;
        app.active_streams.lock().remove(&s.track_id);
    }
}

pub async fn handle_socket(socket: WebSocket, app: Arc<AppState>) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(app.config.send_queue_maxsize);
    let connected = Arc::new(AtomicBool::new(true));

    let sender_connected = connected.clone();
    tokio::spawn(spawn_sender(sink, rx, sender_connected));

    let transport = Arc::new(WsTransport::new(tx, connected.clone()));
    let mut rate_limiter = TokenBucket::new(app.config.max_inbound_messages_per_s);
    let mut current: Option<ActiveSession> = None;

    while let Some(Ok(msg)) = stream.next().await {
        if !connected.load(Ordering::SeqCst) {
            break;
        }
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
        };

        if text.len() > app.config.max_inbound_message_bytes {
            transport
              .send(OutboundMessage::validation_error("message too large"))
              .await;
            continue;
        }
        if !rate_limiter.try_take() {
            transport
              .send(OutboundMessage::validation_error("rate limit exceeded"))
              .await;
            continue;
        }

        match parse_inbound(&text) {
            Err(ParseError::InvalidJson(detail)) => {
                transport.send(OutboundMessage::invalid_json(detail)).await;
            }
            Err(ParseError::ValidationError(detail)) => {
                transport
                  .send(OutboundMessage::validation_error(detail))
                  .await;
            }
            Ok(InboundMessage::Ping) => {
                transport.send(OutboundMessage::Pong).await;
            }
            Ok(InboundMessage::Stop) | Ok(InboundMessage::Pause) | Ok(InboundMessage::Cancel) => {
                retire(&mut current, &app).await;
                app.worker.set_playback(None);
            }
            Ok(InboundMessage::Play {
                track_id,
                preset,
                intensity,
            }) => {
                let Some(preset) = Preset::parse(&preset) else {
                    transport
                      .send(OutboundMessage::validation_error("unknown preset"))
                      .await;
                    continue;
                };
                retire(&mut current, &app).await;
                current =
                    start_session(&app, &transport, TrackId(track_id), preset, intensity, 0).await;
            }
            Ok(InboundMessage::Seek {
                track_id,
                position_s,
            }) => {
                let Some(prev) = &current else {
                    transport
                      .send(OutboundMessage::validation_error("seek with no active stream"))
                      .await;
                    continue;
                };
                let start_chunk = (position_s / app.config.chunk_interval_s).floor().max(0.0) as u32;
                let (preset, intensity) = (prev.preset, prev.intensity);
                retire(&mut current, &app).await;
                current = start_session(
                    &app,
                    &transport,
                    TrackId(track_id),
                    preset,
                    intensity,
                    start_chunk,
                )
              .await;
            }
            Ok(InboundMessage::PresetChange { preset, intensity }) => {
                let Some(prev) = &current else {
                    transport
                      .send(OutboundMessage::validation_error(
                            "preset_change with no active stream",
                        ))
                      .await;
                    continue;
                };
                let Some(preset) = Preset::parse(&preset) else {
                    transport
                      .send(OutboundMessage::validation_error("unknown preset"))
                      .await;
                    continue;
                };
                let track_id = prev.track_id;
                retire(&mut current, &app).await;
                current = start_session(&app, &transport, track_id, preset, intensity, 0).await;
            }
        }
    }

    retire(&mut current, &app).await;
    connected.store(false, Ordering::SeqCst);
    app.worker.set_playback(None);
    info!("websocket session closed");
}

async fn start_session(
    app: &Arc<AppState>,
    transport: &Arc<WsTransport>,
    track_id: TrackId,
    preset: Preset,
    intensity: f64,
    start_chunk: u32,
) -> Option<ActiveSession> {
    let Some(track) = app.library.get_track(track_id).await else {
        transport
          .send(OutboundMessage::StreamError {
                error: "track not found".into(),
                recovery_position: None,
                code: "not_found".into(),
            })
          .await;
        return None;
    };

    let signature = match FileSignature::for_path(&track.file_path) {
        Ok(s) => s,
        Err(e) => {
            transport
              .send(OutboundMessage::StreamError {
                    error: e.to_string(),
                    recovery_position: None,
                    code: e.code.to_string(),
                })
              .await;
            return None;
        }
    };

    let header = match auralis_audio::open(std::path::Path::new(&track.file_path)) {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "could not open track to prime worker snapshot");
            return None;
        }
    };
    let geometry = auralis_geometry::ChunkGeometry::new(track.duration_s, header.sample_rate);

    app.worker.set_playback(Some(PlaybackSnapshot {
        track_id,
        signature,
        file_path: track.file_path.clone(),
        duration_s: track.duration_s,
        preset,
        intensity,
        current_chunk: start_chunk,
        total_chunks: geometry.total_chunks() as u32,
    }));

    let active = Arc::new(AtomicBool::new(true));
    app.active_streams.lock().insert(track_id, active.clone());
    let session_transport = Arc::new(SessionTransport::new(transport.clone(), active.clone()));
    let library = app.library.clone();
    let cache = app.cache.clone();
    let config = app.config.clone();
    let semaphore = app.semaphore.clone();
    let observer = Arc::new(WorkerObserver {
        worker: app.worker.clone(),
        track_id,
    });

    let handle = tokio::spawn(async move {
        let mut controller = StreamController::new(cache, config, semaphore).with_observer(observer);
        controller
          .run_session(
                &*library,
                &*session_transport,
                track_id,
                preset,
                intensity,
                start_chunk,
            )
          .await;
    });

    Some(ActiveSession {
        active,
        handle,
        track_id,
        preset,
        intensity,
    })
}
