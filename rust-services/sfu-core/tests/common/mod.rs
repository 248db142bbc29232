//! Shared test doubles: a recording MCS stub, a recording bus, and a
//! static permission oracle.
#![allow(dead_code)]

use async_trait::async_trait;
use confero_config::AppConfig;
use confero_types::{MediaKind, SfuError};
use mcs_client::{
    JoinParams, McsError, McsResult, MediaControlServer, MediaEventStream, MediaServerEvent,
    McsTransport, NegotiateOptions, NegotiatedMedia, ServerEventStream, ServerStatusEvent,
};
use message_bus_client::{BusMessage, BusStream, MessageBusClient, MessageBusError};
use serde_json::{json, Value};
use sfu_core::bridge::BridgeRegistry;
use sfu_core::manager::SessionManager;
use sfu_core::permissions::PermissionOracle;
use sfu_core::sources::SourceRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Clone, PartialEq)]
pub enum McsCall {
    WaitForConnection,
    Join {
        room: String,
        external_user_id: String,
    },
    Publish {
        user_id: String,
        room: String,
        media_id: String,
        reused: bool,
    },
    Subscribe {
        user_id: String,
        source_media_id: String,
        media_id: String,
    },
    Consume {
        source: String,
        sink: String,
    },
    Connect {
        source: String,
        sink: String,
    },
    AddIceCandidate {
        media_id: String,
        candidate: Value,
    },
    Unpublish {
        user_id: String,
        media_id: String,
    },
    RestartIce {
        media_id: String,
    },
    Dtmf {
        media_id: String,
        tones: String,
    },
}

/// Recording in-memory MCS
pub struct StubMcs {
    calls: Mutex<Vec<McsCall>>,
    user_seq: AtomicUsize,
    media_seq: AtomicUsize,
    pub connected: AtomicBool,
    pub fail_publish: AtomicBool,
    pub join_delay: Mutex<Option<Duration>>,
    media_listeners: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<MediaServerEvent>>>>,
    server_listeners: Mutex<Vec<mpsc::UnboundedSender<ServerStatusEvent>>>,
}

impl StubMcs {
    pub fn new() -> Arc<Self> {
        Arc::new(StubMcs {
            calls: Mutex::new(Vec::new()),
            user_seq: AtomicUsize::new(0),
            media_seq: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
            fail_publish: AtomicBool::new(false),
            join_delay: Mutex::new(None),
            media_listeners: Mutex::new(HashMap::new()),
            server_listeners: Mutex::new(Vec::new()),
        })
    }

    fn next_user(&self) -> String {
        format!("user-{}", self.user_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn next_media(&self) -> String {
        format!("media-{}", self.media_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn record(&self, call: McsCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<McsCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, McsCall::Publish { .. }))
            .count()
    }

    pub fn unpublish_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, McsCall::Unpublish { .. }))
            .count()
    }

    pub fn join_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, McsCall::Join { .. }))
            .count()
    }

    pub fn ice_candidates(&self) -> Vec<Value> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                McsCall::AddIceCandidate { candidate, .. } => Some(candidate.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn emit_media_event(&self, media_id: &str, event: MediaServerEvent) {
        let listeners = self.media_listeners.lock().unwrap();
        if let Some(senders) = listeners.get(media_id) {
            for sender in senders {
                let _ = sender.send(event.clone());
            }
        }
    }

    pub fn emit_server_event(&self, event: ServerStatusEvent) {
        for sender in self.server_listeners.lock().unwrap().iter() {
            let _ = sender.send(event);
        }
    }

    /// Media id assigned by the n-th publish/subscribe (1-based)
    pub fn media_id_of_negotiation(&self, n: usize) -> Option<String> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                McsCall::Publish { media_id, .. } | McsCall::Subscribe { media_id, .. } => {
                    Some(media_id.clone())
                }
                _ => None,
            })
            .nth(n - 1)
    }
}

#[async_trait]
impl MediaControlServer for StubMcs {
    async fn wait_for_connection(&self) -> bool {
        self.record(McsCall::WaitForConnection);
        self.connected.load(Ordering::SeqCst)
    }

    async fn join(&self, room: &str, _user_name: &str, params: JoinParams) -> McsResult<String> {
        let delay = *self.join_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(McsCall::Join {
            room: room.to_string(),
            external_user_id: params.external_user_id,
        });
        Ok(self.next_user())
    }

    async fn publish(
        &self,
        user_id: &str,
        room: &str,
        _transport: McsTransport,
        options: NegotiateOptions,
    ) -> McsResult<NegotiatedMedia> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(McsError::Rejected {
                method: "publish".to_string(),
                message: "stubbed failure".to_string(),
            });
        }
        let media_id = options
            .media_id
            .clone()
            .unwrap_or_else(|| self.next_media());
        self.record(McsCall::Publish {
            user_id: user_id.to_string(),
            room: room.to_string(),
            media_id: media_id.clone(),
            reused: options.media_id.is_some(),
        });
        let answer = format!("answer-{media_id}");
        Ok(NegotiatedMedia { media_id, answer })
    }

    async fn subscribe(
        &self,
        user_id: &str,
        source_media_id: &str,
        _transport: McsTransport,
        options: NegotiateOptions,
    ) -> McsResult<NegotiatedMedia> {
        let media_id = options
            .media_id
            .clone()
            .unwrap_or_else(|| self.next_media());
        self.record(McsCall::Subscribe {
            user_id: user_id.to_string(),
            source_media_id: source_media_id.to_string(),
            media_id: media_id.clone(),
        });
        let answer = format!("answer-{media_id}");
        Ok(NegotiatedMedia { media_id, answer })
    }

    async fn consume(
        &self,
        source_media_id: &str,
        sink_media_id: &str,
        _kind: MediaKind,
    ) -> McsResult<String> {
        self.record(McsCall::Consume {
            source: source_media_id.to_string(),
            sink: sink_media_id.to_string(),
        });
        Ok(format!("bridge-answer-{sink_media_id}"))
    }

    async fn connect(
        &self,
        source_media_id: &str,
        sink_media_id: &str,
        _kind: MediaKind,
    ) -> McsResult<()> {
        self.record(McsCall::Connect {
            source: source_media_id.to_string(),
            sink: sink_media_id.to_string(),
        });
        Ok(())
    }

    async fn add_ice_candidate(&self, media_id: &str, candidate: &Value) -> McsResult<()> {
        self.record(McsCall::AddIceCandidate {
            media_id: media_id.to_string(),
            candidate: candidate.clone(),
        });
        Ok(())
    }

    async fn unpublish(&self, user_id: &str, media_id: &str) -> McsResult<()> {
        self.record(McsCall::Unpublish {
            user_id: user_id.to_string(),
            media_id: media_id.to_string(),
        });
        Ok(())
    }

    async fn restart_ice(&self, media_id: &str) -> McsResult<String> {
        self.record(McsCall::RestartIce {
            media_id: media_id.to_string(),
        });
        Ok("restarted-sdp".to_string())
    }

    async fn dtmf(&self, media_id: &str, tones: &str) -> McsResult<String> {
        self.record(McsCall::Dtmf {
            media_id: media_id.to_string(),
            tones: tones.to_string(),
        });
        Ok(tones.to_string())
    }

    fn media_events(&self, media_id: &str) -> MediaEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.media_listeners
            .lock()
            .unwrap()
            .entry(media_id.to_string())
            .or_default()
            .push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn server_events(&self) -> ServerEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.server_listeners.lock().unwrap().push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

/// Recording in-memory bus
pub struct RecordingBus {
    published: Mutex<Vec<(String, Value)>>,
    subscribers:
        Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Result<BusMessage, MessageBusError>>>>>,
}

impl RecordingBus {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingBus {
            published: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    /// Frames published on one connection's client channel
    pub fn frames(&self, connection_id: &str) -> Vec<Value> {
        let channel = format!("sfu.client.{connection_id}");
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(subject, _)| *subject == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn frames_with_id(&self, connection_id: &str, id: &str) -> Vec<Value> {
        self.frames(connection_id)
            .into_iter()
            .filter(|frame| frame["id"] == id)
            .collect()
    }

    /// Deliver a message to subscribers of a subject
    pub fn emit(&self, subject: &str, payload: Value) {
        let subscribers = self.subscribers.lock().unwrap();
        if let Some(senders) = subscribers.get(subject) {
            for sender in senders {
                let _ = sender.send(Ok(BusMessage {
                    subject: subject.to_string(),
                    payload: payload.clone(),
                }));
            }
        }
    }
}

#[async_trait]
impl MessageBusClient for RecordingBus {
    async fn publish_json(&self, subject: &str, payload: &Value) -> Result<(), MessageBusError> {
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload.clone()));
        Ok(())
    }

    fn subscribe(&self, subject: &str) -> BusStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap()
            .entry(subject.to_string())
            .or_default()
            .push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    async fn request_json(&self, _subject: &str, _payload: &Value) -> Result<Value, MessageBusError> {
        Ok(json!({ "allowed": true }))
    }

    async fn is_connected(&self) -> bool {
        true
    }

    fn client_type(&self) -> &str {
        "recording"
    }
}

/// Oracle with a fixed answer
pub struct StaticOracle {
    pub allow: bool,
}

#[async_trait]
impl PermissionOracle for StaticOracle {
    async fn check_broadcast(&self, _m: &str, _u: &str, _c: &str) -> Result<(), SfuError> {
        self.answer()
    }

    async fn check_subscribe(&self, _m: &str, _u: &str, _c: &str) -> Result<(), SfuError> {
        self.answer()
    }

    async fn check_speak(&self, _m: &str, _u: &str, _v: &str) -> Result<(), SfuError> {
        self.answer()
    }
}

impl StaticOracle {
    fn answer(&self) -> Result<(), SfuError> {
        if self.allow {
            Ok(())
        } else {
            Err(SfuError::PermissionDenied("denied by oracle".to_string()))
        }
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        media_flow_timeout_ms: 200,
        media_state_timeout_ms: 300,
        full_audio_enabled: true,
        eject_on_user_left: true,
        ..AppConfig::default()
    }
}

pub struct TestHarness {
    pub manager: Arc<SessionManager>,
    pub mcs: Arc<StubMcs>,
    pub bus: Arc<RecordingBus>,
    pub bridges: Arc<BridgeRegistry>,
}

pub fn harness(kind: MediaKind, config: AppConfig, allow: bool) -> TestHarness {
    let mcs = StubMcs::new();
    let bus = RecordingBus::new();
    let bridges = BridgeRegistry::new();
    let sources = Arc::new(SourceRegistry::new());

    let manager = SessionManager::new(
        kind,
        Arc::new(config),
        bus.clone(),
        mcs.clone(),
        Arc::new(StaticOracle { allow }),
        Arc::clone(&bridges),
        sources,
    );

    TestHarness {
        manager,
        mcs,
        bus,
        bridges,
    }
}

pub fn envelope(value: Value) -> confero_types::MessageEnvelope {
    serde_json::from_value(value).unwrap()
}

pub fn video_start(connection_id: &str, user_id: &str, camera_id: &str, role: &str) -> Value {
    json!({
        "id": "start",
        "connectionId": connection_id,
        "userId": user_id,
        "meetingId": "meeting-1",
        "voiceBridge": "72013",
        "role": role,
        "cameraId": camera_id,
        "sdpOffer": "v=0 offer",
    })
}

pub fn audio_start(connection_id: &str, user_id: &str, role: &str) -> Value {
    json!({
        "id": "start",
        "connectionId": connection_id,
        "userId": user_id,
        "meetingId": "meeting-1",
        "voiceBridge": "72013",
        "role": role,
        "callerId": format!("{user_id}-caller"),
        "sdpOffer": "v=0 offer",
    })
}

/// Poll until the condition holds or the deadline passes
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Let spawned tasks settle without asserting anything
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
