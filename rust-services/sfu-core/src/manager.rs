//! Session manager: inbound dispatch and per-session serialization
//!
//! One manager instance per media type. It owns the session table, the
//! per-key lifecycle queues, the per-key pending-ICE queues, and the
//! inbound message router.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use confero_config::AppConfig;
use confero_types::{
    ClientFrame, IceCandidatePayload, MediaKind, MessageEnvelope, SessionKey, SessionRole,
    SfuError, SfuErrorCode, StartPayload, SubscriberAnswerPayload, WebcamBroadcastEvent,
};
use mcs_client::MediaControlServer;
use message_bus_client::{subjects, MessageBusClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::bridge::BridgeRegistry;
use crate::endpoint::IceQueue;
use crate::lifecycle::LifecycleQueues;
use crate::metrics;
use crate::outbox::ClientOutbox;
use crate::permissions::{self, PermissionOracle};
use crate::session::{ClientSession, SessionParams};
use crate::sources::SourceRegistry;

/// Adapter used for audio sessions unless the client names one
const DEFAULT_AUDIO_ADAPTER: &str = "freeswitch";

/// Internal commands raised by sessions and endpoints; each resolves into
/// a task on the target session's lifecycle queue
#[derive(Debug)]
pub enum ManagerCommand {
    /// Close the session without notifying the client
    CloseSession { key: String },
    /// Close the session and emit a server-initiated close frame
    DisconnectUser { key: String },
}

/// Top-level dispatcher for one media type
pub struct SessionManager {
    kind: MediaKind,
    config: Arc<AppConfig>,
    bus: Arc<dyn MessageBusClient>,
    mcs: Arc<dyn MediaControlServer>,
    permissions: Arc<dyn PermissionOracle>,
    bridges: Arc<BridgeRegistry>,
    sources: Arc<SourceRegistry>,
    sessions: Mutex<HashMap<String, Arc<ClientSession>>>,
    lifecycle: Arc<LifecycleQueues>,
    pending_ice: Mutex<HashMap<String, IceQueue>>,
    commands: mpsc::UnboundedSender<ManagerCommand>,
}

impl SessionManager {
    pub fn new(
        kind: MediaKind,
        config: Arc<AppConfig>,
        bus: Arc<dyn MessageBusClient>,
        mcs: Arc<dyn MediaControlServer>,
        permissions: Arc<dyn PermissionOracle>,
        bridges: Arc<BridgeRegistry>,
        sources: Arc<SourceRegistry>,
    ) -> Arc<Self> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let manager = Arc::new(SessionManager {
            kind,
            config,
            bus,
            mcs,
            permissions,
            bridges,
            sources,
            sessions: Mutex::new(HashMap::new()),
            lifecycle: LifecycleQueues::new(),
            pending_ice: Mutex::new(HashMap::new()),
            commands: commands_tx,
        });

        manager.spawn_command_loop(commands_rx);
        manager
    }

    fn spawn_command_loop(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<ManagerCommand>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let Some(manager) = weak.upgrade() else { break };
                match command {
                    ManagerCommand::CloseSession { key } => manager.enqueue_close(&key, false),
                    ManagerCommand::DisconnectUser { key } => manager.enqueue_close(&key, true),
                }
            }
        });
    }

    fn inbound_subject(&self) -> &'static str {
        match self.kind {
            MediaKind::Audio => subjects::SFU_AUDIO,
            MediaKind::Video => subjects::SFU_VIDEO,
        }
    }

    /// Consume inbound bus traffic until the subscription ends
    pub async fn run(self: Arc<Self>) {
        if self.kind == MediaKind::Video {
            self.spawn_source_tracking();
        }

        let mut inbound = self.bus.subscribe(self.inbound_subject());
        info!(subject = self.inbound_subject(), "Manager listening");

        while let Some(message) = inbound.next().await {
            match message {
                Ok(message) => match serde_json::from_value::<MessageEnvelope>(message.payload) {
                    Ok(envelope) => self.on_message(envelope).await,
                    Err(e) => {
                        warn!(error = %e, "Undecodable inbound message");
                        metrics::count_request(self.kind);
                        metrics::count_error(
                            self.kind,
                            "onMessage",
                            SfuErrorCode::SfuInvalidRequest,
                        );
                    }
                },
                Err(e) => error!(error = %e, "Bus subscription error"),
            }
        }

        warn!(subject = self.inbound_subject(), "Inbound stream ended");
    }

    /// Track external webcam sources announced on the bus (video only)
    fn spawn_source_tracking(self: &Arc<Self>) {
        let sources = Arc::clone(&self.sources);
        let mut stream = self.bus.subscribe(subjects::WEBCAM_BROADCAST_STARTED);

        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let Ok(message) = message else { continue };
                match serde_json::from_value::<WebcamBroadcastEvent>(message.payload) {
                    Ok(event) if SourceRegistry::is_external_user(&event.user_id) => {
                        sources.register(&event.user_id, &event.stream);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Undecodable webcam broadcast event"),
                }
            }
        });
    }

    /// Route one inbound message
    pub async fn on_message(self: &Arc<Self>, mut envelope: MessageEnvelope) {
        metrics::count_request(self.kind);

        if let Err(e) = envelope.apply_header(self.config.ws_strict_header_parsing) {
            self.handle_error("onMessage", &envelope.connection_id, "", None, e)
                .await;
            return;
        }

        match envelope.id.as_str() {
            "start" => self.dispatch_start(envelope).await,
            "subscriberAnswer" => self.dispatch_subscriber_answer(envelope).await,
            "stop" => self.dispatch_stop(envelope).await,
            // ICE delivery bypasses the lifecycle queue for latency
            "onIceCandidate" => self.handle_ice_candidate(envelope).await,
            "close" => self.kill_connection_sessions(&envelope.connection_id),
            "error" => {
                warn!(
                    connection_id = envelope.connection_id,
                    "Upstream error message"
                );
            }
            other => {
                self.handle_error(
                    "onMessage",
                    &envelope.connection_id,
                    "",
                    None,
                    SfuError::InvalidRequest(format!("unknown message id: {other}")),
                )
                .await;
            }
        }
    }

    /// Derive the composite session key for an inbound message
    fn session_key(&self, envelope: &MessageEnvelope) -> Result<SessionKey, SfuError> {
        let role: SessionRole = envelope
            .role
            .as_deref()
            .ok_or_else(|| SfuError::InvalidRequest("missing role".to_string()))?
            .parse()?;

        match self.kind {
            MediaKind::Video if !matches!(role, SessionRole::Share | SessionRole::Viewer) => {
                return Err(SfuError::InvalidRequest(format!(
                    "role {role} is not a video role"
                )));
            }
            MediaKind::Audio if !matches!(role, SessionRole::SendRecv | SessionRole::RecvOnly) => {
                return Err(SfuError::InvalidRequest(format!(
                    "role {role} is not an audio role"
                )));
            }
            _ => {}
        }

        if role == SessionRole::SendRecv && !self.config.full_audio_enabled {
            return Err(SfuError::InvalidRequest(
                "sendrecv audio is disabled".to_string(),
            ));
        }

        if envelope.user_id.is_empty() {
            return Err(SfuError::InvalidRequest("missing userId".to_string()));
        }

        let resource_id = match self.kind {
            MediaKind::Audio => {
                if envelope.voice_bridge.is_empty() {
                    return Err(SfuError::InvalidRequest("missing voiceBridge".to_string()));
                }
                envelope.voice_bridge.clone()
            }
            MediaKind::Video => envelope
                .payload
                .get("cameraId")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| SfuError::InvalidRequest("missing cameraId".to_string()))?
                .to_string(),
        };

        Ok(SessionKey::new(&envelope.user_id, resource_id, role))
    }

    async fn dispatch_start(self: &Arc<Self>, envelope: MessageEnvelope) {
        let key = match self.session_key(&envelope) {
            Ok(key) => key,
            Err(e) => {
                self.handle_error("start", &envelope.connection_id, "", None, e)
                    .await;
                return;
            }
        };

        let manager = Arc::clone(self);
        let key_str = key.to_string();
        self.lifecycle.enqueue(
            &key_str,
            Box::pin(async move {
                if let Err(e) = manager.handle_start(&key, &envelope).await {
                    manager
                        .handle_error(
                            "start",
                            &envelope.connection_id,
                            &key.resource_id,
                            Some(key.role),
                            e,
                        )
                        .await;
                }
            }),
        );
    }

    async fn dispatch_subscriber_answer(self: &Arc<Self>, envelope: MessageEnvelope) {
        let key = match self.session_key(&envelope) {
            Ok(key) => key,
            Err(e) => {
                self.handle_error("subscriberAnswer", &envelope.connection_id, "", None, e)
                    .await;
                return;
            }
        };

        let manager = Arc::clone(self);
        let key_str = key.to_string();
        self.lifecycle.enqueue(
            &key_str.clone(),
            Box::pin(async move {
                if let Err(e) = manager.handle_subscriber_answer(&key_str, &envelope).await {
                    manager
                        .handle_error(
                            "subscriberAnswer",
                            &envelope.connection_id,
                            &key.resource_id,
                            Some(key.role),
                            e,
                        )
                        .await;
                }
            }),
        );
    }

    async fn dispatch_stop(self: &Arc<Self>, envelope: MessageEnvelope) {
        let key = match self.session_key(&envelope) {
            Ok(key) => key,
            Err(e) => {
                self.handle_error("stop", &envelope.connection_id, "", None, e)
                    .await;
                return;
            }
        };

        let manager = Arc::clone(self);
        let key_str = key.to_string();
        self.lifecycle.enqueue(
            &key_str.clone(),
            Box::pin(async move {
                manager.close_session(&key_str, false).await;
            }),
        );
    }

    /// Authorize, allocate, and negotiate one session
    async fn handle_start(
        &self,
        key: &SessionKey,
        envelope: &MessageEnvelope,
    ) -> Result<(), SfuError> {
        let payload: StartPayload = envelope.payload_as()?;

        permissions::authorize(
            self.permissions.as_ref(),
            key.role,
            &envelope.meeting_id,
            &key.user_id,
            &key.resource_id,
        )
        .await?;

        let key_str = key.to_string();

        // Stale replacement: drive any existing holder of this key through
        // STOPPED before building the new endpoint
        if self.sessions.lock().unwrap().contains_key(&key_str) {
            info!(session = key_str, "Replacing existing session");
            self.close_session(&key_str, false).await;
        }

        let ice_queue = Arc::clone(
            self.pending_ice
                .lock()
                .unwrap()
                .entry(key_str.clone())
                .or_default(),
        );

        let media_server = match self.kind {
            MediaKind::Video => payload
                .media_server
                .clone()
                .unwrap_or_else(|| self.config.video_media_server.clone()),
            MediaKind::Audio => payload
                .media_server
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIO_ADAPTER.to_string()),
        };

        let content_source = match self.kind {
            MediaKind::Video => Some(
                self.sources
                    .resolve(&key.resource_id)
                    .unwrap_or_else(|| key.resource_id.clone()),
            ),
            MediaKind::Audio => None,
        };

        let session = ClientSession::new(
            SessionParams {
                key: key.clone(),
                connection_id: envelope.connection_id.clone(),
                meeting_id: envelope.meeting_id.clone(),
                voice_bridge: envelope.voice_bridge.clone(),
                media_server,
                kind: self.kind,
                content_source,
                bitrate: payload.bitrate,
                record: payload.record,
                ice_queue,
            },
            Arc::clone(&self.config),
            Arc::clone(&self.bus),
            Arc::clone(&self.mcs),
            self.commands.clone(),
            Arc::clone(&self.bridges),
        );

        self.sessions
            .lock()
            .unwrap()
            .insert(key_str.clone(), Arc::clone(&session));
        self.update_session_gauge();

        match session.start(&payload.sdp_offer).await {
            Ok(answer) => {
                let frame = ClientFrame::StartResponse {
                    media_type: self.kind,
                    role: key.role,
                    camera_id: (self.kind == MediaKind::Video)
                        .then(|| key.resource_id.clone()),
                    caller_id: payload.caller_id.clone(),
                    sdp_answer: answer,
                };
                session.send_frame(frame).await;
                Ok(())
            }
            Err(e) => {
                self.close_session(&key_str, false).await;
                Err(e)
            }
        }
    }

    async fn handle_subscriber_answer(
        &self,
        key_str: &str,
        envelope: &MessageEnvelope,
    ) -> Result<(), SfuError> {
        let payload: SubscriberAnswerPayload = envelope.payload_as()?;

        // No matching session resolves without side effects
        let session = self.sessions.lock().unwrap().get(key_str).cloned();
        match session {
            Some(session) => session.process_answer(&payload.answer).await,
            None => Ok(()),
        }
    }

    /// ICE delivery path; not serialized on the lifecycle queue
    async fn handle_ice_candidate(self: &Arc<Self>, envelope: MessageEnvelope) {
        let key = match self.session_key(&envelope) {
            Ok(key) => key,
            Err(e) => {
                self.handle_error("onIceCandidate", &envelope.connection_id, "", None, e)
                    .await;
                return;
            }
        };

        let payload: IceCandidatePayload = match envelope.payload_as() {
            Ok(payload) => payload,
            Err(e) => {
                self.handle_error(
                    "onIceCandidate",
                    &envelope.connection_id,
                    &key.resource_id,
                    Some(key.role),
                    e,
                )
                .await;
                return;
            }
        };

        let key_str = key.to_string();
        let session = self.sessions.lock().unwrap().get(&key_str).cloned();

        match session {
            Some(session) if session.is_ready() => {
                if let Err(e) = session.on_ice_candidate(&payload.candidate).await {
                    self.handle_error(
                        "onIceCandidate",
                        &envelope.connection_id,
                        &key.resource_id,
                        Some(key.role),
                        e,
                    )
                    .await;
                }
            }
            _ => {
                // Buffer until the first endpoint for this key is ready
                let queue = Arc::clone(
                    self.pending_ice
                        .lock()
                        .unwrap()
                        .entry(key_str)
                        .or_default(),
                );
                queue.lock().unwrap().push(payload.candidate);
            }
        }
    }

    /// Enqueue a close for every session owned by a connection
    pub fn kill_connection_sessions(self: &Arc<Self>, connection_id: &str) {
        let keys: Vec<String> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|session| session.connection_id() == connection_id)
            .map(|session| session.key_str().to_string())
            .collect();

        info!(
            connection_id = connection_id,
            count = keys.len(),
            "Connection closed, stopping its sessions"
        );

        for key in keys {
            self.enqueue_close(&key, false);
        }
    }

    fn enqueue_close(self: &Arc<Self>, key: &str, notify_client: bool) {
        let manager = Arc::clone(self);
        let key_owned = key.to_string();
        self.lifecycle.enqueue(
            key,
            Box::pin(async move {
                manager.close_session(&key_owned, notify_client).await;
            }),
        );
    }

    /// Remove and stop one session; best-effort, never raises
    async fn close_session(&self, key_str: &str, notify_client: bool) {
        let session = self.sessions.lock().unwrap().remove(key_str);

        if let Some(session) = session {
            session.stop().await;
            if notify_client {
                session.send_frame(ClientFrame::Close).await;
            }
            self.update_session_gauge();
        }

        self.pending_ice.lock().unwrap().remove(key_str);
    }

    /// Normalize an error, report it to the client, and count it
    async fn handle_error(
        &self,
        method: &str,
        connection_id: &str,
        resource_id: &str,
        role: Option<SessionRole>,
        error: SfuError,
    ) -> SfuErrorCode {
        let code = error.catalogue();

        warn!(
            method = method,
            connection_id = connection_id,
            resource = resource_id,
            role = role.map(|r| r.as_str()),
            error = %error,
            "Request failed"
        );

        metrics::count_error(self.kind, method, code);

        if !connection_id.is_empty() {
            ClientOutbox::new(Arc::clone(&self.bus), self.kind, connection_id)
                .send_error(code)
                .await;
        }

        code
    }

    fn update_session_gauge(&self) {
        metrics::set_session_count(self.kind, self.sessions.lock().unwrap().len());
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn session(&self, key: &str) -> Option<Arc<ClientSession>> {
        self.sessions.lock().unwrap().get(key).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Queued candidates for a key that has no ready endpoint yet
    pub fn pending_ice_len(&self, key: &str) -> usize {
        self.pending_ice
            .lock()
            .unwrap()
            .get(key)
            .map(|queue| queue.lock().unwrap().len())
            .unwrap_or(0)
    }
}
