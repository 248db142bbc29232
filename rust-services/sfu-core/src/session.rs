//! Per-client session orchestration
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
use confero_types::{MediaKind, SessionKey, SessionStatus, SfuError, SfuErrorCode, UserLeftEvent};
use mcs_client::{MediaControlServer, ServerStatusEvent};
use message_bus_client::{subjects, MessageBusClient};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::bridge::BridgeRegistry;
use crate::endpoint::{ConsumerEndpoint, EndpointParams, IceQueue, MediaEndpoint, PublisherEndpoint};
use crate::manager::ManagerCommand;
use crate::metrics;
use crate::outbox::ClientOutbox;

/// Everything needed to construct a session
pub struct SessionParams {
    pub key: SessionKey,
    pub connection_id: String,
    pub meeting_id: String,
    pub voice_bridge: String,
    pub media_server: String,
    pub kind: MediaKind,
    pub content_source: Option<String>,
    pub bitrate: Option<u32>,
    pub record: bool,
    pub ice_queue: IceQueue,
}

/// One client's logical session: owns exactly one endpoint and reacts to
/// meeting and MCS lifecycle events
pub struct ClientSession {
    key: SessionKey,
    key_str: String,
    connection_id: String,
    meeting_id: String,
    kind: MediaKind,
    status: Mutex<SessionStatus>,
    endpoint: tokio::sync::Mutex<Option<MediaEndpoint>>,
    /// Handles for the user-left and MCS-status subscriptions; aborting
    /// them is the final detach
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
    params: SessionParams,
    config: Arc<AppConfig>,
    mcs: Arc<dyn MediaControlServer>,
    outbox: Arc<ClientOutbox>,
    commands: mpsc::UnboundedSender<ManagerCommand>,
    bridges: Arc<BridgeRegistry>,
}

impl ClientSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: SessionParams,
        config: Arc<AppConfig>,
        bus: Arc<dyn MessageBusClient>,
        mcs: Arc<dyn MediaControlServer>,
        commands: mpsc::UnboundedSender<ManagerCommand>,
        bridges: Arc<BridgeRegistry>,
    ) -> Arc<Self> {
        let outbox = Arc::new(ClientOutbox::new(
            Arc::clone(&bus),
            params.kind,
            &params.connection_id,
        ));

        let session = Arc::new(ClientSession {
            key_str: params.key.to_string(),
            key: params.key.clone(),
            connection_id: params.connection_id.clone(),
            meeting_id: params.meeting_id.clone(),
            kind: params.kind,
            status: Mutex::new(SessionStatus::Starting),
            endpoint: tokio::sync::Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            params,
            config,
            mcs,
            outbox,
            commands,
            bridges,
        });

        session.subscribe_events(bus);
        session
    }

    fn subscribe_events(self: &Arc<Self>, bus: Arc<dyn MessageBusClient>) {
        let mut handles = Vec::new();

        if self.config.eject_on_user_left {
            let mut stream = bus.subscribe(&subjects::user_left(&self.key.user_id));
            let commands = self.commands.clone();
            let key = self.key_str.clone();
            handles.push(tokio::spawn(async move {
                if let Some(Ok(message)) = stream.next().await {
                    if let Ok(event) = serde_json::from_value::<UserLeftEvent>(message.payload) {
                        debug!(
                            session = key,
                            meeting_id = event.meeting_id,
                            "Owner left meeting, ejecting session"
                        );
                    }
                    let _ = commands.send(ManagerCommand::DisconnectUser { key });
                }
            }));
        }

        {
            let mut stream = self.mcs.server_events();
            let commands = self.commands.clone();
            let outbox = Arc::clone(&self.outbox);
            let kind = self.kind;
            let key = self.key_str.clone();
            handles.push(tokio::spawn(async move {
                while let Some(event) = stream.next().await {
                    if event == ServerStatusEvent::McsDisconnected {
                        metrics::count_error(kind, "event", SfuErrorCode::MediaServerOffline);
                        outbox.send_error(SfuErrorCode::MediaServerOffline).await;
                        let _ = commands.send(ManagerCommand::CloseSession { key: key.clone() });
                        break;
                    }
                }
            }));
        }

        *self.subscriptions.lock().unwrap() = handles;
    }

    fn endpoint_params(&self) -> EndpointParams {
        EndpointParams {
            mcs: Arc::clone(&self.mcs),
            outbox: Arc::clone(&self.outbox),
            commands: self.commands.clone(),
            kind: self.kind,
            key: self.key_str.clone(),
            meeting_id: self.meeting_id.clone(),
            voice_bridge: self.params.voice_bridge.clone(),
            external_user_id: self.key.user_id.clone(),
            adapter: self.params.media_server.clone(),
            content_source: self.params.content_source.clone(),
            codec: self.config.media_specs.codec.clone(),
            bitrate: self.params.bitrate.unwrap_or(self.config.media_specs.bitrate),
            record: self.params.record,
            flow_timeout: self.config.media_flow_timeout(),
            state_timeout: self.config.media_state_timeout(),
            ice_queue: Arc::clone(&self.params.ice_queue),
        }
    }

    /// Negotiate the endpoint for this session's role and return the answer
    pub async fn start(&self, offer: &str) -> Result<String, SfuError> {
        let mut endpoint = if self.key.role.is_publisher() {
            MediaEndpoint::Publisher(PublisherEndpoint::new(self.endpoint_params()))
        } else {
            MediaEndpoint::Consumer(ConsumerEndpoint::new(
                self.endpoint_params(),
                Arc::clone(&self.bridges),
            ))
        };

        match endpoint.start(offer).await {
            Ok(answer) => {
                *self.endpoint.lock().await = Some(endpoint);
                *self.status.lock().unwrap() = SessionStatus::Started;
                info!(session = self.key_str, "Session started");
                Ok(answer)
            }
            Err(e) => {
                // Roll back whatever was partially allocated
                endpoint.stop().await;
                Err(e)
            }
        }
    }

    pub async fn on_ice_candidate(&self, candidate: &serde_json::Value) -> Result<(), SfuError> {
        let endpoint = self.endpoint.lock().await;
        match endpoint.as_ref() {
            Some(endpoint) => endpoint.on_ice_candidate(candidate).await,
            None => {
                self.params.ice_queue.lock().unwrap().push(candidate.clone());
                Ok(())
            }
        }
    }

    pub async fn process_answer(&self, descriptor: &str) -> Result<(), SfuError> {
        let mut endpoint = self.endpoint.lock().await;
        match endpoint.as_mut() {
            Some(endpoint) => endpoint.process_answer(descriptor).await,
            None => Ok(()),
        }
    }

    pub async fn dtmf(&self, tones: &str) -> Result<String, SfuError> {
        let endpoint = self.endpoint.lock().await;
        match endpoint.as_ref() {
            Some(endpoint) => endpoint.dtmf(tones).await,
            None => Ok(String::new()),
        }
    }

    pub async fn restart_ice(&self) -> Result<Option<String>, SfuError> {
        let endpoint = self.endpoint.lock().await;
        match endpoint.as_ref() {
            Some(endpoint) => endpoint.restart_ice().await,
            None => Ok(None),
        }
    }

    /// Stop the session; idempotent, best-effort
    pub async fn stop(&self) {
        {
            let mut status = self.status.lock().unwrap();
            if matches!(*status, SessionStatus::Stopping | SessionStatus::Stopped) {
                return;
            }
            *status = SessionStatus::Stopping;
        }

        for handle in self.subscriptions.lock().unwrap().drain(..) {
            handle.abort();
        }

        if let Some(mut endpoint) = self.endpoint.lock().await.take() {
            endpoint.stop().await;
        }

        *self.status.lock().unwrap() = SessionStatus::Stopped;
        info!(session = self.key_str, "Session stopped");
    }

    /// Publish a frame on this session's client channel
    pub async fn send_frame(&self, frame: confero_types::ClientFrame) {
        self.outbox.send(frame).await;
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn key_str(&self) -> &str {
        &self.key_str
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap()
    }

    pub fn is_ready(&self) -> bool {
        self.status().is_ready()
    }
}
