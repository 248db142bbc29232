//! Media endpoints
//!
//! A media endpoint is one negotiated session with the MCS. Publishers are
//! bidirectional: they own a media id and, for audio, a private softswitch
//! bridge. Consumers are receive-only and attach to the meeting's shared
//! bridge. Both share the pending-ICE queue protocol and the media
//! watchdogs.
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


use confero_types::{ClientFrame, MediaKind, SfuError, SfuErrorCode};
use mcs_client::{
    FlowState, JoinParams, MediaControlServer, MediaServerEvent, MediaState, McsTransport,
    NegotiateOptions,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::bridge::{BridgeRegistry, SoftswitchBridge};
use crate::errors::from_mcs;
use crate::manager::ManagerCommand;
use crate::metrics;
use crate::outbox::ClientOutbox;
use crate::watchdog::MediaWatchdogs;

/// Pending ICE candidates for one session key, shared between the manager
/// and the endpoint; drained FIFO on first endpoint readiness
pub type IceQueue = Arc<Mutex<Vec<serde_json::Value>>>;

/// Everything an endpoint needs besides its variant-specific state
pub struct EndpointParams {
    pub mcs: Arc<dyn MediaControlServer>,
    pub outbox: Arc<ClientOutbox>,
    pub commands: mpsc::UnboundedSender<ManagerCommand>,
    pub kind: MediaKind,
    /// Canonical session key, used when requesting our own close
    pub key: String,
    pub meeting_id: String,
    pub voice_bridge: String,
    pub external_user_id: String,
    pub adapter: String,
    /// Resolved content source name (video)
    pub content_source: Option<String>,
    pub codec: String,
    pub bitrate: u32,
    pub record: bool,
    pub flow_timeout: Duration,
    pub state_timeout: Duration,
    pub ice_queue: IceQueue,
}

impl EndpointParams {
    /// Audio negotiates in the voice bridge room, video in the meeting room
    fn room(&self) -> &str {
        match self.kind {
            MediaKind::Audio => &self.voice_bridge,
            MediaKind::Video => &self.meeting_id,
        }
    }

    fn negotiate_options(&self, descriptor: &str) -> NegotiateOptions {
        NegotiateOptions {
            descriptor: Some(descriptor.to_string()),
            adapter: self.adapter.clone(),
            name: self.content_source.clone(),
            codec: Some(self.codec.clone()),
            bitrate: Some(self.bitrate),
            record: self.record,
            ..Default::default()
        }
    }
}

/// Closed capability set over both endpoint variants
pub enum MediaEndpoint {
    Publisher(PublisherEndpoint),
    Consumer(ConsumerEndpoint),
}

impl MediaEndpoint {
    pub async fn start(&mut self, offer: &str) -> Result<String, SfuError> {
        match self {
            MediaEndpoint::Publisher(ep) => ep.start(offer).await,
            MediaEndpoint::Consumer(ep) => ep.start(offer).await,
        }
    }

    pub async fn on_ice_candidate(&self, candidate: &serde_json::Value) -> Result<(), SfuError> {
        match self {
            MediaEndpoint::Publisher(ep) => ep.on_ice_candidate(candidate).await,
            MediaEndpoint::Consumer(ep) => ep.on_ice_candidate(candidate).await,
        }
    }

    pub async fn process_answer(&mut self, descriptor: &str) -> Result<(), SfuError> {
        match self {
            MediaEndpoint::Publisher(ep) => ep.process_answer(descriptor).await,
            MediaEndpoint::Consumer(ep) => ep.process_answer(descriptor).await,
        }
    }

    /// Relay DTMF tones; consumers return the documented empty string
    pub async fn dtmf(&self, tones: &str) -> Result<String, SfuError> {
        match self {
            MediaEndpoint::Publisher(ep) => ep.dtmf(tones).await,
            MediaEndpoint::Consumer(_) => Ok(String::new()),
        }
    }

    /// Restart ICE; consumers resolve with no fresh SDP
    pub async fn restart_ice(&self) -> Result<Option<String>, SfuError> {
        match self {
            MediaEndpoint::Publisher(ep) => ep.restart_ice().await,
            MediaEndpoint::Consumer(_) => Ok(None),
        }
    }

    pub async fn stop(&mut self) {
        match self {
            MediaEndpoint::Publisher(ep) => ep.stop().await,
            MediaEndpoint::Consumer(ep) => ep.stop().await,
        }
    }

    pub fn media_id(&self) -> Option<&str> {
        match self {
            MediaEndpoint::Publisher(ep) => ep.media_id.as_deref(),
            MediaEndpoint::Consumer(ep) => ep.media_id.as_deref(),
        }
    }
}

/// Bidirectional endpoint: publishes the client's media into the room
pub struct PublisherEndpoint {
    p: EndpointParams,
    watchdogs: Arc<MediaWatchdogs>,
    bridge: Option<SoftswitchBridge>,
    mcs_user_id: Option<String>,
    media_id: Option<String>,
    event_task: Option<JoinHandle<()>>,
}

impl PublisherEndpoint {
    pub fn new(p: EndpointParams) -> Self {
        let watchdogs = Arc::new(MediaWatchdogs::new(
            p.flow_timeout,
            p.state_timeout,
            Arc::clone(&p.outbox),
        ));
        PublisherEndpoint {
            p,
            watchdogs,
            bridge: None,
            mcs_user_id: None,
            media_id: None,
            event_task: None,
        }
    }

    async fn start(&mut self, offer: &str) -> Result<String, SfuError> {
        let mcs = Arc::clone(&self.p.mcs);

        if !mcs.wait_for_connection().await {
            return Err(SfuError::MediaServerOffline);
        }

        let user_id = mcs
            .join(
                self.p.room(),
                "SFU",
                JoinParams {
                    external_user_id: self.p.external_user_id.clone(),
                    auto_leave: true,
                },
            )
            .await
            .map_err(from_mcs)?;
        self.mcs_user_id = Some(user_id.clone());

        let negotiated = mcs
            .publish(
                &user_id,
                self.p.room(),
                McsTransport::Webrtc,
                self.p.negotiate_options(offer),
            )
            .await
            .map_err(from_mcs)?;
        self.media_id = Some(negotiated.media_id.clone());

        let answer = match self.p.kind {
            MediaKind::Audio => {
                // The publisher leg is mixed into the legacy conference
                let bridge = SoftswitchBridge::new(
                    &self.p.meeting_id,
                    &self.p.voice_bridge,
                    &self.p.adapter,
                );
                let bridge_media = bridge.start(mcs.as_ref()).await?;
                self.bridge = Some(bridge);

                let answer = mcs
                    .consume(&bridge_media.media_id, &negotiated.media_id, MediaKind::Audio)
                    .await
                    .map_err(from_mcs)?;
                mcs.connect(&negotiated.media_id, &bridge_media.media_id, MediaKind::Audio)
                    .await
                    .map_err(from_mcs)?;
                mcs.connect(&bridge_media.media_id, &negotiated.media_id, MediaKind::Audio)
                    .await
                    .map_err(from_mcs)?;
                answer
            }
            MediaKind::Video => negotiated.answer,
        };

        self.event_task = Some(spawn_event_task(
            &self.p,
            &negotiated.media_id,
            Arc::clone(&self.watchdogs),
        ));

        flush_candidates(&self.p, &negotiated.media_id).await?;

        Ok(answer)
    }

    async fn on_ice_candidate(&self, candidate: &serde_json::Value) -> Result<(), SfuError> {
        forward_or_queue(&self.p, self.media_id.as_deref(), candidate).await
    }

    /// Renegotiation with a fresh descriptor; the media id is reused
    async fn process_answer(&mut self, descriptor: &str) -> Result<(), SfuError> {
        let (Some(user_id), Some(media_id)) = (&self.mcs_user_id, &self.media_id) else {
            return Ok(());
        };

        let mut options = self.p.negotiate_options(descriptor);
        options.media_id = Some(media_id.clone());

        self.p
            .mcs
            .publish(user_id, self.p.room(), McsTransport::Webrtc, options)
            .await
            .map_err(from_mcs)?;
        Ok(())
    }

    async fn dtmf(&self, tones: &str) -> Result<String, SfuError> {
        match &self.media_id {
            Some(media_id) => self.p.mcs.dtmf(media_id, tones).await.map_err(from_mcs),
            None => Ok(String::new()),
        }
    }

    async fn restart_ice(&self) -> Result<Option<String>, SfuError> {
        match &self.media_id {
            Some(media_id) => {
                let sdp = self.p.mcs.restart_ice(media_id).await.map_err(from_mcs)?;
                Ok(Some(sdp))
            }
            None => Ok(None),
        }
    }

    async fn stop(&mut self) {
        self.watchdogs.stop();
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        self.p.ice_queue.lock().unwrap().clear();

        if let (Some(user_id), Some(media_id)) = (self.mcs_user_id.take(), self.media_id.take()) {
            if let Err(e) = self.p.mcs.unpublish(&user_id, &media_id).await {
                warn!(media_id = media_id, error = %e, "Unpublish failed");
            }
        }

        if let Some(bridge) = self.bridge.take() {
            bridge.stop(self.p.mcs.as_ref()).await;
        }
    }
}

/// Receive-only endpoint attached to the meeting's shared bridge
pub struct ConsumerEndpoint {
    p: EndpointParams,
    bridges: Arc<BridgeRegistry>,
    watchdogs: Arc<MediaWatchdogs>,
    bridge: Option<Arc<SoftswitchBridge>>,
    mcs_user_id: Option<String>,
    media_id: Option<String>,
    event_task: Option<JoinHandle<()>>,
}

impl ConsumerEndpoint {
    pub fn new(p: EndpointParams, bridges: Arc<BridgeRegistry>) -> Self {
        let watchdogs = Arc::new(MediaWatchdogs::new(
            p.flow_timeout,
            p.state_timeout,
            Arc::clone(&p.outbox),
        ));
        ConsumerEndpoint {
            p,
            bridges,
            watchdogs,
            bridge: None,
            mcs_user_id: None,
            media_id: None,
            event_task: None,
        }
    }

    async fn start(&mut self, offer: &str) -> Result<String, SfuError> {
        let mcs = Arc::clone(&self.p.mcs);

        if !mcs.wait_for_connection().await {
            return Err(SfuError::MediaServerOffline);
        }

        let user_id = mcs
            .join(
                self.p.room(),
                "SFU",
                JoinParams {
                    external_user_id: self.p.external_user_id.clone(),
                    auto_leave: true,
                },
            )
            .await
            .map_err(from_mcs)?;
        self.mcs_user_id = Some(user_id.clone());

        let bridge = self
            .bridges
            .acquire(
                mcs.as_ref(),
                &self.p.meeting_id,
                &self.p.voice_bridge,
                &self.p.adapter,
            )
            .await?;
        self.bridge = Some(Arc::clone(&bridge));

        let source = bridge
            .media()
            .ok_or_else(|| SfuError::NegotiationFailed("bridge has no media".to_string()))?;

        let negotiated = mcs
            .subscribe(
                &user_id,
                &source.media_id,
                McsTransport::Webrtc,
                self.p.negotiate_options(offer),
            )
            .await
            .map_err(from_mcs)?;
        self.media_id = Some(negotiated.media_id.clone());

        self.event_task = Some(spawn_event_task(
            &self.p,
            &negotiated.media_id,
            Arc::clone(&self.watchdogs),
        ));

        flush_candidates(&self.p, &negotiated.media_id).await?;

        Ok(negotiated.answer)
    }

    async fn on_ice_candidate(&self, candidate: &serde_json::Value) -> Result<(), SfuError> {
        forward_or_queue(&self.p, self.media_id.as_deref(), candidate).await
    }

    /// Renegotiation against the bridge source with a fresh descriptor
    async fn process_answer(&mut self, descriptor: &str) -> Result<(), SfuError> {
        let (Some(user_id), Some(media_id), Some(bridge)) =
            (&self.mcs_user_id, &self.media_id, &self.bridge)
        else {
            return Ok(());
        };
        let Some(source) = bridge.media() else {
            return Ok(());
        };

        let mut options = self.p.negotiate_options(descriptor);
        options.media_id = Some(media_id.clone());

        self.p
            .mcs
            .subscribe(user_id, &source.media_id, McsTransport::Webrtc, options)
            .await
            .map_err(from_mcs)?;
        Ok(())
    }

    async fn stop(&mut self) {
        self.watchdogs.stop();
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        self.p.ice_queue.lock().unwrap().clear();

        if let (Some(user_id), Some(media_id)) = (self.mcs_user_id.take(), self.media_id.take()) {
            if let Err(e) = self.p.mcs.unpublish(&user_id, &media_id).await {
                warn!(media_id = media_id, error = %e, "Unpublish failed");
            }
        }

        if self.bridge.take().is_some() {
            self.bridges
                .release(self.p.mcs.as_ref(), &self.p.meeting_id)
                .await;
        }
    }
}

/// Forward a candidate when the media id is known, otherwise queue it
async fn forward_or_queue(
    p: &EndpointParams,
    media_id: Option<&str>,
    candidate: &serde_json::Value,
) -> Result<(), SfuError> {
    match media_id {
        Some(media_id) => p
            .mcs
            .add_ice_candidate(media_id, candidate)
            .await
            .map_err(from_mcs),
        None => {
            p.ice_queue.lock().unwrap().push(candidate.clone());
            Ok(())
        }
    }
}

/// Drain the pending-ICE queue into the MCS in arrival order
async fn flush_candidates(p: &EndpointParams, media_id: &str) -> Result<(), SfuError> {
    let drained = {
        let mut queue = p.ice_queue.lock().unwrap();
        std::mem::take(&mut *queue)
    };

    if !drained.is_empty() {
        debug!(
            media_id = media_id,
            count = drained.len(),
            "Flushing queued ICE candidates"
        );
    }

    for candidate in drained {
        p.mcs
            .add_ice_candidate(media_id, &candidate)
            .await
            .map_err(from_mcs)?;
    }
    Ok(())
}

/// Consume the MCS media-event stream for one media id
fn spawn_event_task(
    p: &EndpointParams,
    media_id: &str,
    watchdogs: Arc<MediaWatchdogs>,
) -> JoinHandle<()> {
    let mut events = p.mcs.media_events(media_id);
    let outbox = Arc::clone(&p.outbox);
    let commands = p.commands.clone();
    let kind = p.kind;
    let key = p.key.clone();

    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                MediaServerEvent::MediaStateChanged(MediaState::Connected) => {
                    watchdogs.clear_state();
                }
                MediaServerEvent::MediaStateChanged(MediaState::Disconnected) => {
                    watchdogs.arm_state();
                }
                MediaServerEvent::MediaFlowInStateChange(flow)
                | MediaServerEvent::MediaFlowOutStateChange(flow) => match flow {
                    FlowState::Flowing => {
                        watchdogs.clear_flow();
                        outbox.send(ClientFrame::media_flowing()).await;
                    }
                    FlowState::NotFlowing => watchdogs.arm_flow(),
                },
                MediaServerEvent::OnIceCandidate(candidate) => {
                    outbox.send(ClientFrame::IceCandidate { candidate }).await;
                }
                MediaServerEvent::ServerOffline => {
                    metrics::count_error(kind, "event", SfuErrorCode::MediaServerOffline);
                    outbox.send_error(SfuErrorCode::MediaServerOffline).await;
                    let _ = commands.send(ManagerCommand::CloseSession { key: key.clone() });
                }
            }
        }
    })
}
