//! Trait definition for the Media Control Server facade
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


use async_trait::async_trait;
use confero_types::MediaKind;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::McsResult;
use crate::events::{MediaServerEvent, ServerStatusEvent};

/// Transport type of a negotiated media session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum McsTransport {
    Webrtc,
    Rtp,
}

/// Parameters for joining a room on the MCS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinParams {
    pub external_user_id: String,
    pub auto_leave: bool,
}

/// Options for `publish`/`subscribe` negotiations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateOptions {
    /// SDP descriptor (absent for plain RTP legs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
    /// Target adapter name in the MCS
    pub adapter: String,
    /// Content source name, resolved through source tracking for video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub rtp_header_extensions: Vec<String>,
    #[serde(default)]
    pub override_router_codecs: bool,
    #[serde(default)]
    pub dedicated_router: bool,
    /// Reuse an already-negotiated media id (renegotiation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(default)]
    pub record: bool,
}

/// Result of a successful `publish`/`subscribe` negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiatedMedia {
    pub media_id: String,
    pub answer: String,
}

pub type MediaEventStream = Pin<Box<dyn Stream<Item = MediaServerEvent> + Send + 'static>>;
pub type ServerEventStream = Pin<Box<dyn Stream<Item = ServerStatusEvent> + Send + 'static>>;

/// Trait for Media Control Server clients
///
/// One implementation speaks to the production MCS; tests substitute
/// recording stubs.
#[async_trait]
pub trait MediaControlServer: Send + Sync {
    /// Probe MCS liveness; false means the server is unreachable
    async fn wait_for_connection(&self) -> bool;

    /// Join a room, returning the MCS-side user id
    async fn join(&self, room: &str, user_name: &str, params: JoinParams) -> McsResult<String>;

    /// Publish media into a room, returning the media id and SDP answer
    async fn publish(
        &self,
        user_id: &str,
        room: &str,
        transport: McsTransport,
        options: NegotiateOptions,
    ) -> McsResult<NegotiatedMedia>;

    /// Subscribe to an existing media source
    async fn subscribe(
        &self,
        user_id: &str,
        source_media_id: &str,
        transport: McsTransport,
        options: NegotiateOptions,
    ) -> McsResult<NegotiatedMedia>;

    /// Consume one media into another, returning the SDP answer
    async fn consume(
        &self,
        source_media_id: &str,
        sink_media_id: &str,
        kind: MediaKind,
    ) -> McsResult<String>;

    /// Connect two negotiated medias in one direction
    async fn connect(
        &self,
        source_media_id: &str,
        sink_media_id: &str,
        kind: MediaKind,
    ) -> McsResult<()>;

    async fn add_ice_candidate(
        &self,
        media_id: &str,
        candidate: &serde_json::Value,
    ) -> McsResult<()>;

    async fn unpublish(&self, user_id: &str, media_id: &str) -> McsResult<()>;

    /// Restart ICE on a negotiated media, returning the fresh SDP
    async fn restart_ice(&self, media_id: &str) -> McsResult<String>;

    /// Relay DTMF tones, returning the accepted tone string
    async fn dtmf(&self, media_id: &str, tones: &str) -> McsResult<String>;

    /// Events for one media id (`MEDIA_STATE`, `MEDIA_STATE_ICE` channels)
    fn media_events(&self, media_id: &str) -> MediaEventStream;

    /// Process-level MCS status events (`MCS_DISCONNECTED`)
    fn server_events(&self) -> ServerEventStream;
}
