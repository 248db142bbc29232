//! Events emitted by the Media Control Server
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


use serde::{Deserialize, Serialize};

/// Connection state of a negotiated media session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaState {
    Connected,
    Disconnected,
}

/// Media flow state in one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    Flowing,
    NotFlowing,
}

/// Per-media event, delivered on the media event channel of one media id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "details")]
pub enum MediaServerEvent {
    MediaStateChanged(MediaState),
    MediaFlowInStateChange(FlowState),
    MediaFlowOutStateChange(FlowState),
    /// Server-side trickle candidate to relay to the client
    OnIceCandidate(serde_json::Value),
    /// The MCS declared this media dead; the endpoint is gone
    #[serde(rename = "MEDIA_SERVER_OFFLINE")]
    ServerOffline,
}

/// Process-level MCS status event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatusEvent {
    McsConnected,
    McsDisconnected,
}
