//! Inbound bus message envelope and payload schemas
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

use crate::error::{SfuError, TypesResult};

/// Envelope for every message the SFU receives on the bus
///
/// Common identity fields are lifted out; id-specific fields stay in the
/// flattened payload and are extracted with [`MessageEnvelope::payload_as`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub id: String,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub meeting_id: String,
    #[serde(default)]
    pub voice_bridge: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Optional user-info header attached by the bus edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<serde_json::Value>,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    pub fn parse(raw: &[u8]) -> TypesResult<Self> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Deserialize the id-specific payload fields
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> TypesResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Fold the optional user-info header into the identity fields.
    ///
    /// A malformed header is an error under strict parsing; otherwise the
    /// message proceeds with whatever identity fields it already carried.
    pub fn apply_header(&mut self, strict: bool) -> TypesResult<()> {
        let Some(raw) = self.header.take() else {
            return Ok(());
        };
        match serde_json::from_value::<UserInfoHeader>(raw) {
            Ok(header) => {
                if self.user_id.is_empty() {
                    self.user_id = header.user_id;
                }
                if self.meeting_id.is_empty() {
                    self.meeting_id = header.meeting_id;
                }
                if self.voice_bridge.is_empty() {
                    self.voice_bridge = header.voice_bridge;
                }
                Ok(())
            }
            Err(_) if strict => Err(SfuError::MalformedHeader),
            Err(_) => Ok(()),
        }
    }
}

/// User-info header attached to messages by the bus edge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoHeader {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub meeting_id: String,
    #[serde(default)]
    pub voice_bridge: String,
}

fn default_record() -> bool {
    true
}

/// Payload of a `start` message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    /// Camera id (video sessions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    /// Caller id (audio sessions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    pub sdp_offer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(default = "default_record")]
    pub record: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_server: Option<String>,
}

/// Payload of a `subscriberAnswer` message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberAnswerPayload {
    pub answer: String,
}

/// Payload of an `onIceCandidate` message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidatePayload {
    pub candidate: serde_json::Value,
}

/// Bus event announcing a user left a meeting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftEvent {
    pub meeting_id: String,
    pub user_id: String,
}

/// Bus event announcing an external webcam source started broadcasting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebcamBroadcastEvent {
    pub user_id: String,
    pub stream: String,
}
