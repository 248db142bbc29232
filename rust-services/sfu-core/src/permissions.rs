//! Permission oracle
//!
//! Boolean queries against meeting state: may this user broadcast this
//! camera, subscribe to it, or speak on this voice bridge.
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
use confero_types::{SessionRole, SfuError};
use message_bus_client::MessageBusClient;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Trait for permission oracles
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    /// May this user broadcast the given camera
    async fn check_broadcast(
        &self,
        meeting_id: &str,
        user_id: &str,
        camera_id: &str,
    ) -> Result<(), SfuError>;

    /// May this user subscribe to the given camera
    async fn check_subscribe(
        &self,
        meeting_id: &str,
        user_id: &str,
        camera_id: &str,
    ) -> Result<(), SfuError>;

    /// May this user speak on the given voice bridge
    async fn check_speak(
        &self,
        meeting_id: &str,
        user_id: &str,
        voice_bridge: &str,
    ) -> Result<(), SfuError>;
}

/// Dispatch the role-appropriate permission query
pub async fn authorize(
    oracle: &dyn PermissionOracle,
    role: SessionRole,
    meeting_id: &str,
    user_id: &str,
    resource_id: &str,
) -> Result<(), SfuError> {
    match role {
        SessionRole::Share => oracle.check_broadcast(meeting_id, user_id, resource_id).await,
        SessionRole::Viewer => oracle.check_subscribe(meeting_id, user_id, resource_id).await,
        SessionRole::SendRecv | SessionRole::RecvOnly => {
            oracle.check_speak(meeting_id, user_id, resource_id).await
        }
    }
}

#[derive(Debug, Deserialize)]
struct PermissionReply {
    #[serde(default)]
    allowed: bool,
    #[serde(default)]
    reason: Option<String>,
}

const PERMISSIONS_SUBJECT: &str = "meeting.permissions.check";

/// Oracle backed by a meeting-state request/reply on the bus
pub struct BusPermissionOracle {
    bus: Arc<dyn MessageBusClient>,
}

impl BusPermissionOracle {
    pub fn new(bus: Arc<dyn MessageBusClient>) -> Self {
        BusPermissionOracle { bus }
    }

    async fn check(
        &self,
        action: &str,
        meeting_id: &str,
        user_id: &str,
        resource_id: &str,
    ) -> Result<(), SfuError> {
        let query = json!({
            "action": action,
            "meetingId": meeting_id,
            "userId": user_id,
            "resourceId": resource_id,
        });

        let reply = match self.bus.request_json(PERMISSIONS_SUBJECT, &query).await {
            Ok(reply) => reply,
            Err(e) => {
                // An unanswerable oracle denies
                warn!(action = action, error = %e, "Permission query failed");
                return Err(SfuError::PermissionDenied("permission query failed".to_string()));
            }
        };

        let reply: PermissionReply = serde_json::from_value(reply)?;
        if reply.allowed {
            Ok(())
        } else {
            Err(SfuError::PermissionDenied(
                reply.reason.unwrap_or_else(|| action.to_string()),
            ))
        }
    }
}

#[async_trait]
impl PermissionOracle for BusPermissionOracle {
    async fn check_broadcast(
        &self,
        meeting_id: &str,
        user_id: &str,
        camera_id: &str,
    ) -> Result<(), SfuError> {
        self.check("broadcast", meeting_id, user_id, camera_id).await
    }

    async fn check_subscribe(
        &self,
        meeting_id: &str,
        user_id: &str,
        camera_id: &str,
    ) -> Result<(), SfuError> {
        self.check("subscribe", meeting_id, user_id, camera_id).await
    }

    async fn check_speak(
        &self,
        meeting_id: &str,
        user_id: &str,
        voice_bridge: &str,
    ) -> Result<(), SfuError> {
        self.check("speak", meeting_id, user_id, voice_bridge).await
    }
}
