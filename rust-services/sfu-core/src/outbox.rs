//! Client-facing channel publisher
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


use confero_types::{ClientFrame, MediaKind, SfuErrorCode};
use message_bus_client::{subjects, MessageBusClient};
use std::sync::Arc;
use tracing::warn;

/// Publishes frames on one connection's client-facing channel.
///
/// Sends are best-effort: the client may already be gone, so failures are
/// logged and swallowed rather than propagated.
pub struct ClientOutbox {
    bus: Arc<dyn MessageBusClient>,
    kind: MediaKind,
    connection_id: String,
    channel: String,
}

impl ClientOutbox {
    pub fn new(bus: Arc<dyn MessageBusClient>, kind: MediaKind, connection_id: &str) -> Self {
        ClientOutbox {
            bus,
            kind,
            channel: subjects::client_channel(connection_id),
            connection_id: connection_id.to_string(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub async fn send(&self, frame: ClientFrame) {
        let payload = match serde_json::to_value(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(frame = frame.frame_id(), error = %e, "Failed to encode client frame");
                return;
            }
        };
        if let Err(e) = self.bus.publish_json(&self.channel, &payload).await {
            warn!(
                channel = self.channel,
                frame = frame.frame_id(),
                error = %e,
                "Failed to publish client frame"
            );
        }
    }

    pub async fn send_error(&self, code: SfuErrorCode) {
        self.send(ClientFrame::error(self.kind, code)).await;
    }
}
