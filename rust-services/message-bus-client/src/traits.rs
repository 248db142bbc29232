//! Traits for message bus operations
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
use futures::Stream;
use std::pin::Pin;

use crate::error::MessageBusError;

/// A raw message delivered by the bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub subject: String,
    pub payload: serde_json::Value,
}

pub type BusStream =
    Pin<Box<dyn Stream<Item = std::result::Result<BusMessage, MessageBusError>> + Send + 'static>>;

/// Trait for message bus clients
#[async_trait]
pub trait MessageBusClient: Send + Sync {
    /// Publish a JSON payload to a subject
    async fn publish_json(
        &self,
        subject: &str,
        payload: &serde_json::Value,
    ) -> Result<(), MessageBusError>;

    /// Subscribe to a subject
    /// Returns a stream of messages; dropping the stream ends the subscription
    fn subscribe(&self, subject: &str) -> BusStream;

    /// Request/reply round trip with the configured timeout
    async fn request_json(
        &self,
        subject: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, MessageBusError>;

    /// Check if the client is connected
    async fn is_connected(&self) -> bool;

    /// Get the client type name
    fn client_type(&self) -> &str;
}
