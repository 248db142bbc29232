//! NATS implementation of the message bus client
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
use bytes::Bytes;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{error, info};

use crate::error::{MessageBusError, Result};
use crate::traits::{BusMessage, BusStream, MessageBusClient};

/// NATS message bus client
///
/// Signaling traffic is ephemeral; the client deliberately uses core NATS
/// subjects without JetStream persistence.
pub struct NatsClient {
    client: async_nats::Client,
}

impl NatsClient {
    /// Create a new NATS client
    pub async fn new(url: &str) -> Result<Self> {
        info!(url = url, "Connecting to NATS server");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| MessageBusError::Connection(e.to_string()))?;

        info!("NATS client initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl MessageBusClient for NatsClient {
    async fn publish_json(&self, subject: &str, payload: &serde_json::Value) -> Result<()> {
        let bytes = serde_json::to_vec(payload).map_err(MessageBusError::Serialization)?;

        self.client
            .publish(subject.to_string(), Bytes::from(bytes))
            .await
            .map_err(|e| MessageBusError::Publish(e.to_string()))?;

        Ok(())
    }

    fn subscribe(&self, subject: &str) -> BusStream {
        let subject = subject.to_string();

        info!(subject = subject, "Subscribing to bus subject");

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<BusMessage>>(100);
        let client = self.client.clone();

        // Spawn a task to pump the subscription into the stream
        tokio::spawn(async move {
            match client.subscribe(subject.clone()).await {
                Ok(mut subscriber) => {
                    while let Some(msg) = subscriber.next().await {
                        let item = serde_json::from_slice::<serde_json::Value>(&msg.payload)
                            .map(|payload| BusMessage {
                                subject: msg.subject.to_string(),
                                payload,
                            })
                            .map_err(MessageBusError::Serialization);

                        if let Err(ref e) = item {
                            error!(subject = subject, error = %e, "Failed to decode bus message");
                        }
                        if tx.send(item).await.is_err() {
                            // Receiver dropped, end the subscription
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(subject = subject, error = %e, "Failed to create subscription");
                    let _ = tx
                        .send(Err(MessageBusError::Subscribe(e.to_string())))
                        .await;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn request_json(
        &self,
        subject: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let bytes = serde_json::to_vec(payload).map_err(MessageBusError::Serialization)?;

        let reply = self
            .client
            .request(subject.to_string(), Bytes::from(bytes))
            .await
            .map_err(|e| MessageBusError::Request(e.to_string()))?;

        serde_json::from_slice(&reply.payload).map_err(MessageBusError::Serialization)
    }

    async fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    fn client_type(&self) -> &str {
        "nats"
    }
}
