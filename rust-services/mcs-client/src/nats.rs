//! NATS request/reply implementation of the MCS facade
//!
//! RPCs ride `<prefix>.rpc.<method>` subjects as JSON request/reply; media
//! events arrive on `<prefix>.event.media.<mediaId>` and process status on
//! `<prefix>.status`.
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
use confero_types::MediaKind;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::{McsError, McsResult};
use crate::events::{MediaServerEvent, ServerStatusEvent};
use crate::traits::{
    JoinParams, MediaControlServer, MediaEventStream, NegotiateOptions, NegotiatedMedia,
    McsTransport, ServerEventStream,
};

/// Reply envelope for MCS RPCs
#[derive(Debug, Deserialize)]
struct McsReply {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: serde_json::Value,
}

/// NATS-backed MCS client
pub struct NatsMcsClient {
    client: async_nats::Client,
    subject_prefix: String,
    request_timeout: Duration,
}

impl NatsMcsClient {
    /// Connect to the MCS over its NATS fabric
    pub async fn connect(
        url: &str,
        subject_prefix: &str,
        request_timeout: Duration,
    ) -> McsResult<Self> {
        info!(url = url, prefix = subject_prefix, "Connecting to MCS fabric");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| McsError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            subject_prefix: subject_prefix.to_string(),
            request_timeout,
        })
    }

    fn rpc_subject(&self, method: &str) -> String {
        format!("{}.rpc.{}", self.subject_prefix, method)
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> McsResult<T> {
        let subject = self.rpc_subject(method);
        let payload = serde_json::to_vec(&params).map_err(McsError::Serialization)?;

        debug!(method = method, "MCS rpc");

        let reply = tokio::time::timeout(
            self.request_timeout,
            self.client.request(subject, Bytes::from(payload)),
        )
        .await
        .map_err(|_| McsError::Timeout(method.to_string()))?
        .map_err(|e| McsError::Unreachable(e.to_string()))?;

        let reply: McsReply =
            serde_json::from_slice(&reply.payload).map_err(McsError::Serialization)?;

        if let Some(message) = reply.error {
            return Err(McsError::Rejected {
                method: method.to_string(),
                message,
            });
        }

        serde_json::from_value(reply.result).map_err(McsError::Serialization)
    }

    fn event_stream<T: DeserializeOwned + Send + 'static>(
        &self,
        subject: String,
    ) -> Pin<Box<dyn futures::Stream<Item = T> + Send + 'static>> {
        let (tx, rx) = tokio::sync::mpsc::channel::<T>(64);
        let client = self.client.clone();

        tokio::spawn(async move {
            match client.subscribe(subject.clone()).await {
                Ok(mut subscriber) => {
                    while let Some(msg) = subscriber.next().await {
                        match serde_json::from_slice::<T>(&msg.payload) {
                            Ok(event) => {
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(subject = subject, error = %e, "Undecodable MCS event")
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(subject = subject, error = %e, "Failed to subscribe to MCS events")
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

#[async_trait]
impl MediaControlServer for NatsMcsClient {
    async fn wait_for_connection(&self) -> bool {
        self.rpc::<serde_json::Value>("ping", json!({})).await.is_ok()
    }

    async fn join(&self, room: &str, user_name: &str, params: JoinParams) -> McsResult<String> {
        self.rpc(
            "join",
            json!({
                "room": room,
                "userName": user_name,
                "params": params,
            }),
        )
        .await
    }

    async fn publish(
        &self,
        user_id: &str,
        room: &str,
        transport: McsTransport,
        options: NegotiateOptions,
    ) -> McsResult<NegotiatedMedia> {
        self.rpc(
            "publish",
            json!({
                "userId": user_id,
                "room": room,
                "transport": transport,
                "options": options,
            }),
        )
        .await
    }

    async fn subscribe(
        &self,
        user_id: &str,
        source_media_id: &str,
        transport: McsTransport,
        options: NegotiateOptions,
    ) -> McsResult<NegotiatedMedia> {
        self.rpc(
            "subscribe",
            json!({
                "userId": user_id,
                "sourceMediaId": source_media_id,
                "transport": transport,
                "options": options,
            }),
        )
        .await
    }

    async fn consume(
        &self,
        source_media_id: &str,
        sink_media_id: &str,
        kind: MediaKind,
    ) -> McsResult<String> {
        self.rpc(
            "consume",
            json!({
                "sourceMediaId": source_media_id,
                "sinkMediaId": sink_media_id,
                "kind": kind.mcs_name(),
            }),
        )
        .await
    }

    async fn connect(
        &self,
        source_media_id: &str,
        sink_media_id: &str,
        kind: MediaKind,
    ) -> McsResult<()> {
        self.rpc::<serde_json::Value>(
            "connect",
            json!({
                "sourceMediaId": source_media_id,
                "sinkMediaId": sink_media_id,
                "kind": kind.mcs_name(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        media_id: &str,
        candidate: &serde_json::Value,
    ) -> McsResult<()> {
        self.rpc::<serde_json::Value>(
            "addIceCandidate",
            json!({
                "mediaId": media_id,
                "candidate": candidate,
            }),
        )
        .await?;
        Ok(())
    }

    async fn unpublish(&self, user_id: &str, media_id: &str) -> McsResult<()> {
        self.rpc::<serde_json::Value>(
            "unpublish",
            json!({
                "userId": user_id,
                "mediaId": media_id,
            }),
        )
        .await?;
        Ok(())
    }

    async fn restart_ice(&self, media_id: &str) -> McsResult<String> {
        self.rpc("restartIce", json!({ "mediaId": media_id })).await
    }

    async fn dtmf(&self, media_id: &str, tones: &str) -> McsResult<String> {
        self.rpc(
            "dtmf",
            json!({
                "mediaId": media_id,
                "tones": tones,
            }),
        )
        .await
    }

    fn media_events(&self, media_id: &str) -> MediaEventStream {
        self.event_stream::<MediaServerEvent>(format!(
            "{}.event.media.{}",
            self.subject_prefix, media_id
        ))
    }

    fn server_events(&self) -> ServerEventStream {
        self.event_stream::<ServerStatusEvent>(format!("{}.status", self.subject_prefix))
    }
}
