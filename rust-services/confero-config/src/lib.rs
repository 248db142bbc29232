//! Configuration management for Confero services
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


use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Message bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MessageBusConfig {
    pub url: String,
}

/// Media Control Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct McsConfig {
    /// Subject prefix for MCS RPCs
    pub subject_prefix: String,
    /// Per-RPC reply timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl McsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Baseline codec/bitrate descriptor for negotiated media
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MediaSpecs {
    pub codec: String,
    pub bitrate: u32,
}

/// Application configuration
///
/// Read once at startup and passed explicitly to manager construction;
/// nothing reads configuration ambiently.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub message_bus: MessageBusConfig,
    pub mcs: McsConfig,
    /// Default adapter for video publishes
    pub video_media_server: String,
    /// Baseline codec/bitrate descriptor
    pub media_specs: MediaSpecs,
    /// Reject messages with a malformed user-info header
    pub ws_strict_header_parsing: bool,
    /// Milliseconds before NOT_FLOWING becomes a client error
    pub media_flow_timeout_ms: u64,
    /// Milliseconds before DISCONNECTED becomes a client error
    pub media_state_timeout_ms: u64,
    /// Stop sessions when their owner leaves the meeting
    pub eject_on_user_left: bool,
    /// Allow the `sendrecv` audio role
    pub full_audio_enabled: bool,
    pub log_level: Option<String>,
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let message_bus_url =
            env::var("MESSAGE_BUS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            message_bus: MessageBusConfig {
                url: message_bus_url,
            },
            mcs: McsConfig {
                subject_prefix: env::var("MCS_SUBJECT_PREFIX")
                    .unwrap_or_else(|_| "mcs".to_string()),
                request_timeout_ms: env_u64("MCS_REQUEST_TIMEOUT_MS", 5000),
            },
            video_media_server: env::var("VIDEO_MEDIA_SERVER")
                .unwrap_or_else(|_| "mediasoup".to_string()),
            media_specs: MediaSpecs {
                codec: env::var("MEDIA_SPEC_CODEC").unwrap_or_else(|_| "OPUS".to_string()),
                bitrate: env_u64("MEDIA_SPEC_BITRATE", 64_000) as u32,
            },
            ws_strict_header_parsing: env_bool("WS_STRICT_HEADER_PARSING", false),
            media_flow_timeout_ms: env_u64("MEDIA_FLOW_TIMEOUT_MS", 15_000),
            media_state_timeout_ms: env_u64("MEDIA_STATE_TIMEOUT_MS", 30_000),
            eject_on_user_left: env_bool("EJECT_ON_USER_LEFT", true),
            full_audio_enabled: env_bool("FULL_AUDIO_ENABLED", false),
            log_level: Some(log_level),
        })
    }

    /// Get message bus URL
    pub fn message_bus_url(&self) -> &str {
        &self.message_bus.url
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn media_flow_timeout(&self) -> Duration {
        Duration::from_millis(self.media_flow_timeout_ms)
    }

    pub fn media_state_timeout(&self) -> Duration {
        Duration::from_millis(self.media_state_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            message_bus: MessageBusConfig {
                url: "nats://localhost:4222".to_string(),
            },
            mcs: McsConfig {
                subject_prefix: "mcs".to_string(),
                request_timeout_ms: 5000,
            },
            video_media_server: "mediasoup".to_string(),
            media_specs: MediaSpecs {
                codec: "OPUS".to_string(),
                bitrate: 64_000,
            },
            ws_strict_header_parsing: false,
            media_flow_timeout_ms: 15_000,
            media_state_timeout_ms: 30_000,
            eject_on_user_left: true,
            full_audio_enabled: false,
            log_level: Some("info".to_string()),
        }
    }
}
