//! Error types and the client-facing error catalogue
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
use thiserror::Error;

/// Fixed catalogue of errors that may reach a client
///
/// Every failure surfaced to a client carries one of these codes and its
/// textual reason; internal error text is never forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SfuErrorCode {
    MediaServerOffline,
    SfuInvalidRequest,
    PermissionDenied,
    NegotiationFailed,
    MediaTimeout,
}

impl SfuErrorCode {
    pub fn code(&self) -> u32 {
        match self {
            SfuErrorCode::MediaServerOffline => 2001,
            SfuErrorCode::SfuInvalidRequest => 2200,
            SfuErrorCode::PermissionDenied => 2201,
            SfuErrorCode::NegotiationFailed => 2210,
            SfuErrorCode::MediaTimeout => 2211,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            SfuErrorCode::MediaServerOffline => "MEDIA_SERVER_OFFLINE",
            SfuErrorCode::SfuInvalidRequest => "SFU_INVALID_REQUEST",
            SfuErrorCode::PermissionDenied => "PERMISSION_DENIED",
            SfuErrorCode::NegotiationFailed => "NEGOTIATION_FAILED",
            SfuErrorCode::MediaTimeout => "MEDIA_TIMEOUT",
        }
    }
}

/// Errors raised while handling client sessions
#[derive(Error, Debug)]
pub enum SfuError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("media server offline")]
    MediaServerOffline,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("media timeout")]
    MediaTimeout,

    #[error("malformed user-info header")]
    MalformedHeader,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SfuError {
    /// Normalize to the client-facing catalogue
    pub fn catalogue(&self) -> SfuErrorCode {
        match self {
            SfuError::MediaServerOffline => SfuErrorCode::MediaServerOffline,
            SfuError::PermissionDenied(_) => SfuErrorCode::PermissionDenied,
            SfuError::NegotiationFailed(_) => SfuErrorCode::NegotiationFailed,
            SfuError::MediaTimeout => SfuErrorCode::MediaTimeout,
            SfuError::InvalidRequest(_)
            | SfuError::MalformedHeader
            | SfuError::Serialization(_) => SfuErrorCode::SfuInvalidRequest,
        }
    }
}

pub type TypesResult<T> = std::result::Result<T, SfuError>;
