//! Outbound frames published on the client-facing channel
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

use crate::error::SfuErrorCode;
use crate::session::{MediaKind, SessionRole};

pub const MEDIA_FLOWING: &str = "MEDIA_FLOWING";

/// Body of an error frame: numeric code plus catalogue reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u32,
    pub reason: String,
}

impl From<SfuErrorCode> for ErrorBody {
    fn from(code: SfuErrorCode) -> Self {
        ErrorBody {
            code: code.code(),
            reason: code.reason().to_string(),
        }
    }
}

/// Frames the SFU publishes to `sfu.client.<connectionId>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id")]
pub enum ClientFrame {
    #[serde(rename = "startResponse", rename_all = "camelCase")]
    StartResponse {
        #[serde(rename = "type")]
        media_type: MediaKind,
        role: SessionRole,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        camera_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caller_id: Option<String>,
        sdp_answer: String,
    },

    #[serde(rename = "iceCandidate")]
    IceCandidate { candidate: serde_json::Value },

    #[serde(rename = "webRTCAudioSuccess")]
    AudioSuccess { success: String },

    #[serde(rename = "webRTCAudioError")]
    AudioError { error: ErrorBody },

    #[serde(rename = "videoError")]
    VideoError { error: ErrorBody },

    /// Server-initiated termination notice
    #[serde(rename = "close")]
    Close,
}

impl ClientFrame {
    /// Error frame of the right flavor for the media type
    pub fn error(kind: MediaKind, code: SfuErrorCode) -> Self {
        let error = ErrorBody::from(code);
        match kind {
            MediaKind::Audio => ClientFrame::AudioError { error },
            MediaKind::Video => ClientFrame::VideoError { error },
        }
    }

    pub fn media_flowing() -> Self {
        ClientFrame::AudioSuccess {
            success: MEDIA_FLOWING.to_string(),
        }
    }

    /// Frame id as it appears on the wire
    pub fn frame_id(&self) -> &'static str {
        match self {
            ClientFrame::StartResponse { .. } => "startResponse",
            ClientFrame::IceCandidate { .. } => "iceCandidate",
            ClientFrame::AudioSuccess { .. } => "webRTCAudioSuccess",
            ClientFrame::AudioError { .. } => "webRTCAudioError",
            ClientFrame::VideoError { .. } => "videoError",
            ClientFrame::Close => "close",
        }
    }
}
