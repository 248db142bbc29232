//! Session identity types
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
use std::fmt;
use std::str::FromStr;

use crate::error::{SfuError, TypesResult};

/// Media type handled by a manager instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// Media type name as the MCS expects it
    pub fn mcs_name(&self) -> &'static str {
        match self {
            MediaKind::Audio => "AUDIO",
            MediaKind::Video => "VIDEO",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a client session
///
/// `Share`/`SendRecv` are publisher roles; `Viewer`/`RecvOnly` are
/// subscriber roles attached to the shared meeting bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Share,
    Viewer,
    SendRecv,
    RecvOnly,
}

impl SessionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRole::Share => "share",
            SessionRole::Viewer => "viewer",
            SessionRole::SendRecv => "sendrecv",
            SessionRole::RecvOnly => "recvonly",
        }
    }

    /// Publisher roles own a media id on the MCS and a softswitch bridge
    pub fn is_publisher(&self) -> bool {
        matches!(self, SessionRole::Share | SessionRole::SendRecv)
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionRole {
    type Err = SfuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "share" => Ok(SessionRole::Share),
            "viewer" => Ok(SessionRole::Viewer),
            "sendrecv" => Ok(SessionRole::SendRecv),
            "recvonly" => Ok(SessionRole::RecvOnly),
            other => Err(SfuError::InvalidRequest(format!("unknown role: {other}"))),
        }
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl SessionStatus {
    /// A session is ready while it is starting or started
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionStatus::Starting | SessionStatus::Started)
    }
}

/// Composite session key: `(userId, resourceId, role)`
///
/// `resource_id` is the camera id for video sessions and the voice bridge
/// for audio sessions. The string form is the canonical key for the session
/// table and all queue lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub resource_id: String,
    pub role: SessionRole,
}

impl SessionKey {
    pub fn new(
        user_id: impl Into<String>,
        resource_id: impl Into<String>,
        role: SessionRole,
    ) -> Self {
        SessionKey {
            user_id: user_id.into(),
            resource_id: resource_id.into(),
            role,
        }
    }

    /// Parse a role string, rejecting anything outside the closed role set
    pub fn parse_role(role: &str) -> TypesResult<SessionRole> {
        role.parse()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.user_id, self.resource_id, self.role)
    }
}
