//! Bus subject layout for the SFU
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


/// Inbound client traffic for the audio manager
pub const SFU_AUDIO: &str = "sfu.audio";

/// Inbound client traffic for the video manager
pub const SFU_VIDEO: &str = "sfu.video";

/// Meeting event: an external webcam source started broadcasting
pub const WEBCAM_BROADCAST_STARTED: &str = "meeting.webcam-broadcast-started";

/// Client-facing channel for one connection
pub fn client_channel(connection_id: &str) -> String {
    format!("sfu.client.{connection_id}")
}

/// Meeting event subject for one user leaving
pub fn user_left(user_id: &str) -> String {
    format!("meeting.user-left.{user_id}")
}
