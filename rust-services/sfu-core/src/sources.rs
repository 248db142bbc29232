//! External webcam source tracking
//!
//! SIP-dialed webcam sources announce themselves on the bus; camera
//! sessions consult this table to resolve the actual media source name.
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


use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// Reserved user-id prefix for SIP-dialed webcam sources
pub const EXTERNAL_SOURCE_PREFIX: &str = "v_";

const SIP_SUFFIX: &str = "|SIP";

/// Append-mostly registry of external webcam sources.
///
/// Entries are keyed by both the original stream name and the announcing
/// user id; they are never removed during normal operation, and reads
/// tolerate racing a concurrent registration.
#[derive(Default)]
pub struct SourceRegistry {
    inner: Mutex<HashMap<String, String>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_external_user(user_id: &str) -> bool {
        user_id.starts_with(EXTERNAL_SOURCE_PREFIX)
    }

    /// Register a broadcasting external source
    pub fn register(&self, user_id: &str, stream: &str) {
        let normalized = stream.strip_suffix(SIP_SUFFIX).unwrap_or(stream).to_string();

        info!(
            user_id = user_id,
            stream = stream,
            source = normalized,
            "Registered external webcam source"
        );

        let mut inner = self.inner.lock().unwrap();
        inner.insert(stream.to_string(), normalized.clone());
        inner.insert(user_id.to_string(), normalized);
    }

    /// Resolve a stream name or user id to the actual media source
    pub fn resolve(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get(key).cloned()
    }
}
