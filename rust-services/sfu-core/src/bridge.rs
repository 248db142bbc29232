//! Softswitch bridges and the per-meeting bridge registry
//!
//! A bridge is the MCS-side leg that connects the SFU to the legacy
//! conference mixer. Publishers own a private bridge; consumers share one
//! refcounted bridge per meeting.
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


use confero_types::SfuError;
use mcs_client::{JoinParams, MediaControlServer, McsTransport, NegotiateOptions};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::errors::from_mcs;

/// Bridge lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Starting,
    Running,
    Stopped,
}

/// Negotiated MCS-side identity of a started bridge
#[derive(Debug, Clone)]
pub struct BridgeMedia {
    pub user_id: String,
    pub media_id: String,
}

/// One softswitch-side media leg
pub struct SoftswitchBridge {
    meeting_id: String,
    voice_bridge: String,
    media_server: String,
    state: Mutex<BridgeState>,
    media: OnceCell<BridgeMedia>,
}

impl SoftswitchBridge {
    pub fn new(meeting_id: &str, voice_bridge: &str, media_server: &str) -> Self {
        SoftswitchBridge {
            meeting_id: meeting_id.to_string(),
            voice_bridge: voice_bridge.to_string(),
            media_server: media_server.to_string(),
            state: Mutex::new(BridgeState::Idle),
            media: OnceCell::new(),
        }
    }

    /// Start the bridge, or await the in-flight start.
    ///
    /// Concurrent callers share a single join+publish against the MCS; a
    /// failed start leaves the bridge idle so the next caller retries.
    pub async fn start(&self, mcs: &dyn MediaControlServer) -> Result<BridgeMedia, SfuError> {
        let media = self
            .media
            .get_or_try_init(|| async {
                *self.state.lock().unwrap() = BridgeState::Starting;

                let user_id = mcs
                    .join(
                        &self.voice_bridge,
                        "SFU",
                        JoinParams {
                            external_user_id: format!("sfu-bridge-{}", self.meeting_id),
                            auto_leave: true,
                        },
                    )
                    .await
                    .map_err(from_mcs)?;

                let negotiated = mcs
                    .publish(
                        &user_id,
                        &self.voice_bridge,
                        McsTransport::Rtp,
                        NegotiateOptions {
                            adapter: self.media_server.clone(),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(from_mcs)?;

                info!(
                    meeting_id = self.meeting_id,
                    voice_bridge = self.voice_bridge,
                    media_id = negotiated.media_id,
                    "Bridge started"
                );

                Ok::<_, SfuError>(BridgeMedia {
                    user_id,
                    media_id: negotiated.media_id,
                })
            })
            .await;

        match media {
            Ok(media) => {
                *self.state.lock().unwrap() = BridgeState::Running;
                Ok(media.clone())
            }
            Err(e) => {
                *self.state.lock().unwrap() = BridgeState::Idle;
                Err(e)
            }
        }
    }

    /// Tear the bridge down; failures are logged, never raised
    pub async fn stop(&self, mcs: &dyn MediaControlServer) {
        *self.state.lock().unwrap() = BridgeState::Stopped;

        if let Some(media) = self.media.get() {
            if let Err(e) = mcs.unpublish(&media.user_id, &media.media_id).await {
                warn!(
                    meeting_id = self.meeting_id,
                    media_id = media.media_id,
                    error = %e,
                    "Bridge unpublish failed"
                );
            }
        }
    }

    pub fn state(&self) -> BridgeState {
        *self.state.lock().unwrap()
    }

    pub fn media(&self) -> Option<BridgeMedia> {
        self.media.get().cloned()
    }
}

struct BridgeSlot {
    bridge: Arc<SoftswitchBridge>,
    refs: usize,
}

/// Process-wide map from meeting id to its shared consumer bridge
#[derive(Default)]
pub struct BridgeRegistry {
    inner: Mutex<HashMap<String, BridgeSlot>>,
}

impl BridgeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire the meeting bridge, starting it on first use
    pub async fn acquire(
        &self,
        mcs: &dyn MediaControlServer,
        meeting_id: &str,
        voice_bridge: &str,
        media_server: &str,
    ) -> Result<Arc<SoftswitchBridge>, SfuError> {
        let bridge = {
            let mut inner = self.inner.lock().unwrap();
            let slot = inner.entry(meeting_id.to_string()).or_insert_with(|| {
                debug!(meeting_id = meeting_id, "Creating meeting bridge");
                BridgeSlot {
                    bridge: Arc::new(SoftswitchBridge::new(meeting_id, voice_bridge, media_server)),
                    refs: 0,
                }
            });
            slot.refs += 1;
            Arc::clone(&slot.bridge)
        };

        match bridge.start(mcs).await {
            Ok(_) => Ok(bridge),
            Err(e) => {
                self.release(mcs, meeting_id).await;
                Err(e)
            }
        }
    }

    /// Drop one reference; the last holder stops and removes the bridge
    pub async fn release(&self, mcs: &dyn MediaControlServer, meeting_id: &str) {
        let retired = {
            let mut inner = self.inner.lock().unwrap();
            match inner.get_mut(meeting_id) {
                Some(slot) => {
                    slot.refs = slot.refs.saturating_sub(1);
                    if slot.refs == 0 {
                        inner.remove(meeting_id).map(|slot| slot.bridge)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some(bridge) = retired {
            info!(meeting_id = meeting_id, "Last consumer left, stopping bridge");
            bridge.stop(mcs).await;
        }
    }

    /// Current reference count for a meeting (0 when absent)
    pub fn refs(&self, meeting_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .get(meeting_id)
            .map(|slot| slot.refs)
            .unwrap_or(0)
    }

    /// Number of live bridges for a meeting: 0 or 1
    pub fn live(&self, meeting_id: &str) -> usize {
        usize::from(self.inner.lock().unwrap().contains_key(meeting_id))
    }
}
