//! Media watchdogs
//!
//! Two one-shot timers per endpoint: one armed while media flow is absent,
//! one armed while the media state is disconnected. Arming an armed
//! watchdog is a no-op; each clears on its positive transition and on stop.
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


use confero_types::SfuErrorCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::metrics;
use crate::outbox::ClientOutbox;

pub struct MediaWatchdogs {
    flow_timeout: Duration,
    state_timeout: Duration,
    outbox: Arc<ClientOutbox>,
    flow: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<Option<JoinHandle<()>>>,
}

impl MediaWatchdogs {
    pub fn new(flow_timeout: Duration, state_timeout: Duration, outbox: Arc<ClientOutbox>) -> Self {
        MediaWatchdogs {
            flow_timeout,
            state_timeout,
            outbox,
            flow: Mutex::new(None),
            state: Mutex::new(None),
        }
    }

    /// Arm the media-flow watchdog (no-op while armed)
    pub fn arm_flow(&self) {
        Self::arm(&self.flow, self.flow_timeout, &self.outbox, "flow");
    }

    /// Arm the media-state watchdog (no-op while armed)
    pub fn arm_state(&self) {
        Self::arm(&self.state, self.state_timeout, &self.outbox, "state");
    }

    pub fn clear_flow(&self) {
        Self::clear(&self.flow);
    }

    pub fn clear_state(&self) {
        Self::clear(&self.state);
    }

    /// Clear both watchdogs unconditionally
    pub fn stop(&self) {
        self.clear_flow();
        self.clear_state();
    }

    fn arm(
        slot: &Mutex<Option<JoinHandle<()>>>,
        timeout: Duration,
        outbox: &Arc<ClientOutbox>,
        which: &'static str,
    ) {
        let mut guard = slot.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let outbox = Arc::clone(outbox);
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(
                connection_id = outbox.connection_id(),
                watchdog = which,
                "Media watchdog expired"
            );
            metrics::count_error(outbox.kind(), "event", SfuErrorCode::MediaTimeout);
            outbox.send_error(SfuErrorCode::MediaTimeout).await;
        }));
    }

    fn clear(slot: &Mutex<Option<JoinHandle<()>>>) {
        if let Some(handle) = slot.lock().unwrap().take() {
            handle.abort();
        }
    }
}
