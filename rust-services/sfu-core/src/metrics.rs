//! Prometheus-style metric collectors
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


use confero_types::{MediaKind, SfuErrorCode};
use metrics::{counter, gauge};

/// Update the live session gauge for one manager
pub fn set_session_count(kind: MediaKind, count: usize) {
    gauge!(format!("sfu_{}_sessions", kind.as_str())).set(count as f64);
}

/// Count one inbound message, accepted or not
pub fn count_request(kind: MediaKind) {
    counter!(format!("sfu_{}_reqs_total", kind.as_str())).increment(1);
}

/// Count one client-visible error, labelled by method and catalogue code
pub fn count_error(kind: MediaKind, method: &str, code: SfuErrorCode) {
    counter!(
        format!("sfu_{}_errors_total", kind.as_str()),
        "method" => method.to_string(),
        "errorCode" => code.reason().to_string()
    )
    .increment(1);
}
