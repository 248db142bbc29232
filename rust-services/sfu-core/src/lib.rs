//! SFU Session Core
//!
//! Session-management core of the Confero selective forwarding unit. For
//! each client request arriving on the message bus the core authorizes it
//! against meeting state, allocates or reuses a server-side media session,
//! negotiates SDP with the Media Control Server, bridges the session into
//! the per-meeting consumer fabric, and drives it through its lifecycle:
//! ICE trickling, media-flow watchdogs, media-server outages, and client
//! disconnection.
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


pub mod bridge;
pub mod endpoint;
pub mod errors;
pub mod lifecycle;
pub mod manager;
pub mod metrics;
pub mod outbox;
pub mod permissions;
pub mod session;
pub mod sources;
pub mod watchdog;
