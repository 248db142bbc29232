//! Media Control Server Client
//!
//! Typed facade over the Media Control Server RPC surface. The MCS owns the
//! actual RTP endpoints and the softswitch bridge; this crate only negotiates
//! with it and relays its events.
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


pub mod error;
pub mod events;
pub mod nats;
pub mod traits;

pub use error::*;
pub use events::*;
pub use traits::*;
