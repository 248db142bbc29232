//! Error types for MCS operations
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


use thiserror::Error;

/// Errors that can occur talking to the Media Control Server
#[derive(Error, Debug)]
pub enum McsError {
    #[error("MCS unreachable: {0}")]
    Unreachable(String),

    #[error("MCS request timed out: {0}")]
    Timeout(String),

    #[error("MCS rejected {method}: {message}")]
    Rejected { method: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type McsResult<T> = std::result::Result<T, McsError>;
