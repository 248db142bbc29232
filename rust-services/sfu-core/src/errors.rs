//! Error normalization helpers
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
use mcs_client::McsError;

/// Map an MCS failure into the session error taxonomy.
///
/// An unreachable or timed-out server is an outage; anything it actively
/// rejected is a failed negotiation.
pub fn from_mcs(err: McsError) -> SfuError {
    match err {
        McsError::Unreachable(_) | McsError::Timeout(_) => SfuError::MediaServerOffline,
        McsError::Rejected { method, message } => {
            SfuError::NegotiationFailed(format!("{method}: {message}"))
        }
        McsError::Serialization(e) => SfuError::NegotiationFailed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confero_types::SfuErrorCode;

    #[test]
    fn test_unreachable_is_offline() {
        let err = from_mcs(McsError::Unreachable("no route".to_string()));
        assert_eq!(err.catalogue(), SfuErrorCode::MediaServerOffline);
    }

    #[test]
    fn test_rejection_is_negotiation_failure() {
        let err = from_mcs(McsError::Rejected {
            method: "publish".to_string(),
            message: "bad sdp".to_string(),
        });
        assert_eq!(err.catalogue(), SfuErrorCode::NegotiationFailed);
    }
}
