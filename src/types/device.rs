//! Device Authorization Types
//!
//! Wire types for RFC 8628 and the events the polling loop emits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::TokenResponse;

/// Device authorization response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    /// Device verification code (not shown to the user).
    pub device_code: String,
    /// User code to display.
    pub user_code: String,
    /// URI for the user to visit.
    pub verification_uri: String,
    /// URI with the code pre-filled (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: u64,
    /// Minimum polling interval in seconds.
    #[serde(default)]
    pub interval: Option<u64>,
}

impl DeviceAuthorizationResponse {
    /// Polling interval to start with (default 5 seconds per RFC 8628).
    pub fn polling_interval(&self) -> u64 {
        self.interval.unwrap_or(5)
    }
}

/// Why a polling run expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The run exceeded its attempt budget.
    AttemptBudget,
    /// The device code's own lifetime elapsed.
    DeviceCodeLifetime,
}

/// Event emitted by the device authorization polling loop.
#[derive(Clone, Debug)]
pub enum PollEvent {
    /// `authorization_pending`: the user has not finished yet. Normal.
    Pending { attempt: u32 },
    /// `slow_down`: interval raised for all subsequent attempts in this run.
    SlowDown { attempt: u32, interval: Duration },
    /// Network-level failure; the loop continues, the attempt still counts.
    Transient { attempt: u32, message: String },
    /// Tokens arrived; the loop is over.
    Succeeded { attempt: u32, tokens: TokenResponse },
    /// Attempt budget or device-code lifetime exhausted.
    Expired { attempt: u32, reason: ExpiryReason },
    /// Terminal server error (`expired_token`, `invalid_grant`,
    /// `access_denied`, or anything else outside the expected set).
    Failed {
        attempt: u32,
        error: String,
        error_description: Option<String>,
    },
}

impl PollEvent {
    /// Check if this event ends the polling run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Expired { .. } | Self::Failed { .. }
        )
    }
}
