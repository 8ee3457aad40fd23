//! Flow State
//!
//! The mutable record a flow run evolves. Mutated only by the engine's
//! transition function and read by the external UI/driver.

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use super::{DeviceAuthorizationResponse, TokenResponse, UserInfoClaims};

/// Progress of the device-authorization polling loop, as last observed.
#[derive(Clone, Debug, Default)]
pub struct PollingStatus {
    pub is_polling: bool,
    pub poll_count: u32,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// The record evolved over a single flow run. Created empty when the run
/// starts and discarded on explicit reset.
#[derive(Debug, Default)]
pub struct FlowState {
    /// Authorization request artifacts.
    pub authorization_url: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,

    /// PKCE pair. Invariant: set and cleared together, never one without
    /// the other.
    pub code_verifier: Option<String>,
    pub code_challenge: Option<String>,

    /// Single-use authorization code.
    pub authorization_code: Option<String>,

    /// Device flow artifacts.
    pub device_code: Option<String>,
    pub user_code: Option<String>,
    pub verification_uri: Option<String>,
    pub verification_uri_complete: Option<String>,
    pub device_code_expires_at: Option<DateTime<Utc>>,
    pub polling: PollingStatus,

    /// ROPC credentials, held in memory only until the exchange completes.
    pub username: Option<String>,
    pub password: Option<SecretString>,

    /// Terminal success state for the grant once populated.
    pub tokens: Option<TokenResponse>,

    /// Profile claims fetched after token receipt.
    pub user_info: Option<UserInfoClaims>,
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the PKCE pair atomically.
    pub fn set_pkce_pair(&mut self, verifier: String, challenge: String) {
        self.code_verifier = Some(verifier);
        self.code_challenge = Some(challenge);
    }

    /// Clear the PKCE pair atomically.
    pub fn clear_pkce_pair(&mut self) {
        self.code_verifier = None;
        self.code_challenge = None;
    }

    /// Record the device authorization grant and its hard expiry.
    pub fn set_device_authorization(&mut self, response: &DeviceAuthorizationResponse) {
        self.device_code = Some(response.device_code.clone());
        self.user_code = Some(response.user_code.clone());
        self.verification_uri = Some(response.verification_uri.clone());
        self.verification_uri_complete = response.verification_uri_complete.clone();
        self.device_code_expires_at =
            Some(Utc::now() + chrono::Duration::seconds(response.expires_in as i64));
    }

    /// Whether the run has reached its terminal success state.
    pub fn has_tokens(&self) -> bool {
        self.tokens
            .as_ref()
            .map(|t| !t.access_token.is_empty())
            .unwrap_or(false)
    }

    /// Drop the ROPC password once it is no longer needed.
    pub fn wipe_password(&mut self) {
        self.password = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn tokens(access_token: &str) -> TokenResponse {
        TokenResponse {
            access_token: access_token.to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
            scope: None,
            id_token: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_pkce_pair_set_and_cleared_together() {
        let mut flow_state = FlowState::new();
        flow_state.set_pkce_pair("verifier".to_string(), "challenge".to_string());
        assert!(flow_state.code_verifier.is_some());
        assert!(flow_state.code_challenge.is_some());

        flow_state.clear_pkce_pair();
        assert!(flow_state.code_verifier.is_none());
        assert!(flow_state.code_challenge.is_none());
    }

    #[test]
    fn test_has_tokens() {
        let mut flow_state = FlowState::new();
        assert!(!flow_state.has_tokens());

        flow_state.tokens = Some(tokens(""));
        assert!(!flow_state.has_tokens());

        flow_state.tokens = Some(tokens("real-token"));
        assert!(flow_state.has_tokens());
    }

    #[test]
    fn test_set_device_authorization_records_expiry() {
        let mut flow_state = FlowState::new();
        let response = DeviceAuthorizationResponse {
            device_code: "dev".to_string(),
            user_code: "ABCD".to_string(),
            verification_uri: "https://example.com/device".to_string(),
            verification_uri_complete: None,
            expires_in: 600,
            interval: None,
        };
        let before = Utc::now();
        flow_state.set_device_authorization(&response);

        let expires_at = flow_state.device_code_expires_at.unwrap();
        assert!(expires_at >= before + chrono::Duration::seconds(599));
        assert!(expires_at <= Utc::now() + chrono::Duration::seconds(601));
        assert_eq!(flow_state.device_code.as_deref(), Some("dev"));
    }
}
