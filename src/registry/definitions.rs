//! Flow Definition Registry
//!
//! The single source of truth for step topology. Every component that needs
//! "which step am I" asks here; step indices are never computed elsewhere.

use crate::types::FlowType;

/// A step in a flow walkthrough.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Enter environment, client, and scope configuration.
    Configure,
    /// Generate and persist the PKCE pair.
    Pkce,
    /// Build the authorization request URL.
    AuthorizationRequest,
    /// Receive and extract the redirect callback.
    Callback,
    /// Exchange the authorization code for tokens.
    TokenExchange,
    /// Enter resource-owner credentials (ROPC).
    UserCredentials,
    /// Request tokens directly from the token endpoint.
    RequestToken,
    /// Request a device and user code.
    DeviceAuthorization,
    /// Wait for the user to authorize on a second device (polling).
    UserAuthorization,
    /// Inspect the received tokens.
    Tokens,
    /// Introspect the access token.
    Introspect,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Pkce => "pkce",
            Self::AuthorizationRequest => "authorization_request",
            Self::Callback => "callback",
            Self::TokenExchange => "token_exchange",
            Self::UserCredentials => "user_credentials",
            Self::RequestToken => "request_token",
            Self::DeviceAuthorization => "device_authorization",
            Self::UserAuthorization => "user_authorization",
            Self::Tokens => "tokens",
            Self::Introspect => "introspect",
        }
    }
}

const AUTHORIZATION_CODE: &[StepKind] = &[
    StepKind::Configure,
    StepKind::AuthorizationRequest,
    StepKind::Callback,
    StepKind::TokenExchange,
    StepKind::Tokens,
    StepKind::Introspect,
];

const AUTHORIZATION_CODE_PKCE: &[StepKind] = &[
    StepKind::Configure,
    StepKind::Pkce,
    StepKind::AuthorizationRequest,
    StepKind::Callback,
    StepKind::TokenExchange,
    StepKind::Tokens,
    StepKind::Introspect,
];

const IMPLICIT: &[StepKind] = &[
    StepKind::Configure,
    StepKind::AuthorizationRequest,
    StepKind::Callback,
    StepKind::Tokens,
    StepKind::Introspect,
];

const CLIENT_CREDENTIALS: &[StepKind] = &[
    StepKind::Configure,
    StepKind::RequestToken,
    StepKind::Tokens,
    StepKind::Introspect,
];

const ROPC: &[StepKind] = &[
    StepKind::Configure,
    StepKind::UserCredentials,
    StepKind::RequestToken,
    StepKind::Tokens,
    StepKind::Introspect,
];

const DEVICE_CODE: &[StepKind] = &[
    StepKind::Configure,
    StepKind::DeviceAuthorization,
    StepKind::UserAuthorization,
    StepKind::Tokens,
    StepKind::Introspect,
];

/// The ordered step sequence for a flow. PKCE only shapes the topology of
/// flows that exchange an authorization code.
pub fn steps(flow_type: FlowType, use_pkce: bool) -> &'static [StepKind] {
    match flow_type {
        FlowType::AuthorizationCode | FlowType::Hybrid => {
            if use_pkce {
                AUTHORIZATION_CODE_PKCE
            } else {
                AUTHORIZATION_CODE
            }
        }
        FlowType::Implicit => IMPLICIT,
        FlowType::ClientCredentials => CLIENT_CREDENTIALS,
        FlowType::Ropc => ROPC,
        FlowType::DeviceCode => DEVICE_CODE,
    }
}

/// Number of steps in a flow.
pub fn total_steps(flow_type: FlowType, use_pkce: bool) -> usize {
    steps(flow_type, use_pkce).len()
}

/// Index of a step kind within a flow, if the flow has it.
pub fn step_index(flow_type: FlowType, use_pkce: bool, kind: StepKind) -> Option<usize> {
    steps(flow_type, use_pkce).iter().position(|&s| s == kind)
}

/// Step kind at an index within a flow, if in range.
pub fn step_kind(flow_type: FlowType, use_pkce: bool, index: usize) -> Option<StepKind> {
    steps(flow_type, use_pkce).get(index).copied()
}
