//! Configuration Types
//!
//! Flow selection, client credentials, and provider endpoint configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Grant flow walked by the engine. Immutable for the lifetime of a flow run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    AuthorizationCode,
    Implicit,
    ClientCredentials,
    DeviceCode,
    Ropc,
    Hybrid,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Implicit => "implicit",
            Self::ClientCredentials => "client_credentials",
            Self::DeviceCode => "device_code",
            Self::Ropc => "ropc",
            Self::Hybrid => "hybrid",
        }
    }

    /// Flows that send the user through an authorization redirect.
    pub fn uses_redirect(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationCode | Self::Implicit | Self::Hybrid
        )
    }

    /// Flows whose redirect returns tokens on the URL fragment.
    pub fn returns_fragment_tokens(&self) -> bool {
        matches!(self, Self::Implicit | Self::Hybrid)
    }

    /// Flows that exchange an authorization code at the token endpoint.
    pub fn exchanges_code(&self) -> bool {
        matches!(self, Self::AuthorizationCode | Self::Hybrid)
    }

    /// Flows for which a PKCE pair can participate.
    pub fn supports_pkce(&self) -> bool {
        self.exchanges_code()
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client authentication method at the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// client_id and client_secret in the request body.
    ClientSecretPost,
    /// HTTP Basic Authentication header.
    ClientSecretBasic,
    /// No client authentication (public client).
    None,
}

impl Default for ClientAuthMethod {
    fn default() -> Self {
        Self::ClientSecretBasic
    }
}

impl ClientAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSecretPost => "client_secret_post",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::None => "none",
        }
    }
}

/// Client configuration supplied by an external credential provider.
/// The engine only ever reads it.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Environment (tenant) identifier the endpoints are scoped to.
    pub environment_id: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret (confidential clients only).
    pub client_secret: Option<SecretString>,
    /// Redirect URI for redirect-based flows.
    pub redirect_uri: String,
    /// Scopes to request.
    pub scopes: Vec<String>,
    /// Whether PKCE protects the code exchange.
    pub use_pkce: bool,
    /// Client authentication method at the token endpoint.
    pub auth_method: ClientAuthMethod,
}

impl Credentials {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("environment_id", &self.environment_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("use_pkce", &self.use_pkce)
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

/// Authorization server endpoint set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Device authorization endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_authorization_endpoint: Option<String>,
    /// Token introspection endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,
    /// OIDC userinfo endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// Issuer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl ProviderEndpoints {
    /// Derive the endpoint set for an environment-scoped authorization
    /// server, e.g. `https://auth.example.com/{environment_id}/as/...`.
    pub fn for_environment(auth_base: &str, environment_id: &str) -> Self {
        let issuer = format!("{}/{}/as", auth_base.trim_end_matches('/'), environment_id);
        Self {
            authorization_endpoint: format!("{issuer}/authorize"),
            token_endpoint: format!("{issuer}/token"),
            device_authorization_endpoint: Some(format!("{issuer}/device_authorization")),
            introspection_endpoint: Some(format!("{issuer}/introspect")),
            userinfo_endpoint: Some(format!("{issuer}/userinfo")),
            issuer: Some(issuer),
        }
    }
}

/// OIDC discovery document, as served from
/// `/.well-known/openid-configuration`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
}

impl DiscoveryDocument {
    /// Convert to the engine's endpoint set.
    pub fn to_endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints {
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            device_authorization_endpoint: self.device_authorization_endpoint.clone(),
            introspection_endpoint: self.introspection_endpoint.clone(),
            userinfo_endpoint: self.userinfo_endpoint.clone(),
            issuer: Some(self.issuer.clone()),
        }
    }
}

/// Engine configuration: endpoints, credentials, and tuning knobs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub endpoints: ProviderEndpoints,
    pub credentials: Credentials,
    /// HTTP timeout per request.
    pub timeout: Duration,
    /// Base device-polling interval (RFC 8628 default is 5 seconds).
    pub base_poll_interval: Duration,
    /// Hard cap on device-polling attempts per run.
    pub max_poll_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoints: ProviderEndpoints::default(),
            credentials: Credentials::default(),
            timeout: Duration::from_secs(30),
            base_poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

/// RFC 8628 base polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Attempt budget for a single polling run (~10 minutes at the base interval).
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_type_as_str() {
        assert_eq!(FlowType::AuthorizationCode.as_str(), "authorization_code");
        assert_eq!(FlowType::DeviceCode.as_str(), "device_code");
        assert_eq!(FlowType::Ropc.as_str(), "ropc");
    }

    #[test]
    fn test_flow_type_channels() {
        assert!(FlowType::AuthorizationCode.uses_redirect());
        assert!(FlowType::Hybrid.returns_fragment_tokens());
        assert!(!FlowType::ClientCredentials.uses_redirect());
        assert!(!FlowType::Implicit.exchanges_code());
        assert!(!FlowType::Implicit.supports_pkce());
    }

    #[test]
    fn test_endpoints_for_environment() {
        let endpoints = ProviderEndpoints::for_environment("https://auth.example.com", "env-1");
        assert_eq!(
            endpoints.authorization_endpoint,
            "https://auth.example.com/env-1/as/authorize"
        );
        assert_eq!(
            endpoints.token_endpoint,
            "https://auth.example.com/env-1/as/token"
        );
        assert_eq!(
            endpoints.device_authorization_endpoint.as_deref(),
            Some("https://auth.example.com/env-1/as/device_authorization")
        );
        assert_eq!(
            endpoints.issuer.as_deref(),
            Some("https://auth.example.com/env-1/as")
        );
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let credentials = Credentials {
            client_secret: Some(SecretString::new("very-secret".to_string())),
            ..Default::default()
        };
        let debug = format!("{credentials:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_default_poll_tuning() {
        let config = EngineConfig::default();
        assert_eq!(config.base_poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_poll_attempts, 120);
    }
}
