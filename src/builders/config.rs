//! Configuration Builder
//!
//! Fluent builder for engine configuration.

use secrecy::SecretString;
use std::time::Duration;

use crate::error::{ConfigurationError, FlowError, FlowResult};
use crate::types::{
    ClientAuthMethod, Credentials, EngineConfig, ProviderEndpoints, DEFAULT_MAX_POLL_ATTEMPTS,
    DEFAULT_POLL_INTERVAL,
};

/// Engine configuration builder.
#[derive(Default)]
pub struct EngineConfigBuilder {
    auth_base_url: Option<String>,
    environment_id: Option<String>,
    endpoints: Option<ProviderEndpoints>,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    redirect_uri: Option<String>,
    scopes: Vec<String>,
    use_pkce: bool,
    auth_method: Option<ClientAuthMethod>,
    timeout: Option<Duration>,
    base_poll_interval: Option<Duration>,
    max_poll_attempts: Option<u32>,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the authorization server base URL (endpoints derive from it
    /// together with the environment ID).
    pub fn auth_base_url(mut self, url: impl Into<String>) -> Self {
        self.auth_base_url = Some(url.into());
        self
    }

    /// Set the environment (tenant) identifier.
    pub fn environment_id(mut self, environment_id: impl Into<String>) -> Self {
        self.environment_id = Some(environment_id.into());
        self
    }

    /// Supply an explicit endpoint set (e.g. from discovery), overriding
    /// environment-based derivation.
    pub fn endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn use_pkce(mut self, use_pkce: bool) -> Self {
        self.use_pkce = use_pkce;
        self
    }

    pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_method = Some(method);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_poll_interval(mut self, interval: Duration) -> Self {
        self.base_poll_interval = Some(interval);
        self
    }

    pub fn max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = Some(attempts);
        self
    }

    /// Build the configuration, validating required fields.
    pub fn build(self) -> FlowResult<EngineConfig> {
        let client_id = self.client_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            FlowError::Configuration(ConfigurationError::MissingRequired {
                field: "client_id".to_string(),
            })
        })?;

        let environment_id = self
            .environment_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                FlowError::Configuration(ConfigurationError::MissingRequired {
                    field: "environment_id".to_string(),
                })
            })?;

        let endpoints = match self.endpoints {
            Some(endpoints) => endpoints,
            None => {
                let base = self.auth_base_url.as_deref().ok_or_else(|| {
                    FlowError::Configuration(ConfigurationError::MissingRequired {
                        field: "auth_base_url".to_string(),
                    })
                })?;
                ProviderEndpoints::for_environment(base, &environment_id)
            }
        };

        // Public PKCE clients skip client authentication by default.
        let auth_method = self.auth_method.unwrap_or(if self.use_pkce {
            ClientAuthMethod::None
        } else {
            ClientAuthMethod::ClientSecretBasic
        });

        Ok(EngineConfig {
            endpoints,
            credentials: Credentials {
                environment_id,
                client_id,
                client_secret: self.client_secret,
                redirect_uri: self.redirect_uri.unwrap_or_default(),
                scopes: self.scopes,
                use_pkce: self.use_pkce,
                auth_method,
            },
            timeout: self.timeout.unwrap_or(Duration::from_secs(30)),
            base_poll_interval: self.base_poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            max_poll_attempts: self.max_poll_attempts.unwrap_or(DEFAULT_MAX_POLL_ATTEMPTS),
        })
    }
}

/// Shorthand for [`EngineConfigBuilder::new`].
pub fn engine_config() -> EngineConfigBuilder {
    EngineConfigBuilder::new()
}
