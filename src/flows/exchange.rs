//! Token Exchange Coordinator
//!
//! Exchanges an authorization code (or direct-grant credentials) for tokens
//! exactly once, with readiness validation before any network call.

use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::core::pkce::PkceCodeManager;
use crate::core::store::DurableStore;
use crate::core::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::{error_from_response, FlowError, FlowResult, ProtocolError};
use crate::types::{
    ClientAuthMethod, Credentials, EngineConfig, FlowState, FlowType, TokenResponse,
};

/// Coordinates token-endpoint grants for one flow session.
pub struct TokenExchangeCoordinator<T: HttpTransport, S: DurableStore> {
    token_endpoint: String,
    timeout: Duration,
    transport: Arc<T>,
    pkce: Arc<PkceCodeManager<S>>,
}

impl<T: HttpTransport, S: DurableStore> TokenExchangeCoordinator<T, S> {
    pub fn new(config: &EngineConfig, transport: Arc<T>, pkce: Arc<PkceCodeManager<S>>) -> Self {
        Self {
            token_endpoint: config.endpoints.token_endpoint.clone(),
            timeout: config.timeout,
            transport,
            pkce,
        }
    }

    /// Exchange the authorization code held in `flow_state` for tokens.
    ///
    /// Exactly-once: when the flow already holds tokens, the code has been
    /// consumed and a second submission would be rejected by the server
    /// anyway. Fail fast locally instead of making a doomed call.
    pub async fn exchange(
        &self,
        flow_id: &str,
        flow_type: FlowType,
        credentials: &Credentials,
        flow_state: &FlowState,
    ) -> FlowResult<TokenResponse> {
        if flow_state.has_tokens() {
            return Err(FlowError::validation(
                "tokens already issued for this flow; the authorization code is single-use",
            ));
        }

        let mut errors = Vec::new();

        if !flow_type.exchanges_code() {
            errors.push(format!(
                "flow {flow_type} does not exchange an authorization code"
            ));
        }
        if flow_state.authorization_code.is_none() {
            errors.push("Authorization code is required".to_string());
        }

        // Redirect round-trips may land in a context that lost the in-memory
        // verifier; fall back to the persisted pair before giving up.
        let mut verifier = flow_state.code_verifier.clone();
        if credentials.use_pkce && verifier.is_none() {
            verifier = self.pkce.load(flow_id).await?.map(|pair| pair.verifier);
            if verifier.is_none() {
                errors.push("PKCE is enabled but no code verifier is available".to_string());
            }
        }

        if credentials.client_id.is_empty() {
            errors.push("Client ID is required".to_string());
        }
        if credentials.environment_id.is_empty() {
            errors.push("Environment ID is required".to_string());
        }
        if !credentials.use_pkce && credentials.redirect_uri.is_empty() {
            errors.push("Redirect URI is required when PKCE is not used".to_string());
        }

        if !errors.is_empty() {
            return Err(FlowError::Validation(errors));
        }

        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("client_id", credentials.client_id.clone()),
        ];
        if let Some(code) = &flow_state.authorization_code {
            params.push(("code", code.clone()));
        }
        if credentials.use_pkce {
            if let Some(verifier) = verifier {
                params.push(("code_verifier", verifier));
            }
        } else {
            params.push(("redirect_uri", credentials.redirect_uri.clone()));
        }

        debug!(flow = %flow_type, "exchanging authorization code for tokens");
        self.post_token(params, credentials).await
    }

    /// Direct grants: client_credentials and ROPC. Same
    /// precondition-then-exchange contract, without a code or verifier.
    pub async fn request_direct(
        &self,
        flow_type: FlowType,
        credentials: &Credentials,
        username: Option<&str>,
        password: Option<&SecretString>,
    ) -> FlowResult<TokenResponse> {
        let mut errors = Vec::new();

        if credentials.client_id.is_empty() {
            errors.push("Client ID is required".to_string());
        }
        if credentials.environment_id.is_empty() {
            errors.push("Environment ID is required".to_string());
        }
        if credentials.auth_method != ClientAuthMethod::None
            && credentials.client_secret.is_none()
        {
            errors.push("Client secret is required".to_string());
        }

        let mut params = match flow_type {
            FlowType::ClientCredentials => {
                vec![("grant_type", "client_credentials".to_string())]
            }
            FlowType::Ropc => {
                if username.is_none() {
                    errors.push("Username is required".to_string());
                }
                if password.is_none() {
                    errors.push("Password is required".to_string());
                }
                let mut params = vec![("grant_type", "password".to_string())];
                if let (Some(username), Some(password)) = (username, password) {
                    params.push(("username", username.to_string()));
                    params.push(("password", password.expose_secret().to_string()));
                }
                params
            }
            other => {
                return Err(FlowError::validation(format!(
                    "flow {other} is not a direct grant"
                )))
            }
        };

        if !errors.is_empty() {
            return Err(FlowError::Validation(errors));
        }

        if !credentials.scopes.is_empty() {
            params.push(("scope", credentials.scopes.join(" ")));
        }
        if credentials.auth_method != ClientAuthMethod::ClientSecretBasic {
            params.push(("client_id", credentials.client_id.clone()));
        }

        debug!(flow = %flow_type, "requesting tokens via direct grant");
        self.post_token(params, credentials).await
    }

    /// RFC 6749 §6 refresh-token grant.
    pub async fn refresh(
        &self,
        credentials: &Credentials,
        refresh_token: &str,
    ) -> FlowResult<TokenResponse> {
        if refresh_token.is_empty() {
            return Err(FlowError::validation("Refresh token is required"));
        }

        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", credentials.client_id.clone()),
        ];

        debug!("refreshing tokens");
        self.post_token(params, credentials).await
    }

    async fn post_token(
        &self,
        mut params: Vec<(&str, String)>,
        credentials: &Credentials,
    ) -> FlowResult<TokenResponse> {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers.insert("accept".to_string(), "application/json".to_string());

        match credentials.auth_method {
            ClientAuthMethod::ClientSecretBasic => {
                if let Some(secret) = &credentials.client_secret {
                    let value = format!(
                        "{}:{}",
                        credentials.client_id,
                        secret.expose_secret()
                    );
                    let encoded = base64::engine::general_purpose::STANDARD.encode(value);
                    headers.insert("authorization".to_string(), format!("Basic {encoded}"));
                }
            }
            ClientAuthMethod::ClientSecretPost => {
                if let Some(secret) = &credentials.client_secret {
                    params.push(("client_secret", secret.expose_secret().to_string()));
                }
            }
            ClientAuthMethod::None => {}
        }

        let body = params
            .into_iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(&v)))
            .collect::<Vec<_>>()
            .join("&");

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.token_endpoint.clone(),
            headers,
            body: Some(body),
            timeout: Some(self.timeout),
        };

        let response = self.transport.send(request).await?;

        if response.status != 200 {
            return Err(error_from_response(response.status, &response.body));
        }

        serde_json::from_str(&response.body).map_err(|e| {
            FlowError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })
    }
}
