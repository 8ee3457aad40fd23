//! Token Introspection
//!
//! RFC 7662 introspection backing the walkthrough's final step.

use base64::Engine;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::{error_from_response, ConfigurationError, FlowError, FlowResult, ProtocolError};
use crate::types::{
    ClientAuthMethod, Credentials, EngineConfig, IntrospectionResponse, TokenTypeHint,
};

/// Introspects tokens at the authorization server.
pub struct TokenIntrospector<T: HttpTransport> {
    endpoint: Option<String>,
    timeout: Duration,
    transport: Arc<T>,
}

impl<T: HttpTransport> TokenIntrospector<T> {
    pub fn new(config: &EngineConfig, transport: Arc<T>) -> Self {
        Self {
            endpoint: config.endpoints.introspection_endpoint.clone(),
            timeout: config.timeout,
            transport,
        }
    }

    /// Introspect a token, optionally with a type hint.
    pub async fn introspect(
        &self,
        credentials: &Credentials,
        token: &str,
        hint: Option<TokenTypeHint>,
    ) -> FlowResult<IntrospectionResponse> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            FlowError::Configuration(ConfigurationError::MissingRequired {
                field: "introspection_endpoint".to_string(),
            })
        })?;

        let mut params = vec![("token", token.to_string())];
        if let Some(hint) = hint {
            params.push(("token_type_hint", hint.as_str().to_string()));
        }

        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers.insert("accept".to_string(), "application/json".to_string());

        match credentials.auth_method {
            ClientAuthMethod::ClientSecretBasic => {
                if let Some(secret) = &credentials.client_secret {
                    let value =
                        format!("{}:{}", credentials.client_id, secret.expose_secret());
                    let encoded = base64::engine::general_purpose::STANDARD.encode(value);
                    headers.insert("authorization".to_string(), format!("Basic {encoded}"));
                }
            }
            ClientAuthMethod::ClientSecretPost => {
                params.push(("client_id", credentials.client_id.clone()));
                if let Some(secret) = &credentials.client_secret {
                    params.push(("client_secret", secret.expose_secret().to_string()));
                }
            }
            ClientAuthMethod::None => {
                params.push(("client_id", credentials.client_id.clone()));
            }
        }

        let body = params
            .into_iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(&v)))
            .collect::<Vec<_>>()
            .join("&");

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: endpoint.clone(),
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

    /// Check whether a token is active.
    pub async fn is_active(&self, credentials: &Credentials, token: &str) -> FlowResult<bool> {
        Ok(self.introspect(credentials, token, None).await?.active)
    }
}
