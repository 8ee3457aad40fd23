//! UserInfo Client
//!
//! OIDC userinfo fetch performed after token receipt.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::{error_from_response, ConfigurationError, FlowError, FlowResult, ProtocolError};
use crate::types::{EngineConfig, UserInfoClaims};

/// Fetches profile claims with a Bearer access token.
pub struct UserInfoClient<T: HttpTransport> {
    endpoint: Option<String>,
    timeout: Duration,
    transport: Arc<T>,
}

impl<T: HttpTransport> UserInfoClient<T> {
    pub fn new(config: &EngineConfig, transport: Arc<T>) -> Self {
        Self {
            endpoint: config.endpoints.userinfo_endpoint.clone(),
            timeout: config.timeout,
            transport,
        }
    }

    pub async fn fetch(&self, access_token: &str) -> FlowResult<UserInfoClaims> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            FlowError::Configuration(ConfigurationError::MissingRequired {
                field: "userinfo_endpoint".to_string(),
            })
        })?;

        let mut headers = HashMap::new();
        headers.insert(
            "authorization".to_string(),
            format!("Bearer {access_token}"),
        );
        headers.insert("accept".to_string(), "application/json".to_string());

        let request = HttpRequest {
            method: HttpMethod::Get,
            url: endpoint.clone(),
            headers,
            body: None,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockHttpTransport;
    use crate::types::ProviderEndpoints;

    fn config() -> EngineConfig {
        EngineConfig {
            endpoints: ProviderEndpoints::for_environment("https://auth.example.com", "env-1"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_sends_bearer_token() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            200,
            &serde_json::json!({"sub": "user-1", "email": "u@example.com"}),
        );

        let client = UserInfoClient::new(&config(), Arc::clone(&transport));
        let claims = client.fetch("access-token-1").await.unwrap();
        assert_eq!(claims.sub, "user-1");

        let request = transport.get_last_request().unwrap();
        assert_eq!(
            request.headers.get("authorization").unwrap(),
            "Bearer access-token-1"
        );
        assert_eq!(request.method, HttpMethod::Get);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(401, &serde_json::json!({"error": "invalid_token"}));

        let client = UserInfoClient::new(&config(), Arc::clone(&transport));
        assert!(client.fetch("stale").await.is_err());
    }
}
