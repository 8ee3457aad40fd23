//! Authorization Request Builder
//!
//! Builds the authorization redirect target and its correlation values.
//! Pure apart from entropy: persistence of `state`/`nonce` into FlowState
//! is the caller's responsibility.

use url::Url;

use crate::core::entropy::{generate_nonce, generate_state};
use crate::core::pkce::PkcePair;
use crate::error::{ConfigurationError, FlowError, FlowResult};
use crate::types::{Credentials, FlowType, ProviderEndpoints};

/// Result of building an authorization request.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
    /// The URL to redirect the user to.
    pub url: String,
    /// CSRF correlation value.
    pub state: String,
    /// ID-token replay protection value, for flows that return one.
    pub nonce: Option<String>,
}

/// Builds authorization redirect URLs for redirect-based flows.
pub struct AuthorizationRequestBuilder {
    endpoints: ProviderEndpoints,
}

impl AuthorizationRequestBuilder {
    pub fn new(endpoints: ProviderEndpoints) -> Self {
        Self { endpoints }
    }

    /// Build the redirect target plus fresh `state`/`nonce` values.
    ///
    /// Fails with a configuration error when the flow does not redirect, or
    /// when PKCE is enabled but no pair has been generated yet.
    pub fn build(
        &self,
        flow_type: FlowType,
        credentials: &Credentials,
        pkce: Option<&PkcePair>,
    ) -> FlowResult<AuthorizationRequest> {
        if !flow_type.uses_redirect() {
            return Err(FlowError::Configuration(
                ConfigurationError::NotRedirectBased {
                    flow: flow_type.to_string(),
                },
            ));
        }

        if credentials.use_pkce && flow_type.supports_pkce() && pkce.is_none() {
            return Err(FlowError::Configuration(ConfigurationError::PkceRequired));
        }

        let mut url = Url::parse(&self.endpoints.authorization_endpoint).map_err(|_| {
            FlowError::Configuration(ConfigurationError::InvalidEndpoint {
                url: self.endpoints.authorization_endpoint.clone(),
            })
        })?;

        let state = generate_state();
        let nonce = if wants_nonce(flow_type, credentials) {
            Some(generate_nonce())
        } else {
            None
        };

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", response_type(flow_type));
            query.append_pair("client_id", &credentials.client_id);
            query.append_pair("redirect_uri", &credentials.redirect_uri);
            if !credentials.scopes.is_empty() {
                query.append_pair("scope", &credentials.scopes.join(" "));
            }
            query.append_pair("state", &state);
            if let Some(nonce) = &nonce {
                query.append_pair("nonce", nonce);
            }
            if let Some(pair) = pkce.filter(|_| flow_type.supports_pkce() && credentials.use_pkce)
            {
                query.append_pair("code_challenge", &pair.challenge);
                query.append_pair("code_challenge_method", "S256");
            }
        }

        Ok(AuthorizationRequest {
            url: url.into(),
            state,
            nonce,
        })
    }
}

fn response_type(flow_type: FlowType) -> &'static str {
    match flow_type {
        FlowType::Implicit => "token id_token",
        FlowType::Hybrid => "code id_token",
        _ => "code",
    }
}

fn wants_nonce(flow_type: FlowType, credentials: &Credentials) -> bool {
    match flow_type {
        // These return an ID token on the front channel.
        FlowType::Implicit | FlowType::Hybrid => true,
        // Code flow gets one back from the token endpoint with openid scope.
        FlowType::AuthorizationCode => credentials.has_scope("openid"),
        _ => false,
    }
}
