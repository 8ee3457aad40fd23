//! OIDC Discovery
//!
//! Fetches `/.well-known/openid-configuration` with issuer validation and
//! a TTL cache, producing the engine's endpoint set.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::core::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::{ConfigurationError, FlowError, FlowResult, ProtocolError};
use crate::types::{DiscoveryDocument, ProviderEndpoints};

struct CacheEntry {
    document: DiscoveryDocument,
    expires_at: Instant,
}

/// Discovery client interface (for dependency injection).
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Fetch the discovery document for an issuer.
    async fn fetch(&self, issuer: &str) -> FlowResult<DiscoveryDocument>;

    /// Resolve the endpoint set for an issuer.
    async fn endpoints(&self, issuer: &str) -> FlowResult<ProviderEndpoints>;

    /// Clear cached documents, for one issuer or all.
    fn clear_cache(&self, issuer: Option<&str>);
}

/// Default discovery client implementation.
pub struct DefaultDiscoveryClient<T: HttpTransport> {
    transport: T,
    cache: Mutex<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
}

impl<T: HttpTransport> DefaultDiscoveryClient<T> {
    /// Create a discovery client with a one-hour cache TTL.
    pub fn new(transport: T) -> Self {
        Self::with_cache_ttl(transport, Duration::from_secs(3600))
    }

    pub fn with_cache_ttl(transport: T, cache_ttl: Duration) -> Self {
        Self {
            transport,
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
        }
    }

    fn normalize_issuer(issuer: &str) -> String {
        issuer.trim_end_matches('/').to_string()
    }

    fn get_cached(&self, issuer: &str) -> Option<DiscoveryDocument> {
        let key = Self::normalize_issuer(issuer);
        let mut cache = self.cache.lock().unwrap();

        if let Some(entry) = cache.get(&key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.document.clone());
            }
            cache.remove(&key);
        }
        None
    }

    fn set_cached(&self, issuer: &str, document: DiscoveryDocument) {
        self.cache.lock().unwrap().insert(
            Self::normalize_issuer(issuer),
            CacheEntry {
                document,
                expires_at: Instant::now() + self.cache_ttl,
            },
        );
    }
}

#[async_trait]
impl<T: HttpTransport> DiscoveryClient for DefaultDiscoveryClient<T> {
    async fn fetch(&self, issuer: &str) -> FlowResult<DiscoveryDocument> {
        if let Some(cached) = self.get_cached(issuer) {
            return Ok(cached);
        }

        let normalized_issuer = Self::normalize_issuer(issuer);
        let discovery_url = format!("{normalized_issuer}/.well-known/openid-configuration");

        let request = HttpRequest {
            method: HttpMethod::Get,
            url: discovery_url,
            headers: [("accept".to_string(), "application/json".to_string())]
                .into_iter()
                .collect(),
            body: None,
            timeout: None,
        };

        let response = self.transport.send(request).await?;

        if response.status != 200 {
            return Err(FlowError::Configuration(
                ConfigurationError::DiscoveryFailed {
                    message: format!("discovery request failed with status {}", response.status),
                },
            ));
        }

        let document: DiscoveryDocument = serde_json::from_str(&response.body).map_err(|e| {
            FlowError::Protocol(ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })?;

        if document.authorization_endpoint.is_empty() || document.token_endpoint.is_empty() {
            return Err(FlowError::Configuration(
                ConfigurationError::DiscoveryFailed {
                    message: "discovery document missing required endpoints".to_string(),
                },
            ));
        }

        if Self::normalize_issuer(&document.issuer) != normalized_issuer {
            return Err(FlowError::Configuration(
                ConfigurationError::DiscoveryFailed {
                    message: format!(
                        "issuer mismatch: expected {normalized_issuer}, got {}",
                        document.issuer
                    ),
                },
            ));
        }

        self.set_cached(issuer, document.clone());
        Ok(document)
    }

    async fn endpoints(&self, issuer: &str) -> FlowResult<ProviderEndpoints> {
        Ok(self.fetch(issuer).await?.to_endpoints())
    }

    fn clear_cache(&self, issuer: Option<&str>) {
        let mut cache = self.cache.lock().unwrap();
        match issuer {
            Some(issuer) => {
                cache.remove(&Self::normalize_issuer(issuer));
            }
            None => cache.clear(),
        }
    }
}
