//! OAuth2/OIDC Flow Walkthrough Engine
//!
//! Orchestrates interactive OAuth 2.0 / OpenID Connect grant flows one step
//! at a time, executing the real protocol exchanges against a live
//! authorization server.
//!
//! # Features
//!
//! - Authorization Code Flow, with and without PKCE (RFC 6749 §4.1, RFC 7636)
//! - Implicit and OIDC Hybrid flows (fragment-channel callbacks)
//! - Client Credentials Flow (RFC 6749 §4.4)
//! - Resource Owner Password Credentials Flow (RFC 6749 §4.3)
//! - Device Authorization Flow with cancellable polling (RFC 8628)
//! - Token Refresh (RFC 6749 §6) and Introspection (RFC 7662)
//! - OIDC Discovery and userinfo
//!
//! # Example
//!
//! ```rust,ignore
//! use oauth2_flow_engine::{
//!     engine_config, AuthorizationRequestBuilder, FlowEngine, FlowEvent, FlowType,
//! };
//!
//! let config = engine_config()
//!     .auth_base_url("https://auth.example.com")
//!     .environment_id("my-environment")
//!     .client_id("my-client-id")
//!     .redirect_uri("https://myapp.com/callback")
//!     .add_scope("openid")
//!     .use_pkce(true)
//!     .build()?;
//!
//! let mut engine = FlowEngine::new(
//!     "flow-1",
//!     FlowType::AuthorizationCode,
//!     config.credentials.clone(),
//! );
//!
//! let builder = AuthorizationRequestBuilder::new(config.endpoints.clone());
//! // ... drive the walkthrough: generate PKCE, build the URL, apply events.
//! ```
//!
//! # Architecture
//!
//! - `types`: flow, credential, token, callback, and device data structures
//! - `error`: error hierarchy and OAuth error-response mapping
//! - `core`: HTTP transport, entropy, PKCE lifecycle, tiered flow store,
//!   discovery
//! - `registry`: step topology (the single source of truth for step
//!   indices) and the step state machine
//! - `flows`: authorization request builder, callback extractor, token
//!   exchange coordinator, device authorization poller
//! - `token`: post-token operations (introspection, userinfo)
//! - `engine`: the event-driven transition function tying it together
//! - `builders`: fluent configuration builder

pub mod builders;
pub mod core;
pub mod engine;
pub mod error;
pub mod flows;
pub mod registry;
pub mod token;
pub mod types;

// Re-export the engine
pub use engine::{
    clear_checkpoint, load_checkpoint, save_checkpoint, FlowCheckpoint, FlowEngine, FlowEvent,
    SideEffect,
};

// Re-export builders
pub use builders::{engine_config, EngineConfigBuilder};

// Re-export errors
pub use error::{
    error_from_response, parse_oauth_error, ConfigurationError, CorrelationError, FlowError,
    FlowResult, NetworkError, OAuthErrorResponse, ProtocolError, StorageError, TimeoutError,
};

// Re-export types
pub use types::{
    CallbackData, ClientAuthMethod, Credentials, DeviceAuthorizationResponse, DiscoveryDocument,
    EngineConfig, ExpiryReason, FlowState, FlowType, FragmentCallback, IntrospectionResponse,
    PollEvent, PollingStatus, ProviderEndpoints, QueryCallback, TokenResponse, TokenTypeHint,
    UserInfoClaims, DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL,
};

// Re-export core components
pub use crate::core::{
    // Transport
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport, ReqwestHttpTransport,
    // Store
    DurableStore, InMemoryDurableStore, MockDurableStore, TieredFlowStore,
    // PKCE
    PkceCodeManager, PkcePair,
    // Discovery
    DefaultDiscoveryClient, DiscoveryClient,
};

// Re-export flows
pub use flows::{
    AuthorizationRequest, AuthorizationRequestBuilder, CallbackExtractor,
    DeviceAuthorizationPoller, PollEvents, StartPoll, TokenExchangeCoordinator,
};

// Re-export registry
pub use registry::{step_index, step_kind, steps, total_steps, StepKind, StepStateMachine};

// Re-export token operations
pub use token::{TokenIntrospector, UserInfoClient};
