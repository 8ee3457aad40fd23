//! Flow Engine Types

mod callback;
mod config;
mod device;
mod flow;
mod introspection;
mod token;

pub use callback::{CallbackData, FragmentCallback, QueryCallback};
pub use config::{
    ClientAuthMethod, Credentials, DiscoveryDocument, EngineConfig, FlowType, ProviderEndpoints,
    DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL,
};
pub use device::{DeviceAuthorizationResponse, ExpiryReason, PollEvent};
pub use flow::{FlowState, PollingStatus};
pub use introspection::{IntrospectionResponse, TokenTypeHint, UserInfoClaims};
pub use token::TokenResponse;
