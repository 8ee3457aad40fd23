//! Flow Operations
//!
//! The protocol-exchange components a walkthrough drives: authorization
//! request building, callback extraction, token exchange, and device
//! authorization polling.

pub mod authorize;
pub mod callback;
pub mod device;
pub mod exchange;

pub use authorize::{AuthorizationRequest, AuthorizationRequestBuilder};
pub use callback::CallbackExtractor;
pub use device::{DeviceAuthorizationPoller, PollEvents, StartPoll};
pub use exchange::TokenExchangeCoordinator;
