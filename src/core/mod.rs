//! Core Infrastructure
//!
//! HTTP transport, entropy, PKCE lifecycle, flow-state storage, and
//! endpoint discovery.

pub mod discovery;
pub mod entropy;
pub mod pkce;
pub mod store;
pub mod transport;

pub use discovery::{DefaultDiscoveryClient, DiscoveryClient};
pub use entropy::{generate_nonce, generate_state, random_urlsafe};
pub use pkce::{compute_challenge, is_valid_verifier, PkceCodeManager, PkcePair};
pub use store::{DurableStore, InMemoryDurableStore, MockDurableStore, TieredFlowStore};
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport, ReqwestHttpTransport,
};
