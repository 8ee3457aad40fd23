//! Flow Engine
//!
//! The explicit event-driven transition function tying the components
//! together: `apply(event)` mutates the FlowState deterministically and
//! returns the side effects the driver should run. No rendering framework
//! is needed to exercise any of it.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::core::pkce::PkcePair;
use crate::core::store::{DurableStore, TieredFlowStore};
use crate::error::{FlowResult, TimeoutError};
use crate::flows::authorize::AuthorizationRequest;
use crate::registry::machine::StepStateMachine;
use crate::types::{
    CallbackData, Credentials, DeviceAuthorizationResponse, ExpiryReason, FlowState, FlowType,
    PollEvent, TokenResponse, UserInfoClaims,
};

/// A discrete action outcome fed into the engine.
#[derive(Debug)]
pub enum FlowEvent {
    /// A PKCE pair was generated for this run.
    PkceGenerated { pair: PkcePair },
    /// The authorization redirect target was built.
    AuthorizationPrepared { request: AuthorizationRequest },
    /// A redirect callback was extracted (already correlation-checked).
    CallbackExtracted { data: CallbackData },
    /// ROPC credentials were entered.
    UserCredentialsEntered {
        username: String,
        password: SecretString,
    },
    /// The device endpoint granted device/user codes.
    DeviceAuthorized {
        response: DeviceAuthorizationResponse,
    },
    /// The polling loop emitted an event.
    PollObserved { event: PollEvent },
    /// The polling loop was cancelled by the user.
    PollingStopped,
    /// The token endpoint issued tokens.
    TokensReceived { tokens: TokenResponse },
    /// Userinfo claims arrived.
    UserInfoReceived { claims: UserInfoClaims },
    /// Explicit flow reset; the state record is discarded.
    Reset,
}

/// Work the driver must carry out after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SideEffect {
    /// Persist the current PKCE pair under the flow ID.
    PersistPkcePair,
    /// Persist the correlation checkpoint (state/nonce) under the flow ID.
    PersistCheckpoint,
    /// Fetch userinfo claims with this access token.
    FetchUserInfo { access_token: String },
    /// Remove everything persisted for the flow ID.
    ClearPersisted,
}

/// One flow run: identity, step machine, and the evolving state record.
pub struct FlowEngine {
    flow_id: String,
    flow_type: FlowType,
    credentials: Credentials,
    machine: StepStateMachine,
    flow_state: FlowState,
}

impl FlowEngine {
    pub fn new(flow_id: impl Into<String>, flow_type: FlowType, credentials: Credentials) -> Self {
        let machine = StepStateMachine::new(flow_type, credentials.use_pkce);
        Self {
            flow_id: flow_id.into(),
            flow_type,
            credentials,
            machine,
            flow_state: FlowState::new(),
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow_type
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn flow_state(&self) -> &FlowState {
        &self.flow_state
    }

    pub fn machine(&self) -> &StepStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut StepStateMachine {
        &mut self.machine
    }

    /// Validation errors for the current step, recomputed from state.
    pub fn validate_current(&self) -> Vec<String> {
        self.machine
            .validate(self.machine.current_step(), &self.flow_state, &self.credentials)
    }

    /// Completed steps, derived from current validity.
    pub fn completed_steps(&self) -> BTreeSet<usize> {
        self.machine
            .completed_steps(&self.flow_state, &self.credentials)
    }

    /// Apply one event, returning the side effects the driver should run.
    pub fn apply(&mut self, event: FlowEvent) -> Vec<SideEffect> {
        match event {
            FlowEvent::PkceGenerated { pair } => {
                self.flow_state.set_pkce_pair(pair.verifier, pair.challenge);
                vec![SideEffect::PersistPkcePair]
            }
            FlowEvent::AuthorizationPrepared { request } => {
                self.flow_state.authorization_url = Some(request.url);
                self.flow_state.state = Some(request.state);
                self.flow_state.nonce = request.nonce;
                vec![SideEffect::PersistCheckpoint]
            }
            FlowEvent::CallbackExtracted { data } => {
                if let Some(code) = data.authorization_code {
                    self.flow_state.authorization_code = Some(code);
                }
                if let Some(access_token) = data.access_token {
                    // Fragment tokens are the terminal grant result for
                    // implicit (and the front-channel half of hybrid).
                    let tokens = TokenResponse {
                        access_token,
                        token_type: data.token_type.unwrap_or_else(|| "Bearer".to_string()),
                        expires_in: data.expires_in,
                        refresh_token: None,
                        scope: None,
                        id_token: data.id_token,
                        extra: HashMap::new(),
                    };
                    return self.tokens_received(tokens);
                }
                Vec::new()
            }
            FlowEvent::UserCredentialsEntered { username, password } => {
                self.flow_state.username = Some(username);
                self.flow_state.password = Some(password);
                Vec::new()
            }
            FlowEvent::DeviceAuthorized { response } => {
                self.flow_state.set_device_authorization(&response);
                Vec::new()
            }
            FlowEvent::PollObserved { event } => self.poll_observed(event),
            FlowEvent::PollingStopped => {
                self.flow_state.polling.is_polling = false;
                Vec::new()
            }
            FlowEvent::TokensReceived { tokens } => self.tokens_received(tokens),
            FlowEvent::UserInfoReceived { claims } => {
                self.flow_state.user_info = Some(claims);
                Vec::new()
            }
            FlowEvent::Reset => {
                debug!(flow_id = %self.flow_id, "flow reset");
                self.flow_state = FlowState::new();
                self.machine.reset();
                vec![SideEffect::ClearPersisted]
            }
        }
    }

    fn poll_observed(&mut self, event: PollEvent) -> Vec<SideEffect> {
        let polling = &mut self.flow_state.polling;
        polling.last_polled_at = Some(chrono::Utc::now());

        match event {
            PollEvent::Pending { attempt } | PollEvent::SlowDown { attempt, .. } => {
                polling.is_polling = true;
                polling.poll_count = attempt;
                polling.error = None;
                Vec::new()
            }
            PollEvent::Transient { attempt, message } => {
                polling.is_polling = true;
                polling.poll_count = attempt;
                polling.error = Some(message);
                Vec::new()
            }
            PollEvent::Succeeded { attempt, tokens } => {
                polling.is_polling = false;
                polling.poll_count = attempt;
                polling.error = None;
                self.tokens_received(tokens)
            }
            PollEvent::Expired { attempt, reason } => {
                // Timeout is kept distinguishable from a protocol failure so
                // the driver can offer "request a new code".
                let timeout = match reason {
                    ExpiryReason::AttemptBudget => TimeoutError::AttemptBudget { attempts: attempt },
                    ExpiryReason::DeviceCodeLifetime => TimeoutError::DeviceCodeExpired {
                        expired_at: self
                            .flow_state
                            .device_code_expires_at
                            .unwrap_or_else(chrono::Utc::now),
                    },
                };
                polling.is_polling = false;
                polling.poll_count = attempt;
                polling.error = Some(timeout.to_string());
                Vec::new()
            }
            PollEvent::Failed { attempt, error, .. } => {
                polling.is_polling = false;
                polling.poll_count = attempt;
                polling.error = Some(error);
                Vec::new()
            }
        }
    }

    fn tokens_received(&mut self, tokens: TokenResponse) -> Vec<SideEffect> {
        let wants_userinfo = tokens.has_scope("openid") || self.credentials.has_scope("openid");
        let access_token = tokens.access_token.clone();

        self.flow_state.tokens = Some(tokens);
        // ROPC credentials live only until the exchange completes.
        self.flow_state.wipe_password();

        if wants_userinfo && !access_token.is_empty() {
            vec![SideEffect::FetchUserInfo { access_token }]
        } else {
            Vec::new()
        }
    }
}

/// Correlation artifacts persisted across a redirect round-trip.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCheckpoint {
    pub state: Option<String>,
    pub nonce: Option<String>,
}

impl FlowCheckpoint {
    pub fn capture(flow_state: &FlowState) -> Self {
        Self {
            state: flow_state.state.clone(),
            nonce: flow_state.nonce.clone(),
        }
    }

    pub fn restore(self, flow_state: &mut FlowState) {
        flow_state.state = self.state;
        flow_state.nonce = self.nonce;
    }
}

fn checkpoint_key(flow_id: &str) -> String {
    format!("checkpoint/{flow_id}")
}

/// Persist the correlation checkpoint for a flow.
pub async fn save_checkpoint<S: DurableStore>(
    store: &TieredFlowStore<S>,
    flow_id: &str,
    flow_state: &FlowState,
) -> FlowResult<()> {
    let checkpoint = FlowCheckpoint::capture(flow_state);
    let value = serde_json::to_string(&checkpoint).map_err(|e| {
        crate::error::FlowError::Storage(crate::error::StorageError::WriteFailed {
            message: e.to_string(),
        })
    })?;
    store.put(&checkpoint_key(flow_id), value).await
}

/// Load a previously persisted checkpoint, if any.
pub async fn load_checkpoint<S: DurableStore>(
    store: &TieredFlowStore<S>,
    flow_id: &str,
) -> FlowResult<Option<FlowCheckpoint>> {
    let Some(value) = store.get(&checkpoint_key(flow_id)).await? else {
        return Ok(None);
    };
    serde_json::from_str(&value).map(Some).map_err(|e| {
        crate::error::FlowError::Storage(crate::error::StorageError::CorruptedData {
            key: checkpoint_key(flow_id),
            message: e.to_string(),
        })
    })
}

/// Remove the persisted checkpoint.
pub async fn clear_checkpoint<S: DurableStore>(
    store: &TieredFlowStore<S>,
    flow_id: &str,
) -> FlowResult<()> {
    store.delete(&checkpoint_key(flow_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::InMemoryDurableStore;
    use crate::types::{ClientAuthMethod, ExpiryReason};

    fn credentials() -> Credentials {
        Credentials {
            environment_id: "env-1".to_string(),
            client_id: "client-1".to_string(),
            client_secret: None,
            redirect_uri: "https://app.example.com/callback".to_string(),
            scopes: vec!["openid".to_string()],
            use_pkce: true,
            auth_method: ClientAuthMethod::None,
        }
    }

    fn tokens(scope: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "tok".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
            scope: scope.map(String::from),
            id_token: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_pkce_generated_persists_pair() {
        let mut engine = FlowEngine::new("flow-1", FlowType::AuthorizationCode, credentials());
        let effects = engine.apply(FlowEvent::PkceGenerated {
            pair: PkcePair {
                verifier: "v".repeat(43),
                challenge: "c".to_string(),
            },
        });

        assert_eq!(effects, vec![SideEffect::PersistPkcePair]);
        assert!(engine.flow_state().code_verifier.is_some());
        assert!(engine.flow_state().code_challenge.is_some());
    }

    #[test]
    fn test_authorization_prepared_checkpoints_correlation() {
        let mut engine = FlowEngine::new("flow-1", FlowType::AuthorizationCode, credentials());
        let effects = engine.apply(FlowEvent::AuthorizationPrepared {
            request: AuthorizationRequest {
                url: "https://auth.example.com/authorize?x=1".to_string(),
                state: "state-1".to_string(),
                nonce: Some("nonce-1".to_string()),
            },
        });

        assert_eq!(effects, vec![SideEffect::PersistCheckpoint]);
        assert_eq!(engine.flow_state().state.as_deref(), Some("state-1"));
        assert_eq!(engine.flow_state().nonce.as_deref(), Some("nonce-1"));
    }

    #[test]
    fn test_callback_with_code_sets_code_only() {
        let mut engine = FlowEngine::new("flow-1", FlowType::AuthorizationCode, credentials());
        let effects = engine.apply(FlowEvent::CallbackExtracted {
            data: CallbackData {
                authorization_code: Some("code-1".to_string()),
                ..Default::default()
            },
        });

        assert!(effects.is_empty());
        assert_eq!(
            engine.flow_state().authorization_code.as_deref(),
            Some("code-1")
        );
        assert!(!engine.flow_state().has_tokens());
    }

    #[test]
    fn test_fragment_tokens_are_terminal_and_fetch_userinfo() {
        let mut engine = FlowEngine::new("flow-1", FlowType::Implicit, credentials());
        let effects = engine.apply(FlowEvent::CallbackExtracted {
            data: CallbackData {
                access_token: Some("tok".to_string()),
                id_token: Some("idt".to_string()),
                token_type: Some("Bearer".to_string()),
                expires_in: Some(3600),
                ..Default::default()
            },
        });

        assert_eq!(
            effects,
            vec![SideEffect::FetchUserInfo {
                access_token: "tok".to_string()
            }]
        );
        assert!(engine.flow_state().has_tokens());
        assert_eq!(
            engine.flow_state().tokens.as_ref().unwrap().id_token.as_deref(),
            Some("idt")
        );
    }

    #[test]
    fn test_tokens_received_wipes_password() {
        let mut engine = FlowEngine::new("flow-1", FlowType::Ropc, credentials());
        engine.apply(FlowEvent::UserCredentialsEntered {
            username: "alice".to_string(),
            password: SecretString::new("hunter2".to_string()),
        });
        assert!(engine.flow_state().password.is_some());

        engine.apply(FlowEvent::TokensReceived {
            tokens: tokens(Some("openid")),
        });
        assert!(engine.flow_state().password.is_none());
        assert_eq!(engine.flow_state().username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_no_userinfo_fetch_without_openid() {
        let mut creds = credentials();
        creds.scopes = vec!["api:read".to_string()];
        let mut engine = FlowEngine::new("flow-1", FlowType::ClientCredentials, creds);

        let effects = engine.apply(FlowEvent::TokensReceived {
            tokens: tokens(Some("api:read")),
        });
        assert!(effects.is_empty());
    }

    #[test]
    fn test_poll_events_update_status() {
        let mut engine = FlowEngine::new("flow-1", FlowType::DeviceCode, credentials());

        engine.apply(FlowEvent::PollObserved {
            event: PollEvent::Pending { attempt: 3 },
        });
        assert!(engine.flow_state().polling.is_polling);
        assert_eq!(engine.flow_state().polling.poll_count, 3);
        assert!(engine.flow_state().polling.last_polled_at.is_some());

        let effects = engine.apply(FlowEvent::PollObserved {
            event: PollEvent::Succeeded {
                attempt: 4,
                tokens: tokens(Some("openid")),
            },
        });
        assert!(!engine.flow_state().polling.is_polling);
        assert_eq!(engine.flow_state().polling.poll_count, 4);
        assert!(engine.flow_state().has_tokens());
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_poll_expiry_records_error() {
        let mut engine = FlowEngine::new("flow-1", FlowType::DeviceCode, credentials());
        engine.apply(FlowEvent::PollObserved {
            event: PollEvent::Expired {
                attempt: 120,
                reason: ExpiryReason::AttemptBudget,
            },
        });
        assert!(!engine.flow_state().polling.is_polling);
        assert!(engine.flow_state().polling.error.is_some());
    }

    #[test]
    fn test_polling_stopped_is_deterministic() {
        let mut engine = FlowEngine::new("flow-1", FlowType::DeviceCode, credentials());
        engine.apply(FlowEvent::PollObserved {
            event: PollEvent::Pending { attempt: 1 },
        });
        engine.apply(FlowEvent::PollingStopped);
        assert!(!engine.flow_state().polling.is_polling);
    }

    #[test]
    fn test_reset_discards_state_and_clears_persistence() {
        let mut engine = FlowEngine::new("flow-1", FlowType::AuthorizationCode, credentials());
        engine.apply(FlowEvent::TokensReceived {
            tokens: tokens(None),
        });
        engine.machine_mut().go_to(2).unwrap();

        let effects = engine.apply(FlowEvent::Reset);
        assert_eq!(effects, vec![SideEffect::ClearPersisted]);
        assert!(!engine.flow_state().has_tokens());
        assert_eq!(engine.machine().current_step(), 0);
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip() {
        let store = TieredFlowStore::new(InMemoryDurableStore::new());
        let mut flow_state = FlowState::new();
        flow_state.state = Some("state-1".to_string());
        flow_state.nonce = Some("nonce-1".to_string());

        save_checkpoint(&store, "flow-1", &flow_state).await.unwrap();

        let checkpoint = load_checkpoint(&store, "flow-1").await.unwrap().unwrap();
        assert_eq!(checkpoint.state.as_deref(), Some("state-1"));

        let mut restored = FlowState::new();
        checkpoint.restore(&mut restored);
        assert_eq!(restored.state.as_deref(), Some("state-1"));
        assert_eq!(restored.nonce.as_deref(), Some("nonce-1"));

        clear_checkpoint(&store, "flow-1").await.unwrap();
        assert!(load_checkpoint(&store, "flow-1").await.unwrap().is_none());
    }
}
