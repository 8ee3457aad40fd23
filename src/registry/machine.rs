//! Step State Machine
//!
//! Tracks the current step of a flow walkthrough and gates forward
//! navigation on per-step validation. Completion is a derived fact: a step
//! is complete iff its validation currently returns no errors, recomputed
//! from FlowState every time, never toggled and left stale.

use std::collections::BTreeSet;

use crate::registry::definitions::{step_kind, steps, total_steps, StepKind};
use crate::error::{FlowError, FlowResult};
use crate::types::{ClientAuthMethod, Credentials, FlowState, FlowType};

/// Step navigation and validation for one flow run.
#[derive(Clone, Debug)]
pub struct StepStateMachine {
    flow_type: FlowType,
    use_pkce: bool,
    current: usize,
}

impl StepStateMachine {
    pub fn new(flow_type: FlowType, use_pkce: bool) -> Self {
        Self {
            flow_type,
            use_pkce,
            current: 0,
        }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow_type
    }

    pub fn total_steps(&self) -> usize {
        total_steps(self.flow_type, self.use_pkce)
    }

    pub fn current_step(&self) -> usize {
        self.current
    }

    pub fn current_kind(&self) -> StepKind {
        // current is maintained in [0, total_steps)
        step_kind(self.flow_type, self.use_pkce, self.current)
            .expect("current step index out of range")
    }

    /// Jump to a step. Rejects indices outside `[0, total_steps)`.
    pub fn go_to(&mut self, step: usize) -> FlowResult<()> {
        if step >= self.total_steps() {
            return Err(FlowError::validation(format!(
                "step {step} is out of range for {} ({} steps)",
                self.flow_type,
                self.total_steps()
            )));
        }
        self.current = step;
        Ok(())
    }

    /// Advance one step. Forward navigation is gated on the current step
    /// validating cleanly.
    pub fn go_next(
        &mut self,
        flow_state: &FlowState,
        credentials: &Credentials,
    ) -> FlowResult<usize> {
        let errors = self.validate(self.current, flow_state, credentials);
        if !errors.is_empty() {
            return Err(FlowError::Validation(errors));
        }
        if self.current + 1 >= self.total_steps() {
            return Err(FlowError::validation("already at the final step"));
        }
        self.current += 1;
        Ok(self.current)
    }

    /// Go back one step. Always allowed.
    pub fn go_previous(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }

    /// Validate a step by index. Out-of-range indices validate to a single
    /// range error rather than panicking.
    pub fn validate(
        &self,
        step: usize,
        flow_state: &FlowState,
        credentials: &Credentials,
    ) -> Vec<String> {
        match step_kind(self.flow_type, self.use_pkce, step) {
            Some(kind) => validate_step(kind, self.flow_type, self.use_pkce, flow_state, credentials),
            None => vec![format!("step {step} is out of range")],
        }
    }

    /// The set of currently-complete steps, derived from validation. A step
    /// whose backing data was cleared drops out of this set automatically.
    pub fn completed_steps(
        &self,
        flow_state: &FlowState,
        credentials: &Credentials,
    ) -> BTreeSet<usize> {
        steps(self.flow_type, self.use_pkce)
            .iter()
            .enumerate()
            .filter(|(i, _)| self.validate(*i, flow_state, credentials).is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_complete(
        &self,
        step: usize,
        flow_state: &FlowState,
        credentials: &Credentials,
    ) -> bool {
        self.validate(step, flow_state, credentials).is_empty()
    }
}

/// Pure per-step validation.
pub fn validate_step(
    kind: StepKind,
    flow_type: FlowType,
    use_pkce: bool,
    flow_state: &FlowState,
    credentials: &Credentials,
) -> Vec<String> {
    let mut errors = Vec::new();

    match kind {
        StepKind::Configure => {
            if credentials.environment_id.is_empty() {
                errors.push("Environment ID is required".to_string());
            }
            if credentials.client_id.is_empty() {
                errors.push("Client ID is required".to_string());
            }
            if credentials.scopes.is_empty() {
                errors.push("At least one scope is required".to_string());
            }
            if flow_type.uses_redirect() && credentials.redirect_uri.is_empty() {
                errors.push("Redirect URI is required for this flow".to_string());
            }
            if credentials.auth_method != ClientAuthMethod::None
                && credentials.client_secret.is_none()
            {
                errors.push(format!(
                    "Client secret is required for {}",
                    credentials.auth_method.as_str()
                ));
            }
        }
        StepKind::Pkce => {
            if flow_state.code_verifier.is_none() || flow_state.code_challenge.is_none() {
                errors.push("PKCE verifier and challenge have not been generated".to_string());
            }
        }
        StepKind::AuthorizationRequest => {
            if flow_state.authorization_url.is_none() {
                errors.push("Authorization URL has not been built".to_string());
            }
            if flow_state.state.is_none() {
                errors.push("State parameter has not been generated".to_string());
            }
        }
        StepKind::Callback => {
            if flow_type.exchanges_code() {
                if flow_state.authorization_code.is_none() {
                    errors.push("Authorization code has not been received".to_string());
                }
            } else if !flow_state.has_tokens() {
                errors.push("Tokens have not been received from the redirect".to_string());
            }
        }
        StepKind::TokenExchange => {
            // Exchange readiness: everything the token endpoint call needs.
            if flow_state.authorization_code.is_none() {
                errors.push("Authorization code is required".to_string());
            }
            if use_pkce && flow_state.code_verifier.is_none() {
                errors.push("PKCE code verifier is required".to_string());
            }
            if credentials.client_id.is_empty() {
                errors.push("Client ID is required".to_string());
            }
            if credentials.environment_id.is_empty() {
                errors.push("Environment ID is required".to_string());
            }
            if !use_pkce && credentials.redirect_uri.is_empty() {
                errors.push("Redirect URI is required when PKCE is not used".to_string());
            }
        }
        StepKind::UserCredentials => {
            if flow_state.username.is_none() {
                errors.push("Username is required".to_string());
            }
            if flow_state.password.is_none() {
                errors.push("Password is required".to_string());
            }
        }
        StepKind::RequestToken => {
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
        }
        StepKind::DeviceAuthorization => {
            if flow_state.device_code.is_none()
                || flow_state.user_code.is_none()
                || flow_state.verification_uri.is_none()
            {
                errors.push("Device authorization has not been requested".to_string());
            }
        }
        StepKind::UserAuthorization | StepKind::Tokens => {
            if !flow_state.has_tokens() {
                errors.push("Tokens have not been received".to_string());
            }
        }
        StepKind::Introspect => {
            if !flow_state.has_tokens() {
                errors.push("An access token is required for introspection".to_string());
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::collections::HashMap;

    use crate::types::TokenResponse;

    fn credentials(use_pkce: bool) -> Credentials {
        Credentials {
            environment_id: "env-1".to_string(),
            client_id: "client-1".to_string(),
            client_secret: Some(SecretString::new("secret".to_string())),
            redirect_uri: "https://app.example.com/callback".to_string(),
            scopes: vec!["openid".to_string()],
            use_pkce,
            auth_method: ClientAuthMethod::ClientSecretBasic,
        }
    }

    fn tokens() -> TokenResponse {
        TokenResponse {
            access_token: "tok".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
            scope: None,
            id_token: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_go_to_rejects_out_of_range() {
        let mut machine = StepStateMachine::new(FlowType::ClientCredentials, false);
        assert!(machine.go_to(3).is_ok());
        assert!(machine.go_to(4).is_err());
        assert_eq!(machine.current_step(), 3);
    }

    #[test]
    fn test_go_next_gated_on_validation() {
        let mut machine = StepStateMachine::new(FlowType::AuthorizationCode, false);
        let flow_state = FlowState::new();

        // Empty credentials: Configure does not validate, navigation is blocked.
        let err = machine.go_next(&flow_state, &Credentials::default()).unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        assert_eq!(machine.current_step(), 0);

        machine.go_next(&flow_state, &credentials(false)).unwrap();
        assert_eq!(machine.current_step(), 1);
    }

    #[test]
    fn test_go_previous_saturates_at_zero() {
        let mut machine = StepStateMachine::new(FlowType::Implicit, false);
        assert_eq!(machine.go_previous(), 0);
    }

    #[test]
    fn test_exchange_readiness_names_pkce_when_verifier_absent() {
        let machine = StepStateMachine::new(FlowType::AuthorizationCode, true);
        let mut flow_state = FlowState::new();
        flow_state.authorization_code = Some("code-1".to_string());

        let exchange_step =
            crate::registry::definitions::step_index(FlowType::AuthorizationCode, true, StepKind::TokenExchange)
                .unwrap();
        let errors = machine.validate(exchange_step, &flow_state, &credentials(true));
        assert!(
            errors.iter().any(|e| e.contains("PKCE")),
            "expected a PKCE error, got: {errors:?}"
        );
    }

    #[test]
    fn test_redirect_uri_not_required_at_exchange_with_pkce() {
        let machine = StepStateMachine::new(FlowType::AuthorizationCode, true);
        let mut flow_state = FlowState::new();
        flow_state.authorization_code = Some("code-1".to_string());
        flow_state.set_pkce_pair("v".repeat(43), "c".to_string());

        let mut creds = credentials(true);
        creds.redirect_uri = String::new();

        let exchange_step =
            crate::registry::definitions::step_index(FlowType::AuthorizationCode, true, StepKind::TokenExchange)
                .unwrap();
        assert!(machine
            .validate(exchange_step, &flow_state, &creds)
            .is_empty());
    }

    #[test]
    fn test_completion_is_derived_and_regresses() {
        let machine = StepStateMachine::new(FlowType::AuthorizationCode, true);
        let creds = credentials(true);
        let mut flow_state = FlowState::new();
        flow_state.set_pkce_pair("v".repeat(43), "c".to_string());

        let pkce_step =
            crate::registry::definitions::step_index(FlowType::AuthorizationCode, true, StepKind::Pkce).unwrap();
        assert!(machine.completed_steps(&flow_state, &creds).contains(&pkce_step));

        // Clearing the backing data regresses completion, no stale flags.
        flow_state.clear_pkce_pair();
        assert!(!machine.completed_steps(&flow_state, &creds).contains(&pkce_step));
    }

    #[test]
    fn test_implicit_callback_requires_tokens_not_code() {
        let machine = StepStateMachine::new(FlowType::Implicit, false);
        let mut flow_state = FlowState::new();
        flow_state.authorization_code = Some("stray-code".to_string());

        let callback_step =
            crate::registry::definitions::step_index(FlowType::Implicit, false, StepKind::Callback).unwrap();
        assert!(!machine
            .validate(callback_step, &flow_state, &credentials(false))
            .is_empty());

        flow_state.tokens = Some(tokens());
        assert!(machine
            .validate(callback_step, &flow_state, &credentials(false))
            .is_empty());
    }

    #[test]
    fn test_public_client_needs_no_secret() {
        let machine = StepStateMachine::new(FlowType::AuthorizationCode, true);
        let mut creds = credentials(true);
        creds.client_secret = None;
        creds.auth_method = ClientAuthMethod::None;

        assert!(machine.validate(0, &FlowState::new(), &creds).is_empty());
    }
}
