//! Callback Extractor
//!
//! Parses redirect results into normalized callback data. Which channel is
//! authoritative is decided by flow type, not by which channel happens to
//! carry data: authorization_code trusts only the query, implicit only the
//! fragment, hybrid extracts from both and merges. Performs no network I/O.

use base64::Engine;
use url::Url;

use crate::error::{CorrelationError, FlowError, FlowResult, ProtocolError};
use crate::types::{CallbackData, FlowType, FragmentCallback, QueryCallback};

/// Stateless redirect-result extractor.
pub struct CallbackExtractor;

impl CallbackExtractor {
    /// Extract an authorization code from the query channel, enforcing
    /// state correlation. A mismatch discards the data.
    pub fn extract_from_query(raw_query: &str, expected_state: &str) -> FlowResult<CallbackData> {
        let params = QueryCallback::parse(raw_query);

        if let Some(error) = params.error {
            return Err(FlowError::Protocol(ProtocolError::OAuth {
                error,
                error_description: params.error_description,
            }));
        }

        check_state(params.state.as_deref(), expected_state)?;

        let code = params.code.ok_or_else(|| {
            FlowError::Protocol(ProtocolError::MalformedRedirect {
                message: "authorization code missing from query".to_string(),
            })
        })?;

        Ok(CallbackData {
            authorization_code: Some(code),
            ..Default::default()
        })
    }

    /// Extract tokens (and, for hybrid, a code) from the fragment channel,
    /// enforcing state correlation and, when an ID token and expected
    /// nonce are present, the nonce claim.
    pub fn extract_from_fragment(
        flow_type: FlowType,
        raw_fragment: &str,
        expected_state: &str,
        expected_nonce: Option<&str>,
    ) -> FlowResult<CallbackData> {
        let params = FragmentCallback::parse(raw_fragment);

        if let Some(error) = params.error {
            return Err(FlowError::Protocol(ProtocolError::OAuth {
                error,
                error_description: params.error_description,
            }));
        }

        check_state(params.state.as_deref(), expected_state)?;

        if params.access_token.is_none() && params.id_token.is_none() {
            return Err(FlowError::Protocol(ProtocolError::MalformedRedirect {
                message: "no tokens present on fragment".to_string(),
            }));
        }

        if let (Some(id_token), Some(expected)) = (params.id_token.as_deref(), expected_nonce) {
            let claim = id_token_nonce(id_token);
            if claim.as_deref() != Some(expected) {
                return Err(FlowError::Correlation(CorrelationError::NonceMismatch));
            }
        }

        Ok(CallbackData {
            // The fragment only carries a code for hybrid responses.
            authorization_code: params
                .code
                .filter(|_| flow_type == FlowType::Hybrid),
            access_token: params.access_token,
            id_token: params.id_token,
            token_type: params.token_type,
            expires_in: params.expires_in,
        })
    }

    /// Extract from a full redirect URL, dispatching on channel authority.
    pub fn extract_from_redirect(
        flow_type: FlowType,
        redirect_url: &str,
        expected_state: &str,
        expected_nonce: Option<&str>,
    ) -> FlowResult<CallbackData> {
        let url = Url::parse(redirect_url).map_err(|e| {
            FlowError::Protocol(ProtocolError::MalformedRedirect {
                message: e.to_string(),
            })
        })?;

        let query = url.query().unwrap_or_default();
        let fragment = url.fragment().unwrap_or_default();

        match flow_type {
            // Query is the only trusted channel; fragment contents ignored.
            FlowType::AuthorizationCode => Self::extract_from_query(query, expected_state),
            // Fragment is the only trusted channel; a stray query code is
            // ignored.
            FlowType::Implicit => {
                Self::extract_from_fragment(flow_type, fragment, expected_state, expected_nonce)
            }
            // Either or both channels may be present; extract independently
            // and merge.
            FlowType::Hybrid => {
                let from_fragment = if fragment.is_empty() {
                    None
                } else {
                    Some(Self::extract_from_fragment(
                        flow_type,
                        fragment,
                        expected_state,
                        expected_nonce,
                    )?)
                };
                let from_query = if query.is_empty() {
                    None
                } else {
                    Some(Self::extract_from_query(query, expected_state)?)
                };

                match (from_query, from_fragment) {
                    (Some(q), Some(f)) => Ok(q.merge(f)),
                    (Some(q), None) => Ok(q),
                    (None, Some(f)) => Ok(f),
                    (None, None) => Err(FlowError::Protocol(ProtocolError::MalformedRedirect {
                        message: "redirect carried neither query nor fragment data".to_string(),
                    })),
                }
            }
            _ => Err(FlowError::Protocol(ProtocolError::MalformedRedirect {
                message: format!("flow {flow_type} does not receive redirects"),
            })),
        }
    }
}

fn check_state(received: Option<&str>, expected: &str) -> FlowResult<()> {
    match received {
        None => Err(FlowError::Correlation(CorrelationError::StateMissing)),
        Some(received) if received != expected => {
            Err(FlowError::Correlation(CorrelationError::StateMismatch {
                expected: expected.to_string(),
                received: received.to_string(),
            }))
        }
        Some(_) => Ok(()),
    }
}

/// Read the `nonce` claim from an (unverified) JWT payload. Signature
/// validation belongs to the resource server; the engine only needs the
/// replay-correlation claim.
fn id_token_nonce(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("nonce")?.as_str().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATE: &str = "expected-state";

    fn unsigned_id_token(nonce: &str) -> String {
        let header =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(
            serde_json::json!({"sub": "user-1", "nonce": nonce}).to_string(),
        );
        format!("{header}.{payload}.")
    }

    #[test]
    fn test_query_extraction_happy_path() {
        let data =
            CallbackExtractor::extract_from_query(&format!("code=abc&state={STATE}"), STATE)
                .unwrap();
        assert_eq!(data.authorization_code, Some("abc".to_string()));
        assert!(data.access_token.is_none());
    }

    #[test]
    fn test_state_mismatch_is_correlation_error_and_discards_code() {
        let err =
            CallbackExtractor::extract_from_query("code=abc&state=attacker-state", STATE)
                .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Correlation(CorrelationError::StateMismatch { .. })
        ));
    }

    #[test]
    fn test_state_missing_is_correlation_error() {
        let err = CallbackExtractor::extract_from_query("code=abc", STATE).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Correlation(CorrelationError::StateMissing)
        ));
    }

    #[test]
    fn test_oauth_error_surfaced_verbatim() {
        let err = CallbackExtractor::extract_from_query(
            &format!("error=access_denied&error_description=User%20denied&state={STATE}"),
            STATE,
        )
        .unwrap_err();
        match err {
            FlowError::Protocol(ProtocolError::OAuth {
                error,
                error_description,
            }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(error_description, Some("User denied".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_implicit_redirect_ignores_query_code() {
        let url = format!(
            "https://app.example.com/callback?code=should-be-ignored&state={STATE}#access_token=tok&token_type=Bearer&state={STATE}"
        );
        let data =
            CallbackExtractor::extract_from_redirect(FlowType::Implicit, &url, STATE, None)
                .unwrap();
        assert!(data.authorization_code.is_none());
        assert_eq!(data.access_token, Some("tok".to_string()));
    }

    #[test]
    fn test_authorization_code_redirect_ignores_fragment() {
        let url = format!(
            "https://app.example.com/callback?code=real-code&state={STATE}#access_token=spoofed&state={STATE}"
        );
        let data = CallbackExtractor::extract_from_redirect(
            FlowType::AuthorizationCode,
            &url,
            STATE,
            None,
        )
        .unwrap();
        assert_eq!(data.authorization_code, Some("real-code".to_string()));
        assert!(data.access_token.is_none());
    }

    #[test]
    fn test_hybrid_merges_both_channels() {
        let id_token = unsigned_id_token("nonce-1");
        let url = format!(
            "https://app.example.com/callback?code=code-1&state={STATE}#id_token={id_token}&access_token=tok&state={STATE}"
        );
        let data = CallbackExtractor::extract_from_redirect(
            FlowType::Hybrid,
            &url,
            STATE,
            Some("nonce-1"),
        )
        .unwrap();
        assert_eq!(data.authorization_code, Some("code-1".to_string()));
        assert_eq!(data.access_token, Some("tok".to_string()));
        assert!(data.id_token.is_some());
    }

    #[test]
    fn test_hybrid_fragment_only() {
        let url = format!(
            "https://app.example.com/callback#code=code-1&access_token=tok&state={STATE}"
        );
        let data =
            CallbackExtractor::extract_from_redirect(FlowType::Hybrid, &url, STATE, None)
                .unwrap();
        assert_eq!(data.authorization_code, Some("code-1".to_string()));
    }

    #[test]
    fn test_nonce_mismatch_is_correlation_error() {
        let id_token = unsigned_id_token("stale-nonce");
        let fragment = format!("id_token={id_token}&access_token=tok&state={STATE}");
        let err = CallbackExtractor::extract_from_fragment(
            FlowType::Implicit,
            &fragment,
            STATE,
            Some("fresh-nonce"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Correlation(CorrelationError::NonceMismatch)
        ));
    }

    #[test]
    fn test_fragment_without_tokens_is_malformed() {
        let err = CallbackExtractor::extract_from_fragment(
            FlowType::Implicit,
            &format!("state={STATE}"),
            STATE,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Protocol(ProtocolError::MalformedRedirect { .. })
        ));
    }
}
