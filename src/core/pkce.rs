//! PKCE Code Manager
//!
//! RFC 7636 verifier/challenge lifecycle: generation, derivation, and
//! persistence across redirect round-trips. Only the `S256` challenge
//! method is supported.

use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::core::store::{DurableStore, TieredFlowStore};
use crate::error::{FlowError, FlowResult, StorageError};

/// A PKCE verifier/challenge pair. Invariant: the two travel together;
/// persisted as one record, loaded as one record.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Code verifier (keep secret).
    pub verifier: String,
    /// Code challenge (sent in the authorization URL).
    pub challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// On-disk shape of a persisted pair.
#[derive(Serialize, Deserialize)]
struct PkcePairRecord {
    code_verifier: String,
    code_challenge: String,
}

/// Manages the PKCE parameter lifecycle against the tiered flow store.
pub struct PkceCodeManager<S: DurableStore> {
    store: Arc<TieredFlowStore<S>>,
    verifier_length: usize,
}

impl<S: DurableStore> PkceCodeManager<S> {
    /// Create a manager with the default verifier length (64).
    pub fn new(store: Arc<TieredFlowStore<S>>) -> Self {
        Self::with_length(store, 64)
    }

    /// Create a manager with a custom verifier length.
    ///
    /// # Panics
    /// Panics if length is not between 43 and 128 (RFC 7636 requirement).
    pub fn with_length(store: Arc<TieredFlowStore<S>>, length: usize) -> Self {
        assert!(
            (43..=128).contains(&length),
            "PKCE verifier length must be between 43 and 128"
        );
        Self {
            store,
            verifier_length: length,
        }
    }

    /// Generate a fresh verifier/challenge pair.
    pub fn generate(&self) -> PkcePair {
        let verifier = self.generate_verifier();
        let challenge = compute_challenge(&verifier);
        PkcePair {
            verifier,
            challenge,
        }
    }

    fn generate_verifier(&self) -> String {
        // Enough random bytes that the base64url encoding covers the length.
        let bytes_needed = (self.verifier_length * 3 + 3) / 4;
        let mut random_bytes = vec![0u8; bytes_needed];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&random_bytes);
        encoded[..self.verifier_length].to_string()
    }

    /// Persist the pair as a single record keyed by flow ID.
    pub async fn persist(&self, flow_id: &str, pair: &PkcePair) -> FlowResult<()> {
        let record = PkcePairRecord {
            code_verifier: pair.verifier.clone(),
            code_challenge: pair.challenge.clone(),
        };
        let value = serde_json::to_string(&record).map_err(|e| {
            FlowError::Storage(StorageError::WriteFailed {
                message: e.to_string(),
            })
        })?;
        self.store.put(&pair_key(flow_id), value).await
    }

    /// Load a persisted pair, fast tier first, durable on miss. A record
    /// holding a challenge without a verifier (or vice versa) is data
    /// corruption, not a valid state.
    pub async fn load(&self, flow_id: &str) -> FlowResult<Option<PkcePair>> {
        let key = pair_key(flow_id);
        let Some(value) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let record: PkcePairRecord = serde_json::from_str(&value).map_err(|e| {
            FlowError::Storage(StorageError::CorruptedData {
                key: key.clone(),
                message: e.to_string(),
            })
        })?;

        if record.code_verifier.is_empty() || record.code_challenge.is_empty() {
            return Err(FlowError::Storage(StorageError::CorruptedData {
                key,
                message: "verifier and challenge must be present together".to_string(),
            }));
        }

        Ok(Some(PkcePair {
            verifier: record.code_verifier,
            challenge: record.code_challenge,
        }))
    }

    /// Remove a persisted pair.
    pub async fn discard(&self, flow_id: &str) -> FlowResult<()> {
        self.store.delete(&pair_key(flow_id)).await
    }
}

fn pair_key(flow_id: &str) -> String {
    format!("pkce/{flow_id}")
}

/// S256: BASE64URL(SHA256(code_verifier)).
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
}

/// Validate verifier format per RFC 7636 §4.1.
pub fn is_valid_verifier(verifier: &str) -> bool {
    let len = verifier.len();
    if !(43..=128).contains(&len) {
        return false;
    }

    // Unreserved characters only: [A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"
    verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::InMemoryDurableStore;

    fn manager() -> PkceCodeManager<InMemoryDurableStore> {
        PkceCodeManager::new(Arc::new(TieredFlowStore::new(InMemoryDurableStore::new())))
    }

    #[test]
    fn test_generate_produces_valid_pair() {
        let pair = manager().generate();
        assert_eq!(pair.verifier.len(), 64);
        assert!(is_valid_verifier(&pair.verifier));
        assert_eq!(pair.challenge, compute_challenge(&pair.verifier));
    }

    #[test]
    fn test_s256_known_vector() {
        // RFC 7636 Appendix B test vector
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            compute_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_verifier_validation() {
        assert!(is_valid_verifier(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"
        ));
        assert!(!is_valid_verifier("short"));
        assert!(!is_valid_verifier(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOE!@#"
        ));
    }

    #[tokio::test]
    async fn test_persist_then_load_round_trip() {
        let manager = manager();
        let pair = manager.generate();
        manager.persist("flow-1", &pair).await.unwrap();

        let loaded = manager.load("flow-1").await.unwrap().unwrap();
        assert_eq!(loaded, pair);
    }

    #[tokio::test]
    async fn test_load_missing_pair() {
        assert!(manager().load("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_half_present_pair_is_corruption() {
        let store = Arc::new(TieredFlowStore::new(InMemoryDurableStore::new()));
        store
            .put(
                "pkce/flow-1",
                r#"{"code_verifier":"","code_challenge":"only-one-half"}"#.to_string(),
            )
            .await
            .unwrap();

        let manager = PkceCodeManager::new(store);
        let err = manager.load("flow-1").await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Storage(StorageError::CorruptedData { .. })
        ));
    }

    #[tokio::test]
    async fn test_unparseable_record_is_corruption() {
        let store = Arc::new(TieredFlowStore::new(InMemoryDurableStore::new()));
        store
            .put("pkce/flow-1", "not-json".to_string())
            .await
            .unwrap();

        let manager = PkceCodeManager::new(store);
        assert!(manager.load("flow-1").await.is_err());
    }

    #[test]
    #[should_panic(expected = "PKCE verifier length must be between 43 and 128")]
    fn test_invalid_verifier_length() {
        PkceCodeManager::with_length(
            Arc::new(TieredFlowStore::new(InMemoryDurableStore::new())),
            42,
        );
    }
}
