//! Device Authorization Poller
//!
//! RFC 8628 device grant: requests device/user codes, then polls the token
//! endpoint as a cancellable background task. At most one polling loop may
//! be live per poller at any time, enforced with an atomic guard rather
//! than a best-effort flag; the natural trigger sources (automatic on
//! arrival, manual button) can race.

use base64::Engine;
use chrono::{DateTime, Utc};
use futures::Stream;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::core::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::{
    error_from_response, parse_oauth_error, FlowError, FlowResult, ProtocolError,
    ERROR_AUTHORIZATION_PENDING, ERROR_SLOW_DOWN,
};
use crate::types::{
    ClientAuthMethod, Credentials, DeviceAuthorizationResponse, EngineConfig, ExpiryReason,
    FlowState, PollEvent, TokenResponse,
};

/// Outcome of a start request.
pub enum StartPoll {
    /// A new loop was started; consume its events from the stream.
    Started(PollEvents),
    /// A loop is already live for this poller; the request was a no-op.
    AlreadyRunning,
}

impl std::fmt::Debug for StartPoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartPoll::Started(_) => f.write_str("Started"),
            StartPoll::AlreadyRunning => f.write_str("AlreadyRunning"),
        }
    }
}

/// Stream of [`PollEvent`]s from one polling run. Ends (yields `None`)
/// when the loop reaches a terminal state or is cancelled; nothing is
/// emitted after cancellation is observed.
pub struct PollEvents {
    rx: mpsc::UnboundedReceiver<PollEvent>,
}

impl PollEvents {
    /// Receive the next event, or `None` once the run is over.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        self.rx.recv().await
    }
}

impl Stream for PollEvents {
    type Item = PollEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Device authorization and token polling for one flow session.
pub struct DeviceAuthorizationPoller<T: HttpTransport> {
    config: EngineConfig,
    transport: Arc<T>,
    running: Arc<AtomicBool>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl<T: HttpTransport> DeviceAuthorizationPoller<T> {
    pub fn new(config: EngineConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: Mutex::new(None),
        }
    }

    /// Request device and user codes from the device authorization endpoint.
    pub async fn request_authorization(
        &self,
        credentials: &Credentials,
    ) -> FlowResult<DeviceAuthorizationResponse> {
        let endpoint = self
            .config
            .endpoints
            .device_authorization_endpoint
            .as_ref()
            .ok_or_else(|| {
                FlowError::Configuration(crate::error::ConfigurationError::MissingRequired {
                    field: "device_authorization_endpoint".to_string(),
                })
            })?;

        let mut params = vec![("client_id", credentials.client_id.clone())];
        if !credentials.scopes.is_empty() {
            params.push(("scope", credentials.scopes.join(" ")));
        }

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: endpoint.clone(),
            headers: request_headers(credentials),
            body: Some(encode_form(apply_body_auth(params, credentials))),
            timeout: Some(self.config.timeout),
        };

        let response = self.transport.send(request).await?;
        if response.status != 200 {
            return Err(error_from_response(response.status, &response.body));
        }

        let authorization: DeviceAuthorizationResponse = serde_json::from_str(&response.body)
            .map_err(|e| {
                FlowError::Protocol(ProtocolError::InvalidJson {
                    message: e.to_string(),
                })
            })?;

        info!(
            user_code = %authorization.user_code,
            expires_in = authorization.expires_in,
            "device authorization granted"
        );
        Ok(authorization)
    }

    /// Start the polling loop as an independently cancellable task.
    ///
    /// Single-flight: a second start while a loop is live returns
    /// [`StartPoll::AlreadyRunning`] without touching the live run.
    pub fn start(&self, flow_state: &FlowState) -> FlowResult<StartPoll> {
        let device_code = flow_state
            .device_code
            .clone()
            .ok_or_else(|| FlowError::validation("Device code has not been requested"))?;
        let expires_at = flow_state
            .device_code_expires_at
            .ok_or_else(|| FlowError::validation("Device code expiry is unknown"))?;

        // The stop-sender lock is held across guard acquisition and spawn so
        // start and stop serialize against each other.
        let mut stop_slot = self.stop_tx.lock().unwrap();
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("polling already in progress; start request ignored");
            return Ok(StartPoll::AlreadyRunning);
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        *stop_slot = Some(stop_tx);

        let run = PollRun {
            token_endpoint: self.config.endpoints.token_endpoint.clone(),
            credentials: self.config.credentials.clone(),
            timeout: self.config.timeout,
            device_code,
            expires_at,
            interval: self.config.base_poll_interval,
            max_attempts: self.config.max_poll_attempts,
        };

        let transport = Arc::clone(&self.transport);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            run.execute(transport, event_tx, stop_rx).await;
            running.store(false, Ordering::SeqCst);
        });

        Ok(StartPoll::Started(PollEvents { rx: event_rx }))
    }

    /// Cancel the live polling loop, if any. Idempotent. Prevents any
    /// scheduled next attempt from firing and prevents an in-flight HTTP
    /// result from being emitted; no events follow.
    pub fn stop(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().unwrap().take() {
            debug!("cancelling device polling");
            let _ = stop_tx.send(true);
        }
    }

    /// Whether a polling loop is currently live.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct PollRun {
    token_endpoint: String,
    credentials: Credentials,
    timeout: Duration,
    device_code: String,
    expires_at: DateTime<Utc>,
    interval: Duration,
    max_attempts: u32,
}

enum PollOutcome {
    Tokens(TokenResponse),
    Pending,
    SlowDown(Option<u64>),
    Transient(String),
    Fatal {
        error: String,
        error_description: Option<String>,
    },
}

impl PollRun {
    async fn execute<T: HttpTransport>(
        mut self,
        transport: Arc<T>,
        event_tx: mpsc::UnboundedSender<PollEvent>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut attempt: u32 = 0;

        loop {
            if attempt >= self.max_attempts {
                warn!(attempt, "device polling attempt budget exhausted");
                let _ = event_tx.send(PollEvent::Expired {
                    attempt,
                    reason: ExpiryReason::AttemptBudget,
                });
                break;
            }

            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            // The device code's own lifetime is the earlier hard stop.
            if Utc::now() >= self.expires_at {
                let _ = event_tx.send(PollEvent::Expired {
                    attempt,
                    reason: ExpiryReason::DeviceCodeLifetime,
                });
                break;
            }

            attempt += 1;

            // An in-flight result must never be applied once cancellation
            // is observed.
            let outcome = tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                outcome = self.poll_once(&transport) => outcome,
            };

            match outcome {
                PollOutcome::Pending => {
                    debug!(attempt, "authorization pending");
                    let _ = event_tx.send(PollEvent::Pending { attempt });
                }
                PollOutcome::SlowDown(server_interval) => {
                    self.interval = next_interval(self.interval, server_interval);
                    debug!(attempt, interval = ?self.interval, "server asked to slow down");
                    let _ = event_tx.send(PollEvent::SlowDown {
                        attempt,
                        interval: self.interval,
                    });
                }
                PollOutcome::Transient(message) => {
                    warn!(attempt, %message, "transient failure during poll");
                    let _ = event_tx.send(PollEvent::Transient { attempt, message });
                }
                PollOutcome::Tokens(tokens) => {
                    info!(attempt, "device authorization succeeded");
                    let _ = event_tx.send(PollEvent::Succeeded { attempt, tokens });
                    break;
                }
                PollOutcome::Fatal {
                    error,
                    error_description,
                } => {
                    warn!(attempt, %error, "device polling failed");
                    let _ = event_tx.send(PollEvent::Failed {
                        attempt,
                        error,
                        error_description,
                    });
                    break;
                }
            }
        }
    }

    async fn poll_once<T: HttpTransport>(&self, transport: &Arc<T>) -> PollOutcome {
        let params = vec![
            (
                "grant_type",
                "urn:ietf:params:oauth:grant-type:device_code".to_string(),
            ),
            ("device_code", self.device_code.clone()),
            ("client_id", self.credentials.client_id.clone()),
        ];

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.token_endpoint.clone(),
            headers: request_headers(&self.credentials),
            body: Some(encode_form(apply_body_auth(params, &self.credentials))),
            timeout: Some(self.timeout),
        };

        let response = match transport.send(request).await {
            Ok(response) => response,
            Err(e) if e.is_transient() => return PollOutcome::Transient(e.to_string()),
            Err(e) => {
                return PollOutcome::Fatal {
                    error: "transport_error".to_string(),
                    error_description: Some(e.to_string()),
                }
            }
        };

        if response.status == 200 {
            return match serde_json::from_str::<TokenResponse>(&response.body) {
                Ok(tokens) => PollOutcome::Tokens(tokens),
                Err(e) => PollOutcome::Fatal {
                    error: "invalid_response".to_string(),
                    error_description: Some(e.to_string()),
                },
            };
        }

        match parse_oauth_error(&response.body) {
            Some(oauth) if oauth.error == ERROR_AUTHORIZATION_PENDING => PollOutcome::Pending,
            Some(oauth) if oauth.error == ERROR_SLOW_DOWN => PollOutcome::SlowDown(oauth.interval),
            Some(oauth) => PollOutcome::Fatal {
                error: oauth.error,
                error_description: oauth.error_description,
            },
            None => PollOutcome::Fatal {
                error: "invalid_response".to_string(),
                error_description: Some(format!("HTTP {}", response.status)),
            },
        }
    }
}

/// A `slow_down` response raises the interval for the rest of the run,
/// never lowers it. RFC 8628 §3.5 says add five seconds when the server
/// does not name a value.
fn next_interval(current: Duration, server_interval: Option<u64>) -> Duration {
    let requested = server_interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| current + Duration::from_secs(5));
    current.max(requested)
}

fn request_headers(credentials: &Credentials) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(
        "content-type".to_string(),
        "application/x-www-form-urlencoded".to_string(),
    );
    headers.insert("accept".to_string(), "application/json".to_string());

    if credentials.auth_method == ClientAuthMethod::ClientSecretBasic {
        if let Some(secret) = &credentials.client_secret {
            let value = format!("{}:{}", credentials.client_id, secret.expose_secret());
            let encoded = base64::engine::general_purpose::STANDARD.encode(value);
            headers.insert("authorization".to_string(), format!("Basic {encoded}"));
        }
    }

    headers
}

fn apply_body_auth(
    mut params: Vec<(&'static str, String)>,
    credentials: &Credentials,
) -> Vec<(&'static str, String)> {
    if credentials.auth_method == ClientAuthMethod::ClientSecretPost {
        if let Some(secret) = &credentials.client_secret {
            params.push(("client_secret", secret.expose_secret().to_string()));
        }
    }
    params
}

fn encode_form(params: Vec<(&'static str, String)>) -> String {
    params
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(&v)))
        .collect::<Vec<_>>()
        .join("&")
}
