//! Single-flight fetch of the protected endpoint.
//!
//! [`FetchCoordinator`] moves through `Idle -> Pending -> Completed` and back
//! to `Pending` on the next request. While `Pending`, further requests are
//! suppressed, so at most one request is in flight per coordinator.
//!
//! Every fetch ends in `Completed`: the response status with the parsed
//! secrets on success, the status with an empty payload on rejection, or
//! status [`TRANSPORT_FAILURE_STATUS`] when no response arrived or the caller
//! abandoned the fetch.

use crate::token_supplier::TokenReceiver;
use common::secret::ExposeSecret;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;

/// Status recorded when the request never got a response.
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

/// Fetch lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    /// Nothing requested yet.
    Idle,

    /// A request is in flight.
    Pending,

    /// The last request finished.
    Completed { status: u16, payload: Vec<String> },
}

impl FetchState {
    /// `true` while a request is in flight.
    pub fn is_pending(&self) -> bool {
        matches!(self, FetchState::Pending)
    }

    /// `true` if the last request could not reach the server.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            FetchState::Completed {
                status: TRANSPORT_FAILURE_STATUS,
                ..
            }
        )
    }
}

/// What to do when a fetch is requested with no token available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingTokenPolicy {
    /// Send the request without an Authorization header and let the server
    /// reject it.
    #[default]
    SendUnauthenticated,

    /// Refuse locally with [`FetchError::NoToken`], leaving the state as is.
    FailFast,
}

/// Errors from [`FetchCoordinator::request_fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No access token available")]
    NoToken,

    #[error("Could not reach the API: {0}")]
    TransportFailure(String),
}

/// Result of a fetch request that was not refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A fetch was already in flight; nothing was sent.
    Suppressed,

    /// The request completed with this state.
    Completed(FetchState),
}

#[derive(Deserialize)]
struct SecretsBody {
    secrets: Vec<String>,
}

/// Leaves `Pending` when a fetch ends without recording an outcome, for
/// example when the caller drops the `request_fetch` future.
struct PendingGuard<'a> {
    state: &'a watch::Sender<FetchState>,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(state: &'a watch::Sender<FetchState>) -> Self {
        Self { state, armed: true }
    }

    /// Record the outcome and disarm.
    fn complete(mut self, outcome: FetchState) {
        self.armed = false;
        self.state.send_replace(outcome);
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(target: "client.fetch", "Fetch abandoned before completion");
            self.state.send_replace(FetchState::Completed {
                status: TRANSPORT_FAILURE_STATUS,
                payload: Vec::new(),
            });
        }
    }
}

/// Coordinates fetches of the protected secrets endpoint.
pub struct FetchCoordinator {
    http_client: reqwest::Client,
    secrets_url: String,
    tokens: TokenReceiver,
    policy: MissingTokenPolicy,
    state: watch::Sender<FetchState>,
}

impl FetchCoordinator {
    /// Create a coordinator.
    ///
    /// # Arguments
    ///
    /// * `secrets_url` - Full URL of the protected endpoint
    /// * `tokens` - Source of the current access token
    /// * `policy` - Behavior when no token is available
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(
        secrets_url: String,
        tokens: TokenReceiver,
        policy: MissingTokenPolicy,
        timeout: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "client.fetch", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });
        let (state, _) = watch::channel(FetchState::Idle);

        Self {
            http_client,
            secrets_url,
            tokens,
            policy,
            state,
        }
    }

    /// Fetch the secrets unless a fetch is already in flight.
    ///
    /// # Errors
    ///
    /// - `NoToken` - no token and the policy is `FailFast`; state unchanged
    /// - `TransportFailure` - no response; state is `Completed` with status
    ///   [`TRANSPORT_FAILURE_STATUS`]
    #[instrument(skip_all, fields(url = %self.secrets_url))]
    pub async fn request_fetch(&self) -> Result<FetchOutcome, FetchError> {
        let token = self.tokens.token();
        let refuse_without_token = token.is_none() && self.policy == MissingTokenPolicy::FailFast;

        let mut already_pending = false;
        let started = self.state.send_if_modified(|state| {
            if state.is_pending() {
                already_pending = true;
                return false;
            }
            if refuse_without_token {
                return false;
            }
            *state = FetchState::Pending;
            true
        });

        if !started {
            if already_pending {
                tracing::debug!(target: "client.fetch", "Fetch already in flight, suppressing");
                return Ok(FetchOutcome::Suppressed);
            }
            tracing::debug!(target: "client.fetch", "No access token, refusing fetch");
            return Err(FetchError::NoToken);
        }

        let pending = PendingGuard::new(&self.state);

        let mut request = self.http_client.get(&self.secrets_url);
        match &token {
            Some(token) => request = request.bearer_auth(token.expose_secret()),
            None => {
                tracing::debug!(target: "client.fetch", "No access token, sending unauthenticated request");
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(target: "client.fetch", error = %e, "Request to protected endpoint failed");
                pending.complete(FetchState::Completed {
                    status: TRANSPORT_FAILURE_STATUS,
                    payload: Vec::new(),
                });
                return Err(FetchError::TransportFailure(e.to_string()));
            }
        };

        let status = response.status();
        let payload = if status.is_success() {
            match response.json::<SecretsBody>().await {
                Ok(body) => body.secrets,
                Err(e) => {
                    tracing::warn!(target: "client.fetch", error = %e, "Unexpected response body");
                    Vec::new()
                }
            }
        } else {
            tracing::debug!(target: "client.fetch", status = %status, "Protected endpoint rejected request");
            Vec::new()
        };

        let completed = FetchState::Completed {
            status: status.as_u16(),
            payload,
        };
        pending.complete(completed.clone());

        Ok(FetchOutcome::Completed(completed))
    }

    /// Current state.
    pub fn state(&self) -> FetchState {
        self.state.borrow().clone()
    }

    /// Whether a new fetch would be issued (the trigger is enabled).
    pub fn can_request(&self) -> bool {
        !self.state.borrow().is_pending()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.state.subscribe()
    }
}
