//! Access token tracking keyed on authentication state.
//!
//! The owner calls [`TokenSupplier::on_auth_state_change`] whenever the
//! session layer reports a state. A transition to authenticated fetches a
//! token from the session provider; a transition away clears it. Repeating
//! the current state is a no-op, so a refresh already in flight is never
//! restarted by a duplicate signal.
//!
//! The token is published through a watch channel. Consumers such as the
//! fetch coordinator hold a [`TokenReceiver`] and read the latest value.

use crate::session::{AuthState, SessionError, SessionProvider};
use common::secret::SecretString;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::instrument;

/// Published token state.
#[derive(Clone, Default)]
pub struct TokenState {
    /// Current access token, if any.
    pub token: Option<SecretString>,

    /// Whether a token request to the session layer is outstanding.
    pub is_fetching: bool,

    /// Last authentication state seen. Deduplication key.
    auth: Option<AuthState>,

    /// Bumped on every accepted state change; a token fetched under an older
    /// epoch is discarded.
    epoch: u64,
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("is_fetching", &self.is_fetching)
            .field("auth", &self.auth)
            .finish()
    }
}

impl TokenState {
    /// Last authentication state seen, if any.
    pub fn auth(&self) -> Option<AuthState> {
        self.auth
    }
}

/// Read side of the supplier.
#[derive(Clone)]
pub struct TokenReceiver(watch::Receiver<TokenState>);

impl TokenReceiver {
    /// The current token, or `None` when not authenticated or still fetching.
    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        self.0.borrow().token.clone()
    }

    /// Wait for the next published change.
    ///
    /// # Errors
    ///
    /// Returns `watch::error::RecvError` once the supplier is dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.0.changed().await
    }
}

impl fmt::Debug for TokenReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenReceiver")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Forgets the authentication state when a token request for `epoch` ends
/// without a token, so the next identical report asks again.
struct FetchingGuard<'a> {
    state: &'a watch::Sender<TokenState>,
    epoch: u64,
    armed: bool,
}

impl<'a> FetchingGuard<'a> {
    fn new(state: &'a watch::Sender<TokenState>, epoch: u64) -> Self {
        Self {
            state,
            epoch,
            armed: true,
        }
    }

    /// Publish `token` if `epoch` is still current. Returns whether it was.
    fn publish(mut self, token: SecretString) -> bool {
        self.armed = false;
        self.state.send_if_modified(|state| {
            if state.epoch != self.epoch {
                return false;
            }
            state.token = Some(token);
            state.is_fetching = false;
            true
        })
    }
}

impl Drop for FetchingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.state.send_if_modified(|state| {
            if state.epoch != self.epoch {
                return false;
            }
            state.auth = None;
            state.token = None;
            state.is_fetching = false;
            true
        });
    }
}

/// Keeps an access token in step with the authentication state.
pub struct TokenSupplier {
    session: Arc<dyn SessionProvider>,
    state: watch::Sender<TokenState>,
}

impl TokenSupplier {
    /// Create a supplier with no token.
    pub fn new(session: Arc<dyn SessionProvider>) -> Self {
        let (state, _) = watch::channel(TokenState::default());
        Self { session, state }
    }

    /// React to an authentication state report.
    ///
    /// - Same state as last time: returns immediately
    /// - `Authenticated`: requests a token and publishes it
    /// - `Unauthenticated`: clears the token
    ///
    /// # Errors
    ///
    /// Returns the session provider's error when the token request fails. The
    /// token is left absent in that case, and the state is forgotten so that
    /// reporting `Authenticated` again retries. Dropping the returned future
    /// mid-request has the same effect.
    #[instrument(skip(self))]
    pub async fn on_auth_state_change(&self, auth: AuthState) -> Result<(), SessionError> {
        let mut epoch = 0;
        let accepted = self.state.send_if_modified(|state| {
            if state.auth == Some(auth) {
                return false;
            }
            state.auth = Some(auth);
            state.epoch += 1;
            epoch = state.epoch;
            state.token = None;
            state.is_fetching = auth.is_authenticated();
            true
        });

        if !accepted {
            tracing::debug!(target: "client.token", "Authentication state unchanged, skipping");
            return Ok(());
        }

        if !auth.is_authenticated() {
            tracing::debug!(target: "client.token", "Signed out, token cleared");
            return Ok(());
        }

        tracing::debug!(target: "client.token", "Requesting access token");
        let fetching = FetchingGuard::new(&self.state, epoch);

        let token = match self.session.get_access_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(target: "client.token", error = %e, "Failed to obtain access token");
                // Dropping the guard clears the state so a repeat report retries.
                drop(fetching);
                return Err(e);
            }
        };

        if !fetching.publish(token) {
            tracing::debug!(target: "client.token", "Authentication state moved on, discarding token");
        }

        Ok(())
    }

    /// The current token, if authenticated and fetched.
    pub fn current_token(&self) -> Option<SecretString> {
        self.state.borrow().token.clone()
    }

    /// Snapshot of the published state.
    pub fn state(&self) -> TokenState {
        self.state.borrow().clone()
    }

    /// A receiver that tracks the latest token.
    pub fn receiver(&self) -> TokenReceiver {
        TokenReceiver(self.state.subscribe())
    }
}
