// Authentication.
//
// One session holds one credential and at most one live session ticket
// (opaque session id + CSRF token captured from the login exchange). The
// ticket is shared lock-free by concurrent requests; refreshing it is
// serialized so a burst of expired calls triggers exactly one login
// exchange, with every waiter observing its outcome.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::Error;
use crate::session::Session;

/// Callback producing a fresh auth token per login exchange, for deployments
/// where tokens are minted externally and expire quickly.
pub type TokenProvider = Arc<dyn Fn() -> Result<SecretString, Error> + Send + Sync>;

/// Credentials for the login exchange. The secret material never appears in
/// `Debug` output.
#[derive(Clone)]
pub enum Credentials {
    /// Username and password.
    Password {
        username: String,
        password: SecretString,
    },
    /// Username and a pre-minted auth token.
    Token {
        username: String,
        token: SecretString,
    },
    /// Username and a callback that mints a token for every login exchange.
    TokenProvider {
        username: String,
        provider: TokenProvider,
    },
}

impl Credentials {
    /// The JSON body of the login request.
    pub(crate) fn login_body(&self) -> Result<serde_json::Value, Error> {
        match self {
            Self::Password { username, password } => Ok(json!({
                "username": username,
                "password": password.expose_secret(),
            })),
            Self::Token { username, token } => Ok(json!({
                "username": username,
                "token": token.expose_secret(),
            })),
            Self::TokenProvider { username, provider } => {
                let token = provider()?;
                Ok(json!({
                    "username": username,
                    "token": token.expose_secret(),
                }))
            }
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Self::Password { username, .. }
            | Self::Token { username, .. }
            | Self::TokenProvider { username, .. } => username,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Token { username, .. } => f
                .debug_struct("Token")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::TokenProvider { username, .. } => f
                .debug_struct("TokenProvider")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// Controller-specific wire names.
///
/// The session algorithm is fixed; which header carries the API version or
/// which cookie holds the session id is configuration. The defaults match
/// the conventional controller deployment.
#[derive(Debug, Clone)]
pub struct ControllerProfile {
    /// Login endpoint, relative to the controller root.
    pub login_path: String,
    /// Logout endpoint, relative to the controller root.
    pub logout_path: String,
    /// Cookie carrying the session id.
    pub session_cookie: String,
    /// Cookie carrying the CSRF token.
    pub csrf_cookie: String,
    /// Header the CSRF token is echoed back in on every request.
    pub csrf_header: String,
    /// Header carrying the tenant scope.
    pub tenant_header: String,
    /// Header carrying the API version.
    pub version_header: String,
}

impl Default for ControllerProfile {
    fn default() -> Self {
        Self {
            login_path: "login".to_owned(),
            logout_path: "logout".to_owned(),
            session_cookie: "sessionid".to_owned(),
            csrf_cookie: "csrftoken".to_owned(),
            csrf_header: "X-CSRFToken".to_owned(),
            tenant_header: "X-Api-Tenant".to_owned(),
            version_header: "X-Api-Version".to_owned(),
        }
    }
}

/// A live session ticket captured from a login exchange.
///
/// The generation number ties an in-flight request to the ticket it was sent
/// with, so invalidation cannot clobber a newer ticket installed by a
/// concurrent refresh.
#[derive(Debug)]
pub(crate) struct SessionTicket {
    pub(crate) session_id: String,
    pub(crate) csrf_token: Option<String>,
    pub(crate) generation: u64,
}

/// Shared authentication state of one session.
#[derive(Debug, Default)]
pub(crate) struct AuthState {
    ticket: RwLock<Option<Arc<SessionTicket>>>,
    /// Serializes login exchanges: at most one refresh in flight.
    refresh: Mutex<()>,
    generation: AtomicU64,
}

impl Session {
    /// Perform the login exchange now instead of lazily on the first request.
    ///
    /// Replaces any ticket the session already holds. A rejected exchange is
    /// `Error::Authentication` and is not retried.
    pub async fn login(&self) -> Result<(), Error> {
        let _guard = self.auth.refresh.lock().await;
        self.perform_login().await?;
        Ok(())
    }

    /// End the current session on the controller and drop the held ticket.
    ///
    /// A session with no live ticket logs out as a no-op.
    pub async fn logout(&self) -> Result<(), Error> {
        let ticket = self.auth.ticket.write().await.take();
        let Some(ticket) = ticket else {
            return Ok(());
        };
        let url = self.base_url.join(&self.profile.logout_path)?;
        debug!("logging out at {url}");
        let request = self.apply_call_headers(self.http.post(url), &ticket, &self.defaults);
        request.send().await.map_err(Error::Transport)?;
        Ok(())
    }

    /// Return a valid session ticket, performing the login exchange if the
    /// session holds none.
    ///
    /// Concurrent callers during a refresh wait on the refresh lock and
    /// share the single exchange's result rather than logging in again.
    pub(crate) async fn ensure_session(&self) -> Result<Arc<SessionTicket>, Error> {
        if let Some(ticket) = self.auth.ticket.read().await.as_ref() {
            return Ok(Arc::clone(ticket));
        }
        let _guard = self.auth.refresh.lock().await;
        // Re-check under the lock: another caller may have refreshed while
        // this one waited.
        if let Some(ticket) = self.auth.ticket.read().await.as_ref() {
            return Ok(Arc::clone(ticket));
        }
        self.perform_login().await
    }

    /// Drop the held ticket so the next request refreshes, but only if it is
    /// still the ticket the failed request was sent with.
    pub(crate) async fn invalidate(&self, generation: u64) {
        let mut guard = self.auth.ticket.write().await;
        if guard.as_ref().is_some_and(|t| t.generation == generation) {
            debug!("session ticket invalidated");
            *guard = None;
        }
    }

    /// The login exchange itself. Callers must hold the refresh lock.
    async fn perform_login(&self) -> Result<Arc<SessionTicket>, Error> {
        let url = self.base_url.join(&self.profile.login_path)?;
        debug!("logging in at {url}");

        let body = self.credentials.login_body()?;
        let response = self
            .http
            .post(url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {text}"),
            });
        }

        let mut session_id = None;
        let mut csrf_token = None;
        for cookie in response.cookies() {
            if cookie.name() == self.profile.session_cookie {
                session_id = Some(cookie.value().to_owned());
            } else if cookie.name() == self.profile.csrf_cookie {
                csrf_token = Some(cookie.value().to_owned());
            }
        }
        let Some(session_id) = session_id else {
            return Err(Error::Authentication {
                message: format!(
                    "login response did not set the '{}' cookie",
                    self.profile.session_cookie
                ),
            });
        };

        let generation = self.auth.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = Arc::new(SessionTicket {
            session_id,
            csrf_token,
            generation,
        });
        *self.auth.ticket.write().await = Some(Arc::clone(&ticket));
        debug!("login successful");
        Ok(ticket)
    }
}
