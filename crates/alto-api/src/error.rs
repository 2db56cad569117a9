use thiserror::Error;

/// Top-level error type for the `alto-api` crate.
///
/// Covers every failure mode of the session core: authentication, transport,
/// controller rejections, name/filter resolution, and payload decoding.
/// Callers can distinguish "does not exist" from "transient" from "rejected"
/// without parsing message strings.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed, or the session was rejected again right after a refresh.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Resolution ──────────────────────────────────────────────────
    /// A name/filter lookup matched zero objects.
    #[error("No {kind} object matched {selector}")]
    NotFound { kind: String, selector: String },

    /// A name/filter lookup matched more than one object. The resolver never
    /// silently picks the first match.
    #[error("{matches} {kind} objects matched {selector}, expected exactly one")]
    Ambiguous {
        kind: String,
        selector: String,
        matches: usize,
    },

    // ── Controller responses ────────────────────────────────────────
    /// The controller rejected the request (4xx other than an auth failure).
    /// Carries the controller's structured payload verbatim; never retried.
    #[error("Controller rejected the request (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<i64>,
    },

    /// The controller failed to serve the request (5xx).
    #[error("Controller error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// A request body could not be serialized to JSON.
    #[error("Request serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A response body did not fit the caller's destination shape,
    /// with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Call validation ─────────────────────────────────────────────
    /// A mutating operation targeted an object path with no identifier.
    /// Raised before any network call is made.
    #[error("Missing object identifier for mutating request to {path}")]
    MissingIdentifier { path: String },

    /// The call was malformed before any network activity (e.g. an object
    /// lookup with no filter, or an unusable header value).
    #[error("Invalid request: {message}")]
    Validation { message: String },

    /// The operation was cancelled via its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if this error indicates the session credential was
    /// rejected and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a "not found" outcome, whether classified
    /// by the resolver or by the controller (HTTP 404).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::Api { status: 404, .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }

    /// Returns `true` if this is a transient failure a caller may retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Server { .. } => true,
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Extract the controller's structured error code, if it supplied one.
    pub fn api_error_code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => *code,
            _ => None,
        }
    }
}
