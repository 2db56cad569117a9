// Session: the explicitly owned handle every operation goes through.
//
// Wraps reqwest::Client with controller URL construction, per-call option
// resolution, credential attachment, and response classification. The CRUD
// surface, the collection walker, and the object resolver are implemented
// as inherent methods in separate files to keep this module focused on
// transport mechanics.

use bytes::Bytes;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::{AuthState, ControllerProfile, Credentials, SessionTicket, TokenProvider};
use crate::error::Error;
use crate::options::ApiOptions;
use crate::transport::TransportConfig;

/// Tenant used when the builder sets none.
pub const DEFAULT_TENANT: &str = "admin";
/// API version used when the builder sets none.
pub const DEFAULT_API_VERSION: &str = "24.1.1";

/// Structured error payload the controller attaches to rejections.
#[derive(serde::Deserialize)]
struct ControllerError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A classified successful response body.
#[derive(Debug)]
pub(crate) struct RawBody {
    pub(crate) status: StatusCode,
    pub(crate) body: Bytes,
}

/// A session against one controller.
///
/// Holds the HTTP client, the credential, session-wide option defaults, and
/// the live session ticket. Cheap to share behind an `Arc`; all methods take
/// `&self` and concurrent calls are safe -- the only shared mutable state is
/// the ticket, which is refreshed under a single-flight lock.
///
/// Multiple sessions against different controllers coexist without
/// interference; there is no process-wide state.
#[derive(Debug)]
pub struct Session {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: Url,
    pub(crate) profile: ControllerProfile,
    pub(crate) defaults: ApiOptions,
    pub(crate) headers: HeaderMap,
    pub(crate) credentials: Credentials,
    pub(crate) auth: AuthState,
}

impl Session {
    /// Start building a session against the controller at `controller_url`.
    pub fn builder(controller_url: impl Into<String>) -> SessionBuilder {
        SessionBuilder {
            controller_url: controller_url.into(),
            credentials: None,
            tenant: None,
            version: None,
            page_size: None,
            transport: TransportConfig::default(),
            profile: ControllerProfile::default(),
            headers: Vec::new(),
        }
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The session-wide option defaults every call is resolved against.
    pub fn defaults(&self) -> &ApiOptions {
        &self.defaults
    }

    /// Ask the controller for its software version.
    pub async fn controller_version(&self) -> Result<String, Error> {
        #[derive(serde::Deserialize)]
        struct InitialData {
            version: VersionInfo,
        }
        #[derive(serde::Deserialize)]
        struct VersionInfo {
            #[serde(rename = "Version")]
            version: String,
        }

        let data: InitialData = self
            .get(
                &crate::path::ApiPath::collection("initial-data"),
                &ApiOptions::new(),
            )
            .await?;
        Ok(data.version.version)
    }

    // ── URL construction ─────────────────────────────────────────────

    /// Join a controller-relative URI onto the base URL and render the
    /// effective options into its query string.
    pub(crate) fn build_url(
        &self,
        uri: &str,
        opts: &ApiOptions,
        paged: bool,
    ) -> Result<Url, Error> {
        let mut url = self.base_url.join(uri)?;
        opts.apply_query(&mut url, paged);
        Ok(url)
    }

    /// Rebase a controller-supplied continuation URL onto this session's
    /// base, keeping its path and query. Controllers behind proxies report
    /// `next` links with their internal host.
    pub(crate) fn rebase(&self, next: &str) -> Result<Url, Error> {
        match Url::parse(next) {
            Ok(parsed) => {
                let mut url = self.base_url.clone();
                url.set_path(parsed.path());
                url.set_query(parsed.query());
                Ok(url)
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.base_url.join(next).map_err(Error::InvalidUrl)
            }
            Err(e) => Err(Error::InvalidUrl(e)),
        }
    }

    // ── Request execution ────────────────────────────────────────────

    /// Issue one API request with the session credential attached.
    ///
    /// A 401/419 reply invalidates the ticket and retries the same request
    /// exactly once with a freshly refreshed one; a second rejection is
    /// terminal. Every other classification is final: 4xx surfaces the
    /// controller's payload, 5xx and socket errors are transport-level.
    pub(crate) async fn send_api(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        opts: &ApiOptions,
    ) -> Result<RawBody, Error> {
        if opts.cancellation().is_some_and(|t| t.is_cancelled()) {
            return Err(Error::Cancelled);
        }

        let mut refreshed = false;
        loop {
            let ticket = self.ensure_session().await?;
            let mut request = self.http.request(method.clone(), url.clone());
            request = self.apply_call_headers(request, &ticket, opts);
            if let Some(body) = body {
                request = request.json(body);
            }
            debug!("{method} {url}");

            let response = request.send().await.map_err(Error::Transport)?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED || status.as_u16() == 419 {
                if refreshed {
                    return Err(Error::Authentication {
                        message: format!("session rejected after refresh (HTTP {status})"),
                    });
                }
                debug!("session expired (HTTP {status}), refreshing and retrying once");
                self.invalidate(ticket.generation).await;
                refreshed = true;
                continue;
            }

            return Self::classify(response).await;
        }
    }

    /// Attach credential, scoping, and version headers to a request.
    pub(crate) fn apply_call_headers(
        &self,
        mut request: reqwest::RequestBuilder,
        ticket: &SessionTicket,
        opts: &ApiOptions,
    ) -> reqwest::RequestBuilder {
        request = request.headers(self.headers.clone());
        if let Some(version) = opts.version() {
            request = request.header(self.profile.version_header.as_str(), version);
        }
        if let Some(tenant) = opts.tenant() {
            request = request.header(self.profile.tenant_header.as_str(), tenant);
        }
        request = request.header(REFERER, self.base_url.as_str());

        let mut cookie = format!("{}={}", self.profile.session_cookie, ticket.session_id);
        if let Some(csrf) = &ticket.csrf_token {
            cookie.push_str(&format!("; {}={}", self.profile.csrf_cookie, csrf));
            request = request.header(self.profile.csrf_header.as_str(), csrf);
        }
        request.header(COOKIE, cookie)
    }

    /// Classify a non-auth response: 2xx yields the body, 4xx carries the
    /// controller's structured payload verbatim, 5xx is a server failure.
    async fn classify(response: reqwest::Response) -> Result<RawBody, Error> {
        let status = response.status();
        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(RawBody {
                    status,
                    body: Bytes::new(),
                });
            }
            let body = response.bytes().await.map_err(Error::Transport)?;
            return Ok(RawBody { status, body });
        }

        let raw = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ControllerError>(&raw).ok();
        let message = parsed
            .as_ref()
            .and_then(|p| p.error.clone().or_else(|| p.message.clone()))
            .unwrap_or_else(|| {
                if raw.is_empty() {
                    status.to_string()
                } else {
                    raw.clone()
                }
            });

        if status.is_server_error() {
            Err(Error::Server {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(Error::Api {
                status: status.as_u16(),
                message,
                code: parsed.and_then(|p| p.code),
            })
        }
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Deserialize a response body into the caller's destination type.
///
/// An empty body decodes as JSON `null`, which fits `Option<T>` and `()`
/// destinations; anything else fails loudly. A shape mismatch is terminal --
/// the destination is never left partially populated.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    if body.is_empty() {
        return serde_json::from_slice(b"null").map_err(|e| Error::Deserialization {
            message: format!("{e} (empty response body)"),
            body: String::new(),
        });
    }
    serde_json::from_slice(body).map_err(|e| {
        let text = String::from_utf8_lossy(body).into_owned();
        let preview: String = text.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: text,
        }
    })
}

/// Deserialize an already-parsed JSON value into the caller's destination.
pub(crate) fn decode_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, Error> {
    let body = value.to_string();
    serde_json::from_value(value).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

// ── Builder ──────────────────────────────────────────────────────────

/// Builder for [`Session`]. `build` does no I/O; authentication happens
/// lazily on the first request, or eagerly via [`Session::login`].
#[derive(Debug)]
pub struct SessionBuilder {
    controller_url: String,
    credentials: Option<Credentials>,
    tenant: Option<String>,
    version: Option<String>,
    page_size: Option<u32>,
    transport: TransportConfig,
    profile: ControllerProfile,
    headers: Vec<(String, String)>,
}

impl SessionBuilder {
    /// Authenticate with username and password.
    pub fn username_password(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::Password {
            username: username.into(),
            password: password.into().into(),
        });
        self
    }

    /// Authenticate with username and a pre-minted auth token.
    pub fn auth_token(mut self, username: impl Into<String>, token: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::Token {
            username: username.into(),
            token: token.into().into(),
        });
        self
    }

    /// Authenticate with a callback that mints a token per login exchange.
    pub fn token_provider(mut self, username: impl Into<String>, provider: TokenProvider) -> Self {
        self.credentials = Some(Credentials::TokenProvider {
            username: username.into(),
            provider,
        });
        self
    }

    /// Session-default tenant (default: `admin`).
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Session-default API version (default: [`DEFAULT_API_VERSION`]).
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Session-default collection page size. When unset, no page-size
    /// parameter is sent and the controller picks.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// TLS and timeout settings.
    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Controller-specific wire names (login path, cookie and header names).
    pub fn profile(mut self, profile: ControllerProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Custom header attached to every request, including login.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Build the session. Fails on an unparsable controller URL, missing
    /// credentials, an unusable custom header, or TLS setup problems.
    pub fn build(self) -> Result<Session, Error> {
        let mut base_url = Url::parse(&self.controller_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let credentials = self.credentials.ok_or_else(|| Error::Validation {
            message: "session credentials are required".to_owned(),
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::try_from(name.as_str()).map_err(|e| Error::Validation {
                message: format!("invalid header name {name:?}: {e}"),
            })?;
            let value = HeaderValue::try_from(value.as_str()).map_err(|e| Error::Validation {
                message: format!("invalid value for header {name}: {e}"),
            })?;
            headers.insert(name, value);
        }

        let mut defaults = ApiOptions::new()
            .with_tenant(self.tenant.unwrap_or_else(|| DEFAULT_TENANT.to_owned()))
            .with_version(
                self.version
                    .unwrap_or_else(|| DEFAULT_API_VERSION.to_owned()),
            );
        if let Some(page_size) = self.page_size {
            defaults = defaults.with_page_size(page_size);
        }

        let http = self.transport.build_client()?;

        Ok(Session {
            http,
            base_url,
            profile: self.profile,
            defaults,
            headers,
            credentials,
            auth: AuthState::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn session() -> Session {
        Session::builder("https://ctrl.example.com:9443")
            .username_password("admin", "secret")
            .build()
            .unwrap()
    }

    #[test]
    fn base_url_gets_a_trailing_slash() {
        assert_eq!(
            session().base_url().as_str(),
            "https://ctrl.example.com:9443/"
        );
    }

    #[test]
    fn build_url_joins_relative_to_base() {
        let url = session()
            .build_url("api/pool/pool-1", &ApiOptions::new(), false)
            .unwrap();
        assert_eq!(url.as_str(), "https://ctrl.example.com:9443/api/pool/pool-1");
    }

    #[test]
    fn builder_without_credentials_is_rejected() {
        let result = Session::builder("https://ctrl.example.com").build();
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    fn defaults_carry_tenant_and_version() {
        let session = session();
        assert_eq!(session.defaults().tenant(), Some(DEFAULT_TENANT));
        assert_eq!(session.defaults().version(), Some(DEFAULT_API_VERSION));
    }

    #[test]
    fn rebase_keeps_path_and_query_from_next_link() {
        let session = session();
        let url = session
            .rebase("https://10.0.0.5/api/pool?page=2&page_size=2")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://ctrl.example.com:9443/api/pool?page=2&page_size=2"
        );
    }

    #[test]
    fn rebase_accepts_relative_next_link() {
        let session = session();
        let url = session.rebase("api/pool?page=2").unwrap();
        assert_eq!(url.as_str(), "https://ctrl.example.com:9443/api/pool?page=2");
    }

    #[test]
    fn decode_body_reports_shape_mismatch() {
        #[derive(serde::Deserialize, Debug)]
        struct Strict {
            #[allow(dead_code)]
            uuid: String,
        }
        let err = decode_body::<Strict>(br#"{"name": "p1"}"#).unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }

    #[test]
    fn decode_body_treats_empty_as_null() {
        let decoded: Option<serde_json::Value> = decode_body(b"").unwrap();
        assert!(decoded.is_none());
    }
}
