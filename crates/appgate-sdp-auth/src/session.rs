//! Authenticated sessions and the token single-flight gate.
//!
//! A [`SessionManager`] owns the login state for one `(url, username,
//! provider)` triple. Callers ask it for the current [`Session`]; when no
//! session exists yet or the token is about to expire, exactly one caller
//! performs the login while concurrent callers wait on the same gate and then
//! share the result.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use appgate_sdp_core::{ControllerVersion, DeviceId, ProtocolVersion, VersionGate};

use crate::client::{build_http_client, LoginClient, LoginRequest, LoginResponse};
use crate::error::{AuthError, Result};
use crate::ProviderConfig;

/// Tokens are renewed this long before the Controller says they expire.
const EXPIRY_MARGIN: chrono::Duration = chrono::Duration::seconds(60);

/// First delay between login attempts against an unreachable Controller.
const LOGIN_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for the delay between login attempts.
const LOGIN_MAX_DELAY: Duration = Duration::from_secs(5);

/// An authenticated Controller session.
#[derive(Clone)]
pub struct Session {
    base_url: String,
    token: String,
    expires: Option<DateTime<Utc>>,
    controller_version: ControllerVersion,
    protocol: ProtocolVersion,
    insecure: bool,
}

impl Session {
    /// Build a session from a login answer.
    #[must_use]
    pub fn new(base_url: impl Into<String>, login: LoginResponse, insecure: bool) -> Self {
        Self {
            base_url: base_url.into(),
            token: login.token,
            expires: login.expires,
            controller_version: login.controller_version,
            protocol: login.protocol,
            insecure,
        }
    }

    /// The Controller admin API root.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// The Controller version captured at the first login.
    #[must_use]
    pub const fn controller_version(&self) -> ControllerVersion {
        self.controller_version
    }

    /// The negotiated peer API protocol version.
    #[must_use]
    pub const fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Whether TLS verification is disabled.
    #[must_use]
    pub const fn insecure(&self) -> bool {
        self.insecure
    }

    /// A version gate for the connected Controller.
    #[must_use]
    pub const fn gate(&self) -> VersionGate {
        VersionGate::new(self.controller_version)
    }

    /// Returns true if the token must be renewed before use at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires
            .is_some_and(|expires| expires - EXPIRY_MARGIN <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("expires", &self.expires)
            .field("controller_version", &self.controller_version)
            .field("protocol", &self.protocol)
            .field("insecure", &self.insecure)
            .finish()
    }
}

/// Identity of a session: one session per Controller URL, user and provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Normalised Controller URL.
    pub url: String,
    /// Admin username.
    pub username: String,
    /// Identity provider used for login.
    pub provider_name: String,
}

impl From<&ProviderConfig> for SessionKey {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            url: config.url.clone(),
            username: config.username.clone().unwrap_or_default(),
            provider_name: config.provider_name.clone(),
        }
    }
}

/// Owns the login state for one [`SessionKey`].
pub struct SessionManager {
    config: ProviderConfig,
    http: reqwest::Client,
    login: LoginClient,
    device_id: DeviceId,
    current: tokio::sync::Mutex<Option<Arc<Session>>>,
    protocol: Mutex<ProtocolVersion>,
    first_version: Mutex<Option<ControllerVersion>>,
}

impl SessionManager {
    /// Validate the configuration and prepare the HTTP transport.
    ///
    /// No network traffic happens until [`SessionManager::session`] is called.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ConfigInvalid` for unusable configuration.
    pub fn new(mut config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let http = build_http_client(&config)?;
        let login = LoginClient::new(http.clone(), &config);
        let protocol = config.protocol()?;

        Ok(Self {
            config,
            http,
            login,
            device_id: DeviceId::generate(),
            current: tokio::sync::Mutex::new(None),
            protocol: Mutex::new(protocol),
            first_version: Mutex::new(None),
        })
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The shared HTTP client.
    #[must_use]
    pub const fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    /// The key this manager is registered under.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey::from(&self.config)
    }

    /// The current session, logging in first when needed.
    ///
    /// Concurrent callers share a single login.
    ///
    /// # Errors
    ///
    /// Returns the login error when no valid session can be established.
    pub async fn session(&self) -> Result<Arc<Session>> {
        let mut current = self.current.lock().await;

        if let Some(session) = current.as_ref() {
            if !session.is_expired_at(Utc::now()) {
                return Ok(Arc::clone(session));
            }
            tracing::debug!(url = %self.config.url, "Session token expired, logging in again");
        }

        let session = Arc::new(self.login_with_retry().await?);
        *current = Some(Arc::clone(&session));
        Ok(session)
    }

    /// The bearer token of the current session.
    ///
    /// # Errors
    ///
    /// Returns the login error when no valid session can be established.
    pub async fn token(&self) -> Result<String> {
        Ok(self.session().await?.token().to_string())
    }

    /// Drop `stale` so the next caller logs in again.
    ///
    /// Has no effect if another caller already replaced it.
    pub async fn invalidate(&self, stale: &Session) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|s| s.token == stale.token) {
            tracing::debug!(url = %self.config.url, "Invalidating rejected session token");
            *current = None;
        }
    }

    fn login_request(&self) -> LoginRequest {
        LoginRequest {
            provider_name: self.config.provider_name.clone(),
            username: self.config.username.clone().unwrap_or_default(),
            password: self.config.password.clone().unwrap_or_default(),
            device_id: self.device_id,
        }
    }

    async fn login_with_retry(&self) -> Result<Session> {
        let deadline = Instant::now() + self.config.login_timeout();
        let mut delay = LOGIN_INITIAL_DELAY;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.login_negotiated().await {
                Ok(response) => return Ok(self.make_session(response)),
                Err(e) if e.is_retriable() && Instant::now() + delay < deadline => {
                    tracing::warn!(
                        url = %self.config.url,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Login failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(LOGIN_MAX_DELAY);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn login_negotiated(&self) -> Result<LoginResponse> {
        let request = self.login_request();
        let protocol = *self.protocol.lock();

        match self.login.login(&request, protocol).await {
            Err(AuthError::UnsupportedProtocol {
                requested,
                min_supported,
                max_supported,
            }) => match ProtocolVersion::negotiate(protocol, min_supported, max_supported) {
                Some(negotiated) if negotiated != protocol => {
                    tracing::info!(
                        requested = %protocol,
                        negotiated = %negotiated,
                        "Controller rejected protocol version, renegotiating"
                    );
                    *self.protocol.lock() = negotiated;
                    self.login.login(&request, negotiated).await
                }
                _ => Err(AuthError::UnsupportedProtocol {
                    requested,
                    min_supported,
                    max_supported,
                }),
            },
            other => other,
        }
    }

    fn make_session(&self, mut response: LoginResponse) -> Session {
        let mut first = self.first_version.lock();
        match *first {
            Some(version) => {
                if version != response.controller_version {
                    tracing::warn!(
                        first = %version,
                        reported = %response.controller_version,
                        "Controller reported a different version on re-login, keeping the first"
                    );
                }
                response.controller_version = version;
            }
            None => {
                tracing::info!(
                    url = %self.config.url,
                    version = %response.controller_version,
                    protocol = %response.protocol,
                    "Logged in to Controller"
                );
                *first = Some(response.controller_version);
            }
        }
        Session::new(self.config.url.clone(), response, self.config.insecure)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("key", &self.key())
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

/// Process-wide registry: one [`SessionManager`] per [`SessionKey`].
#[derive(Debug, Default)]
pub struct SessionRegistry {
    managers: Mutex<HashMap<SessionKey, Arc<SessionManager>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The manager for `config`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ConfigInvalid` for unusable configuration.
    pub fn manager(&self, mut config: ProviderConfig) -> Result<Arc<SessionManager>> {
        config.validate()?;
        let key = SessionKey::from(&config);

        let mut managers = self.managers.lock();
        if let Some(existing) = managers.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let manager = Arc::new(SessionManager::new(config)?);
        managers.insert(key, Arc::clone(&manager));
        Ok(manager)
    }

    /// Number of registered managers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.managers.lock().len()
    }

    /// Returns true if no manager is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.managers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ProviderConfig {
        let mut config =
            ProviderConfig::new(format!("{}/admin", server.uri())).with_credentials("admin", "pw");
        config.login_timeout = 5;
        config
    }

    fn login_ok(version: &str, expires: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": format!("token-{version}"),
            "expires": expires,
            "version": version
        }))
    }

    #[tokio::test]
    async fn session_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(login_ok("6.2.0", "2099-01-01T00:00:00Z"))
            .expect(1)
            .mount(&server)
            .await;

        let manager = SessionManager::new(config(&server)).unwrap();
        let first = manager.session().await.unwrap();
        let second = manager.session().await.unwrap();

        assert_eq!(first.token(), second.token());
        assert_eq!(first.controller_version(), ControllerVersion::V6_2);
        assert_eq!(first.authorization(), "Bearer token-6.2.0");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(
                login_ok("6.2.0", "2099-01-01T00:00:00Z").set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = Arc::new(SessionManager::new(config(&server)).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "token-6.2.0");
        }
    }

    #[tokio::test]
    async fn expired_token_relogins_and_keeps_first_version() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(login_ok("6.1.0", "2000-01-01T00:00:00Z"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(login_ok("6.3.0", "2099-01-01T00:00:00Z"))
            .mount(&server)
            .await;

        let manager = SessionManager::new(config(&server)).unwrap();
        let first = manager.session().await.unwrap();
        let second = manager.session().await.unwrap();

        assert_eq!(first.token(), "token-6.1.0");
        assert_eq!(second.token(), "token-6.3.0");
        assert_eq!(second.controller_version(), ControllerVersion::V6_1);
    }

    #[tokio::test]
    async fn renegotiates_protocol_on_not_acceptable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .and(header("accept", "application/vnd.appgate.peer-v20+json"))
            .respond_with(ResponseTemplate::new(406).set_body_json(serde_json::json!({
                "minSupportedVersion": 12,
                "maxSupportedVersion": 17
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .and(header("accept", "application/vnd.appgate.peer-v17+json"))
            .respond_with(login_ok("6.1.2", "2099-01-01T00:00:00Z"))
            .expect(1)
            .mount(&server)
            .await;

        let manager = SessionManager::new(config(&server)).unwrap();
        let session = manager.session().await.unwrap();
        assert_eq!(session.protocol().get(), 17);
        assert!(session.gate().supports(ControllerVersion::V6_1));
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(login_ok("5.5.0", "2099-01-01T00:00:00Z"))
            .mount(&server)
            .await;

        let manager = SessionManager::new(config(&server)).unwrap();
        let session = manager.session().await.unwrap();
        assert_eq!(session.controller_version(), ControllerVersion::V5_5);
    }

    #[tokio::test]
    async fn rejected_credentials_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let manager = SessionManager::new(config(&server)).unwrap();
        let err = manager.session().await.unwrap_err();
        assert!(matches!(err, AuthError::AuthRejected(_)));
    }

    #[tokio::test]
    async fn invalidate_forces_new_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(login_ok("6.0.0", "2099-01-01T00:00:00Z"))
            .expect(2)
            .mount(&server)
            .await;

        let manager = SessionManager::new(config(&server)).unwrap();
        let session = manager.session().await.unwrap();
        manager.invalidate(&session).await;
        manager.session().await.unwrap();
    }

    #[test]
    fn registry_shares_managers_per_key() {
        let registry = SessionRegistry::new();
        let base = ProviderConfig::new("https://ctrl:8443/admin/").with_credentials("admin", "pw");

        let a = registry.manager(base.clone()).unwrap();
        let b = registry
            .manager(ProviderConfig::new("https://ctrl:8443/admin").with_credentials("admin", "pw"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let mut other = base;
        other.provider_name = "ldap".to_string();
        registry.manager(other).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = Session::new(
            "https://ctrl/admin",
            LoginResponse {
                token: "very-secret".to_string(),
                expires: None,
                controller_version: ControllerVersion::V6_0,
                protocol: ProtocolVersion::MAX,
            },
            false,
        );
        assert!(!format!("{session:?}").contains("very-secret"));
        assert!(!session.is_expired_at(Utc::now()));
    }
}
