//! Controller login client.
//!
//! This module builds the HTTP transport shared by every Controller call and
//! performs the `POST /login` exchange, including the `406 Not Acceptable`
//! answer a Controller gives when it does not speak the requested peer API
//! version.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use appgate_sdp_core::{ControllerVersion, DeviceId, ProtocolVersion};

use crate::error::{AuthError, Result};
use crate::ProviderConfig;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("terraform-provider-appgatesdp/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client used for every Controller call.
///
/// The connect timeout covers both the TCP dial and the TLS handshake and is
/// set to the configured timeout; whole requests may take twice as long.
///
/// # Errors
///
/// Returns `AuthError::ConfigInvalid` if the client cannot be constructed.
pub fn build_http_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    let timeout = config.timeout();
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .connect_timeout(timeout)
        .timeout(timeout * 2)
        .danger_accept_invalid_certs(config.insecure)
        .build()
        .map_err(|e| AuthError::ConfigInvalid(format!("failed to create HTTP client: {e}")))
}

/// Request payload for `POST /login`.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Identity provider to authenticate against.
    pub provider_name: String,
    /// Admin username.
    pub username: String,
    /// Admin password.
    pub password: String,
    /// Per-process device id.
    pub device_id: DeviceId,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("provider_name", &self.provider_name)
            .field("username", &self.username)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

/// Result of a successful login.
#[derive(Clone)]
pub struct LoginResponse {
    /// Bearer token for subsequent calls.
    pub token: String,
    /// When the token expires, if the Controller said so.
    pub expires: Option<DateTime<Utc>>,
    /// Version reported by the Controller.
    pub controller_version: ControllerVersion,
    /// Protocol version the login succeeded with.
    pub protocol: ProtocolVersion,
}

/// Raw login answer.
#[derive(Debug, Deserialize)]
struct RawLoginResponse {
    token: String,
    #[serde(default)]
    expires: Option<DateTime<Utc>>,
    #[serde(default)]
    version: Option<String>,
}

/// Body of a `406 Not Acceptable` answer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotAcceptable {
    min_supported_version: u16,
    max_supported_version: u16,
}

/// Generic Controller error body.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    message: Option<String>,
}

/// Client for the Controller login endpoint.
#[derive(Debug, Clone)]
pub struct LoginClient {
    client: reqwest::Client,
    login_url: String,
}

impl LoginClient {
    /// Create a login client on top of an existing HTTP client.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            login_url: config.login_url(),
        }
    }

    /// Perform a single login attempt with the given protocol version.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The Controller cannot be reached (`TransportDown`)
    /// - The credentials are refused (`AuthRejected`)
    /// - The protocol version is not accepted (`UnsupportedProtocol`)
    /// - The answer carries no usable version (`VersionUnreadable`)
    pub async fn login(
        &self,
        request: &LoginRequest,
        protocol: ProtocolVersion,
    ) -> Result<LoginResponse> {
        let accept = HeaderValue::from_str(&protocol.media_type())
            .map_err(|e| AuthError::Internal(format!("invalid Accept header: {e}")))?;

        tracing::debug!(url = %self.login_url, protocol = %protocol, "Logging in to Controller");

        let response = self
            .client
            .post(&self.login_url)
            .header(ACCEPT, accept)
            .json(request)
            .send()
            .await
            .map_err(|e| AuthError::TransportDown(format!("login request failed: {e}")))?;

        Self::handle_response(response, protocol).await
    }

    /// Handle the HTTP response and convert to `LoginResponse`.
    async fn handle_response(
        response: reqwest::Response,
        protocol: ProtocolVersion,
    ) -> Result<LoginResponse> {
        let status = response.status();

        if status.is_success() {
            let raw: RawLoginResponse = response
                .json()
                .await
                .map_err(|e| AuthError::VersionUnreadable(format!("invalid login response: {e}")))?;

            let version = raw.version.ok_or_else(|| {
                AuthError::VersionUnreadable("login response carries no version".to_string())
            })?;
            let controller_version: ControllerVersion = version
                .parse()
                .map_err(|e: appgate_sdp_core::CoreError| AuthError::VersionUnreadable(e.to_string()))?;

            return Ok(LoginResponse {
                token: raw.token,
                expires: raw.expires,
                controller_version,
                protocol,
            });
        }

        if status == StatusCode::NOT_ACCEPTABLE {
            let body: NotAcceptable = response.json().await.map_err(|e| {
                AuthError::Internal(format!("unreadable 406 answer from login: {e}"))
            })?;
            return Err(AuthError::UnsupportedProtocol {
                requested: protocol.get(),
                min_supported: body.min_supported_version,
                max_supported: body.max_supported_version,
            });
        }

        let message = response
            .json::<ErrorEnvelope>()
            .await
            .ok()
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("HTTP {status}"));

        if status.is_server_error() {
            Err(AuthError::TransportDown(message))
        } else {
            Err(AuthError::AuthRejected(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ProviderConfig {
        ProviderConfig::new(format!("{}/admin", server.uri())).with_credentials("admin", "pw")
    }

    fn request() -> LoginRequest {
        LoginRequest {
            provider_name: "local".to_string(),
            username: "admin".to_string(),
            password: "pw".to_string(),
            device_id: DeviceId::generate(),
        }
    }

    #[test]
    fn login_request_serializes_camel_case() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["providerName"], "local");
        assert!(json.get("deviceId").is_some());
        assert!(!format!("{:?}", request()).contains("pw\""));
    }

    #[tokio::test]
    async fn login_captures_token_and_version() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .and(header("accept", "application/vnd.appgate.peer-v18+json"))
            .and(body_partial_json(serde_json::json!({"username": "admin"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "abc",
                "expires": "2030-01-01T00:00:00Z",
                "version": "6.2.1-31415-release"
            })))
            .mount(&server)
            .await;

        let cfg = config(&server);
        let client = LoginClient::new(build_http_client(&cfg).unwrap(), &cfg);
        let response = client
            .login(&request(), ProtocolVersion::new(18).unwrap())
            .await
            .unwrap();

        assert_eq!(response.token, "abc");
        assert_eq!(response.controller_version, ControllerVersion::new(6, 2, 1));
        assert!(response.expires.is_some());
    }

    #[tokio::test]
    async fn login_without_version_is_unreadable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "abc", "version": "latest"})),
            )
            .mount(&server)
            .await;

        let cfg = config(&server);
        let client = LoginClient::new(build_http_client(&cfg).unwrap(), &cfg);
        let err = client
            .login(&request(), ProtocolVersion::MAX)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::VersionUnreadable(_)));
    }

    #[tokio::test]
    async fn login_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"id": "unauthorized", "message": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let cfg = config(&server);
        let client = LoginClient::new(build_http_client(&cfg).unwrap(), &cfg);
        let err = client
            .login(&request(), ProtocolVersion::MAX)
            .await
            .err()
            .unwrap();
        match err {
            AuthError::AuthRejected(message) => assert_eq!(message, "Invalid credentials"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_not_acceptable_reports_supported_range() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(ResponseTemplate::new(406).set_body_json(serde_json::json!({
                "id": "not acceptable",
                "minSupportedVersion": 13,
                "maxSupportedVersion": 17
            })))
            .mount(&server)
            .await;

        let cfg = config(&server);
        let client = LoginClient::new(build_http_client(&cfg).unwrap(), &cfg);
        let err = client
            .login(&request(), ProtocolVersion::MAX)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AuthError::UnsupportedProtocol {
                requested: 20,
                min_supported: 13,
                max_supported: 17
            }
        ));
    }
}
