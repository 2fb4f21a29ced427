//! HTTP client for the Controller admin API.
//!
//! This module provides the [`ControllerApi`] trait used by every resource and
//! the [`HttpControllerApi`] implementation talking to a real Controller. All
//! requests carry the negotiated media type in `Accept` and the session's
//! bearer token; bodies are exchanged as untyped JSON because the engine only
//! interprets the fields it manages.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use appgate_sdp_auth::SessionManager;
use appgate_sdp_core::ControllerVersion;

use crate::error::{self, ControlError, Result};

/// Page bound used for name lookups.
pub const NAME_QUERY_RANGE: &str = "0-10";

/// Query parameters for list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Server-side substring filter.
    pub query: Option<String>,
    /// Sort key.
    pub order_by: Option<String>,
    /// Result range, e.g. `0-10`.
    pub range: Option<String>,
}

impl ListQuery {
    /// A ranged, name-ordered query filtering on `name`.
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            query: Some(name.into()),
            order_by: Some("name".to_string()),
            range: Some(NAME_QUERY_RANGE.to_string()),
        }
    }

    /// The query as URL parameters.
    #[must_use]
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(q) = &self.query {
            params.push(("query", q.clone()));
        }
        if let Some(o) = &self.order_by {
            params.push(("orderBy", o.clone()));
        }
        if let Some(r) = &self.range {
            params.push(("range", r.clone()));
        }
        params
    }
}

/// Trait for Controller communication.
///
/// This trait abstracts the admin API, allowing for in-memory implementations
/// in tests.
#[async_trait]
pub trait ControllerApi: Send + Sync {
    /// The version reported by the Controller at login.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be established.
    async fn controller_version(&self) -> Result<ControllerVersion>;

    /// `GET path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the Controller answers non-2xx.
    async fn get(&self, path: &str) -> Result<Value>;

    /// `GET path?query` on a list endpoint, returning the `data` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the Controller answers non-2xx.
    async fn list(&self, path: &str, query: &ListQuery) -> Result<Vec<Value>>;

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the Controller answers non-2xx.
    async fn post(&self, path: &str, body: &Value) -> Result<Value>;

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the Controller answers non-2xx.
    async fn put(&self, path: &str, body: &Value) -> Result<Value>;

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the Controller answers non-2xx.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Extract the entries of a list answer.
///
/// The Controller wraps collections as `{"data": [...]}`; a bare array is
/// accepted as well.
#[must_use]
pub fn list_entries(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// HTTP client for the Controller admin API.
#[derive(Debug, Clone)]
pub struct HttpControllerApi {
    sessions: Arc<SessionManager>,
}

impl HttpControllerApi {
    /// Create a client on top of a session manager.
    #[must_use]
    pub const fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// The session manager.
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&'static str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut reauthenticated = false;

        loop {
            let session = self.sessions.session().await?;
            let url = format!("{}{path}", session.base_url());

            let mut request = self
                .sessions
                .http_client()
                .request(method.clone(), &url)
                .header(ACCEPT, session.protocol().media_type())
                .header(AUTHORIZATION, session.authorization());
            if !params.is_empty() {
                request = request.query(params);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::debug!(method = %method, path = %path, "Controller request");

            let response = request
                .send()
                .await
                .map_err(|e| ControlError::Transport(format!("{method} {path}: {e}")))?;
            let status = response.status();

            // A token revoked server-side gets one fresh login.
            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                self.sessions.invalidate(&session).await;
                reauthenticated = true;
                continue;
            }

            let text = response
                .text()
                .await
                .map_err(|e| ControlError::Transport(format!("{method} {path}: {e}")))?;

            if status.is_success() {
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                return Ok(serde_json::from_str(&text)?);
            }

            let err = error::from_response(status.as_u16(), &text);
            if status != StatusCode::NOT_FOUND {
                tracing::error!(
                    method = %method,
                    path = %path,
                    status = %status,
                    error = %err,
                    "Controller request failed"
                );
            }
            return Err(err);
        }
    }
}

#[async_trait]
impl ControllerApi for HttpControllerApi {
    async fn controller_version(&self) -> Result<ControllerVersion> {
        Ok(self.sessions.session().await?.controller_version())
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.send(Method::GET, path, &[], None).await
    }

    async fn list(&self, path: &str, query: &ListQuery) -> Result<Vec<Value>> {
        let body = self.send(Method::GET, path, &query.params(), None).await?;
        Ok(list_entries(body))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, &[], None).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appgate_sdp_auth::ProviderConfig;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api(server: &MockServer) -> HttpControllerApi {
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok",
                "expires": "2099-01-01T00:00:00Z",
                "version": "6.2.0"
            })))
            .mount(server)
            .await;

        let config =
            ProviderConfig::new(format!("{}/admin", server.uri())).with_credentials("admin", "pw");
        HttpControllerApi::new(Arc::new(SessionManager::new(config).unwrap()))
    }

    #[tokio::test]
    async fn list_sends_name_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/entitlements"))
            .and(query_param("query", "web"))
            .and(query_param("orderBy", "name"))
            .and(query_param("range", "0-10"))
            .and(header("authorization", "Bearer tok"))
            .and(header("accept", "application/vnd.appgate.peer-v20+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "1", "name": "web"}, {"id": "2", "name": "webshop"}]
            })))
            .mount(&server)
            .await;

        let api = api(&server).await;
        let items = api
            .list("/entitlements", &ListQuery::by_name("web"))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            api.controller_version().await.unwrap(),
            ControllerVersion::V6_2
        );
    }

    #[tokio::test]
    async fn not_found_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/sites/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"id": "not found"})))
            .mount(&server)
            .await;

        let api = api(&server).await;
        let err = api.get("/sites/missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn unauthorized_triggers_one_relogin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/globalSettings"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/globalSettings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"collectiveId": "c1"})))
            .mount(&server)
            .await;

        let api = api(&server).await;
        let body = api.get("/globalSettings").await.unwrap();
        assert_eq!(body["collectiveId"], "c1");
    }

    #[tokio::test]
    async fn delete_accepts_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/admin/policies/p1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let api = api(&server).await;
        api.delete("/policies/p1").await.unwrap();
    }

    #[test]
    fn list_entries_accepts_both_shapes() {
        assert_eq!(list_entries(json!({"data": [1, 2]})).len(), 2);
        assert_eq!(list_entries(json!([1])).len(), 1);
        assert!(list_entries(json!({"range": "0-0"})).is_empty());
    }
}
