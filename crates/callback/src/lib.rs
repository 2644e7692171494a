//! HTTP callback adapter.
//!
//! Implements [`hub::CallbackClient`] with `reqwest`: one JSON `POST` per
//! call, redirects followed, no retries. Retrying is the delivery engine's
//! job; this crate only reports what happened.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport details live here. The delivery
//! engine sees only [`hub::CallbackClient`].

use std::time::Duration;

use async_trait::async_trait;
use hub::{CallbackClient, CallbackError, CallbackResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
/// Default time allowed for a whole request, including the response body.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Transport settings for [`HttpCallbackClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackClientConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for CallbackClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// The HTTP client could not be constructed.
#[derive(Debug, Error)]
#[error("unable to build callback http client: {0}")]
pub struct ClientBuildError(#[from] reqwest::Error);

/// `reqwest`-backed callback client. Cheap to clone; clones share a pool.
#[derive(Debug, Clone)]
pub struct HttpCallbackClient {
    http: reqwest::Client,
}

impl HttpCallbackClient {
    pub fn new(config: CallbackClientConfig) -> Result<Self, ClientBuildError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("hubd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl CallbackClient for HttpCallbackClient {
    #[instrument(skip(self, body), level = "debug")]
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<CallbackResponse, CallbackError> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CallbackError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let status = response.status().as_u16();
        debug!(status, "callback answered");
        Ok(CallbackResponse { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpCallbackClient {
        HttpCallbackClient::new(CallbackClientConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn posts_the_body_as_json() {
        let server = MockServer::start().await;
        let body = json!({ "name": "audit", "type": "heartbeat", "uris": [] });
        Mock::given(method("POST"))
            .and(path("/cb"))
            .and(header("content-type", "application/json"))
            .and(body_json(&body))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let response = client()
            .post(&format!("{}/cb", server.uri()), &body)
            .await
            .unwrap();
        assert!(response.is_acknowledged());
    }

    #[tokio::test]
    async fn non_200_statuses_are_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let response = client().post(&server.uri(), &json!({})).await.unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_acknowledged());
    }

    #[tokio::test]
    async fn redirects_are_followed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(307).insert_header("location", format!("{}/new", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let response = client()
            .post(&format!("{}/old", server.uri()), &json!({ "a": 1 }))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn slow_callbacks_time_out_as_transport_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let client = HttpCallbackClient::new(CallbackClientConfig {
            connect_timeout_secs: 1,
            request_timeout_secs: 1,
        })
        .unwrap();

        let error = client.post(&server.uri(), &json!({})).await.unwrap_err();
        assert!(matches!(error, CallbackError::Transport { .. }));
    }

    #[tokio::test]
    async fn unreachable_hosts_are_transport_errors() {
        let error = client()
            .post("http://127.0.0.1:9/unreachable", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, CallbackError::Transport { .. }));
    }
}
