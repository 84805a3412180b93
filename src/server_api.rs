//! Client→server control requests.

use crate::error::{NarratorError, Result};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Requests the session sends to the narration server.
///
/// This trait allows swapping implementations (HTTP vs mock).
#[async_trait::async_trait]
pub trait ServerApi: Send + Sync {
    /// Ask the server to advance to the next text unit.
    async fn request_next(&self) -> Result<()>;

    /// Set the server-side monitoring (`back`) flag.
    async fn set_monitoring(&self, enabled: bool) -> Result<()>;
}

pub struct HttpServerApi {
    client: reqwest::Client,
    next_url: String,
    monitoring_url: String,
}

impl HttpServerApi {
    pub fn new(next_url: impl Into<String>, monitoring_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            next_url: next_url.into(),
            monitoring_url: monitoring_url.into(),
        }
    }
}

fn request_error(e: reqwest::Error) -> NarratorError {
    NarratorError::ServerRequest {
        message: e.to_string(),
    }
}

fn check_status(response: &reqwest::Response) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(NarratorError::ServerRequest {
            message: format!("{} returned {}", response.url(), response.status()),
        })
    }
}

#[async_trait::async_trait]
impl ServerApi for HttpServerApi {
    async fn request_next(&self) -> Result<()> {
        debug!(url = %self.next_url, "Requesting next text");
        let response = self
            .client
            .get(&self.next_url)
            .send()
            .await
            .map_err(request_error)?;
        check_status(&response)
    }

    async fn set_monitoring(&self, enabled: bool) -> Result<()> {
        debug!(url = %self.monitoring_url, enabled, "Setting server monitoring");
        let response = self
            .client
            .put(&self.monitoring_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(enabled.to_string())
            .send()
            .await
            .map_err(request_error)?;
        check_status(&response)
    }
}

/// A request observed by [`MockServerApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCall {
    Next,
    SetMonitoring(bool),
}

/// Mock server API for testing
#[derive(Clone, Default)]
pub struct MockServerApi {
    calls: Arc<Mutex<Vec<ServerCall>>>,
    should_fail: bool,
}

impl MockServerApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail every request
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn calls(&self) -> Vec<ServerCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: ServerCall) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.should_fail {
            return Err(NarratorError::ServerRequest {
                message: "mock server unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ServerApi for MockServerApi {
    async fn request_next(&self) -> Result<()> {
        self.record(ServerCall::Next)
    }

    async fn set_monitoring(&self, enabled: bool) -> Result<()> {
        self.record(ServerCall::SetMonitoring(enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_stub::{respond_with, serve_once};

    #[tokio::test]
    async fn mock_records_calls() {
        let api = MockServerApi::new();
        api.request_next().await.unwrap();
        api.set_monitoring(true).await.unwrap();
        assert_eq!(
            api.calls(),
            vec![ServerCall::Next, ServerCall::SetMonitoring(true)]
        );
    }

    #[tokio::test]
    async fn mock_failure_still_records() {
        let api = MockServerApi::new().with_failure();
        assert!(matches!(
            api.request_next().await,
            Err(NarratorError::ServerRequest { .. })
        ));
        assert_eq!(api.calls(), vec![ServerCall::Next]);
    }

    #[tokio::test]
    async fn http_request_to_closed_port_fails() {
        let api = HttpServerApi::new("http://127.0.0.1:9/next", "http://127.0.0.1:9/monitoring");
        assert!(matches!(
            api.request_next().await,
            Err(NarratorError::ServerRequest { .. })
        ));
    }

    #[tokio::test]
    async fn http_request_next_gets_next_endpoint() {
        let (base, seen) = serve_once(|stream| respond_with(stream, "200 OK", "")).await;
        let api = HttpServerApi::new(format!("{base}/next"), format!("{base}/monitoring"));

        api.request_next().await.unwrap();
        assert_eq!(seen.await.unwrap().request_line(), "GET /next HTTP/1.1");
    }

    #[tokio::test]
    async fn http_set_monitoring_puts_json_boolean() {
        let (base, seen) = serve_once(|stream| respond_with(stream, "204 No Content", "")).await;
        let api = HttpServerApi::new(format!("{base}/next"), format!("{base}/monitoring"));

        api.set_monitoring(true).await.unwrap();
        let request = seen.await.unwrap();
        assert_eq!(request.request_line(), "PUT /monitoring HTTP/1.1");
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.body, "true");
    }

    #[tokio::test]
    async fn http_error_status_is_server_error() {
        let (base, _seen) =
            serve_once(|stream| respond_with(stream, "503 Service Unavailable", "busy")).await;
        let api = HttpServerApi::new(format!("{base}/next"), format!("{base}/monitoring"));

        match api.request_next().await {
            Err(NarratorError::ServerRequest { message }) => assert!(message.contains("503")),
            other => panic!("Expected ServerRequest, got {other:?}"),
        }
    }
}
