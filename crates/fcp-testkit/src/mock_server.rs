//! Mock streaming server for testing connectors.
//!
//! Wraps wiremock with the patterns streaming endpoints need: a finite
//! delimited body standing in for a live stream, rejection statuses, and
//! access to the form parameters and authorization headers that were sent.

use bytes::Bytes;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A mock streaming API server.
pub struct MockStreamServer {
    server: MockServer,
}

impl MockStreamServer {
    /// Start a new mock server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the base URL of the mock server.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// Get the underlying wiremock server for advanced configuration.
    #[must_use]
    pub const fn inner(&self) -> &MockServer {
        &self.server
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Response Setup
    // ─────────────────────────────────────────────────────────────────────────────

    /// Answer POSTs to `request_path` with status 200 and the given body.
    ///
    /// The body is sent in full and then the response ends, so a client sees
    /// its frames followed by end of stream.
    pub async fn expect_stream(&self, request_path: &str, body: Bytes) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_vec(), "application/json"))
            .mount(&self.server)
            .await;
    }

    /// Answer POSTs to `request_path` with an error status.
    pub async fn expect_status(&self, request_path: &str, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────────

    /// Get all received requests for manual inspection.
    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Form-encoded bodies of every request sent to `request_path`.
    pub async fn received_forms(&self, request_path: &str) -> Vec<Vec<(String, String)>> {
        self.received_requests()
            .await
            .iter()
            .filter(|r| r.url.path() == request_path)
            .map(|r| {
                url::form_urlencoded::parse(&r.body)
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .collect()
    }

    /// `Authorization` header values of every received request.
    pub async fn authorization_headers(&self) -> Vec<String> {
        self.received_requests()
            .await
            .iter()
            .filter_map(|r| r.headers.get("authorization"))
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    /// Verify that a specific number of requests were received.
    ///
    /// # Panics
    ///
    /// Panics if the count doesn't match.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.received_requests().await;
        assert_eq!(
            received.len(),
            expected,
            "Expected {} requests but received {}",
            expected,
            received.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn test_mock_stream_body() {
        let mock = MockStreamServer::start().await;
        mock.expect_stream("/stream", fixtures::delimited_body(&["{}"]))
            .await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/stream", mock.base_url()))
            .form(&[("track", "rust")])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(&response.bytes().await.unwrap()[..], b"4\r\n{}\r\n");
        assert_eq!(
            mock.received_forms("/stream").await,
            vec![vec![("track".to_string(), "rust".to_string())]]
        );
    }

    #[tokio::test]
    async fn test_mock_stream_status() {
        let mock = MockStreamServer::start().await;
        mock.expect_status("/stream", 420, "Enhance Your Calm").await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/stream", mock.base_url()))
            .header("Authorization", "OAuth test")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 420);
        assert_eq!(mock.authorization_headers().await, vec!["OAuth test".to_string()]);
        mock.assert_request_count(1).await;
    }
}
