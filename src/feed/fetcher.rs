use futures::StreamExt;
use reqwest::header::HeaderMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to a single mirror.
///
/// Non-2xx statuses are not errors at this level; they come back as a
/// [`RawResponse`] so the caller can decide what they mean.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// No complete response within the request deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Headers, deadline and size limit applied to every mirror request.
#[derive(Debug, Clone)]
pub struct RequestProfile {
    pub headers: HeaderMap,
    pub timeout: Duration,
    pub max_bytes: usize,
}

/// Status and body of a completed request.
///
/// The body is only read for 2xx responses; for anything else it is empty.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues one GET request bounded by `profile.timeout`.
///
/// The deadline covers connecting, receiving headers and streaming the body.
/// When it expires the in-flight request future is dropped, which closes the
/// connection, and [`FetchError::Timeout`] is returned. The timer is owned by
/// the same future, so it is released on every exit path.
///
/// There are no retries here; moving on to another mirror is the caller's
/// decision.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    profile: &RequestProfile,
) -> Result<RawResponse, FetchError> {
    let request = async {
        let response = client
            .get(url)
            .headers(profile.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(RawResponse {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let bytes = read_limited_bytes(response, profile.max_bytes).await?;
        Ok::<_, FetchError>(RawResponse {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    };

    tokio::time::timeout(profile.timeout, request)
        .await
        .map_err(|_| FetchError::Timeout(profile.timeout))?
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, USER_AGENT};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile(timeout: Duration) -> RequestProfile {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("mirrorfeed-test"));
        RequestProfile {
            headers,
            timeout,
            max_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn test_fetch_success_returns_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(header("user-agent", "mirrorfeed-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<feed></feed>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/search", mock_server.uri());
        let response = fetch(&client, &url, &profile(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<feed></feed>");
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_not_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1) // no internal retries
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let response = fetch(&client, &mock_server.uri(), &profile(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(!response.is_success());
        assert_eq!(response.status, 500);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch(
            &client,
            &mock_server.uri(),
            &profile(Duration::from_millis(100)),
        )
        .await;

        match result {
            Err(FetchError::Timeout(d)) => assert_eq!(d, Duration::from_millis(100)),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch(&client, &mock_server.uri(), &profile(Duration::from_secs(5))).await;

        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        let client = reqwest::Client::new();
        let result = fetch(
            &client,
            "http://127.0.0.1:1/search",
            &profile(Duration::from_secs(5)),
        )
        .await;

        assert!(matches!(result, Err(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn test_fetch_lossy_decodes_invalid_utf8() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'o', b'k', 0xff]))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let response = fetch(&client, &mock_server.uri(), &profile(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(response.body.starts_with("ok"));
    }
}
