use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Underlying reason a fetch failed.
#[derive(Debug, Error)]
pub enum FetchCause {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the 10MB size limit
    #[error("response larger than {0} bytes")]
    ResponseTooLarge(usize),
}

/// A feed document could not be retrieved.
#[derive(Debug, Error)]
#[error("Failed to fetch {url}: {cause}")]
pub struct FetchError {
    pub url: String,
    #[source]
    pub cause: FetchCause,
}

/// Retrieves raw feed documents over HTTP.
///
/// One request per call, no retries. Cloning shares the underlying
/// connection pool.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedFetcher {
    /// Build a fetcher that identifies itself with `user_agent`.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Fetch `url` and return the body as text.
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected; the parser
    /// decides whether what is left is a usable document.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let fail = |cause| FetchError {
            url: url.to_string(),
            cause,
        };

        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| fail(FetchCause::Timeout(self.timeout)))?
            .map_err(|e| fail(classify(e, self.timeout)))?;

        if !response.status().is_success() {
            return Err(fail(FetchCause::HttpStatus(response.status().as_u16())));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE)
            .await
            .map_err(|cause| fail(classify_cause(cause, self.timeout)))?;

        tracing::debug!(feed = %url, bytes = bytes.len(), "Fetched feed document");
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> FetchCause {
    if err.is_timeout() {
        FetchCause::Timeout(timeout)
    } else {
        FetchCause::Network(err)
    }
}

fn classify_cause(cause: FetchCause, timeout: Duration) -> FetchCause {
    match cause {
        FetchCause::Network(e) => classify(e, timeout),
        other => other,
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchCause> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchCause::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchCause::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
