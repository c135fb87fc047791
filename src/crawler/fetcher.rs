use futures::StreamExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{redirect, Client, Method};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("server error {status} from {url}")]
    BadStatus { url: String, status: u16 },
    #[error("response from {url} declares more than {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

/// A fetched response. 1xx-4xx statuses land here; only 5xx and transport
/// failures are errors.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub final_url: String,
    /// True when the body hit the configured cap and was cut short.
    pub truncated: bool,
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP fetch primitive shared by the crawler and every active detector.
///
/// Politeness is enforced here so it covers all outbound traffic: a direct
/// rate limiter spaces requests at least `rate_limit_delay` apart, and a
/// semaphore caps how many requests are in flight at once. Clones (including
/// scoped clones) share both.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    limiter: Option<Arc<DirectLimiter>>,
    permits: Arc<Semaphore>,
    max_body_bytes: usize,
    user_agent: String,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        rate_limit_delay: Duration,
        max_concurrent_requests: usize,
        max_body_bytes: usize,
    ) -> Self {
        let client = build_client(user_agent, timeout, redirect::Policy::limited(MAX_REDIRECTS));

        let limiter = Quota::with_period(rate_limit_delay)
            .map(|quota| Arc::new(RateLimiter::direct(quota)));

        Fetcher {
            client,
            limiter,
            permits: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            max_body_bytes,
            user_agent: user_agent.to_string(),
            timeout,
        }
    }

    /// Crawler-mode clone: shares the limiter and in-flight permits but
    /// refuses redirects that leave the scope root.
    pub fn scoped(&self, root: &str) -> Fetcher {
        let root = root.to_ascii_lowercase();
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.stop();
            }
            let in_root = attempt
                .url()
                .host_str()
                .map(|host| host_within(host, &root))
                .unwrap_or(false);
            if in_root {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });

        Fetcher {
            client: build_client(&self.user_agent, self.timeout, policy),
            limiter: self.limiter.clone(),
            permits: self.permits.clone(),
            max_body_bytes: self.max_body_bytes,
            user_agent: self.user_agent.clone(),
            timeout: self.timeout,
        }
    }

    pub async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.fetch(Method::GET, url, None).await
    }

    /// Issue one request. `form` is sent urlencoded in the body (POST probes).
    pub async fn fetch(
        &self,
        method: Method,
        url: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<FetchResponse, FetchError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let _permit =
            self.permits
                .acquire()
                .await
                .map_err(|_| FetchError::Network {
                    url: url.to_string(),
                    message: "fetcher is shut down".to_string(),
                })?;

        let mut request = self.client.request(method, url);
        if let Some(form) = form {
            request = request.form(form);
        }

        let response = request.send().await.map_err(|e| classify(url, e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_body_bytes,
                });
            }
        }

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }
        let final_url = response.url().to_string();

        let mut buf: Vec<u8> = Vec::new();
        let mut truncated = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify(url, e))?;
            if buf.len() + chunk.len() > self.max_body_bytes {
                buf.extend_from_slice(&chunk[..self.max_body_bytes - buf.len()]);
                truncated = true;
                break;
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            status: status.as_u16(),
            headers,
            body: String::from_utf8_lossy(&buf).into_owned(),
            final_url,
            truncated,
        })
    }
}

/// Host equality or subdomain-of test against a registrable root.
pub fn host_within(host: &str, root: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == root || host.ends_with(&format!(".{root}"))
}

fn build_client(user_agent: &str, timeout: Duration, policy: redirect::Policy) -> Client {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .redirect(policy)
        .gzip(true)
        .build()
        .expect("Failed to build HTTP client")
}

fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_within() {
        assert!(host_within("example.com", "example.com"));
        assert!(host_within("sub.example.com", "example.com"));
        assert!(host_within("a.b.example.com", "example.com"));
        assert!(host_within("EXAMPLE.com", "example.com"));
        assert!(!host_within("example.com.evil.net", "example.com"));
        assert!(!host_within("notexample.com", "example.com"));
    }

    #[tokio::test]
    async fn test_unlimited_when_delay_is_zero() {
        let fetcher = Fetcher::new(
            "test",
            Duration::from_secs(1),
            Duration::ZERO,
            2,
            1024,
        );
        assert!(fetcher.limiter.is_none());
    }
}
