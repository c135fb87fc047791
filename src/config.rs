use std::env;
use std::time::Duration;

/// Runtime configuration, loaded from environment variables.
/// Every variable has a default so the scanner runs out of the box.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_port: u16,
    pub worker_count: usize,
    pub rate_limit_delay: Duration,
    pub max_concurrent_requests: usize,
    pub max_crawl_depth: u32,
    pub max_crawl_pages: usize,
    pub http_timeout: Duration,
    pub http_max_body_bytes: usize,
    pub user_agent: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_port = parse_var("LISTEN_PORT", 5000u16)?;
        let worker_count = parse_var("WORKER_COUNT", 5usize)?;
        let rate_limit_delay_ms = parse_var("RATE_LIMIT_DELAY_MS", 500u64)?;
        let max_concurrent_requests = parse_var("MAX_CONCURRENT_REQUESTS", 10usize)?;
        let max_crawl_depth = parse_var("MAX_CRAWL_DEPTH", 3u32)?;
        let max_crawl_pages = parse_var("MAX_CRAWL_PAGES", 20usize)?;
        let http_timeout_ms = parse_var("HTTP_TIMEOUT_MS", 10_000u64)?;
        let http_max_body_bytes = parse_var("HTTP_MAX_BODY_BYTES", 2 * 1024 * 1024usize)?;

        let user_agent =
            env::var("USER_AGENT").unwrap_or_else(|_| "SecureScan-Worker/1.0".to_string());

        Ok(Config {
            listen_port,
            worker_count,
            rate_limit_delay: Duration::from_millis(rate_limit_delay_ms),
            max_concurrent_requests,
            max_crawl_depth,
            max_crawl_pages,
            http_timeout: Duration::from_millis(http_timeout_ms),
            http_max_body_bytes,
            user_agent,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    InvalidValue(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        // All cases live in one test: env vars are process-wide and tests
        // run in parallel.
        let config = Config::from_env().unwrap();
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.rate_limit_delay, Duration::from_millis(500));
        assert_eq!(config.max_concurrent_requests, 10);
        assert_eq!(config.max_crawl_depth, 3);
        assert_eq!(config.max_crawl_pages, 20);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.http_max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(config.user_agent, "SecureScan-Worker/1.0");
        assert_eq!(config.listen_port, 5000);

        env::set_var("MAX_CRAWL_PAGES", "not-a-number");
        assert!(Config::from_env().is_err());

        env::set_var("MAX_CRAWL_PAGES", "7");
        let config = Config::from_env().unwrap();
        assert_eq!(config.max_crawl_pages, 7);
        env::remove_var("MAX_CRAWL_PAGES");
    }
}
