pub mod fetcher;
pub mod parser;
pub mod scope;

pub use fetcher::{FetchError, FetchResponse, Fetcher};
pub use parser::Parser;
pub use scope::ScopePolicy;

use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::models::Page;
use scope::{canonicalize, canonicalize_str};

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub max_depth: u32,
    pub max_pages: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            max_depth: 3,
            max_pages: 20,
        }
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("seed URL could not be fetched: {0}")]
    SeedUnreachable(#[source] FetchError),
    #[error("seed URL {0} is out of scope")]
    SeedOutOfScope(String),
}

/// Sideband numbers from a finished crawl, kept for the persisted
/// crawl statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub total_links: u32,
    pub visited_urls: u32,
    pub max_depth_reached: u32,
}

/// Bounded BFS over the in-scope link graph.
///
/// Single-threaded by design: the `visited` set and result list are owned by
/// the crawl loop, and every fetch goes through the shared (rate-limited)
/// fetcher.
pub struct Crawler {
    fetcher: Fetcher,
    scope: ScopePolicy,
    config: CrawlerConfig,
}

impl Crawler {
    pub fn new(fetcher: Fetcher, scope: ScopePolicy, config: CrawlerConfig) -> Self {
        Crawler {
            fetcher,
            scope,
            config,
        }
    }

    /// Crawl breadth-first from `seed`. `on_page` fires after each page is
    /// appended, with the page and the running page count.
    ///
    /// Per-page fetch errors are logged and skipped; only a failure on the
    /// seed itself is fatal. Cancellation is honored between iterations.
    pub async fn crawl<F>(
        &self,
        seed: &Url,
        cancel: &CancellationToken,
        mut on_page: F,
    ) -> Result<(Vec<Page>, CrawlSummary), CrawlError>
    where
        F: FnMut(&Page, usize),
    {
        let mut visited: HashSet<String> = HashSet::new();
        let mut results: Vec<Page> = Vec::new();
        let mut summary = CrawlSummary::default();
        let mut queue: VecDeque<(String, u32)> = VecDeque::new();
        // A zero page budget schedules nothing, not even the seed.
        if self.config.max_pages > 0 {
            queue.push_back((canonicalize(seed), 0));
        }

        while let Some((url, depth)) = queue.pop_front() {
            if cancel.is_cancelled() {
                tracing::info!(url = %url, "crawl cancelled");
                break;
            }
            if depth > self.config.max_depth {
                continue;
            }
            if !visited.insert(url.clone()) {
                continue;
            }
            // Scope is re-checked at dequeue time even though enqueue
            // already filtered.
            if !self.scope.in_scope(&url) {
                if depth == 0 {
                    return Err(CrawlError::SeedOutOfScope(url));
                }
                continue;
            }

            let response = match self.fetcher.get(&url).await {
                Ok(response) => response,
                Err(e) if depth == 0 && results.is_empty() => {
                    return Err(CrawlError::SeedUnreachable(e));
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "skipping page after fetch error");
                    continue;
                }
            };

            let parsed = Parser::parse(&response.body, &response.final_url);
            summary.total_links += parsed.links.len() as u32;
            summary.max_depth_reached = summary.max_depth_reached.max(depth);

            let mut links = Vec::new();
            let mut seen_links = HashSet::new();
            for link in &parsed.links {
                let Some(canonical) = canonicalize_str(link) else {
                    continue;
                };
                if self.scope.in_scope(&canonical) && seen_links.insert(canonical.clone()) {
                    links.push(canonical);
                }
            }

            // Discovery stops once the page budget is reached; URLs already
            // scheduled keep draining so BFS level order is preserved.
            if results.len() + 1 < self.config.max_pages && depth < self.config.max_depth {
                for link in &links {
                    if !visited.contains(link) {
                        queue.push_back((link.clone(), depth + 1));
                    }
                }
            }

            let page = Page {
                url,
                title: parsed.title,
                depth,
                links,
                forms: parsed.forms,
            };
            results.push(page);
            if let Some(page) = results.last() {
                on_page(page, results.len());
            }
        }

        summary.visited_urls = visited.len() as u32;
        Ok((results, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Queue/dedup/bound behavior that needs no network is covered here;
    // crawls against a live in-process target live in tests/scan_e2e.rs.

    #[test]
    fn test_config_defaults() {
        let config = CrawlerConfig::default();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.max_pages, 20);
    }

    #[tokio::test]
    async fn test_zero_page_budget_returns_empty() {
        let fetcher = Fetcher::new(
            "test",
            std::time::Duration::from_secs(1),
            std::time::Duration::ZERO,
            1,
            1024,
        );
        let seed = Url::parse("http://192.0.2.1/").unwrap();
        let scope = ScopePolicy::for_seed(&seed).unwrap();
        let crawler = Crawler::new(
            fetcher,
            scope,
            CrawlerConfig {
                max_depth: 3,
                max_pages: 0,
            },
        );
        // A zero budget never schedules the seed, so no request is made
        // against the (unroutable) address.
        let (pages, summary) = crawler
            .crawl(&seed, &CancellationToken::new(), |_, _| {})
            .await
            .unwrap();
        assert!(pages.is_empty());
        assert_eq!(summary.visited_urls, 0);
    }
}
