//! One scan's lifecycle: pending → crawling → scanning → completed, with
//! `failed` reachable only while crawling. The coordinator task is the sole
//! writer of its `ScanState`, so counters stay monotonic and every published
//! event is a consistent snapshot.

use chrono::{DateTime, Utc};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::crawler::{Crawler, CrawlerConfig, Fetcher, ScopePolicy};
use crate::models::{
    Category, CrawlStatsRecord, Finding, ProgressEvent, ScanProgress, ScanRecord, ScanStatus,
    ScanTask, Severity, WorkerResult,
};
use crate::pool::WorkerPool;
use crate::progress::ProgressBus;
use crate::storage::ScanStore;

/// The crawl phase owns the first 30 points of the progress bar.
const CRAWL_SHARE: f64 = 30.0;

const STAGE_CRAWLING: &str = "Crawling target website";
const STAGE_SCANNING: &str = "Scanning pages for vulnerabilities";
const STAGE_COMPLETE: &str = "Scan complete";

/// Everything a coordinator needs, shared across all scans.
#[derive(Clone)]
pub struct ScanContext {
    pub config: Arc<Config>,
    pub fetcher: Arc<Fetcher>,
    pub pool: Arc<WorkerPool>,
    pub store: Arc<dyn ScanStore>,
    pub bus: Arc<ProgressBus>,
}

pub fn crawl_progress(pages_found: u32) -> u8 {
    ((pages_found as f64 / pages_found.max(1) as f64) * CRAWL_SHARE).round() as u8
}

pub fn scanning_progress(pages_scanned: u32, total_pages: u32) -> u8 {
    if total_pages == 0 {
        return 100;
    }
    CRAWL_SHARE as u8 + ((pages_scanned as f64 / total_pages as f64) * 70.0).round() as u8
}

struct ScanState {
    scan_id: String,
    url: String,
    status: ScanStatus,
    created_at: DateTime<Utc>,
    start_time: DateTime<Utc>,
    started: Instant,
    total_pages: u32,
    pages_scanned: u32,
    forms_found: u32,
    endpoints_tested: u32,
    findings: Vec<Finding>,
    crawl_stats: Option<CrawlStatsRecord>,
    completed_at: Option<DateTime<Utc>>,
}

impl ScanState {
    fn new(scan_id: String, url: String, created_at: DateTime<Utc>) -> Self {
        ScanState {
            scan_id,
            url,
            status: ScanStatus::Pending,
            created_at,
            start_time: Utc::now(),
            started: Instant::now(),
            total_pages: 0,
            pages_scanned: 0,
            forms_found: 0,
            endpoints_tested: 0,
            findings: Vec::new(),
            crawl_stats: None,
            completed_at: None,
        }
    }

    /// Fold one settled task into the counters. A failed task still counts
    /// as a scanned page, just one that produced nothing.
    fn apply(&mut self, result: WorkerResult) {
        self.pages_scanned += 1;
        debug_assert!(
            self.pages_scanned <= self.total_pages,
            "pages_scanned exceeded total_pages"
        );
        match result.outcome {
            Ok(output) => {
                self.forms_found += output.forms_found;
                self.endpoints_tested += output.endpoints_tested;
                self.findings.extend(output.findings);
            }
            Err(e) => {
                tracing::warn!(scan_id = %self.scan_id, task_id = %result.task_id, error = %e,
                    "page task failed; counting it as zero findings");
            }
        }
    }

    fn estimated_remaining_secs(&self) -> u64 {
        if self.pages_scanned == 0 || self.pages_scanned >= self.total_pages {
            return 0;
        }
        let per_page = self.started.elapsed().as_secs_f64() / self.pages_scanned as f64;
        (per_page * (self.total_pages - self.pages_scanned) as f64) as u64
    }

    fn snapshot(&self, progress: u8, stage: &str, with_findings: bool) -> ScanProgress {
        ScanProgress {
            scan_id: self.scan_id.clone(),
            status: self.status,
            progress,
            pages_scanned: self.pages_scanned,
            total_pages: self.total_pages,
            vulnerabilities_found: self.findings.len() as u32,
            forms_found: self.forms_found,
            endpoints_tested: self.endpoints_tested,
            estimated_time_remaining: self.estimated_remaining_secs(),
            start_time: self.start_time,
            current_stage: stage.to_string(),
            vulnerabilities: with_findings.then(|| self.findings.clone()),
        }
    }

    fn record(&self) -> ScanRecord {
        ScanRecord {
            id: self.scan_id.clone(),
            url: self.url.clone(),
            status: self.status,
            vulnerabilities: self.findings.clone(),
            pages_scanned: self.pages_scanned,
            forms_found: self.forms_found,
            endpoints_tested: self.endpoints_tested,
            crawl_stats: self.crawl_stats.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// Run one scan to a terminal state. Spawned fire-and-forget by the manager;
/// cancellation is honored at crawl iterations and between task settlements.
pub async fn run_scan(ctx: ScanContext, scan_id: String, seed: Url, cancel: CancellationToken) {
    let created_at = ctx
        .store
        .get(&scan_id)
        .await
        .map(|record| record.created_at)
        .unwrap_or_else(Utc::now);
    let mut state = ScanState::new(scan_id.clone(), seed.to_string(), created_at);

    let Some(scope) = ScopePolicy::for_seed(&seed) else {
        fail_scan(&ctx, &mut state, "Unable to scan the target").await;
        return;
    };

    // pending → crawling
    state.status = ScanStatus::Crawling;
    ctx.store.upsert(state.record()).await;
    ctx.bus.publish(
        &scan_id,
        ProgressEvent::Progress(state.snapshot(0, STAGE_CRAWLING, false)),
    );
    tracing::info!(scan_id = %scan_id, url = %seed, "crawl started");

    let crawler = Crawler::new(
        ctx.fetcher.scoped(scope.root()),
        scope,
        CrawlerConfig {
            max_depth: ctx.config.max_crawl_depth,
            max_pages: ctx.config.max_crawl_pages,
        },
    );

    let crawl_outcome = crawler
        .crawl(&seed, &cancel, |_page, found| {
            let found = found as u32;
            let mut snapshot = state.snapshot(crawl_progress(found), STAGE_CRAWLING, false);
            snapshot.total_pages = found;
            ctx.bus.publish(&scan_id, ProgressEvent::Progress(snapshot));
        })
        .await;

    if cancel.is_cancelled() {
        fail_scan(&ctx, &mut state, "Scan cancelled").await;
        return;
    }

    let (pages, summary) = match crawl_outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(scan_id = %scan_id, error = %e, "crawl failed");
            fail_scan(&ctx, &mut state, "Unable to scan the target").await;
            return;
        }
    };

    // crawling → scanning
    state.status = ScanStatus::Scanning;
    state.total_pages = pages.len() as u32;
    state.crawl_stats = Some(CrawlStatsRecord {
        total_pages: pages.len() as u32,
        total_forms: pages.iter().map(|p| p.forms.len() as u32).sum(),
        total_links: summary.total_links,
        visited_urls: summary.visited_urls,
        max_depth_reached: summary.max_depth_reached,
    });
    ctx.store.upsert(state.record()).await;
    if !pages.is_empty() {
        ctx.bus.publish(
            &scan_id,
            ProgressEvent::Progress(state.snapshot(
                scanning_progress(0, state.total_pages),
                STAGE_SCANNING,
                false,
            )),
        );
        tracing::info!(scan_id = %scan_id, pages = pages.len(), "scanning crawled pages");

        let mut pending: FuturesUnordered<_> = pages
            .iter()
            .enumerate()
            .map(|(index, page)| ctx.pool.submit(ScanTask::scan(&scan_id, index, page.clone())))
            .collect();

        // Cancellation during this phase does not abort the scan: submitted
        // pages settle and the scan lands on `completed`. `failed` stays
        // reachable only from the crawling phase.
        while let Some(result) = pending.next().await {
            state.apply(result);
            ctx.store.upsert(state.record()).await;
            // The event for the last page is the completion event below,
            // so progress hits 100 exactly when the status says completed.
            if state.pages_scanned < state.total_pages {
                ctx.bus.publish(
                    &scan_id,
                    ProgressEvent::Progress(state.snapshot(
                        scanning_progress(state.pages_scanned, state.total_pages),
                        STAGE_SCANNING,
                        false,
                    )),
                );
            }
        }
    }

    // scanning → completed
    state.status = ScanStatus::Completed;
    state.completed_at = Some(Utc::now());
    ctx.store.upsert(state.record()).await;
    ctx.bus.publish(
        &scan_id,
        ProgressEvent::Progress(state.snapshot(100, STAGE_COMPLETE, true)),
    );
    tracing::info!(
        scan_id = %scan_id,
        pages_scanned = state.pages_scanned,
        vulnerabilities = state.findings.len(),
        "scan complete"
    );
}

/// Terminal failure: only reachable from the crawling phase. The record
/// stays addressable and carries an explanatory synthetic finding.
async fn fail_scan(ctx: &ScanContext, state: &mut ScanState, message: &str) {
    state.status = ScanStatus::Failed;
    state.findings.push(Finding::new(
        "Scan Error",
        Category::InformationDisclosure,
        Severity::Low,
        message.to_string(),
        state.url.clone(),
        "The target could not be assessed; no coverage was obtained.",
    ));
    ctx.store.upsert(state.record()).await;
    ctx.bus.publish(
        &state.scan_id,
        ProgressEvent::Error {
            scan_id: state.scan_id.clone(),
            message: message.to_string(),
        },
    );
}
