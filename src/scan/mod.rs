pub mod coordinator;

pub use coordinator::{run_scan, ScanContext};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::crawler::Fetcher;
use crate::pool::{PoolConfig, WorkerPool};
use crate::progress::ProgressBus;
use crate::scanner::ScanTaskRunner;
use crate::storage::ScanStore;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the shared fetcher and worker pool and the lifecycle of every scan.
/// `start` is fire-and-forget: the HTTP handler returns immediately while
/// the coordinator task runs the scan, tied to a per-scan cancellation
/// token.
pub struct ScanManager {
    ctx: ScanContext,
    scans: RwLock<HashMap<String, CancellationToken>>,
}

impl ScanManager {
    pub fn new(config: Arc<Config>, store: Arc<dyn ScanStore>, bus: Arc<ProgressBus>) -> Self {
        let fetcher = Arc::new(Fetcher::new(
            &config.user_agent,
            config.http_timeout,
            config.rate_limit_delay,
            config.max_concurrent_requests,
            config.http_max_body_bytes,
        ));
        let runner = Arc::new(ScanTaskRunner::new(fetcher.clone()));
        let pool = Arc::new(WorkerPool::new(
            PoolConfig {
                worker_count: config.worker_count,
                rate_limit_delay: config.rate_limit_delay,
                max_concurrent_requests: config.max_concurrent_requests,
                drain_timeout: DRAIN_TIMEOUT,
            },
            runner,
        ));

        ScanManager {
            ctx: ScanContext {
                config,
                fetcher,
                pool,
                store,
                bus,
            },
            scans: RwLock::new(HashMap::new()),
        }
    }

    /// Launch a scan in the background. The scan record must already exist
    /// in the store (status `pending`).
    pub async fn start(&self, scan_id: &str, seed: Url) {
        let token = CancellationToken::new();
        self.scans
            .write()
            .await
            .insert(scan_id.to_string(), token.clone());

        let ctx = self.ctx.clone();
        let scan_id = scan_id.to_string();
        tokio::spawn(async move {
            run_scan(ctx, scan_id, seed, token).await;
        });
    }

    /// Cancel a running scan. Returns false when the scan is unknown.
    pub async fn cancel(&self, scan_id: &str) -> bool {
        match self.scans.write().await.remove(scan_id) {
            Some(token) => {
                token.cancel();
                self.ctx.bus.remove(scan_id);
                true
            }
            None => false,
        }
    }

    /// Cancel everything and drain the worker pool.
    pub async fn shutdown(&self) {
        for (_, token) in self.scans.write().await.drain() {
            token.cancel();
        }
        self.ctx.pool.shutdown().await;
    }
}
