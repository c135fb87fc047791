//! Fixed-size worker pool with a rate-limited dispatcher.
//!
//! A single driver task owns the queue and all scheduling state. Workers are
//! plain tokio tasks fed over per-worker channels; they report back on one
//! shared, typed results channel. A worker that panics while holding a task
//! is replaced at the same index and its task fails with `WorkerCrashed`;
//! nothing else in the pool is affected.

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::{Page, ScanTask, TaskFailure, TaskOutput, WorkerResult};

/// The work a pool executes. Object-safe so tests can swap in scripted
/// runners (including ones that panic).
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run(&self, task: &ScanTask) -> Result<TaskOutput, TaskFailure>;
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub worker_count: usize,
    /// Minimum spacing between task dispatches.
    pub rate_limit_delay: Duration,
    /// Cap on tasks in flight across all workers.
    pub max_concurrent_requests: usize,
    /// How long `shutdown` waits for in-flight tasks before aborting them.
    pub drain_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            worker_count: 5,
            rate_limit_delay: Duration::from_millis(500),
            max_concurrent_requests: 10,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub worker_count: usize,
    pub active: usize,
    pub queued: usize,
    pub in_flight: usize,
}

struct QueuedTask {
    task: ScanTask,
    reply: oneshot::Sender<WorkerResult>,
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl Eq for QueuedTask {}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then submission order.
        self.task
            .priority
            .cmp(&other.task.priority)
            .then(other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

enum Command {
    Submit {
        task: ScanTask,
        reply: oneshot::Sender<WorkerResult>,
    },
    Stats(oneshot::Sender<PoolStats>),
}

enum WorkerEvent {
    Finished {
        worker_id: usize,
        task_id: String,
        outcome: Result<TaskOutput, TaskFailure>,
    },
    Crashed {
        worker_id: usize,
        task_id: String,
    },
}

struct ActiveTask {
    task_id: String,
    reply: oneshot::Sender<WorkerResult>,
}

struct WorkerSlot {
    tx: mpsc::Sender<ScanTask>,
    handle: JoinHandle<()>,
    active: Option<ActiveTask>,
}

fn spawn_worker(
    worker_id: usize,
    runner: Arc<dyn TaskRunner>,
    events: mpsc::Sender<WorkerEvent>,
) -> WorkerSlot {
    let (tx, mut rx) = mpsc::channel::<ScanTask>(1);
    let handle = tokio::spawn(async move {
        while let Some(task) = rx.recv().await {
            let task_id = task.task_id.clone();
            match AssertUnwindSafe(runner.run(&task)).catch_unwind().await {
                Ok(outcome) => {
                    if events
                        .send(WorkerEvent::Finished {
                            worker_id,
                            task_id,
                            outcome,
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(_) => {
                    // A panic terminates this worker; the driver spawns a
                    // replacement at the same index.
                    let _ = events.send(WorkerEvent::Crashed { worker_id, task_id }).await;
                    return;
                }
            }
        }
    });
    WorkerSlot {
        tx,
        handle,
        active: None,
    }
}

struct Driver {
    config: PoolConfig,
    runner: Arc<dyn TaskRunner>,
    workers: Vec<WorkerSlot>,
    queue: BinaryHeap<QueuedTask>,
    next_seq: u64,
    in_flight: usize,
    last_dispatch: Option<Instant>,
    cmd_rx: mpsc::Receiver<Command>,
    events_rx: mpsc::Receiver<WorkerEvent>,
    events_tx: mpsc::Sender<WorkerEvent>,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let mut drain_deadline = Instant::now() + self.config.drain_timeout;
        loop {
            let draining = self.shutdown.is_cancelled();
            if draining && self.in_flight == 0 {
                break;
            }

            let has_idle = self.workers.iter().any(|w| w.active.is_none());
            let dispatch_ready = !draining
                && self.in_flight < self.config.max_concurrent_requests
                && has_idle
                && !self.queue.is_empty();
            let next_slot = self
                .last_dispatch
                .map(|t| t + self.config.rate_limit_delay)
                .unwrap_or_else(Instant::now);

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled(), if !draining => {
                    drain_deadline = Instant::now() + self.config.drain_timeout;
                    self.reject_queued();
                }
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                maybe_cmd = self.cmd_rx.recv(), if !draining => match maybe_cmd {
                    Some(cmd) => self.handle_command(cmd),
                    // Every pool handle is gone; begin draining.
                    None => self.shutdown.cancel(),
                },
                _ = sleep_until(drain_deadline), if draining => {
                    self.abort_in_flight();
                    break;
                }
                _ = sleep_until(next_slot), if dispatch_ready => self.dispatch_next(),
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit { task, reply } => {
                self.next_seq += 1;
                self.queue.push(QueuedTask {
                    task,
                    reply,
                    seq: self.next_seq,
                });
            }
            Command::Stats(reply) => {
                let _ = reply.send(PoolStats {
                    worker_count: self.workers.len(),
                    active: self.workers.iter().filter(|w| w.active.is_some()).count(),
                    queued: self.queue.len(),
                    in_flight: self.in_flight,
                });
            }
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Finished {
                worker_id,
                task_id,
                outcome,
            } => {
                self.settle(worker_id, &task_id, outcome);
            }
            WorkerEvent::Crashed { worker_id, task_id } => {
                tracing::warn!(worker = worker_id, task_id = %task_id,
                    "worker crashed; replacing it");
                self.settle(worker_id, &task_id, Err(TaskFailure::WorkerCrashed));
                self.workers[worker_id] =
                    spawn_worker(worker_id, self.runner.clone(), self.events_tx.clone());
            }
        }
    }

    /// Complete the task a worker was holding and mark the worker idle.
    fn settle(
        &mut self,
        worker_id: usize,
        task_id: &str,
        outcome: Result<TaskOutput, TaskFailure>,
    ) {
        match self.workers[worker_id].active.take() {
            Some(active) if active.task_id == task_id => {
                self.in_flight = self.in_flight.saturating_sub(1);
                let _ = active.reply.send(WorkerResult {
                    task_id: active.task_id,
                    worker_id: Some(worker_id),
                    outcome,
                });
            }
            other => {
                debug_assert!(false, "worker {worker_id} settled unknown task {task_id}");
                tracing::error!(worker = worker_id, task_id = %task_id,
                    "result for a task the worker does not hold");
                self.workers[worker_id].active = other;
            }
        }
    }

    fn dispatch_next(&mut self) {
        let Some(idx) = self.workers.iter().position(|w| w.active.is_none()) else {
            return;
        };
        let Some(queued) = self.queue.pop() else {
            return;
        };
        self.last_dispatch = Some(Instant::now());

        let task_id = queued.task.task_id.clone();
        match self.workers[idx].tx.try_send(queued.task) {
            Ok(()) => {
                self.in_flight += 1;
                self.workers[idx].active = Some(ActiveTask {
                    task_id,
                    reply: queued.reply,
                });
            }
            Err(e) => {
                // The task's future is rejected; the worker stays idle.
                tracing::warn!(worker = idx, task_id = %task_id, error = %e,
                    "failed to hand task to worker");
                let _ = queued.reply.send(WorkerResult {
                    task_id,
                    worker_id: Some(idx),
                    outcome: Err(TaskFailure::Dispatch(e.to_string())),
                });
            }
        }
    }

    fn reject_queued(&mut self) {
        for queued in self.queue.drain() {
            let _ = queued.reply.send(WorkerResult {
                task_id: queued.task.task_id,
                worker_id: None,
                outcome: Err(TaskFailure::Shutdown),
            });
        }
    }

    fn abort_in_flight(&mut self) {
        for (worker_id, slot) in self.workers.iter_mut().enumerate() {
            if let Some(active) = slot.active.take() {
                slot.handle.abort();
                self.in_flight = self.in_flight.saturating_sub(1);
                let _ = active.reply.send(WorkerResult {
                    task_id: active.task_id,
                    worker_id: Some(worker_id),
                    outcome: Err(TaskFailure::Shutdown),
                });
            }
        }
    }
}

/// Handle to a running pool. Shared behind an `Arc`; dropping every handle
/// drains the pool.
pub struct WorkerPool {
    cmd_tx: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
    drain_timeout: Duration,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, runner: Arc<dyn TaskRunner>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (events_tx, events_rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();

        let workers = (0..config.worker_count.max(1))
            .map(|i| spawn_worker(i, runner.clone(), events_tx.clone()))
            .collect();

        let drain_timeout = config.drain_timeout;
        let driver = Driver {
            config,
            runner,
            workers,
            queue: BinaryHeap::new(),
            next_seq: 0,
            in_flight: 0,
            last_dispatch: None,
            cmd_rx,
            events_rx,
            events_tx,
            shutdown: shutdown.clone(),
        };

        WorkerPool {
            cmd_tx,
            shutdown,
            driver: Mutex::new(Some(tokio::spawn(driver.run()))),
            drain_timeout,
        }
    }

    /// Submit one task; resolves when the task settles. Tasks submitted to a
    /// shut-down pool settle immediately with `TaskFailure::Shutdown`.
    pub async fn submit(&self, task: ScanTask) -> WorkerResult {
        let task_id = task.task_id.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Submit {
                task,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return shutdown_result(task_id);
        }
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => shutdown_result(task_id),
        }
    }

    /// Submit one scan task per page and wait for all of them. Only the
    /// successful subset is returned; failed pages are logged and dropped.
    pub async fn scan_pages(&self, scan_id: &str, pages: Vec<Page>) -> Vec<WorkerResult> {
        let mut pending: FuturesUnordered<_> = pages
            .into_iter()
            .enumerate()
            .map(|(index, page)| self.submit(ScanTask::scan(scan_id, index, page)))
            .collect();

        let mut results = Vec::new();
        while let Some(result) = pending.next().await {
            match &result.outcome {
                Ok(_) => results.push(result),
                Err(e) => {
                    tracing::warn!(task_id = %result.task_id, error = %e, "page task failed");
                }
            }
        }
        results
    }

    pub async fn stats(&self) -> Option<PoolStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx.send(Command::Stats(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }

    /// Cooperative shutdown: queued tasks are rejected, in-flight tasks get
    /// up to the drain timeout to finish, stragglers are aborted.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.driver.lock().await.take();
        if let Some(mut handle) = handle {
            let grace = self.drain_timeout + Duration::from_secs(1);
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }
}

fn shutdown_result(task_id: String) -> WorkerResult {
    WorkerResult {
        task_id,
        worker_id: None,
        outcome: Err(TaskFailure::Shutdown),
    }
}
