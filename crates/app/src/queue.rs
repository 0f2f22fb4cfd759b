//! Queue manager: priority job scheduling with delays and retries.
//!
//! Each [`JobType`] has its own ready heap (higher priority first, ties in
//! arrival order) and its own dispatch loop. A tick takes up to
//! `max_concurrent` jobs of one type, runs them concurrently on a
//! [`JoinSet`] and keeps the type busy until the whole batch is done. Jobs
//! due in the future wait in a time-ordered delayed set that a separate
//! sweep loop drains. Every state change is written through the
//! [`JobStore`](crate::ports::JobStore) port.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use convoflow_domain::error::ConvoFlowError;
use convoflow_domain::event::{Event, EventType};
use convoflow_domain::id::JobId;
use convoflow_domain::job::{FailureOutcome, JobStatus, JobType, QueueJob};
use convoflow_domain::time::{Clock, Timestamp};

use crate::config::QueueConfig;
use crate::ports::{EnginePorts, EventPublisher, JobStore};

/// Executes jobs of one type.
///
/// An `Err` counts as a failed attempt and is retried per the queue's
/// retry policy.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &QueueJob) -> Result<(), ConvoFlowError>;
}

struct Ready {
    priority: i32,
    seq: u64,
    job: QueueJob,
}

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Ready {}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    // Max-heap: higher priority wins, then the earlier arrival.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    ready: HashMap<JobType, BinaryHeap<Ready>>,
    delayed: BTreeMap<(Timestamp, u64), QueueJob>,
    busy: HashSet<JobType>,
}

/// Per-type queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub pending: usize,
    pub delayed: usize,
    pub busy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub types: BTreeMap<JobType, TypeStats>,
}

pub struct QueueManager<P: EnginePorts> {
    ports: Arc<P>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    handlers: RwLock<HashMap<JobType, Arc<dyn JobHandler>>>,
    seq: AtomicU64,
}

impl<P: EnginePorts> QueueManager<P> {
    pub fn new(ports: Arc<P>, config: QueueConfig) -> Self {
        Self {
            ports,
            config,
            state: Mutex::new(QueueState::default()),
            handlers: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Route jobs of `job_type` to `handler`, replacing any previous one.
    pub fn register_handler(&self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_type, handler);
    }

    /// Persist `job` and queue it: ready now, or delayed until `scheduled_at`.
    ///
    /// # Errors
    ///
    /// Returns the store error when the job cannot be persisted; the job is
    /// not queued in that case.
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type))]
    pub async fn add_job(&self, job: QueueJob) -> Result<JobId, ConvoFlowError> {
        self.ports.jobs().save(&job).await?;
        let id = job.id;
        self.place(job);
        Ok(id)
    }

    /// Reload unfinished jobs from the store. Jobs left `processing` by a
    /// crash go back to `pending`.
    ///
    /// # Errors
    ///
    /// Returns the store error when listing fails.
    pub async fn restore(&self) -> Result<usize, ConvoFlowError> {
        let jobs = self.ports.jobs().list_unfinished().await?;
        let count = jobs.len();
        for mut job in jobs {
            if job.status == JobStatus::Processing {
                if let Err(err) = job.reset_interrupted() {
                    warn!(job_id = %job.id, error = %err, "skipping job on restore");
                    continue;
                }
                self.persist(&job).await;
            }
            self.place(job);
        }
        info!(count, "queue restored");
        Ok(count)
    }

    /// Move every delayed job that is now due into its ready queue.
    pub fn sweep_delayed(&self) -> usize {
        let now = self.ports.clock().now();
        let due: Vec<QueueJob> = {
            let mut state = self.lock();
            let keys: Vec<(Timestamp, u64)> = state
                .delayed
                .range(..=(now, u64::MAX))
                .map(|(key, _)| *key)
                .collect();
            keys.into_iter()
                .filter_map(|key| state.delayed.remove(&key))
                .collect()
        };
        let count = due.len();
        for job in due {
            self.place(job);
        }
        if count > 0 {
            debug!(count, "delayed jobs released");
        }
        count
    }

    /// Run one dispatch batch for `job_type`.
    ///
    /// Returns the ids taken from the queue, in dispatch order. Returns
    /// nothing while a previous batch of the same type is still running.
    pub async fn tick(&self, job_type: JobType) -> Vec<JobId> {
        let batch = {
            let mut state = self.lock();
            if state.busy.contains(&job_type) {
                return Vec::new();
            }
            let limit = self.config.max_concurrent_for(job_type);
            let Some(heap) = state.ready.get_mut(&job_type) else {
                return Vec::new();
            };
            let mut batch = Vec::with_capacity(limit.min(heap.len()));
            while batch.len() < limit {
                match heap.pop() {
                    Some(ready) => batch.push(ready.job),
                    None => break,
                }
            }
            if batch.is_empty() {
                return Vec::new();
            }
            state.busy.insert(job_type);
            batch
        };

        let dispatched: Vec<JobId> = batch.iter().map(|j| j.id).collect();
        self.run_batch(job_type, batch).await;
        self.lock().busy.remove(&job_type);
        dispatched
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        let mut types: BTreeMap<JobType, TypeStats> = JobType::ALL
            .into_iter()
            .map(|t| (t, TypeStats::default()))
            .collect();
        for (job_type, heap) in &state.ready {
            types.entry(*job_type).or_default().pending = heap.len();
        }
        for job in state.delayed.values() {
            types.entry(job.job_type).or_default().delayed += 1;
        }
        for job_type in &state.busy {
            types.entry(*job_type).or_default().busy = true;
        }
        QueueStats { types }
    }

    /// Run every dispatch loop and the delayed sweep until `shutdown` flips
    /// to `true`. Batches in flight finish before their loop exits.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut loops = JoinSet::new();
        for job_type in JobType::ALL {
            let queue = Arc::clone(&self);
            let shutdown = shutdown.clone();
            loops.spawn(async move { queue.dispatch_loop(job_type, shutdown).await });
        }
        let queue = Arc::clone(&self);
        loops.spawn(async move { queue.sweep_loop(shutdown).await });
        while loops.join_next().await.is_some() {}
        info!("queue stopped");
    }

    async fn dispatch_loop(&self, job_type: JobType, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(%job_type, "dispatch loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(job_type).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(%job_type, "dispatch loop stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn sweep_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_delayed();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn run_batch(&self, job_type: JobType, batch: Vec<QueueJob>) {
        let handler = self.handler(job_type);
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::with_capacity(batch.len());

        for mut job in batch {
            if let Err(err) = job.mark_processing() {
                warn!(job_id = %job.id, error = %err, "dropping job in unexpected state");
                continue;
            }
            self.persist(&job).await;
            let Some(handler) = handler.clone() else {
                self.fail_without_handler(job).await;
                continue;
            };
            debug!(job_id = %job.id, %job_type, attempt = job.attempts + 1, "dispatching job");
            let running = job.clone();
            let task = tasks.spawn(async move { handler.handle(&running).await });
            in_flight.insert(task.id(), job);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, result)) => (task_id, result.map_err(|e| e.to_string())),
                Err(join_err) => (join_err.id(), Err(format!("job handler panicked: {join_err}"))),
            };
            let Some(job) = in_flight.remove(&task_id) else {
                continue;
            };
            match outcome {
                Ok(()) => self.complete(job).await,
                Err(reason) => self.fail(job, reason).await,
            }
        }
    }

    async fn complete(&self, mut job: QueueJob) {
        if let Err(err) = job.mark_completed(self.ports.clock().now()) {
            warn!(job_id = %job.id, error = %err, "cannot complete job");
            return;
        }
        self.persist(&job).await;
        debug!(job_id = %job.id, job_type = %job.job_type, "job completed");
        self.announce(EventType::JobCompleted, &job).await;
    }

    async fn fail(&self, mut job: QueueJob, reason: String) {
        let now = self.ports.clock().now();
        match job.record_failure(reason.as_str(), &self.config.retry, now) {
            Ok(FailureOutcome::Retry { at, backoff }) => {
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempt = job.attempts,
                    retry_in_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    retry_at = %at,
                    error = %reason,
                    "job failed, retrying"
                );
                self.persist(&job).await;
                self.place(job);
            }
            Ok(FailureOutcome::Exhausted) => {
                error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempt = job.attempts,
                    error = %reason,
                    "job failed permanently"
                );
                self.persist(&job).await;
                self.announce(EventType::JobFailed, &job).await;
            }
            Err(err) => warn!(job_id = %job.id, error = %err, "cannot record job failure"),
        }
    }

    async fn fail_without_handler(&self, mut job: QueueJob) {
        let reason = format!("no handler registered for {}", job.job_type);
        if let Err(err) = job.fail_permanently(reason.as_str(), self.ports.clock().now()) {
            warn!(job_id = %job.id, error = %err, "cannot fail job");
            return;
        }
        error!(job_id = %job.id, job_type = %job.job_type, "{reason}");
        self.persist(&job).await;
        self.announce(EventType::JobFailed, &job).await;
    }

    fn place(&self, job: QueueJob) {
        let now = self.ports.clock().now();
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let mut state = self.lock();
        if job.scheduled_at > now {
            debug!(job_id = %job.id, job_type = %job.job_type, scheduled_at = %job.scheduled_at, "job delayed");
            state.delayed.insert((job.scheduled_at, seq), job);
        } else {
            state.ready.entry(job.job_type).or_default().push(Ready {
                priority: job.priority,
                seq,
                job,
            });
        }
    }

    async fn persist(&self, job: &QueueJob) {
        if let Err(err) = self.ports.jobs().save(job).await {
            error!(job_id = %job.id, status = %job.status, error = %err, "failed to persist job");
        }
    }

    async fn announce(&self, event_type: EventType, job: &QueueJob) {
        let event = Event::new(
            event_type,
            None,
            serde_json::json!({
                "job_id": job.id,
                "job_type": job.job_type,
                "attempts": job.attempts,
                "error": job.error,
            }),
        );
        let _ = self.ports.publisher().publish(event).await;
    }

    fn handler(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_type)
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
