//! Single-flight job scheduler.
//!
//! One job at a time holds the conversion slot; everyone else waits in a FIFO
//! queue. Requesters prove they are still around by polling, and jobs whose
//! requester went away are evicted as long as their pipeline has not started.
//! Finished artifacts are kept for a bounded time.
//!
//! All bookkeeping lives in one `SchedulerState` behind a mutex. The lock is
//! never held across an await on the encoder or the filesystem.

use crate::adapters::local::fs::remove_quietly;
use crate::domain::dpg::settings::{EncodeConfig, RawEncodeConfig, ValidationError};
use crate::domain::jobs::{Job, JobId, JobState, JobStatus, Requester};
use crate::error::{EncodeError, SchedulerError};
use crate::ports::encoder::Encoder;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Where finished containers are written, one `<id>.dpg` per job.
    pub artifact_dir: PathBuf,
    /// A waiting job not polled for longer than this is evicted.
    pub liveness_timeout: Duration,
    pub liveness_sweep_every: Duration,
    /// How long a finished artifact stays downloadable.
    pub retention: Duration,
    pub expiry_sweep_every: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("./downloads"),
            liveness_timeout: Duration::from_secs(10),
            liveness_sweep_every: Duration::from_secs(15),
            retention: Duration::from_secs(30 * 60),
            expiry_sweep_every: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    next_id: u64,
    jobs: HashMap<JobId, Job>,
    queue: VecDeque<JobId>,
    slot: Option<JobId>,
}

impl SchedulerState {
    /// Looks a job up on behalf of `requester`. Someone else's job is
    /// indistinguishable from a missing one.
    fn owned(&self, id: JobId, requester: &Requester) -> Option<&Job> {
        self.jobs.get(&id).filter(|job| job.is_owned_by(requester))
    }

    fn owned_mut(&mut self, id: JobId, requester: &Requester) -> Option<&mut Job> {
        self.jobs
            .get_mut(&id)
            .filter(|job| job.is_owned_by(requester))
    }

    /// Hands a free slot to the first live job in the queue. Stale jobs
    /// met on the way are dropped and returned so their sources can be
    /// deleted once the lock is released.
    fn promote(&mut self, now: Instant, timeout: Duration) -> Vec<Job> {
        let mut evicted = Vec::new();
        if self.slot.is_some() {
            return evicted;
        }
        while let Some(next) = self.queue.pop_front() {
            match self.jobs.get(&next).map(|job| is_stale(job, now, timeout)) {
                None => continue,
                Some(true) => evicted.extend(self.jobs.remove(&next)),
                Some(false) => {
                    if let Some(job) = self.jobs.get_mut(&next) {
                        job.state = JobState::Converting { started: false };
                    }
                    self.slot = Some(next);
                    info!(job = %next, "promoted from queue");
                    break;
                }
            }
        }
        evicted
    }
}

fn is_stale(job: &Job, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(job.last_seen) > timeout
}

pub struct Scheduler<E> {
    inner: Arc<Inner<E>>,
}

struct Inner<E> {
    state: Mutex<SchedulerState>,
    encoder: E,
    settings: SchedulerSettings,
}

impl<E> Clone for Scheduler<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Stops the periodic sweeps when told to.
pub struct SweepHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SweepHandle {
    pub async fn stop(self) {
        self.token.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl<E: Encoder + 'static> Scheduler<E> {
    pub fn new(encoder: E, settings: SchedulerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState::default()),
                encoder,
                settings,
            }),
        }
    }

    /// Validates the request and admits it. The job takes the slot when it is
    /// free and joins the tail of the queue otherwise. A rejected request
    /// never becomes a job.
    pub async fn submit(
        &self,
        source: PathBuf,
        raw: &RawEncodeConfig,
        requester: Requester,
    ) -> Result<JobId, ValidationError> {
        let config = EncodeConfig::validate(raw)?;

        let mut state = self.inner.state.lock().await;
        let id = JobId(state.next_id);
        state.next_id += 1;

        let output = self.inner.settings.artifact_dir.join(format!("{}.dpg", id));
        let job_state = if state.slot.is_none() {
            state.slot = Some(id);
            JobState::Converting { started: false }
        } else {
            state.queue.push_back(id);
            JobState::Queued
        };
        info!(job = %id, state = ?job_state, "job admitted");

        state.jobs.insert(
            id,
            Job {
                id,
                source,
                config: config.with_output(output),
                requester,
                state: job_state,
                last_seen: Instant::now(),
            },
        );
        Ok(id)
    }

    pub async fn status(&self, id: JobId, requester: &Requester) -> JobStatus {
        let state = self.inner.state.lock().await;
        let Some(job) = state.owned(id, requester) else {
            return JobStatus::NotFound;
        };

        match &job.state {
            JobState::Queued => match state.queue.iter().position(|queued| *queued == id) {
                Some(index) => JobStatus::Queued { position: index + 1 },
                None => JobStatus::NotFound,
            },
            JobState::Converting { .. } => JobStatus::Converting,
            JobState::Downloadable { .. } => JobStatus::Downloadable {
                artifact: job.config.output().to_path_buf(),
            },
            JobState::Failed { detail } => JobStatus::Failed {
                detail: detail.clone(),
            },
        }
    }

    /// Records that the requester is still waiting. The first refresh a job
    /// receives while holding the slot launches its pipeline.
    pub async fn touch(&self, id: JobId, requester: &Requester) -> Result<(), SchedulerError> {
        let mut state = self.inner.state.lock().await;
        let job = state
            .owned_mut(id, requester)
            .ok_or(SchedulerError::NotFound)?;

        match job.state {
            JobState::Queued | JobState::Converting { started: true } => {
                job.last_seen = Instant::now();
            }
            JobState::Converting { started: false } => {
                job.last_seen = Instant::now();
                job.state = JobState::Converting { started: true };
                self.launch(id, job.source.clone(), job.config.clone());
            }
            JobState::Downloadable { .. } | JobState::Failed { .. } => {}
        }
        Ok(())
    }

    /// Opens the finished container for reading.
    pub async fn fetch_artifact(
        &self,
        id: JobId,
        requester: &Requester,
    ) -> Result<tokio::fs::File, SchedulerError> {
        let artifact = {
            let state = self.inner.state.lock().await;
            match state.owned(id, requester) {
                Some(Job {
                    state: JobState::Downloadable { .. },
                    config,
                    ..
                }) => config.output().to_path_buf(),
                _ => return Err(SchedulerError::NotFound),
            }
        };

        tokio::fs::File::open(&artifact)
            .await
            .map_err(|_| SchedulerError::NotFound)
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    fn launch(&self, id: JobId, source: PathBuf, config: EncodeConfig) {
        info!(job = %id, "starting pipeline");
        let scheduler = self.clone();
        tokio::spawn(async move {
            let result = scheduler.inner.encoder.encode(&source, &config).await;
            scheduler.finish(id, result).await;
        });
    }

    /// Moves the slot occupant out of Converting and hands the slot on.
    async fn finish(&self, id: JobId, result: Result<(), EncodeError>) {
        let (source, failed_output, evicted) = {
            let mut state = self.inner.state.lock().await;
            let retention = self.inner.settings.retention;
            let timeout = self.inner.settings.liveness_timeout;
            let Some(job) = state.jobs.get_mut(&id) else {
                warn!(job = %id, "finished job is no longer tracked");
                return;
            };

            let failed_output = match result {
                Ok(()) => {
                    job.state = JobState::Downloadable {
                        expires_at: Instant::now() + retention,
                    };
                    info!(job = %id, "conversion complete");
                    None
                }
                Err(e) => {
                    warn!(job = %id, error = %e, "conversion failed");
                    job.state = JobState::Failed {
                        detail: e.to_string(),
                    };
                    Some(job.config.output().to_path_buf())
                }
            };
            let source = job.source.clone();

            if state.slot == Some(id) {
                state.slot = None;
            }
            let evicted = state.promote(Instant::now(), timeout);
            (source, failed_output, evicted)
        };

        remove_quietly(&source).await;
        if let Some(output) = failed_output {
            remove_quietly(&output).await;
        }
        for job in &evicted {
            info!(job = %job.id, "evicted at promotion, requester is gone");
            remove_quietly(&job.source).await;
        }
    }

    /// Evicts waiting jobs whose requester stopped polling.
    pub async fn sweep_liveness(&self) -> usize {
        self.sweep_liveness_at(Instant::now()).await
    }

    pub async fn sweep_liveness_at(&self, now: Instant) -> usize {
        let timeout = self.inner.settings.liveness_timeout;
        let stale = |job: &Job| is_stale(job, now, timeout);

        let evicted: Vec<Job> = {
            let mut state = self.inner.state.lock().await;
            let mut evicted_ids: Vec<JobId> = state
                .queue
                .iter()
                .copied()
                .filter(|id| state.jobs.get(id).is_some_and(stale))
                .collect();
            state.queue.retain(|id| !evicted_ids.contains(id));

            // a pipeline already running is never interrupted
            if let Some(occupant) = state.slot {
                let waiting = state.jobs.get(&occupant).is_some_and(|job| {
                    job.state == JobState::Converting { started: false } && stale(job)
                });
                if waiting {
                    state.slot = None;
                    evicted_ids.push(occupant);
                }
            }

            let mut evicted: Vec<Job> = evicted_ids
                .iter()
                .filter_map(|id| state.jobs.remove(id))
                .collect();
            evicted.extend(state.promote(now, timeout));
            evicted
        };

        for job in &evicted {
            info!(job = %job.id, "evicted, requester is gone");
            remove_quietly(&job.source).await;
        }
        debug!(evicted = evicted.len(), "liveness sweep done");
        evicted.len()
    }

    /// Deletes artifacts whose retention window has elapsed.
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now()).await
    }

    pub async fn sweep_expired_at(&self, now: Instant) -> usize {
        let expired: Vec<Job> = {
            let mut state = self.inner.state.lock().await;
            let ids: Vec<JobId> = state
                .jobs
                .values()
                .filter(|job| match job.state {
                    JobState::Downloadable { expires_at } => now >= expires_at,
                    _ => false,
                })
                .map(|job| job.id)
                .collect();
            ids.iter().filter_map(|id| state.jobs.remove(id)).collect()
        };

        for job in &expired {
            info!(job = %job.id, "download expired");
            remove_quietly(job.config.output()).await;
        }
        debug!(expired = expired.len(), "expiry sweep done");
        expired.len()
    }

    /// Runs both sweeps periodically until the handle is stopped.
    pub fn spawn_sweepers(&self) -> SweepHandle {
        let token = CancellationToken::new();
        let settings = &self.inner.settings;

        let liveness = {
            let scheduler = self.clone();
            let token = token.clone();
            let every = settings.liveness_sweep_every;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            scheduler.sweep_liveness().await;
                        }
                    }
                }
            })
        };

        let expiry = {
            let scheduler = self.clone();
            let token = token.clone();
            let every = settings.expiry_sweep_every;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            scheduler.sweep_expired().await;
                        }
                    }
                }
            })
        };

        SweepHandle {
            token,
            tasks: vec![liveness, expiry],
        }
    }
}
