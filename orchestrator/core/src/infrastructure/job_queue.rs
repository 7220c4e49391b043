// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Background job channel
//!
//! A bounded `tokio::sync::mpsc` queue drained by a fixed worker pool.
//!
//! - `enqueue` never blocks: a full queue drops the job (`warn` +
//!   `lifeos_job_dropped_total`).
//! - Handlers are collected in a [`JobRegistry`] and frozen when the workers
//!   start; nothing can be registered afterwards.
//! - Delivery is at-least-once: a failed job is re-enqueued until it has
//!   been attempted `max_attempts` times, then counted in
//!   `lifeos_job_failed_total` and dropped.
//! - Workers stop when the shutdown token is cancelled.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::jobs::{Job, JobEnvelope, JobHandler, JobKind, JobQueue, JobQueueError};

/// Handler table, built at startup
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: JobKind, handler: Arc<dyn JobHandler>) -> Self {
        if self.handlers.insert(kind, handler).is_some() {
            warn!(%kind, "Replacing previously registered job handler");
        }
        self
    }

    pub fn handles(&self, kind: JobKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

pub struct MpscJobQueue {
    sender: mpsc::Sender<JobEnvelope>,
    receiver: Mutex<Option<mpsc::Receiver<JobEnvelope>>>,
    max_attempts: u32,
    /// Jobs enqueued and not yet finished (success, drop or give-up)
    pending: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl MpscJobQueue {
    pub fn new(capacity: usize, max_attempts: u32) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            max_attempts: max_attempts.max(1),
            pending: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Spawn `workers` workers over the frozen handler table.
    pub fn start(
        &self,
        registry: JobRegistry,
        workers: usize,
    ) -> Result<Vec<JoinHandle<()>>, JobQueueError> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(JobQueueError::AlreadyStarted)?;
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let handlers = Arc::new(registry.handlers);

        info!(workers, kinds = handlers.len(), "Starting job workers");

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    receiver: receiver.clone(),
                    handlers: handlers.clone(),
                    sender: self.sender.clone(),
                    max_attempts: self.max_attempts,
                    pending: self.pending.clone(),
                    shutdown: self.shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Ok(handles)
    }

    /// Wait until every enqueued job has finished, up to `timeout`.
    /// Returns whether the queue went idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pending() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        true
    }
}

impl JobQueue for MpscJobQueue {
    fn enqueue(&self, job: Job) -> Result<(), JobQueueError> {
        let kind = job.kind();
        self.pending.fetch_add(1, Ordering::SeqCst);

        match self.sender.try_send(JobEnvelope::new(job)) {
            Ok(()) => {
                debug!(%kind, "Job enqueued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                warn!(%kind, "Job queue full, dropping job");
                metrics::counter!("lifeos_job_dropped_total", "kind" => kind.as_str()).increment(1);
                Err(JobQueueError::Full(kind))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Err(JobQueueError::Closed)
            }
        }
    }
}

struct Worker {
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<JobEnvelope>>>,
    handlers: Arc<HashMap<JobKind, Arc<dyn JobHandler>>>,
    sender: mpsc::Sender<JobEnvelope>,
    max_attempts: u32,
    pending: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = async { self.receiver.lock().await.recv().await } => next,
            };

            let Some(envelope) = next else {
                break;
            };
            self.process(envelope).await;
        }
        debug!(worker = self.id, "Job worker stopped");
    }

    async fn process(&self, envelope: JobEnvelope) {
        let kind = envelope.job.kind();

        let Some(handler) = self.handlers.get(&kind) else {
            error!(%kind, job_id = %envelope.id, "No handler registered for job kind");
            metrics::counter!("lifeos_job_failed_total", "kind" => kind.as_str()).increment(1);
            self.finish();
            return;
        };

        match handler.handle(&envelope.job).await {
            Ok(()) => {
                debug!(worker = self.id, %kind, job_id = %envelope.id, "Job completed");
                self.finish();
            }
            Err(e) if envelope.attempt < self.max_attempts => {
                warn!(
                    %kind,
                    job_id = %envelope.id,
                    attempt = envelope.attempt,
                    max_attempts = self.max_attempts,
                    error = %e,
                    "Job failed, re-enqueueing"
                );
                if self.sender.try_send(envelope.retry()).is_err() {
                    warn!(%kind, "Job queue full, dropping retry");
                    metrics::counter!("lifeos_job_dropped_total", "kind" => kind.as_str())
                        .increment(1);
                    self.finish();
                }
            }
            Err(e) => {
                error!(
                    %kind,
                    job_id = %envelope.id,
                    attempts = envelope.attempt,
                    error = %e,
                    "Job failed permanently"
                );
                metrics::counter!("lifeos_job_failed_total", "kind" => kind.as_str()).increment(1);
                self.finish();
            }
        }
    }

    fn finish(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}
