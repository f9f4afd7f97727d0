//! Job queue and worker pool
//!
//! A bounded mpsc channel is the single admission point for settlement work.
//! Workers share the receiving end and stop on the shutdown signal once the
//! jobs already in the channel are done.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use core_kernel::CommissionRunId;

use crate::error::SettlementError;
use crate::events::WithdrawalApproved;
use crate::orchestrator::{Orchestrator, WithdrawalOutcome};

pub type WithdrawalReply = oneshot::Sender<Result<WithdrawalOutcome, SettlementError>>;

/// Work items handled by the pool
#[derive(Debug)]
pub enum Job {
    ProcessCommission(CommissionRunId),
    SettleWithdrawal {
        event: WithdrawalApproved,
        /// Receives the outcome when the submitter waits for it
        reply: Option<WithdrawalReply>,
    },
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Job::ProcessCommission(_) => "process_commission",
            Job::SettleWithdrawal { .. } => "settle_withdrawal",
        }
    }
}

/// Sending side of the job channel
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Creates a bounded queue and its receiver
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueues a job, waiting for capacity when the channel is full
    pub async fn enqueue(&self, job: Job) -> Result<(), SettlementError> {
        let kind = job.kind();
        self.sender
            .send(job)
            .await
            .map_err(|_| SettlementError::QueueClosed)?;
        debug!(job = kind, "Job enqueued");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Fixed-size pool of workers draining the job channel
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    orchestrator: Arc<Orchestrator>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers on the current runtime
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        receiver: mpsc::Receiver<Job>,
        worker_count: usize,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..worker_count.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    orchestrator.clone(),
                    receiver.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect::<Vec<_>>();
        info!(workers = workers.len(), "Worker pool started");
        Self {
            workers,
            shutdown,
            receiver,
            orchestrator,
        }
    }

    /// Stops the workers after draining jobs that are already queued
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }

        let mut receiver = self.receiver.lock().await;
        let mut drained = 0usize;
        while let Ok(job) = receiver.try_recv() {
            self.orchestrator.handle(job).await;
            drained += 1;
        }
        info!(drained, "Worker pool stopped");
    }
}

async fn run_worker(
    worker: usize,
    orchestrator: Arc<Orchestrator>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker, "Worker started");
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                job = receiver.recv() => job,
            }
        };
        let Some(job) = job else {
            break;
        };
        debug!(worker, job = job.kind(), "Job received");
        orchestrator.handle(job).await;
    }
    debug!(worker, "Worker stopped");
}
