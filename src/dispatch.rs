//! Background dispatch of chart requests onto a fixed-size worker pool.
//!
//! Callers on a non-async thread submit requests and either poll [`PendingChart::try_take`]
//! or block on [`PendingChart::wait`]. Dropping a handle discards the result; the run
//! itself continues to completion.

use crate::error::ApiError;
use crate::pipeline::{ChartPipeline, ChartRequest, ChartResult, PipelineError, StageEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("Dispatch worker count must be greater than 0".to_string());
        }
        if self.workers > 64 {
            return Err(format!(
                "Dispatch worker count {} exceeds the maximum of 64",
                self.workers
            ));
        }
        Ok(())
    }
}

type Outcome = Result<ChartResult, PipelineError>;

fn worker_lost() -> PipelineError {
    PipelineError::GenerationFailed("Worker stopped before completing the request".to_string())
}

/// Handle to a submitted request
pub struct PendingChart {
    rx: Option<oneshot::Receiver<Outcome>>,
}

impl PendingChart {
    /// Non-blocking poll. Returns the outcome once, then `None`.
    pub fn try_take(&mut self) -> Option<Outcome> {
        let rx = self.rx.as_mut()?;
        let outcome = match rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(worker_lost()),
        };
        self.rx = None;
        Some(outcome)
    }

    pub fn is_taken(&self) -> bool {
        self.rx.is_none()
    }

    /// Block the current thread until the outcome arrives.
    ///
    /// Must not be called from inside an async context.
    pub fn wait(mut self) -> Outcome {
        match self.rx.take() {
            Some(rx) => rx.blocking_recv().unwrap_or_else(|_| Err(worker_lost())),
            None => Err(PipelineError::GenerationFailed(
                "Outcome was already taken".to_string(),
            )),
        }
    }
}

pub struct Dispatcher {
    pipeline: Arc<ChartPipeline>,
    runtime: Runtime,
    workers: usize,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<ChartPipeline>, config: &DispatchConfig) -> Result<Self, ApiError> {
        config.validate().map_err(ApiError::ConfigError)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.workers)
            .thread_name("chartgate-worker")
            .enable_all()
            .build()
            .map_err(|e| ApiError::RuntimeError(format!("Failed to create worker pool: {}", e)))?;
        info!(workers = config.workers, "Dispatcher started");
        Ok(Self {
            pipeline,
            runtime,
            workers: config.workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn pipeline(&self) -> &Arc<ChartPipeline> {
        &self.pipeline
    }

    /// Queue a request; returns immediately
    pub fn submit(&self, request: ChartRequest) -> PendingChart {
        let (tx, rx) = oneshot::channel();
        let pipeline = Arc::clone(&self.pipeline);
        self.runtime.spawn(async move {
            let outcome = pipeline.generate(&request).await;
            if tx.send(outcome).is_err() {
                debug!("Pending chart dropped; discarding outcome");
            }
        });
        PendingChart { rx: Some(rx) }
    }

    /// Queue a request and receive its stage events on a standard channel
    pub fn submit_staged(
        &self,
        request: ChartRequest,
    ) -> (PendingChart, std::sync::mpsc::Receiver<StageEvent>) {
        let (tx, rx) = oneshot::channel();
        let (events_tx, events_rx) = std::sync::mpsc::channel::<StageEvent>();
        let pipeline = Arc::clone(&self.pipeline);
        self.runtime.spawn(async move {
            let outcome = pipeline.generate_staged(&request, &events_tx).await;
            if tx.send(outcome).is_err() {
                debug!("Pending chart dropped; discarding outcome");
            }
        });
        (PendingChart { rx: Some(rx) }, events_rx)
    }

    /// Stop the pool, waiting up to `timeout` for running requests
    pub fn shutdown(self, timeout: Duration) {
        self.runtime.shutdown_timeout(timeout);
        info!("Dispatcher stopped");
    }
}
