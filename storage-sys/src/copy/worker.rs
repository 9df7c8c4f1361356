// SPDX-License-Identifier: GPL-3.0-only

//! Run a copy on a blocking worker and observe it from async code

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::{CancelFlag, CopyEngine, CopyFailure, CopyOutcome, CopySource, CopyTarget};
use crate::error::SysError;

/// A copy waiting to be run
pub struct CopyJob {
    pub source: Box<dyn CopySource + Send>,
    pub target: Box<dyn CopyTarget + Send>,
    /// Source sectors to copy; `None` copies the whole source
    pub sectors: Option<i64>,
    pub engine: CopyEngine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub sectors_done: i64,
    pub sectors_total: i64,
}

/// Handle on a running copy job
pub struct JobHandle {
    progress: mpsc::UnboundedReceiver<ProgressUpdate>,
    cancel: CancelFlag,
    task: JoinHandle<Result<CopyOutcome, CopyFailure>>,
}

impl JobHandle {
    /// Ask the job to stop after its current chunk
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Progress notifications; the channel closes when the job ends
    pub fn progress(&mut self) -> &mut mpsc::UnboundedReceiver<ProgressUpdate> {
        &mut self.progress
    }

    pub async fn wait(self) -> Result<CopyOutcome, CopyFailure> {
        self.task.await.map_err(|e| {
            warn!("Copy task did not finish: {}", e);
            CopyFailure::before_start(SysError::OperationFailed(format!("copy task: {e}")))
        })?
    }
}

/// Start `job` on the blocking thread pool.
///
/// Both ends are opened on the worker. Must be called from within a tokio
/// runtime.
pub fn spawn_copy_job(job: CopyJob, cancel: CancelFlag) -> JobHandle {
    let (sender, receiver) = mpsc::unbounded_channel();
    let worker_cancel = cancel.clone();

    let task = tokio::task::spawn_blocking(move || -> Result<CopyOutcome, CopyFailure> {
        let CopyJob {
            mut source,
            mut target,
            sectors,
            engine,
        } = job;

        source.open().map_err(CopyFailure::before_start)?;
        target.open().map_err(CopyFailure::before_start)?;

        let mut sink = |sectors_done: i64, sectors_total: i64| {
            // Receiver may already be gone; the copy carries on regardless
            let _ = sender.send(ProgressUpdate {
                sectors_done,
                sectors_total,
            });
        };

        let sectors = sectors.unwrap_or_else(|| source.length());
        engine.copy(
            &mut *source,
            &mut *target,
            sectors,
            &mut sink,
            &worker_cancel,
        )
    });

    JobHandle {
        progress: receiver,
        cancel,
        task,
    }
}
