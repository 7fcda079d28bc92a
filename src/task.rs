//! Background acquisitions.
//!
//! The controller loop is synchronous and polls the instrument continuously, so async
//! callers must not run it on a runtime worker. [`AcquisitionTask`] moves the instrument
//! onto tokio's blocking pool, keeps a [`StopToken`] for cancellation and hands the
//! instrument back when the run ends.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::controller::{acquire_with, AcquireOptions, StopToken};
use crate::dataset::AcquiredDataset;
use crate::error::{AcquisitionError, Result};
use crate::instrument::Instrument;
use crate::plan::PlanSettings;
use crate::request::AcquisitionRequest;

/// What a finished task returns.
#[derive(Debug)]
pub struct TaskOutcome<I, T> {
    /// The instrument, returned to the caller whatever the result.
    pub instrument: I,
    /// The dataset, or the error that ended the run.
    pub result: Result<AcquiredDataset<T>>,
}

/// An acquisition running on the blocking thread pool.
#[derive(Debug)]
pub struct AcquisitionTask<I, T> {
    handle: JoinHandle<TaskOutcome<I, T>>,
    stop: StopToken,
}

impl<I, T> AcquisitionTask<I, T>
where
    I: Instrument + Send + 'static,
    T: Send + 'static,
{
    /// Start `request` on `instrument`.
    ///
    /// Any stop token in `options` is replaced by the task's own token. Must be called
    /// from within a tokio runtime.
    pub fn spawn<S>(
        mut instrument: I,
        request: AcquisitionRequest<S>,
        options: AcquireOptions,
    ) -> Self
    where
        S: PlanSettings<I, Value = T> + Send + 'static,
    {
        let stop = StopToken::new();
        let options = options.stop_token(stop.clone());
        let kind = request.kind();

        let handle = tokio::task::spawn_blocking(move || {
            debug!(%kind, "Acquisition task started");
            let result = acquire_with(&mut instrument, &request, options);
            TaskOutcome { instrument, result }
        });

        info!(%kind, "Spawned acquisition task");
        Self { handle, stop }
    }

    /// Token cancelling this task.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Request cancellation. The run fails with `Cancelled` at its next tick boundary and
    /// the instrument is reset.
    pub fn cancel(&self) {
        self.stop.cancel();
    }

    /// True once the run has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to end.
    pub async fn join(self) -> Result<TaskOutcome<I, T>> {
        self.handle
            .await
            .map_err(|err| AcquisitionError::TaskFailed(err.to_string()))
    }
}
