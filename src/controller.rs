//! Acquisition controller.
//!
//! Drives one acquisition through
//! `Configuring → ArmedWaitReady → Running → {Completed, Failed}`.
//!
//! # Tick rules
//!
//! Every `Running` tick calls `status(true)` then `record_counts()` and applies, in order:
//!
//! 1. `Triggered` status sets the sticky `triggered` flag.
//! 2. `available` is added to `samples_seen` when no trigger gates the record, or once the
//!    trigger has been detected.
//! 3. While waiting for a trigger with a finite budget, the budget is decremented by
//!    `available + lost`; reaching zero or below fails with `TriggerTimeout`.
//! 4. `lost` and `corrupted` always accumulate into the totals.
//! 5. The tick is forwarded to the [`SampleReconstructor`].
//! 6. `Done`, or for plans that stop at their target `samples_seen > target`, completes.
//!
//! # Failure
//!
//! Any error after validation resets the instrument exactly once, discards all chunks and
//! yields an empty-channel dataset next to the error. There is no wall-clock timeout in the
//! loop itself; callers bound it with a [`StopToken`] or a deadline, both sampled at every
//! tick boundary.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::dataset::{
    AcquiredDataset, AcquisitionWarning, AssemblyMetadata, DatasetAssembler, SampleTotals,
};
use crate::error::{AcquisitionError, Result};
use crate::instrument::{Instrument, InstrumentState, RecordCounts};
use crate::plan::{AcquisitionPlan, PlanSettings};
use crate::reconstruct::{SampleReconstructor, Tick};
use crate::request::AcquisitionRequest;
use crate::trigger::TriggerSpec;

/// Where the controller is idling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Waiting for the instrument to report `Ready`.
    WaitReady,
    /// Running, and the last tick carried neither data nor losses.
    Running,
}

/// Hook invoked between polls.
///
/// The strategy only changes how the calling thread waits; it never changes which calls
/// reach the instrument or in which order.
pub trait PollStrategy {
    /// Called once per idle poll.
    fn idle(&mut self, phase: PollPhase);
}

/// Spin without yielding.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusyPoll;

impl PollStrategy for BusyPoll {
    fn idle(&mut self, _phase: PollPhase) {
        std::hint::spin_loop();
    }
}

/// Yield the thread between polls.
#[derive(Debug, Clone, Copy, Default)]
pub struct YieldPoll;

impl PollStrategy for YieldPoll {
    fn idle(&mut self, _phase: PollPhase) {
        std::thread::yield_now();
    }
}

/// Sleep for a fixed interval between polls.
#[derive(Debug, Clone, Copy)]
pub struct SleepPoll(pub Duration);

impl PollStrategy for SleepPoll {
    fn idle(&mut self, _phase: PollPhase) {
        std::thread::sleep(self.0);
    }
}

impl PollStrategy for Box<dyn PollStrategy + Send> {
    fn idle(&mut self, phase: PollPhase) {
        (**self).idle(phase);
    }
}

/// Cooperative cancellation flag, shared between the caller and the controller.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    cancelled: Arc<AtomicBool>,
}

impl StopToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; observed at the next tick boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Writing channel and trigger registers.
    Configuring,
    /// Waiting for the instrument to become ready.
    ArmedWaitReady,
    /// Polling samples.
    Running,
    /// Record finished.
    Completed,
    /// Run aborted; instrument reset.
    Failed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configuring => "configuring",
            Self::ArmedWaitReady => "armed_wait_ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Mutable loop state. Owned by the controller for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionProgress {
    /// Sticky trigger flag.
    pub triggered: bool,
    /// Samples counted toward the record.
    pub samples_seen: u64,
    /// Samples lost so far.
    pub samples_lost: u64,
    /// Samples possibly corrupted so far.
    pub samples_corrupted: u64,
    /// Remaining trigger budget in samples; `None` for infinite.
    pub retry_remaining: Option<i64>,
    waits_for_trigger: bool,
    retry_budget: Option<i64>,
}

impl AcquisitionProgress {
    /// Fresh progress for a run with the given trigger.
    pub fn new(trigger: &TriggerSpec) -> Self {
        let retry_budget = trigger
            .retry_budget()
            .map(|n| i64::try_from(n).unwrap_or(i64::MAX));
        Self {
            triggered: false,
            samples_seen: 0,
            samples_lost: 0,
            samples_corrupted: 0,
            retry_remaining: retry_budget,
            waits_for_trigger: trigger.waits_for_trigger(),
            retry_budget,
        }
    }

    /// Apply tick rules 1 to 4.
    pub fn observe(&mut self, state: InstrumentState, counts: RecordCounts) -> Result<()> {
        if state == InstrumentState::Triggered {
            self.triggered = true;
        }

        if !self.waits_for_trigger || self.triggered {
            self.samples_seen = self.samples_seen.saturating_add(counts.available);
        }

        if self.waits_for_trigger && !self.triggered {
            if let (Some(remaining), Some(budget)) =
                (self.retry_remaining.as_mut(), self.retry_budget)
            {
                let consumed = i64::try_from(counts.available.saturating_add(counts.lost))
                    .unwrap_or(i64::MAX);
                *remaining = remaining.saturating_sub(consumed);
                if *remaining <= 0 {
                    let waited = budget.saturating_sub(*remaining);
                    return Err(AcquisitionError::TriggerTimeout {
                        samples_waited: u64::try_from(waited).unwrap_or(u64::MAX),
                    });
                }
            }
        }

        self.samples_lost = self.samples_lost.saturating_add(counts.lost);
        self.samples_corrupted = self.samples_corrupted.saturating_add(counts.corrupted);
        Ok(())
    }

    /// Totals as recorded on the dataset.
    pub fn totals(&self) -> SampleTotals {
        SampleTotals {
            seen: self.samples_seen,
            lost: self.samples_lost,
            corrupted: self.samples_corrupted,
        }
    }
}

/// Outcome of [`AcquisitionController::run`].
///
/// On failure `dataset` has one empty series per requested channel and `failure` holds
/// the error.
#[derive(Debug)]
pub struct Completion<T> {
    /// Assembled dataset; empty on failure.
    pub dataset: AcquiredDataset<T>,
    /// Error that aborted the run.
    pub failure: Option<AcquisitionError>,
}

impl<T> Completion<T> {
    /// The dataset, or the error that aborted the run.
    pub fn into_result(self) -> Result<AcquiredDataset<T>> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.dataset),
        }
    }
}

/// Caller-side controls for one run.
#[derive(Default)]
pub struct AcquireOptions {
    poll: Option<Box<dyn PollStrategy + Send>>,
    stop: Option<StopToken>,
    timeout: Option<Duration>,
}

impl fmt::Debug for AcquireOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquireOptions")
            .field("poll", &self.poll.as_ref().map(|_| "<dyn PollStrategy>"))
            .field("stop", &self.stop)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AcquireOptions {
    /// Busy polling, no stop token, no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `poll` between idle polls.
    pub fn poll_strategy(mut self, poll: impl PollStrategy + Send + 'static) -> Self {
        self.poll = Some(Box::new(poll));
        self
    }

    /// Abort with `Cancelled` once `token` is cancelled.
    pub fn stop_token(mut self, token: StopToken) -> Self {
        self.stop = Some(token);
        self
    }

    /// Abort with `DeadlineExceeded` once `timeout` has elapsed since the run started.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Runs one acquisition plan against one instrument.
pub struct AcquisitionController<'a, I: ?Sized, P, S = BusyPoll> {
    instrument: &'a mut I,
    plan: P,
    poll: S,
    stop: Option<StopToken>,
    deadline: Option<Instant>,
    state: ControllerState,
}

impl<'a, I, P> AcquisitionController<'a, I, P, BusyPoll>
where
    I: Instrument + ?Sized,
    P: AcquisitionPlan<I>,
{
    /// Controller with busy polling and no cancellation.
    pub fn new(instrument: &'a mut I, plan: P) -> Self {
        Self {
            instrument,
            plan,
            poll: BusyPoll,
            stop: None,
            deadline: None,
            state: ControllerState::Configuring,
        }
    }
}

impl<'a, I, P, S> AcquisitionController<'a, I, P, S>
where
    I: Instrument + ?Sized,
    P: AcquisitionPlan<I>,
    S: PollStrategy,
{
    /// Replace the poll strategy.
    pub fn with_poll_strategy<T: PollStrategy>(
        self,
        poll: T,
    ) -> AcquisitionController<'a, I, P, T> {
        AcquisitionController {
            instrument: self.instrument,
            plan: self.plan,
            poll,
            stop: self.stop,
            deadline: self.deadline,
            state: self.state,
        }
    }

    /// Observe `token` at every tick boundary.
    pub fn with_stop_token(mut self, token: StopToken) -> Self {
        self.stop = Some(token);
        self
    }

    /// Fail with `DeadlineExceeded` once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Run the state machine to completion.
    pub fn run(mut self) -> Completion<P::Value> {
        let mut reconstructor = SampleReconstructor::new(self.plan.codec());
        let mut progress = AcquisitionProgress::new(self.plan.trigger());

        match self.drive(&mut reconstructor, &mut progress) {
            Ok(time_of_first_sample) => {
                self.transition(ControllerState::Completed);
                let meta = self.metadata(&progress, &reconstructor, time_of_first_sample);
                let (codec, chunks) = reconstructor.into_chunks();
                let dataset = DatasetAssembler::assemble(&codec, chunks, meta);
                report_warnings(dataset.warnings());
                info!(
                    rows = dataset.len(),
                    seen = progress.samples_seen,
                    lost = progress.samples_lost,
                    corrupted = progress.samples_corrupted,
                    triggered = progress.triggered,
                    valid = dataset.is_valid(),
                    "Acquisition completed"
                );
                Completion {
                    dataset,
                    failure: None,
                }
            }
            Err(err) => {
                self.transition(ControllerState::Failed);
                error!(error = %err, "Acquisition failed, resetting instrument");
                self.instrument.reset();
                reconstructor.discard();
                let meta = self.metadata(&progress, &reconstructor, 0.0);
                Completion {
                    dataset: DatasetAssembler::empty(meta),
                    failure: Some(err),
                }
            }
        }
    }

    fn drive(
        &mut self,
        reconstructor: &mut SampleReconstructor<P::Codec>,
        progress: &mut AcquisitionProgress,
    ) -> Result<f64> {
        self.plan.configure(self.instrument)?;

        self.transition(ControllerState::ArmedWaitReady);
        loop {
            self.check_stop()?;
            if self.instrument.status(false)? == InstrumentState::Ready {
                break;
            }
            self.poll.idle(PollPhase::WaitReady);
        }
        self.instrument.configure(false, true)?;

        let target = self.plan.target_samples();
        let stops_at_target = self.plan.stops_at_target();
        info!(
            kind = %self.plan.kind(),
            channels = ?self.plan.channels(),
            sample_rate = self.plan.sample_rate_actual(),
            target_samples = target,
            trigger = self.plan.trigger().enabled(),
            "Acquisition armed"
        );

        self.transition(ControllerState::Running);
        loop {
            self.check_stop()?;
            let state = self.instrument.status(true)?;
            let counts = self.instrument.record_counts()?;
            progress.observe(state, counts)?;

            let payload = if counts.available > 0 {
                Some(self.plan.read_payload(self.instrument, counts.available as usize)?)
            } else {
                None
            };
            trace!(
                %state,
                available = counts.available,
                lost = counts.lost,
                corrupted = counts.corrupted,
                seen = progress.samples_seen,
                "Tick"
            );
            reconstructor.ingest(&Tick {
                state,
                counts,
                triggered: progress.triggered,
                payload,
            });

            if state == InstrumentState::Done
                || (stops_at_target && progress.samples_seen > target)
            {
                break;
            }
            if counts.is_idle() {
                self.poll.idle(PollPhase::Running);
            }
        }

        self.plan
            .time_of_first_sample(self.instrument, progress.triggered)
    }

    fn check_stop(&self) -> Result<()> {
        if self.stop.as_ref().is_some_and(StopToken::is_cancelled) {
            return Err(AcquisitionError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(AcquisitionError::DeadlineExceeded);
        }
        Ok(())
    }

    fn transition(&mut self, next: ControllerState) {
        debug!(from = %self.state, to = %next, "Controller state transition");
        self.state = next;
    }

    fn metadata(
        &self,
        progress: &AcquisitionProgress,
        reconstructor: &SampleReconstructor<P::Codec>,
        time_of_first_sample: f64,
    ) -> AssemblyMetadata {
        AssemblyMetadata {
            kind: self.plan.kind(),
            channels: self.plan.channels().to_vec(),
            sample_rate_actual: self.plan.sample_rate_actual(),
            time_of_first_sample,
            triggered: progress.triggered,
            totals: progress.totals(),
            target_samples: self.plan.target_samples(),
            pre_trigger_samples: reconstructor.pre_trigger_samples(),
        }
    }
}

fn report_warnings(warnings: &[AcquisitionWarning]) {
    for warning in warnings {
        match warning {
            AcquisitionWarning::Incomplete { collected, target } => {
                warn!(collected, target, "Collected fewer samples than requested");
            }
            AcquisitionWarning::SamplesLost { count } => {
                warn!(lost = count, "Samples were lost, reduce the sample rate");
            }
            AcquisitionWarning::SamplesCorrupted { count } => {
                warn!(
                    corrupted = count,
                    "Samples could be corrupted, reduce the sample rate"
                );
            }
        }
    }
}

/// Acquire one record.
///
/// Validates `request` against `instrument` (no register is written when this fails),
/// then runs the controller with busy polling. The instrument is borrowed for the whole
/// call and is reset before any post-validation error is returned.
pub fn acquire<I, S>(
    instrument: &mut I,
    request: &AcquisitionRequest<S>,
) -> Result<AcquiredDataset<S::Value>>
where
    I: Instrument + ?Sized,
    S: PlanSettings<I>,
{
    acquire_with(instrument, request, AcquireOptions::default())
}

/// [`acquire`] with a poll strategy, stop token or timeout.
pub fn acquire_with<I, S>(
    instrument: &mut I,
    request: &AcquisitionRequest<S>,
    options: AcquireOptions,
) -> Result<AcquiredDataset<S::Value>>
where
    I: Instrument + ?Sized,
    S: PlanSettings<I>,
{
    let plan = S::plan(request, instrument)?;
    debug!(
        kind = %request.kind(),
        sample_rate = request.sample_rate(),
        record_length = ?request.record_length(),
        "Acquisition plan validated"
    );

    let AcquireOptions {
        poll,
        stop,
        timeout,
    } = options;
    let mut controller = AcquisitionController::new(instrument, plan);
    if let Some(token) = stop {
        controller = controller.with_stop_token(token);
    }
    if let Some(timeout) = timeout {
        controller = controller.with_deadline(Instant::now() + timeout);
    }
    match poll {
        Some(poll) => controller.with_poll_strategy(poll).run().into_result(),
        None => controller.run().into_result(),
    }
}
