//! Scripted tick sequences for the simulated instruments.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::instrument::{InstrumentState, RecordCounts};

/// One `status(true)` answer and the counters that go with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedTick {
    /// Reported state.
    pub state: InstrumentState,
    /// Reported counters.
    pub counts: RecordCounts,
}

impl ScriptedTick {
    /// A tick with the given state and counters.
    pub fn new(state: InstrumentState, counts: RecordCounts) -> Self {
        Self { state, counts }
    }

    /// `Running` with `available` new samples.
    pub fn running(available: u64) -> Self {
        Self::new(InstrumentState::Running, RecordCounts::new(available, 0, 0))
    }

    /// `Armed` (waiting for the trigger) with `available` pre-trigger samples.
    pub fn armed(available: u64) -> Self {
        Self::new(InstrumentState::Armed, RecordCounts::new(available, 0, 0))
    }

    /// `Done` with the last `available` samples of the record.
    pub fn done(available: u64) -> Self {
        Self::new(InstrumentState::Done, RecordCounts::new(available, 0, 0))
    }
}

#[derive(Debug, Clone)]
struct RandomLoss {
    rng: ChaCha8Rng,
    probability: f64,
    max_lost: u64,
}

/// Deterministic sequence of ticks.
///
/// Ticks are consumed front to back; once the queue is empty every further poll returns
/// the fallback tick (an idle `Done` unless configured otherwise).
#[derive(Debug, Clone)]
pub struct TickScript {
    ready_after: usize,
    ticks: VecDeque<ScriptedTick>,
    fallback: ScriptedTick,
    loss: Option<RandomLoss>,
}

impl TickScript {
    /// Play `ticks`, then report `Done` with no data.
    pub fn from_ticks(ticks: impl IntoIterator<Item = ScriptedTick>) -> Self {
        Self {
            ready_after: 0,
            ticks: ticks.into_iter().collect(),
            fallback: ScriptedTick::done(0),
            loss: None,
        }
    }

    /// Stream `total` samples in ticks of `per_tick`; the last tick reports `Done`.
    pub fn streaming(total: u64, per_tick: u64) -> Self {
        let per_tick = per_tick.max(1);
        let mut ticks = Vec::new();
        let mut remaining = total;
        while remaining > per_tick {
            ticks.push(ScriptedTick::running(per_tick));
            remaining -= per_tick;
        }
        ticks.push(ScriptedTick::done(remaining));
        Self::from_ticks(ticks)
    }

    /// Stream `per_tick` samples forever and never report `Done`.
    pub fn continuous(per_tick: u64) -> Self {
        Self {
            fallback: ScriptedTick::running(per_tick),
            ..Self::from_ticks([])
        }
    }

    /// Deliver `per_tick` pre-trigger samples forever; the trigger never fires.
    pub fn never_triggers(per_tick: u64) -> Self {
        Self {
            fallback: ScriptedTick::armed(per_tick),
            ..Self::from_ticks([])
        }
    }

    /// Prepend `ticks` armed ticks of `per_tick` samples; the first scripted `Running`
    /// tick after them reports `Triggered`.
    pub fn with_pre_trigger(mut self, ticks: usize, per_tick: u64) -> Self {
        if let Some(first) = self.ticks.front_mut() {
            if first.state == InstrumentState::Running {
                first.state = InstrumentState::Triggered;
            }
        }
        for _ in 0..ticks {
            self.ticks.push_front(ScriptedTick::armed(per_tick));
        }
        self
    }

    /// Report `lost` additional lost samples on tick `index`.
    pub fn with_loss_at(mut self, index: usize, lost: u64) -> Self {
        if let Some(tick) = self.ticks.get_mut(index) {
            tick.counts.lost += lost;
        }
        self
    }

    /// Report `corrupted` possibly corrupted samples on tick `index`.
    pub fn with_corruption_at(mut self, index: usize, corrupted: u64) -> Self {
        if let Some(tick) = self.ticks.get_mut(index) {
            tick.counts.corrupted += corrupted;
        }
        self
    }

    /// Report `Armed` to the first `polls` readiness checks.
    pub fn with_ready_after(mut self, polls: usize) -> Self {
        self.ready_after = polls;
        self
    }

    /// With `probability` per tick, lose between 1 and `max_lost` samples. Seeded, so
    /// the same seed always loses the same samples.
    pub fn with_random_loss(mut self, seed: u64, probability: f64, max_lost: u64) -> Self {
        self.loss = Some(RandomLoss {
            rng: ChaCha8Rng::seed_from_u64(seed),
            probability: probability.clamp(0.0, 1.0),
            max_lost: max_lost.max(1),
        });
        self
    }

    /// Scripted ticks not yet played.
    pub fn remaining(&self) -> usize {
        self.ticks.len()
    }

    /// Answer one `status(false)` readiness check.
    pub fn ready_poll(&mut self) -> InstrumentState {
        if self.ready_after > 0 {
            self.ready_after -= 1;
            InstrumentState::Armed
        } else {
            InstrumentState::Ready
        }
    }

    /// Answer one `status(true)` poll.
    pub fn next_tick(&mut self) -> ScriptedTick {
        let mut tick = self.ticks.pop_front().unwrap_or(self.fallback);
        if let Some(loss) = self.loss.as_mut() {
            if loss.rng.gen_bool(loss.probability) {
                tick.counts.lost += loss.rng.gen_range(1..=loss.max_lost);
            }
        }
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_splits_total() {
        let mut script = TickScript::streaming(25, 10);
        assert_eq!(script.remaining(), 3);
        assert_eq!(script.next_tick(), ScriptedTick::running(10));
        assert_eq!(script.next_tick(), ScriptedTick::running(10));
        assert_eq!(script.next_tick(), ScriptedTick::done(5));
        assert_eq!(script.next_tick(), ScriptedTick::done(0));
    }

    #[test]
    fn test_pre_trigger_marks_first_streaming_tick() {
        let mut script = TickScript::streaming(20, 10).with_pre_trigger(2, 3);
        assert_eq!(script.next_tick().state, InstrumentState::Armed);
        assert_eq!(script.next_tick().state, InstrumentState::Armed);
        assert_eq!(script.next_tick().state, InstrumentState::Triggered);
        assert_eq!(script.next_tick().state, InstrumentState::Done);
    }

    #[test]
    fn test_ready_after() {
        let mut script = TickScript::streaming(1, 1).with_ready_after(2);
        assert_eq!(script.ready_poll(), InstrumentState::Armed);
        assert_eq!(script.ready_poll(), InstrumentState::Armed);
        assert_eq!(script.ready_poll(), InstrumentState::Ready);
    }

    #[test]
    fn test_random_loss_is_reproducible() {
        let lost = |seed| {
            let mut script = TickScript::continuous(10).with_random_loss(seed, 0.5, 4);
            (0..50).map(|_| script.next_tick().counts.lost).collect::<Vec<_>>()
        };
        assert_eq!(lost(7), lost(7));
        assert!(lost(7).iter().any(|&n| n > 0));
        assert!(lost(7).iter().all(|&n| n <= 4));
    }
}
