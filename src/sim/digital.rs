use tracing::debug;

use super::faults::{FaultInjector, Operation};
use super::script::TickScript;
use super::CallLog;
use crate::error::InstrumentError;
use crate::instrument::{DigitalInstrument, Instrument, InstrumentState, RecordCounts};
use crate::trigger::DigitalTriggerRegisters;

/// Internal sample clock of the simulated digital input.
pub const DIGITAL_CLOCK_HZ: f64 = 100e6;

/// Register values written by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitalRegisterLog {
    /// Clock divider.
    pub divider: Option<u32>,
    /// Device buffer size.
    pub buffer_size: Option<usize>,
    /// Trigger detector registers.
    pub digital_trigger: Option<DigitalTriggerRegisters>,
}

/// Bit pattern produced by the simulated lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitPattern {
    /// Sample `n` is `n` as a binary counter: line `k` toggles every `2^k` samples.
    #[default]
    Counter,
    /// Every sample has the same value.
    Constant(u32),
}

impl BitPattern {
    fn sample(self, index: u64) -> u32 {
        match self {
            // truncation wraps the counter
            Self::Counter => index as u32,
            Self::Constant(value) => value,
        }
    }
}

/// Simulated bit-packed digital input.
#[derive(Debug, Clone)]
pub struct SimulatedDigitalIn {
    channels: u32,
    max_divider: u32,
    max_buffer_size: usize,
    divider_read_back: Option<u32>,
    pattern: BitPattern,
    script: TickScript,
    faults: FaultInjector,
    registers: DigitalRegisterLog,
    calls: CallLog,
    current: RecordCounts,
    sample_index: u64,
    tick_start: u64,
}

impl SimulatedDigitalIn {
    /// Instrument with `channels` lines playing `script`.
    pub fn new(channels: u32, script: TickScript) -> Self {
        Self {
            channels: channels.min(32),
            max_divider: 1 << 30,
            max_buffer_size: 4096,
            divider_read_back: None,
            pattern: BitPattern::default(),
            script,
            faults: FaultInjector::none(),
            registers: DigitalRegisterLog::default(),
            calls: CallLog::default(),
            current: RecordCounts::default(),
            sample_index: 0,
            tick_start: 0,
        }
    }

    /// Override the bit pattern.
    pub fn with_pattern(mut self, pattern: BitPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Override the largest clock divider.
    pub fn with_max_divider(mut self, max_divider: u32) -> Self {
        self.max_divider = max_divider;
        self
    }

    /// Report `divider` on read-back regardless of what was written.
    pub fn with_divider_read_back(mut self, divider: u32) -> Self {
        self.divider_read_back = Some(divider);
        self
    }

    /// Inject faults.
    pub fn with_faults(mut self, faults: FaultInjector) -> Self {
        self.faults = faults;
        self
    }

    /// Registers written so far.
    pub fn registers(&self) -> &DigitalRegisterLog {
        &self.registers
    }

    /// Calls observed so far.
    pub fn calls(&self) -> &CallLog {
        &self.calls
    }
}

impl Instrument for SimulatedDigitalIn {
    fn channel_count(&self) -> u32 {
        self.channels
    }

    fn configure(&mut self, apply: bool, start: bool) -> Result<(), InstrumentError> {
        self.faults.check(Operation::Configure)?;
        self.calls.configure.push((apply, start));
        Ok(())
    }

    fn status(&mut self, read_data: bool) -> Result<InstrumentState, InstrumentError> {
        self.faults.check(Operation::Status)?;
        if !read_data {
            self.calls.ready_polls += 1;
            return Ok(self.script.ready_poll());
        }
        self.calls.ticks += 1;
        let tick = self.script.next_tick();
        self.sample_index += tick.counts.lost;
        self.tick_start = self.sample_index;
        self.sample_index += tick.counts.available;
        self.current = tick.counts;
        Ok(tick.state)
    }

    fn record_counts(&mut self) -> Result<RecordCounts, InstrumentError> {
        self.faults.check(Operation::RecordCounts)?;
        Ok(self.current)
    }

    fn reset(&mut self) {
        debug!("Simulated digital input reset");
        self.calls.resets += 1;
        self.registers = DigitalRegisterLog::default();
        self.current = RecordCounts::default();
    }
}

impl DigitalInstrument for SimulatedDigitalIn {
    fn internal_clock_hz(&self) -> f64 {
        DIGITAL_CLOCK_HZ
    }

    fn max_divider(&self) -> u32 {
        self.max_divider
    }

    fn set_divider(&mut self, divider: u32) -> Result<(), InstrumentError> {
        if divider == 0 || divider > self.max_divider {
            return Err(InstrumentError::rejected(
                "clock divider",
                format!("{} outside [1, {}]", divider, self.max_divider),
            ));
        }
        self.registers.divider = Some(divider);
        Ok(())
    }

    fn divider(&mut self) -> Result<u32, InstrumentError> {
        self.divider_read_back
            .or(self.registers.divider)
            .ok_or_else(|| InstrumentError::rejected("clock divider", "not configured"))
    }

    fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    fn set_buffer_size(&mut self, samples: usize) -> Result<(), InstrumentError> {
        if samples == 0 || samples > self.max_buffer_size {
            return Err(InstrumentError::rejected(
                "buffer size",
                format!("{} outside [1, {}]", samples, self.max_buffer_size),
            ));
        }
        self.registers.buffer_size = Some(samples);
        Ok(())
    }

    fn set_digital_trigger(
        &mut self,
        registers: &DigitalTriggerRegisters,
    ) -> Result<(), InstrumentError> {
        self.registers.digital_trigger = Some(*registers);
        Ok(())
    }

    fn read_samples(&mut self, count: usize) -> Result<Vec<u32>, InstrumentError> {
        self.faults.check(Operation::Read)?;
        let count = count.min(self.current.available as usize) as u64;
        Ok((self.tick_start..self.tick_start + count)
            .map(|index| self.pattern.sample(index))
            .collect())
    }
}
