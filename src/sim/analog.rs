use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, TAU};

use tracing::debug;

use super::faults::{FaultInjector, Operation};
use super::script::TickScript;
use super::CallLog;
use crate::error::InstrumentError;
use crate::instrument::{
    AnalogFilter, AnalogInstrument, Instrument, InstrumentState, RecordCounts,
};
use crate::trigger::AnalogTriggerRegisters;

/// Internal ADC clock of the simulated analog input.
pub const ANALOG_CLOCK_HZ: f64 = 100e6;

/// Register values written by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalogRegisterLog {
    /// Channel enable flags.
    pub enabled: BTreeMap<u32, bool>,
    /// Channel filters.
    pub filters: BTreeMap<u32, AnalogFilter>,
    /// Channel input ranges.
    pub ranges: BTreeMap<u32, f64>,
    /// Actual sample rate.
    pub sample_rate: Option<f64>,
    /// Record length in seconds.
    pub record_length_s: Option<f64>,
    /// Trigger detector registers.
    pub analog_trigger: Option<AnalogTriggerRegisters>,
}

/// Sine generated on every channel, phase-shifted by a quarter period per channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waveform {
    /// Peak amplitude in volts.
    pub amplitude: f64,
    /// Frequency in Hz.
    pub frequency_hz: f64,
}

impl Default for Waveform {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            frequency_hz: 50.0,
        }
    }
}

impl Waveform {
    fn sample(&self, channel: u32, index: u64, rate: f64) -> f64 {
        let t = index as f64 / rate;
        self.amplitude * (TAU * self.frequency_hz * t + f64::from(channel) * FRAC_PI_2).sin()
    }
}

/// Simulated multi-channel analog input.
#[derive(Debug, Clone)]
pub struct SimulatedAnalogIn {
    channels: u32,
    range_limits: (f64, f64),
    waveform: Waveform,
    script: TickScript,
    faults: FaultInjector,
    registers: AnalogRegisterLog,
    calls: CallLog,
    current: RecordCounts,
    sample_index: u64,
    tick_start: u64,
    pre_trigger_samples: u64,
}

impl SimulatedAnalogIn {
    /// Instrument with `channels` inputs playing `script`.
    pub fn new(channels: u32, script: TickScript) -> Self {
        Self {
            channels,
            range_limits: (0.5, 50.0),
            waveform: Waveform::default(),
            script,
            faults: FaultInjector::none(),
            registers: AnalogRegisterLog::default(),
            calls: CallLog::default(),
            current: RecordCounts::default(),
            sample_index: 0,
            tick_start: 0,
            pre_trigger_samples: 0,
        }
    }

    /// Override the input range limits.
    pub fn with_range_limits(mut self, min: f64, max: f64) -> Self {
        self.range_limits = (min, max);
        self
    }

    /// Override the generated waveform.
    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    /// Inject faults.
    pub fn with_faults(mut self, faults: FaultInjector) -> Self {
        self.faults = faults;
        self
    }

    /// Registers written so far.
    pub fn registers(&self) -> &AnalogRegisterLog {
        &self.registers
    }

    /// Calls observed so far.
    pub fn calls(&self) -> &CallLog {
        &self.calls
    }

    /// Scripted ticks not yet played.
    pub fn script_remaining(&self) -> usize {
        self.script.remaining()
    }

    fn check_channel(&self, channel: u32, setting: &str) -> Result<(), InstrumentError> {
        if channel >= self.channels {
            return Err(InstrumentError::rejected(
                setting,
                format!("no channel {} on a {}-channel input", channel, self.channels),
            ));
        }
        Ok(())
    }
}

impl Instrument for SimulatedAnalogIn {
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
        if tick.state == InstrumentState::Armed {
            self.pre_trigger_samples += tick.counts.lost + tick.counts.available;
        }
        self.current = tick.counts;
        Ok(tick.state)
    }

    fn record_counts(&mut self) -> Result<RecordCounts, InstrumentError> {
        self.faults.check(Operation::RecordCounts)?;
        Ok(self.current)
    }

    fn reset(&mut self) {
        debug!("Simulated analog input reset");
        self.calls.resets += 1;
        self.registers = AnalogRegisterLog::default();
        self.current = RecordCounts::default();
        self.pre_trigger_samples = 0;
    }
}

impl AnalogInstrument for SimulatedAnalogIn {
    fn range_limits(&self) -> (f64, f64) {
        self.range_limits
    }

    fn set_channel_enabled(&mut self, channel: u32, enabled: bool) -> Result<(), InstrumentError> {
        self.check_channel(channel, "channel enable")?;
        self.registers.enabled.insert(channel, enabled);
        Ok(())
    }

    fn set_channel_filter(
        &mut self,
        channel: u32,
        filter: AnalogFilter,
    ) -> Result<(), InstrumentError> {
        self.check_channel(channel, "channel filter")?;
        self.registers.filters.insert(channel, filter);
        Ok(())
    }

    fn set_channel_range(&mut self, channel: u32, range: f64) -> Result<(), InstrumentError> {
        self.check_channel(channel, "channel range")?;
        let (min, max) = self.range_limits;
        if !(min..=max).contains(&range) {
            return Err(InstrumentError::rejected(
                "channel range",
                format!("{} V outside [{} V, {} V]", range, min, max),
            ));
        }
        self.registers.ranges.insert(channel, range);
        Ok(())
    }

    fn set_sample_rate(&mut self, hz: f64) -> Result<f64, InstrumentError> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(InstrumentError::rejected("sample rate", format!("{} Hz", hz)));
        }
        let divider = (ANALOG_CLOCK_HZ / hz).round().max(1.0);
        let actual = ANALOG_CLOCK_HZ / divider;
        self.registers.sample_rate = Some(actual);
        Ok(actual)
    }

    fn set_record_length(&mut self, seconds: f64) -> Result<(), InstrumentError> {
        self.registers.record_length_s = Some(seconds);
        Ok(())
    }

    fn set_analog_trigger(
        &mut self,
        registers: &AnalogTriggerRegisters,
    ) -> Result<(), InstrumentError> {
        self.check_channel(registers.channel, "trigger source")?;
        self.registers.analog_trigger = Some(registers.clone());
        Ok(())
    }

    /// Minus the duration of the samples delivered while armed.
    fn trigger_position_status(&mut self) -> Result<f64, InstrumentError> {
        match (&self.registers.analog_trigger, self.registers.sample_rate) {
            (Some(_), Some(rate)) => Ok(-(self.pre_trigger_samples as f64) / rate),
            _ => Ok(0.0),
        }
    }

    fn read_channel(&mut self, channel: u32, count: usize) -> Result<Vec<f64>, InstrumentError> {
        self.faults.check(Operation::Read)?;
        self.check_channel(channel, "read")?;
        let rate = self
            .registers
            .sample_rate
            .ok_or_else(|| InstrumentError::rejected("read", "sample rate not configured"))?;
        let count = count.min(self.current.available as usize) as u64;
        Ok((self.tick_start..self.tick_start + count)
            .map(|index| self.waveform.sample(channel, index, rate))
            .collect())
    }
}
