//! Instrument capability traits.
//!
//! The acquisition engine never talks to a driver directly. It drives any type that
//! implements the capability traits in this module:
//!
//! - [`Instrument`] - arming, status polling, record counters and reset, shared by all
//!   channel kinds
//! - [`AnalogInstrument`] - per-channel range/filter setters, analog trigger registers and
//!   floating point payload reads
//! - [`DigitalInstrument`] - clock divider and buffer negotiation, digital trigger masks and
//!   bit-packed payload reads
//!
//! # Contract
//!
//! - Calls are synchronous and may block for the duration of one USB/PCI transaction.
//! - The engine borrows the instrument mutably for the whole call to
//!   [`acquire`](crate::acquire); it never closes it.
//! - [`Instrument::reset`] must be infallible from the engine's point of view. It is the
//!   cleanup path after every failed run.
//!
//! # Example
//!
//! ```rust,ignore
//! fn arm<I: Instrument + ?Sized>(instrument: &mut I) -> Result<(), InstrumentError> {
//!     instrument.configure(true, false)?;
//!     while instrument.status(false)? != InstrumentState::Ready {}
//!     instrument.configure(false, true)
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InstrumentError;
use crate::trigger::{AnalogTriggerRegisters, DigitalTriggerRegisters};

/// Acquisition state reported by [`Instrument::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentState {
    /// Configured and ready to be armed.
    Ready,
    /// Armed, filling the pre-trigger buffer and waiting for a trigger.
    Armed,
    /// The trigger condition was detected.
    Triggered,
    /// Streaming samples.
    Running,
    /// The record is complete.
    Done,
}

impl fmt::Display for InstrumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ready => "ready",
            Self::Armed => "armed",
            Self::Triggered => "triggered",
            Self::Running => "running",
            Self::Done => "done",
        };
        write!(f, "{}", label)
    }
}

/// Payload shape of an instrument's channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Continuous-valued samples in volts.
    Analog,
    /// One bit per channel, packed into one integer per sample.
    Digital,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analog => write!(f, "analog"),
            Self::Digital => write!(f, "digital"),
        }
    }
}

/// Per-poll sample counters reported by [`Instrument::record_counts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    /// Samples ready to be read since the last poll.
    pub available: u64,
    /// Samples overwritten in the device buffer before they could be read.
    pub lost: u64,
    /// Samples that may have been overwritten while being read.
    pub corrupted: u64,
}

impl RecordCounts {
    /// Create a new counter triple.
    pub fn new(available: u64, lost: u64, corrupted: u64) -> Self {
        Self {
            available,
            lost,
            corrupted,
        }
    }

    /// True when the poll reported neither data nor gaps.
    pub fn is_idle(&self) -> bool {
        self.available == 0 && self.lost == 0
    }
}

/// ADC filter applied by analog inputs when decimating to the sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalogFilter {
    /// Keep every n-th ADC sample.
    Decimate,
    /// Average the ADC samples in each interval.
    #[default]
    Average,
    /// Keep alternating minimum and maximum of each interval.
    MinMax,
}

/// Capability shared by every streaming instrument.
pub trait Instrument {
    /// Number of channels the instrument exposes.
    fn channel_count(&self) -> u32;

    /// Apply the pending configuration and/or start the acquisition sequence.
    fn configure(&mut self, apply: bool, start: bool) -> Result<(), InstrumentError>;

    /// Poll the acquisition state, optionally transferring new data to the host.
    fn status(&mut self, read_data: bool) -> Result<InstrumentState, InstrumentError>;

    /// Counters for the samples transferred by the last `status(true)` call.
    fn record_counts(&mut self) -> Result<RecordCounts, InstrumentError>;

    /// Stop any running acquisition and return to the power-on configuration.
    fn reset(&mut self);
}

/// Capability: continuous-valued (analog) inputs.
pub trait AnalogInstrument: Instrument {
    /// Smallest and largest input range in volts peak-to-peak.
    fn range_limits(&self) -> (f64, f64);

    /// Enable or disable a channel.
    fn set_channel_enabled(&mut self, channel: u32, enabled: bool) -> Result<(), InstrumentError>;

    /// Select the decimation filter of a channel.
    fn set_channel_filter(
        &mut self,
        channel: u32,
        filter: AnalogFilter,
    ) -> Result<(), InstrumentError>;

    /// Set the input range of a channel in volts peak-to-peak.
    fn set_channel_range(&mut self, channel: u32, range: f64) -> Result<(), InstrumentError>;

    /// Request a sample rate; returns the rate the instrument actually uses.
    fn set_sample_rate(&mut self, hz: f64) -> Result<f64, InstrumentError>;

    /// Put the instrument in record mode with the given record length in seconds.
    fn set_record_length(&mut self, seconds: f64) -> Result<(), InstrumentError>;

    /// Write the analog trigger detector registers.
    fn set_analog_trigger(
        &mut self,
        registers: &AnalogTriggerRegisters,
    ) -> Result<(), InstrumentError>;

    /// Time in seconds of the first returned sample relative to the trigger.
    fn trigger_position_status(&mut self) -> Result<f64, InstrumentError>;

    /// Read `count` freshly transferred samples of one channel, in volts.
    fn read_channel(&mut self, channel: u32, count: usize) -> Result<Vec<f64>, InstrumentError>;
}

/// Capability: bit-packed boolean (digital) inputs.
pub trait DigitalInstrument: Instrument {
    /// Frequency of the internal sample clock in Hz.
    fn internal_clock_hz(&self) -> f64;

    /// Largest supported clock divider.
    fn max_divider(&self) -> u32;

    /// Set the clock divider.
    fn set_divider(&mut self, divider: u32) -> Result<(), InstrumentError>;

    /// Read back the clock divider.
    fn divider(&mut self) -> Result<u32, InstrumentError>;

    /// Largest device buffer in samples.
    fn max_buffer_size(&self) -> usize;

    /// Set the device buffer size in samples.
    fn set_buffer_size(&mut self, samples: usize) -> Result<(), InstrumentError>;

    /// Write the digital trigger detector registers.
    fn set_digital_trigger(
        &mut self,
        registers: &DigitalTriggerRegisters,
    ) -> Result<(), InstrumentError>;

    /// Read `count` freshly transferred packed samples, one bit per channel.
    fn read_samples(&mut self, count: usize) -> Result<Vec<u32>, InstrumentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(InstrumentState::Triggered.to_string(), "triggered");
        assert_eq!(InstrumentState::Done.to_string(), "done");
    }

    #[test]
    fn test_record_counts_idle() {
        assert!(RecordCounts::default().is_idle());
        assert!(!RecordCounts::new(0, 3, 0).is_idle());
        assert!(RecordCounts::new(0, 0, 2).is_idle());
    }
}
