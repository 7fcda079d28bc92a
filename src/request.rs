//! Acquisition requests.
//!
//! An [`AcquisitionRequest`] describes one record: sample rate, record length, the ordered
//! channel list, trigger intent and kind-specific settings ([`AnalogSettings`] or
//! [`DigitalSettings`]). Requests are validated when built; checks that need the instrument
//! (channel count, range limits, clock divider) run in [`crate::plan`] before any register
//! is written.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use triggered_daq::request::AnalogRequest;
//! use triggered_daq::trigger::{AnalogTrigger, TriggerIntent};
//!
//! # fn example() -> triggered_daq::Result<()> {
//! let request = AnalogRequest::builder()
//!     .sample_rate(1_000_000.0)
//!     .record_length(Duration::from_millis(10))
//!     .channels(&[0, 1])
//!     .input_range(5.0)
//!     .trigger(TriggerIntent::analog(AnalogTrigger::on_channel(1)).with_position(0.2))
//!     .build()?;
//! assert_eq!(request.target_samples(request.sample_rate()), 10_000);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AcquisitionError, Result};
use crate::instrument::{AnalogFilter, ChannelKind};
use crate::trigger::TriggerIntent;

/// Input range applied to analog channels when none is given, in volts peak-to-peak.
pub const DEFAULT_INPUT_RANGE: f64 = 5.0;

/// Kind-specific request settings.
pub trait KindSettings: Clone + Default {
    /// Channel kind these settings apply to.
    const KIND: ChannelKind;

    /// Validate the settings against the requested channel list.
    fn validate(&self, channels: &[u32]) -> Result<()>;
}

/// Settings for analog records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalogSettings {
    /// Input range per channel in volts peak-to-peak. Empty selects
    /// [`DEFAULT_INPUT_RANGE`] for every channel; a single value is applied to all.
    pub input_ranges: Vec<f64>,
    /// ADC decimation filter for every channel.
    pub filter: AnalogFilter,
}

impl AnalogSettings {
    /// Input range of each requested channel, in channel order.
    pub fn ranges_for(&self, channels: &[u32]) -> Vec<f64> {
        match self.input_ranges.as_slice() {
            [] => vec![DEFAULT_INPUT_RANGE; channels.len()],
            [single] => vec![*single; channels.len()],
            ranges => ranges.to_vec(),
        }
    }
}

impl KindSettings for AnalogSettings {
    const KIND: ChannelKind = ChannelKind::Analog;

    fn validate(&self, channels: &[u32]) -> Result<()> {
        let n = self.input_ranges.len();
        if n > 1 && n != channels.len() {
            return Err(AcquisitionError::ChannelCountMismatch {
                ranges: n,
                channels: channels.len(),
            });
        }
        Ok(())
    }
}

/// Settings for digital records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DigitalSettings {
    /// Device buffer size in samples; `None` selects the instrument maximum.
    pub buffer_size: Option<usize>,
}

impl KindSettings for DigitalSettings {
    const KIND: ChannelKind = ChannelKind::Digital;

    fn validate(&self, _channels: &[u32]) -> Result<()> {
        if self.buffer_size == Some(0) {
            return Err(AcquisitionError::invalid_request(
                "buffer size must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// One validated record request.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionRequest<S> {
    sample_rate: f64,
    record_length: Duration,
    channels: Vec<u32>,
    trigger: TriggerIntent,
    settings: S,
}

/// Request for an analog record.
pub type AnalogRequest = AcquisitionRequest<AnalogSettings>;

/// Request for a digital record.
pub type DigitalRequest = AcquisitionRequest<DigitalSettings>;

impl<S: KindSettings> AcquisitionRequest<S> {
    /// Create a new builder.
    pub fn builder() -> RequestBuilder<S> {
        RequestBuilder::default()
    }

    /// Requested sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Requested record length.
    pub fn record_length(&self) -> Duration {
        self.record_length
    }

    /// Requested channels, in output order.
    pub fn channels(&self) -> &[u32] {
        &self.channels
    }

    /// Trigger intent.
    pub fn trigger(&self) -> &TriggerIntent {
        &self.trigger
    }

    /// Kind-specific settings.
    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// Channel kind of this request.
    pub fn kind(&self) -> ChannelKind {
        S::KIND
    }

    /// Samples in one record at the given rate: `round(rate * record_length)`.
    pub fn target_samples(&self, rate: f64) -> u64 {
        (rate * self.record_length.as_secs_f64()).round() as u64
    }

    fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(AcquisitionError::invalid_request(format!(
                "invalid sample rate: {}",
                self.sample_rate
            )));
        }
        if self.channels.is_empty() {
            return Err(AcquisitionError::invalid_request(
                "at least one channel is required",
            ));
        }
        let mut seen = HashSet::with_capacity(self.channels.len());
        if let Some(dup) = self.channels.iter().find(|ch| !seen.insert(**ch)) {
            return Err(AcquisitionError::invalid_request(format!(
                "channel {} requested more than once",
                dup
            )));
        }
        if self.target_samples(self.sample_rate) < 1 {
            return Err(AcquisitionError::invalid_request(format!(
                "record of {:?} at {} Hz contains no samples",
                self.record_length, self.sample_rate
            )));
        }
        if self.trigger.retry_budget == Some(0) {
            return Err(AcquisitionError::InvalidRetryBudget);
        }
        self.settings.validate(&self.channels)
    }
}

/// Builder for [`AcquisitionRequest`].
#[derive(Debug, Clone)]
pub struct RequestBuilder<S> {
    request: AcquisitionRequest<S>,
}

impl<S: KindSettings> Default for RequestBuilder<S> {
    fn default() -> Self {
        Self {
            request: AcquisitionRequest {
                sample_rate: 1000.0,
                record_length: Duration::from_secs(1),
                channels: vec![0],
                trigger: TriggerIntent::disabled(),
                settings: S::default(),
            },
        }
    }
}

impl<S: KindSettings> RequestBuilder<S> {
    /// Set the sample rate in Hz.
    pub fn sample_rate(mut self, hz: f64) -> Self {
        self.request.sample_rate = hz;
        self
    }

    /// Set the record length.
    pub fn record_length(mut self, length: Duration) -> Self {
        self.request.record_length = length;
        self
    }

    /// Set the channels to record, in output order.
    pub fn channels(mut self, channels: &[u32]) -> Self {
        self.request.channels = channels.to_vec();
        self
    }

    /// Set the trigger intent.
    pub fn trigger(mut self, trigger: TriggerIntent) -> Self {
        self.request.trigger = trigger;
        self
    }

    /// Replace the kind-specific settings.
    pub fn settings(mut self, settings: S) -> Self {
        self.request.settings = settings;
        self
    }

    /// Validate and build the request.
    pub fn build(self) -> Result<AcquisitionRequest<S>> {
        self.request.validate()?;
        Ok(self.request)
    }
}

impl RequestBuilder<AnalogSettings> {
    /// Use one input range for every channel.
    pub fn input_range(mut self, range: f64) -> Self {
        self.request.settings.input_ranges = vec![range];
        self
    }

    /// Set per-channel input ranges.
    pub fn input_ranges(mut self, ranges: &[f64]) -> Self {
        self.request.settings.input_ranges = ranges.to_vec();
        self
    }

    /// Set the ADC filter.
    pub fn filter(mut self, filter: AnalogFilter) -> Self {
        self.request.settings.filter = filter;
        self
    }
}

impl RequestBuilder<DigitalSettings> {
    /// Set the device buffer size in samples.
    pub fn buffer_size(mut self, samples: usize) -> Self {
        self.request.settings.buffer_size = Some(samples);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let request = AnalogRequest::builder().build().unwrap();
        assert_eq!(request.sample_rate(), 1000.0);
        assert_eq!(request.channels(), &[0]);
        assert_eq!(request.kind(), ChannelKind::Analog);
        assert_eq!(request.target_samples(1000.0), 1000);
        assert_eq!(
            request.settings().ranges_for(request.channels()),
            vec![DEFAULT_INPUT_RANGE]
        );
    }

    #[test]
    fn test_request_validation() {
        assert!(AnalogRequest::builder().channels(&[]).build().is_err());
        assert!(AnalogRequest::builder().sample_rate(0.0).build().is_err());
        assert!(AnalogRequest::builder()
            .sample_rate(f64::INFINITY)
            .build()
            .is_err());
        assert!(AnalogRequest::builder().channels(&[1, 1]).build().is_err());

        // 1 kHz for 0.4 ms rounds to zero samples
        let err = AnalogRequest::builder()
            .record_length(Duration::from_micros(400))
            .build()
            .unwrap_err();
        assert!(err.is_validation());

        // ...but 0.6 ms rounds up to one
        assert!(AnalogRequest::builder()
            .record_length(Duration::from_micros(600))
            .build()
            .is_ok());
    }

    #[test]
    fn test_zero_retry_budget_rejected() {
        let err = DigitalRequest::builder()
            .trigger(TriggerIntent::disabled().with_retry_budget(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::InvalidRetryBudget));
    }

    #[test]
    fn test_input_range_count() {
        let err = AnalogRequest::builder()
            .channels(&[0, 1])
            .input_ranges(&[5.0, 5.0, 5.0])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::ChannelCountMismatch {
                ranges: 3,
                channels: 2
            }
        ));

        let request = AnalogRequest::builder()
            .channels(&[0, 1])
            .input_range(2.5)
            .build()
            .unwrap();
        assert_eq!(request.settings().ranges_for(request.channels()), vec![2.5, 2.5]);
    }

    #[test]
    fn test_digital_buffer_size() {
        assert!(DigitalRequest::builder().buffer_size(0).build().is_err());
        let request = DigitalRequest::builder().buffer_size(4096).build().unwrap();
        assert_eq!(request.settings().buffer_size, Some(4096));
    }
}
