use std::time::Duration;

use tracing::debug;

use super::{check_channels, one_second_of_samples, AcquisitionPlan, PlanSettings};
use crate::codec::AnalogCodec;
use crate::error::{AcquisitionError, Result};
use crate::instrument::{AnalogFilter, AnalogInstrument, ChannelKind};
use crate::request::{AcquisitionRequest, AnalogSettings};
use crate::trigger::TriggerSpec;

/// Analog acquisition checked against one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogPlan {
    channels: Vec<u32>,
    ranges: Vec<f64>,
    filter: AnalogFilter,
    sample_rate: f64,
    sample_rate_actual: f64,
    record_length: Duration,
    trigger: TriggerSpec,
}

impl AnalogPlan {
    /// Validate `request` against `instrument`.
    ///
    /// Until [`configure`](AcquisitionPlan::configure) negotiates the sample rate, the
    /// requested rate stands in for the actual one.
    pub fn new<I: AnalogInstrument + ?Sized>(
        request: &AcquisitionRequest<AnalogSettings>,
        instrument: &I,
    ) -> Result<Self> {
        let available = instrument.channel_count();
        let channels = request.channels().to_vec();
        check_channels(&channels, available)?;

        let (min, max) = instrument.range_limits();
        let ranges = request.settings().ranges_for(&channels);
        if let Some(&range) = ranges.iter().find(|r| !(min..=max).contains(*r)) {
            return Err(AcquisitionError::InvalidInputRange { range, min, max });
        }

        let trigger = TriggerSpec::configure(
            request.trigger(),
            ChannelKind::Analog,
            &channels,
            available,
            one_second_of_samples(request.sample_rate()),
        )?;

        Ok(Self {
            channels,
            ranges,
            filter: request.settings().filter,
            sample_rate: request.sample_rate(),
            sample_rate_actual: request.sample_rate(),
            record_length: request.record_length(),
            trigger,
        })
    }

    /// Input range of each channel, in channel order.
    pub fn ranges(&self) -> &[f64] {
        &self.ranges
    }
}

impl<I: AnalogInstrument + ?Sized> AcquisitionPlan<I> for AnalogPlan {
    type Value = f64;
    type Codec = AnalogCodec;

    fn kind(&self) -> ChannelKind {
        ChannelKind::Analog
    }

    fn channels(&self) -> &[u32] {
        &self.channels
    }

    fn trigger(&self) -> &TriggerSpec {
        &self.trigger
    }

    fn sample_rate_actual(&self) -> f64 {
        self.sample_rate_actual
    }

    fn target_samples(&self) -> u64 {
        (self.sample_rate_actual * self.record_length.as_secs_f64()).round() as u64
    }

    fn stops_at_target(&self) -> bool {
        false
    }

    fn codec(&self) -> AnalogCodec {
        AnalogCodec::new(self.channels.len())
    }

    fn configure(&mut self, instrument: &mut I) -> Result<()> {
        for (&channel, &range) in self.channels.iter().zip(&self.ranges) {
            instrument.set_channel_enabled(channel, true)?;
            instrument.set_channel_filter(channel, self.filter)?;
            instrument.set_channel_range(channel, range)?;
            debug!(channel, range, filter = ?self.filter, "Configured analog channel");
        }

        self.sample_rate_actual = instrument.set_sample_rate(self.sample_rate)?;
        instrument.set_record_length(self.record_length.as_secs_f64())?;
        debug!(
            requested = self.sample_rate,
            actual = self.sample_rate_actual,
            record_length_s = self.record_length.as_secs_f64(),
            "Configured record mode"
        );

        if let Some(registers) = self.trigger.analog_registers(self.record_length) {
            instrument.set_analog_trigger(&registers)?;
            debug!(
                channel = registers.channel,
                level = registers.level,
                position_s = registers.position_s,
                "Configured analog trigger"
            );
        }

        instrument.configure(true, false)?;
        Ok(())
    }

    fn read_payload(&self, instrument: &mut I, count: usize) -> Result<Vec<Vec<f64>>> {
        self.channels
            .iter()
            .map(|&channel| Ok(instrument.read_channel(channel, count)?))
            .collect()
    }

    fn time_of_first_sample(&self, instrument: &mut I, triggered: bool) -> Result<f64> {
        if triggered && self.trigger.enabled() {
            Ok(instrument.trigger_position_status()?)
        } else {
            Ok(0.0)
        }
    }
}

impl<I: AnalogInstrument + ?Sized> PlanSettings<I> for AnalogSettings {
    type Value = f64;
    type Plan = AnalogPlan;

    fn plan(request: &AcquisitionRequest<Self>, instrument: &I) -> Result<AnalogPlan> {
        AnalogPlan::new(request, instrument)
    }
}
