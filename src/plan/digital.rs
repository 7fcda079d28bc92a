use std::time::Duration;

use tracing::debug;

use super::{check_channels, one_second_of_samples, AcquisitionPlan, PlanSettings};
use crate::codec::DigitalCodec;
use crate::error::{AcquisitionError, InstrumentError, Result};
use crate::instrument::{ChannelKind, DigitalInstrument};
use crate::request::{AcquisitionRequest, DigitalSettings};
use crate::trigger::TriggerSpec;

/// Digital acquisition checked against one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitalPlan {
    channels: Vec<u32>,
    divider: u32,
    sample_rate_actual: f64,
    record_length: Duration,
    buffer_size: Option<usize>,
    trigger: TriggerSpec,
}

impl DigitalPlan {
    /// Validate `request` against `instrument` and negotiate the clock divider.
    ///
    /// `divider = floor(clock / rate)` must lie in `1..=max_divider`; the instrument then
    /// samples at `floor(clock / divider)`.
    pub fn new<I: DigitalInstrument + ?Sized>(
        request: &AcquisitionRequest<DigitalSettings>,
        instrument: &I,
    ) -> Result<Self> {
        let available = instrument.channel_count();
        let channels = request.channels().to_vec();
        check_channels(&channels, available)?;

        let (divider, sample_rate_actual) = negotiate_divider(
            request.sample_rate(),
            instrument.internal_clock_hz(),
            instrument.max_divider(),
        )?;

        let trigger = TriggerSpec::configure(
            request.trigger(),
            ChannelKind::Digital,
            &channels,
            available,
            one_second_of_samples(sample_rate_actual),
        )?;

        Ok(Self {
            channels,
            divider,
            sample_rate_actual,
            record_length: request.record_length(),
            buffer_size: request.settings().buffer_size,
            trigger,
        })
    }

    /// Negotiated clock divider.
    pub fn divider(&self) -> u32 {
        self.divider
    }
}

fn negotiate_divider(rate: f64, clock_hz: f64, max_divider: u32) -> Result<(u32, f64)> {
    let out_of_range = || AcquisitionError::SampleRateOutOfRange {
        requested: rate,
        min: clock_hz / f64::from(max_divider.max(1)),
        max: clock_hz,
    };
    let divider = (clock_hz / rate).floor();
    if divider < 1.0 || divider > f64::from(max_divider) {
        return Err(out_of_range());
    }
    let divider = divider as u32;
    Ok((divider, (clock_hz / f64::from(divider)).floor()))
}

impl<I: DigitalInstrument + ?Sized> AcquisitionPlan<I> for DigitalPlan {
    type Value = Option<bool>;
    type Codec = DigitalCodec;

    fn kind(&self) -> ChannelKind {
        ChannelKind::Digital
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
        true
    }

    fn codec(&self) -> DigitalCodec {
        DigitalCodec::new(&self.channels)
    }

    fn configure(&mut self, instrument: &mut I) -> Result<()> {
        instrument.set_divider(self.divider)?;
        let read_back = instrument.divider()?;
        if read_back != self.divider {
            return Err(InstrumentError::rejected(
                "clock divider",
                format!("wrote {} but read back {}", self.divider, read_back),
            )
            .into());
        }
        debug!(
            divider = self.divider,
            sample_rate_actual = self.sample_rate_actual,
            "Configured digital sample clock"
        );

        let buffer_size = self
            .buffer_size
            .unwrap_or_else(|| instrument.max_buffer_size());
        instrument.set_buffer_size(buffer_size)?;

        let target = AcquisitionPlan::<I>::target_samples(self);
        let registers = self.trigger.digital_registers(target);
        instrument.set_digital_trigger(&registers)?;
        debug!(
            buffer_size,
            prefill = registers.prefill,
            trigger_any = registers.masks.any(),
            "Configured digital buffer and trigger"
        );

        instrument.configure(true, false)?;
        Ok(())
    }

    fn read_payload(&self, instrument: &mut I, count: usize) -> Result<Vec<u32>> {
        Ok(instrument.read_samples(count)?)
    }

    fn time_of_first_sample(&self, _instrument: &mut I, _triggered: bool) -> Result<f64> {
        Ok(0.0)
    }
}

impl<I: DigitalInstrument + ?Sized> PlanSettings<I> for DigitalSettings {
    type Value = Option<bool>;
    type Plan = DigitalPlan;

    fn plan(request: &AcquisitionRequest<Self>, instrument: &I) -> Result<DigitalPlan> {
        DigitalPlan::new(request, instrument)
    }
}
