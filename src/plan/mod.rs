//! Per-kind acquisition plans.
//!
//! A plan is an [`AcquisitionRequest`] checked against one concrete instrument. Building a
//! plan is validation only (channel indices, input ranges, clock divider, trigger
//! normalisation); nothing is written to the instrument until the controller calls
//! [`AcquisitionPlan::configure`].
//!
//! The controller is written once against [`AcquisitionPlan`]; [`AnalogPlan`] and
//! [`DigitalPlan`] supply the register writes and payload reads of their channel kind.

mod analog;
mod digital;

pub use analog::AnalogPlan;
pub use digital::DigitalPlan;

use crate::codec::{ChannelCodec, SampleValue};
use crate::error::{AcquisitionError, Result};
use crate::instrument::{ChannelKind, Instrument};
use crate::request::{AcquisitionRequest, KindSettings};
use crate::trigger::TriggerSpec;

/// Kind-specific half of the acquisition loop.
pub trait AcquisitionPlan<I: Instrument + ?Sized> {
    /// Decoded sample value.
    type Value: SampleValue;
    /// Payload decoder.
    type Codec: ChannelCodec<Value = Self::Value>;

    /// Channel kind.
    fn kind(&self) -> ChannelKind;

    /// Requested channels, in output order.
    fn channels(&self) -> &[u32];

    /// Normalised trigger settings.
    fn trigger(&self) -> &TriggerSpec;

    /// Rate the instrument samples at. Final once [`configure`](Self::configure) returned.
    fn sample_rate_actual(&self) -> f64;

    /// Samples in one record at the actual rate.
    fn target_samples(&self) -> u64;

    /// Whether the loop ends as soon as more than [`target_samples`](Self::target_samples)
    /// were seen, instead of waiting for the instrument to report `Done`.
    fn stops_at_target(&self) -> bool;

    /// Decoder for this plan's payloads.
    fn codec(&self) -> Self::Codec;

    /// Write channel, timing and trigger registers and apply them.
    fn configure(&mut self, instrument: &mut I) -> Result<()>;

    /// Read the payload of the last `status(true)` call.
    fn read_payload(
        &self,
        instrument: &mut I,
        count: usize,
    ) -> Result<<Self::Codec as ChannelCodec>::Raw>;

    /// Time of the first returned sample relative to the trigger, in seconds.
    fn time_of_first_sample(&self, instrument: &mut I, triggered: bool) -> Result<f64>;
}

/// Request settings that know how to plan an acquisition on instrument `I`.
pub trait PlanSettings<I: Instrument + ?Sized>: KindSettings {
    /// Decoded sample value.
    type Value: SampleValue;
    /// Plan built for `I`.
    type Plan: AcquisitionPlan<I, Value = Self::Value>;

    /// Check `request` against `instrument` and build the plan.
    fn plan(request: &AcquisitionRequest<Self>, instrument: &I) -> Result<Self::Plan>;
}

/// Reject channels the instrument does not have.
fn check_channels(channels: &[u32], available: u32) -> Result<()> {
    match channels.iter().find(|&&ch| ch >= available) {
        Some(&channel) => Err(AcquisitionError::InvalidChannel { channel, available }),
        None => Ok(()),
    }
}

/// One second worth of samples, at least one.
fn one_second_of_samples(rate: f64) -> u64 {
    (rate.round() as u64).max(1)
}
