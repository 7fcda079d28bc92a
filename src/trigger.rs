//! Trigger configuration.
//!
//! Translates what the caller wants ("start the record on a rising edge of channel 1 with
//! 20% pre-roll, give up after one second") into the register values an instrument needs,
//! and normalises the request into a [`TriggerSpec`]:
//!
//! - a positive position fraction is negated, the result must lie in `[-1, 0]`
//! - a retry budget of zero is rejected, a negative one means "retry forever"
//! - per-channel digital trigger kinds are OR-combined into four bit masks
//!
//! Nothing here touches an instrument. The acquisition plans write the register structs
//! produced by [`TriggerSpec::analog_registers`] and [`TriggerSpec::digital_registers`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AcquisitionError, Result};
use crate::instrument::ChannelKind;

/// Position used when the caller does not choose one: 10% of the record is pre-roll.
pub const DEFAULT_POSITION_FRACTION: f64 = 0.1;

/// Default analog trigger hysteresis in volts.
pub const DEFAULT_HYSTERESIS: f64 = 0.05;

/// Default analog trigger holdoff.
pub const DEFAULT_HOLDOFF: Duration = Duration::from_micros(500);

/// Analog trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalogTriggerKind {
    /// Signal crosses the level upwards.
    #[default]
    EdgeRise,
    /// Signal crosses the level downwards.
    EdgeFall,
    /// Signal is above the level.
    LevelHigh,
    /// Signal is below the level.
    LevelLow,
}

/// Detector type register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalogTriggerType {
    /// Edge detector.
    Edge,
    /// Level detector.
    Level,
}

/// Detector condition register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSlope {
    /// Rising edge, or high level.
    Rise,
    /// Falling edge, or low level.
    Fall,
}

impl AnalogTriggerKind {
    /// Split into the type and condition registers.
    pub fn registers(self) -> (AnalogTriggerType, TriggerSlope) {
        match self {
            Self::EdgeRise => (AnalogTriggerType::Edge, TriggerSlope::Rise),
            Self::EdgeFall => (AnalogTriggerType::Edge, TriggerSlope::Fall),
            Self::LevelHigh => (AnalogTriggerType::Level, TriggerSlope::Rise),
            Self::LevelLow => (AnalogTriggerType::Level, TriggerSlope::Fall),
        }
    }
}

/// Per-channel digital trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitalTriggerKind {
    /// Channel does not take part in triggering.
    #[default]
    Disabled,
    /// Trigger while the line is low.
    Low,
    /// Trigger while the line is high.
    High,
    /// Trigger on a low-to-high transition.
    RisingEdge,
    /// Trigger on a high-to-low transition.
    FallingEdge,
}

/// Digital trigger detector masks, one bit per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DigitalTriggerMasks {
    /// Channels triggering on a low level.
    pub level_low: u32,
    /// Channels triggering on a high level.
    pub level_high: u32,
    /// Channels triggering on a rising edge.
    pub edge_rise: u32,
    /// Channels triggering on a falling edge.
    pub edge_fall: u32,
}

impl DigitalTriggerMasks {
    /// OR-combine per-channel conditions into detector masks.
    pub fn from_channels<'a>(
        conditions: impl IntoIterator<Item = &'a (u32, DigitalTriggerKind)>,
    ) -> Self {
        let mut masks = Self::default();
        for &(channel, kind) in conditions {
            let bit = 1u32.checked_shl(channel).unwrap_or(0);
            match kind {
                DigitalTriggerKind::Disabled => {}
                DigitalTriggerKind::Low => masks.level_low |= bit,
                DigitalTriggerKind::High => masks.level_high |= bit,
                DigitalTriggerKind::RisingEdge => masks.edge_rise |= bit,
                DigitalTriggerKind::FallingEdge => masks.edge_fall |= bit,
            }
        }
        masks
    }

    /// Union of all masks; non-zero iff any channel trigger is active.
    pub fn any(&self) -> u32 {
        self.level_low | self.level_high | self.edge_rise | self.edge_fall
    }
}

/// Analog trigger intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogTrigger {
    /// Source channel.
    pub channel: u32,
    /// Edge or level condition.
    pub kind: AnalogTriggerKind,
    /// Threshold in volts.
    pub level: f64,
    /// Hysteresis band in volts.
    pub hysteresis: f64,
    /// Minimum time before a subsequent trigger is recognised.
    #[serde(with = "humantime_serde")]
    pub holdoff: Duration,
}

impl AnalogTrigger {
    /// Rising edge trigger through 0 V on `channel` with default hysteresis and holdoff.
    pub fn on_channel(channel: u32) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    /// Set the condition.
    pub fn with_kind(mut self, kind: AnalogTriggerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the threshold in volts.
    pub fn with_level(mut self, level: f64) -> Self {
        self.level = level;
        self
    }

    /// Set the hysteresis in volts.
    pub fn with_hysteresis(mut self, hysteresis: f64) -> Self {
        self.hysteresis = hysteresis;
        self
    }

    /// Set the holdoff.
    pub fn with_holdoff(mut self, holdoff: Duration) -> Self {
        self.holdoff = holdoff;
        self
    }
}

impl Default for AnalogTrigger {
    fn default() -> Self {
        Self {
            channel: 0,
            kind: AnalogTriggerKind::EdgeRise,
            level: 0.0,
            hysteresis: DEFAULT_HYSTERESIS,
            holdoff: DEFAULT_HOLDOFF,
        }
    }
}

/// Which detector, if any, starts the record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TriggerSource {
    /// Start recording as soon as the instrument is armed.
    #[default]
    Disabled,
    /// Analog edge/level detector.
    Analog(AnalogTrigger),
    /// Digital detector; either one kind per requested channel, or a single kind applied
    /// to every requested channel.
    Digital(Vec<DigitalTriggerKind>),
}

/// Trigger settings as supplied by the caller, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerIntent {
    /// Detector selection.
    pub source: TriggerSource,
    /// Fraction of the record before the trigger point. Sign is ignored.
    pub position: f64,
    /// Samples to wait for a trigger. `None` selects one second worth of samples,
    /// negative values wait forever and zero is rejected.
    pub retry_budget: Option<i64>,
}

impl Default for TriggerIntent {
    fn default() -> Self {
        Self {
            source: TriggerSource::Disabled,
            position: DEFAULT_POSITION_FRACTION,
            retry_budget: None,
        }
    }
}

impl TriggerIntent {
    /// No trigger; the record starts when the instrument is armed.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Analog detector.
    pub fn analog(trigger: AnalogTrigger) -> Self {
        Self {
            source: TriggerSource::Analog(trigger),
            ..Self::default()
        }
    }

    /// Digital detector with per-channel kinds.
    pub fn digital(kinds: impl Into<Vec<DigitalTriggerKind>>) -> Self {
        Self {
            source: TriggerSource::Digital(kinds.into()),
            ..Self::default()
        }
    }

    /// Set the pre-roll fraction.
    pub fn with_position(mut self, position: f64) -> Self {
        self.position = position;
        self
    }

    /// Set the retry budget in samples.
    pub fn with_retry_budget(mut self, samples: i64) -> Self {
        self.retry_budget = Some(samples);
        self
    }
}

/// Normalised trigger condition.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerCondition {
    /// No detector.
    None,
    /// Analog detector on one channel.
    Analog(AnalogTrigger),
    /// Digital detector.
    Digital {
        /// Condition of every requested channel, in request order.
        per_channel: Vec<(u32, DigitalTriggerKind)>,
        /// OR-combined masks.
        masks: DigitalTriggerMasks,
    },
}

/// Validated trigger settings.
///
/// `position_fraction` is always in `[-1, 0]`; `retry_budget` is `None` for infinite
/// retries and never `Some(0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSpec {
    condition: TriggerCondition,
    position_fraction: f64,
    retry_budget: Option<u64>,
}

/// Analog trigger register values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogTriggerRegisters {
    /// Source channel.
    pub channel: u32,
    /// Edge or level detector.
    pub trigger_type: AnalogTriggerType,
    /// Rise/high or fall/low.
    pub condition: TriggerSlope,
    /// Trigger position in seconds relative to the end of the record (non-positive).
    pub position_s: f64,
    /// Threshold in volts.
    pub level: f64,
    /// Hysteresis in volts.
    pub hysteresis: f64,
    /// Holdoff in seconds.
    pub holdoff_s: f64,
}

/// Digital trigger register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalTriggerRegisters {
    /// Detector masks.
    pub masks: DigitalTriggerMasks,
    /// Samples to capture before the trigger point.
    pub prefill: u64,
}

impl TriggerSpec {
    /// Validate and normalise a trigger intent.
    ///
    /// `channels` are the requested channels (already validated), `available` the number
    /// of channels of the instrument and `default_retry` the budget used when the intent
    /// leaves it unspecified.
    pub fn configure(
        intent: &TriggerIntent,
        kind: ChannelKind,
        channels: &[u32],
        available: u32,
        default_retry: u64,
    ) -> Result<Self> {
        let position_fraction = normalize_position(intent.position)?;
        let retry_budget = normalize_retry_budget(intent.retry_budget, default_retry)?;

        let condition = match (&intent.source, kind) {
            (TriggerSource::Disabled, _) => TriggerCondition::None,
            (TriggerSource::Analog(trigger), ChannelKind::Analog) => {
                if trigger.channel >= available {
                    return Err(AcquisitionError::InvalidChannel {
                        channel: trigger.channel,
                        available,
                    });
                }
                if trigger.hysteresis.is_nan() || trigger.hysteresis < 0.0 {
                    return Err(AcquisitionError::invalid_request(format!(
                        "trigger hysteresis must be non-negative (got {})",
                        trigger.hysteresis
                    )));
                }
                TriggerCondition::Analog(trigger.clone())
            }
            (TriggerSource::Digital(kinds), ChannelKind::Digital) => {
                let per_channel = pair_digital_kinds(kinds, channels)?;
                if let Some(&(channel, _)) = per_channel.iter().find(|(ch, _)| *ch >= available)
                {
                    return Err(AcquisitionError::InvalidChannel { channel, available });
                }
                let masks = DigitalTriggerMasks::from_channels(&per_channel);
                TriggerCondition::Digital { per_channel, masks }
            }
            (TriggerSource::Analog(_), ChannelKind::Digital) => {
                return Err(AcquisitionError::invalid_request(
                    "analog trigger requested for a digital acquisition",
                ))
            }
            (TriggerSource::Digital(_), ChannelKind::Analog) => {
                return Err(AcquisitionError::invalid_request(
                    "digital trigger requested for an analog acquisition",
                ))
            }
        };

        Ok(Self {
            condition,
            position_fraction,
            retry_budget,
        })
    }

    /// A spec with no detector, used for free-running records.
    pub fn disabled() -> Self {
        Self {
            condition: TriggerCondition::None,
            position_fraction: -DEFAULT_POSITION_FRACTION,
            retry_budget: None,
        }
    }

    /// Normalised condition.
    pub fn condition(&self) -> &TriggerCondition {
        &self.condition
    }

    /// True when a detector was configured.
    pub fn enabled(&self) -> bool {
        !matches!(self.condition, TriggerCondition::None)
    }

    /// Channels taking part in triggering.
    pub fn channel_mask(&self) -> Vec<u32> {
        match &self.condition {
            TriggerCondition::None => Vec::new(),
            TriggerCondition::Analog(trigger) => vec![trigger.channel],
            TriggerCondition::Digital { per_channel, .. } => per_channel
                .iter()
                .filter(|(_, kind)| *kind != DigitalTriggerKind::Disabled)
                .map(|(channel, _)| *channel)
                .collect(),
        }
    }

    /// Whether the controller must wait for a trigger before counting samples.
    ///
    /// For digital detectors this is the `trig_any` test: a detector whose channels are
    /// all `Disabled` does not gate the record.
    pub fn waits_for_trigger(&self) -> bool {
        match &self.condition {
            TriggerCondition::None => false,
            TriggerCondition::Analog(_) => true,
            TriggerCondition::Digital { masks, .. } => masks.any() != 0,
        }
    }

    /// Pre-roll fraction in `[-1, 0]`.
    pub fn position_fraction(&self) -> f64 {
        self.position_fraction
    }

    /// Retry budget in samples; `None` means infinite.
    pub fn retry_budget(&self) -> Option<u64> {
        self.retry_budget
    }

    /// Register values for an analog detector, `None` when no analog trigger is set.
    pub fn analog_registers(&self, record_length: Duration) -> Option<AnalogTriggerRegisters> {
        let TriggerCondition::Analog(trigger) = &self.condition else {
            return None;
        };
        let (trigger_type, condition) = trigger.kind.registers();
        Some(AnalogTriggerRegisters {
            channel: trigger.channel,
            trigger_type,
            condition,
            position_s: self.position_fraction * record_length.as_secs_f64(),
            level: trigger.level,
            hysteresis: trigger.hysteresis,
            holdoff_s: trigger.holdoff.as_secs_f64(),
        })
    }

    /// Register values for the digital detector. Masks are zero when no digital trigger
    /// is set; the prefill is always derived from the position.
    pub fn digital_registers(&self, target_samples: u64) -> DigitalTriggerRegisters {
        let masks = match &self.condition {
            TriggerCondition::Digital { masks, .. } => *masks,
            _ => DigitalTriggerMasks::default(),
        };
        let prefill = (-self.position_fraction * target_samples as f64).round() as u64;
        DigitalTriggerRegisters { masks, prefill }
    }
}

fn normalize_position(position: f64) -> Result<f64> {
    let normalized = if position > 0.0 { -position } else { position };
    if !(-1.0..=0.0).contains(&normalized) {
        return Err(AcquisitionError::InvalidTriggerPosition { position });
    }
    Ok(normalized)
}

fn normalize_retry_budget(budget: Option<i64>, default_retry: u64) -> Result<Option<u64>> {
    match budget {
        None => Ok(Some(default_retry.max(1))),
        Some(0) => Err(AcquisitionError::InvalidRetryBudget),
        Some(n) if n < 0 => Ok(None),
        Some(n) => Ok(Some(n.unsigned_abs())),
    }
}

fn pair_digital_kinds(
    kinds: &[DigitalTriggerKind],
    channels: &[u32],
) -> Result<Vec<(u32, DigitalTriggerKind)>> {
    match kinds {
        [single] => Ok(channels.iter().map(|&ch| (ch, *single)).collect()),
        _ if kinds.len() == channels.len() => {
            Ok(channels.iter().copied().zip(kinds.iter().copied()).collect())
        }
        _ => Err(AcquisitionError::TriggerCountMismatch {
            triggers: kinds.len(),
            channels: channels.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analog(intent: &TriggerIntent) -> Result<TriggerSpec> {
        TriggerSpec::configure(intent, ChannelKind::Analog, &[0, 1], 2, 1000)
    }

    #[test]
    fn test_positive_position_is_negated() {
        let spec = analog(&TriggerIntent::disabled().with_position(0.25)).unwrap();
        assert_eq!(spec.position_fraction(), -0.25);

        let spec = analog(&TriggerIntent::disabled().with_position(-0.5)).unwrap();
        assert_eq!(spec.position_fraction(), -0.5);
    }

    #[test]
    fn test_position_out_of_range() {
        let err = analog(&TriggerIntent::disabled().with_position(1.5)).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::InvalidTriggerPosition { position } if position == 1.5
        ));
        assert!(analog(&TriggerIntent::disabled().with_position(f64::NAN)).is_err());
    }

    #[test]
    fn test_retry_budget_normalisation() {
        let spec = analog(&TriggerIntent::disabled()).unwrap();
        assert_eq!(spec.retry_budget(), Some(1000));

        let spec = analog(&TriggerIntent::disabled().with_retry_budget(10)).unwrap();
        assert_eq!(spec.retry_budget(), Some(10));

        let spec = analog(&TriggerIntent::disabled().with_retry_budget(-1)).unwrap();
        assert_eq!(spec.retry_budget(), None);

        let err = analog(&TriggerIntent::disabled().with_retry_budget(0)).unwrap_err();
        assert!(matches!(err, AcquisitionError::InvalidRetryBudget));
    }

    #[test]
    fn test_analog_trigger_channel_validation() {
        let intent = TriggerIntent::analog(AnalogTrigger::on_channel(3));
        let err = analog(&intent).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::InvalidChannel {
                channel: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn test_analog_registers() {
        let intent = TriggerIntent::analog(
            AnalogTrigger::on_channel(1)
                .with_kind(AnalogTriggerKind::LevelLow)
                .with_level(1.5),
        )
        .with_position(0.5);
        let spec = analog(&intent).unwrap();
        assert!(spec.enabled());
        assert!(spec.waits_for_trigger());
        assert_eq!(spec.channel_mask(), vec![1]);

        let regs = spec.analog_registers(Duration::from_secs(2)).unwrap();
        assert_eq!(regs.channel, 1);
        assert_eq!(regs.trigger_type, AnalogTriggerType::Level);
        assert_eq!(regs.condition, TriggerSlope::Fall);
        assert_eq!(regs.position_s, -1.0);
        assert_eq!(regs.level, 1.5);
        assert_eq!(regs.hysteresis, DEFAULT_HYSTERESIS);
        assert!((regs.holdoff_s - 500e-6).abs() < 1e-12);
    }

    #[test]
    fn test_digital_masks() {
        let conditions = [
            (0, DigitalTriggerKind::Low),
            (1, DigitalTriggerKind::High),
            (2, DigitalTriggerKind::RisingEdge),
            (3, DigitalTriggerKind::FallingEdge),
            (4, DigitalTriggerKind::Disabled),
            (5, DigitalTriggerKind::RisingEdge),
        ];
        let masks = DigitalTriggerMasks::from_channels(&conditions);
        assert_eq!(masks.level_low, 0b0001);
        assert_eq!(masks.level_high, 0b0010);
        assert_eq!(masks.edge_rise, 0b10_0100);
        assert_eq!(masks.edge_fall, 0b1000);
        assert_eq!(masks.any(), 0b10_1111);
    }

    #[test]
    fn test_digital_trigger_broadcast_and_mismatch() {
        let intent = TriggerIntent::digital(vec![DigitalTriggerKind::RisingEdge]);
        let spec =
            TriggerSpec::configure(&intent, ChannelKind::Digital, &[0, 2, 5], 16, 100).unwrap();
        assert_eq!(spec.channel_mask(), vec![0, 2, 5]);
        assert!(spec.waits_for_trigger());
        assert_eq!(spec.digital_registers(1000).masks.edge_rise, 0b10_0101);

        let intent = TriggerIntent::digital(vec![
            DigitalTriggerKind::High,
            DigitalTriggerKind::Low,
        ]);
        let err =
            TriggerSpec::configure(&intent, ChannelKind::Digital, &[0, 2, 5], 16, 100).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::TriggerCountMismatch {
                triggers: 2,
                channels: 3
            }
        ));
    }

    #[test]
    fn test_all_disabled_digital_does_not_wait() {
        let intent = TriggerIntent::digital(vec![DigitalTriggerKind::Disabled]);
        let spec = TriggerSpec::configure(&intent, ChannelKind::Digital, &[0, 1], 16, 100).unwrap();
        assert!(spec.enabled());
        assert!(!spec.waits_for_trigger());
        assert!(spec.channel_mask().is_empty());
    }

    #[test]
    fn test_digital_prefill() {
        let spec = TriggerSpec::configure(
            &TriggerIntent::disabled().with_position(0.25),
            ChannelKind::Digital,
            &[0],
            16,
            100,
        )
        .unwrap();
        let regs = spec.digital_registers(1000);
        assert_eq!(regs.prefill, 250);
        assert_eq!(regs.masks.any(), 0);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let intent = TriggerIntent::digital(vec![DigitalTriggerKind::High]);
        assert!(matches!(
            analog(&intent),
            Err(AcquisitionError::InvalidRequest { .. })
        ));
    }
}
