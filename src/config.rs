//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/acquisition.toml` by default)
//! 2. environment variables prefixed with `TRIGGERED_DAQ_`, nested keys separated by `__`
//!
//! ```text
//! TRIGGERED_DAQ_ACQUISITION__SAMPLE_RATE_HZ=2000
//! TRIGGERED_DAQ_TRIGGER__RETRY_SAMPLES=-1
//! ```
//!
//! Durations use humantime syntax (`"1s"`, `"500us"`).
//!
//! # Example
//! ```no_run
//! use triggered_daq::config::DaqConfig;
//!
//! # fn main() -> triggered_daq::Result<()> {
//! let config = DaqConfig::load()?;
//! let request = config.analog_request()?;
//! println!("{}: {} Hz", config.application.name, request.sample_rate());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::controller::{AcquireOptions, BusyPoll, SleepPoll, YieldPoll};
use crate::error::{AcquisitionError, Result};
use crate::instrument::{AnalogFilter, ChannelKind};
use crate::request::{AnalogRequest, AnalogSettings, DigitalRequest, DigitalSettings};
use crate::sim::{BitPattern, SimulatedAnalogIn, SimulatedDigitalIn, TickScript, Waveform};
use crate::tracing_setup::{parse_log_level, OutputFormat};
use crate::trigger::{
    AnalogTrigger, AnalogTriggerKind, DigitalTriggerKind, TriggerIntent, DEFAULT_HOLDOFF,
    DEFAULT_HYSTERESIS, DEFAULT_POSITION_FRACTION,
};

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/acquisition.toml";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "TRIGGERED_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaqConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Record settings
    pub acquisition: AcquisitionConfig,
    /// Trigger settings
    #[serde(default)]
    pub trigger: TriggerConfig,
    /// Simulated instrument settings
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
        }
    }
}

/// How the controller waits between idle polls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PollConfig {
    /// Spin
    #[default]
    Busy,
    /// Yield the thread
    Yield,
    /// Sleep for a fixed interval
    Sleep {
        /// Sleep per idle poll
        #[serde(with = "humantime_serde")]
        interval: Duration,
    },
}

/// Record configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Channel kind to acquire
    pub kind: ChannelKind,
    /// Sample rate in Hz
    pub sample_rate_hz: f64,
    /// Record length
    #[serde(with = "humantime_serde")]
    pub record_length: Duration,
    /// Channels, in output order
    pub channels: Vec<u32>,
    /// Analog input ranges in volts peak-to-peak (empty = 5 V)
    #[serde(default)]
    pub input_ranges: Vec<f64>,
    /// Analog ADC filter
    #[serde(default)]
    pub filter: AnalogFilter,
    /// Digital buffer size in samples (unset = instrument maximum)
    #[serde(default)]
    pub buffer_size: Option<usize>,
    /// Idle poll strategy
    #[serde(default)]
    pub poll: PollConfig,
    /// Abort the run after this long (unset = no limit)
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Trigger detector selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSourceConfig {
    /// Free running
    #[default]
    None,
    /// Analog edge/level detector
    Analog,
    /// Digital per-channel detector
    Digital,
}

/// Trigger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Detector
    #[serde(default)]
    pub source: TriggerSourceConfig,
    /// Pre-roll fraction of the record
    #[serde(default = "default_position")]
    pub position: f64,
    /// Samples to wait for a trigger (unset = one second, negative = forever)
    #[serde(default)]
    pub retry_samples: Option<i64>,
    /// Analog source channel
    #[serde(default)]
    pub channel: u32,
    /// Analog condition
    #[serde(default)]
    pub kind: AnalogTriggerKind,
    /// Analog threshold in volts
    #[serde(default)]
    pub level: f64,
    /// Analog hysteresis in volts
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f64,
    /// Analog holdoff
    #[serde(default = "default_holdoff", with = "humantime_serde")]
    pub holdoff: Duration,
    /// Digital condition per channel, or one for all channels
    #[serde(default)]
    pub digital: Vec<DigitalTriggerKind>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            source: TriggerSourceConfig::None,
            position: default_position(),
            retry_samples: None,
            channel: 0,
            kind: AnalogTriggerKind::default(),
            level: 0.0,
            hysteresis: DEFAULT_HYSTERESIS,
            holdoff: DEFAULT_HOLDOFF,
            digital: Vec::new(),
        }
    }
}

impl TriggerConfig {
    /// Trigger intent described by this section.
    pub fn intent(&self) -> TriggerIntent {
        let intent = match self.source {
            TriggerSourceConfig::None => TriggerIntent::disabled(),
            TriggerSourceConfig::Analog => TriggerIntent::analog(
                AnalogTrigger::on_channel(self.channel)
                    .with_kind(self.kind)
                    .with_level(self.level)
                    .with_hysteresis(self.hysteresis)
                    .with_holdoff(self.holdoff),
            ),
            TriggerSourceConfig::Digital => TriggerIntent::digital(self.digital.clone()),
        }
        .with_position(self.position);

        match self.retry_samples {
            Some(samples) => intent.with_retry_budget(samples),
            None => intent,
        }
    }
}

/// Simulated instrument configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Analog input channels
    #[serde(default = "default_analog_channels")]
    pub analog_channels: u32,
    /// Digital input lines
    #[serde(default = "default_digital_channels")]
    pub digital_channels: u32,
    /// Samples delivered per poll
    #[serde(default = "default_samples_per_tick")]
    pub samples_per_tick: u64,
    /// Armed polls before the trigger fires (triggered runs only)
    #[serde(default)]
    pub pre_trigger_ticks: usize,
    /// Probability of a loss event per poll
    #[serde(default)]
    pub loss_probability: f64,
    /// Largest loss event in samples
    #[serde(default = "default_max_lost")]
    pub max_lost: u64,
    /// Seed of the loss generator
    #[serde(default)]
    pub seed: u64,
    /// Analog sine amplitude in volts
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
    /// Analog sine frequency in Hz
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            analog_channels: default_analog_channels(),
            digital_channels: default_digital_channels(),
            samples_per_tick: default_samples_per_tick(),
            pre_trigger_ticks: 0,
            loss_probability: 0.0,
            max_lost: default_max_lost(),
            seed: 0,
            amplitude: default_amplitude(),
            frequency_hz: default_frequency(),
        }
    }
}

impl SimulatorConfig {
    /// Script streaming `total` samples, preceded by the configured pre-trigger polls
    /// when `triggered` is set.
    pub fn script(&self, total: u64, triggered: bool) -> TickScript {
        let mut script = TickScript::streaming(total, self.samples_per_tick);
        if triggered {
            script = script.with_pre_trigger(self.pre_trigger_ticks, self.samples_per_tick);
        }
        if self.loss_probability > 0.0 {
            script = script.with_random_loss(self.seed, self.loss_probability, self.max_lost);
        }
        script
    }

    /// Simulated analog input streaming `total` samples.
    pub fn analog_instrument(&self, total: u64, triggered: bool) -> SimulatedAnalogIn {
        SimulatedAnalogIn::new(self.analog_channels, self.script(total, triggered)).with_waveform(
            Waveform {
                amplitude: self.amplitude,
                frequency_hz: self.frequency_hz,
            },
        )
    }

    /// Simulated digital input streaming `total` samples.
    pub fn digital_instrument(&self, total: u64, triggered: bool) -> SimulatedDigitalIn {
        SimulatedDigitalIn::new(self.digital_channels, self.script(total, triggered))
            .with_pattern(BitPattern::Counter)
    }
}

// Default value functions
fn default_name() -> String {
    "triggered-daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_position() -> f64 {
    DEFAULT_POSITION_FRACTION
}

fn default_hysteresis() -> f64 {
    DEFAULT_HYSTERESIS
}

fn default_holdoff() -> Duration {
    DEFAULT_HOLDOFF
}

fn default_analog_channels() -> u32 {
    2
}

fn default_digital_channels() -> u32 {
    16
}

fn default_samples_per_tick() -> u64 {
    1000
}

fn default_max_lost() -> u64 {
    16
}

fn default_amplitude() -> f64 {
    1.0
}

fn default_frequency() -> f64 {
    50.0
}

impl DaqConfig {
    /// Load and validate [`DEFAULT_CONFIG_PATH`] merged with the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load and validate a specific file merged with the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate().map_err(AcquisitionError::Config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> std::result::Result<(), String> {
        parse_log_level(&self.application.log_level)?;

        let acquisition = &self.acquisition;
        if !(acquisition.sample_rate_hz.is_finite() && acquisition.sample_rate_hz > 0.0) {
            return Err(format!(
                "Invalid sample_rate_hz {}. Must be positive",
                acquisition.sample_rate_hz
            ));
        }
        if acquisition.channels.is_empty() {
            return Err("At least one channel must be configured".to_string());
        }

        let trigger_kind = match self.trigger.source {
            TriggerSourceConfig::None => None,
            TriggerSourceConfig::Analog => Some(ChannelKind::Analog),
            TriggerSourceConfig::Digital => Some(ChannelKind::Digital),
        };
        if let Some(kind) = trigger_kind.filter(|kind| *kind != acquisition.kind) {
            return Err(format!(
                "Trigger source '{}' does not match acquisition kind '{}'",
                kind, acquisition.kind
            ));
        }
        if self.trigger.retry_samples == Some(0) {
            return Err("retry_samples must not be 0".to_string());
        }

        let simulator = &self.simulator;
        if simulator.samples_per_tick == 0 {
            return Err("samples_per_tick must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&simulator.loss_probability) {
            return Err(format!(
                "Invalid loss_probability {}. Must be 0.0-1.0",
                simulator.loss_probability
            ));
        }

        Ok(())
    }

    /// Analog request described by this configuration.
    pub fn analog_request(&self) -> Result<AnalogRequest> {
        let acquisition = &self.acquisition;
        AnalogRequest::builder()
            .sample_rate(acquisition.sample_rate_hz)
            .record_length(acquisition.record_length)
            .channels(&acquisition.channels)
            .trigger(self.trigger.intent())
            .settings(AnalogSettings {
                input_ranges: acquisition.input_ranges.clone(),
                filter: acquisition.filter,
            })
            .build()
    }

    /// Digital request described by this configuration.
    pub fn digital_request(&self) -> Result<DigitalRequest> {
        let acquisition = &self.acquisition;
        DigitalRequest::builder()
            .sample_rate(acquisition.sample_rate_hz)
            .record_length(acquisition.record_length)
            .channels(&acquisition.channels)
            .trigger(self.trigger.intent())
            .settings(DigitalSettings {
                buffer_size: acquisition.buffer_size,
            })
            .build()
    }

    /// Poll strategy and timeout for a run.
    pub fn acquire_options(&self) -> AcquireOptions {
        let options = match self.acquisition.poll {
            PollConfig::Busy => AcquireOptions::new().poll_strategy(BusyPoll),
            PollConfig::Yield => AcquireOptions::new().poll_strategy(YieldPoll),
            PollConfig::Sleep { interval } => {
                AcquireOptions::new().poll_strategy(SleepPoll(interval))
            }
        };
        match self.acquisition.timeout {
            Some(timeout) => options.timeout(timeout),
            None => options,
        }
    }
}
