//! Error types for triggered acquisition.
//!
//! Two layers of errors exist:
//!
//! - **`InstrumentError`**: raised at the capability boundary by an instrument
//!   implementation (communication failure, rejected register value, hardware fault).
//! - **`AcquisitionError`**: everything the engine can report to a caller. It wraps
//!   `InstrumentError` via `#[from]` so instrument calls can be propagated with `?`.
//!
//! ## Error Categories
//!
//! 1. **Validation errors** - `InvalidChannel`, `InvalidRetryBudget`, `InvalidInputRange`,
//!    `ChannelCountMismatch`, `InvalidTriggerPosition`, `TriggerCountMismatch`,
//!    `SampleRateOutOfRange`, `InvalidRequest`
//!    - Detected before any register is written
//!    - Recovery: fix the request
//!
//! 2. **Acquisition failures** - `TriggerTimeout`, `Instrument`, `Cancelled`, `DeadlineExceeded`
//!    - Detected while the instrument is armed or running
//!    - The instrument is always reset before the error is returned
//!    - Recovery: retry the acquisition
//!
//! 3. **Wrapper errors** - `Config`, `TaskFailed`
//!    - Raised outside the acquisition loop itself
//!
//! Sample loss, corruption and short records are *not* errors. They are reported as
//! [`AcquisitionWarning`](crate::dataset::AcquisitionWarning)s on the returned dataset.

use thiserror::Error;

/// Result type alias for acquisition operations.
pub type Result<T> = std::result::Result<T, AcquisitionError>;

/// Errors reported by an instrument implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstrumentError {
    /// The instrument could not be reached or stopped responding.
    #[error("Instrument communication failed: {message}")]
    Communication {
        /// Driver supplied detail.
        message: String,
    },

    /// A register write was refused or read back a different value.
    #[error("Instrument rejected setting '{setting}': {message}")]
    Rejected {
        /// Name of the register or setting.
        setting: String,
        /// Driver supplied detail.
        message: String,
    },

    /// The device reported an internal fault.
    #[error("Hardware fault (code {code}): {message}")]
    Hardware {
        /// Vendor error code.
        code: i32,
        /// Driver supplied detail.
        message: String,
    },

    /// The operation is not available on this device.
    #[error("Operation not supported: {message}")]
    NotSupported {
        /// Driver supplied detail.
        message: String,
    },
}

impl InstrumentError {
    /// Shorthand for a communication failure.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    /// Shorthand for a rejected register write.
    pub fn rejected(setting: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            setting: setting.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur while preparing or running an acquisition.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// A requested channel does not exist on the instrument.
    #[error("Invalid channel {channel}: instrument has {available} channels")]
    InvalidChannel {
        /// Requested channel index.
        channel: u32,
        /// Number of channels the instrument exposes.
        available: u32,
    },

    /// A retry budget of exactly zero samples was requested.
    #[error("Trigger retry budget must be positive, or negative for infinite retries (got 0)")]
    InvalidRetryBudget,

    /// An analog input range lies outside the instrument limits.
    #[error("Input range {range} V must be between [{min} V, {max} V]")]
    InvalidInputRange {
        /// Requested range in volts peak-to-peak.
        range: f64,
        /// Smallest range the instrument supports.
        min: f64,
        /// Largest range the instrument supports.
        max: f64,
    },

    /// The number of input ranges does not match the number of channels.
    #[error("Number of input ranges ({ranges}) must match number of channels ({channels})")]
    ChannelCountMismatch {
        /// Number of ranges supplied.
        ranges: usize,
        /// Number of channels requested.
        channels: usize,
    },

    /// The trigger position is outside the record after normalisation.
    #[error("Trigger position {position} must be between 0 and 1")]
    InvalidTriggerPosition {
        /// Position as supplied by the caller.
        position: f64,
    },

    /// The number of per-channel digital trigger kinds does not match the channel count.
    #[error("Number of triggers ({triggers}) must match number of channels ({channels})")]
    TriggerCountMismatch {
        /// Number of trigger kinds supplied.
        triggers: usize,
        /// Number of channels requested.
        channels: usize,
    },

    /// The sample rate cannot be produced by the instrument clock.
    #[error("Sample rate {requested} Hz out of range [{min} Hz, {max} Hz]")]
    SampleRateOutOfRange {
        /// Requested rate.
        requested: f64,
        /// Lowest achievable rate.
        min: f64,
        /// Highest achievable rate.
        max: f64,
    },

    /// Any other malformed request (empty channel list, non-positive rate, ...).
    #[error("Invalid acquisition request: {message}")]
    InvalidRequest {
        /// Human readable reason.
        message: String,
    },

    /// The trigger retry budget ran out before a trigger was detected.
    #[error("Failed to trigger within {samples_waited} samples")]
    TriggerTimeout {
        /// Samples seen or lost while waiting.
        samples_waited: u64,
    },

    /// The acquisition was cancelled through its stop token.
    #[error("Acquisition cancelled")]
    Cancelled,

    /// The acquisition ran past the caller supplied deadline.
    #[error("Acquisition deadline exceeded")]
    DeadlineExceeded,

    /// Error propagated from the instrument.
    #[error("Instrument error: {0}")]
    Instrument(#[from] InstrumentError),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The background acquisition task panicked or was aborted.
    #[error("Acquisition task failed: {0}")]
    TaskFailed(String),
}

impl AcquisitionError {
    /// Shorthand for an [`AcquisitionError::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// True for errors detected before any hardware side effect.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidChannel { .. }
                | Self::InvalidRetryBudget
                | Self::InvalidInputRange { .. }
                | Self::ChannelCountMismatch { .. }
                | Self::InvalidTriggerPosition { .. }
                | Self::TriggerCountMismatch { .. }
                | Self::SampleRateOutOfRange { .. }
                | Self::InvalidRequest { .. }
        )
    }

    /// True for failures that leave the instrument reset and the dataset empty.
    pub fn is_aborted_run(&self) -> bool {
        matches!(
            self,
            Self::TriggerTimeout { .. }
                | Self::Instrument(_)
                | Self::Cancelled
                | Self::DeadlineExceeded
        )
    }
}

impl From<figment::Error> for AcquisitionError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AcquisitionError::InvalidChannel {
            channel: 4,
            available: 2,
        };
        assert!(err.to_string().contains('4'));
        assert!(err.to_string().contains('2'));

        let err = AcquisitionError::TriggerTimeout { samples_waited: 12 };
        assert_eq!(err.to_string(), "Failed to trigger within 12 samples");
    }

    #[test]
    fn test_instrument_error_conversion() {
        let err: AcquisitionError = InstrumentError::communication("usb unplugged").into();
        assert!(matches!(err, AcquisitionError::Instrument(_)));
        assert!(err.to_string().contains("usb unplugged"));
        assert!(err.is_aborted_run());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_error_categories() {
        assert!(AcquisitionError::InvalidRetryBudget.is_validation());
        assert!(AcquisitionError::invalid_request("empty").is_validation());
        assert!(!AcquisitionError::Cancelled.is_validation());
        assert!(AcquisitionError::Cancelled.is_aborted_run());
        assert!(!AcquisitionError::Config("bad".into()).is_aborted_run());
    }
}
