//! Simulated instruments.
//!
//! Deterministic stand-ins for real acquisition hardware, used by the test suite and the
//! command line demo:
//!
//! - [`SimulatedAnalogIn`] - sine waveforms on every channel, quantised sample clock
//! - [`SimulatedDigitalIn`] - bit-packed counter or constant patterns, clock divider and
//!   buffer negotiation
//!
//! Both play a [`TickScript`] that fixes the exact `(state, available, lost, corrupted)`
//! sequence reported to the engine, record every register write and call, and can fail
//! on demand through a [`FaultInjector`].
//!
//! # Example
//!
//! ```
//! use triggered_daq::acquire;
//! use triggered_daq::request::AnalogRequest;
//! use triggered_daq::sim::{SimulatedAnalogIn, TickScript};
//!
//! # fn example() -> triggered_daq::Result<()> {
//! let mut scope = SimulatedAnalogIn::new(2, TickScript::streaming(1000, 100));
//! let request = AnalogRequest::builder().channels(&[0, 1]).build()?;
//! let dataset = acquire(&mut scope, &request)?;
//! assert_eq!(dataset.len(), 1000);
//! # Ok(())
//! # }
//! ```

mod analog;
mod digital;
mod faults;
mod script;

pub use analog::{AnalogRegisterLog, SimulatedAnalogIn, Waveform, ANALOG_CLOCK_HZ};
pub use digital::{BitPattern, DigitalRegisterLog, SimulatedDigitalIn, DIGITAL_CLOCK_HZ};
pub use faults::{FaultInjector, FaultScenario, Operation};
pub use script::{ScriptedTick, TickScript};

/// Calls a simulated instrument has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLog {
    /// `(apply, start)` of every `configure` call.
    pub configure: Vec<(bool, bool)>,
    /// `status(false)` calls.
    pub ready_polls: usize,
    /// `status(true)` calls.
    pub ticks: usize,
    /// `reset` calls.
    pub resets: usize,
}
