//! # Triggered DAQ
//!
//! Trigger-gated, loss-aware streaming acquisition for multi-channel analog and digital
//! instruments. One call to [`acquire`] configures an instrument, waits for it to become
//! ready, arms it, polls it until the record is complete and returns an ordered,
//! timestamped dataset per channel.
//!
//! ## Crate Structure
//!
//! - **`instrument`**: capability traits an instrument driver implements.
//! - **`trigger`**: turns trigger intent into normalised settings and register values.
//! - **`request`**: validated acquisition requests and their builders.
//! - **`plan`**: requests checked against a concrete instrument; register writes and
//!   payload reads per channel kind.
//! - **`controller`**: the arm/wait/run/poll state machine, retry budget and cancellation.
//! - **`codec`**: payload decoding per channel kind.
//! - **`reconstruct`**: per-tick sample chunks with explicit placeholders for lost samples.
//! - **`dataset`**: final datasets, time axis, totals and warnings.
//! - **`sim`**: deterministic simulated instruments.
//! - **`task`**: running an acquisition from async code.
//! - **`config`** and **`tracing_setup`**: configuration loading and logging.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use triggered_daq::request::DigitalRequest;
//! use triggered_daq::sim::{SimulatedDigitalIn, TickScript};
//! use triggered_daq::trigger::{DigitalTriggerKind, TriggerIntent};
//!
//! # fn main() -> triggered_daq::Result<()> {
//! let script = TickScript::streaming(500, 50).with_pre_trigger(2, 50);
//! let mut logic = SimulatedDigitalIn::new(16, script);
//! let request = DigitalRequest::builder()
//!     .sample_rate(1000.0)
//!     .record_length(Duration::from_millis(500))
//!     .channels(&[0, 1, 2])
//!     .trigger(TriggerIntent::digital(vec![DigitalTriggerKind::RisingEdge]))
//!     .build()?;
//!
//! let dataset = triggered_daq::acquire(&mut logic, &request)?;
//! assert!(dataset.triggered());
//! assert!(dataset.is_valid());
//! assert_eq!(dataset.channels().len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod controller;
pub mod dataset;
pub mod error;
pub mod instrument;
pub mod plan;
pub mod reconstruct;
pub mod request;
pub mod sim;
pub mod task;
pub mod tracing_setup;
pub mod trigger;

pub use controller::{acquire, acquire_with, AcquireOptions, StopToken};
pub use dataset::{AcquiredDataset, AcquisitionWarning, AnalogDataset, DigitalDataset};
pub use error::{AcquisitionError, InstrumentError, Result};
pub use instrument::{AnalogInstrument, DigitalInstrument, Instrument, InstrumentState};
pub use request::{AnalogRequest, DigitalRequest};
