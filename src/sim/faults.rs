//! Fault injection for the simulated instruments.

use std::collections::HashMap;
use std::fmt;

use crate::error::InstrumentError;

/// Instrument call a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `configure(apply, start)`.
    Configure,
    /// `status(read_data)`.
    Status,
    /// `record_counts()`.
    RecordCounts,
    /// Payload reads.
    Read,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configure => "configure",
            Self::Status => "status",
            Self::RecordCounts => "record_counts",
            Self::Read => "read",
        };
        write!(f, "{}", name)
    }
}

/// A failure scenario.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultScenario {
    /// Succeed `count` times, then fail every further call with a communication error.
    FailAfterN {
        /// Affected call.
        operation: Operation,
        /// Successful calls before the first failure.
        count: u32,
    },
    /// Fail every call with a hardware fault.
    HardwareFault {
        /// Affected call.
        operation: Operation,
        /// Vendor error code.
        code: i32,
    },
}

/// Decides which simulated calls fail.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    scenarios: Vec<FaultScenario>,
    calls: HashMap<Operation, u32>,
}

impl FaultInjector {
    /// No faults.
    pub fn none() -> Self {
        Self::default()
    }

    /// Add a scenario.
    pub fn with_scenario(mut self, scenario: FaultScenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// Count one call of `operation` and fail it if a scenario says so.
    pub fn check(&mut self, operation: Operation) -> Result<(), InstrumentError> {
        let calls = self.calls.entry(operation).or_insert(0);
        *calls += 1;
        let calls = *calls;

        for scenario in &self.scenarios {
            match *scenario {
                FaultScenario::FailAfterN {
                    operation: op,
                    count,
                } if op == operation && calls > count => {
                    return Err(InstrumentError::communication(format!(
                        "{} failed after {} calls",
                        operation, count
                    )));
                }
                FaultScenario::HardwareFault {
                    operation: op,
                    code,
                } if op == operation => {
                    return Err(InstrumentError::Hardware {
                        code,
                        message: format!("{} fault", operation),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_after_n() {
        let mut faults = FaultInjector::none().with_scenario(FaultScenario::FailAfterN {
            operation: Operation::Status,
            count: 2,
        });
        assert!(faults.check(Operation::Status).is_ok());
        assert!(faults.check(Operation::Read).is_ok());
        assert!(faults.check(Operation::Status).is_ok());
        assert!(matches!(
            faults.check(Operation::Status),
            Err(InstrumentError::Communication { .. })
        ));
    }

    #[test]
    fn test_hardware_fault() {
        let mut faults = FaultInjector::none().with_scenario(FaultScenario::HardwareFault {
            operation: Operation::Configure,
            code: 17,
        });
        assert_eq!(
            faults.check(Operation::Configure),
            Err(InstrumentError::Hardware {
                code: 17,
                message: "configure fault".into()
            })
        );
    }
}
