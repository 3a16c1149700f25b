//! ## Fault classes
//!
//! Every long-running loop in the node returns `Result<_, Fault>`. The restart
//! wrapper in [crate::supervision::restart] re-enters the loop on a recoverable
//! fault and hands a fatal one up, which terminates the process.
//!
//! | Fault | Recoverable |
//! |-------|-------------|
//! | [`Fault::Assertion`] | yes |
//! | [`Fault::Io`] | yes |
//! | [`Fault::Codec`] | yes |
//! | [`Fault::HeartBeat`] | no |
//! | [`Fault::NoNodeId`] | no |
//! | [`Fault::NoLiveElevator`] | no |

use std::time::Duration;
use thiserror::Error;

/// Faults raised by the control loop, the scheduler and the session manager.
#[derive(Debug, Error)]
pub enum Fault {
    /// An invariant check failed, the loop restarts with fresh local state.
    #[error("assertion failed: {what} at {location}")]
    Assertion {
        /// The violated condition and its explanation
        what: String,
        /// `file:line` of the check
        location: String,
    },

    /// Socket or elevator server I/O failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A packet could not be encoded or decoded.
    #[error("codec failure: {0}")]
    Codec(#[from] bincode::Error),

    /// A supervised loop missed its heartbeat.
    #[error("heart-beat missed, real delta is {delta:?}, threshold is {threshold:?}")]
    HeartBeat {
        /// Time since the last beat
        delta: Duration,
        /// Allowed time between beats
        threshold: Duration,
    },

    /// Discovery finished but none of the peers is a local address.
    #[error("could not assign node id, no discovered peer is a local address")]
    NoNodeId,

    /// The scheduler found no live car to assign a call to.
    #[error("no live elevator to serve floor {floor}")]
    NoLiveElevator {
        /// Floor of the call that could not be assigned
        floor: i32,
    },
}

impl Fault {
    /// Whether restarting the failed loop may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Fault::Assertion { .. } | Fault::Io(_) | Fault::Codec(_))
    }

    /// Builds an assertion fault, used by [fault_unless!](crate::fault_unless).
    pub fn assertion(what: impl Into<String>, location: impl Into<String>) -> Self {
        Fault::Assertion {
            what: what.into(),
            location: location.into(),
        }
    }
}

/// Returns early with [Fault::Assertion] when the condition does not hold.
///
/// ```
/// use elevatorbank::{fault_unless, error::Fault};
///
/// fn check(floor: i32) -> Result<(), Fault> {
///     fault_unless!(floor >= 1, "floor below minimum");
///     Ok(())
/// }
///
/// assert!(check(2).is_ok());
/// assert!(check(0).unwrap_err().is_recoverable());
/// ```
#[macro_export]
macro_rules! fault_unless {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::error::Fault::assertion(
                format!("{} ({})", stringify!($cond), $msg),
                format!("{}:{}", file!(), line!()),
            ));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guarded(v: i32) -> Result<i32, Fault> {
        fault_unless!(v > 0, "must be positive");
        Ok(v)
    }

    #[test]
    fn fault_unless_passes_through_valid_values() {
        assert_eq!(guarded(3).unwrap(), 3);
    }

    #[test]
    fn fault_unless_reports_condition_and_location() {
        let err = guarded(-1).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("v > 0"));
        assert!(text.contains("must be positive"));
        assert!(text.contains("error.rs"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn fatal_faults_are_not_recoverable() {
        let hb = Fault::HeartBeat {
            delta: Duration::from_millis(300),
            threshold: Duration::from_millis(100),
        };
        assert!(!hb.is_recoverable());
        assert!(!Fault::NoNodeId.is_recoverable());
        assert!(!Fault::NoLiveElevator { floor: 2 }.is_recoverable());
    }
}
