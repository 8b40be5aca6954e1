//! Mode arbitration
//!
//! The control loop that turns voice commands into scan-mode transitions.
//! It is the only place that starts or stops sessions and the only place
//! the camera changes hands.

mod machine;
mod mode;

pub use machine::{ArbiterExit, ArbiterSettings, ModeArbiter};
pub use mode::ScanMode;
