//! Shared utilities.

pub mod clock;
pub mod decimal;

pub use clock::{wait_until, Clock, ManualClock, SystemClock};
