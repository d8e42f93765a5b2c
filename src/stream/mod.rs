//! Stream combinators for sample delivery

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
