//! Sample smoothing buffers.
//!
//! [`RingBuffer`] is the plain circular store; [`SampleBuffer`] wraps one behind a
//! per-channel mutex so the link task can write while consumers read `latest` or the
//! smoothed `mean` at display rate. [`LinkBuffers`] groups the gaze, eye-state and
//! eyelid channels of one link; channels never contend with each other.

mod channel;
mod ring;

pub use channel::{LinkBuffers, SampleBuffer};
pub use ring::RingBuffer;
