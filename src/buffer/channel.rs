//! Lock-guarded per-channel buffers shared between the link task and consumers

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::RingBuffer;
use crate::Result;
use crate::config::BufferSettings;
use crate::types::{DecodedFrame, EyeStateSample, EyelidSample, FrameKind, GazeSample, Sample};

/// One channel's ring buffer behind its own mutex
///
/// Only the link task writes; any thread may read. The lock is held for the copy or
/// the O(capacity) mean and never across I/O.
#[derive(Debug)]
pub struct SampleBuffer<T: Sample> {
    ring: Mutex<RingBuffer<T>>,
}

impl<T: Sample> SampleBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self { ring: Mutex::new(RingBuffer::new(capacity)?) })
    }

    pub(crate) fn write(&self, sample: T) {
        self.lock().push(sample);
    }

    /// Most recently written sample
    pub fn read_latest(&self) -> T {
        self.lock().latest()
    }

    /// Field-wise mean over the whole window
    pub fn read_mean(&self) -> T {
        self.lock().mean()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Copy of the current window, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter_chronological().copied().collect()
    }

    // A panic while holding the lock cannot leave a slot half-written (slots are Copy),
    // so a poisoned lock is still safe to read.
    fn lock(&self) -> MutexGuard<'_, RingBuffer<T>> {
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The three sample channels of one link
#[derive(Debug)]
pub struct LinkBuffers {
    pub gaze: SampleBuffer<GazeSample>,
    pub eye_state: SampleBuffer<EyeStateSample>,
    pub eyelid: SampleBuffer<EyelidSample>,
    last_kind: AtomicU8,
    frames: AtomicU64,
}

impl LinkBuffers {
    pub fn new(settings: &BufferSettings) -> Result<Self> {
        Ok(Self {
            gaze: SampleBuffer::new(settings.gaze)?,
            eye_state: SampleBuffer::new(settings.eye_state)?,
            eyelid: SampleBuffer::new(settings.eyelid)?,
            last_kind: AtomicU8::new(0),
            frames: AtomicU64::new(0),
        })
    }

    /// Store every channel a decoded frame carries
    pub(crate) fn record(&self, frame: &DecodedFrame) {
        self.gaze.write(frame.gaze);
        if let Some(eye_state) = frame.eye_state {
            self.eye_state.write(eye_state);
        }
        if let Some(eyelid) = frame.eyelid {
            self.eyelid.write(eyelid);
        }
        self.last_kind.store(frame.kind as u8, Ordering::Release);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Kind of the most recent frame, `None` before the first one
    pub fn last_kind(&self) -> Option<FrameKind> {
        FrameKind::from_u8(self.last_kind.load(Ordering::Acquire))
    }

    /// Whether the latest frame carried eye state
    pub fn eye_state_available(&self) -> bool {
        self.last_kind().is_some_and(FrameKind::has_eye_state)
    }

    /// Whether the latest frame carried eyelids
    pub fn eyelid_available(&self) -> bool {
        self.last_kind().is_some_and(FrameKind::has_eyelid)
    }

    /// Frames recorded over the lifetime of the link
    pub fn frames_recorded(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::test_utils::FrameBuilder;
    use std::sync::Arc;

    fn settings(size: usize) -> BufferSettings {
        BufferSettings { gaze: size, eye_state: size, eyelid: size }
    }

    #[test]
    fn channels_are_sized_independently() {
        let buffers =
            LinkBuffers::new(&BufferSettings { gaze: 10, eye_state: 4, eyelid: 2 }).unwrap();
        assert_eq!(buffers.gaze.capacity(), 10);
        assert_eq!(buffers.eye_state.capacity(), 4);
        assert_eq!(buffers.eyelid.capacity(), 2);
    }

    #[test]
    fn zero_sized_channel_is_rejected() {
        assert!(LinkBuffers::new(&BufferSettings { gaze: 10, eye_state: 0, eyelid: 2 }).is_err());
    }

    #[test]
    fn gaze_only_frames_leave_other_channels_alone() {
        let buffers = LinkBuffers::new(&settings(3)).unwrap();
        let frame = codec::decode(&FrameBuilder::new(FrameKind::GazeOnly).gaze(5.0, 6.0).build())
            .unwrap();

        buffers.record(&frame);

        assert_eq!(buffers.gaze.read_latest(), GazeSample::new(5.0, 6.0));
        assert_eq!(buffers.eye_state.read_latest(), EyeStateSample::default());
        assert!(!buffers.eye_state_available());
        assert!(!buffers.eyelid_available());
        assert_eq!(buffers.last_kind(), Some(FrameKind::GazeOnly));
    }

    #[test]
    fn availability_tracks_latest_frame() {
        let buffers = LinkBuffers::new(&settings(3)).unwrap();
        assert_eq!(buffers.last_kind(), None);

        let full = FrameBuilder::new(FrameKind::GazeEyeStateEyelid)
            .eye_state([1.0; 14])
            .eyelid([2.0; 6])
            .build();
        buffers.record(&codec::decode(&full).unwrap());
        assert!(buffers.eye_state_available());
        assert!(buffers.eyelid_available());

        let gaze = FrameBuilder::new(FrameKind::GazeOnly).build();
        buffers.record(&codec::decode(&gaze).unwrap());
        assert!(!buffers.eye_state_available());
        assert_eq!(buffers.frames_recorded(), 2);
    }

    #[test]
    fn concurrent_readers_see_consistent_samples() {
        let buffers = Arc::new(LinkBuffers::new(&settings(8)).unwrap());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffers = Arc::clone(&buffers);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let latest = buffers.gaze.read_latest();
                        // Writer always stores x == y
                        assert_eq!(latest.point.x, latest.point.y);
                        let _ = buffers.gaze.read_mean();
                    }
                })
            })
            .collect();

        for i in 0..1000 {
            buffers.gaze.write(GazeSample::new(i as f32, i as f32));
        }

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(buffers.gaze.snapshot().len(), 8);
    }
}
