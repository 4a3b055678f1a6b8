//! Bounded hand-off queue between the sampler thread and the main loop

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single timestamped reading of a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    pub value: f64,

    /// Session time at which the sample was taken.
    ///
    /// Units: seconds
    pub timestamp_s: f64,
}

/// A queue of samples of one signal.
///
/// Cloning the queue gives another handle to the same samples, so the
/// producer and consumer each hold one.
#[derive(Debug, Clone)]
pub struct SampleQueue {
    inner: Arc<Mutex<VecDeque<TimedSample>>>,
    capacity: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SampleQueue {
    /// Create a new queue holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a sample, dropping the oldest one if the queue is full.
    pub fn push(&self, sample: TimedSample) {
        let mut q = self.lock();

        if q.len() >= self.capacity {
            q.pop_front();
            warn!("Odometry sample queue full, oldest sample dropped");
        }

        q.push_back(sample);
    }

    /// Take every sample in the queue, leaving it empty.
    ///
    /// The swap happens under a single lock so a sample pushed concurrently
    /// either lands in the returned batch or in the next one, never both or
    /// neither.
    pub fn drain(&self) -> Vec<TimedSample> {
        let mut q = self.lock();
        let taken = std::mem::replace(&mut *q, VecDeque::with_capacity(self.capacity));

        taken.into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<VecDeque<TimedSample>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
