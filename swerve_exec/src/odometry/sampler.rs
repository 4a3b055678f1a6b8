//! High rate odometry sampler
//!
//! Reads every registered signal at a fixed rate on its own thread, so module
//! positions are captured faster than the main loop runs. Each read goes into
//! the signal's [`SampleQueue`], which the main loop drains once per cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Internal
use super::{SampleQueue, TimedSample};
use crate::actuator::SignalSource;
use util::session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

struct Registration {
    source: Arc<dyn SignalSource>,
    queue: SampleQueue,
}

/// Samples a set of signals into their queues.
#[derive(Clone)]
pub struct OdometrySampler {
    registrations: Arc<Mutex<Vec<Registration>>>,
    queue_capacity: usize,
    stop: Arc<AtomicBool>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OdometrySampler {
    /// Create a sampler whose queues hold at most `queue_capacity` samples.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            registrations: Arc::new(Mutex::new(Vec::new())),
            queue_capacity,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a signal, returning the queue its samples will be put into.
    pub fn register(&self, source: Arc<dyn SignalSource>) -> SampleQueue {
        let queue = SampleQueue::new(self.queue_capacity);

        self.lock().push(Registration {
            source,
            queue: queue.clone()
        });

        queue
    }

    /// Number of registered signals.
    pub fn num_signals(&self) -> usize {
        self.lock().len()
    }

    /// Read every registered signal once, stamping all of them with the same
    /// time.
    ///
    /// If any signal cannot be read no queue is written to, so every queue
    /// always gains the same number of samples. Returns whether the samples
    /// were recorded.
    pub fn sample_once(&self, timestamp_s: f64) -> bool {
        let regs = self.lock();

        let values: Option<Vec<f64>> = regs.iter().map(|r| r.source.read()).collect();

        match values {
            Some(values) => {
                for (r, value) in regs.iter().zip(values) {
                    r.queue.push(TimedSample { value, timestamp_s });
                }
                true
            },
            None => {
                debug!("Odometry sample at {:.3} s skipped, a signal was unavailable", timestamp_s);
                false
            }
        }
    }

    /// Spawn the sampling thread. It runs until [`OdometrySampler::stop`] is
    /// called.
    pub fn start(&self, frequency_hz: f64) -> JoinHandle<()> {
        let sampler = self.clone();
        let period = Duration::from_secs_f64(1.0 / frequency_hz);
        self.stop.store(false, Ordering::Relaxed);

        info!(
            "Starting odometry sampler at {} Hz with {} signals",
            frequency_hz,
            self.num_signals()
        );

        thread::spawn(move || {
            let mut next = Instant::now() + period;

            while !sampler.stop.load(Ordering::Relaxed) {
                sampler.sample_once(session::get_elapsed_seconds());

                // Sleep to the next tick rather than for a whole period so
                // the rate does not drift
                let now = Instant::now();
                if next > now {
                    thread::sleep(next - now);
                }
                else {
                    trace!("Odometry sampler behind schedule");
                }
                next += period;
            }

            debug!("Odometry sampler stopped");
        })
    }

    /// Signal the sampling thread to exit.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    fn lock(&self) -> std::sync::MutexGuard<Vec<Registration>> {
        self.registrations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// A signal that counts up every time it is read.
    struct Counter(Mutex<f64>);

    impl SignalSource for Counter {
        fn read(&self) -> Option<f64> {
            let mut v = self.0.lock().unwrap();
            *v += 1.0;
            Some(*v)
        }
    }

    struct Dead;

    impl SignalSource for Dead {
        fn read(&self) -> Option<f64> {
            None
        }
    }

    #[test]
    fn test_equal_counts() {
        let sampler = OdometrySampler::new(16);
        let a = sampler.register(Arc::new(Counter(Mutex::new(0.0))));
        let b = sampler.register(Arc::new(Counter(Mutex::new(10.0))));

        for i in 0..3 {
            assert!(sampler.sample_once(i as f64 * 0.004));
        }

        let a = a.drain();
        let b = b.drain();
        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 3);

        // Same timestamp for every signal on a tick
        for (sa, sb) in a.iter().zip(b.iter()) {
            assert_eq!(sa.timestamp_s, sb.timestamp_s);
        }
        assert_eq!(a[2].value, 3.0);
        assert_eq!(b[2].value, 13.0);
    }

    #[test]
    fn test_unavailable_signal_skips_tick() {
        let sampler = OdometrySampler::new(16);
        let a = sampler.register(Arc::new(Counter(Mutex::new(0.0))));
        let _b = sampler.register(Arc::new(Dead));

        assert!(!sampler.sample_once(0.0));
        assert!(a.is_empty());
    }

    #[test]
    fn test_thread_start_stop() {
        let sampler = OdometrySampler::new(1024);
        let q = sampler.register(Arc::new(Counter(Mutex::new(0.0))));

        let handle = sampler.start(500.0);
        thread::sleep(Duration::from_millis(50));
        sampler.stop();
        handle.join().unwrap();

        assert!(!q.is_empty());
    }
}
