//! Where completion callbacks run.
//!
//! Network results are produced on runtime worker threads. Callbacks are
//! handed to a `DeliveryContext` instead of being run there, so the caller
//! decides which thread observes them.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use tracing::warn;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait DeliveryContext: Send + Sync {
    fn deliver(&self, job: Job);
}

/// Runs callbacks on whichever thread completed the exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl DeliveryContext for Inline {
    fn deliver(&self, job: Job) {
        job();
    }
}

/// A serial queue of callbacks.
///
/// Either drained by a dedicated thread ([`DeliveryQueue::spawn`]) or pumped
/// by the thread that owns the [`DeliveryPump`] ([`DeliveryQueue::manual`]),
/// the way a UI main loop would.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    sender: Sender<Job>,
}

impl DeliveryQueue {
    pub fn manual() -> (Self, DeliveryPump) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, DeliveryPump { receiver })
    }

    /// Start a named thread that runs callbacks in arrival order. The thread
    /// exits once every handle to the queue has been dropped.
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (queue, pump) = Self::manual();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in pump.receiver {
                    job();
                }
            })?;
        Ok(queue)
    }
}

impl DeliveryContext for DeliveryQueue {
    fn deliver(&self, job: Job) {
        if self.sender.send(job).is_err() {
            warn!("delivery queue closed; dropping completion callback");
        }
    }
}

/// Receiving end of a manual [`DeliveryQueue`].
#[derive(Debug)]
pub struct DeliveryPump {
    receiver: Receiver<Job>,
}

impl DeliveryPump {
    /// Run every callback already queued. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one callback and run it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn manual_queue_runs_on_the_pumping_thread() {
        let (queue, pump) = DeliveryQueue::manual();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            let queue = queue.clone();
            thread::spawn(move || {
                queue.deliver(Box::new(move || seen.lock().unwrap().push((i, thread::current().id()))));
            })
            .join()
            .unwrap();
        }
        assert_eq!(pump.run_pending(), 3);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(seen.iter().all(|(_, id)| *id == thread::current().id()));
    }

    #[test]
    fn spawned_queue_runs_callbacks_in_order() {
        let queue = DeliveryQueue::spawn("delivery-test").unwrap();
        let (done, results) = mpsc::channel();
        for i in 0..5 {
            let done = done.clone();
            queue.deliver(Box::new(move || done.send(i).unwrap()));
        }
        let order: Vec<i32> = (0..5)
            .map(|_| results.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn run_next_times_out_when_idle() {
        let (_queue, pump) = DeliveryQueue::manual();
        assert!(!pump.run_next(Duration::from_millis(10)));
    }
}
