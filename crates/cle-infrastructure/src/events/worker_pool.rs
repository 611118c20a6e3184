//! Bounded worker pool
//!
//! A fixed set of named OS threads pulling jobs from one bounded
//! `crossbeam-channel` queue.
//!
//! ```text
//!  try_enqueue ──▶ [ bounded queue ] ──▶ worker-0
//!                                   ├──▶ worker-1
//!                                   └──▶ worker-n
//! ```
//!
//! Shutdown stops intake, lets the workers drain what is already queued,
//! then sends one stop message per worker and waits a bounded time for
//! each to exit. Stop messages that do not fit in a full queue before the
//! deadline are skipped; closing the queue still ends each worker once it
//! runs dry.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cle_domain::error::{Error, Result};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded, unbounded};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::error_ext::ErrorContext;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Why a job was refused
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    /// Every queue slot is taken
    #[error("worker pool '{pool}' queue is full ({capacity} jobs)")]
    Full {
        /// Pool name
        pool: String,
        /// Queue capacity
        capacity: usize,
    },
    /// The pool no longer accepts jobs
    #[error("worker pool '{pool}' is shut down")]
    Stopped {
        /// Pool name
        pool: String,
    },
}

impl From<EnqueueError> for Error {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::Full { .. } => Error::capacity(err.to_string()),
            EnqueueError::Stopped { .. } => Error::infrastructure(err.to_string()),
        }
    }
}

/// Jobs queued or running
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        *self.count.lock() += 1;
    }

    fn end(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Fixed-size pool of named worker threads
pub struct WorkerPool {
    name: String,
    capacity: usize,
    accepting: AtomicBool,
    sender: Mutex<Option<Sender<Message>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    exited: Receiver<usize>,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    /// Start `workers` threads named `<name>-<index>` sharing a queue of
    /// `capacity` jobs
    pub fn new<S: Into<String>>(name: S, workers: usize, capacity: usize) -> Result<Self> {
        let name = name.into();
        if workers == 0 {
            return Err(Error::configuration(format!(
                "Worker pool '{name}' needs at least one worker"
            )));
        }
        if capacity == 0 {
            return Err(Error::configuration(format!(
                "Worker pool '{name}' queue capacity cannot be 0"
            )));
        }

        let (sender, receiver) = bounded::<Message>(capacity);
        let (exit_tx, exited) = unbounded::<usize>();
        let in_flight = Arc::new(InFlight::default());

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let receiver = receiver.clone();
            let exit_tx = exit_tx.clone();
            let in_flight = Arc::clone(&in_flight);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    run_worker(&receiver, &in_flight);
                    // the pool may already be gone
                    let _ = exit_tx.send(index);
                })
                .io_context(format!("Failed to spawn worker {index} of pool '{name}'"))?;
            handles.push(handle);
        }

        info!(pool = %name, workers, capacity, "Worker pool started");
        Ok(Self {
            name,
            capacity,
            accepting: AtomicBool::new(true),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            exited,
            in_flight,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.sender.lock().as_ref().map_or(0, Sender::len)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Queue a job without blocking
    pub fn try_enqueue<F>(&self, job: F) -> std::result::Result<(), EnqueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        let stopped = || EnqueueError::Stopped {
            pool: self.name.clone(),
        };
        if !self.is_accepting() {
            return Err(stopped());
        }
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(stopped());
        };

        self.in_flight.begin();
        match sender.try_send(Message::Run(Box::new(job))) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.in_flight.end();
                match e {
                    TrySendError::Full(_) => Err(EnqueueError::Full {
                        pool: self.name.clone(),
                        capacity: self.capacity,
                    }),
                    TrySendError::Disconnected(_) => Err(stopped()),
                }
            }
        }
    }

    /// Wait until no job is queued or running; `false` on timeout
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            if self.in_flight.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    /// Stop intake, drain the queue and wait up to `timeout` for the workers.
    ///
    /// Workers still running after the timeout are left detached. Further
    /// calls do nothing.
    pub fn shutdown(&self, timeout: Duration) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        let mut workers: Vec<Option<JoinHandle<()>>> = std::mem::take(&mut *self.workers.lock())
            .into_iter()
            .map(Some)
            .collect();
        debug!(pool = %self.name, workers = workers.len(), "Worker pool stopping");

        // queued jobs are ahead of the stop messages
        let deadline = Instant::now() + timeout;
        for _ in 0..workers.len() {
            match sender.send_deadline(Message::Stop, deadline) {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(_)) => {
                    warn!(pool = %self.name, "Queue still full at shutdown deadline");
                    break;
                }
                Err(SendTimeoutError::Disconnected(_)) => break,
            }
        }
        drop(sender);

        let mut joined = 0;
        while joined < workers.len() {
            match self.exited.recv_deadline(deadline) {
                Ok(index) => {
                    if let Some(handle) = workers.get_mut(index).and_then(Option::take) {
                        if handle.join().is_err() {
                            error!(pool = %self.name, worker = index, "Worker thread panicked");
                        }
                    }
                    joined += 1;
                }
                Err(_) => break,
            }
        }

        let stuck = workers.iter().filter(|slot| slot.is_some()).count();
        drop(workers);
        if stuck > 0 {
            warn!(
                pool = %self.name,
                stuck,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Worker threads did not exit in time"
            );
        } else {
            info!(pool = %self.name, "Worker pool stopped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(Duration::from_secs(1));
    }
}

fn run_worker(receiver: &Receiver<Message>, in_flight: &InFlight) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!(
                        thread = thread::current().name().unwrap_or("worker"),
                        "Worker job panicked"
                    );
                }
                in_flight.end();
            }
            Message::Stop => break,
        }
    }
}
