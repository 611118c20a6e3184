//! Queued lifecycle dispatcher
//!
//! Delivers lifecycle events on one background thread, in publication
//! order. When the queue is full the event is delivered on the publishing
//! thread instead of being dropped.

use std::thread::{self, JoinHandle, ThreadId};

use cle_application::ports::{EventDelivery, EventDispatcher};
use cle_domain::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::constants::DISPATCHER_THREAD_NAME;
use crate::error_ext::ErrorContext;

enum Message {
    Deliver(EventDelivery),
    Flush(Sender<()>),
    Stop,
}

/// [`EventDispatcher`] running listeners on a dedicated thread
pub struct QueuedEventDispatcher {
    sender: Sender<Message>,
    thread_id: ThreadId,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedEventDispatcher {
    /// Start the dispatcher thread with room for `capacity` pending events
    pub fn start(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::configuration(
                "Lifecycle dispatch queue capacity cannot be 0",
            ));
        }
        let (sender, receiver) = bounded(capacity);
        let thread = thread::Builder::new()
            .name(DISPATCHER_THREAD_NAME.to_string())
            .spawn(move || run(&receiver))
            .io_context("Failed to spawn the lifecycle dispatcher")?;
        debug!(capacity, "Queued lifecycle dispatcher started");
        Ok(Self {
            sender,
            thread_id: thread.thread().id(),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Events waiting for delivery
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    fn on_dispatcher_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Deliver what is queued and stop the thread. Further calls do nothing.
    pub fn shutdown(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if self.sender.send(Message::Stop).is_err() || self.on_dispatcher_thread() {
            return;
        }
        if thread.join().is_err() {
            warn!("Lifecycle dispatcher thread panicked");
        }
        debug!("Queued lifecycle dispatcher stopped");
    }
}

impl EventDispatcher for QueuedEventDispatcher {
    fn dispatch(&self, delivery: EventDelivery) {
        match self.sender.try_send(Message::Deliver(delivery)) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                if let Message::Deliver(delivery) = message {
                    warn!(
                        kind = %delivery.event().kind,
                        factory = %delivery.event().factory,
                        "Lifecycle event queue full, delivering inline"
                    );
                    delivery.deliver();
                }
            }
            Err(TrySendError::Disconnected(message)) => {
                if let Message::Deliver(delivery) = message {
                    delivery.deliver();
                }
            }
        }
    }

    fn flush(&self) {
        // a listener flushing would wait for itself
        if self.on_dispatcher_thread() {
            return;
        }
        let (ack, done) = bounded(1);
        if self.sender.send(Message::Flush(ack)).is_ok() {
            // disconnected when the thread is gone
            let _ = done.recv();
        }
    }
}

impl Drop for QueuedEventDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(receiver: &Receiver<Message>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Deliver(delivery) => delivery.deliver(),
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
            Message::Stop => break,
        }
    }
    // late publications racing with the stop request
    while let Ok(message) = receiver.try_recv() {
        match message {
            Message::Deliver(delivery) => delivery.deliver(),
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
            Message::Stop => {}
        }
    }
}
