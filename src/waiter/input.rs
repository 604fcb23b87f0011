//! Disconnectable interactive input
//!
//! A wait call must block on a byte read from stdin (watching for the abort
//! key) yet still tear down promptly, and an ordinary blocking read of the
//! process stdin cannot be unblocked from another thread. So the real stream
//! is read by a single process-wide pump thread and fanned out over
//! channels: each wait call subscribes for its own byte feed, and detaching
//! the subscription drops its sender, which wakes a blocked receive
//! immediately. The pump is acquired once and stays usable across calls.

use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

type SubscriberList = Arc<Mutex<Vec<(u64, Sender<u8>)>>>;

/// Process-wide proxy over an interactive byte stream.
pub struct InteractiveInput {
    subscribers: SubscriberList,
    next_id: AtomicU64,
    eof: Arc<AtomicBool>,
}

/// What a blocked subscription read resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputByte {
    /// A byte arrived from the underlying stream
    Byte(u8),
    /// The underlying stream reached end-of-stream (or failed)
    Eof,
    /// The subscription was detached by teardown; not an end-of-stream
    Detached,
}

/// Receiving half of a subscription; lives on the abort-reader thread.
pub struct InputSubscription {
    rx: Receiver<u8>,
    detached: Arc<AtomicBool>,
}

/// Teardown half of a subscription; detaches from any thread.
pub struct SubscriptionGuard {
    id: u64,
    detached: Arc<AtomicBool>,
    subscribers: SubscriberList,
}

impl InteractiveInput {
    /// The shared proxy over the real process stdin. Acquired once per
    /// process; successive wait calls subscribe against the same pump.
    pub fn shared() -> Arc<InteractiveInput> {
        static SHARED: OnceLock<Arc<InteractiveInput>> = OnceLock::new();
        SHARED
            .get_or_init(|| Arc::new(InteractiveInput::from_reader(std::io::stdin())))
            .clone()
    }

    /// Build a proxy over an arbitrary stream. Used directly by tests; the
    /// binary goes through [`InteractiveInput::shared`].
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        let subscribers: SubscriberList = Arc::default();
        let eof = Arc::new(AtomicBool::new(false));
        let pump_subscribers = subscribers.clone();
        let pump_eof = eof.clone();
        let spawned = thread::Builder::new()
            .name("change-wait-stdin-pump".to_string())
            .spawn(move || pump(reader, pump_subscribers, pump_eof));
        if let Err(e) = spawned {
            // No pump means every subscription sees immediate end-of-stream,
            // which cancels the wait rather than hanging it.
            tracing::warn!("failed to spawn stdin pump thread: {e}");
            eof.store(true, Ordering::SeqCst);
        }
        Self {
            subscribers,
            next_id: AtomicU64::new(0),
            eof,
        }
    }

    /// Register a new byte feed. The guard detaches it during teardown.
    /// Subscribing after the stream already ended yields an immediate
    /// end-of-stream read rather than a read that never returns.
    pub fn subscribe(&self) -> (InputSubscription, SubscriptionGuard) {
        let (tx, rx) = channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let detached = Arc::new(AtomicBool::new(false));
        {
            // Checked under the same lock the pump clears under, so a
            // sender can never be added to an already-ended stream.
            let mut subs = self.subscribers.lock().unwrap();
            if !self.eof.load(Ordering::SeqCst) {
                subs.push((id, tx));
            }
        }
        (
            InputSubscription {
                rx,
                detached: detached.clone(),
            },
            SubscriptionGuard {
                id,
                detached,
                subscribers: self.subscribers.clone(),
            },
        )
    }
}

fn pump(mut reader: impl Read, subscribers: SubscriberList, eof: Arc<AtomicBool>) {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let mut subs = subscribers.lock().unwrap();
                subs.retain(|(_, tx)| tx.send(buf[0]).is_ok());
            }
        }
    }
    // Dropping every sender delivers end-of-stream to live subscriptions.
    let mut subs = subscribers.lock().unwrap();
    eof.store(true, Ordering::SeqCst);
    subs.clear();
}

impl InputSubscription {
    /// Block for the next byte. Distinguishes a real end-of-stream from a
    /// teardown detach so that teardown is never mistaken for Ctrl-D.
    pub fn next(&self) -> InputByte {
        match self.rx.recv() {
            Ok(byte) => InputByte::Byte(byte),
            Err(_) if self.detached.load(Ordering::SeqCst) => InputByte::Detached,
            Err(_) => InputByte::Eof,
        }
    }
}

impl SubscriptionGuard {
    /// Remove the subscription, waking any blocked read. Idempotent.
    pub fn detach(&self) {
        // Flag first: the reader checks it after its receive fails.
        self.detached.store(true, Ordering::SeqCst);
        self.subscribers.lock().unwrap().retain(|(id, _)| *id != self.id);
    }
}
