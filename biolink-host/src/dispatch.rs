//! Host command dispatcher
//!
//! Turns operator and automation intents into framed commands, matches
//! acknowledgements back to their callers by correlation id, and keeps
//! a local view of the field node's power state so commands are not
//! wasted on a node that cannot hear them.
//!
//! The dispatcher is cheap to clone; every clone shares the transmit
//! half, the outstanding-request table, and the command log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use biolink_protocol::{
    write_frame, Ack, AckOutcome, Command, CommandFrame, CorrelationId, Frame, LinkError, LinkTx,
};

use crate::command_log::CommandLog;

/// Default wait for an acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Command issuance failures surfaced to the caller.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The field node is in deep sleep; the command was rejected
    /// locally and never reached the wire.
    #[error("field node is asleep; wake it first")]
    NodeAsleep,

    /// No acknowledgement arrived within the window. The command may
    /// still execute; a late ack is discarded as stale.
    #[error("no acknowledgement within {0:?}")]
    Timeout(Duration),

    /// The transport rejected the send or went away entirely.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Lock that shrugs off poisoning; host state stays usable after a
/// panicked task.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Inner {
    tx: Mutex<Box<dyn LinkTx>>,
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<Ack>>>,
    next_id: AtomicU32,
    asleep: AtomicBool,
    ack_timeout: Duration,
    log: Mutex<CommandLog>,
}

/// Shared handle for issuing commands and completing acknowledgements.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Dispatcher over the given transmit half and command log.
    pub fn new(tx: Box<dyn LinkTx>, log: CommandLog, ack_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tx: Mutex::new(tx),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU32::new(1),
                asleep: AtomicBool::new(false),
                ack_timeout,
                log: Mutex::new(log),
            }),
        }
    }

    /// Issue one command and wait for its acknowledgement.
    ///
    /// Returns `Ok(None)` for fire-and-forget commands (shutdown),
    /// which also flips the local power-state view to asleep. Every
    /// attempt is recorded in the command log, failures included.
    pub async fn issue(&self, command: Command) -> Result<Option<Ack>, DispatchError> {
        if self.node_asleep() {
            self.record(&command, "rejected: node asleep");
            return Err(DispatchError::NodeAsleep);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let waiter = if command.expects_ack() {
            let (ack_tx, ack_rx) = oneshot::channel();
            lock(&self.inner.pending).insert(id, ack_tx);
            Some(ack_rx)
        } else {
            None
        };

        let frame = Frame::Command(CommandFrame { id, command });
        let sent = {
            let mut tx = lock(&self.inner.tx);
            write_frame(tx.as_mut(), &frame)
        };
        if let Err(e) = sent {
            lock(&self.inner.pending).remove(&id);
            self.record(&command, "send failed");
            return Err(e.into());
        }

        let Some(ack_rx) = waiter else {
            // The node cuts serial power while executing this; treat it
            // as asleep from this moment.
            self.inner.asleep.store(true, Ordering::SeqCst);
            self.record(&command, "sent");
            log::info!("shutdown sent, field node marked asleep");
            return Ok(None);
        };

        match tokio::time::timeout(self.inner.ack_timeout, ack_rx).await {
            Ok(Ok(ack)) => {
                self.record(&command, &outcome_label(&ack.outcome));
                Ok(Some(ack))
            }
            Ok(Err(_)) => {
                self.record(&command, "link closed");
                Err(DispatchError::Link(LinkError::Closed))
            }
            Err(_) => {
                // Stop tracking the id; a late ack is stale.
                lock(&self.inner.pending).remove(&id);
                self.record(&command, "timeout");
                Err(DispatchError::Timeout(self.inner.ack_timeout))
            }
        }
    }

    /// Hand an inbound acknowledgement to its waiting caller.
    ///
    /// Acks for ids no longer tracked (timed out or never issued) are
    /// discarded.
    pub fn complete(&self, ack: Ack) {
        match lock(&self.inner.pending).remove(&ack.id) {
            Some(ack_tx) => {
                let _ = ack_tx.send(ack);
            }
            None => log::debug!("discarding stale ack for id {}", ack.id),
        }
    }

    /// Local view of the field node's power state.
    pub fn node_asleep(&self) -> bool {
        self.inner.asleep.load(Ordering::SeqCst)
    }

    /// Flip the local view back to awake, typically on a boot frame.
    pub fn mark_awake(&self) {
        if self.inner.asleep.swap(false, Ordering::SeqCst) {
            log::info!("field node is awake again");
        }
    }

    fn record(&self, command: &Command, outcome: &str) {
        if let Err(e) = lock(&self.inner.log).record(command, outcome) {
            log::error!("command log write failed: {e}");
        }
    }
}

fn outcome_label(outcome: &AckOutcome) -> String {
    match outcome {
        AckOutcome::Ok => "ok".to_string(),
        AckOutcome::OkValue(v) => format!("ok {v}"),
        AckOutcome::Error(e) => format!("error {}", e.token()),
    }
}
