//! Bounded row input for injector steps.

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tapline_common::types::Row;

/// The writing end of an injector step's queue.
///
/// Clones share the same queue. Once [`signal_no_more_rows`] has been called
/// on any clone, all further puts fail.
///
/// [`signal_no_more_rows`]: RowInput::signal_no_more_rows
#[derive(Clone)]
pub struct RowInput {
    sender: Arc<Mutex<Option<Sender<Row>>>>,
}

impl RowInput {
    /// Creates a queue holding at most `capacity` rows.
    ///
    /// Returns the input and the receiving end for the injector.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<Row>) {
        let (tx, rx) = channel::bounded(capacity.max(1));
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Offers a row, waiting up to `timeout` for space.
    ///
    /// Returns `false` if the queue stayed full, the input was closed, or
    /// the consumer went away. Callers tell these apart by checking whether
    /// the consuming pipeline is still running.
    pub fn put_row_with_timeout(&self, row: Row, timeout: Duration) -> bool {
        // Clone the sender so the lock is not held while blocking.
        let Some(sender) = self.sender.lock().clone() else {
            return false;
        };
        match sender.send_timeout(row, timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_) | SendTimeoutError::Disconnected(_)) => false,
        }
    }

    /// Closes the input. The injector ends once queued rows are drained.
    pub fn signal_no_more_rows(&self) {
        self.sender.lock().take();
    }

    /// Returns whether the input was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}
