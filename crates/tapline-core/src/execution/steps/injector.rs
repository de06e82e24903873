//! Source fed from a [`RowInput`](crate::execution::RowInput).

use super::RowSource;
use crate::execution::PipelineError;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tapline_common::types::Row;

/// How often a waiting injector checks whether it was stopped.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Emits rows written into the pipeline's input queue.
///
/// Ends when the input is closed and drained, or when the pipeline stops.
pub struct InjectorSource {
    input: Receiver<Row>,
}

impl InjectorSource {
    /// Creates a source over the receiving end of an input queue.
    #[must_use]
    pub fn new(input: Receiver<Row>) -> Self {
        Self { input }
    }
}

impl RowSource for InjectorSource {
    fn next_row(&mut self, stop: &AtomicBool) -> Result<Option<Row>, PipelineError> {
        loop {
            if stop.load(Ordering::Acquire) {
                return Ok(None);
            }
            match self.input.recv_timeout(STOP_POLL_INTERVAL) {
                Ok(row) => return Ok(Some(row)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::RowInput;
    use std::sync::Arc;
    use tapline_common::types::Value;

    #[test]
    fn test_drains_then_ends() {
        let (input, rx) = RowInput::bounded(4);
        let mut source = InjectorSource::new(rx);
        let stop = AtomicBool::new(false);
        assert!(input.put_row_with_timeout(Row::new(vec![Value::Int64(1)]), Duration::from_millis(10)));
        input.signal_no_more_rows();
        assert!(source.next_row(&stop).unwrap().is_some());
        assert!(source.next_row(&stop).unwrap().is_none());
    }

    #[test]
    fn test_stop_interrupts_wait() {
        let (_input, rx) = RowInput::bounded(4);
        let mut source = InjectorSource::new(rx);
        let stop = Arc::new(AtomicBool::new(false));
        let setter = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                stop.store(true, Ordering::Release);
            })
        };
        assert!(source.next_row(&stop).unwrap().is_none());
        setter.join().unwrap();
    }
}
