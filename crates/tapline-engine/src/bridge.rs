//! Row hand-off between a service pipeline and a result pipeline.
//!
//! The bridge listens to the service step and offers each row to the result
//! pipeline's bounded input. A full queue blocks the service worker, which
//! is the only backpressure point: rows are retried until the result
//! pipeline takes them or goes away, so nothing is dropped or reordered
//! while the consumer runs.
//!
//! Completion travels both ways. When the service step completes the result
//! input is closed; when the result pipeline completes first, the service
//! pipeline is stopped.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tapline_common::types::Row;
use tapline_common::utils::error::{Error, Result};
use tapline_core::execution::{Pipeline, RowInput, StepOutcome};

/// Hand-off settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Rows handed over before the service is cut off; 0 is unlimited.
    pub row_limit: u64,
    /// Wait per offer before re-checking the result pipeline.
    pub offer_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            row_limit: 0,
            offer_timeout: Duration::from_secs(1),
        }
    }
}

struct BridgeState {
    service: Weak<dyn Pipeline>,
    abandoned: AtomicBool,
    cutoff_hit: AtomicBool,
    delivered: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl BridgeState {
    fn stop_service(&self) {
        if let Some(service) = self.service.upgrade() {
            if service.is_running() {
                tracing::debug!(pipeline = %service.name(), id = %service.id(), "stopping service pipeline");
                service.stop();
            }
        }
    }

    fn abandon(&self) {
        if !self.abandoned.swap(true, Ordering::AcqRel) {
            self.stop_service();
        }
    }
}

/// An installed hand-off.
///
/// Dropping the handle does not uninstall the listeners; use
/// [`abandon`](Self::abandon) to cut the service off.
#[derive(Clone)]
pub struct Bridge {
    state: Arc<BridgeState>,
}

impl Bridge {
    /// Wires `service_step` of `service` into the injector of `result`.
    ///
    /// `result_output` names the result pipeline's last step; its completion
    /// stops the service pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StepNotAccessible`] if either step is missing and
    /// [`Error::Pipeline`] if the result pipeline has no row input.
    pub fn install(
        service: &Arc<dyn Pipeline>,
        service_step: &str,
        result: &Arc<dyn Pipeline>,
        result_output: &str,
        options: BridgeOptions,
    ) -> Result<Self> {
        let step = service.find_step(service_step).ok_or_else(|| Error::StepNotAccessible {
            pipeline: service.name().to_string(),
            step: service_step.to_string(),
        })?;
        let output = result.find_step(result_output).ok_or_else(|| Error::StepNotAccessible {
            pipeline: result.name().to_string(),
            step: result_output.to_string(),
        })?;
        let input = result
            .row_input()
            .ok_or_else(|| Error::Pipeline(format!("pipeline '{}' has no row input", result.name())))?;

        let state = Arc::new(BridgeState {
            service: Arc::downgrade(service),
            abandoned: AtomicBool::new(false),
            cutoff_hit: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            failure: Mutex::new(None),
        });

        {
            let state = Arc::clone(&state);
            let input = input.clone();
            let result = Arc::downgrade(result);
            step.add_row_listener(Box::new(move |row: &Row| {
                hand_off(&state, &input, &result, row, options);
            }));
        }
        {
            let state = Arc::clone(&state);
            step.add_completion_listener(Box::new(move |outcome: &StepOutcome| {
                if let StepOutcome::Failed(message) = outcome {
                    *state.failure.lock() = Some(message.clone());
                }
                input.signal_no_more_rows();
            }));
        }
        {
            let state = Arc::clone(&state);
            output.add_completion_listener(Box::new(move |_: &StepOutcome| {
                state.abandoned.store(true, Ordering::Release);
                state.stop_service();
            }));
        }

        Ok(Self { state })
    }

    /// Stops further hand-offs and the service pipeline.
    pub fn abandon(&self) {
        self.state.abandon();
    }

    /// Returns whether the row cutoff truncated the service output.
    #[must_use]
    pub fn cutoff_hit(&self) -> bool {
        self.state.cutoff_hit.load(Ordering::Acquire)
    }

    /// Returns the number of rows handed over.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::Acquire)
    }

    /// Returns the service failure, if the service step failed.
    #[must_use]
    pub fn service_failure(&self) -> Option<String> {
        self.state.failure.lock().clone()
    }
}

fn hand_off(
    state: &BridgeState,
    input: &RowInput,
    result: &Weak<dyn Pipeline>,
    row: &Row,
    options: BridgeOptions,
) {
    if state.abandoned.load(Ordering::Acquire) {
        return;
    }
    if options.row_limit > 0 && state.delivered.load(Ordering::Acquire) >= options.row_limit {
        if !state.cutoff_hit.swap(true, Ordering::AcqRel) {
            tracing::info!(row_limit = options.row_limit, "row limit reached, cutting off service");
            state.stop_service();
            input.signal_no_more_rows();
        }
        return;
    }

    loop {
        if input.put_row_with_timeout(row.clone(), options.offer_timeout) {
            state.delivered.fetch_add(1, Ordering::AcqRel);
            return;
        }
        let result_running = result.upgrade().is_some_and(|p| p.is_running());
        if !result_running || input.is_closed() || state.abandoned.load(Ordering::Acquire) {
            tracing::debug!(
                delivered = state.delivered.load(Ordering::Acquire),
                "result pipeline gone, abandoning hand-off"
            );
            state.abandon();
            return;
        }
        tracing::trace!("result input full, retrying");
    }
}
