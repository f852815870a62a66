// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Failure policy for the poll loop.
//
// Classifies errors into Transient (abort the cycle, poll again), Data (skip
// the job, warn the operator) and Fatal (stop the process). Consecutive
// transient failures stretch the sleep between cycles with capped
// exponential backoff.

use std::time::Duration;

use partyprint_core::error::PartyPrintError;
use partyprint_core::types::ErrorClass;
use tracing::debug;

/// Classify a `PartyPrintError` for the poll loop.
pub fn classify_error(err: &PartyPrintError) -> ErrorClass {
    match err {
        // Transient — network, spooler refusal, scratch disk hiccups
        PartyPrintError::JobFeed(_) => ErrorClass::Transient,
        PartyPrintError::Download(_) => ErrorClass::Transient,
        PartyPrintError::Dispatch(_) => ErrorClass::Transient,
        PartyPrintError::BackendUnavailable(_) => ErrorClass::Transient,
        PartyPrintError::Database(_) => ErrorClass::Transient,

        // Data — this job is bad, the next one may be fine
        PartyPrintError::MalformedJob(_) => ErrorClass::Data,
        PartyPrintError::EmptyPayload(_) => ErrorClass::Data,
        PartyPrintError::ImageError(_) => ErrorClass::Data,
        PartyPrintError::Serialization(_) => ErrorClass::Data,

        // Fatal — the loop must not keep running in this state
        PartyPrintError::PrinterNotFound { .. } => ErrorClass::Fatal,
        PartyPrintError::NoPrinterSelected { .. } => ErrorClass::Fatal,
        PartyPrintError::NoPrintersAvailable => ErrorClass::Fatal,
        PartyPrintError::Config(_) => ErrorClass::Fatal,
        PartyPrintError::Ledger(_) => ErrorClass::Fatal,

        // IO errors depend on the kind
        PartyPrintError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::ReadOnlyFilesystem
            | std::io::ErrorKind::StorageFull => ErrorClass::Fatal,
            _ => ErrorClass::Transient,
        },
    }
}

/// Sleep schedule between polling cycles.
///
/// With no failures the delay is the poll interval. Each consecutive
/// transient failure doubles it, up to `max_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_delay: Duration,
    max_delay: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            failures: 0,
        }
    }

    /// Delay before the next cycle.
    pub fn delay(&self) -> Duration {
        compute_delay(self.failures, self.base_delay, self.max_delay)
    }

    /// Note a transient failure and return the new delay.
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.delay();
        debug!(
            failures = self.failures,
            delay_ms = delay.as_millis() as u64,
            "backing off"
        );
        delay
    }

    /// Back to the plain poll interval.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

/// delay = min(base * 2^failures + jitter, max_delay), or `base` with no
/// failures. Jitter is in [0, base / 4) so kiosks at the same event drift
/// apart after a shared outage.
fn compute_delay(failures: u32, base: Duration, max: Duration) -> Duration {
    if failures == 0 {
        return base;
    }
    let base_ms = base.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << failures.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms / 4, failures));
    let capped_ms = total_ms.min(max.as_millis() as u64);

    Duration::from_millis(capped_ms)
}

/// Spread-out but deterministic value in [0, span).
fn jitter(span_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % span_ms.max(1)
}
