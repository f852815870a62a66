// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PartyPrint Print — everything between a normalized photo and the spooler:
// the dedup ledger, the dispatcher and its CUPS/IPP backends, print target
// resolution, the retry policy, and the audit trail.

pub mod audit;
pub mod backend;
pub mod cups;
pub mod dispatcher;
pub mod integrity;
pub mod ipp_client;
pub mod ledger;
pub mod printers;
pub mod retry;
pub mod scratch;

pub use audit::{AuditAction, AuditLog};
pub use backend::{PrintBackend, PrintDocument, SubmissionReceipt};
pub use cups::CupsBackend;
pub use dispatcher::{DispatchReceipt, Dispatcher};
pub use ipp_client::IppBackend;
pub use ledger::{DispatchLedger, FileLedger};
pub use printers::{TargetRequest, resolve_target, select_printer};
pub use retry::{Backoff, classify_error};
pub use scratch::ScratchDir;
