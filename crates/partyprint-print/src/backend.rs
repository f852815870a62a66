// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print backend abstraction.
//
// A backend knows how to enumerate print targets and how to hand one
// print-ready file to the spooler. It reports acceptance into the queue, not
// physical completion.

use std::path::Path;

use async_trait::async_trait;
use partyprint_core::error::Result;
use partyprint_core::types::{JobId, PrinterList};

/// A print-ready file, already written to scratch storage.
#[derive(Debug, Clone, Copy)]
pub struct PrintDocument<'a> {
    pub job_id: &'a JobId,
    /// Scratch file holding `bytes`, for backends that submit by path.
    pub path: &'a Path,
    pub bytes: &'a [u8],
    pub mime_type: &'static str,
}

/// What the backend said when it accepted a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Spooler job reference (e.g. `Canon_CP1500-17`), when reported.
    pub reference: Option<String>,
}

#[async_trait]
pub trait PrintBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Enumerate the print targets the backend can reach.
    async fn list_printers(&self) -> Result<PrinterList>;

    /// Submit one document to `printer`. `Ok` means the spooler accepted it.
    async fn submit(&self, printer: &str, document: PrintDocument<'_>) -> Result<SubmissionReceipt>;
}
