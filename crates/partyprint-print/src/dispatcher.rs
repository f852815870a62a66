// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print dispatcher — writes the print-ready file to scratch storage and
// hands it to the backend.
//
// Success means the spooler accepted the job into its queue. Whether paper
// actually came out is only visible in the spooler's own logs.

use std::path::PathBuf;
use std::sync::Arc;

use partyprint_core::error::Result;
use partyprint_core::types::JobId;
use partyprint_document::NormalizedImage;
use tracing::{info, instrument};

use crate::backend::{PrintBackend, PrintDocument};
use crate::scratch::ScratchDir;

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// Print-ready file that was (or in a dry run, would have been) submitted.
    pub path: PathBuf,
    /// Spooler job reference, if the backend reported one.
    pub reference: Option<String>,
    pub dry_run: bool,
}

pub struct Dispatcher {
    backend: Arc<dyn PrintBackend>,
    scratch: ScratchDir,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn PrintBackend>, scratch: ScratchDir) -> Self {
        Self { backend, scratch }
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    /// Submit `image` to `printer`.
    ///
    /// In a dry run every step except the backend call is performed and the
    /// dispatch reports success. Errors leave no trace outside scratch
    /// storage, so the caller can retry the job.
    #[instrument(skip(self, image), fields(%job_id, printer, dry_run, backend = self.backend.name()))]
    pub async fn dispatch(
        &self,
        job_id: &JobId,
        image: &NormalizedImage,
        printer: &str,
        dry_run: bool,
    ) -> Result<DispatchReceipt> {
        let path = self.scratch.save_print_ready(job_id, image).await?;

        if dry_run {
            info!(path = %path.display(), "dry run: skipping print submission");
            return Ok(DispatchReceipt {
                path,
                reference: None,
                dry_run: true,
            });
        }

        let document = PrintDocument {
            job_id,
            path: &path,
            bytes: image.encoded(),
            mime_type: image.mime_type(),
        };
        let receipt = self.backend.submit(printer, document).await?;

        info!(
            path = %path.display(),
            reference = receipt.reference.as_deref().unwrap_or("-"),
            "print job submitted"
        );
        Ok(DispatchReceipt {
            path,
            reference: receipt.reference,
            dry_run: false,
        })
    }
}
