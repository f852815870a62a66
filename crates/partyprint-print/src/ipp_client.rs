// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP backend — submits print-ready photos straight to a printer URI.
//
// Uses the `ipp` crate's async API for two standard IPP operations:
//   - Get-Printer-Attributes  (RFC 8011 §4.2.5) to identify the target
//   - Print-Job               (RFC 8011 §4.2.1) to submit
//
// Works against CUPS (`ipp://localhost:631/printers/<name>`) as well as
// driverless network printers.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use ipp::prelude::*;
use tracing::{debug, error, info, instrument, warn};

use partyprint_core::error::{PartyPrintError, Result};
use partyprint_core::types::PrinterList;

use crate::backend::{PrintBackend, PrintDocument, SubmissionReceipt};

/// Timeout for a single IPP request.
const DEFAULT_IPP_TIMEOUT: Duration = Duration::from_secs(60);

/// Print backend bound to a single IPP printer URI.
pub struct IppBackend {
    /// The target printer URI (ipp:// or ipps://).
    uri: Uri,
    timeout: Duration,
}

impl IppBackend {
    /// Create a backend targeting the given printer URI.
    pub fn new(uri: &str) -> Result<Self> {
        let parsed: Uri = uri
            .parse()
            .map_err(|e| PartyPrintError::Config(format!("invalid IPP URI '{uri}': {e}")))?;
        Ok(Self {
            uri: parsed,
            timeout: DEFAULT_IPP_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Return the printer URI this backend is targeting.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Await an IPP request with the backend timeout applied.
    async fn bounded<T, E: std::fmt::Display>(
        &self,
        what: &str,
        request: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                PartyPrintError::BackendUnavailable(format!(
                    "{what} to {} timed out after {:?}",
                    self.uri,
                    self.timeout
                ))
            })?
            .map_err(|e| PartyPrintError::BackendUnavailable(format!("{what}: {e}")))
    }
}

#[async_trait]
impl PrintBackend for IppBackend {
    fn name(&self) -> &'static str {
        "ipp"
    }

    /// The single printer behind the URI, named by its `printer-name`.
    #[instrument(skip(self), fields(uri = %self.uri))]
    async fn list_printers(&self) -> Result<PrinterList> {
        let operation = IppOperationBuilder::get_printer_attributes(self.uri.clone()).build();

        let client = AsyncIppClient::new(self.uri.clone());

        debug!("sending Get-Printer-Attributes");
        let response = self
            .bounded("Get-Printer-Attributes", client.send(operation))
            .await?;

        if !response.header().status_code().is_success() {
            let code = response.header().status_code();
            error!(status = ?code, "Get-Printer-Attributes failed");
            return Err(PartyPrintError::BackendUnavailable(format!(
                "Get-Printer-Attributes returned status {code:?}"
            )));
        }

        let name = printer_name(response.attributes()).unwrap_or_else(|| {
            warn!("printer did not report printer-name, using its URI");
            self.uri.to_string()
        });
        Ok(PrinterList {
            printers: vec![name.clone()],
            default: Some(name),
        })
    }

    #[instrument(skip(self, document), fields(uri = %self.uri, job_id = %document.job_id))]
    async fn submit(&self, printer: &str, document: PrintDocument<'_>) -> Result<SubmissionReceipt> {
        let payload = IppPayload::new(Cursor::new(document.bytes.to_vec()));
        let job_name = format!("partyprint-{}", document.job_id);

        let operation = IppOperationBuilder::print_job(self.uri.clone(), payload)
            .job_title(&job_name)
            .document_format(document.mime_type)
            .build();

        let client = AsyncIppClient::new(self.uri.clone());

        info!(printer, mime = document.mime_type, "sending Print-Job");
        let response = self
            .bounded("Print-Job", client.send(operation))
            .await?;

        if !response.header().status_code().is_success() {
            let code = response.header().status_code();
            error!(status = ?code, "Print-Job failed");
            return Err(PartyPrintError::Dispatch(format!(
                "Print-Job returned status {code:?}"
            )));
        }

        let remote_id = extract_job_id(response.attributes());
        info!(remote_id, "print job accepted by printer");
        Ok(SubmissionReceipt {
            reference: remote_id.map(|id| id.to_string()),
        })
    }
}

/// `printer-name` from the Printer Attributes group.
fn printer_name(attrs: &IppAttributes) -> Option<String> {
    for group in attrs.groups_of(DelimiterTag::PrinterAttributes) {
        if let Some(attr) = group.attributes().get("printer-name") {
            let name = format!("{}", attr.value());
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

/// Extract the `job-id` integer from a response's Job Attributes group.
fn extract_job_id(attrs: &IppAttributes) -> Option<i32> {
    for group in attrs.groups_of(DelimiterTag::JobAttributes) {
        if let Some(attr) = group.attributes().get("job-id")
            && let IppValue::Integer(id) = attr.value()
        {
            return Some(*id);
        }
    }
    None
}
