// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client configuration, resolved once at startup.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PartyPrintError, Result};
use crate::types::{BackendKind, OutputFormat, PrintFormat};

/// Spooler options understood by the Canon Selphy CUPS driver for 4x6 dye-sub
/// prints.
pub const DEFAULT_LP_OPTIONS: [&str; 3] = ["media=Postcard", "ColorModel=RGB", "print-quality=5"];

/// Settings for one process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the job server (`/next-job` is appended).
    pub server_base_url: String,
    /// Prefix the job's file name is appended to for downloading.
    /// Defaults to `{server_base_url}/files/`.
    pub download_base_url: Option<String>,
    /// Sleep between polling cycles.
    pub poll_interval: Duration,
    /// Upper bound for the backoff after repeated transient failures. A
    /// value below `poll_interval` is treated as `poll_interval`.
    pub max_backoff: Duration,
    /// Timeout for the `next-job` request and the startup probe.
    pub request_timeout: Duration,
    /// Timeout for downloading a photo.
    pub download_timeout: Duration,
    /// Timeout for one spooler command or IPP request.
    pub printer_timeout: Duration,
    /// Explicit print target. When absent, see `use_system_default`.
    pub target_printer_name: Option<String>,
    /// Fall back to the spooler's default printer when no target is given.
    pub use_system_default: bool,
    /// Run the whole pipeline but never submit to the backend.
    pub dry_run: bool,
    pub backend: BackendKind,
    /// Printer URI for the IPP backend.
    pub ipp_uri: Option<String>,
    /// `-o` options passed to `lp`.
    pub lp_options: Vec<String>,
    pub format: PrintFormat,
    /// Ledger, audit database and scratch files live here.
    pub data_dir: PathBuf,
    pub audit_enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_base_url: "https://party.emits.ai".into(),
            download_base_url: None,
            poll_interval: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(30),
            printer_timeout: Duration::from_secs(30),
            target_printer_name: None,
            use_system_default: false,
            dry_run: false,
            backend: BackendKind::Cups,
            ipp_uri: None,
            lp_options: DEFAULT_LP_OPTIONS.iter().map(|s| s.to_string()).collect(),
            format: PrintFormat::postcard_4x6(),
            data_dir: PathBuf::from("/tmp/partyprint"),
            audit_enabled: true,
        }
    }
}

impl ClientConfig {
    /// URL polled for the next pending job.
    pub fn next_job_url(&self) -> String {
        format!("{}/next-job", self.server_base_url.trim_end_matches('/'))
    }

    /// Download location for an uploaded file name.
    pub fn source_uri_for(&self, filename: &str) -> String {
        match &self.download_base_url {
            Some(base) if base.ends_with('/') => format!("{base}{filename}"),
            Some(base) => format!("{base}/{filename}"),
            None => format!(
                "{}/files/{filename}",
                self.server_base_url.trim_end_matches('/')
            ),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("printed.log")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.data_dir.join("audit.db")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.data_dir.join("scratch")
    }

    /// Reject settings the poll loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        let base = self.server_base_url.trim();
        if base.is_empty() {
            return Err(PartyPrintError::Config("server base URL is empty".into()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(PartyPrintError::Config(format!(
                "server base URL '{base}' must start with http:// or https://"
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(PartyPrintError::Config("poll interval must be positive".into()));
        }
        if self.request_timeout.is_zero() || self.download_timeout.is_zero() {
            return Err(PartyPrintError::Config("network timeouts must be positive".into()));
        }
        if self.printer_timeout.is_zero() {
            return Err(PartyPrintError::Config("printer timeout must be positive".into()));
        }
        if self.format.width_px == 0 || self.format.height_px == 0 {
            return Err(PartyPrintError::Config(format!(
                "target raster {}x{} has a zero dimension",
                self.format.width_px, self.format.height_px
            )));
        }
        if let OutputFormat::Jpeg { quality } = self.format.output
            && !(1..=100).contains(&quality)
        {
            return Err(PartyPrintError::Config(format!(
                "JPEG quality {quality} outside 1..=100"
            )));
        }
        if self.backend == BackendKind::Ipp && self.ipp_uri.is_none() {
            return Err(PartyPrintError::Config(
                "the ipp backend needs a printer URI".into(),
            ));
        }
        Ok(())
    }
}
