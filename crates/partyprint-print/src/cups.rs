// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CUPS backend — drives the local spooler through `lpstat` and `lp`.
//
// Printer enumeration parses `lpstat -p -d`; submission runs
// `lp -d <printer> -o <option>... <file>` and treats exit status 0 as
// acceptance into the queue.

use std::ffi::OsString;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use partyprint_core::config::DEFAULT_LP_OPTIONS;
use partyprint_core::error::{PartyPrintError, Result};
use partyprint_core::types::PrinterList;

use crate::backend::{PrintBackend, PrintDocument, SubmissionReceipt};

/// Timeout for a single `lp`/`lpstat` invocation.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Print backend for the local CUPS spooler.
#[derive(Debug, Clone)]
pub struct CupsBackend {
    /// `-o` options passed to every `lp` call.
    options: Vec<String>,
    timeout: Duration,
}

impl Default for CupsBackend {
    fn default() -> Self {
        Self::new(DEFAULT_LP_OPTIONS.iter().map(|s| s.to_string()).collect())
    }
}

impl CupsBackend {
    pub fn new(options: Vec<String>) -> Self {
        Self {
            options,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a spooler command with the C locale so its output is parseable.
    async fn run(&self, program: &str, args: &[OsString]) -> Result<Output> {
        let mut command = Command::new(program);
        command.args(args).env("LC_ALL", "C").kill_on_drop(true);

        debug!(program, ?args, "running spooler command");
        tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                PartyPrintError::BackendUnavailable(format!(
                    "{program} timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| PartyPrintError::BackendUnavailable(format!("{program}: {e}")))
    }
}

#[async_trait]
impl PrintBackend for CupsBackend {
    fn name(&self) -> &'static str {
        "cups"
    }

    #[instrument(skip(self))]
    async fn list_printers(&self) -> Result<PrinterList> {
        let output = self.run("lpstat", &["-p".into(), "-d".into()]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let list = parse_lpstat(&stdout);

        // lpstat exits non-zero when no destinations exist at all; only a
        // failure without any usable output means the spooler is down.
        if !output.status.success() && list.is_empty() {
            if stderr.contains("No destinations added") {
                warn!("spooler has no printers configured");
                return Ok(list);
            }
            return Err(PartyPrintError::BackendUnavailable(format!(
                "lpstat failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        info!(printers = %list, "spooler printers enumerated");
        Ok(list)
    }

    #[instrument(skip(self, document), fields(job_id = %document.job_id, path = %document.path.display()))]
    async fn submit(&self, printer: &str, document: PrintDocument<'_>) -> Result<SubmissionReceipt> {
        let args = lp_args(printer, &self.options, document.path);
        let output = self.run("lp", &args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PartyPrintError::Dispatch(format!(
                "lp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reference = parse_request_id(&stdout);
        info!(printer, reference = reference.as_deref().unwrap_or("-"), "lp accepted job");
        Ok(SubmissionReceipt { reference })
    }
}

/// Arguments for `lp`: destination, options, then the file.
pub fn lp_args(printer: &str, options: &[String], path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-d".into(), printer.into()];
    for option in options {
        args.push("-o".into());
        args.push(option.into());
    }
    args.push(path.as_os_str().to_owned());
    args
}

/// Parse `lpstat -p -d` output.
///
/// ```text
/// printer Canon_CP1500 is idle.  enabled since Sat Oct 18 10:02:11 2026
/// printer Office disabled since Fri Oct 17 09:00:00 2026 -
///         Paused
/// system default destination: Canon_CP1500
/// ```
pub fn parse_lpstat(output: &str) -> PrinterList {
    let mut list = PrinterList::default();
    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("printer ") {
            if let Some(name) = rest.split_whitespace().next()
                && !list.contains(name)
            {
                list.printers.push(name.to_owned());
            }
        } else if let Some(rest) = line.strip_prefix("system default destination:") {
            let name = rest.trim();
            if !name.is_empty() {
                list.default = Some(name.to_owned());
            }
        }
    }
    list
}

/// Extract the spooler job reference from `request id is X (1 file(s))`.
pub fn parse_request_id(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("request id is "))
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_owned)
}
