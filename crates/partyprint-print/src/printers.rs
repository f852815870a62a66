// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print target resolution, done once at startup.
//
// An explicit printer name wins. Without one the operator has to opt in to
// the spooler's default; otherwise startup fails with the list of printers
// the backend can see so the operator can pick one. Dry runs never fail
// here because nothing is submitted.

use partyprint_core::error::{PartyPrintError, Result};
use partyprint_core::types::PrinterList;
use tracing::{info, instrument, warn};

use crate::backend::PrintBackend;

/// Placeholder target used by a dry run with nothing better to go on.
pub const DRY_RUN_PRINTER: &str = "dry-run";

/// How the operator asked for a print target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetRequest<'a> {
    pub requested: Option<&'a str>,
    pub use_system_default: bool,
    pub dry_run: bool,
}

/// Pick the print target from an enumeration result.
pub fn resolve_target(request: &TargetRequest<'_>, available: Result<PrinterList>) -> Result<String> {
    let requested = request.requested.map(str::trim).filter(|s| !s.is_empty());

    if request.dry_run {
        return Ok(resolve_dry_run(request, requested, available));
    }

    let available = available?;
    if available.is_empty() {
        return Err(PartyPrintError::NoPrintersAvailable);
    }

    match requested {
        Some(name) if available.contains(name) => Ok(name.to_owned()),
        Some(name) => Err(PartyPrintError::PrinterNotFound {
            name: name.to_owned(),
            available,
        }),
        None if request.use_system_default => {
            let chosen = available
                .default
                .clone()
                .filter(|d| available.contains(d))
                .or_else(|| available.printers.first().cloned())
                .ok_or(PartyPrintError::NoPrintersAvailable)?;
            info!(printer = %chosen, "using system default printer");
            Ok(chosen)
        }
        None => Err(PartyPrintError::NoPrinterSelected { available }),
    }
}

fn resolve_dry_run(
    request: &TargetRequest<'_>,
    requested: Option<&str>,
    available: Result<PrinterList>,
) -> String {
    let available = match available {
        Ok(list) => list,
        Err(e) => {
            warn!(error = %e, "could not enumerate printers (dry run, continuing)");
            PrinterList::default()
        }
    };

    if let Some(name) = requested {
        if !available.contains(name) {
            warn!(printer = name, printers = %available, "printer not found (dry run, continuing)");
        }
        return name.to_owned();
    }

    let fallback = if request.use_system_default {
        available
            .default
            .clone()
            .or_else(|| available.printers.first().cloned())
    } else {
        None
    };
    fallback.unwrap_or_else(|| {
        warn!(printers = %available, "no printer selected (dry run, using placeholder)");
        DRY_RUN_PRINTER.to_owned()
    })
}

/// Enumerate the backend's printers and resolve the target.
#[instrument(skip_all, fields(backend = backend.name(), requested = request.requested, dry_run = request.dry_run))]
pub async fn select_printer(backend: &dyn PrintBackend, request: &TargetRequest<'_>) -> Result<String> {
    let available = backend.list_printers().await;
    let chosen = resolve_target(request, available)?;
    info!(printer = %chosen, "print target selected");
    Ok(chosen)
}
