// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for PartyPrint.

use thiserror::Error;

use crate::types::PrinterList;

/// Top-level error type for all PartyPrint operations.
#[derive(Debug, Error)]
pub enum PartyPrintError {
    // -- Job server --
    #[error("job server request failed: {0}")]
    JobFeed(String),

    #[error("image download failed: {0}")]
    Download(String),

    #[error("malformed job descriptor: {0}")]
    MalformedJob(String),

    #[error("downloaded payload for job {0} is empty")]
    EmptyPayload(String),

    // -- Image --
    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Print backend --
    #[error("print submission rejected: {0}")]
    Dispatch(String),

    #[error("print backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("printer '{name}' not found; available: {available}")]
    PrinterNotFound { name: String, available: PrinterList },

    #[error("no printer selected; set PRINTER_NAME to one of: {available}")]
    NoPrinterSelected { available: PrinterList },

    #[error("no printers configured in the spooler")]
    NoPrintersAvailable,

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("audit database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PartyPrintError>;
