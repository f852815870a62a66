// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the PartyPrint kiosk client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned identifier of a print job.
///
/// Opaque to the client: two jobs with the same id are the same logical
/// print request, whatever else differs between them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A version of the id that is safe to embed in a file name.
    ///
    /// Anything outside `[A-Za-z0-9._-]` becomes `_`. An empty id maps to
    /// `"job"`.
    pub fn file_stem(&self) -> String {
        let stem: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if stem.is_empty() || stem.chars().all(|c| c == '.') {
            "job".into()
        } else {
            stem
        }
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// A pending print request observed on the job server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// File name of the uploaded photo on the server.
    pub filename: String,
    /// Where the raw image bytes can be downloaded from.
    pub source_uri: String,
    /// When this client received the descriptor.
    pub received_at: DateTime<Utc>,
}

/// One line of the dedup ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub job_id: JobId,
    pub dispatched_at: DateTime<Utc>,
}

/// Classification of errors for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Network blip, timeout, spooler refusal — abort the cycle, retry on
    /// the next poll.
    Transient,
    /// Bad job data (undecodable image, malformed descriptor) — skip the job
    /// and warn.
    Data,
    /// Broken configuration or storage — stop the process with a non-zero
    /// status.
    Fatal,
}

/// Print targets known to the spooler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterList {
    pub printers: Vec<String>,
    /// System default destination, if the spooler reports one.
    pub default: Option<String>,
}

impl PrinterList {
    pub fn contains(&self, name: &str) -> bool {
        self.printers.iter().any(|p| p == name)
    }

    pub fn is_empty(&self) -> bool {
        self.printers.is_empty()
    }
}

impl std::fmt::Display for PrinterList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.printers.is_empty() {
            return f.write_str("(none)");
        }
        for (i, name) in self.printers.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
            if self.default.as_deref() == Some(name.as_str()) {
                f.write_str(" (system default)")?;
            }
        }
        Ok(())
    }
}

/// Encoding of the print-ready file handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Baseline JPEG with 4:4:4 chroma and no metadata.
    Jpeg { quality: u8 },
    Png,
}

impl OutputFormat {
    /// MIME type string for IPP `document-format`.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpg",
            Self::Png => "png",
        }
    }
}

/// The fixed raster every photo is normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintFormat {
    pub width_px: u32,
    pub height_px: u32,
    /// Letterbox colour (RGB).
    pub background: [u8; 3],
    pub output: OutputFormat,
}

impl PrintFormat {
    /// 6x4 inch postcard at 300 DPI, landscape, white bars, JPEG q95.
    pub fn postcard_4x6() -> Self {
        Self {
            width_px: 1800,
            height_px: 1200,
            background: [255, 255, 255],
            output: OutputFormat::Jpeg { quality: 95 },
        }
    }
}

impl Default for PrintFormat {
    fn default() -> Self {
        Self::postcard_4x6()
    }
}

/// Which print backend receives normalized images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Local CUPS spooler through `lp` / `lpstat`.
    Cups,
    /// Direct IPP Print-Job to a printer URI.
    Ipp,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cups" | "lp" => Ok(Self::Cups),
            "ipp" => Ok(Self::Ipp),
            other => Err(format!("unknown backend '{other}' (expected cups or ipp)")),
        }
    }
}
