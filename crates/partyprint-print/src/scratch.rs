// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scratch storage for the job currently in flight.
//
// Files are keyed by the sanitized job id and overwritten freely; nothing
// here is ever read back to decide whether a job was printed.

use std::path::PathBuf;

use partyprint_core::error::Result;
use partyprint_core::types::JobId;
use partyprint_document::NormalizedImage;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Use `root` for scratch files, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// `<root>/<job>.src`
    pub fn source_path(&self, job_id: &JobId) -> PathBuf {
        self.root.join(format!("{}.src", job_id.file_stem()))
    }

    /// `<root>/print_<job>.<ext>`
    pub fn print_path(&self, job_id: &JobId, extension: &str) -> PathBuf {
        self.root
            .join(format!("print_{}.{extension}", job_id.file_stem()))
    }

    /// Keep the downloaded payload for debugging.
    pub async fn save_source(&self, job_id: &JobId, raw: &[u8]) -> Result<PathBuf> {
        let path = self.source_path(job_id);
        tokio::fs::write(&path, raw).await?;
        debug!(path = %path.display(), bytes = raw.len(), "raw payload saved");
        Ok(path)
    }

    /// Write the print-ready file the backend submits.
    pub async fn save_print_ready(&self, job_id: &JobId, image: &NormalizedImage) -> Result<PathBuf> {
        let path = self.print_path(job_id, image.extension());
        tokio::fs::write(&path, image.encoded()).await?;
        debug!(path = %path.display(), bytes = image.encoded().len(), "print-ready file saved");
        Ok(path)
    }
}
