// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job feed — the remote job server as seen by the poller.
//
// `GET {server}/next-job` answers `{"id": null, "filename": null}` when the
// queue is empty and otherwise hands out the oldest pending job, marking it
// done on the server at the same moment. The photo is then fetched from
// `{download_base}{filename}`.

use async_trait::async_trait;
use chrono::Utc;
use partyprint_core::error::{PartyPrintError, Result};
use partyprint_core::types::{Job, JobId};
use partyprint_core::ClientConfig;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

/// Source of print jobs.
#[async_trait]
pub trait JobFeed: Send + Sync {
    /// Ask for the next pending job. `Ok(None)` means the queue is empty.
    async fn next_job(&self) -> Result<Option<Job>>;

    /// Download the raw photo for `job`.
    async fn fetch_payload(&self, job: &Job) -> Result<Vec<u8>>;
}

/// Job feed over HTTP(S).
pub struct HttpJobFeed {
    client: reqwest::Client,
    server_base_url: String,
    next_job_url: String,
    /// `source_uri = download_prefix + filename`
    download_prefix: String,
    timeouts: FeedTimeouts,
}

#[derive(Debug, Clone, Copy)]
struct FeedTimeouts {
    request: std::time::Duration,
    download: std::time::Duration,
}

impl HttpJobFeed {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("partyprint/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| PartyPrintError::Config(format!("HTTP client error: {e}")))?;

        Ok(Self {
            client,
            server_base_url: config.server_base_url.trim_end_matches('/').to_owned(),
            next_job_url: config.next_job_url(),
            download_prefix: config.source_uri_for(""),
            timeouts: FeedTimeouts {
                request: config.request_timeout,
                download: config.download_timeout,
            },
        })
    }

    /// Check that the job server answers at all.
    ///
    /// Requests the base URL rather than `next-job`, which would consume a
    /// job. Any HTTP status counts as reachable.
    #[instrument(skip(self), fields(url = %self.server_base_url))]
    pub async fn probe(&self) -> Result<u16> {
        let url = format!("{}/", self.server_base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeouts.request)
            .send()
            .await
            .map_err(|e| PartyPrintError::JobFeed(format!("job server {url} unreachable: {e}")))?;

        let status = response.status().as_u16();
        info!(status, "job server reachable");
        Ok(status)
    }
}

#[async_trait]
impl JobFeed for HttpJobFeed {
    async fn next_job(&self) -> Result<Option<Job>> {
        let response = self
            .client
            .get(&self.next_job_url)
            .timeout(self.timeouts.request)
            .send()
            .await
            .map_err(|e| PartyPrintError::JobFeed(format!("GET {}: {e}", self.next_job_url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PartyPrintError::JobFeed(format!(
                "GET {} returned HTTP {status}",
                self.next_job_url
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PartyPrintError::JobFeed(format!("read next-job body: {e}")))?;

        let job = parse_descriptor(&body, &self.download_prefix)?;
        if let Some(job) = &job {
            info!(job_id = %job.id, filename = %job.filename, "job received");
        } else {
            debug!("no pending jobs");
        }
        Ok(job)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, url = %job.source_uri))]
    async fn fetch_payload(&self, job: &Job) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&job.source_uri)
            .timeout(self.timeouts.download)
            .send()
            .await
            .map_err(|e| PartyPrintError::Download(format!("GET {}: {e}", job.source_uri)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PartyPrintError::Download(format!(
                "GET {} returned HTTP {status}",
                job.source_uri
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PartyPrintError::Download(format!("read {}: {e}", job.source_uri)))?;

        if bytes.is_empty() {
            return Err(PartyPrintError::EmptyPayload(job.id.to_string()));
        }

        info!(bytes = bytes.len(), "photo downloaded");
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct JobDescriptor {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    filename: Option<String>,
}

/// Parse a `next-job` response body.
///
/// Integer and string ids map to the same `JobId`, so `42` and `"42"` are
/// one job.
pub fn parse_descriptor(body: &[u8], download_prefix: &str) -> Result<Option<Job>> {
    let descriptor: JobDescriptor = serde_json::from_slice(body)
        .map_err(|e| PartyPrintError::MalformedJob(format!("next-job body is not a job descriptor: {e}")))?;

    let id = match descriptor.id {
        Value::Null => return Ok(None),
        Value::Number(n) => n.to_string(),
        Value::String(s) if !s.trim().is_empty() => s.trim().to_owned(),
        other => {
            return Err(PartyPrintError::MalformedJob(format!(
                "unusable job id {other}"
            )));
        }
    };

    let filename = descriptor
        .filename
        .map(|f| f.trim().to_owned())
        .filter(|f| !f.is_empty())
        .ok_or_else(|| PartyPrintError::MalformedJob(format!("job {id} has no filename")))?;

    Ok(Some(Job {
        id: JobId::new(id),
        source_uri: format!("{download_prefix}{filename}"),
        filename,
        received_at: Utc::now(),
    }))
}
