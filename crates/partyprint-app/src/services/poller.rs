// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job poller — the main loop.
//
// One cycle: ask the feed for a job, drop it if the ledger already has it,
// download, normalize, dispatch, and only then record it in the ledger.
// Cycles never overlap; the sleep between them is the poll interval,
// stretched by backoff after consecutive transient failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use partyprint_core::error::{PartyPrintError, Result};
use partyprint_core::types::{ErrorClass, Job, JobId};
use partyprint_document::{ImageNormalizer, NormalizedImage};
use partyprint_print::audit::{AuditAction, AuditLog};
use partyprint_print::dispatcher::{DispatchReceipt, Dispatcher};
use partyprint_print::integrity::hash_bytes;
use partyprint_print::ledger::DispatchLedger;
use partyprint_print::retry::{Backoff, classify_error};
use tracing::{debug, error, info, instrument, warn};

use super::job_feed::JobFeed;

/// How a single cycle ended, when it did not abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The server had nothing pending.
    Idle,
    /// The job was already in the ledger and was dropped unprocessed.
    Duplicate(JobId),
    Dispatched {
        job_id: JobId,
        receipt: DispatchReceipt,
    },
    /// Bad job data. Nothing was recorded.
    Skipped {
        job_id: Option<JobId>,
        reason: String,
    },
}

/// Fixed settings for the loop.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub printer: String,
    pub dry_run: bool,
    pub poll_interval: Duration,
    pub max_backoff: Duration,
}

pub struct Poller<F: JobFeed, L: DispatchLedger> {
    feed: F,
    ledger: L,
    normalizer: Arc<ImageNormalizer>,
    dispatcher: Dispatcher,
    audit: Option<AuditLog>,
    settings: PollSettings,
    backoff: Backoff,
}

impl<F: JobFeed, L: DispatchLedger> Poller<F, L> {
    pub fn new(
        feed: F,
        ledger: L,
        normalizer: ImageNormalizer,
        dispatcher: Dispatcher,
        settings: PollSettings,
    ) -> Self {
        let backoff = Backoff::new(settings.poll_interval, settings.max_backoff);
        Self {
            feed,
            ledger,
            normalizer: Arc::new(normalizer),
            dispatcher,
            audit: None,
            settings,
            backoff,
        }
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn audit(&self) -> Option<&AuditLog> {
        self.audit.as_ref()
    }

    /// Ask the feed for the next pending job.
    pub async fn poll_once(&self) -> Result<Option<Job>> {
        self.feed.next_job().await
    }

    /// Run one cycle.
    ///
    /// Data errors are absorbed into `CycleOutcome::Skipped`; transient and
    /// fatal errors abort the cycle and are returned. An aborted cycle never
    /// leaves a ledger entry behind.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let job = match self.poll_once().await {
            Ok(Some(job)) => job,
            Ok(None) => return Ok(CycleOutcome::Idle),
            Err(e) if classify_error(&e) == ErrorClass::Data => {
                warn!(error = %e, "ignoring malformed job descriptor");
                return Ok(CycleOutcome::Skipped {
                    job_id: None,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let job_id = job.id.clone();
        match self.process(job).await {
            Err(e) if classify_error(&e) == ErrorClass::Data => {
                warn!(%job_id, error = %e, "skipping job with bad data");
                Ok(CycleOutcome::Skipped {
                    job_id: Some(job_id),
                    reason: e.to_string(),
                })
            }
            other => other,
        }
    }

    #[instrument(skip_all, fields(job_id = %job.id))]
    async fn process(&mut self, job: Job) -> Result<CycleOutcome> {
        if self.ledger.contains(&job.id) {
            info!("job already dispatched, skipping");
            self.record_audit(AuditAction::DuplicateSkipped, &job.id, None, true, None);
            return Ok(CycleOutcome::Duplicate(job.id));
        }

        let raw = match self.feed.fetch_payload(&job).await {
            Ok(raw) => raw,
            Err(e) => {
                self.record_audit(AuditAction::DownloadFailed, &job.id, None, false, Some(&e.to_string()));
                return Err(e);
            }
        };
        let hash = hash_bytes(&raw);
        debug!(bytes = raw.len(), sha256 = %hash, "payload received");

        if let Err(e) = self.dispatcher.scratch().save_source(&job.id, &raw).await {
            warn!(error = %e, "could not keep raw payload in scratch");
        }

        let image = match self.normalize(raw).await {
            Ok(image) => image,
            Err(e) => {
                self.record_audit(AuditAction::NormalizeFailed, &job.id, Some(&hash), false, Some(&e.to_string()));
                return Err(e);
            }
        };
        let (source_width, source_height) = image.source_dimensions();
        debug!(source_width, source_height, placement = ?image.placement(), "photo fitted to print raster");

        let receipt = match self
            .dispatcher
            .dispatch(&job.id, &image, &self.settings.printer, self.settings.dry_run)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                self.record_audit(AuditAction::DispatchFailed, &job.id, Some(&hash), false, Some(&e.to_string()));
                return Err(e);
            }
        };

        // Only an accepted submission may reach the ledger.
        self.ledger.record(&job.id)?;

        let details = match (&receipt.reference, receipt.dry_run) {
            (_, true) => Some("dry run".to_owned()),
            (Some(reference), false) => Some(format!("spooler job {reference}")),
            (None, false) => None,
        };
        self.record_audit(AuditAction::Dispatched, &job.id, Some(&hash), true, details.as_deref());

        Ok(CycleOutcome::Dispatched {
            job_id: job.id,
            receipt,
        })
    }

    /// Decode and letterbox off the async runtime.
    async fn normalize(&self, raw: Vec<u8>) -> Result<NormalizedImage> {
        let normalizer = Arc::clone(&self.normalizer);
        tokio::task::spawn_blocking(move || normalizer.normalize(&raw))
            .await
            .map_err(|e| PartyPrintError::ImageError(format!("normalizer task failed: {e}")))?
    }

    /// Best effort: the audit trail never changes a job's outcome.
    fn record_audit(
        &self,
        action: AuditAction,
        job_id: &JobId,
        hash: Option<&str>,
        success: bool,
        details: Option<&str>,
    ) {
        if let Some(log) = &self.audit
            && let Err(e) = log.record(action, job_id, hash, success, details)
        {
            warn!(error = %e, action = action.as_str(), "audit write failed");
        }
    }

    /// Poll until `shutdown` resolves or a fatal error occurs.
    ///
    /// A cycle in progress always finishes before shutdown is honoured.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        info!(
            printer = %self.settings.printer,
            dry_run = self.settings.dry_run,
            interval_s = self.settings.poll_interval.as_secs(),
            "polling started"
        );

        loop {
            match self.run_cycle().await {
                Ok(outcome) => {
                    self.backoff.reset();
                    match &outcome {
                        CycleOutcome::Dispatched { job_id, receipt } => info!(
                            %job_id,
                            path = %receipt.path.display(),
                            dry_run = receipt.dry_run,
                            "job printed"
                        ),
                        CycleOutcome::Idle => debug!("idle"),
                        _ => {}
                    }
                }
                Err(e) => match classify_error(&e) {
                    ErrorClass::Fatal => {
                        error!(error = %e, "fatal error, stopping");
                        return Err(e);
                    }
                    _ => {
                        let delay = self.backoff.record_failure();
                        warn!(
                            error = %e,
                            failures = self.backoff.consecutive_failures(),
                            retry_in_s = delay.as_secs(),
                            "cycle aborted, will retry"
                        );
                    }
                },
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("stop requested, polling stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.backoff.delay()) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use image::{ImageFormat, Rgb, RgbImage};
    use partyprint_core::types::{OutputFormat, PrintFormat, PrinterList};
    use partyprint_print::backend::{PrintBackend, PrintDocument, SubmissionReceipt};
    use partyprint_print::ledger::FileLedger;
    use partyprint_print::scratch::ScratchDir;

    use super::*;

    fn job(id: &str) -> Job {
        Job {
            id: JobId::from(id),
            filename: format!("{id}.png"),
            source_uri: format!("http://party.test/files/{id}.png"),
            received_at: Utc::now(),
        }
    }

    fn photo() -> Vec<u8> {
        let img = RgbImage::from_pixel(80, 60, Rgb([30, 120, 200]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Hands out a scripted sequence of `next-job` answers.
    #[derive(Default)]
    struct ScriptedFeed {
        answers: Mutex<VecDeque<Result<Option<Job>>>>,
        payloads: HashMap<String, Vec<u8>>,
        fetches: AtomicUsize,
        fail_fetches: AtomicUsize,
    }

    impl ScriptedFeed {
        fn offering(jobs: &[&str]) -> Self {
            let feed = Self::default();
            for id in jobs {
                feed.push(job(id));
            }
            feed
        }

        fn push(&self, job: Job) {
            self.answers.lock().unwrap().push_back(Ok(Some(job)));
        }

        fn with_payload(mut self, id: &str, bytes: Vec<u8>) -> Self {
            self.payloads.insert(id.to_owned(), bytes);
            self
        }
    }

    #[async_trait]
    impl JobFeed for ScriptedFeed {
        async fn next_job(&self) -> Result<Option<Job>> {
            self.answers.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }

        async fn fetch_payload(&self, job: &Job) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_fetches
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(PartyPrintError::Download("connection reset".into()));
            }
            Ok(self
                .payloads
                .get(job.id.as_str())
                .cloned()
                .unwrap_or_else(photo))
        }
    }

    /// Counts accepted submissions; optionally rejects everything.
    #[derive(Default)]
    struct CountingBackend {
        accepted: AtomicUsize,
        calls: AtomicUsize,
        broken: bool,
    }

    impl CountingBackend {
        fn broken() -> Self {
            Self {
                broken: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl PrintBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn list_printers(&self) -> Result<PrinterList> {
            Ok(PrinterList::default())
        }

        async fn submit(&self, _printer: &str, _document: PrintDocument<'_>) -> Result<SubmissionReceipt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(PartyPrintError::Dispatch("lp: printer not connected".into()));
            }
            let n = self.accepted.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SubmissionReceipt {
                reference: Some(format!("Selphy-{n}")),
            })
        }
    }

    /// A ledger whose next write dies as if the process crashed mid-record.
    struct CrashingLedger {
        inner: FileLedger,
        crash_next_record: bool,
    }

    impl DispatchLedger for CrashingLedger {
        fn contains(&self, job_id: &JobId) -> bool {
            self.inner.contains(job_id)
        }

        fn record(&mut self, job_id: &JobId) -> Result<bool> {
            if std::mem::take(&mut self.crash_next_record) {
                return Err(PartyPrintError::Ledger("simulated crash".into()));
            }
            self.inner.record(job_id)
        }
    }

    fn settings(dry_run: bool) -> PollSettings {
        PollSettings {
            printer: "Selphy".into(),
            dry_run,
            poll_interval: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
        }
    }

    fn poller<F: JobFeed, L: DispatchLedger>(
        feed: F,
        ledger: L,
        backend: Arc<CountingBackend>,
        scratch: &Path,
        dry_run: bool,
    ) -> Poller<F, L> {
        let normalizer = ImageNormalizer::new(PrintFormat {
            width_px: 90,
            height_px: 60,
            background: [255, 255, 255],
            output: OutputFormat::Jpeg { quality: 90 },
        });
        let dispatcher = Dispatcher::new(backend, ScratchDir::new(scratch).unwrap());
        Poller::new(feed, ledger, normalizer, dispatcher, settings(dry_run))
            .with_audit(AuditLog::open_in_memory().unwrap())
    }

    fn ledger_lines(path: &Path) -> usize {
        std::fs::read_to_string(path).unwrap().lines().count()
    }

    #[tokio::test]
    async fn idle_feed_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("printed.log")).unwrap();
        let backend = Arc::new(CountingBackend::default());
        let mut p = poller(ScriptedFeed::default(), ledger, backend, dir.path(), false);

        assert_eq!(p.run_cycle().await.unwrap(), CycleOutcome::Idle);
    }

    #[tokio::test]
    async fn new_job_is_dispatched_then_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("printed.log")).unwrap();
        let backend = Arc::new(CountingBackend::default());
        let mut p = poller(ScriptedFeed::offering(&["42"]), ledger, backend.clone(), dir.path(), false);

        match p.run_cycle().await.unwrap() {
            CycleOutcome::Dispatched { job_id, receipt } => {
                assert_eq!(job_id, JobId::from("42"));
                assert_eq!(receipt.reference.as_deref(), Some("Selphy-1"));
                assert!(receipt.path.ends_with("print_42.jpg"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(p.ledger().contains(&JobId::from("42")));
        assert_eq!(backend.accepted.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("42.src").exists());

        let trail = p.audit().unwrap().entries_for_job(&JobId::from("42")).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "dispatched");
        assert_eq!(trail[0].document_hash.as_deref(), Some(hash_bytes(&photo()).as_str()));
    }

    #[tokio::test]
    async fn redelivered_job_never_reaches_the_normalizer() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("printed.log")).unwrap();
        let backend = Arc::new(CountingBackend::default());
        let mut p = poller(ScriptedFeed::offering(&["7", "7"]), ledger, backend.clone(), dir.path(), false);

        assert!(matches!(p.run_cycle().await.unwrap(), CycleOutcome::Dispatched { .. }));
        assert_eq!(
            p.run_cycle().await.unwrap(),
            CycleOutcome::Duplicate(JobId::from("7"))
        );

        // The payload is only downloaded after the ledger check.
        assert_eq!(p.feed.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ledger_lines(&dir.path().join("printed.log")), 1);

        let trail = p.audit().unwrap().entries_for_job(&JobId::from("7")).unwrap();
        let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["dispatched", "duplicate_skipped"]);
    }

    #[tokio::test]
    async fn dry_run_with_broken_backend_still_records() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("printed.log")).unwrap();
        let backend = Arc::new(CountingBackend::broken());
        let mut p = poller(ScriptedFeed::offering(&["42"]), ledger, backend.clone(), dir.path(), true);

        match p.run_cycle().await.unwrap() {
            CycleOutcome::Dispatched { receipt, .. } => assert!(receipt.dry_run),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(p.ledger().contains(&JobId::from("42")));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_rejection_aborts_without_recording() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("printed.log")).unwrap();
        let backend = Arc::new(CountingBackend::broken());
        let mut p = poller(ScriptedFeed::offering(&["42"]), ledger, backend, dir.path(), false);

        let err = p.run_cycle().await.unwrap_err();
        assert_eq!(classify_error(&err), ErrorClass::Transient);
        assert!(!p.ledger().contains(&JobId::from("42")));

        let trail = p.audit().unwrap().entries_for_job(&JobId::from("42")).unwrap();
        assert_eq!(trail[0].action, "dispatch_failed");
        assert!(!trail[0].success);
    }

    #[tokio::test]
    async fn crash_between_dispatch_and_record_prints_at_most_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printed.log");
        let backend = Arc::new(CountingBackend::default());

        // First life: dispatch succeeds, then the ledger write dies.
        {
            let ledger = CrashingLedger {
                inner: FileLedger::open(&path).unwrap(),
                crash_next_record: true,
            };
            let mut p = poller(ScriptedFeed::offering(&["42"]), ledger, backend.clone(), dir.path(), false);
            let err = p.run_cycle().await.unwrap_err();
            assert_eq!(classify_error(&err), ErrorClass::Fatal);
        }
        assert_eq!(backend.accepted.load(Ordering::SeqCst), 1);

        // Restart; the server offers the same id again, twice.
        let ledger = FileLedger::open(&path).unwrap();
        assert!(!ledger.contains(&JobId::from("42")));
        let mut p = poller(ScriptedFeed::offering(&["42", "42"]), ledger, backend.clone(), dir.path(), false);
        assert!(matches!(p.run_cycle().await.unwrap(), CycleOutcome::Dispatched { .. }));
        assert!(matches!(p.run_cycle().await.unwrap(), CycleOutcome::Duplicate(_)));

        assert_eq!(backend.accepted.load(Ordering::SeqCst), 2);
        assert_eq!(ledger_lines(&path), 1);
    }

    #[tokio::test]
    async fn crash_before_dispatch_prints_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printed.log");
        let backend = Arc::new(CountingBackend::default());

        // First life: the download fails, nothing gets near the printer.
        {
            let feed = ScriptedFeed::offering(&["42"]);
            feed.fail_fetches.store(1, Ordering::SeqCst);
            let mut p = poller(feed, FileLedger::open(&path).unwrap(), backend.clone(), dir.path(), false);
            assert!(p.run_cycle().await.is_err());
            assert!(!p.ledger().contains(&JobId::from("42")));
        }

        let mut p = poller(
            ScriptedFeed::offering(&["42", "42"]),
            FileLedger::open(&path).unwrap(),
            backend.clone(),
            dir.path(),
            false,
        );
        assert!(matches!(p.run_cycle().await.unwrap(), CycleOutcome::Dispatched { .. }));
        assert!(matches!(p.run_cycle().await.unwrap(), CycleOutcome::Duplicate(_)));

        assert_eq!(backend.accepted.load(Ordering::SeqCst), 1);
        assert_eq!(ledger_lines(&path), 1);
    }

    #[tokio::test]
    async fn undecodable_photo_is_skipped_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("printed.log")).unwrap();
        let backend = Arc::new(CountingBackend::default());
        let feed = ScriptedFeed::offering(&["13"])
            .with_payload("13", b"<html><body>Not Found</body></html>".to_vec());
        let mut p = poller(feed, ledger, backend.clone(), dir.path(), false);

        match p.run_cycle().await.unwrap() {
            CycleOutcome::Skipped { job_id, .. } => assert_eq!(job_id, Some(JobId::from("13"))),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!p.ledger().contains(&JobId::from("13")));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        let trail = p.audit().unwrap().entries_for_job(&JobId::from("13")).unwrap();
        assert_eq!(trail[0].action, "normalize_failed");
    }

    #[tokio::test]
    async fn malformed_descriptor_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("printed.log")).unwrap();
        let feed = ScriptedFeed::default();
        feed.answers
            .lock()
            .unwrap()
            .push_back(Err(PartyPrintError::MalformedJob("job 9 has no filename".into())));
        let mut p = poller(feed, ledger, Arc::new(CountingBackend::default()), dir.path(), false);

        assert!(matches!(
            p.run_cycle().await.unwrap(),
            CycleOutcome::Skipped { job_id: None, .. }
        ));
        assert!(p.ledger().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_after_finishing_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("printed.log")).unwrap();
        let backend = Arc::new(CountingBackend::default());
        let mut p = poller(ScriptedFeed::offering(&["1"]), ledger, backend.clone(), dir.path(), false);

        p.run(async {}).await.unwrap();
        assert_eq!(backend.accepted.load(Ordering::SeqCst), 1);
        assert!(p.ledger().contains(&JobId::from("1")));
    }

    #[tokio::test]
    async fn run_returns_fatal_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CrashingLedger {
            inner: FileLedger::open(dir.path().join("printed.log")).unwrap(),
            crash_next_record: true,
        };
        let mut p = poller(
            ScriptedFeed::offering(&["1"]),
            ledger,
            Arc::new(CountingBackend::default()),
            dir.path(),
            false,
        );

        let err = p.run(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, PartyPrintError::Ledger(_)));
    }

    #[tokio::test]
    async fn transient_feed_failure_only_costs_one_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("printed.log")).unwrap();
        let backend = Arc::new(CountingBackend::default());
        let feed = ScriptedFeed::default();
        feed.answers
            .lock()
            .unwrap()
            .push_back(Err(PartyPrintError::JobFeed("connection refused".into())));
        feed.push(job("5"));
        let mut p = poller(feed, ledger, backend.clone(), dir.path(), false);

        let err = p.run_cycle().await.unwrap_err();
        assert_eq!(classify_error(&err), ErrorClass::Transient);
        assert!(p.ledger().is_empty());

        assert!(matches!(p.run_cycle().await.unwrap(), CycleOutcome::Dispatched { .. }));
        assert_eq!(backend.accepted.load(Ordering::SeqCst), 1);
    }
}
