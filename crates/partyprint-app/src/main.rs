// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PartyPrint — unattended photo-print kiosk client.
//
// Entry point. Initialises logging, resolves configuration, runs the startup
// checks (printer target, job server reachability), then polls until told
// to stop.

mod cli;
mod services;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use partyprint_core::error::Result;
use partyprint_core::types::BackendKind;
use partyprint_core::{ClientConfig, PartyPrintError};
use partyprint_document::ImageNormalizer;
use partyprint_print::{
    AuditLog, CupsBackend, Dispatcher, FileLedger, IppBackend, PrintBackend, ScratchDir,
    TargetRequest, classify_error, select_printer,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

use cli::Cli;
use services::data_dir;
use services::job_feed::HttpJobFeed;
use services::poller::{PollSettings, Poller};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config();

    match run(config).await {
        Ok(()) => {
            info!("PartyPrint stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, class = ?classify_error(&e), "PartyPrint cannot continue");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ClientConfig) -> Result<()> {
    config.validate()?;
    data_dir::ensure(&config.data_dir)?;

    let backend = build_backend(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server_base_url,
        backend = backend.name(),
        dry_run = config.dry_run,
        data_dir = %config.data_dir.display(),
        "PartyPrint starting"
    );
    if config.dry_run {
        warn!("dry run: photos are processed but never sent to the printer");
    }

    let printer = select_printer(
        backend.as_ref(),
        &TargetRequest {
            requested: config.target_printer_name.as_deref(),
            use_system_default: config.use_system_default,
            dry_run: config.dry_run,
        },
    )
    .await?;

    let feed = HttpJobFeed::new(&config)?;
    feed.probe().await?;

    let ledger = FileLedger::open(config.ledger_path())?;
    let dispatcher = Dispatcher::new(backend, ScratchDir::new(config.scratch_dir())?);

    let mut poller = Poller::new(
        feed,
        ledger,
        ImageNormalizer::new(config.format),
        dispatcher,
        PollSettings {
            printer,
            dry_run: config.dry_run,
            poll_interval: config.poll_interval,
            max_backoff: config.max_backoff,
        },
    );

    if config.audit_enabled {
        match AuditLog::open(config.audit_path()) {
            Ok(log) => {
                match log.count() {
                    Ok(entries) => info!(entries, "audit trail opened"),
                    Err(e) => warn!(error = %e, "audit trail opened but could not be counted"),
                }
                poller = poller.with_audit(log);
            }
            Err(e) => warn!(error = %e, "audit trail unavailable, continuing without it"),
        }
    }

    let mut stop = spawn_signal_listener();
    poller
        .run(async move {
            let _ = stop.changed().await;
        })
        .await
}

fn build_backend(config: &ClientConfig) -> Result<Arc<dyn PrintBackend>> {
    match config.backend {
        BackendKind::Cups => Ok(Arc::new(
            CupsBackend::new(config.lp_options.clone()).with_timeout(config.printer_timeout),
        )),
        BackendKind::Ipp => {
            let uri = config.ipp_uri.as_deref().ok_or_else(|| {
                PartyPrintError::Config("the ipp backend needs a printer URI".into())
            })?;
            Ok(Arc::new(IppBackend::new(uri)?.with_timeout(config.printer_timeout)))
        }
    }
}

/// Flip a watch channel on Ctrl-C or SIGTERM.
///
/// Listening starts immediately, so a signal that arrives mid-cycle is
/// honoured once that cycle has finished.
fn spawn_signal_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = tx.send(true);
    });
    rx
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c_or_forever() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                ctrl_c_or_forever().await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c_or_forever().await;
}

async fn ctrl_c_or_forever() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl-C handler failed");
        std::future::pending::<()>().await;
    }
}
