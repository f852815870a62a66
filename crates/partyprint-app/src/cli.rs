// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::builder::BoolishValueParser;
use partyprint_core::config::DEFAULT_LP_OPTIONS;
use partyprint_core::types::{BackendKind, PrintFormat};
use partyprint_core::ClientConfig;

use crate::services::data_dir;

/// PartyPrint - polls the party server and prints each photo once
#[derive(Parser, Debug)]
#[command(name = "partyprint")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Job server base URL
    #[arg(long, env = "PARTYPRINT_SERVER", default_value = "https://party.emits.ai")]
    pub server: String,

    /// Base URL photos are downloaded from (default: <server>/files/)
    #[arg(long, env = "PARTYPRINT_DOWNLOAD_BASE")]
    pub download_base: Option<String>,

    /// Seconds between polls
    #[arg(long, env = "PARTYPRINT_POLL_INTERVAL", default_value_t = 5)]
    pub poll_interval: u64,

    /// Upper bound in seconds for the backoff after repeated failures
    #[arg(long, env = "PARTYPRINT_MAX_BACKOFF", default_value_t = 60)]
    pub max_backoff: u64,

    /// Timeout in seconds for job requests
    #[arg(long, env = "PARTYPRINT_REQUEST_TIMEOUT", default_value_t = 5)]
    pub request_timeout: u64,

    /// Timeout in seconds for photo downloads
    #[arg(long, env = "PARTYPRINT_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    pub download_timeout: u64,

    /// Timeout in seconds for each spooler command or IPP request
    #[arg(long, env = "PARTYPRINT_PRINTER_TIMEOUT", default_value_t = 30)]
    pub printer_timeout: u64,

    /// Printer to send jobs to
    #[arg(long, env = "PRINTER_NAME")]
    pub printer: Option<String>,

    /// Use the system default printer when --printer is not given
    #[arg(long, env = "PARTYPRINT_USE_DEFAULT_PRINTER", value_parser = BoolishValueParser::new())]
    pub use_default_printer: bool,

    /// Do everything except submit to the printer
    #[arg(long, env = "PARTYPRINT_DRY_RUN", value_parser = BoolishValueParser::new())]
    pub dry_run: bool,

    /// Print backend (cups or ipp)
    #[arg(long, env = "PARTYPRINT_BACKEND", default_value = "cups")]
    pub backend: BackendKind,

    /// Printer URI for the ipp backend
    #[arg(long, env = "PARTYPRINT_IPP_URI")]
    pub ipp_uri: Option<String>,

    /// Spooler `-o` option, repeatable; replaces the defaults
    #[arg(long = "lp-option", value_name = "OPTION")]
    pub lp_options: Vec<String>,

    /// Where the ledger, audit database and scratch files live
    #[arg(long, env = "PARTYPRINT_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Do not keep the SQLite audit trail
    #[arg(long)]
    pub no_audit: bool,
}

impl Cli {
    pub fn into_config(self) -> ClientConfig {
        let lp_options = if self.lp_options.is_empty() {
            DEFAULT_LP_OPTIONS.iter().map(|s| s.to_string()).collect()
        } else {
            self.lp_options
        };

        ClientConfig {
            server_base_url: self.server.trim_end_matches('/').to_owned(),
            download_base_url: self.download_base,
            poll_interval: Duration::from_secs(self.poll_interval),
            max_backoff: Duration::from_secs(self.max_backoff),
            request_timeout: Duration::from_secs(self.request_timeout),
            download_timeout: Duration::from_secs(self.download_timeout),
            printer_timeout: Duration::from_secs(self.printer_timeout),
            target_printer_name: self.printer.filter(|p| !p.trim().is_empty()),
            use_system_default: self.use_default_printer,
            dry_run: self.dry_run,
            backend: self.backend,
            ipp_uri: self.ipp_uri,
            lp_options,
            format: PrintFormat::postcard_4x6(),
            data_dir: self.data_dir.unwrap_or_else(data_dir::default_data_dir),
            audit_enabled: !self.no_audit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["partyprint"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse")
    }

    #[test]
    fn flags_map_onto_config() {
        let config = parse(&[
            "--server",
            "http://localhost:8080/",
            "--printer",
            "Canon_CP1500",
            "--dry-run",
            "--poll-interval",
            "2",
            "--data-dir",
            "/var/lib/partyprint",
            "--no-audit",
            "--printer-timeout",
            "90",
        ])
        .into_config();

        assert_eq!(config.server_base_url, "http://localhost:8080");
        assert_eq!(config.next_job_url(), "http://localhost:8080/next-job");
        assert_eq!(config.target_printer_name.as_deref(), Some("Canon_CP1500"));
        assert!(config.dry_run);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/partyprint"));
        assert!(!config.audit_enabled);
        assert_eq!(config.printer_timeout, Duration::from_secs(90));
    }

    #[test]
    fn lp_options_replace_defaults() {
        let config = parse(&["--lp-option", "media=4x6", "--lp-option", "fit-to-page"]).into_config();
        assert_eq!(config.lp_options, vec!["media=4x6", "fit-to-page"]);

        let config = parse(&["--printer", "A"]).into_config();
        assert_eq!(config.lp_options.len(), DEFAULT_LP_OPTIONS.len());
    }

    #[test]
    fn backend_is_parsed() {
        let config = parse(&["--backend", "ipp", "--ipp-uri", "ipp://printer.local/ipp/print"])
            .into_config();
        assert_eq!(config.backend, BackendKind::Ipp);
        assert!(config.validate().is_ok());

        assert!(Cli::try_parse_from(["partyprint", "--backend", "lpr"]).is_err());
    }

    #[test]
    fn poll_interval_beyond_default_backoff_starts() {
        let config = parse(&["--poll-interval", "120"]).into_config();
        assert_eq!(config.poll_interval, Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_printer_counts_as_unset() {
        let config = parse(&["--printer", " "]).into_config();
        assert!(config.target_printer_name.is_none());
    }
}
