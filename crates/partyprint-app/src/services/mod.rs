// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer — the job feed, the poll loop, and where their state lives.

pub mod data_dir;
pub mod job_feed;
pub mod poller;
