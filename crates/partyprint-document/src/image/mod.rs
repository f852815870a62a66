// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — orientation correction, fit-and-letterbox, print encoding.

pub mod normalizer;

pub use normalizer::ImageNormalizer;
