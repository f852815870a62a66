// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// partyprint-document — Photo normalization for the PartyPrint kiosk client.
//
// Turns whatever the guests uploaded (phone JPEGs with EXIF rotation, PNGs
// with alpha, WebP, ...) into the one raster the dye-sub printer accepts.

pub mod image;

pub use self::image::normalizer::{ImageNormalizer, NormalizedImage, Placement};
