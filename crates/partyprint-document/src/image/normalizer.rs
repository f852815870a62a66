// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image normalizer — decode, apply EXIF orientation, fit inside the print
// raster, letterbox onto the background colour, encode for the printer.
// Operates on in-memory images using the `image` crate.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, Rgb, RgbImage};
use partyprint_core::error::{PartyPrintError, Result};
use partyprint_core::types::{OutputFormat, PrintFormat};
use tracing::{debug, info, instrument};

/// Where the scaled photo sits on the target canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Left letterbox bar width.
    pub offset_x: u32,
    /// Top letterbox bar height.
    pub offset_y: u32,
}

/// A photo ready for the print backend.
///
/// Holds both the raster (for inspection) and the encoded file bytes (for
/// submission). Lives for one polling cycle only.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    raster: RgbImage,
    encoded: Vec<u8>,
    output: OutputFormat,
    placement: Placement,
    source_width: u32,
    source_height: u32,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// The letterboxed canvas before encoding.
    pub fn raster(&self) -> &RgbImage {
        &self.raster
    }

    /// Encoded bytes in the configured output format.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn mime_type(&self) -> &'static str {
        self.output.mime_type()
    }

    pub fn extension(&self) -> &'static str {
        self.output.extension()
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Upright dimensions of the photo before scaling.
    pub fn source_dimensions(&self) -> (u32, u32) {
        (self.source_width, self.source_height)
    }
}

/// Deterministic transform from an uploaded photo to the print raster.
///
/// ```ignore
/// let normalizer = ImageNormalizer::new(PrintFormat::postcard_4x6());
/// let image = normalizer.normalize(&raw_bytes)?;
/// assert_eq!((image.width(), image.height()), (1800, 1200));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    format: PrintFormat,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(PrintFormat::postcard_4x6())
    }
}

impl ImageNormalizer {
    pub fn new(format: PrintFormat) -> Self {
        Self { format }
    }

    /// Normalize raw encoded bytes (JPEG, PNG, WebP, ...).
    ///
    /// Orientation metadata is applied before any resizing. Empty or
    /// undecodable input is an `ImageError`.
    #[instrument(skip(self, raw), fields(bytes = raw.len()))]
    pub fn normalize(&self, raw: &[u8]) -> Result<NormalizedImage> {
        if raw.is_empty() {
            return Err(PartyPrintError::ImageError("input is empty".into()));
        }

        let upright = decode_upright(raw)?;
        let (source_width, source_height) = (upright.width(), upright.height());
        let rgb = flatten_onto(upright, self.format.background);

        let raster = self.letterbox(rgb)?;
        let placement = fit_within(
            source_width,
            source_height,
            self.format.width_px,
            self.format.height_px,
        )?;
        let encoded = encode(&raster, self.format.output)?;

        info!(
            source_width,
            source_height,
            scaled_width = placement.scaled_width,
            scaled_height = placement.scaled_height,
            output_bytes = encoded.len(),
            "image normalized"
        );

        Ok(NormalizedImage {
            raster,
            encoded,
            output: self.format.output,
            placement,
            source_width,
            source_height,
        })
    }

    /// Scale an upright RGB image into the target box and centre it on a
    /// background-filled canvas.
    pub fn letterbox(&self, rgb: RgbImage) -> Result<RgbImage> {
        let (box_w, box_h) = (self.format.width_px, self.format.height_px);
        let placement = fit_within(rgb.width(), rgb.height(), box_w, box_h)?;

        // Already the exact target size: nothing to scale, nothing to pad.
        if rgb.width() == box_w && rgb.height() == box_h {
            debug!("source matches target raster, skipping resize");
            return Ok(rgb);
        }

        let scaled = if (placement.scaled_width, placement.scaled_height)
            == (rgb.width(), rgb.height())
        {
            rgb
        } else {
            imageops::resize(
                &rgb,
                placement.scaled_width,
                placement.scaled_height,
                FilterType::Lanczos3,
            )
        };

        let mut canvas = RgbImage::from_pixel(box_w, box_h, Rgb(self.format.background));
        imageops::replace(
            &mut canvas,
            &scaled,
            i64::from(placement.offset_x),
            i64::from(placement.offset_y),
        );
        Ok(canvas)
    }
}

/// Largest aspect-preserving size that fits `box_w` x `box_h`, and the
/// offsets that centre it. Scaling goes both ways: small photos are enlarged.
///
/// Uses integer arithmetic so the limiting axis always lands exactly on the
/// box edge.
pub fn fit_within(src_w: u32, src_h: u32, box_w: u32, box_h: u32) -> Result<Placement> {
    if src_w == 0 || src_h == 0 {
        return Err(PartyPrintError::ImageError(format!(
            "source has a zero dimension ({src_w}x{src_h})"
        )));
    }
    if box_w == 0 || box_h == 0 {
        return Err(PartyPrintError::ImageError(format!(
            "target has a zero dimension ({box_w}x{box_h})"
        )));
    }

    let (sw, sh, bw, bh) = (
        u64::from(src_w),
        u64::from(src_h),
        u64::from(box_w),
        u64::from(box_h),
    );

    // Compare aspect ratios: sw/sh >= bw/bh  <=>  sw*bh >= sh*bw
    let (scaled_width, scaled_height) = if sw * bh >= sh * bw {
        let h = (sh * bw * 2 + sw) / (sw * 2);
        (box_w, (h as u32).clamp(1, box_h))
    } else {
        let w = (sw * bh * 2 + sh) / (sh * 2);
        ((w as u32).clamp(1, box_w), box_h)
    };

    Ok(Placement {
        scaled_width,
        scaled_height,
        offset_x: (box_w - scaled_width) / 2,
        offset_y: (box_h - scaled_height) / 2,
    })
}

/// Apply an EXIF orientation so the image is visually upright.
pub fn upright(mut image: DynamicImage, orientation: Orientation) -> DynamicImage {
    image.apply_orientation(orientation);
    image
}

/// Decode and rotate/flip according to embedded orientation metadata.
fn decode_upright(raw: &[u8]) -> Result<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(raw))
        .with_guessed_format()
        .map_err(|err| PartyPrintError::ImageError(format!("failed to read image: {err}")))?
        .into_decoder()
        .map_err(|err| decode_error(raw, err))?;

    // A broken EXIF block should not cost the guest their print.
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let image = DynamicImage::from_decoder(decoder).map_err(|err| decode_error(raw, err))?;
    debug!(
        width = image.width(),
        height = image.height(),
        ?orientation,
        "image decoded"
    );
    Ok(upright(image, orientation))
}

fn decode_error(raw: &[u8], err: image::ImageError) -> PartyPrintError {
    if looks_like_html(raw) {
        PartyPrintError::ImageError(format!(
            "payload is an HTML page, not an image ({err})"
        ))
    } else {
        PartyPrintError::ImageError(format!("failed to decode image: {err}"))
    }
}

/// Error pages from the storage bucket arrive with a 200 now and then.
fn looks_like_html(raw: &[u8]) -> bool {
    let head = &raw[..raw.len().min(100)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    head.contains("<!doctype") || head.contains("<html")
}

/// Drop the alpha channel by compositing onto the background colour.
fn flatten_onto(image: DynamicImage, background: [u8; 3]) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let image::Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = u32::from(a);
        let blend = |fg: u8, bg: u8| -> u8 {
            ((u32::from(fg) * alpha + u32::from(bg) * (255 - alpha) + 127) / 255) as u8
        };
        Rgb([
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ])
    })
}

/// Encode the canvas for the print backend. JPEG output is baseline with no
/// EXIF or ICC data.
fn encode(raster: &RgbImage, output: OutputFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match output {
        OutputFormat::Jpeg { quality } => {
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
            raster.write_with_encoder(encoder).map_err(|err| {
                PartyPrintError::ImageError(format!("JPEG encoding failed: {err}"))
            })?;
        }
        OutputFormat::Png => {
            let encoder = image::codecs::png::PngEncoder::new(&mut buffer);
            raster.write_with_encoder(encoder).map_err(|err| {
                PartyPrintError::ImageError(format!("PNG encoding failed: {err}"))
            })?;
        }
    }
    Ok(buffer)
}
