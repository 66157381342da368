//! Image decoding
//!
//! Thin synchronous layer over the format decoders. Everything in here runs on
//! a worker thread and never sees the request it is decoding for.

mod palette;

pub use palette::{remove_colormap, IndexedImage};

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use anyhow::Result;
use imageproc::image::{self, DynamicImage, ImageFormat};

static INIT: Once = Once::new();
static PRESERVE_ALPHA: AtomicBool = AtomicBool::new(false);

/// One-time process setup for the decoders.
///
/// Until this runs alpha channels are stripped from decoded images. Calling it
/// again is a no-op.
pub fn initialize() {
    INIT.call_once(|| {
        PRESERVE_ALPHA.store(true, Ordering::Release);
        log::debug!("decoder initialized, alpha channels preserved");
    });
}

pub fn preserves_alpha() -> bool {
    PRESERVE_ALPHA.load(Ordering::Acquire)
}

/// What a decoder hands back before normalization
#[derive(Debug)]
pub enum RawImage {
    Direct(DynamicImage),
    Indexed(IndexedImage),
}

/// Synchronous decoder, shared by every worker thread.
///
/// `None` means the input could not be decoded; the reason is not reported
/// upstream.
pub trait Decoder: Send + Sync + 'static {
    fn decode_from_memory(&self, bytes: &[u8]) -> Option<RawImage>;

    fn decode_from_path(&self, path: &Path) -> Option<RawImage>;

    /// Whether the decoder can work from an in-memory copy of the file
    fn reads_from_memory(&self) -> bool {
        true
    }
}

/// Decoder backed by the `image` crate, with paletted PNGs read through `png`
/// so that their colormap is kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDecoder;

impl Decoder for StandardDecoder {
    fn decode_from_memory(&self, bytes: &[u8]) -> Option<RawImage> {
        let raw = decode(bytes)
            .map_err(|e| log::debug!("decoder rejected {} bytes: {e}", bytes.len()))
            .ok()?;

        Some(if preserves_alpha() { raw } else { strip_alpha(raw) })
    }

    fn decode_from_path(&self, path: &Path) -> Option<RawImage> {
        let bytes = std::fs::read(path)
            .map_err(|e| log::debug!("decoder can't read {}: {e}", path.display()))
            .ok()?;
        self.decode_from_memory(&bytes)
    }
}

fn decode(bytes: &[u8]) -> Result<RawImage> {
    if let Ok(ImageFormat::Png) = image::guess_format(bytes) {
        if let Some(indexed) = palette::read_indexed_png(bytes)? {
            return Ok(RawImage::Indexed(indexed));
        }
    }

    Ok(RawImage::Direct(image::load_from_memory(bytes)?))
}

/// Drop transparency, keeping grayscale images grayscale
pub fn strip_alpha(raw: RawImage) -> RawImage {
    match raw {
        RawImage::Direct(img) if img.color().has_alpha() => {
            let flattened = if img.color().has_color() {
                DynamicImage::ImageRgb8(img.to_rgb8())
            } else {
                DynamicImage::ImageLuma8(img.to_luma8())
            };
            RawImage::Direct(flattened)
        }
        RawImage::Indexed(mut img) => {
            img.alpha.clear();
            RawImage::Indexed(img)
        }
        direct => direct,
    }
}
