//! Decode stage: runs the decoder on the rayon pool

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use imageproc::image::DynamicImage;

use crate::buffer::SmartBuffer;
use crate::decoder::{remove_colormap, Decoder, RawImage};
use crate::error::LoadError;
use crate::request::RequestContext;

/// What a worker thread needs to decode one request, and nothing more
#[derive(Debug)]
pub(crate) enum DecodeJob {
    Memory(SmartBuffer),
    Path(PathBuf),
}

/// Run `job` on a worker thread and wait for it without blocking the caller's
/// executor.
pub(crate) async fn submit_decode(decoder: Arc<dyn Decoder>, job: DecodeJob) -> Option<DynamicImage> {
    let (tx, rx) = smol::channel::bounded(1);

    rayon::spawn(move || {
        let image = decode_job(decoder.as_ref(), job);
        // a closed receiver means the request was torn down, nothing to deliver
        let _ = tx.try_send(image);
    });

    rx.recv().await.unwrap_or_else(|_| {
        log::warn!("decode worker went away without a result");
        None
    })
}

/// Decode and get rid of any colormap. Never touches the request's error.
pub(crate) fn decode_job(decoder: &dyn Decoder, job: DecodeJob) -> Option<DynamicImage> {
    let decoded = panic::catch_unwind(AssertUnwindSafe(|| match &job {
        DecodeJob::Memory(buffer) => decoder.decode_from_memory(&buffer.contiguous()),
        DecodeJob::Path(path) => decoder.decode_from_path(path),
    }));

    let raw = match decoded {
        Ok(raw) => raw?,
        Err(_) => {
            log::warn!("decoder panicked, treating input as undecodable");
            return None;
        }
    };

    Some(match raw {
        RawImage::Direct(img) => img,
        RawImage::Indexed(img) => {
            log::debug!("removing colormap of {} entries", img.palette.len());
            remove_colormap(img)
        }
    })
}

/// Back on the originating context: store the image, classify a missing one.
pub(crate) fn on_decoded<T>(ctx: &mut RequestContext<T>, image: Option<DynamicImage>) {
    ctx.result.data = image;
    if ctx.result.data.is_none() && !ctx.has_failed() {
        ctx.fail(LoadError::Decode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::IndexedImage;
    use imageproc::image::{ColorType, GrayImage};
    use std::path::Path;

    struct Fixed(fn() -> Option<RawImage>);

    impl Decoder for Fixed {
        fn decode_from_memory(&self, _: &[u8]) -> Option<RawImage> {
            (self.0)()
        }

        fn decode_from_path(&self, _: &Path) -> Option<RawImage> {
            (self.0)()
        }
    }

    #[test]
    fn colormap_is_removed() {
        let decoder = Fixed(|| {
            Some(RawImage::Indexed(IndexedImage {
                width: 1,
                height: 1,
                indices: vec![0],
                palette: vec![[4, 5, 6]],
                alpha: vec![],
            }))
        });

        let img = decode_job(&decoder, DecodeJob::Memory(SmartBuffer::new())).unwrap();
        assert_eq!(img.color(), ColorType::Rgb8);
    }

    #[test]
    fn direct_images_pass_through() {
        let decoder = Fixed(|| Some(RawImage::Direct(DynamicImage::ImageLuma8(GrayImage::new(2, 2)))));
        let img = decode_job(&decoder, DecodeJob::Path(PathBuf::from("x"))).unwrap();
        assert_eq!(img.color(), ColorType::L8);
    }

    #[test]
    fn panicking_decoder_yields_nothing() {
        let decoder = Fixed(|| panic!("corrupt state"));
        assert!(decode_job(&decoder, DecodeJob::Path(PathBuf::from("x"))).is_none());
    }

    #[test]
    fn decodes_on_worker_pool() {
        let decoder: Arc<dyn Decoder> =
            Arc::new(Fixed(|| Some(RawImage::Direct(DynamicImage::ImageLuma8(GrayImage::new(3, 1))))));
        let img = smol::block_on(submit_decode(decoder, DecodeJob::Path(PathBuf::from("x"))));
        assert_eq!(img.map(|img| img.width()), Some(3));
    }
}
