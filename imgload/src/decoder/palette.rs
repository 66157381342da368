//! Colormapped images and their conversion to direct color

use imageproc::image::{DynamicImage, RgbImage, RgbaImage};

/// Image whose pixels are indices into a palette
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedImage {
    pub width: u32,
    pub height: u32,
    /// One palette index per pixel, row-major
    pub indices: Vec<u8>,
    pub palette: Vec<[u8; 3]>,
    /// Per-entry alpha; entries past the end are opaque
    pub alpha: Vec<u8>,
}

impl IndexedImage {
    fn rgba(&self, index: u8) -> [u8; 4] {
        let [r, g, b] = self
            .palette
            .get(index as usize)
            .copied()
            .unwrap_or([0, 0, 0]);
        let a = self.alpha.get(index as usize).copied().unwrap_or(u8::MAX);
        [r, g, b, a]
    }
}

/// Replace the colormap by full-color pixels.
///
/// Produces RGBA when the palette carries transparency, RGB otherwise.
/// Indices outside the palette map to black.
pub fn remove_colormap(img: IndexedImage) -> DynamicImage {
    if img.alpha.is_empty() {
        let mut out = RgbImage::new(img.width, img.height);
        for (dst, &index) in out.pixels_mut().zip(&img.indices) {
            let [r, g, b, _] = img.rgba(index);
            dst.0 = [r, g, b];
        }
        DynamicImage::ImageRgb8(out)
    } else {
        let mut out = RgbaImage::new(img.width, img.height);
        for (dst, &index) in out.pixels_mut().zip(&img.indices) {
            dst.0 = img.rgba(index);
        }
        DynamicImage::ImageRgba8(out)
    }
}

/// Read a PNG keeping its palette. `Ok(None)` when the PNG is not paletted.
pub(super) fn read_indexed_png(bytes: &[u8]) -> Result<Option<IndexedImage>, png::DecodingError> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info()?;

    let info = reader.info();
    if info.color_type != png::ColorType::Indexed {
        return Ok(None);
    }
    let Some(palette) = info.palette.as_deref() else {
        return Ok(None);
    };
    let palette: Vec<[u8; 3]> = palette
        .chunks_exact(3)
        .map(|rgb| [rgb[0], rgb[1], rgb[2]])
        .collect();
    let alpha = info.trns.as_deref().map(<[u8]>::to_vec).unwrap_or_default();

    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf)?;

    let depth = frame.bit_depth as u8;
    let indices = unpack_rows(
        &buf[..frame.buffer_size()],
        frame.width,
        frame.height,
        frame.line_size,
        depth,
    );

    Ok(Some(IndexedImage {
        width: frame.width,
        height: frame.height,
        indices,
        palette,
        alpha,
    }))
}

/// Expand 1, 2, 4 or 8 bit packed rows to one byte per pixel
fn unpack_rows(data: &[u8], width: u32, height: u32, line_size: usize, depth: u8) -> Vec<u8> {
    let (width, height) = (width as usize, height as usize);
    let mut indices = Vec::with_capacity(width * height);

    for row in data.chunks(line_size).take(height) {
        if depth == 8 {
            indices.extend_from_slice(&row[..width]);
            continue;
        }

        let per_byte = (8 / depth) as usize;
        let mask = (1u8 << depth) - 1;
        for x in 0..width {
            let byte = row[x / per_byte];
            let shift = 8 - depth as usize * (x % per_byte + 1);
            indices.push((byte >> shift) & mask);
        }
    }

    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::image::ColorType;

    #[test]
    fn opaque_palette_becomes_rgb() {
        let img = IndexedImage {
            width: 2,
            height: 1,
            indices: vec![1, 0],
            palette: vec![[10, 20, 30], [200, 100, 50]],
            alpha: vec![],
        };

        let direct = remove_colormap(img);
        assert_eq!(direct.color(), ColorType::Rgb8);
        let rgb = direct.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [200, 100, 50]);
        assert_eq!(rgb.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn transparent_palette_becomes_rgba() {
        let img = IndexedImage {
            width: 3,
            height: 1,
            indices: vec![0, 1, 7],
            palette: vec![[1, 1, 1], [2, 2, 2]],
            alpha: vec![0],
        };

        let rgba = remove_colormap(img).to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0).0, [1, 1, 1, 0]);
        assert_eq!(rgba.get_pixel(1, 0).0, [2, 2, 2, 255]);
        // out of range index
        assert_eq!(rgba.get_pixel(2, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn unpacks_sub_byte_depths() {
        // two rows of 5 pixels at 2 bits: 0b00_01_10_11, 0b01_000000
        let data = [0b0001_1011, 0b0100_0000, 0b1110_0100, 0b1100_0000];
        let indices = unpack_rows(&data, 5, 2, 2, 2);
        assert_eq!(indices, vec![0, 1, 2, 3, 1, 3, 2, 1, 0, 3]);

        let data = [0b1010_0000];
        assert_eq!(unpack_rows(&data, 3, 1, 1, 1), vec![1, 0, 1]);
    }
}
