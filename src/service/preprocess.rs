//! Turns client images into the `(28, 28, 1)` tensor the model expects.
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::data::{IMAGE_SIDE, SAMPLE_SHAPE};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::service::config::InkPolarity;

/// Decodes the payload of a `data:image/png;base64,...` URL. A bare base64
/// string without the `data:` prefix is accepted too.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let payload = match data_url.split_once(',') {
        Some((_, payload)) => payload,
        None => data_url,
    };
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if payload.is_empty() {
        return Err(Error::Decode("image data is empty".into()));
    }
    STANDARD.decode(payload.as_bytes())
        .map_err(|e| Error::Decode(format!("invalid base64 image data: {}", e)))
}

/// Decodes PNG/JPEG/BMP/GIF bytes into 8-bit grayscale. Transparent pixels
/// are composited onto white.
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::Decode(format!("cannot identify image file: {}", e)))?;
    let luma_alpha = img.to_luma_alpha8();
    let (w, h) = luma_alpha.dimensions();
    if w == 0 || h == 0 {
        return Err(Error::Decode("image has no pixels".into()));
    }

    Ok(GrayImage::from_fn(w, h, |x, y| {
        let [l, a] = luma_alpha.get_pixel(x, y).0;
        let (l, a) = (l as u32, a as u32);
        image::Luma([((l * a + 255 * (255 - a) + 127) / 255) as u8])
    }))
}

/// Full request-path preprocessing: grayscale, Lanczos3 resize to 28x28,
/// optional inversion, scale to `[0, 1]`.
pub fn image_to_input(bytes: &[u8], ink: InkPolarity) -> Result<Tensor> {
    let gray = decode_grayscale(bytes)?;
    let side = IMAGE_SIDE as u32;
    let resized = imageops::resize(&gray, side, side, FilterType::Lanczos3);

    let data = resized.pixels()
        .map(|p| {
            let v = match ink {
                InkPolarity::DarkOnLight => 255 - p.0[0],
                InkPolarity::LightOnDark => p.0[0],
            };
            v as f32 / 255.0
        })
        .collect();
    Tensor::from_vec(&SAMPLE_SHAPE, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(img: RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn white_canvas_becomes_all_zero_input() {
        let bytes = png(RgbaImage::from_pixel(280, 280, Rgba([255, 255, 255, 255])));
        let input = image_to_input(&bytes, InkPolarity::DarkOnLight).unwrap();
        assert_eq!(input.shape, vec![28, 28, 1]);
        assert!(input.data.iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn dark_ink_becomes_bright_after_inversion() {
        let mut img = RgbaImage::from_pixel(56, 56, Rgba([255, 255, 255, 255]));
        for y in 20..36 {
            for x in 0..56 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let bytes = png(img);

        let inverted = image_to_input(&bytes, InkPolarity::DarkOnLight).unwrap();
        // Row 14 sits in the middle of the black band, row 1 in the white margin.
        assert!(inverted.data[14 * 28 + 14] > 0.9);
        assert!(inverted.data[28 + 14] < 0.1);

        let raw = image_to_input(&bytes, InkPolarity::LightOnDark).unwrap();
        assert!(raw.data[14 * 28 + 14] < 0.1);
        assert!(raw.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn transparent_background_reads_as_white() {
        let bytes = png(RgbaImage::from_pixel(28, 28, Rgba([0, 0, 0, 0])));
        let gray = decode_grayscale(&bytes).unwrap();
        assert!(gray.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn data_url_prefix_is_optional() {
        let bytes = png(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])));
        let encoded = STANDARD.encode(&bytes);
        assert_eq!(decode_data_url(&format!("data:image/png;base64,{}", encoded)).unwrap(), bytes);
        assert_eq!(decode_data_url(&encoded).unwrap(), bytes);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode_data_url("data:image/png;base64,@@@"), Err(Error::Decode(_))));
        assert!(matches!(decode_data_url("data:image/png;base64,"), Err(Error::Decode(_))));
        assert!(matches!(image_to_input(b"definitely not an image", InkPolarity::DarkOnLight), Err(Error::Decode(_))));
    }
}
