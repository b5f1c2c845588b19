//! Image preparation: arbitrary image bytes → bounded JPEG `ImageData`.
//!
//! Every image sent to a vision backend is first decoded, shrunk to fit
//! inside `max_dimension × max_dimension` and re-encoded as JPEG. Alt text
//! needs the gist of a picture, not its pixels, and a 6000 px photo would
//! otherwise cost thousands of input tokens and seconds of upload time.
//! `detail: "low"` asks OpenAI-style models for a single overview tile.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::debug;

/// Downsize and re-encode `bytes` for a vision request.
///
/// Images already within bounds are re-encoded but not scaled. Transparent
/// pixels are flattened onto black by the RGB conversion.
pub fn prepare_for_oracle(
    bytes: &[u8],
    max_dimension: u32,
    quality: u8,
) -> Result<ImageData, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let (w, h) = (img.width(), img.height());

    let img = if w > max_dimension || h > max_dimension {
        img.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Prepared image {}x{} → {}x{}, {} bytes base64",
        w,
        h,
        rgb.width(),
        rgb.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/jpeg").with_detail("low"))
}

/// Wrap prepared image data as a `data:` URI for JSON-based backends.
pub fn to_data_uri(image: &ImageData) -> String {
    format!("data:{};base64,{}", image.mime_type, image.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn large_image_is_bounded() {
        let data = prepare_for_oracle(&png(1600, 400), 800, 75).expect("prepare");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        let img = image::load_from_memory(&decoded).expect("valid jpeg");
        assert_eq!(img.width(), 800);
        assert_eq!(img.height(), 200);
    }

    #[test]
    fn small_image_keeps_size() {
        let data = prepare_for_oracle(&png(10, 12), 800, 75).expect("prepare");
        let decoded = STANDARD.decode(&data.data).unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!((img.width(), img.height()), (10, 12));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(prepare_for_oracle(b"not an image", 800, 75).is_err());
    }

    #[test]
    fn data_uri_shape() {
        let data = prepare_for_oracle(&png(4, 4), 800, 75).unwrap();
        let uri = to_data_uri(&data);
        assert!(uri.starts_with("data:image/jpeg;base64,"));
    }
}
