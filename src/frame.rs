//! In-memory frames.
//!
//! A `Frame` lives for one iteration of a stream session: the source decodes
//! it, the sampler decides whether it is processed, the detector or overlay
//! draws on it, and the encoder turns it into JPEG bytes. Nothing retains a
//! frame past that iteration.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

/// RGB raster plus the 1-based sequence number assigned by its source.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Position of this frame in its source, starting at 1.
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    /// Build a frame from packed RGB bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("failed to wrap {}x{} RGB buffer", width, height))?;
        Ok(Self::new(image, sequence))
    }

    /// Decode a JPEG (or any format the `image` crate was built with).
    pub fn decode_jpeg(bytes: &[u8], sequence: u64) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode jpeg")?;
        Ok(Self::new(image.into_rgb8(), sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Packed RGB bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::Rgb;

    #[test]
    fn from_rgb_rejects_wrong_length() {
        let err = Frame::from_rgb(vec![0u8; 10], 4, 4, 1).unwrap_err();
        assert!(err.to_string().contains("expected 48 RGB bytes"));
    }

    #[test]
    fn from_rgb_keeps_dimensions() {
        let frame = Frame::from_rgb(vec![7u8; 4 * 2 * 3], 4, 2, 3).unwrap();
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.sequence, 3);
        assert_eq!(frame.pixels().len(), 24);
    }

    #[test]
    fn decode_jpeg_produces_rgb_frame() {
        let image = RgbImage::from_pixel(16, 8, Rgb([200, 10, 10]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode_image(&image)
            .unwrap();

        let frame = Frame::decode_jpeg(&jpeg, 5).unwrap();
        assert_eq!((frame.width(), frame.height()), (16, 8));
        assert_eq!(frame.sequence, 5);
    }

    #[test]
    fn decode_jpeg_rejects_garbage() {
        assert!(Frame::decode_jpeg(b"not a jpeg", 1).is_err());
    }
}
