// src/services/image_processor.rs
use image::{DynamicImage, GenericImageView, ImageOutputFormat, imageops::FilterType};

use crate::models::EncodedImage;

/// Longest side a normalized photo may have. Keeps the upstream payload
/// small and the model latency predictable.
pub const MAX_DIMENSION: u32 = 1024;

const JPEG_QUALITY: u8 = 85;

pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Decodes a user-supplied photo and bounds its longest side to
    /// [`MAX_DIMENSION`], re-encoding as JPEG. Downscaling is best effort:
    /// bytes that do not decode as an image are passed through unchanged
    /// rather than rejected.
    pub fn normalize(&self, data: &[u8], media_type: &str) -> EncodedImage {
        let img = match image::load_from_memory(data) {
            Ok(img) => img,
            Err(e) => {
                log::debug!("image decode failed, passing original bytes through: {}", e);
                return EncodedImage {
                    data: data.to_vec(),
                    media_type: media_type.to_string(),
                    dimensions: None,
                };
            }
        };

        let (width, height) = img.dimensions();
        if width <= MAX_DIMENSION && height <= MAX_DIMENSION {
            return EncodedImage {
                data: data.to_vec(),
                media_type: media_type.to_string(),
                dimensions: Some((width, height)),
            };
        }

        let ratio = MAX_DIMENSION as f32 / width.max(height) as f32;
        let new_width = (width as f32 * ratio).round() as u32;
        let new_height = (height as f32 * ratio).round() as u32;

        let resized = img.resize(new_width, new_height, FilterType::Lanczos3);
        let (out_width, out_height) = resized.dimensions();

        // JPEG has no alpha channel; flatten before encoding.
        let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

        let mut output = Vec::new();
        match rgb.write_to(
            &mut std::io::Cursor::new(&mut output),
            ImageOutputFormat::Jpeg(JPEG_QUALITY),
        ) {
            Ok(()) => EncodedImage {
                data: output,
                media_type: "image/jpeg".to_string(),
                dimensions: Some((out_width, out_height)),
            },
            Err(e) => {
                log::debug!("jpeg re-encode failed, passing original bytes through: {}", e);
                EncodedImage {
                    data: data.to_vec(),
                    media_type: media_type.to_string(),
                    dimensions: Some((width, height)),
                }
            }
        }
    }
}
