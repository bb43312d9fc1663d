//! Pixel encoding for button and area images
//!
//! The framer only moves opaque payloads; turning pixels into the bytes a
//! model expects (size, orientation, JPEG or BMP) happens behind the
//! [`ImageEncoder`] seam so applications can plug in their own pipeline.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use streamdeck_transport::{AreaHeader, DeviceTypeDescriptor, ImageFormat, ImageTransform};

use crate::error::DeckError;

/// JPEG quality used for every write
const JPEG_QUALITY: u8 = 100;

/// Converts images into device payloads
pub trait ImageEncoder: Send + Sync {
    /// Scale, orient and encode an image for one button
    fn encode_button(
        &self,
        image: &DynamicImage,
        descriptor: &DeviceTypeDescriptor,
    ) -> Result<Vec<u8>, DeckError>;

    /// Encode an image for a sub-display rectangle, at its own size
    fn encode_area(
        &self,
        image: &DynamicImage,
        descriptor: &DeviceTypeDescriptor,
    ) -> Result<Vec<u8>, DeckError>;
}

/// Encoder backed by the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultImageEncoder;

fn apply_transform(image: DynamicImage, transform: ImageTransform) -> DynamicImage {
    match transform {
        ImageTransform::None => image,
        ImageTransform::Rotate180 => image.rotate180(),
        // Quarter turn counter-clockwise, then top-bottom mirror
        ImageTransform::Rotate90FlipVertical => image.rotate270().flipv(),
    }
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, DeckError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&image.to_rgb8())?;
    Ok(out)
}

fn encode_bmp(image: &DynamicImage) -> Result<Vec<u8>, DeckError> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut out, image::ImageFormat::Bmp)?;
    Ok(out.into_inner())
}

fn image_format(descriptor: &DeviceTypeDescriptor) -> Result<ImageFormat, DeckError> {
    descriptor
        .image_format
        .ok_or_else(|| DeckError::UnknownImageFormat(descriptor.name.clone()))
}

fn encode_as(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, DeckError> {
    match format {
        ImageFormat::Jpeg => encode_jpeg(image),
        ImageFormat::Bmp => encode_bmp(image),
    }
}

impl ImageEncoder for DefaultImageEncoder {
    fn encode_button(
        &self,
        image: &DynamicImage,
        descriptor: &DeviceTypeDescriptor,
    ) -> Result<Vec<u8>, DeckError> {
        let format = image_format(descriptor)?;
        let size = descriptor.image_size;
        let scaled = if image.width() == size.width && image.height() == size.height {
            image.clone()
        } else {
            image.resize_exact(size.width, size.height, FilterType::Lanczos3)
        };
        encode_as(&apply_transform(scaled, descriptor.image_transform), format)
    }

    fn encode_area(
        &self,
        image: &DynamicImage,
        descriptor: &DeviceTypeDescriptor,
    ) -> Result<Vec<u8>, DeckError> {
        let format = image_format(descriptor)?;
        // The Neo info display is mounted upside down
        let oriented = match descriptor.area_header {
            Some(AreaHeader::Neo) => image.rotate180(),
            _ => image.clone(),
        };
        encode_as(&oriented, format)
    }
}

/// Solid colour image of one button's size
pub fn solid_color(descriptor: &DeviceTypeDescriptor, color: Rgb<u8>) -> DynamicImage {
    let size = descriptor.image_size;
    DynamicImage::ImageRgb8(RgbImage::from_pixel(size.width, size.height, color))
}
