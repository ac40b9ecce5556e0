//! Conversion of raw frames into down-scaled RGB preview images.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::traits::{BayerPattern, Frame, PixelFormat};

/// Frame rejected before conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    /// Width or height is zero.
    #[error("frame has zero size ({width}x{height})")]
    EmptyFrame {
        /// Reported width.
        width: u32,
        /// Reported height.
        height: u32,
    },
    /// Payload shorter than the geometry requires.
    #[error("frame payload truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes implied by the geometry.
        expected: usize,
        /// Bytes received.
        actual: usize,
    },
    /// Scaled output would not fit in memory.
    #[error("scaled output {width}x{height} is too large")]
    OutputTooLarge {
        /// Scaled width.
        width: u32,
        /// Scaled height.
        height: u32,
    },
}

/// Upper bound on the byte size of a rendered preview image.
pub const MAX_OUTPUT_BYTES: usize = 256 * 1024 * 1024;

/// Per-camera conversion settings.
#[derive(Debug, Clone, Copy)]
pub struct FrameConverter {
    scale: f64,
    filter: FilterType,
}

impl FrameConverter {
    /// Create a converter that scales its output by `scale`.
    #[must_use]
    pub const fn new(scale: f64) -> Self {
        Self {
            scale,
            filter: FilterType::Triangle,
        }
    }

    /// Use a different resampling filter for the down-scale.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Display scale factor.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Convert and down-scale a frame for display.
    pub fn render(&self, frame: &Frame) -> Result<RgbImage, ConvertError> {
        let rgb = self.to_rgb(frame)?;
        self.downscale(&rgb)
    }

    /// Convert a frame to packed RGB at full resolution.
    pub fn to_rgb(&self, frame: &Frame) -> Result<RgbImage, ConvertError> {
        validate_frame(frame)?;
        let expected = frame.expected_len();
        let data = frame.data.get(..expected).ok_or(ConvertError::Truncated {
            expected,
            actual: frame.data.len(),
        })?;

        let image = match frame.pixel_format {
            PixelFormat::Mono8 => RgbImage::from_fn(frame.width, frame.height, |x, y| {
                let v = sample(data, frame.width, x as usize, y as usize);
                Rgb([v, v, v])
            }),
            PixelFormat::RGB8 => packed(data, frame.width, frame.height, [0, 1, 2]),
            PixelFormat::BGR8 => packed(data, frame.width, frame.height, [2, 1, 0]),
            PixelFormat::BayerRG8
            | PixelFormat::BayerGR8
            | PixelFormat::BayerGB8
            | PixelFormat::BayerBG8 => {
                let pattern = frame
                    .pixel_format
                    .bayer_pattern()
                    .unwrap_or(BayerPattern::Rggb);
                demosaic(data, frame.width, frame.height, pattern)
            }
        };
        Ok(image)
    }

    /// Resize an image by the configured scale.
    pub fn downscale(&self, image: &RgbImage) -> Result<RgbImage, ConvertError> {
        let (width, height) = scaled_size(image.width(), image.height(), self.scale);
        let bytes = (width as usize)
            .checked_mul(height as usize)
            .and_then(|area| area.checked_mul(3));
        if !bytes.is_some_and(|bytes| bytes <= MAX_OUTPUT_BYTES) {
            return Err(ConvertError::OutputTooLarge { width, height });
        }
        if (width, height) == image.dimensions() {
            return Ok(image.clone());
        }
        Ok(imageops::resize(image, width, height, self.filter))
    }
}

/// Check that a frame's payload matches its geometry.
pub fn validate_frame(frame: &Frame) -> Result<(), ConvertError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(ConvertError::EmptyFrame {
            width: frame.width,
            height: frame.height,
        });
    }
    let expected = frame.expected_len();
    if frame.data.len() < expected {
        return Err(ConvertError::Truncated {
            expected,
            actual: frame.data.len(),
        });
    }
    Ok(())
}

/// Output dimensions for a resize by `scale`, never below one pixel.
#[must_use]
pub fn scaled_size(width: u32, height: u32, scale: f64) -> (u32, u32) {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scale_dim = |dim: u32| ((f64::from(dim) * scale).round() as u32).max(1);
    (scale_dim(width), scale_dim(height))
}

fn sample(data: &[u8], width: u32, x: usize, y: usize) -> u8 {
    data.get(y * width as usize + x).copied().unwrap_or(0)
}

fn packed(data: &[u8], width: u32, height: u32, order: [usize; 3]) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let base = (y as usize * width as usize + x as usize) * 3;
        let channel = |i: usize| data.get(base + i).copied().unwrap_or(0);
        Rgb([channel(order[0]), channel(order[1]), channel(order[2])])
    })
}

/// Demosaic an 8-bit Bayer payload.
///
/// Every 2x2 cell yields one colour: red and blue are taken from their sites
/// and the two greens are averaged. Cells on an odd trailing row or column
/// reuse the last valid sample.
fn demosaic(data: &[u8], width: u32, height: u32, pattern: BayerPattern) -> RgbImage {
    let (w, h) = (width as usize, height as usize);
    let ((rx, ry), (bx, by)) = pattern.red_blue_offsets();
    let mut image = RgbImage::new(width, height);

    for cell_y in (0..h).step_by(2) {
        for cell_x in (0..w).step_by(2) {
            let at = |dx: usize, dy: usize| {
                let x = (cell_x + dx).min(w - 1);
                let y = (cell_y + dy).min(h - 1);
                sample(data, width, x, y)
            };
            let red = at(rx, ry);
            let blue = at(bx, by);
            let green_a = u16::from(at(1 - rx, ry));
            let green_b = u16::from(at(rx, 1 - ry));
            #[allow(clippy::cast_possible_truncation)]
            let green = ((green_a + green_b + 1) / 2) as u8;
            let colour = Rgb([red, green, blue]);

            for y in cell_y..(cell_y + 2).min(h) {
                for x in cell_x..(cell_x + 2).min(w) {
                    #[allow(clippy::cast_possible_truncation)]
                    image.put_pixel(x as u32, y as u32, colour);
                }
            }
        }
    }
    image
}
