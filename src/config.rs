//! Preview configuration and the per-camera setup step.
//!
//! Both property writes performed here are best effort: a rejected pixel
//! format falls back to whatever the device is already using, and a failed
//! frame-rate write leaves the device defaults in place.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::traits::{CameraDevice, CameraError, PixelFormat, Result};

/// Default grab timeout in milliseconds.
pub const DEFAULT_GRAB_TIMEOUT_MS: u64 = 1000;
/// Default grab timeout.
pub const DEFAULT_GRAB_TIMEOUT: Duration = Duration::from_millis(DEFAULT_GRAB_TIMEOUT_MS);
/// Pixel format requested from every camera.
pub const DEFAULT_PIXEL_FORMAT: PixelFormat = PixelFormat::BayerRG8;
/// Display scale applied to every frame.
pub const DEFAULT_SCALE: f64 = 1.0 / 3.0;
/// Target acquisition frame rate.
pub const DEFAULT_FRAME_RATE: f64 = 5.0;
/// Preview window title.
pub const DEFAULT_WINDOW_TITLE: &str = "GigE Live Preview";
/// Consecutive grab failures tolerated on the active camera.
pub const DEFAULT_MAX_GRAB_FAILURES: u32 = 30;

/// Approximate sensor readout throughput in pixels per second.
pub const SENSOR_THROUGHPUT: u64 = 30_000_000;

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Grab timeout must be positive.
    #[error("grab timeout must be greater than zero")]
    ZeroTimeout,
    /// Scale must lie in `(0, 1]`.
    #[error("display scale must be greater than 0 and at most 1, got {0}")]
    InvalidScale(f64),
    /// Frame rate must be a positive finite number.
    #[error("frame rate must be a positive number, got {0}")]
    InvalidFrameRate(f64),
}

/// Settings shared by discovery, configuration and the grab loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewConfig {
    /// Upper bound on a single frame retrieval.
    pub grab_timeout: Duration,
    /// Preferred pixel format.
    pub pixel_format: PixelFormat,
    /// Display scale factor.
    pub scale: f64,
    /// Target acquisition frame rate.
    pub frame_rate: f64,
    /// Preview window title.
    pub window_title: String,
    /// Consecutive grab failures before giving up, `0` for no limit.
    pub max_grab_failures: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            grab_timeout: DEFAULT_GRAB_TIMEOUT,
            pixel_format: DEFAULT_PIXEL_FORMAT,
            scale: DEFAULT_SCALE,
            frame_rate: DEFAULT_FRAME_RATE,
            window_title: DEFAULT_WINDOW_TITLE.to_owned(),
            max_grab_failures: DEFAULT_MAX_GRAB_FAILURES,
        }
    }
}

impl PreviewConfig {
    /// Reject values the grab loop cannot work with.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.grab_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(ConfigError::InvalidScale(self.scale));
        }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(ConfigError::InvalidFrameRate(self.frame_rate));
        }
        Ok(())
    }
}

/// What the configuration step actually achieved on a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    /// Pixel format in effect, if it could be read.
    pub pixel_format: Option<PixelFormat>,
    /// Whether the preferred format was accepted.
    pub preferred_format_accepted: bool,
    /// Frame rate reported after the write, `None` if the device kept its default.
    pub frame_rate: Option<f64>,
}

/// Highest frame rate the sensor can sustain at `width` x `height`.
///
/// Returns `None` for a zero-area sensor.
#[must_use]
pub fn frame_rate_ceiling(width: u32, height: u32) -> Option<u32> {
    let area = u64::from(width) * u64::from(height);
    SENSOR_THROUGHPUT
        .checked_div(area)
        .and_then(|ceiling| u32::try_from(ceiling).ok())
}

/// Apply the preferred pixel format and frame rate to an open device.
///
/// Never fails: rejected writes are logged and the device keeps its state.
pub fn configure_camera<D: CameraDevice + ?Sized>(
    device: &mut D,
    config: &PreviewConfig,
) -> CameraSettings {
    let serial = device.info().serial_number.clone();

    let preferred_format_accepted = match device.set_pixel_format(config.pixel_format) {
        Ok(()) => {
            info!(camera = %serial, format = %config.pixel_format, "pixel format set");
            true
        }
        Err(err) => {
            warn!(
                camera = %serial,
                format = %config.pixel_format,
                error = %err,
                "could not set pixel format"
            );
            false
        }
    };

    let pixel_format = device.pixel_format().ok();
    if !preferred_format_accepted {
        match pixel_format {
            Some(current) => info!(camera = %serial, format = %current, "using fallback format"),
            None => info!(camera = %serial, "using fallback format: (unknown)"),
        }
    }

    let frame_rate = match apply_frame_rate(device, config.frame_rate) {
        Ok(fps) => {
            info!(camera = %serial, fps, "acquisition frame rate set");
            Some(fps)
        }
        Err(err) => {
            debug!(camera = %serial, error = %err, "keeping default frame rate");
            None
        }
    };

    CameraSettings {
        pixel_format,
        preferred_format_accepted,
        frame_rate,
    }
}

fn apply_frame_rate<D: CameraDevice + ?Sized>(device: &mut D, target: f64) -> Result<f64> {
    device.enable_frame_rate_control(true)?;
    let (width, height) = device.sensor_size()?;
    let ceiling =
        frame_rate_ceiling(width, height).ok_or(CameraError::PropertyUnavailable("Width"))?;

    let requested = target.min(f64::from(ceiling));
    device.set_frame_rate(requested)?;
    device.frame_rate()
}
