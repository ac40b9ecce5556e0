//! Command-line overrides for the preview defaults.

use std::time::Duration;

use clap::Parser;

use crate::config::{
    ConfigError, PreviewConfig, DEFAULT_FRAME_RATE, DEFAULT_GRAB_TIMEOUT_MS,
    DEFAULT_MAX_GRAB_FAILURES, DEFAULT_PIXEL_FORMAT, DEFAULT_SCALE, DEFAULT_WINDOW_TITLE,
};
use crate::traits::PixelFormat;

/// Live preview of GigE Vision cameras.
///
/// Left/Right arrow keys switch cameras, Esc quits.
#[derive(Debug, Parser)]
#[command(name = "gige-preview", version)]
pub struct Args {
    /// Grab timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_GRAB_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Pixel format requested from every camera
    #[arg(long, default_value_t = DEFAULT_PIXEL_FORMAT)]
    pub pixel_format: PixelFormat,

    /// Display scale factor
    #[arg(long, default_value_t = DEFAULT_SCALE)]
    pub scale: f64,

    /// Target acquisition frame rate (fps)
    #[arg(long, default_value_t = DEFAULT_FRAME_RATE)]
    pub fps: f64,

    /// Preview window title
    #[arg(long, default_value = DEFAULT_WINDOW_TITLE)]
    pub title: String,

    /// Consecutive grab failures before giving up (0 = never)
    #[arg(long, default_value_t = DEFAULT_MAX_GRAB_FAILURES)]
    pub max_grab_failures: u32,
}

impl Args {
    /// Build a validated configuration from the parsed arguments.
    pub fn into_config(self) -> Result<PreviewConfig, ConfigError> {
        let config = PreviewConfig {
            grab_timeout: Duration::from_millis(self.timeout_ms),
            pixel_format: self.pixel_format,
            scale: self.scale,
            frame_rate: self.fps,
            window_title: self.title,
            max_grab_failures: self.max_grab_failures,
        };
        config.validate()?;
        Ok(config)
    }
}
