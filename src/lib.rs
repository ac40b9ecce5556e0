//! gige-preview: live preview for GigE Vision cameras.
//!
//! Camera SDK and display access sit behind the [`TransportLayer`],
//! [`CameraDevice`] and [`PreviewWindow`] traits, so the discovery,
//! configuration and preview loop run against real hardware or mock devices
//! alike.

pub mod cli;
pub mod config;
pub mod convert;
pub mod discovery;
pub mod display;
pub mod preview;
pub mod traits;

#[cfg(feature = "highgui")]
pub mod highgui;
#[cfg(feature = "pylon")]
pub mod pylon;

#[cfg(test)]
pub mod mock;

pub use config::{configure_camera, PreviewConfig};
pub use convert::FrameConverter;
pub use discovery::{discover, Camera};
pub use display::{Key, PreviewWindow};
pub use preview::{run_preview, CameraRing, PreviewError, PreviewSession, PreviewStats};
pub use traits::{CameraDevice, CameraError, DeviceInfo, Frame, PixelFormat, TransportLayer};
