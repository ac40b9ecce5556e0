//! Core traits and types for GigE Vision camera abstraction.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

/// Raw sensor pixel layout, named after the GenICam `PixelFormat` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit monochrome.
    Mono8,
    /// 8-bit Bayer mosaic, red on the first pixel of the first row.
    BayerRG8,
    /// 8-bit Bayer mosaic, green-red first row.
    BayerGR8,
    /// 8-bit Bayer mosaic, green-blue first row.
    BayerGB8,
    /// 8-bit Bayer mosaic, blue on the first pixel of the first row.
    BayerBG8,
    /// Packed 24-bit RGB.
    RGB8,
    /// Packed 24-bit BGR.
    BGR8,
}

impl PixelFormat {
    /// All formats the preview knows how to convert.
    pub const ALL: [Self; 7] = [
        Self::Mono8,
        Self::BayerRG8,
        Self::BayerGR8,
        Self::BayerGB8,
        Self::BayerBG8,
        Self::RGB8,
        Self::BGR8,
    ];

    /// GenICam symbolic name of the format.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mono8 => "Mono8",
            Self::BayerRG8 => "BayerRG8",
            Self::BayerGR8 => "BayerGR8",
            Self::BayerGB8 => "BayerGB8",
            Self::BayerBG8 => "BayerBG8",
            Self::RGB8 => "RGB8",
            Self::BGR8 => "BGR8",
        }
    }

    /// Bytes occupied by a single pixel in the raw payload.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::RGB8 | Self::BGR8 => 3,
            _ => 1,
        }
    }

    /// Colour filter layout for Bayer formats, `None` otherwise.
    #[must_use]
    pub const fn bayer_pattern(self) -> Option<BayerPattern> {
        match self {
            Self::BayerRG8 => Some(BayerPattern::Rggb),
            Self::BayerGR8 => Some(BayerPattern::Grbg),
            Self::BayerGB8 => Some(BayerPattern::Gbrg),
            Self::BayerBG8 => Some(BayerPattern::Bggr),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a string is not a known pixel format name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pixel format {0:?}")]
pub struct ParsePixelFormatError(pub String);

impl FromStr for PixelFormat {
    type Err = ParsePixelFormatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| ParsePixelFormatError(s.to_owned()))
    }
}

/// 2x2 colour filter arrangement of a Bayer sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BayerPattern {
    /// R G / G B
    Rggb,
    /// G R / B G
    Grbg,
    /// G B / R G
    Gbrg,
    /// B G / G R
    Bggr,
}

impl BayerPattern {
    /// `(dx, dy)` offsets of the red and blue sites inside a 2x2 cell.
    ///
    /// The two green sites are the remaining corners.
    #[must_use]
    pub const fn red_blue_offsets(self) -> ((usize, usize), (usize, usize)) {
        match self {
            Self::Rggb => ((0, 0), (1, 1)),
            Self::Grbg => ((1, 0), (0, 1)),
            Self::Gbrg => ((0, 1), (1, 0)),
            Self::Bggr => ((1, 1), (0, 0)),
        }
    }
}

/// Identity of an enumerated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Vendor model name.
    pub model_name: String,
    /// Serial number, unique per device.
    pub serial_number: String,
    /// Network address. Only GigE Vision devices carry one.
    pub ip_address: Option<Ipv4Addr>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip_address {
            Some(ip) => write!(f, "{} ({}) at {ip}", self.model_name, self.serial_number),
            None => write!(f, "{} ({})", self.model_name, self.serial_number),
        }
    }
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, Default)]
pub struct FrameMetadata {
    /// Block id assigned by the device stream.
    pub sequence: u64,
    /// Device timestamp in ticks.
    pub timestamp: u64,
}

/// A captured frame, copied out of the SDK buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Layout of `data`.
    pub pixel_format: PixelFormat,
    /// Raw payload.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Payload size implied by the frame geometry.
    #[must_use]
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_format.bytes_per_pixel() as usize
    }
}

/// Error type for camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// Failed to create or open the device.
    #[error("failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// Operation requires an open device.
    #[error("device is not open")]
    NotOpen,
    /// Operation requires a grabbing device.
    #[error("device is not grabbing")]
    NotGrabbing,
    /// The device does not expose a property.
    #[error("property {0} is not available")]
    PropertyUnavailable(&'static str),
    /// The device refused a property write.
    #[error("property {name} rejected value: {reason}")]
    PropertyRejected {
        /// Property name.
        name: &'static str,
        /// Reason reported by the SDK.
        reason: String,
    },
    /// The device reports a pixel format we cannot convert.
    #[error("unsupported pixel format {0}")]
    UnsupportedPixelFormat(String),
    /// No frame arrived within the timeout.
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    /// A frame arrived but was incomplete or corrupted.
    #[error("grab failed: {0}")]
    GrabFailed(String),
    /// Any other SDK error.
    #[error("camera SDK error: {0}")]
    Sdk(String),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Entry point of a camera SDK: enumerates devices and creates handles.
pub trait TransportLayer {
    /// The device handle type returned by `create_device`.
    type Device<'a>: CameraDevice
    where
        Self: 'a;

    /// List every reachable device.
    fn enumerate(&self) -> Result<Vec<DeviceInfo>>;

    /// Create an unopened handle for an enumerated device.
    fn create_device(&self, info: &DeviceInfo) -> Result<Self::Device<'_>>;
}

/// Abstraction over a single camera device.
pub trait CameraDevice {
    /// Identity of the device.
    fn info(&self) -> &DeviceInfo;

    /// Open the device for configuration and streaming.
    fn open(&mut self) -> Result<()>;

    /// Close the device.
    fn close(&mut self) -> Result<()>;

    /// Whether the device is open.
    fn is_open(&self) -> bool;

    /// Current pixel format.
    fn pixel_format(&self) -> Result<PixelFormat>;

    /// Request a pixel format.
    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()>;

    /// Sensor region of interest as `(width, height)`.
    fn sensor_size(&self) -> Result<(u32, u32)>;

    /// Enable or disable the acquisition frame-rate limit.
    fn enable_frame_rate_control(&mut self, enabled: bool) -> Result<()>;

    /// Request an acquisition frame rate in frames per second.
    fn set_frame_rate(&mut self, fps: f64) -> Result<()>;

    /// Acquisition frame rate the device settled on.
    fn frame_rate(&self) -> Result<f64>;

    /// Start streaming, keeping only the latest frame.
    fn start_grabbing(&mut self) -> Result<()>;

    /// Stop streaming.
    fn stop_grabbing(&mut self) -> Result<()>;

    /// Whether the device is streaming.
    fn is_grabbing(&self) -> bool;

    /// Wait up to `timeout` for the most recent frame.
    fn retrieve_frame(&mut self, timeout: Duration) -> Result<Frame>;
}
