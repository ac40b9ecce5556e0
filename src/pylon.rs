//! Basler pylon SDK backend using the pylon-cxx crate.

use std::cell::RefCell;
use std::time::Duration;

use pylon_cxx::{
    GrabOptions, GrabResult, GrabStrategy, HasProperties, InstantCamera, NodeMap, Pylon,
    PylonError, TimeoutHandling, TlFactory,
};
use tracing::debug;

use crate::traits::{
    CameraDevice, CameraError, DeviceInfo, Frame, FrameMetadata, PixelFormat, Result,
    TransportLayer,
};

/// Frame rate node names, newest SFNC first. Older GigE models only expose
/// the `Abs` variant.
const FRAME_RATE_NODES: [&str; 2] = ["AcquisitionFrameRate", "AcquisitionFrameRateAbs"];

fn sdk(err: PylonError) -> CameraError {
    CameraError::Sdk(err.to_string())
}

/// The pylon runtime and its transport layer factory.
///
/// Enumeration results are cached so devices can be created from them.
pub struct PylonTransport {
    pylon: Pylon,
    devices: RefCell<Vec<pylon_cxx::DeviceInfo>>,
}

impl Default for PylonTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PylonTransport {
    /// Initialise the pylon runtime. It is terminated when this is dropped.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pylon: Pylon::new(),
            devices: RefCell::new(Vec::new()),
        }
    }
}

fn describe(device: &pylon_cxx::DeviceInfo) -> DeviceInfo {
    DeviceInfo {
        model_name: device.property_value("ModelName").unwrap_or_default(),
        serial_number: device.property_value("SerialNumber").unwrap_or_default(),
        // Only GigE devices carry an IpAddress property.
        ip_address: device
            .property_value("IpAddress")
            .ok()
            .and_then(|ip| ip.parse().ok()),
    }
}

impl TransportLayer for PylonTransport {
    type Device<'a> = PylonCamera<'a>;

    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        let found = TlFactory::instance(&self.pylon)
            .enumerate_devices()
            .map_err(sdk)?;
        let infos = found.iter().map(describe).collect();
        *self.devices.borrow_mut() = found;
        Ok(infos)
    }

    fn create_device(&self, info: &DeviceInfo) -> Result<Self::Device<'_>> {
        let devices = self.devices.borrow();
        let device = devices
            .iter()
            .find(|device| describe(device).serial_number == info.serial_number)
            .ok_or_else(|| CameraError::DeviceOpenFailed(format!("{info} is not enumerated")))?;

        let camera = TlFactory::instance(&self.pylon)
            .create_device(device)
            .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))?;
        let grab_result = GrabResult::new().map_err(sdk)?;

        Ok(PylonCamera {
            camera,
            info: info.clone(),
            pixel_format: None,
            grab_result,
            frame_count: 0,
        })
    }
}

/// A pylon `InstantCamera`.
pub struct PylonCamera<'a> {
    camera: InstantCamera<'a>,
    info: DeviceInfo,
    // Pixel format in effect while grabbing, read once at start.
    pixel_format: Option<PixelFormat>,
    grab_result: GrabResult,
    frame_count: u64,
}

impl PylonCamera<'_> {
    fn frame_rate_node(&self) -> Result<pylon_cxx::FloatNode> {
        FRAME_RATE_NODES
            .iter()
            .find_map(|name| self.camera.float_node(name).ok())
            .ok_or(CameraError::PropertyUnavailable("AcquisitionFrameRate"))
    }
}

impl CameraDevice for PylonCamera<'_> {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open(&mut self) -> Result<()> {
        self.camera
            .open()
            .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))
    }

    fn close(&mut self) -> Result<()> {
        self.camera.close().map_err(sdk)
    }

    fn is_open(&self) -> bool {
        self.camera.is_open().unwrap_or(false)
    }

    fn pixel_format(&self) -> Result<PixelFormat> {
        let value = self
            .camera
            .enum_node("PixelFormat")
            .and_then(|node| node.value())
            .map_err(sdk)?;
        value
            .parse()
            .map_err(|_| CameraError::UnsupportedPixelFormat(value))
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        let mut node = self
            .camera
            .enum_node("PixelFormat")
            .map_err(|_| CameraError::PropertyUnavailable("PixelFormat"))?;
        node.set_value(format.name())
            .map_err(|err| CameraError::PropertyRejected {
                name: "PixelFormat",
                reason: err.to_string(),
            })
    }

    fn sensor_size(&self) -> Result<(u32, u32)> {
        let read = |name: &'static str| -> Result<u32> {
            let value = self
                .camera
                .integer_node(name)
                .and_then(|node| node.value())
                .map_err(|_| CameraError::PropertyUnavailable(name))?;
            u32::try_from(value).map_err(|_| CameraError::Sdk(format!("{name} out of range: {value}")))
        };
        Ok((read("Width")?, read("Height")?))
    }

    fn enable_frame_rate_control(&mut self, enabled: bool) -> Result<()> {
        let mut node = self
            .camera
            .boolean_node("AcquisitionFrameRateEnable")
            .map_err(|_| CameraError::PropertyUnavailable("AcquisitionFrameRateEnable"))?;
        node.set_value(enabled)
            .map_err(|err| CameraError::PropertyRejected {
                name: "AcquisitionFrameRateEnable",
                reason: err.to_string(),
            })
    }

    fn set_frame_rate(&mut self, fps: f64) -> Result<()> {
        let mut node = self.frame_rate_node()?;
        node.set_value(fps)
            .map_err(|err| CameraError::PropertyRejected {
                name: "AcquisitionFrameRate",
                reason: err.to_string(),
            })
    }

    fn frame_rate(&self) -> Result<f64> {
        self.frame_rate_node()?.value().map_err(sdk)
    }

    fn start_grabbing(&mut self) -> Result<()> {
        self.pixel_format = match self.pixel_format() {
            Ok(format) => Some(format),
            Err(err) => {
                debug!(camera = %self.info.serial_number, error = %err, "pixel format unreadable");
                None
            }
        };
        self.camera
            .start_grabbing(&GrabOptions::default().strategy(GrabStrategy::LatestImageOnly))
            .map_err(sdk)
    }

    fn stop_grabbing(&mut self) -> Result<()> {
        self.camera.stop_grabbing().map_err(sdk)
    }

    fn is_grabbing(&self) -> bool {
        self.camera.is_grabbing()
    }

    fn retrieve_frame(&mut self, timeout: Duration) -> Result<Frame> {
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let ready = self
            .camera
            .retrieve_result(timeout_ms, &mut self.grab_result, TimeoutHandling::Return)
            .map_err(sdk)?;
        if !ready {
            return Err(CameraError::Timeout(timeout));
        }

        let result = &self.grab_result;
        if !result.grab_succeeded().map_err(sdk)? {
            let reason = result
                .error_description()
                .unwrap_or_else(|err| err.to_string());
            return Err(CameraError::GrabFailed(reason));
        }

        let pixel_format = self
            .pixel_format
            .ok_or_else(|| CameraError::UnsupportedPixelFormat("(unknown)".to_owned()))?;
        self.frame_count += 1;

        Ok(Frame {
            width: result.width().map_err(sdk)?,
            height: result.height().map_err(sdk)?,
            pixel_format,
            data: result.buffer().map_err(sdk)?.to_vec(),
            metadata: FrameMetadata {
                sequence: result.block_id().unwrap_or(self.frame_count),
                timestamp: result.time_stamp().unwrap_or(0),
            },
        })
    }
}
