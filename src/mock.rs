//! Mock transport, devices and window for testing without hardware.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use image::RgbImage;

use crate::display::{DisplayError, Key, PreviewWindow};
use crate::traits::{
    CameraDevice, CameraError, DeviceInfo, Frame, FrameMetadata, PixelFormat, Result,
    TransportLayer,
};

/// A call made on a mock device.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// `open`
    Open,
    /// `close`
    Close,
    /// `set_pixel_format`
    SetPixelFormat(PixelFormat),
    /// `enable_frame_rate_control`
    EnableFrameRate(bool),
    /// `set_frame_rate`
    SetFrameRate(f64),
    /// `start_grabbing`
    StartGrabbing,
    /// `stop_grabbing`
    StopGrabbing,
    /// `retrieve_frame`
    Retrieve,
}

/// Ordered record of calls across every device sharing it.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<(String, Call)>>>);

impl CallLog {
    fn record(&self, serial: &str, call: Call) {
        self.0.borrow_mut().push((serial.to_owned(), call));
    }

    /// Every call in the order it was made, tagged with the device serial.
    pub fn entries(&self) -> Vec<(String, Call)> {
        self.0.borrow().clone()
    }

    /// Calls made on one device.
    pub fn calls_for(&self, serial: &str) -> Vec<Call> {
        self.0
            .borrow()
            .iter()
            .filter(|(s, _)| s == serial)
            .map(|(_, call)| call.clone())
            .collect()
    }
}

/// Scripted result of a single `retrieve_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabOutcome {
    /// Deliver a test frame.
    Frame,
    /// Time out.
    Timeout,
    /// Report a failed grab.
    Fail,
    /// Deliver a frame whose payload is shorter than its geometry.
    Truncated,
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Every byte set to the same value.
    Solid(u8),
}

/// Mock device for testing without hardware.
#[derive(Debug, Clone)]
pub struct MockDevice {
    info: DeviceInfo,
    log: CallLog,
    open: bool,
    grabbing: bool,
    fail_open: bool,
    fail_close: bool,
    pixel_format: PixelFormat,
    supported_formats: Vec<PixelFormat>,
    sensor_size: (u32, u32),
    frame_rate_control: bool,
    frame_rate: f64,
    grab_script: VecDeque<GrabOutcome>,
    pattern: TestPattern,
    frame_count: u64,
}

impl MockDevice {
    /// Create a closed GigE mock device with the given serial number.
    #[must_use]
    pub fn new(serial: &str) -> Self {
        Self {
            info: DeviceInfo {
                model_name: "Mock GigE Camera".to_owned(),
                serial_number: serial.to_owned(),
                ip_address: Some(Ipv4Addr::new(192, 168, 0, 10)),
            },
            log: CallLog::default(),
            open: false,
            grabbing: false,
            fail_open: false,
            fail_close: false,
            pixel_format: PixelFormat::Mono8,
            supported_formats: PixelFormat::ALL.to_vec(),
            sensor_size: (64, 48),
            frame_rate_control: true,
            frame_rate: 30.0,
            grab_script: VecDeque::new(),
            pattern: TestPattern::Gradient,
            frame_count: 0,
        }
    }

    /// Set the network address.
    #[must_use]
    pub fn with_ip(mut self, octets: [u8; 4]) -> Self {
        self.info.ip_address = Some(Ipv4Addr::from(octets));
        self
    }

    /// Remove the network address, as for a USB device.
    #[must_use]
    pub fn without_ip(mut self) -> Self {
        self.info.ip_address = None;
        self
    }

    /// Set the initial pixel format.
    #[must_use]
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Restrict which pixel formats the device accepts.
    #[must_use]
    pub fn with_supported_formats(mut self, formats: &[PixelFormat]) -> Self {
        self.supported_formats = formats.to_vec();
        self
    }

    /// Set the sensor size.
    #[must_use]
    pub fn with_sensor_size(mut self, width: u32, height: u32) -> Self {
        self.sensor_size = (width, height);
        self
    }

    /// Make frame-rate control unavailable.
    #[must_use]
    pub fn without_frame_rate_control(mut self) -> Self {
        self.frame_rate_control = false;
        self
    }

    /// Make every `open` fail.
    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make every `close` report an error. The device still ends up closed.
    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Queue grab outcomes. Once exhausted, every grab delivers a frame.
    #[must_use]
    pub fn with_grab_script<I: IntoIterator<Item = GrabOutcome>>(mut self, script: I) -> Self {
        self.grab_script = script.into_iter().collect();
        self
    }

    /// Set the pattern of delivered frames.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Calls made on this device so far.
    pub fn calls(&self) -> Vec<Call> {
        self.log.calls_for(&self.info.serial_number)
    }

    fn record(&self, call: Call) {
        self.log.record(&self.info.serial_number, call);
    }

    fn next_frame(&mut self) -> Frame {
        let (width, height) = self.sensor_size;
        let format = self.pixel_format;
        let len = (width * height * format.bytes_per_pixel()) as usize;
        let row = (width * format.bytes_per_pixel()) as usize;
        let data = match self.pattern {
            TestPattern::Solid(value) => vec![value; len],
            #[allow(clippy::cast_possible_truncation)]
            TestPattern::Gradient => (0..len)
                .map(|i| ((i % row.max(1)) * 255 / row.max(1)) as u8)
                .collect(),
        };

        let sequence = self.frame_count;
        self.frame_count += 1;
        Frame {
            width,
            height,
            pixel_format: format,
            data,
            metadata: FrameMetadata {
                sequence,
                timestamp: sequence * 200_000_000,
            },
        }
    }
}

impl CameraDevice for MockDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open(&mut self) -> Result<()> {
        self.record(Call::Open);
        if self.fail_open {
            return Err(CameraError::DeviceOpenFailed("device busy".to_owned()));
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.record(Call::Close);
        self.open = false;
        self.grabbing = false;
        if self.fail_close {
            return Err(CameraError::Sdk("connection lost".to_owned()));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn pixel_format(&self) -> Result<PixelFormat> {
        Ok(self.pixel_format)
    }

    fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        self.record(Call::SetPixelFormat(format));
        if !self.supported_formats.contains(&format) {
            return Err(CameraError::PropertyRejected {
                name: "PixelFormat",
                reason: format!("{format} is not supported"),
            });
        }
        self.pixel_format = format;
        Ok(())
    }

    fn sensor_size(&self) -> Result<(u32, u32)> {
        Ok(self.sensor_size)
    }

    fn enable_frame_rate_control(&mut self, enabled: bool) -> Result<()> {
        self.record(Call::EnableFrameRate(enabled));
        if !self.frame_rate_control {
            return Err(CameraError::PropertyUnavailable("AcquisitionFrameRateEnable"));
        }
        Ok(())
    }

    fn set_frame_rate(&mut self, fps: f64) -> Result<()> {
        self.record(Call::SetFrameRate(fps));
        self.frame_rate = fps;
        Ok(())
    }

    fn frame_rate(&self) -> Result<f64> {
        Ok(self.frame_rate)
    }

    fn start_grabbing(&mut self) -> Result<()> {
        self.record(Call::StartGrabbing);
        if !self.open {
            return Err(CameraError::NotOpen);
        }
        self.grabbing = true;
        Ok(())
    }

    fn stop_grabbing(&mut self) -> Result<()> {
        self.record(Call::StopGrabbing);
        self.grabbing = false;
        Ok(())
    }

    fn is_grabbing(&self) -> bool {
        self.grabbing
    }

    fn retrieve_frame(&mut self, timeout: Duration) -> Result<Frame> {
        self.record(Call::Retrieve);
        if !self.grabbing {
            return Err(CameraError::NotGrabbing);
        }
        match self.grab_script.pop_front().unwrap_or(GrabOutcome::Frame) {
            GrabOutcome::Frame => Ok(self.next_frame()),
            GrabOutcome::Timeout => Err(CameraError::Timeout(timeout)),
            GrabOutcome::Fail => Err(CameraError::GrabFailed("payload incomplete".to_owned())),
            GrabOutcome::Truncated => {
                let mut frame = self.next_frame();
                frame.data.truncate(frame.data.len() / 2);
                Ok(frame)
            }
        }
    }
}

/// Mock transport serving a fixed list of devices that share one call log.
pub struct MockTransport {
    devices: Vec<MockDevice>,
    log: CallLog,
    fail_enumeration: bool,
}

impl MockTransport {
    /// Serve `devices` in order.
    #[must_use]
    pub fn new(devices: Vec<MockDevice>) -> Self {
        let log = CallLog::default();
        let devices = devices
            .into_iter()
            .map(|mut device| {
                device.log = log.clone();
                device
            })
            .collect();
        Self {
            devices,
            log,
            fail_enumeration: false,
        }
    }

    /// Make `enumerate` fail.
    #[must_use]
    pub fn failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    /// The log shared by every device.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl TransportLayer for MockTransport {
    type Device<'a> = MockDevice;

    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        if self.fail_enumeration {
            return Err(CameraError::Sdk("transport layer unavailable".to_owned()));
        }
        Ok(self.devices.iter().map(|device| device.info.clone()).collect())
    }

    fn create_device(&self, info: &DeviceInfo) -> Result<Self::Device<'_>> {
        self.devices
            .iter()
            .find(|device| device.info.serial_number == info.serial_number)
            .cloned()
            .ok_or_else(|| CameraError::DeviceOpenFailed(format!("unknown device {info}")))
    }
}

/// What a [`MockWindow`] was asked to do.
#[derive(Debug, Default)]
pub struct WindowRecord {
    /// Dimensions of every image shown.
    pub shown: Vec<(u32, u32)>,
    /// Number of key polls.
    pub polls: usize,
    /// Number of `close` calls.
    pub closed: usize,
}

/// Mock window replaying a fixed key sequence.
pub struct MockWindow {
    keys: VecDeque<Option<Key>>,
    when_exhausted: Option<Key>,
    fail_show: bool,
    record: Rc<RefCell<WindowRecord>>,
}

impl MockWindow {
    /// Replay `keys`, one per poll, then report `Quit`.
    #[must_use]
    pub fn new<I: IntoIterator<Item = Option<Key>>>(keys: I) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            when_exhausted: Some(Key::Quit),
            fail_show: false,
            record: Rc::default(),
        }
    }

    /// Report `Quit` on the first poll.
    #[must_use]
    pub fn quitting() -> Self {
        Self::new(std::iter::empty())
    }

    /// Never report a key.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            when_exhausted: None,
            ..Self::quitting()
        }
    }

    /// Make every `show` fail.
    #[must_use]
    pub fn failing_show(mut self) -> Self {
        self.fail_show = true;
        self
    }

    /// Shared handle on what the window recorded, usable after it is consumed.
    pub fn record(&self) -> Rc<RefCell<WindowRecord>> {
        Rc::clone(&self.record)
    }
}

impl PreviewWindow for MockWindow {
    fn show(&mut self, image: &RgbImage) -> std::result::Result<(), DisplayError> {
        if self.fail_show {
            return Err(DisplayError::Backend("window lost".to_owned()));
        }
        self.record.borrow_mut().shown.push(image.dimensions());
        Ok(())
    }

    fn poll_key(&mut self) -> std::result::Result<Option<Key>, DisplayError> {
        self.record.borrow_mut().polls += 1;
        Ok(self.keys.pop_front().unwrap_or(self.when_exhausted))
    }

    fn close(&mut self) -> std::result::Result<(), DisplayError> {
        self.record.borrow_mut().closed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new("cam0");
        assert_eq!(device.info().serial_number, "cam0");
        assert!(device.info().ip_address.is_some());
        assert!(!device.is_open());
        assert!(!device.is_grabbing());
    }

    #[test]
    fn test_mock_grab_requires_streaming() {
        let mut device = MockDevice::new("cam0");
        assert!(matches!(device.start_grabbing(), Err(CameraError::NotOpen)));

        device.open().expect("open should succeed");
        assert!(matches!(
            device.retrieve_frame(Duration::from_millis(10)),
            Err(CameraError::NotGrabbing)
        ));

        device.start_grabbing().expect("start should succeed");
        let frame1 = device
            .retrieve_frame(Duration::from_millis(10))
            .expect("frame should arrive");
        assert_eq!(frame1.metadata.sequence, 0);
        assert_eq!(frame1.data.len(), frame1.expected_len());

        let frame2 = device
            .retrieve_frame(Duration::from_millis(10))
            .expect("frame should arrive");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_grab_script_then_frames() {
        let mut device =
            MockDevice::new("cam0").with_grab_script([GrabOutcome::Timeout, GrabOutcome::Fail]);
        device.open().expect("open should succeed");
        device.start_grabbing().expect("start should succeed");

        let timeout = Duration::from_millis(5);
        assert!(matches!(
            device.retrieve_frame(timeout),
            Err(CameraError::Timeout(t)) if t == timeout
        ));
        assert!(matches!(
            device.retrieve_frame(timeout),
            Err(CameraError::GrabFailed(_))
        ));
        assert!(device.retrieve_frame(timeout).is_ok());
    }

    #[test]
    fn test_gradient_pattern() {
        let mut device = MockDevice::new("cam0").with_sensor_size(256, 2);
        device.open().expect("open should succeed");
        device.start_grabbing().expect("start should succeed");
        let frame = device
            .retrieve_frame(Duration::from_millis(5))
            .expect("frame should arrive");

        // Left edge dark, right edge bright, on every row.
        assert_eq!(frame.data.first(), Some(&0));
        assert!(frame.data.get(255).is_some_and(|v| *v > 250));
        assert_eq!(frame.data.get(256), Some(&0));
    }

    #[test]
    fn test_solid_pattern() {
        let mut device = MockDevice::new("cam0")
            .with_pixel_format(PixelFormat::RGB8)
            .with_sensor_size(4, 4)
            .with_pattern(TestPattern::Solid(42));
        device.open().expect("open should succeed");
        device.start_grabbing().expect("start should succeed");
        let frame = device
            .retrieve_frame(Duration::from_millis(5))
            .expect("frame should arrive");

        assert_eq!(frame.data.len(), 48);
        assert!(frame.data.iter().all(|v| *v == 42));
    }

    #[test]
    fn test_transport_shares_log() {
        let transport = MockTransport::new(vec![MockDevice::new("a"), MockDevice::new("b")]);
        let infos = transport.enumerate().expect("enumerate should succeed");
        assert_eq!(infos.len(), 2);

        for info in &infos {
            let mut device = transport.create_device(info).expect("device exists");
            device.open().expect("open should succeed");
        }

        assert_eq!(
            transport.log().entries(),
            vec![("a".to_owned(), Call::Open), ("b".to_owned(), Call::Open)]
        );
    }
}
