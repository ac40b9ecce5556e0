//! The live preview loop.
//!
//! One camera is active at a time. Each iteration grabs the latest frame from
//! it, shows the down-scaled image and polls a single key. Switching cameras
//! stops and closes the active device; the newly active one is reopened and
//! started on the next iteration.

use std::net::Ipv4Addr;
use std::time::Duration;

use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, PreviewConfig};
use crate::convert::ConvertError;
use crate::discovery::{discover, Camera};
use crate::display::{DisplayError, Key, PreviewWindow};
use crate::traits::{CameraDevice, CameraError, TransportLayer};

/// Why a single grab produced no image.
#[derive(Debug, thiserror::Error)]
pub enum GrabFailure {
    /// The SDK call failed or timed out.
    #[error(transparent)]
    Camera(#[from] CameraError),
    /// The frame arrived but could not be converted.
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Top-level error of a preview run.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// Discovery found no usable camera.
    #[error("no GigE Vision cameras found")]
    NoCameras,
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Camera SDK failure outside the grab loop.
    #[error(transparent)]
    Camera(#[from] CameraError),
    /// Display backend failure.
    #[error(transparent)]
    Display(#[from] DisplayError),
    /// The active camera kept failing.
    #[error("giving up on camera {address} after {failures} consecutive grab failures")]
    GrabFailed {
        /// Address of the failing camera.
        address: Ipv4Addr,
        /// Number of consecutive failures.
        failures: u32,
        /// The last failure.
        #[source]
        last: GrabFailure,
    },
}

/// Circular index over a fixed, non-empty list of cameras.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraRing {
    index: usize,
    count: usize,
}

impl CameraRing {
    /// Ring over `count` cameras starting at the first. `None` when empty.
    #[must_use]
    pub const fn new(count: usize) -> Option<Self> {
        if count == 0 {
            None
        } else {
            Some(Self { index: 0, count })
        }
    }

    /// Index of the active camera.
    #[must_use]
    pub const fn current(&self) -> usize {
        self.index
    }

    /// Number of cameras in the ring.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Move to the next camera, wrapping at the end.
    pub fn advance(&mut self) -> usize {
        self.index = (self.index + 1) % self.count;
        self.index
    }

    /// Move to the previous camera, wrapping at the start.
    pub fn retreat(&mut self) -> usize {
        self.index = (self.index + self.count - 1) % self.count;
        self.index
    }
}

/// Counters reported when the preview ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewStats {
    /// Frames shown in the window.
    pub frames_displayed: u64,
    /// Retrievals that hit the grab timeout.
    pub timeouts: u64,
    /// Other failed retrievals or conversions.
    pub grab_failures: u64,
    /// Camera switches requested by the user.
    pub switches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopControl {
    Continue,
    Quit,
}

/// Owns the discovered cameras and the window for the duration of a preview.
///
/// Dropping the session stops and closes every device still open.
pub struct PreviewSession<D: CameraDevice, W: PreviewWindow> {
    cameras: Vec<Camera<D>>,
    ring: CameraRing,
    window: W,
    grab_timeout: Duration,
    max_grab_failures: u32,
    consecutive_failures: u32,
    stats: PreviewStats,
    shut_down: bool,
}

impl<D: CameraDevice, W: PreviewWindow> PreviewSession<D, W> {
    /// Start a session over `cameras`, beginning with the first.
    pub fn new(
        cameras: Vec<Camera<D>>,
        window: W,
        config: &PreviewConfig,
    ) -> Result<Self, PreviewError> {
        let ring = CameraRing::new(cameras.len()).ok_or(PreviewError::NoCameras)?;
        Ok(Self {
            cameras,
            ring,
            window,
            grab_timeout: config.grab_timeout,
            max_grab_failures: config.max_grab_failures,
            consecutive_failures: 0,
            stats: PreviewStats::default(),
            shut_down: false,
        })
    }

    /// Index of the active camera.
    #[must_use]
    pub const fn active_index(&self) -> usize {
        self.ring.current()
    }

    /// Run until the quit key, then release every device and the window.
    pub fn run(mut self) -> Result<PreviewStats, PreviewError> {
        info!("use LEFT/RIGHT arrow keys to swap cameras, ESC to quit");
        let outcome = self.grab_loop();
        let closed = self.shutdown();
        outcome?;
        closed?;

        let stats = self.stats;
        info!(
            frames = stats.frames_displayed,
            timeouts = stats.timeouts,
            failures = stats.grab_failures,
            switches = stats.switches,
            "preview finished"
        );
        Ok(stats)
    }

    fn grab_loop(&mut self) -> Result<(), PreviewError> {
        loop {
            if self.step()? == LoopControl::Quit {
                return Ok(());
            }
        }
    }

    fn step(&mut self) -> Result<LoopControl, PreviewError> {
        let timeout = self.grab_timeout;
        let Some(camera) = self.cameras.get_mut(self.ring.current()) else {
            return Err(PreviewError::NoCameras);
        };
        let address = camera.address;

        match grab(camera, timeout) {
            Ok(image) => {
                self.window.show(&image)?;
                self.consecutive_failures = 0;
                self.stats.frames_displayed += 1;
            }
            Err(failure) => self.record_failure(address, failure)?,
        }

        match self.window.poll_key()? {
            Some(Key::Quit) => return Ok(LoopControl::Quit),
            Some(Key::Next) => {
                self.switch(CameraRing::advance);
            }
            Some(Key::Previous) => {
                self.switch(CameraRing::retreat);
            }
            None => {}
        }
        Ok(LoopControl::Continue)
    }

    fn record_failure(
        &mut self,
        address: Ipv4Addr,
        failure: GrabFailure,
    ) -> Result<(), PreviewError> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if let GrabFailure::Camera(CameraError::Timeout(timeout)) = &failure {
            self.stats.timeouts += 1;
            warn!(camera = %address, ?timeout, "grab timed out");
        } else {
            self.stats.grab_failures += 1;
            warn!(camera = %address, error = %failure, "grab failed");
        }

        if self.max_grab_failures != 0 && self.consecutive_failures >= self.max_grab_failures {
            error!(
                camera = %address,
                failures = self.consecutive_failures,
                "too many consecutive grab failures"
            );
            return Err(PreviewError::GrabFailed {
                address,
                failures: self.consecutive_failures,
                last: failure,
            });
        }
        Ok(())
    }

    fn switch(&mut self, step: fn(&mut CameraRing) -> usize) {
        if let Some(camera) = self.cameras.get_mut(self.ring.current()) {
            release(camera);
        }
        let index = step(&mut self.ring);
        self.consecutive_failures = 0;
        self.stats.switches += 1;
        if let Some(camera) = self.cameras.get(index) {
            info!(camera = %camera.address, index, "switched camera");
        }
    }

    fn shutdown(&mut self) -> Result<(), PreviewError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        for camera in &mut self.cameras {
            release(camera);
        }
        self.window.close()?;
        info!("exiting");
        Ok(())
    }
}

impl<D: CameraDevice, W: PreviewWindow> Drop for PreviewSession<D, W> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "cleanup failed");
        }
    }
}

fn grab<D: CameraDevice>(
    camera: &mut Camera<D>,
    timeout: Duration,
) -> Result<RgbImage, GrabFailure> {
    if !camera.device.is_open() {
        camera.device.open()?;
        debug!(camera = %camera.address, "reopened device");
    }
    if !camera.device.is_grabbing() {
        camera.device.start_grabbing()?;
        debug!(camera = %camera.address, "started grabbing");
    }
    let frame = camera.device.retrieve_frame(timeout)?;
    Ok(camera.converter.render(&frame)?)
}

/// Stop and close a camera if it is open. Errors are logged.
fn release<D: CameraDevice>(camera: &mut Camera<D>) {
    if !camera.device.is_open() {
        return;
    }
    if let Err(err) = camera.device.stop_grabbing() {
        warn!(camera = %camera.address, error = %err, "failed to stop grabbing");
    }
    if let Err(err) = camera.device.close() {
        warn!(camera = %camera.address, error = %err, "failed to close device");
    }
}

/// Discover cameras, open the window and run the preview until quit.
///
/// `open_window` is only called once at least one camera has been found. If
/// it fails, the discovered cameras are closed before the error is returned.
pub fn run_preview<T, W, F>(
    transport: &T,
    config: &PreviewConfig,
    open_window: F,
) -> Result<PreviewStats, PreviewError>
where
    T: TransportLayer,
    W: PreviewWindow,
    F: FnOnce(&PreviewConfig) -> Result<W, DisplayError>,
{
    config.validate()?;
    let mut cameras = discover(transport, config)?;

    let window = match open_window(config) {
        Ok(window) => window,
        Err(err) => {
            for camera in &mut cameras {
                release(camera);
            }
            return Err(err.into());
        }
    };

    PreviewSession::new(cameras, window, config)?.run()
}
