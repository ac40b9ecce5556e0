//! Camera discovery: enumerate, filter to network devices, open and configure.

use std::net::Ipv4Addr;

use tracing::{debug, info, warn};

use crate::config::{configure_camera, PreviewConfig};
use crate::convert::FrameConverter;
use crate::preview::PreviewError;
use crate::traits::{CameraDevice, TransportLayer};

/// An opened, configured camera ready for preview.
pub struct Camera<D> {
    /// Device handle.
    pub device: D,
    /// Conversion settings for this camera's frames.
    pub converter: FrameConverter,
    /// Network address the device was discovered at.
    pub address: Ipv4Addr,
}

/// Find every GigE Vision camera, open it and apply `config`.
///
/// Devices without a network address are skipped, as are devices that fail
/// to open. Returns [`PreviewError::NoCameras`] when nothing qualifies.
pub fn discover<'t, T: TransportLayer>(
    transport: &'t T,
    config: &PreviewConfig,
) -> Result<Vec<Camera<T::Device<'t>>>, PreviewError> {
    let devices = transport.enumerate()?;
    debug!(count = devices.len(), "enumerated devices");

    let mut cameras = Vec::with_capacity(devices.len());
    for info in devices {
        let Some(address) = info.ip_address else {
            debug!(device = %info, "skipping device without network address");
            continue;
        };

        let mut device = match transport.create_device(&info) {
            Ok(device) => device,
            Err(err) => {
                warn!(device = %info, error = %err, "failed to create device");
                continue;
            }
        };
        if let Err(err) = device.open() {
            warn!(device = %info, error = %err, "failed to open device");
            continue;
        }

        configure_camera(&mut device, config);
        cameras.push(Camera {
            device,
            converter: FrameConverter::new(config.scale),
            address,
        });
    }

    if cameras.is_empty() {
        return Err(PreviewError::NoCameras);
    }

    let addresses: Vec<String> = cameras.iter().map(|cam| cam.address.to_string()).collect();
    info!(cameras = ?addresses, "found cameras");
    Ok(cameras)
}
