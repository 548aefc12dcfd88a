//! Compute device selection.

use crate::error::{Result, SentimentError};
use candle_core::Device;

/// Which compute device to run inference on.
///
/// The default, [`DeviceRequest::Auto`], resolves once at service construction:
/// CUDA when available, CPU otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub enum DeviceRequest {
    /// Pick CUDA when available, CPU otherwise.
    #[default]
    Auto,
    /// Force CPU inference.
    Cpu,
    /// Use a specific CUDA GPU.
    Cuda(usize),
}

impl DeviceRequest {
    /// Resolve the request into a concrete device.
    pub fn resolve(self) -> Result<Device> {
        match self {
            DeviceRequest::Auto => {
                if candle_core::utils::cuda_is_available() {
                    DeviceRequest::Cuda(0).resolve()
                } else {
                    Ok(Device::Cpu)
                }
            }
            DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Cuda(index) => Device::new_cuda(index).map_err(|e| {
                SentimentError::Device(format!(
                    "Failed to init CUDA device {index}: {e}. Try CPU as fallback."
                ))
            }),
        }
    }
}

/// Short device name for logs and reports.
pub(crate) fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
