use crate::device::base::DeviceId;

#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("Driver was not initialized")]
    NotInitialized,

    #[error("No device registered as {0}")]
    UnknownDevice(DeviceId),

    #[error("Device not found")]
    NotFound,

    #[error("Unable to detach kernel driver or claim interface: {0}")]
    AccessDenied(rusb::Error),

    #[error("Device inactive, open it first")]
    Inactive,

    #[error("Acquisition already running")]
    AlreadyRunning,

    #[error("Device not active, can't stop acquisition")]
    NotRunning,

    #[error("Unable to resubmit transfer: {0}")]
    ResubmissionFailed(rusb::Error),

    #[error("USB error: {0}")]
    UsbError(#[from] rusb::Error),
}
