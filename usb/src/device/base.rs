use crate::session::ReadinessSource;
use crate::transfer::{Completion, PendingTransfer};
use crate::{PID_VICTOR_DMM, VID_VICTOR};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Where a device lives on the bus. This is all we keep between a scan and an open.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    pub bus_number: u8,
    pub address: u8,
}

impl DeviceId {
    pub fn new(bus_number: u8, address: u8) -> Self {
        Self {
            bus_number,
            address,
        }
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}:{:03}", self.bus_number, self.address)
    }
}

/// Parses `bus:address`, as printed by `Display` (and by lsusb).
impl FromStr for DeviceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bus, address) = s
            .split_once(':')
            .ok_or_else(|| format!("Expected bus:address, got '{}'", s))?;
        let bus_number = bus
            .trim()
            .parse()
            .map_err(|e| format!("Invalid bus number '{}': {}", bus, e))?;
        let address = address
            .trim()
            .parse()
            .map_err(|e| format!("Invalid address '{}': {}", address, e))?;
        Ok(DeviceId::new(bus_number, address))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub id: DeviceId,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbDeviceInfo {
    pub fn is_victor(&self) -> bool {
        self.vendor_id == VID_VICTOR && self.product_id == PID_VICTOR_DMM
    }
}

/// Enumerates and opens devices. Descriptor failures for a single device are reported
/// per-entry so the scan can skip it and carry on.
pub trait UsbBackend {
    type Handle: UsbHandle;

    fn devices(&self) -> Result<Vec<Result<UsbDeviceInfo, rusb::Error>>, rusb::Error>;

    /// Opens the device at `id`, returning `rusb::Error::NotFound` if it's no longer there.
    fn open(&self, id: DeviceId) -> Result<Self::Handle, rusb::Error>;
}

pub trait UsbHandle: Send {
    fn kernel_driver_active(&self, interface: u8) -> Result<bool, rusb::Error>;
    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), rusb::Error>;
    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;
    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;

    /// The handles the host needs to watch to know when completions can be dispatched.
    fn readiness_sources(&self) -> Vec<ReadinessSource>;

    /// Hands a transfer to the USB subsystem. On failure the transfer is dropped here.
    fn submit(&mut self, transfer: PendingTransfer) -> Result<(), rusb::Error>;

    /// Returns every transfer which has reached a terminal state since the last call.
    fn handle_events(&mut self) -> Vec<Completion>;

    /// Pulls back a transfer which hasn't completed yet, if there is one.
    fn cancel(&mut self) -> Option<Completion>;
}
