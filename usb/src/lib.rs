use std::time::Duration;

pub use rusb;
pub mod acquisition;
pub mod capabilities;
pub mod connection;
pub mod device;
pub mod error;
pub mod registry;
pub mod session;
pub mod transfer;

mod event_loop;

pub use acquisition::StopHandle;
pub use device::base::DeviceId;
pub use error::DriverError;
pub use event_loop::TickStatus;
pub use registry::{DeviceRecord, VictorDriver};

pub const VID_VICTOR: u16 = 0x1244;
pub const PID_VICTOR_DMM: u16 = 0xd237;
pub const VENDOR_NAME: &str = "Victor";

pub const INTERFACE: u8 = 0;
// Endpoint 1, IN direction.
pub const ENDPOINT_IN: u8 = 0x81;

/// Every report from the meter is exactly this long, anything shorter is noise.
pub const PACKET_SIZE: usize = 14;

/// Each read gets this long before it's restarted. The meter only reports about once a second
/// no matter how often it's asked, but we want to keep step with the event loop below.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(100);

/// How often the host should tick us, this bounds how long a stop takes to be noticed.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
