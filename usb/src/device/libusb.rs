use crate::device::base::{DeviceId, UsbBackend, UsbDeviceInfo, UsbHandle};
use crate::session::{Interest, ReadinessSource, SourceId};
use crate::transfer::{Completion, PendingTransfer, TransferOutcome};
use crate::POLL_INTERVAL;
use enumset::enum_set;
use log::{debug, info};
use rusb::{Device, DeviceHandle, GlobalContext, UsbContext};

pub struct LibUsb<T: UsbContext> {
    context: T,
}

impl LibUsb<GlobalContext> {
    pub fn global() -> Self {
        Self {
            context: GlobalContext::default(),
        }
    }
}

impl<T: UsbContext> LibUsb<T> {
    pub fn new(context: T) -> Self {
        Self { context }
    }

    fn find_device(&self, id: DeviceId) -> Result<Device<T>, rusb::Error> {
        for device in self.context.devices()?.iter() {
            if device.bus_number() == id.bus_number && device.address() == id.address {
                return Ok(device);
            }
        }
        Err(rusb::Error::NotFound)
    }
}

impl<T: UsbContext> UsbBackend for LibUsb<T> {
    type Handle = LibUsbHandle<T>;

    fn devices(&self) -> Result<Vec<Result<UsbDeviceInfo, rusb::Error>>, rusb::Error> {
        let devices = self.context.devices()?;
        Ok(devices
            .iter()
            .map(|device| {
                let descriptor = device.device_descriptor()?;
                Ok(UsbDeviceInfo {
                    id: DeviceId::new(device.bus_number(), device.address()),
                    vendor_id: descriptor.vendor_id(),
                    product_id: descriptor.product_id(),
                })
            })
            .collect())
    }

    fn open(&self, id: DeviceId) -> Result<Self::Handle, rusb::Error> {
        let device = self.find_device(id)?;
        let handle = device.open()?;
        info!("Opened Victor device at {:?}", device);

        Ok(LibUsbHandle {
            handle,
            id,
            pending: None,
        })
    }
}

/// rusb doesn't expose libusb's asynchronous transfers, so the submitted read is parked here
/// and performed (with its own short timeout) when the host asks us to handle events.
pub struct LibUsbHandle<T: UsbContext> {
    handle: DeviceHandle<T>,
    id: DeviceId,
    pending: Option<PendingTransfer>,
}

impl<T: UsbContext> UsbHandle for LibUsbHandle<T> {
    fn kernel_driver_active(&self, interface: u8) -> Result<bool, rusb::Error> {
        self.handle.kernel_driver_active(interface)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.handle.detach_kernel_driver(interface)
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.handle.claim_interface(interface)
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.handle.release_interface(interface)
    }

    fn readiness_sources(&self) -> Vec<ReadinessSource> {
        let id = (i32::from(self.id.bus_number) << 8) | i32::from(self.id.address);
        vec![ReadinessSource {
            id: SourceId(id),
            interest: enum_set!(Interest::Readable),
            interval: POLL_INTERVAL,
        }]
    }

    fn submit(&mut self, transfer: PendingTransfer) -> Result<(), rusb::Error> {
        if self.pending.is_some() {
            return Err(rusb::Error::Busy);
        }
        self.pending = Some(transfer);
        Ok(())
    }

    fn handle_events(&mut self) -> Vec<Completion> {
        let Some(mut transfer) = self.pending.take() else {
            return Vec::new();
        };

        let endpoint = transfer.endpoint();
        let timeout = transfer.timeout();
        let outcome = match self
            .handle
            .read_interrupt(endpoint, transfer.buffer_mut(), timeout)
        {
            Ok(length) => {
                transfer.set_actual_length(length);
                TransferOutcome::Completed
            }
            Err(error) => TransferOutcome::from_usb_error(error),
        };

        vec![Completion { transfer, outcome }]
    }

    fn cancel(&mut self) -> Option<Completion> {
        let transfer = self.pending.take()?;
        debug!("Cancelling pending transfer on {}", self.id);
        Some(Completion {
            transfer,
            outcome: TransferOutcome::Cancelled,
        })
    }
}
