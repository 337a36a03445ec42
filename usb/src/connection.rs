use crate::device::base::{UsbBackend, UsbHandle};
use crate::error::DriverError;
use crate::registry::DeviceInstance;
use crate::session::ReadinessSource;
use crate::transfer::{Completion, PendingTransfer};
use crate::INTERFACE;
use log::{debug, info, warn};
use victor_types::DeviceStatus;

/// An open, claimed handle. Dropping it without `release` still closes the handle, but leaves
/// the interface release to the OS.
pub struct Connection<H: UsbHandle> {
    handle: H,
}

impl<H: UsbHandle> Connection<H> {
    fn establish(mut handle: H) -> Result<Self, DriverError> {
        // The meter reports as HID class, so the kernel will usually have claimed it.
        if handle.kernel_driver_active(INTERFACE).unwrap_or(false) {
            debug!("Detaching kernel driver from interface {}", INTERFACE);
            handle
                .detach_kernel_driver(INTERFACE)
                .map_err(DriverError::AccessDenied)?;
        }

        handle
            .claim_interface(INTERFACE)
            .map_err(DriverError::AccessDenied)?;

        Ok(Self { handle })
    }

    fn release(mut self) {
        if let Err(e) = self.handle.release_interface(INTERFACE) {
            warn!("Failed to release interface {}: {}", INTERFACE, e);
        }
    }

    pub(crate) fn submit(&mut self, transfer: PendingTransfer) -> Result<(), rusb::Error> {
        self.handle.submit(transfer)
    }

    pub(crate) fn handle_events(&mut self) -> Vec<Completion> {
        self.handle.handle_events()
    }

    pub(crate) fn cancel(&mut self) -> Option<Completion> {
        self.handle.cancel()
    }

    pub(crate) fn readiness_sources(&self) -> Vec<ReadinessSource> {
        self.handle.readiness_sources()
    }
}

impl<H: UsbHandle> DeviceInstance<H> {
    pub(crate) fn open<B>(&mut self, backend: &B) -> Result<(), DriverError>
    where
        B: UsbBackend<Handle = H>,
    {
        if self.connection.is_some() {
            debug!("[{}] Already open", self.record.id);
            return Ok(());
        }

        let handle = backend.open(self.record.id).map_err(|e| match e {
            rusb::Error::NotFound | rusb::Error::NoDevice => DriverError::NotFound,
            e => DriverError::UsbError(e),
        })?;
        let connection = Connection::establish(handle)?;

        if let Err(status) = self
            .record
            .status
            .transition(DeviceStatus::Inactive, DeviceStatus::Active)
        {
            warn!("[{}] Unexpected status {} while opening", self.record.id, status);
            connection.release();
            return Err(DriverError::AlreadyRunning);
        }
        self.connection = Some(connection);

        info!("[{}] Device opened, interface {} claimed", self.record.id, INTERFACE);
        Ok(())
    }

    /// Releases the interface and closes the handle. Closing twice is fine. A running
    /// acquisition can't outlive its connection, so it's finished off here first.
    pub(crate) fn close(&mut self) {
        if self.acquisition.is_some() {
            self.finish(None);
            return;
        }

        let Some(connection) = self.connection.take() else {
            // Nothing to do.
            return;
        };
        connection.release();
        self.record.status.deactivate();
        debug!("[{}] Device closed", self.record.id);
    }
}
