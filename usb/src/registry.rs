use crate::acquisition::{Acquisition, AcquisitionCounters, StatusCell, StopHandle};
use crate::capabilities::{Channel, DriverInfo, DRIVER_INFO};
use crate::connection::Connection;
use crate::device::base::{DeviceId, UsbBackend, UsbHandle};
use crate::error::DriverError;
use crate::event_loop::TickStatus;
use crate::session::{EventMultiplexer, SessionSink};
use crate::transfer::TransferTracker;
use crate::VENDOR_NAME;
use log::{debug, error, info, warn};
use victor_types::{AcquisitionLimits, ConfigValue, DeviceStatus};

/// One discovered meter. Clones share the status, so a record held by a caller always shows
/// the live state of the device.
#[derive(Clone, Debug)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub vendor: &'static str,
    pub channels: Vec<Channel>,
    pub(crate) status: StatusCell,
}

impl DeviceRecord {
    fn new(id: DeviceId) -> Self {
        Self {
            id,
            vendor: VENDOR_NAME,
            channels: Channel::defaults(),
            status: StatusCell::default(),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }
}

pub(crate) struct DeviceInstance<H: UsbHandle> {
    pub(crate) record: DeviceRecord,
    pub(crate) connection: Option<Connection<H>>,
    pub(crate) limits: AcquisitionLimits,
    pub(crate) acquisition: Option<Acquisition>,
    pub(crate) tracker: TransferTracker,
}

impl<H: UsbHandle> DeviceInstance<H> {
    fn new(id: DeviceId) -> Self {
        Self {
            record: DeviceRecord::new(id),
            connection: None,
            limits: AcquisitionLimits::default(),
            acquisition: None,
            tracker: TransferTracker::new(),
        }
    }
}

struct DriverContext<H: UsbHandle> {
    instances: Vec<DeviceInstance<H>>,
}

impl<H: UsbHandle> DriverContext<H> {
    fn instance(&self, id: DeviceId) -> Result<&DeviceInstance<H>, DriverError> {
        self.instances
            .iter()
            .find(|instance| instance.record.id == id)
            .ok_or(DriverError::UnknownDevice(id))
    }

    fn instance_mut(&mut self, id: DeviceId) -> Result<&mut DeviceInstance<H>, DriverError> {
        self.instances
            .iter_mut()
            .find(|instance| instance.record.id == id)
            .ok_or(DriverError::UnknownDevice(id))
    }

    // Properly close and free all devices.
    fn clear(&mut self) {
        for instance in self.instances.iter_mut() {
            instance.close();
        }
        self.instances.clear();
    }
}

/// The driver and the set of devices it knows about. Everything the driver does goes through
/// this object; `cleanup` / `init` bracket its usable lifetime.
pub struct VictorDriver<B: UsbBackend> {
    backend: B,
    context: Option<DriverContext<B::Handle>>,
}

impl<B: UsbBackend> VictorDriver<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            context: Some(DriverContext {
                instances: Vec::new(),
            }),
        }
    }

    pub fn info() -> DriverInfo {
        DRIVER_INFO
    }

    pub fn init(&mut self) {
        if self.context.is_none() {
            self.context = Some(DriverContext {
                instances: Vec::new(),
            });
        }
    }

    pub fn cleanup(&mut self) {
        // Can get called on an unused driver, doesn't matter.
        if let Some(mut context) = self.context.take() {
            context.clear();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    fn context(&self) -> Result<&DriverContext<B::Handle>, DriverError> {
        self.context.as_ref().ok_or_else(|| {
            error!("Driver was not initialized.");
            DriverError::NotInitialized
        })
    }

    fn context_mut(&mut self) -> Result<&mut DriverContext<B::Handle>, DriverError> {
        self.context.as_mut().ok_or_else(|| {
            error!("Driver was not initialized.");
            DriverError::NotInitialized
        })
    }

    /// Rebuilds the device set from what's on the bus right now. Any previously known device,
    /// including an open one, is closed and forgotten first.
    pub fn scan(&mut self) -> Result<Vec<DeviceRecord>, DriverError> {
        let context = self.context.as_mut().ok_or(DriverError::NotInitialized)?;

        // USB scan is always authoritative.
        context.clear();

        for entry in self.backend.devices()? {
            match entry {
                Ok(device) if device.is_victor() => {
                    debug!("Found Victor device at {}", device.id);
                    context.instances.push(DeviceInstance::new(device.id));
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to get device descriptor: {}", e),
            }
        }

        info!("Scan found {} Victor device(s)", context.instances.len());
        Ok(context
            .instances
            .iter()
            .map(|instance| instance.record.clone())
            .collect())
    }

    pub fn devices(&self) -> Result<Vec<DeviceRecord>, DriverError> {
        Ok(self
            .context()?
            .instances
            .iter()
            .map(|instance| instance.record.clone())
            .collect())
    }

    pub fn teardown(&mut self) {
        if let Some(context) = self.context.as_mut() {
            context.clear();
        }
    }

    pub fn open(&mut self, id: DeviceId) -> Result<(), DriverError> {
        let context = self.context.as_mut().ok_or(DriverError::NotInitialized)?;
        context.instance_mut(id)?.open(&self.backend)
    }

    pub fn close(&mut self, id: DeviceId) -> Result<(), DriverError> {
        self.context_mut()?.instance_mut(id)?.close();
        Ok(())
    }

    pub fn config_set(&mut self, id: DeviceId, value: ConfigValue) -> Result<(), DriverError> {
        self.context_mut()?.instance_mut(id)?.config_set(value)
    }

    pub fn start(
        &mut self,
        id: DeviceId,
        limits: AcquisitionLimits,
        sink: Box<dyn SessionSink>,
        mux: &mut dyn EventMultiplexer,
    ) -> Result<(), DriverError> {
        self.context_mut()?
            .instance_mut(id)?
            .start(limits, sink, mux)
    }

    pub fn request_stop(&self, id: DeviceId) -> Result<(), DriverError> {
        self.context()?.instance(id)?.request_stop()
    }

    pub fn stop_handle(&self, id: DeviceId) -> Result<StopHandle, DriverError> {
        self.context()?
            .instance(id)?
            .stop_handle()
            .ok_or(DriverError::NotRunning)
    }

    /// Called by the host for every readiness event on a source registered for `id`.
    pub fn on_event_loop_tick(
        &mut self,
        id: DeviceId,
        mux: &mut dyn EventMultiplexer,
    ) -> Result<TickStatus, DriverError> {
        Ok(self.context_mut()?.instance_mut(id)?.on_tick(mux))
    }

    pub fn counters(&self, id: DeviceId) -> Result<Option<AcquisitionCounters>, DriverError> {
        Ok(self
            .context()?
            .instance(id)?
            .acquisition
            .as_ref()
            .map(|acquisition| acquisition.counters))
    }

    pub fn limits(&self, id: DeviceId) -> Result<AcquisitionLimits, DriverError> {
        Ok(self.context()?.instance(id)?.limits)
    }

    /// How many transfers allocated for this device are still alive. Zero whenever the
    /// device isn't acquiring, one while it is.
    pub fn outstanding_transfers(&self, id: DeviceId) -> Result<usize, DriverError> {
        Ok(self.context()?.instance(id)?.tracker.outstanding())
    }
}

impl<B: UsbBackend> Drop for VictorDriver<B> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
