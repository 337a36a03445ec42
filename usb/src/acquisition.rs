use crate::error::DriverError;
use crate::device::base::UsbHandle;
use crate::registry::DeviceInstance;
use crate::session::{EventMultiplexer, Packet, ReadinessSource, SessionSink, SourceId, FEED_VERSION};
use crate::POLL_INTERVAL;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use victor_types::{AcquisitionLimits, ChannelKind, ConfigValue, DeviceStatus};

/// The status of a device record. It's shared (via clones) between the record, any stop
/// handles and the driver, and only moves along the edges `allowed` lists.
#[derive(Clone, Debug, Default)]
pub struct StatusCell(Arc<AtomicU8>);

impl StatusCell {
    pub fn get(&self) -> DeviceStatus {
        DeviceStatus::from_raw(self.0.load(Ordering::SeqCst)).unwrap_or_default()
    }

    fn allowed(from: DeviceStatus, to: DeviceStatus) -> bool {
        use DeviceStatus::*;
        matches!(
            (from, to),
            (Inactive, Active) | (Active, Stopping) | (Active, Inactive) | (Stopping, Inactive)
        )
    }

    /// Moves from `from` to `to`, failing with the current status if the cell isn't in `from`
    /// or the edge isn't permitted.
    pub(crate) fn transition(&self, from: DeviceStatus, to: DeviceStatus) -> Result<(), DeviceStatus> {
        if !Self::allowed(from, to) {
            return Err(self.get());
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|raw| DeviceStatus::from_raw(raw).unwrap_or_default())
    }

    pub(crate) fn deactivate(&self) {
        if self
            .transition(DeviceStatus::Active, DeviceStatus::Inactive)
            .is_err()
        {
            let _ = self.transition(DeviceStatus::Stopping, DeviceStatus::Inactive);
        }
    }
}

/// Requests a stop from anywhere, including other threads. It only flips the status; the
/// next event loop tick does the actual teardown.
#[derive(Clone, Debug)]
pub struct StopHandle {
    status: StatusCell,
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) -> Result<(), DriverError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(DriverError::NotRunning);
        }
        self.status
            .transition(DeviceStatus::Active, DeviceStatus::Stopping)
            .map_err(|_| DriverError::NotRunning)?;
        debug!("Acquisition stop requested");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct AcquisitionCounters {
    pub samples: u64,
    pub started: Instant,
    pub deadline: Option<Instant>,
}

impl AcquisitionCounters {
    fn new(limits: &AcquisitionLimits, now: Instant) -> Self {
        Self {
            samples: 0,
            started: now,
            deadline: limits.time_budget.map(|budget| now + budget),
        }
    }
}

pub(crate) struct Acquisition {
    pub(crate) counters: AcquisitionCounters,
    pub(crate) sources: Vec<SourceId>,
    sink: Box<dyn SessionSink>,
    stop: StopHandle,
}

impl Acquisition {
    fn new(limits: &AcquisitionLimits, sink: Box<dyn SessionSink>, status: StatusCell) -> Self {
        Self {
            counters: AcquisitionCounters::new(limits, Instant::now()),
            sources: Vec::new(),
            sink,
            stop: StopHandle {
                status,
                running: Arc::new(AtomicBool::new(true)),
            },
        }
    }

    pub(crate) fn send(&mut self, packet: Packet) {
        self.sink.send(packet);
    }

    pub(crate) fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub(crate) fn deadline_passed(&self, now: Instant) -> bool {
        matches!(self.counters.deadline, Some(deadline) if now > deadline)
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        self.stop.running.store(false, Ordering::SeqCst);
    }
}

impl<H: UsbHandle> DeviceInstance<H> {
    pub(crate) fn start(
        &mut self,
        limits: AcquisitionLimits,
        sink: Box<dyn SessionSink>,
        mux: &mut dyn EventMultiplexer,
    ) -> Result<(), DriverError> {
        if self.acquisition.is_some() {
            return Err(DriverError::AlreadyRunning);
        }
        if self.record.status() != DeviceStatus::Active {
            return Err(DriverError::Inactive);
        }
        let id = self.record.id;
        let channels = self.record.channels.len();
        let Some(connection) = self.connection.as_mut() else {
            return Err(DriverError::Inactive);
        };

        let limits = limits.normalized();
        info!("[{}] Starting acquisition, limits: {:?}", id, limits);
        self.limits = limits;
        let mut acquisition = Acquisition::new(&self.limits, sink, self.record.status.clone());

        debug!("[{}] Sending header", id);
        acquisition.send(Packet::Header {
            feed_version: FEED_VERSION,
        });
        acquisition.send(Packet::MetaAnalog {
            channels,
            kind: ChannelKind::Analog,
        });

        if let Err(e) = connection.submit(self.tracker.allocate()) {
            error!("[{}] Unable to submit transfer: {}", id, e);
            acquisition.send(Packet::End);
            return Err(e.into());
        }

        for source in connection.readiness_sources() {
            mux.add_source(
                ReadinessSource {
                    interval: POLL_INTERVAL,
                    ..source
                },
                id,
            );
            acquisition.sources.push(source.id);
        }

        self.acquisition = Some(acquisition);
        Ok(())
    }

    pub(crate) fn stop_handle(&self) -> Option<StopHandle> {
        self.acquisition.as_ref().map(Acquisition::stop_handle)
    }

    pub(crate) fn request_stop(&self) -> Result<(), DriverError> {
        match &self.acquisition {
            Some(acquisition) => acquisition.stop.request_stop(),
            None => Err(DriverError::NotRunning),
        }
    }

    pub(crate) fn config_set(&mut self, value: ConfigValue) -> Result<(), DriverError> {
        if self.record.status() != DeviceStatus::Active {
            error!("[{}] Device inactive, can't set config options", self.record.id);
            return Err(DriverError::Inactive);
        }

        self.limits.apply(value);
        match value {
            ConfigValue::LimitMsec(ms) => {
                debug!("[{}] Setting time limit to {}ms", self.record.id, ms);
                if let Some(acquisition) = self.acquisition.as_mut() {
                    acquisition.counters.deadline =
                        self.limits.time_budget.map(|budget| Instant::now() + budget);
                }
            }
            ConfigValue::LimitSamples(count) => {
                debug!("[{}] Setting sample limit to {}", self.record.id, count);
            }
        }
        Ok(())
    }

    pub(crate) fn check_deadline(&self, now: Instant) {
        let Some(acquisition) = &self.acquisition else {
            return;
        };
        if acquisition.deadline_passed(now) && self.record.status() == DeviceStatus::Active {
            info!("[{}] Time limit reached", self.record.id);
            let _ = acquisition.stop.request_stop();
        }
    }

    pub(crate) fn sample_limit_reached(&self) -> bool {
        match (&self.acquisition, self.limits.sample_budget) {
            (Some(acquisition), Some(budget)) => acquisition.counters.samples >= budget,
            _ => false,
        }
    }
}
