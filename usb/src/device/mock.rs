// A scripted stand-in for libusb. Tests plug devices into the bus, queue up what each read
// should return, and then inspect what the driver did to the device.
use crate::device::base::{DeviceId, UsbBackend, UsbDeviceInfo, UsbHandle};
use crate::session::{
    EventMultiplexer, Interest, Packet, ReadinessSource, SessionSink, SourceId,
};
use crate::transfer::{Completion, Payload, PendingTransfer, TransferOutcome};
use crate::{PACKET_SIZE, PID_VICTOR_DMM, POLL_INTERVAL, VID_VICTOR};
use enumset::enum_set;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Copy, Clone, Debug)]
pub enum MockRead {
    Full(Payload),
    Short(usize),
    Timeout,
    Gone,
    Error(rusb::Error),
}

#[derive(Debug, Default)]
pub struct MockDeviceState {
    pub kernel_driver_active: bool,
    pub fail_detach: bool,
    pub fail_claim: bool,
    pub claimed: bool,
    pub open_handles: usize,
    pub releases: usize,
    pub submissions: usize,
    pub fail_submit: bool,
    pub in_flight: bool,
    pub reads: VecDeque<MockRead>,
}

#[derive(Clone)]
pub struct MockDevice {
    pub info: Result<UsbDeviceInfo, rusb::Error>,
    pub state: Arc<Mutex<MockDeviceState>>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    devices: Arc<Mutex<Vec<MockDevice>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plug(&self, bus_number: u8, address: u8, vendor_id: u16, product_id: u16) -> MockState {
        let state = Arc::new(Mutex::new(MockDeviceState::default()));
        self.devices.lock().unwrap().push(MockDevice {
            info: Ok(UsbDeviceInfo {
                id: DeviceId::new(bus_number, address),
                vendor_id,
                product_id,
            }),
            state: state.clone(),
        });
        MockState(state)
    }

    pub fn plug_victor(&self, bus_number: u8, address: u8) -> MockState {
        self.plug(bus_number, address, VID_VICTOR, PID_VICTOR_DMM)
    }

    pub fn plug_broken(&self) {
        self.devices.lock().unwrap().push(MockDevice {
            info: Err(rusb::Error::Io),
            state: Arc::default(),
        });
    }

    pub fn unplug(&self, id: DeviceId) {
        self.devices
            .lock()
            .unwrap()
            .retain(|device| !matches!(device.info, Ok(info) if info.id == id));
    }
}

impl UsbBackend for MockBackend {
    type Handle = MockHandle;

    fn devices(&self) -> Result<Vec<Result<UsbDeviceInfo, rusb::Error>>, rusb::Error> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .map(|device| device.info)
            .collect())
    }

    fn open(&self, id: DeviceId) -> Result<Self::Handle, rusb::Error> {
        let devices = self.devices.lock().unwrap();
        let device = devices
            .iter()
            .find(|device| matches!(device.info, Ok(info) if info.id == id))
            .ok_or(rusb::Error::NotFound)?;

        device.state.lock().unwrap().open_handles += 1;
        Ok(MockHandle {
            id,
            state: device.state.clone(),
            pending: None,
        })
    }
}

/// Test-side view of a plugged device.
#[derive(Clone)]
pub struct MockState(Arc<Mutex<MockDeviceState>>);

impl MockState {
    pub fn lock(&self) -> MutexGuard<'_, MockDeviceState> {
        self.0.lock().unwrap()
    }

    pub fn queue(&self, read: MockRead) {
        self.lock().reads.push_back(read);
    }
}

pub struct MockHandle {
    id: DeviceId,
    state: Arc<Mutex<MockDeviceState>>,
    pending: Option<PendingTransfer>,
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.open_handles -= 1;
        state.in_flight = false;
    }
}

impl UsbHandle for MockHandle {
    fn kernel_driver_active(&self, _interface: u8) -> Result<bool, rusb::Error> {
        Ok(self.state.lock().unwrap().kernel_driver_active)
    }

    fn detach_kernel_driver(&mut self, _interface: u8) -> Result<(), rusb::Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_detach {
            return Err(rusb::Error::Access);
        }
        state.kernel_driver_active = false;
        Ok(())
    }

    fn claim_interface(&mut self, _interface: u8) -> Result<(), rusb::Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_claim || state.kernel_driver_active {
            return Err(rusb::Error::Busy);
        }
        state.claimed = true;
        Ok(())
    }

    fn release_interface(&mut self, _interface: u8) -> Result<(), rusb::Error> {
        let mut state = self.state.lock().unwrap();
        state.claimed = false;
        state.releases += 1;
        Ok(())
    }

    fn readiness_sources(&self) -> Vec<ReadinessSource> {
        let base = i32::from(self.id.address) * 10;
        [base, base + 1]
            .into_iter()
            .map(|fd| ReadinessSource {
                id: SourceId(fd),
                interest: enum_set!(Interest::Readable),
                interval: POLL_INTERVAL,
            })
            .collect()
    }

    fn submit(&mut self, transfer: PendingTransfer) -> Result<(), rusb::Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_submit || self.pending.is_some() {
            return Err(rusb::Error::Io);
        }
        state.submissions += 1;
        state.in_flight = true;
        self.pending = Some(transfer);
        Ok(())
    }

    fn handle_events(&mut self) -> Vec<Completion> {
        let mut state = self.state.lock().unwrap();
        if self.pending.is_none() {
            return Vec::new();
        }
        let Some(read) = state.reads.pop_front() else {
            return Vec::new();
        };
        let Some(mut transfer) = self.pending.take() else {
            return Vec::new();
        };
        state.in_flight = false;

        let outcome = match read {
            MockRead::Full(payload) => {
                transfer.buffer_mut().copy_from_slice(&payload);
                transfer.set_actual_length(PACKET_SIZE);
                TransferOutcome::Completed
            }
            MockRead::Short(length) => {
                transfer.set_actual_length(length);
                TransferOutcome::Completed
            }
            MockRead::Timeout => TransferOutcome::TimedOut,
            MockRead::Gone => TransferOutcome::DeviceGone,
            MockRead::Error(error) => TransferOutcome::from_usb_error(error),
        };
        vec![Completion { transfer, outcome }]
    }

    fn cancel(&mut self) -> Option<Completion> {
        let transfer = self.pending.take()?;
        self.state.lock().unwrap().in_flight = false;
        Some(Completion {
            transfer,
            outcome: TransferOutcome::Cancelled,
        })
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    packets: Arc<Mutex<Vec<Packet>>>,
}

impl RecordingSink {
    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().unwrap().clone()
    }

    pub fn count(&self, wanted: &Packet) -> usize {
        self.packets().iter().filter(|p| *p == wanted).count()
    }

    pub fn samples(&self) -> usize {
        self.packets()
            .iter()
            .filter(|p| matches!(p, Packet::Analog(_)))
            .count()
    }
}

impl SessionSink for RecordingSink {
    fn send(&mut self, packet: Packet) {
        self.packets.lock().unwrap().push(packet);
    }
}

#[derive(Default)]
pub struct RecordingMux {
    pub sources: Vec<(ReadinessSource, DeviceId)>,
    pub removed: Vec<SourceId>,
}

impl EventMultiplexer for RecordingMux {
    fn add_source(&mut self, source: ReadinessSource, device: DeviceId) {
        self.sources.push((source, device));
    }

    fn remove_source(&mut self, id: SourceId) {
        self.sources.retain(|(source, _)| source.id != id);
        self.removed.push(id);
    }
}

pub fn payload(seed: u8) -> Payload {
    let mut payload = [0; PACKET_SIZE];
    for (index, byte) in payload.iter_mut().enumerate() {
        *byte = seed.wrapping_add(index as u8);
    }
    payload
}
