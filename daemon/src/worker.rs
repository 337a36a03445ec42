use crate::multiplexer::SourceTable;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use tokio::time::{sleep_until, Instant};
use tokio::{select, signal, task};
use victor_usb::device::base::UsbBackend;
use victor_usb::{DeviceId, StopHandle, TickStatus, VictorDriver};

/// Drives the driver's event loop until every acquisition registered in `sources` has finished.
/// The first Ctrl+C asks the acquisition to stop, it then winds down on its next tick.
pub async fn run_acquisition<B: UsbBackend>(
    driver: &mut VictorDriver<B>,
    device: DeviceId,
    mut sources: SourceTable,
) -> Result<()> {
    let stop: StopHandle = driver
        .stop_handle(device)
        .context("Acquisition is not running")?;

    // Nothing would ever tick the device, leaving the acquisition running.
    if sources.is_empty() {
        bail!("{}: No event sources registered", device);
    }

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    while let Some(next_due) = sources.next_due() {
        select! {
            _ = sleep_until(next_due) => {
                for id in sources.due(Instant::now()) {
                    // The tick may block on a USB read for up to a transfer timeout.
                    let status = task::block_in_place(|| driver.on_event_loop_tick(id, &mut sources))?;
                    if status == TickStatus::Finished {
                        debug!("{}: Event loop finished", id);
                        sources.remove_device(id);
                    }
                }
            }
            result = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                result.context("Unable to listen for Ctrl+C")?;
                info!("Stop requested, finishing acquisition..");
                if let Err(e) = stop.request_stop() {
                    warn!("Unable to stop acquisition: {}", e);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{print_packets, ChannelSink};
    use enumset::EnumSet;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use victor_types::AcquisitionLimits;
    use victor_usb::device::base::{UsbDeviceInfo, UsbHandle};
    use victor_usb::session::{Interest, ReadinessSource, SourceId};
    use victor_usb::transfer::{Completion, PendingTransfer, TransferOutcome};
    use victor_usb::{rusb, PID_VICTOR_DMM, VID_VICTOR};

    // A meter which answers every read with a full report.
    struct ChattyMeter;

    struct ChattyHandle {
        pending: Option<PendingTransfer>,
    }

    impl UsbBackend for ChattyMeter {
        type Handle = ChattyHandle;

        fn devices(&self) -> Result<Vec<Result<UsbDeviceInfo, rusb::Error>>, rusb::Error> {
            Ok(vec![Ok(UsbDeviceInfo {
                id: DeviceId::new(1, 1),
                vendor_id: VID_VICTOR,
                product_id: PID_VICTOR_DMM,
            })])
        }

        fn open(&self, _id: DeviceId) -> Result<Self::Handle, rusb::Error> {
            Ok(ChattyHandle { pending: None })
        }
    }

    impl UsbHandle for ChattyHandle {
        fn kernel_driver_active(&self, _interface: u8) -> Result<bool, rusb::Error> {
            Ok(false)
        }

        fn detach_kernel_driver(&mut self, _interface: u8) -> Result<(), rusb::Error> {
            Ok(())
        }

        fn claim_interface(&mut self, _interface: u8) -> Result<(), rusb::Error> {
            Ok(())
        }

        fn release_interface(&mut self, _interface: u8) -> Result<(), rusb::Error> {
            Ok(())
        }

        fn readiness_sources(&self) -> Vec<ReadinessSource> {
            vec![ReadinessSource {
                id: SourceId(1),
                interest: EnumSet::only(Interest::Readable),
                interval: Duration::from_millis(10),
            }]
        }

        fn submit(&mut self, transfer: PendingTransfer) -> Result<(), rusb::Error> {
            self.pending = Some(transfer);
            Ok(())
        }

        fn handle_events(&mut self) -> Vec<Completion> {
            self.pending
                .take()
                .map(|mut transfer| {
                    transfer.buffer_mut().fill(0x42);
                    transfer.set_actual_length(victor_usb::PACKET_SIZE);
                    Completion {
                        transfer,
                        outcome: TransferOutcome::Completed,
                    }
                })
                .into_iter()
                .collect()
        }

        fn cancel(&mut self) -> Option<Completion> {
            self.pending.take().map(|transfer| Completion {
                transfer,
                outcome: TransferOutcome::Cancelled,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_until_the_sample_limit() {
        let mut driver = VictorDriver::new(ChattyMeter);
        let id = driver.scan().unwrap()[0].id;
        driver.open(id).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_packets(id, rx));

        let mut sources = SourceTable::default();
        driver
            .start(
                id,
                AcquisitionLimits::samples(3),
                Box::new(ChannelSink::new(tx)),
                &mut sources,
            )
            .unwrap();

        tokio::time::timeout(
            Duration::from_secs(5),
            run_acquisition(&mut driver, id, sources),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(printer.await.unwrap(), 3);
        assert_eq!(driver.outstanding_transfers(id).unwrap(), 0);
        assert_eq!(driver.devices().unwrap()[0].status(), victor_types::DeviceStatus::Inactive);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refuses_to_run_without_event_sources() {
        let mut driver = VictorDriver::new(ChattyMeter);
        let id = driver.scan().unwrap()[0].id;
        driver.open(id).unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registered = SourceTable::default();
        driver
            .start(
                id,
                AcquisitionLimits::unlimited(),
                Box::new(ChannelSink::new(tx)),
                &mut registered,
            )
            .unwrap();
        assert!(!registered.is_empty());

        assert!(run_acquisition(&mut driver, id, SourceTable::default())
            .await
            .is_err());
        assert!(driver.stop_handle(id).unwrap().is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refuses_to_run_without_an_acquisition() {
        let mut driver = VictorDriver::new(ChattyMeter);
        let id = driver.scan().unwrap()[0].id;
        assert!(run_acquisition(&mut driver, id, SourceTable::default())
            .await
            .is_err());
    }
}
