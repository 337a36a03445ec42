// The transfer loop. Everything in here runs on whichever thread drives the host's event
// multiplexer, so nothing needs locking; the only cross-thread input is a StopHandle flipping
// the status to Stopping, which we pick up on the next tick.
use crate::device::base::UsbHandle;
use crate::error::DriverError;
use crate::registry::DeviceInstance;
use crate::session::{EventMultiplexer, Packet};
use crate::transfer::{Completion, TransferOutcome};
use log::{debug, info, trace, warn};
use std::time::Instant;
use victor_types::DeviceStatus;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TickStatus {
    /// The acquisition is still going, keep ticking.
    Running,

    /// There's nothing (left) running on this device, any sources for it can go.
    Finished,
}

impl<H: UsbHandle> DeviceInstance<H> {
    pub(crate) fn on_tick(&mut self, mux: &mut dyn EventMultiplexer) -> TickStatus {
        if self.acquisition.is_none() {
            return TickStatus::Finished;
        }

        self.check_deadline(Instant::now());

        if self.record.status() == DeviceStatus::Stopping {
            self.dispatch();
            self.finish(Some(mux));
            return TickStatus::Finished;
        }

        self.dispatch();
        TickStatus::Running
    }

    fn dispatch(&mut self) {
        let completions = match self.connection.as_mut() {
            Some(connection) => connection.handle_events(),
            None => Vec::new(),
        };
        for completion in completions {
            self.on_transfer_complete(completion);
        }
    }

    pub(crate) fn on_transfer_complete(&mut self, completion: Completion) {
        let id = self.record.id;

        // The transfer is gone by the end of this block, either dropped or with its buffer
        // moved into a sample, so a resubmission never overlaps with it.
        let payload = {
            let Completion { transfer, outcome } = completion;
            match outcome {
                TransferOutcome::Completed if transfer.is_full() => {
                    debug!("[{}] Got {}-byte packet", id, transfer.actual_length());
                    Some(transfer.into_payload())
                }
                TransferOutcome::Completed => {
                    debug!("[{}] Got short {}-byte packet", id, transfer.actual_length());
                    None
                }
                TransferOutcome::DeviceGone => {
                    info!("[{}] Device was unplugged", id);
                    let _ = self.request_stop();
                    None
                }
                // Timeouts are the normal case, the meter only reports once a second. Anything
                // else just means we send another request, which we were going to do anyway.
                TransferOutcome::TimedOut | TransferOutcome::Cancelled => {
                    trace!("[{}] Transfer ended: {:?}", id, outcome);
                    None
                }
                TransferOutcome::Failed(e) => {
                    debug!("[{}] Transfer failed: {}", id, e);
                    None
                }
            }
        };

        if let Some(payload) = payload {
            if let Some(acquisition) = self.acquisition.as_mut() {
                acquisition.counters.samples += 1;
                acquisition.send(Packet::Analog(payload));
            }
            if self.sample_limit_reached() {
                info!("[{}] Sample limit reached", id);
                let _ = self.request_stop();
            }
        }

        if self.record.status() == DeviceStatus::Active {
            self.resubmit();
        } else {
            debug!("[{}] Final transfer released", id);
        }
    }

    fn resubmit(&mut self) {
        let (Some(acquisition), Some(connection)) =
            (self.acquisition.as_ref(), self.connection.as_mut())
        else {
            return;
        };

        if let Err(e) = connection.submit(self.tracker.allocate()) {
            warn!("[{}] {}", self.record.id, DriverError::ResubmissionFailed(e));
            let _ = acquisition.stop_handle().request_stop();
        }
    }

    /// Ends the acquisition: no more submissions, the in-flight transfer is pulled back and
    /// released, sources are removed, the connection is closed and the End marker goes out.
    pub(crate) fn finish(&mut self, mux: Option<&mut dyn EventMultiplexer>) {
        let id = self.record.id;
        let _ = self
            .record
            .status
            .transition(DeviceStatus::Active, DeviceStatus::Stopping);

        if let Some(completion) = self.connection.as_mut().and_then(|c| c.cancel()) {
            self.on_transfer_complete(completion);
        }

        let Some(mut acquisition) = self.acquisition.take() else {
            return;
        };

        if let Some(mux) = mux {
            for source in acquisition.sources.drain(..) {
                mux.remove_source(source);
            }
        }

        self.close();

        acquisition.send(Packet::End);
        info!(
            "[{}] Acquisition finished after {} samples",
            id, acquisition.counters.samples
        );
        debug!(
            "[{}] Outstanding transfers: {}",
            id,
            self.tracker.outstanding()
        );
    }
}
