use log::{debug, info, warn};
use tokio::sync::mpsc;
use victor_usb::session::{Packet, SessionSink};
use victor_usb::DeviceId;

/// Forwards the driver's datafeed out of the (blocking) tick and into the async side.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Packet>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Packet>) -> Self {
        Self { tx }
    }
}

impl SessionSink for ChannelSink {
    fn send(&mut self, packet: Packet) {
        if self.tx.send(packet).is_err() {
            warn!("Datafeed consumer has gone away, dropping packet");
        }
    }
}

/// Logs the datafeed for `device` until the end marker arrives (or every sender is dropped),
/// returning the number of samples seen.
pub async fn print_packets(device: DeviceId, mut rx: mpsc::UnboundedReceiver<Packet>) -> u64 {
    let mut samples = 0;
    while let Some(packet) = rx.recv().await {
        match packet {
            Packet::Header { feed_version } => {
                info!("{}: Datafeed started (version {})", device, feed_version);
            }
            Packet::MetaAnalog { channels, kind } => {
                debug!("{}: {} {:?} channel(s)", device, channels, kind);
            }
            Packet::Analog(payload) => {
                samples += 1;
                info!("{}: Sample {}: {:02x?}", device, samples, payload);
            }
            Packet::End => {
                info!("{}: Datafeed ended after {} sample(s)", device, samples);
                break;
            }
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use victor_types::ChannelKind;

    #[tokio::test]
    async fn counts_samples_up_to_the_end_marker() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sink = ChannelSink::new(tx);

        sink.send(Packet::Header { feed_version: 1 });
        sink.send(Packet::MetaAnalog {
            channels: 1,
            kind: ChannelKind::Analog,
        });
        sink.send(Packet::Analog([0; 14]));
        sink.send(Packet::Analog([1; 14]));
        sink.send(Packet::End);
        sink.send(Packet::Analog([2; 14]));

        assert_eq!(print_packets(DeviceId::new(1, 1), rx).await, 2);
    }

    #[tokio::test]
    async fn stops_when_the_sink_is_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sink = ChannelSink::new(tx);
        sink.send(Packet::Analog([0; 14]));
        drop(sink);

        assert_eq!(print_packets(DeviceId::new(1, 1), rx).await, 1);
    }

    #[test]
    fn sending_without_a_consumer_is_harmless() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ChannelSink::new(tx).send(Packet::End);
    }
}
