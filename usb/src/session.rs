// The two host-owned collaborators: a sink which receives the datafeed, and the event
// multiplexer which tells us when to look at the USB handle again.
use crate::device::base::DeviceId;
use crate::transfer::Payload;
use enumset::{EnumSet, EnumSetType};
use std::time::Duration;
use victor_types::ChannelKind;

pub const FEED_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Header { feed_version: u32 },
    MetaAnalog { channels: usize, kind: ChannelKind },
    Analog(Payload),
    End,
}

pub trait SessionSink: Send {
    fn send(&mut self, packet: Packet);
}

#[derive(Debug, EnumSetType)]
pub enum Interest {
    Readable,
    Writable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub i32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadinessSource {
    pub id: SourceId,
    pub interest: EnumSet<Interest>,
    pub interval: Duration,
}

pub trait EventMultiplexer {
    /// Asks the host to tick `device` whenever the source is ready, or at least every
    /// `source.interval`.
    fn add_source(&mut self, source: ReadinessSource, device: DeviceId);
    fn remove_source(&mut self, id: SourceId);
}
