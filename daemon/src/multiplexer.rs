use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use victor_usb::session::{EventMultiplexer, ReadinessSource, SourceId};
use victor_usb::DeviceId;

struct Registration {
    device: DeviceId,
    interval: Duration,
    next_due: Instant,
}

/// A timer based stand in for a poll set. Every registered source is treated as ready once its
/// interval has elapsed, which is all the driver needs to make progress.
#[derive(Default)]
pub struct SourceTable {
    sources: BTreeMap<SourceId, Registration>,
}

impl SourceTable {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.sources.values().map(|source| source.next_due).min()
    }

    /// Devices with at least one source due at `now`. Those sources are rearmed.
    pub fn due(&mut self, now: Instant) -> Vec<DeviceId> {
        let mut devices = Vec::new();
        for source in self.sources.values_mut() {
            if source.next_due <= now {
                source.next_due = now + source.interval;
                if !devices.contains(&source.device) {
                    devices.push(source.device);
                }
            }
        }
        devices
    }

    /// Drops anything still registered for a device whose acquisition has ended.
    pub fn remove_device(&mut self, device: DeviceId) {
        self.sources.retain(|_, source| source.device != device);
    }
}

impl EventMultiplexer for SourceTable {
    fn add_source(&mut self, source: ReadinessSource, device: DeviceId) {
        self.sources.insert(
            source.id,
            Registration {
                device,
                interval: source.interval,
                next_due: Instant::now() + source.interval,
            },
        );
    }

    fn remove_source(&mut self, id: SourceId) {
        self.sources.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enumset::EnumSet;
    use victor_usb::session::Interest;

    fn source(id: i32, millis: u64) -> ReadinessSource {
        ReadinessSource {
            id: SourceId(id),
            interest: EnumSet::only(Interest::Readable),
            interval: Duration::from_millis(millis),
        }
    }

    #[test]
    fn sources_become_due_after_their_interval() {
        let device = DeviceId::new(1, 2);
        let mut table = SourceTable::default();
        assert!(table.next_due().is_none());

        table.add_source(source(1, 100), device);
        let due = table.next_due().unwrap();

        assert!(table.due(due - Duration::from_millis(1)).is_empty());
        assert_eq!(table.due(due), vec![device]);

        // Rearmed, so not due again straight away.
        assert!(table.due(due).is_empty());
        assert_eq!(table.next_due(), Some(due + Duration::from_millis(100)));
    }

    #[test]
    fn a_device_is_ticked_once_per_round() {
        let device = DeviceId::new(1, 2);
        let mut table = SourceTable::default();
        table.add_source(source(1, 100), device);
        table.add_source(source(2, 100), device);

        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(table.due(later), vec![device]);
    }

    #[test]
    fn removing_sources() {
        let first = DeviceId::new(1, 2);
        let second = DeviceId::new(1, 3);
        let mut table = SourceTable::default();
        table.add_source(source(1, 100), first);
        table.add_source(source(2, 100), first);
        table.add_source(source(3, 100), second);

        table.remove_source(SourceId(3));
        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(table.due(later), vec![first]);

        table.remove_device(first);
        assert!(table.is_empty());
    }
}
