use victor_types::{Capability, ChannelKind};

pub const DRIVER_NAME: &str = "victor-dmm";
pub const DRIVER_LONG_NAME: &str = "Victor DMMs";

pub const CAPABILITIES: &[Capability] = &[
    Capability::Multimeter,
    Capability::LimitMsec,
    Capability::LimitSamples,
    Capability::Continuous,
];

pub const CHANNEL_NAMES: &[&str] = &["P1"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    pub index: usize,
    pub name: String,
    pub kind: ChannelKind,
    pub enabled: bool,
}

impl Channel {
    pub fn defaults() -> Vec<Channel> {
        CHANNEL_NAMES
            .iter()
            .enumerate()
            .map(|(index, name)| Channel {
                index,
                name: name.to_string(),
                kind: ChannelKind::Analog,
                enabled: true,
            })
            .collect()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DriverInfo {
    pub name: &'static str,
    pub long_name: &'static str,
    pub capabilities: &'static [Capability],
    pub channel_names: &'static [&'static str],
}

impl DriverInfo {
    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

pub const DRIVER_INFO: DriverInfo = DriverInfo {
    name: DRIVER_NAME,
    long_name: DRIVER_LONG_NAME,
    capabilities: CAPABILITIES,
    channel_names: CHANNEL_NAMES,
};
