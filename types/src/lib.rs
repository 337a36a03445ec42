#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumCount, EnumIter};

/// Lifecycle of a discovered device. Stored as a `u8` inside the driver so that it can be
/// shared with stop handles living on other threads.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DeviceStatus {
    #[default]
    Inactive = 0,
    Active = 1,
    Stopping = 2,
}

impl DeviceStatus {
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(DeviceStatus::Inactive),
            1 => Some(DeviceStatus::Active),
            2 => Some(DeviceStatus::Stopping),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Display, EnumIter, EnumCount, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Capability {
    Multimeter,
    LimitMsec,
    LimitSamples,
    Continuous,
}

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChannelKind {
    Logic,
    Analog,
}

/// A typed capability value, as accepted by the driver's config-set call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConfigValue {
    LimitMsec(u64),
    LimitSamples(u64),
}

impl ConfigValue {
    pub fn capability(&self) -> Capability {
        match self {
            ConfigValue::LimitMsec(_) => Capability::LimitMsec,
            ConfigValue::LimitSamples(_) => Capability::LimitSamples,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AcquisitionLimits {
    pub time_budget: Option<Duration>,
    pub sample_budget: Option<u64>,
}

impl AcquisitionLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn samples(count: u64) -> Self {
        Self {
            time_budget: None,
            sample_budget: Some(count),
        }
    }

    pub fn time(budget: Duration) -> Self {
        Self {
            time_budget: Some(budget),
            sample_budget: None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.time_budget.is_none() && self.sample_budget.is_none()
    }

    // A zero limit has always meant 'no limit' for this instrument.
    pub fn apply(&mut self, value: ConfigValue) {
        match value {
            ConfigValue::LimitMsec(0) => self.time_budget = None,
            ConfigValue::LimitMsec(ms) => self.time_budget = Some(Duration::from_millis(ms)),
            ConfigValue::LimitSamples(0) => self.sample_budget = None,
            ConfigValue::LimitSamples(count) => self.sample_budget = Some(count),
        }
    }

    /// The same limits with any zero budget treated as unset, as `apply` does.
    pub fn normalized(self) -> Self {
        Self {
            time_budget: self.time_budget.filter(|budget| !budget.is_zero()),
            sample_budget: self.sample_budget.filter(|&count| count != 0),
        }
    }
}
