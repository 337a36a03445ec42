use anyhow::{Context, Result};
use log::error;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use victor_types::{AcquisitionLimits, ConfigValue};

pub struct SettingsHandle {
    path: PathBuf,
    settings: Settings,
}

impl SettingsHandle {
    /// Reads the settings, and writes them straight back so a fresh install ends up with a
    /// file the user can edit.
    pub fn load(path: PathBuf) -> Result<SettingsHandle> {
        let settings = Settings::read(&path)?;
        let handle = SettingsHandle { path, settings };
        handle.save();
        Ok(handle)
    }

    pub fn save(&self) {
        if let Err(e) = self.settings.write(&self.path) {
            error!(
                "Couldn't save settings to {}: {}",
                self.path.to_string_lossy(),
                e
            );
        }
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Preferred meter, as `bus:address`.
    pub device: Option<String>,

    /// Zero, or missing, means no limit.
    pub limit_msec: u64,
    pub limit_samples: u64,
}

impl Settings {
    pub fn read(path: &Path) -> Result<Settings> {
        match File::open(path) {
            Ok(reader) => serde_json::from_reader(reader).context(format!(
                "Could not parse daemon settings file at {}",
                path.to_string_lossy()
            )),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Settings::default()),
            Err(error) => Err(error).context(format!(
                "Could not open daemon settings file for reading at {}",
                path.to_string_lossy()
            )),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if let Err(e) = create_dir_all(parent) {
                if e.kind() != ErrorKind::AlreadyExists {
                    return Err(e).context(format!(
                        "Could not create settings directory at {}",
                        parent.to_string_lossy()
                    ));
                }
            }
        }
        let writer = File::create(path).context(format!(
            "Could not open daemon settings file for writing at {}",
            path.to_string_lossy()
        ))?;
        serde_json::to_writer_pretty(writer, self).context(format!(
            "Could not write to daemon settings file at {}",
            path.to_string_lossy()
        ))?;
        Ok(())
    }

    /// The limits to configure, with command line values taking precedence. Both are always
    /// returned so that a zero on either side explicitly clears the limit.
    pub fn limits(&self, limit_msec: Option<u64>, limit_samples: Option<u64>) -> [ConfigValue; 2] {
        [
            ConfigValue::LimitMsec(limit_msec.unwrap_or(self.limit_msec)),
            ConfigValue::LimitSamples(limit_samples.unwrap_or(self.limit_samples)),
        ]
    }

    /// What those limits amount to, without a device to configure.
    pub fn effective_limits(
        &self,
        limit_msec: Option<u64>,
        limit_samples: Option<u64>,
    ) -> AcquisitionLimits {
        let mut limits = AcquisitionLimits::unlimited();
        for value in self.limits(limit_msec, limit_samples) {
            limits.apply(value);
        }
        limits
    }
}
