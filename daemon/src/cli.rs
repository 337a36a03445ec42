use clap::{Parser, ValueEnum};
use directories::ProjectDirs;
use std::path::PathBuf;
use victor_usb::DeviceId;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Cli {
    /// Minimum log level to print out
    #[clap(long, value_enum, default_value = "info")]
    pub log_level: LevelFilter,

    /// Location of the daemon configuration file on disk
    #[clap(long, default_value_os_t = default_config_location())]
    pub config: PathBuf,

    /// List attached meters and exit
    #[clap(long)]
    pub list: bool,

    /// Which meter to read from, as bus:address (defaults to the first one found)
    #[clap(long)]
    pub device: Option<DeviceId>,

    /// Stop after this many milliseconds (0 for no limit)
    #[clap(long)]
    pub limit_msec: Option<u64>,

    /// Stop after this many samples (0 for no limit)
    #[clap(long)]
    pub limit_samples: Option<u64>,
}

fn default_config_location() -> PathBuf {
    match ProjectDirs::from("org", "victor-dmm", "Victor-DMM") {
        Some(proj_dirs) => proj_dirs.config_dir().join("settings.json"),
        None => PathBuf::from("victor-dmm.json"),
    }
}

#[repr(usize)]
#[derive(ValueEnum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum LevelFilter {
    /// A level lower than all log levels.
    Off,
    /// Corresponds to the `Error` log level.
    Error,
    /// Corresponds to the `Warn` log level.
    Warn,
    /// Corresponds to the `Info` log level.
    Info,
    /// Corresponds to the `Debug` log level.
    Debug,
    /// Corresponds to the `Trace` log level.
    Trace,
}

impl From<LevelFilter> for log::LevelFilter {
    fn from(level: LevelFilter) -> Self {
        match level {
            LevelFilter::Off => log::LevelFilter::Off,
            LevelFilter::Error => log::LevelFilter::Error,
            LevelFilter::Warn => log::LevelFilter::Warn,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Trace => log::LevelFilter::Trace,
        }
    }
}
