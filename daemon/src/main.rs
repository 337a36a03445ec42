use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};
use tokio::sync::mpsc;
use victor_usb::device::libusb::LibUsb;
use victor_usb::rusb::GlobalContext;
use victor_usb::{DeviceId, DeviceRecord, VictorDriver};

use crate::cli::Cli;
use crate::multiplexer::SourceTable;
use crate::session::{print_packets, ChannelSink};
use crate::settings::SettingsHandle;
use crate::worker::run_acquisition;

mod cli;
mod multiplexer;
mod session;
mod settings;
mod worker;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    CombinedLogger::init(vec![TermLogger::new(
        args.log_level.into(),
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .context("Could not configure the logger")?;

    info!("Starting Victor DMM Daemon v{}", VERSION);
    let settings = SettingsHandle::load(args.config.clone())?;

    let mut driver = VictorDriver::new(LibUsb::global());
    let records = driver.scan().context("Unable to scan for devices")?;

    if args.list {
        let info = VictorDriver::<LibUsb<GlobalContext>>::info();
        println!("{} ({})", info.long_name, info.name);
        for record in &records {
            println!("  {} {} [{}]", record.id, record.vendor, record.status());
        }
        return Ok(());
    }

    let id = select_device(&records, &args, settings.get().device.as_deref())?;
    info!(
        "Using device {}, limits: {:?}",
        id,
        settings
            .get()
            .effective_limits(args.limit_msec, args.limit_samples)
    );
    driver
        .open(id)
        .with_context(|| format!("Unable to open device {}", id))?;

    for value in settings
        .get()
        .limits(args.limit_msec, args.limit_samples)
    {
        driver
            .config_set(id, value)
            .with_context(|| format!("Unable to configure {}", value.capability()))?;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_packets(id, rx));

    let limits = driver.limits(id)?;
    let mut sources = SourceTable::default();
    driver
        .start(
            id,
            limits,
            Box::new(ChannelSink::new(tx)),
            &mut sources,
        )
        .with_context(|| format!("Unable to start acquisition on {}", id))?;

    let result = run_acquisition(&mut driver, id, sources).await;

    // On error the driver still holds the sink, so close everything before waiting on it.
    driver.cleanup();
    let samples = printer.await.context("Datafeed printer failed")?;

    info!("Shutting down daemon, {} sample(s) read", samples);
    result
}

fn select_device(
    records: &[DeviceRecord],
    args: &Cli,
    preferred: Option<&str>,
) -> Result<DeviceId> {
    let wanted = match (args.device, preferred) {
        (Some(id), _) => Some(id),
        (None, Some(text)) => match text.parse::<DeviceId>() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Ignoring device in settings: {}", e);
                None
            }
        },
        (None, None) => None,
    };

    match wanted {
        Some(id) if records.iter().any(|record| record.id == id) => Ok(id),
        Some(id) => bail!("No Victor DMM found at {}", id),
        None => match records.first() {
            Some(record) => Ok(record.id),
            None => bail!("No Victor DMM found, is it plugged in?"),
        },
    }
}
