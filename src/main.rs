use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use drv8830_zenoh_runtime::config::{parse_address, RuntimeConfig, MOTOR_ENABLED};
use drv8830_zenoh_runtime::motor::SimulatedI2c;
use drv8830_zenoh_runtime::runtime;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Drive DRV8830 motor boards from zenoh commands
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// I2C adapter device, e.g. /dev/i2c-1
    #[arg(long)]
    i2c_device: Option<String>,

    /// PWM controller address (hex like 0x40 or decimal)
    #[arg(long, value_parser = parse_address)]
    address: Option<u8>,

    /// PWM frequency in Hz
    #[arg(long)]
    frequency: Option<u16>,

    /// Pipe-separated DRV8830 addresses, e.g. "0x60|0x61"
    #[arg(long)]
    motor_addresses: Option<String>,

    /// Use a simulated bus instead of real hardware
    #[arg(long, default_value_t = !MOTOR_ENABLED)]
    simulate: bool,
}

impl Args {
    fn runtime_config(&self) -> Result<RuntimeConfig, BoxError> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path)?,
            None => RuntimeConfig::default(),
        };
        if let Some(device) = &self.i2c_device {
            config.i2c_device = device.clone();
        }
        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(frequency) = self.frequency {
            config.frequency_hz = frequency;
        }
        if let Some(addresses) = &self.motor_addresses {
            config.motor_addresses = addresses.clone();
        }
        Ok(config)
    }
}

async fn start(args: Args) -> Result<(), BoxError> {
    let config = args.runtime_config()?;
    if args.simulate {
        info!("Using simulated I2C bus");
        runtime::run(config, SimulatedI2c::new()).await
    } else {
        info!("Opening I2C adapter {}", config.i2c_device);
        let i2c = linux_embedded_hal::I2cdev::new(&config.i2c_device)?;
        runtime::run(config, i2c).await
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    if let Err(e) = start(Args::parse()).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
