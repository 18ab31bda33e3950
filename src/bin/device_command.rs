//! device_command - send one text command to an ESP32 board and print its reply.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::Duration;

use vision_relay::relay::{self, DeviceEndpoint, RelayTimeouts};
use vision_relay::AppConfig;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Relay a command to one of the configured ESP32 devices"
)]
struct Args {
    /// Configured device id (1 or 2).
    #[arg(long, default_value_t = 1, conflicts_with = "host")]
    device: u32,

    /// Talk to this host directly instead of a configured device.
    #[arg(long)]
    host: Option<String>,

    /// Port override; defaults to the configured device port.
    #[arg(long)]
    port: Option<u16>,

    /// Connect and read timeout in milliseconds.
    #[arg(long, env = "VISION_RELAY_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Command words; joined with spaces, trimmed and upper-cased.
    #[arg(required = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = AppConfig::load()?;

    let mut endpoint = match args.host.as_deref() {
        Some(host) => DeviceEndpoint::parse(host, cfg.devices.device_1.port)?,
        None => cfg
            .devices
            .endpoint(args.device)
            .cloned()
            .ok_or_else(|| anyhow!(relay::INVALID_DEVICE_MESSAGE))?,
    };
    if let Some(port) = args.port {
        endpoint.port = port;
    }

    let timeouts = match args.timeout_ms {
        Some(ms) if ms > 0 => RelayTimeouts {
            connect: Duration::from_millis(ms),
            read: Duration::from_millis(ms),
        },
        Some(_) => return Err(anyhow!("--timeout-ms must be greater than zero")),
        None => cfg.devices.timeouts,
    };

    let command = relay::normalize_command(&args.command.join(" "));
    let response = relay::send(&endpoint, &command, timeouts)
        .map_err(|err| anyhow!("{} did not answer {:?}: {}", endpoint, command, err))?;
    println!("{}", response);
    Ok(())
}
