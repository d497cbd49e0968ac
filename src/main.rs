use clap::Parser;
use serde::Serialize;
use simcom_mux::config::ConfigLoader;
use simcom_mux::mux::{PortReport, SocketStream, TcpStatus, Transport};
use simcom_mux::serial::SyncSerialPort;
use simcom_mux::wait::{self, Deadline, Step};
use simcom_mux::{logging, Modem};
use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "simcom-mux",
    version,
    about = "Open a connection through a SIMCom modem, exchange data and report."
)]
struct Args {
    /// Configuration file (otherwise the standard locations are searched).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device the modem is attached to.
    #[arg(short, long)]
    device: Option<String>,

    /// Link baud rate.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Access point name.
    #[arg(long)]
    apn: Option<String>,

    /// Remote host.
    #[arg(long)]
    host: String,

    /// Remote port.
    #[arg(short, long)]
    port: u16,

    /// Use UDP instead of TCP.
    #[arg(long)]
    udp: bool,

    /// Modem port index (first free one if omitted).
    #[arg(short, long)]
    index: Option<usize>,

    /// Text to send once connected.
    #[arg(short, long)]
    send: Option<String>,

    /// How long to collect replies, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    listen_ms: u64,

    /// Print a JSON report instead of the raw reply.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct SessionReport {
    local_address: String,
    status: TcpStatus,
    unacked_bytes: i32,
    received: String,
    port: Option<PortReport>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let config = loader.config_mut();
    if let Some(device) = &args.device {
        config.serial.device = device.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(apn) = &args.apn {
        config.modem.apn = apn.clone();
    }
    let config = loader.into_config();
    logging::init(&config.logging);

    info!(
        "Opening {} at {} baud",
        config.serial.device, config.serial.baud_rate
    );
    let link = SyncSerialPort::open(&config.serial.device, config.serial.line_settings())?;
    let mut modem = Modem::from_config(link, &config);
    let idle = config.modem.poll_interval();

    let modem_config = &config.modem;
    let local_address =
        modem.bring_up(&modem_config.apn, &modem_config.user, &modem_config.password)?;

    let transport = if args.udp {
        Transport::Udp
    } else {
        Transport::Tcp
    };
    let mut port = modem.acquire(args.index, transport)?;
    port.connect(&args.host, args.port)?;

    if let Some(text) = &args.send {
        port.send_all(text.as_bytes())?;
    }

    let mut received = Vec::new();
    let listen = Deadline::after(Duration::from_millis(args.listen_ms));
    wait::until(listen, idle, || -> Result<Step<()>, Infallible> {
        if port.available(true) == 0 {
            return Ok(Step::Idle);
        }
        port.read_to_vec(&mut received);
        Ok(Step::Progress)
    })?;

    let report = SessionReport {
        local_address: local_address.to_string(),
        status: port.status(),
        unacked_bytes: port.outstanding_unacked_bytes(),
        received: String::from_utf8_lossy(&received).into_owned(),
        port: port.report(),
    };
    port.close();

    if let Err(e) = modem.shutdown_context() {
        warn!("{}", e);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.received);
    }
    Ok(())
}
