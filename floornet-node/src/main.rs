//! Floornet Node
//!
//! Floor controller node: UDP broadcast between floor nodes, simulated room
//! boards, console broker for the elected leader.

mod broker;
mod rooms;
mod transport;

use broker::ConsoleBroker;
use chrono::Utc;
use clap::Parser;
use floornet_core::config::NodeConfig;
use floornet_core::coordinator::Coordinator;
use floornet_core::error::ConfigError;
use floornet_core::hal::Clock;
use floornet_core::types::{Millis, NodeAddress, UnixSeconds};
use rand::Rng;
use rooms::SimulatedRooms;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use transport::{UdpTransport, DEFAULT_PORT};

/// Floor controller node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Node address as AA:BB:CC:DD:EE:FF (random if omitted)
    #[arg(short, long)]
    mac: Option<String>,

    /// Floor this node serves (overrides the config file)
    #[arg(short, long)]
    floor: Option<u8>,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Broadcast targets (repeatable); defaults to 255.255.255.255:<port>
    #[arg(short, long)]
    target: Vec<SocketAddr>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Scheduler tick (ms)
    #[arg(long, default_value = "10")]
    tick_ms: u64,

    /// Refuse this many broker connects before accepting
    #[arg(long, default_value = "0")]
    broker_fail: u32,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Monotonic milliseconds since start, wall clock from the host
struct SystemClock {
    start: Instant,
}

impl SystemClock {
    fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }

    fn unix_seconds(&self) -> Option<UnixSeconds> {
        UnixSeconds::try_from(Utc::now().timestamp()).ok()
    }
}

/// State dump written on shutdown
#[derive(Serialize)]
struct Snapshot<'a, T: Serialize> {
    address: String,
    role: String,
    stats: floornet_core::coordinator::NodeStats,
    model: &'a T,
}

/// Defaults, then the config file, then command-line overrides
fn load_config(path: Option<&Path>, floor: Option<u8>) -> floornet_core::Result<NodeConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
            NodeConfig::from_json(&text)?
        }
        None => NodeConfig::default(),
    };
    if let Some(floor) = floor {
        config.floor_id = floor;
    }
    config.validate()?;
    Ok(config)
}

fn random_address() -> NodeAddress {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill(&mut bytes[..]);
    // locally administered, unicast
    bytes[0] = (bytes[0] | 0x02) & 0xFE;
    NodeAddress(bytes)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(args.config.as_deref().map(Path::new), args.floor)?;

    let address = match args.mac.as_deref() {
        Some(mac) => mac
            .parse::<NodeAddress>()
            .map_err(|_| format!("invalid --mac '{}'", mac))?,
        None => random_address(),
    };
    info!("Floornet node {} starting (floor {})", address, config.floor_id);

    let targets = if args.target.is_empty() {
        vec![SocketAddr::from(([255, 255, 255, 255], args.port))]
    } else {
        args.target.clone()
    };
    let transport = UdpTransport::new(args.port, targets)?;
    if let Some(addr) = transport.local_addr() {
        info!("Listening on {}, broadcasting to {:?}", addr, transport.targets());
    }

    let config = config.with_client_id(format!("floornet-{}", address).replace(':', ""));
    let bus = SimulatedRooms::new(config.floor_id, &config.sensors.room_endpoints);
    let session = ConsoleBroker::stdout(args.broker_fail);

    let mut node = Coordinator::new(config, address, transport, session, bus, SystemClock::new())?;

    let mut ticker = interval(Duration::from_millis(args.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Main event loop
    loop {
        tokio::select! {
            _ = ticker.tick() => node.tick(),

            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Signal handler failed: {}", e);
                }
                break;
            }
        }
    }

    let snapshot = Snapshot {
        address: node.election().address().to_string(),
        role: node.role().to_string(),
        stats: node.stats(),
        model: node.model(),
    };
    info!("Shutting down");
    eprintln!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
