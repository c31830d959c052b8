use clap::{App, Arg, ArgMatches};
use espbridge::bridge::{Bridge, EVENT_QUEUE_CAPACITY};
use espbridge::config::{BridgeConfig, ConfigError};
use espbridge::link::{PeerAddress, UdpLink};
use espbridge::push::WsPushChannel;
use espbridge::scheduler::SchedulerLoop;
use tokio::sync::mpsc;
use tracing::{error, info, Level};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("espbridge")
        .version("0.1.0")
        .author("Field Systems Engineering Team")
        .about("📡 Wireless-to-WebSocket telemetry bridge")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("peer")
                .long("peer")
                .value_name("MAC")
                .help("Hardware address of the remote sensor peer (AA:BB:CC:DD:EE:FF)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("link-bind")
                .long("link-bind")
                .value_name("ADDR")
                .help("UDP address the wireless link listens on")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("peer-endpoint")
                .long("peer-endpoint")
                .value_name("ADDR")
                .help("UDP address commands are sent to")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("strict-peer")
                .long("strict-peer")
                .help("Drop telemetry from any address other than the peer"),
        )
        .arg(
            Arg::with_name("ws-bind")
                .long("ws-bind")
                .value_name("ADDR")
                .help("Address the WebSocket server listens on")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("ws-path")
                .long("ws-path")
                .value_name("PATH")
                .help("WebSocket request path")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("max-clients")
                .long("max-clients")
                .value_name("N")
                .help("Maximum simultaneous WebSocket clients")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("tick-interval")
                .long("tick-interval")
                .value_name("MS")
                .help("Fallback check interval in milliseconds")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("no-simulation")
                .long("no-simulation")
                .help("Never broadcast simulated telemetry"),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed for simulated telemetry")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            return Err(e.into());
        }
    };

    info!("📡 ESP-NOW telemetry bridge starting...");

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

    let link = UdpLink::bind(&config.link, event_tx.clone()).await?;
    let push = WsPushChannel::bind(&config.push, event_tx).await?;
    let bridge = Bridge::new(&config, link, push)?;

    info!("🌐 Clients connect to ws://{}{}", config.push.bind, config.push.path);

    let mut scheduler = SchedulerLoop::new(bridge, config.scheduler.clone());
    scheduler
        .run(event_rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down...");
        })
        .await;

    let stats = scheduler.get_bridge().get_stats();
    info!(
        "🛑 Bridge stopped: {} frames received, {} rejected, {} simulated, {} commands relayed",
        stats.frames_received, stats.frames_rejected, stats.simulated_frames, stats.commands_relayed
    );

    Ok(())
}

fn load_config(matches: &ArgMatches<'_>) -> Result<BridgeConfig, ConfigError> {
    let mut config = match matches.value_of("config") {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };

    if let Some(peer) = matches.value_of("peer") {
        config.link.peer = peer.parse::<PeerAddress>()?;
    }
    if let Some(addr) = matches.value_of("link-bind") {
        config.link.bind = parse_arg("link-bind", addr)?;
    }
    if let Some(addr) = matches.value_of("peer-endpoint") {
        config.link.peer_endpoint = parse_arg("peer-endpoint", addr)?;
    }
    if matches.is_present("strict-peer") {
        config.link.strict_peer = true;
    }
    if let Some(addr) = matches.value_of("ws-bind") {
        config.push.bind = parse_arg("ws-bind", addr)?;
    }
    if let Some(path) = matches.value_of("ws-path") {
        config.push.path = path.to_string();
    }
    if let Some(n) = matches.value_of("max-clients") {
        config.push.max_clients = parse_arg("max-clients", n)?;
    }
    if let Some(ms) = matches.value_of("tick-interval") {
        config.scheduler.tick_interval_ms = parse_arg("tick-interval", ms)?;
    }
    if matches.is_present("no-simulation") {
        config.simulation.enabled = false;
    }
    if let Some(seed) = matches.value_of("seed") {
        config.simulation.seed = Some(parse_arg("seed", seed)?);
    }

    config.validate()?;
    Ok(config)
}

fn parse_arg<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("--{name}: cannot parse `{value}`")))
}
