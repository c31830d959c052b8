use clap::{App, Arg};
use colored::*;
use espbridge::link::{decode_datagram, encode_datagram, PeerAddress, MAX_DATAGRAM_SIZE};
use espbridge::protocol::CommandMessage;
use espbridge::telemetry::{TelemetryFrame, TELEMETRY_CHANNELS};
use rand::Rng;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time;

const DEFAULT_BIND: &str = "127.0.0.1:4211";
const DEFAULT_BRIDGE: &str = "127.0.0.1:4210";
const DEFAULT_RATE_MS: &str = "500";

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Wave,
    Zeros,
    Random,
}

impl Pattern {
    fn frame(self, step: u64) -> TelemetryFrame {
        let mut values = [0.0f32; TELEMETRY_CHANNELS];
        match self {
            Pattern::Wave => {
                for (i, value) in values.iter_mut().enumerate() {
                    let phase = step as f32 * 0.1 + i as f32 * 0.35;
                    *value = 50.0 + 50.0 * phase.sin();
                }
            }
            Pattern::Zeros => {}
            Pattern::Random => {
                let mut rng = rand::rng();
                for value in values.iter_mut() {
                    *value = rng.random_range(0.0..100.0);
                }
            }
        }
        TelemetryFrame::new(values)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("peer-sim")
        .version("0.1.0")
        .author("Field Systems Engineering Team")
        .about("📟 Simulated sensor peer for the telemetry bridge")
        .arg(
            Arg::with_name("bind")
                .short("b")
                .long("bind")
                .value_name("ADDR")
                .help("UDP address the peer listens on for commands")
                .takes_value(true)
                .default_value(DEFAULT_BIND),
        )
        .arg(
            Arg::with_name("bridge")
                .long("bridge")
                .value_name("ADDR")
                .help("UDP address of the bridge's wireless link")
                .takes_value(true)
                .default_value(DEFAULT_BRIDGE),
        )
        .arg(
            Arg::with_name("address")
                .short("a")
                .long("address")
                .value_name("MAC")
                .help("Hardware address this peer reports as")
                .takes_value(true)
                .validator(|v| match v.parse::<PeerAddress>() {
                    Ok(_) => Ok(()),
                    Err(e) => Err(e.to_string()),
                }),
        )
        .arg(
            Arg::with_name("rate")
                .short("r")
                .long("rate-ms")
                .value_name("MS")
                .help("Milliseconds between telemetry frames")
                .takes_value(true)
                .default_value(DEFAULT_RATE_MS)
                .validator(|v| match v.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("Rate must be a positive number of milliseconds".into()),
                }),
        )
        .arg(
            Arg::with_name("pattern")
                .short("p")
                .long("pattern")
                .value_name("PATTERN")
                .help("Shape of the generated telemetry")
                .takes_value(true)
                .possible_values(&["wave", "zeros", "random"])
                .default_value("wave"),
        )
        .arg(
            Arg::with_name("count")
                .short("n")
                .long("count")
                .value_name("N")
                .help("Stop after sending N frames (0 sends forever)")
                .takes_value(true)
                .default_value("0")
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Count must be a valid number".into()),
                }),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Print every frame sent"),
        )
        .get_matches();

    let bind: SocketAddr = matches.value_of("bind").unwrap_or(DEFAULT_BIND).parse()?;
    let bridge: SocketAddr = matches.value_of("bridge").unwrap_or(DEFAULT_BRIDGE).parse()?;
    let address = match matches.value_of("address") {
        Some(mac) => mac.parse::<PeerAddress>()?,
        None => PeerAddress::DEFAULT_PEER,
    };
    let rate_ms: u64 = matches.value_of("rate").unwrap_or(DEFAULT_RATE_MS).parse()?;
    let count: u64 = matches.value_of("count").unwrap_or("0").parse()?;
    let verbose = matches.is_present("verbose");
    let pattern = match matches.value_of("pattern") {
        Some("zeros") => Pattern::Zeros,
        Some("random") => Pattern::Random,
        _ => Pattern::Wave,
    };

    let socket = match UdpSocket::bind(bind).await {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("{} Failed to bind {}: {}", "❌".red(), bind.to_string().bright_white(), e.to_string().bright_red());
            return Err(e.into());
        }
    };

    println!(
        "{} Peer {} sending {:?} telemetry to {} every {} ms",
        "📟".cyan(),
        address.to_string().bright_white(),
        pattern,
        bridge.to_string().bright_cyan(),
        rate_ms
    );

    let mut ticker = time::interval(Duration::from_millis(rate_ms));
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if count > 0 && sent >= count {
                    println!("{} Sent {} frames", "✅".green(), sent);
                    break;
                }

                let frame = pattern.frame(sent);
                let datagram = encode_datagram(address, &frame.encode_binary())?;
                match socket.send_to(&datagram, bridge).await {
                    Ok(_) => {
                        sent += 1;
                        if verbose {
                            println!("{} #{} {:.2?}", "→".bright_black(), sent, &frame.values()[..4]);
                        }
                    }
                    Err(e) => eprintln!("{} Send failed: {}", "⚠️".yellow(), e.to_string().bright_red()),
                }
            }
            received = socket.recv_from(&mut buf) => {
                let (len, origin) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        eprintln!("{} Receive failed: {}", "⚠️".yellow(), e.to_string().bright_red());
                        continue;
                    }
                };
                print_command(&buf[..len], origin);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("{} Stopping after {} frames", "🛑".yellow(), sent);
                break;
            }
        }
    }

    Ok(())
}

fn print_command(datagram: &[u8], origin: SocketAddr) {
    let Some((source, payload)) = decode_datagram(datagram) else {
        println!("{} Ignoring {}-byte datagram from {}", "⚠️".yellow(), datagram.len(), origin);
        return;
    };

    match CommandMessage::decode_binary(payload) {
        Ok(command) => println!(
            "{} {} from {}",
            "📥".green(),
            command.action().bright_green(),
            source.to_string().bright_white()
        ),
        Err(e) => println!(
            "{} Bad command frame from {}: {}",
            "❌".red(),
            source.to_string().bright_white(),
            e.to_string().bright_red()
        ),
    }
}
