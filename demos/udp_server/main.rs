//! Demo fileserver over AUN-style UDP framing.
//!
//! Each datagram carries an eight-byte header (type, port, control,
//! padding, 32-bit sequence) followed by the payload. Stations map onto
//! the last two octets of the peer's IPv4 address, which matches how
//! small AUN networks are usually laid out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use econet_fs::{Inbound, ServerConfig, Station, Transport};

const AUN_HEADER: usize = 8;
const AUN_DATA: u8 = 0x02;

#[derive(Parser)]
#[command(about = "Acorn Econet fileserver over UDP")]
struct Args {
    /// Server root directory (holds Passwords and the disc trees).
    root: PathBuf,

    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:32768")]
    bind: String,

    /// Network number to answer as.
    #[arg(long, default_value_t = 0)]
    network: u8,

    /// Station number to answer as.
    #[arg(long, default_value_t = 254)]
    station: u8,

    /// Use the extended seven-bit year date packing.
    #[arg(long)]
    extended_dates: bool,
}

struct UdpTransport {
    socket: Arc<UdpSocket>,
    peers: Mutex<HashMap<Station, SocketAddr>>,
    sequence: AtomicU32,
}

impl UdpTransport {
    fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket, peers: Mutex::new(HashMap::new()), sequence: AtomicU32::new(0x4000) }
    }

    async fn learn(&self, station: Station, addr: SocketAddr) {
        self.peers.lock().await.insert(station, addr);
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, to: Station, port: u8, ctrl: u8, data: &[u8]) -> std::io::Result<()> {
        let Some(addr) = self.peers.lock().await.get(&to).copied() else {
            warn!(station = %to, "no known address for station");
            return Ok(());
        };
        let seq = self.sequence.fetch_add(4, Ordering::Relaxed);
        let mut frame = Vec::with_capacity(AUN_HEADER + data.len());
        frame.extend_from_slice(&[AUN_DATA, port, ctrl, 0]);
        frame.extend_from_slice(&seq.to_le_bytes());
        frame.extend_from_slice(data);
        self.socket.send_to(&frame, addr).await?;
        Ok(())
    }
}

fn station_of(addr: &SocketAddr) -> Option<Station> {
    match addr {
        SocketAddr::V4(v4) => {
            let octets = v4.ip().octets();
            Some(Station::new(octets[2], octets[3]))
        }
        SocketAddr::V6(_) => None,
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let config = ServerConfig {
        root: args.root,
        network: args.network,
        station: args.station,
        extended_dates: args.extended_dates,
    };

    let socket = Arc::new(UdpSocket::bind(&args.bind).await?);
    info!(bind = %args.bind, "listening");
    let transport = Arc::new(UdpTransport::new(Arc::clone(&socket)));

    let (inbound, fs_task, tx_task) =
        econet_fs::start(config, Arc::clone(&transport) as Arc<dyn Transport>).await?;

    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                warn!(%err, "receive failed");
                continue;
            }
        };
        if len < AUN_HEADER {
            continue;
        }
        let Some(from) = station_of(&addr) else { continue };
        transport.learn(from, addr).await;

        let packet = Inbound {
            from,
            port: buf[1],
            ctrl: buf[2],
            data: buf[AUN_HEADER..len].to_vec(),
        };
        if inbound.send(packet).is_err() {
            break;
        }
    }

    fs_task.abort();
    tx_task.abort();
    Ok(())
}
