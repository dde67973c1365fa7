use clap::Parser;
use flate2::read::ZlibDecoder;
use server::udp::Frame;
use shared::packets::{ChatMessage, ExistingPlayer};
use shared::types::ChatType;
use shared::{
    Color, Origin, Packet, PacketId, PlayerName, Team, Tool, VoxelMap, Weapon, WireEnum, Writer,
    PROTOCOL_VERSION,
};
use std::io::Read;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Headless client that downloads the map, joins a team and says hello
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:32887")]
    server: SocketAddr,
    /// Player name
    #[clap(short, long, default_value = "bot")]
    name: String,
    /// Team to join (0 or 1)
    #[clap(short, long, default_value = "0")]
    team: u8,
}

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Bot {
    socket: UdpSocket,
    server: SocketAddr,
    frame: Vec<u8>,
    packet: Vec<u8>,
}

impl Bot {
    async fn send(&mut self, packet: &Packet<'_>) -> Result<(), Box<dyn std::error::Error>> {
        self.packet.resize(packet.id().max_len(), 0);
        let mut w = Writer::new(&mut self.packet[..]);
        packet.encode(&mut w)?;
        let len = w.position();
        Frame::Data(&self.packet[..len]).encode(&mut self.frame);
        self.socket.send_to(&self.frame, self.server).await?;
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame<'_>) -> Result<(), Box<dyn std::error::Error>> {
        frame.encode(&mut self.frame);
        self.socket.send_to(&self.frame, self.server).await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let team = if args.team == 0 { Team::A } else { Team::B };

    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);
    let mut bot = Bot {
        socket,
        server: args.server,
        frame: Vec::new(),
        packet: Vec::new(),
    };

    println!("Connecting to {}", args.server);
    bot.send_frame(Frame::Connect {
        version: PROTOCOL_VERSION,
    })
    .await?;

    let mut buf = vec![0u8; 16 * 1024];
    let mut map_size = None;
    let mut compressed = Vec::new();
    let mut player_id = None;
    let started = Instant::now();

    // Map download and state snapshot
    while player_id.is_none() {
        let (len, _) = timeout(RECV_TIMEOUT, bot.socket.recv_from(&mut buf)).await??;
        let data = match Frame::decode(&buf[..len]) {
            Some(Frame::Data(data)) => data,
            Some(Frame::Disconnect { reason }) => {
                println!("Server refused connection (reason {})", reason);
                return Ok(());
            }
            other => {
                println!("Unexpected frame: {:?}", other);
                continue;
            }
        };
        match Packet::decode(data, Origin::Server) {
            Ok(Packet::MapStart { size }) => {
                println!("Map download started: {} bytes", size);
                map_size = Some(size as usize);
            }
            Ok(Packet::MapChunk(chunk)) => {
                compressed.extend_from_slice(chunk);
                if Some(compressed.len()) == map_size {
                    let mut raw = Vec::new();
                    ZlibDecoder::new(&compressed[..]).read_to_end(&mut raw)?;
                    let map = VoxelMap::decode(&raw)?;
                    println!(
                        "Map received in {:.2}s ({} bytes raw, top of column 256,256 at {:?})",
                        started.elapsed().as_secs_f32(),
                        raw.len(),
                        map.find_top_block(256, 256)
                    );
                }
            }
            Ok(Packet::ExistingPlayer(existing)) => {
                println!("Existing player {}: {}", existing.player_id, existing.name);
            }
            Ok(Packet::StateData(state)) => {
                println!(
                    "State received: we are player {}, score {}-{}",
                    state.player_id, state.ctf.scores[0], state.ctf.scores[1]
                );
                player_id = Some(state.player_id);
            }
            Ok(other) => println!("Ignoring {:?}", other.id()),
            Err(e) => println!("Failed to decode packet: {}", e),
        }
    }

    let player_id = player_id.unwrap_or_default();
    bot.send(&Packet::ExistingPlayer(ExistingPlayer {
        player_id,
        team,
        weapon: Weapon::Rifle,
        tool: Tool::Gun,
        kills: 0,
        color: Color::new(200, 40, 40),
        name: PlayerName::from(args.name.as_str()),
    }))
    .await?;

    // Wait for our own spawn
    loop {
        let (len, _) = timeout(RECV_TIMEOUT, bot.socket.recv_from(&mut buf)).await??;
        let Some(Frame::Data(data)) = Frame::decode(&buf[..len]) else {
            continue;
        };
        if data.first() == Some(&PacketId::WorldUpdate.to_byte()) {
            continue;
        }
        match Packet::decode(data, Origin::Server) {
            Ok(Packet::CreatePlayer(create)) if create.player_id == player_id => {
                println!(
                    "Spawned as {} on {:?} at {:?}",
                    create.name, create.team, create.position
                );
                break;
            }
            Ok(other) => println!("Received {:?}", other.id()),
            Err(e) => println!("Failed to decode packet: {}", e),
        }
    }

    bot.send(&Packet::Chat(ChatMessage {
        player_id,
        chat_type: ChatType::All,
        message: "hello from the bot client".into(),
    }))
    .await?;

    println!("Sending disconnect");
    bot.send_frame(Frame::Disconnect { reason: 0 }).await?;
    println!("Bot client finished");
    Ok(())
}
