use clap::Parser;
use log::{error, info};
use server::config::{Args, ServerConfig};
use server::network::Server;
use server::udp::UdpTransport;
use shared::VoxelMap;

/// Ground height of the generated map used when no map file is configured.
const FLAT_MAP_HEIGHT: i32 = 40;

/// Loads configuration and the map, binds the socket and runs the server
/// until Ctrl-C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig::from_args(&args)?;

    let map = match &config.map {
        Some(path) => match VoxelMap::load(path) {
            Ok(map) => {
                info!("Loaded map {}", path.display());
                map
            }
            Err(e) => {
                error!("Failed to load map {}: {}", path.display(), e);
                return Err(e.into());
            }
        },
        None => {
            info!("No map configured, generating a flat map");
            VoxelMap::flat(FLAT_MAP_HEIGHT)
        }
    };

    info!(
        "Starting server on {} ({} players max, {}Hz)",
        config.bind_address(),
        config.max_players,
        config.tick_rate
    );

    let transport = UdpTransport::bind(&config.bind_address(), config.peer_timeout()).await?;
    let mut server = Server::new(config, map, transport);
    server.run().await?;

    Ok(())
}
