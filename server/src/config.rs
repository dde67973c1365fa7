//! Server configuration: defaults, an optional TOML file, then command-line
//! overrides.

use crate::error::ServerError;
use clap::Parser;
use serde::Deserialize;
use shared::packets::MAP_CHUNK_MAX;
use shared::{Color, MAX_PLAYERS};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug, Default)]
#[clap(author, version, about)]
pub struct Args {
    /// TOML configuration file
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// Server IP address to bind to
    #[clap(short = 'H', long)]
    pub host: Option<String>,
    /// Server port to listen on
    #[clap(short, long)]
    pub port: Option<u16>,
    /// Map file in span format; a flat map is generated when omitted
    #[clap(short, long)]
    pub map: Option<PathBuf>,
    /// Maximum number of players
    #[clap(long)]
    pub max_players: Option<usize>,
    /// Tick rate (updates per second)
    #[clap(short, long)]
    pub tick_rate: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub map: Option<PathBuf>,
    pub max_players: usize,
    pub tick_rate: u32,
    /// Milliseconds between world-update broadcasts.
    pub world_update_ms: u64,
    pub map_chunk_size: usize,
    pub map_chunks_per_tick: usize,
    /// Seconds a dead player waits before respawning.
    pub respawn_time: u8,
    pub capture_limit: u8,
    pub pickup_radius: f32,
    pub capture_radius: f32,
    /// How far a client-reported position may stray from the simulated one.
    pub position_tolerance: f32,
    pub team_names: [String; 2],
    pub team_colors: [Color; 2],
    pub fog_color: Color,
    pub peer_timeout_secs: u64,
    /// Fixed seed for spawn selection; random when absent.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 32887,
            map: None,
            max_players: MAX_PLAYERS,
            tick_rate: 60,
            world_update_ms: 100,
            map_chunk_size: MAP_CHUNK_MAX,
            map_chunks_per_tick: 4,
            respawn_time: 8,
            capture_limit: 10,
            pickup_radius: 3.0,
            capture_radius: 3.0,
            position_tolerance: 3.0,
            team_names: ["Blue".to_string(), "Green".to_string()],
            team_colors: [Color::new(0, 0, 255), Color::new(0, 255, 0)],
            fog_color: Color::new(128, 232, 255),
            peer_timeout_secs: 10,
            seed: None,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Builds the effective configuration: file (if given) then flags.
    pub fn from_args(args: &Args) -> Result<Self, ServerError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(map) = &args.map {
            self.map = Some(map.clone());
        }
        if let Some(max_players) = args.max_players {
            self.max_players = max_players;
        }
        if let Some(tick_rate) = args.tick_rate {
            self.tick_rate = tick_rate;
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        let fail = |msg: String| Err(ServerError::Config(msg));
        if self.max_players == 0 || self.max_players > MAX_PLAYERS {
            return fail(format!("max_players must be in 1..={}", MAX_PLAYERS));
        }
        if !(1..=1000).contains(&self.tick_rate) {
            return fail("tick_rate must be in 1..=1000".to_string());
        }
        if self.world_update_ms == 0 {
            return fail("world_update_ms must be positive".to_string());
        }
        if self.map_chunk_size == 0 || self.map_chunk_size > MAP_CHUNK_MAX {
            return fail(format!("map_chunk_size must be in 1..={}", MAP_CHUNK_MAX));
        }
        if self.map_chunks_per_tick == 0 {
            return fail("map_chunks_per_tick must be positive".to_string());
        }
        if self.capture_limit == 0 {
            return fail("capture_limit must be positive".to_string());
        }
        for (name, value) in [
            ("pickup_radius", self.pickup_radius),
            ("capture_radius", self.capture_radius),
            ("position_tolerance", self.position_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return fail(format!("{} must be a positive number", name));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    pub fn world_update_interval(&self) -> Duration {
        Duration::from_millis(self.world_update_ms)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}
