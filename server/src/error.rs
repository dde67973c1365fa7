use shared::MapError;
use thiserror::Error;

/// Failures that stop the server from starting or keep running.
///
/// Per-packet problems never surface here: malformed or unexpected packets
/// are logged and dropped where they are handled.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("map: {0}")]
    Map(#[from] MapError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("config file: {0}")]
    ConfigFile(#[from] toml::de::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("map compression failed: {0}")]
    Compression(#[source] std::io::Error),
}
