pub mod codec;
pub mod map;
pub mod math;
pub mod packets;
pub mod physics;
pub mod types;

pub use codec::{CodecError, Reader, WireEnum, Writer};
pub use map::{MapError, VoxelMap};
pub use math::{IVec3, Vec3};
pub use packets::{Origin, Packet, PacketId, PlayerName};
pub use types::{Color, Team, Tool, Weapon};

pub const MAP_X: i32 = 512;
pub const MAP_Y: i32 = 512;
pub const MAP_Z: i32 = 64;

/// Version number clients announce when connecting.
pub const PROTOCOL_VERSION: u32 = 3;
pub const MAX_PLAYERS: usize = 32;

pub const PLAYER_HEALTH: u8 = 100;
pub const PLAYER_BLOCKS: u8 = 50;
pub const PLAYER_GRENADES: u8 = 3;

/// Bit pattern used for "no player" in id fields.
pub const NO_PLAYER: u8 = 255;
