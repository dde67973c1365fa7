//! Per-peer connection state and the fixed pool of player slots
//!
//! This module handles the server-side bookkeeping for connected peers:
//! - Connection lifecycle (Disconnected → Connecting → Connected)
//! - Player state carried by each slot (body, loadout, health, score)
//! - Slot allocation with capacity enforcement
//! - The peer handle → slot lookup used to route incoming packets
//!
//! Slots are allocated once when the server starts and reused: connecting
//! fills a free slot, disconnecting resets it to defaults.

use crate::entity::Entity;
use crate::transport::PeerId;
use log::info;
use shared::packets::{CreatePlayer, ExistingPlayer, PlayerName};
use shared::physics::PlayerBody;
use shared::types::{KillType, WeaponFlags};
use shared::{Color, Team, Tool, Vec3, Weapon, PLAYER_BLOCKS, PLAYER_GRENADES, PLAYER_HEALTH};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Accepted by the transport, waiting for or receiving the map.
    Connecting,
    Connected,
}

/// One player slot.
///
/// Holds the peer handle while the slot is in use along with everything the
/// server tracks about the player: kinematics, loadout, health, score and
/// the data needed to fill the next kill broadcast.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Slot index, also the player id on the wire
    pub id: u8,
    pub peer: Option<PeerId>,
    pub state: ConnectionState,
    /// Set once the client has announced itself with an existing-player
    pub joined: bool,
    pub name: PlayerName,
    pub team: Team,
    pub weapon: Weapon,
    pub color: Color,
    pub body: PlayerBody,
    pub weapon_flags: WeaponFlags,
    pub alive: bool,
    pub hp: u8,
    pub clip: u8,
    pub reserve: u8,
    pub blocks: u8,
    pub grenades: u8,
    pub kills: u32,
    /// Seconds until the next respawn
    pub respawn_timer: u8,
    /// Killer id and cause of the most recent death
    pub last_kill: Option<(u8, KillType)>,
}

impl Connection {
    /// Creates an empty, disconnected slot
    pub fn new(id: u8) -> Self {
        let (clip, reserve) = Weapon::Rifle.ammo();
        Self {
            id,
            peer: None,
            state: ConnectionState::Disconnected,
            joined: false,
            name: PlayerName::default(),
            team: Team::Spectator,
            weapon: Weapon::Rifle,
            color: Color::new(112, 112, 112),
            body: PlayerBody::default(),
            weapon_flags: WeaponFlags::default(),
            alive: false,
            hp: 0,
            clip,
            reserve,
            blocks: PLAYER_BLOCKS,
            grenades: PLAYER_GRENADES,
            kills: 0,
            respawn_timer: 0,
            last_kill: None,
        }
    }

    /// Returns the slot to its pristine disconnected state
    pub fn reset(&mut self) {
        *self = Self::new(self.id);
    }

    pub fn entity(&self) -> Entity {
        Entity::new(self.id, self.team, self.body.position)
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// A joined player on a team who can currently act in the world
    pub fn is_active(&self) -> bool {
        self.is_connected() && self.joined && self.alive && self.team.is_playing()
    }

    /// Puts the player at `position` with full health and a fresh loadout
    pub fn spawn(&mut self, position: Vec3) {
        let (clip, reserve) = self.weapon.ammo();
        let orientation = self.body.orientation();
        self.body = PlayerBody::new(position);
        self.body.set_orientation(orientation);
        self.weapon_flags = WeaponFlags::default();
        self.alive = true;
        self.hp = PLAYER_HEALTH;
        self.clip = clip;
        self.reserve = reserve;
        self.blocks = PLAYER_BLOCKS;
        self.grenades = PLAYER_GRENADES;
        self.respawn_timer = 0;
    }

    /// Refills health, ammunition, blocks and grenades.
    /// Returns false when nothing needed topping up.
    pub fn restock(&mut self) -> bool {
        let (clip, reserve) = self.weapon.ammo();
        let full = self.hp == PLAYER_HEALTH
            && self.clip == clip
            && self.reserve == reserve
            && self.blocks == PLAYER_BLOCKS
            && self.grenades == PLAYER_GRENADES;
        self.hp = PLAYER_HEALTH;
        self.clip = clip;
        self.reserve = reserve;
        self.blocks = PLAYER_BLOCKS;
        self.grenades = PLAYER_GRENADES;
        !full
    }

    /// Moves rounds from the reserve into the clip
    pub fn reload(&mut self) -> bool {
        let (capacity, _) = self.weapon.ammo();
        let wanted = capacity.saturating_sub(self.clip).min(self.reserve);
        if wanted == 0 {
            return false;
        }
        self.clip += wanted;
        self.reserve -= wanted;
        true
    }

    pub fn existing_player(&self) -> ExistingPlayer {
        ExistingPlayer {
            player_id: self.id,
            team: self.team,
            weapon: self.weapon,
            tool: self.body.tool,
            kills: self.kills,
            color: self.color,
            name: self.name,
        }
    }

    pub fn create_player(&self) -> CreatePlayer {
        CreatePlayer {
            player_id: self.id,
            weapon: self.weapon,
            team: self.team,
            position: self.body.position,
            name: self.name,
        }
    }

    pub fn tool(&self) -> Tool {
        self.body.tool
    }
}

/// Fixed-capacity pool of connection slots
///
/// Owns every [`Connection`] for the lifetime of the server together with
/// the peer → slot table. Capacity is enforced at allocation time; a refused
/// peer never touches a slot.
#[derive(Debug)]
pub struct ConnectionPool {
    slots: Vec<Connection>,
    peers: HashMap<PeerId, u8>,
    max_players: usize,
}

impl ConnectionPool {
    /// Creates `max_players` disconnected slots
    pub fn new(max_players: usize) -> Self {
        Self {
            slots: (0..max_players).map(|id| Connection::new(id as u8)).collect(),
            peers: HashMap::new(),
            max_players,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_players
    }

    /// Number of slots currently in use
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_players
    }

    /// Claims the lowest free slot for `peer` and moves it to Connecting
    ///
    /// Returns None when every slot is taken or the peer already owns one.
    pub fn allocate(&mut self, peer: PeerId) -> Option<u8> {
        if self.is_full() || self.peers.contains_key(&peer) {
            return None;
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|c| c.state == ConnectionState::Disconnected)?;
        slot.peer = Some(peer);
        slot.state = ConnectionState::Connecting;
        self.peers.insert(peer, slot.id);
        info!("{} assigned player slot {}", peer, slot.id);
        Some(slot.id)
    }

    /// Resets a slot and forgets its peer mapping
    pub fn release(&mut self, id: u8) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            if let Some(peer) = slot.peer {
                self.peers.remove(&peer);
            }
            slot.reset();
        }
    }

    pub fn by_peer(&self, peer: PeerId) -> Option<u8> {
        self.peers.get(&peer).copied()
    }

    pub fn get(&self, id: u8) -> Option<&Connection> {
        self.slots.get(id as usize)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut Connection> {
        self.slots.get_mut(id as usize)
    }

    /// All slots in id order, including disconnected ones
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.slots.iter_mut()
    }

    pub fn connected(&self) -> impl Iterator<Item = &Connection> {
        self.slots.iter().filter(|c| c.is_connected())
    }

    /// Lowest-id slot still waiting for its map
    pub fn first_connecting(&self) -> Option<u8> {
        self.slots
            .iter()
            .find(|c| c.state == ConnectionState::Connecting)
            .map(|c| c.id)
    }

    /// True when some other joined player already uses `name`
    pub fn name_taken(&self, name: &PlayerName, except: u8) -> bool {
        self.slots
            .iter()
            .any(|c| {
                c.id != except && c.joined && c.name.as_str().eq_ignore_ascii_case(name.as_str())
            })
    }
}
