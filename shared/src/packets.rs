//! Packet model: one discriminant byte followed by a fixed, type-specific
//! payload.
//!
//! Discriminant 5 is shared by two packets that travel in opposite
//! directions (hit claims from clients, health updates from the server), so
//! decoding needs to know which side sent the bytes; see [`Origin`].

use crate::codec::{CodecError, Reader, WireEnum, Writer};
use crate::math::{IVec3, Vec3};
use crate::types::{
    BlockActionKind, ChatType, Color, DamageType, GameMode, HitType, InputFlags, KillType, Team,
    Tool, Weapon, WeaponFlags,
};
use crate::MAX_PLAYERS;
use std::borrow::Cow;
use std::fmt;

/// Upper bound on a map chunk payload.
pub const MAP_CHUNK_MAX: usize = 8192;
/// Player names travel as at most this many bytes.
pub const NAME_MAX: usize = 16;
/// Team names are fixed-width, zero padded.
pub const TEAM_NAME_LEN: usize = 10;
/// Chat text is truncated to this many bytes.
pub const CHAT_MAX: usize = 255;

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum PacketId {
        Position = 0,
        Orientation = 1,
        WorldUpdate = 2,
        Input = 3,
        WeaponInput = 4,
        HitOrSetHp = 5,
        Grenade = 6,
        SetTool = 7,
        SetColor = 8,
        ExistingPlayer = 9,
        MoveObject = 11,
        CreatePlayer = 12,
        BlockAction = 13,
        BlockLine = 14,
        StateData = 15,
        KillAction = 16,
        Chat = 17,
        MapStart = 18,
        MapChunk = 19,
        PlayerLeft = 20,
        IntelCapture = 23,
        IntelPickup = 24,
        IntelDrop = 25,
        Restock = 26,
        WeaponReload = 28,
        ChangeTeam = 29,
        ChangeWeapon = 30,
    }
}

impl PacketId {
    pub const ALL: [PacketId; 27] = [
        PacketId::Position,
        PacketId::Orientation,
        PacketId::WorldUpdate,
        PacketId::Input,
        PacketId::WeaponInput,
        PacketId::HitOrSetHp,
        PacketId::Grenade,
        PacketId::SetTool,
        PacketId::SetColor,
        PacketId::ExistingPlayer,
        PacketId::MoveObject,
        PacketId::CreatePlayer,
        PacketId::BlockAction,
        PacketId::BlockLine,
        PacketId::StateData,
        PacketId::KillAction,
        PacketId::Chat,
        PacketId::MapStart,
        PacketId::MapChunk,
        PacketId::PlayerLeft,
        PacketId::IntelCapture,
        PacketId::IntelPickup,
        PacketId::IntelDrop,
        PacketId::Restock,
        PacketId::WeaponReload,
        PacketId::ChangeTeam,
        PacketId::ChangeWeapon,
    ];

    /// Largest encoded size of this packet kind, discriminant included.
    pub const fn max_len(self) -> usize {
        match self {
            PacketId::Position | PacketId::Orientation => 13,
            PacketId::WorldUpdate => 1 + MAX_PLAYERS * 24,
            PacketId::Input | PacketId::WeaponInput => 3,
            PacketId::HitOrSetHp => 15,
            PacketId::Grenade => 30,
            PacketId::SetTool => 3,
            PacketId::SetColor => 5,
            PacketId::ExistingPlayer => 12 + NAME_MAX,
            PacketId::MoveObject => 15,
            PacketId::CreatePlayer => 16 + NAME_MAX,
            PacketId::BlockAction => 15,
            PacketId::BlockLine => 26,
            PacketId::StateData => 84,
            PacketId::KillAction => 5,
            PacketId::Chat => 3 + CHAT_MAX,
            PacketId::MapStart => 5,
            PacketId::MapChunk => 1 + MAP_CHUNK_MAX,
            PacketId::PlayerLeft => 2,
            PacketId::IntelCapture => 3,
            PacketId::IntelPickup => 2,
            PacketId::IntelDrop => 14,
            PacketId::Restock => 2,
            PacketId::WeaponReload => 4,
            PacketId::ChangeTeam | PacketId::ChangeWeapon => 3,
        }
    }

    /// Latency-sensitive "last value wins" traffic goes unreliable.
    pub const fn is_reliable(self) -> bool {
        !matches!(
            self,
            PacketId::WorldUpdate | PacketId::Input | PacketId::WeaponInput
        )
    }

    /// Dense index for per-kind tables.
    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|id| *id == self)
            .unwrap_or_default()
    }
}

/// Which end of the connection produced a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Client,
    Server,
}

/// Player name held inline so packets stay allocation free.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerName {
    bytes: [u8; NAME_MAX],
    len: u8,
}

impl PlayerName {
    /// Keeps printable ASCII only, trimmed and cut to 15 bytes.
    pub fn sanitize(raw: &[u8]) -> Self {
        let mut name = PlayerName::default();
        let text = raw.split(|b| *b == 0).next().unwrap_or_default();
        for &byte in text.iter().filter(|b| (0x20..0x7F).contains(*b)) {
            if name.len as usize >= NAME_MAX - 1 {
                break;
            }
            name.bytes[name.len as usize] = byte;
            name.len += 1;
        }
        while name.len > 0 && name.bytes[name.len as usize - 1] == b' ' {
            name.len -= 1;
        }
        let leading = name.as_bytes().iter().take_while(|b| **b == b' ').count();
        if leading > 0 {
            name.bytes.copy_within(leading..name.len as usize, 0);
            name.len -= leading as u8;
        }
        name
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn as_str(&self) -> &str {
        // sanitize() only admits ASCII
        std::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl From<&str> for PlayerName {
    fn from(value: &str) -> Self {
        PlayerName::sanitize(value.as_bytes())
    }
}

impl fmt::Debug for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerTransform {
    pub position: Vec3,
    pub orientation: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldUpdate {
    pub players: [PlayerTransform; MAX_PLAYERS],
}

impl Default for WorldUpdate {
    fn default() -> Self {
        Self {
            players: [PlayerTransform::default(); MAX_PLAYERS],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputData {
    pub player_id: u8,
    pub keys: InputFlags,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponInput {
    pub player_id: u8,
    pub buttons: WeaponFlags,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub target: u8,
    pub hit_type: HitType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetHp {
    pub hp: u8,
    pub damage_type: DamageType,
    pub source: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrenadeThrown {
    pub player_id: u8,
    pub fuse: f32,
    pub position: Vec3,
    pub velocity: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetTool {
    pub player_id: u8,
    pub tool: Tool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetColor {
    pub player_id: u8,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExistingPlayer {
    pub player_id: u8,
    pub team: Team,
    pub weapon: Weapon,
    pub tool: Tool,
    pub kills: u32,
    pub color: Color,
    pub name: PlayerName,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveObject {
    pub object_id: u8,
    pub team: Team,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreatePlayer {
    pub player_id: u8,
    pub weapon: Weapon,
    pub team: Team,
    pub position: Vec3,
    pub name: PlayerName,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockAction {
    pub player_id: u8,
    pub action: BlockActionKind,
    pub position: IVec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockLine {
    pub player_id: u8,
    pub start: IVec3,
    pub end: IVec3,
}

/// Where an intel is, as carried by the state snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntelLocation {
    Held(u8),
    Ground(Vec3),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CtfState {
    pub scores: [u8; 2],
    pub capture_limit: u8,
    pub intels: [IntelLocation; 2],
    pub bases: [Vec3; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateData {
    pub player_id: u8,
    pub fog_color: Color,
    pub team_colors: [Color; 2],
    pub team_names: [[u8; TEAM_NAME_LEN]; 2],
    pub ctf: CtfState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KillAction {
    pub player_id: u8,
    pub killer_id: u8,
    pub kill_type: KillType,
    pub respawn_time: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage<'a> {
    pub player_id: u8,
    pub chat_type: ChatType,
    pub message: Cow<'a, str>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntelCapture {
    pub player_id: u8,
    pub winning: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntelDrop {
    pub player_id: u8,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponReload {
    pub player_id: u8,
    pub clip: u8,
    pub reserve: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeTeam {
    pub player_id: u8,
    pub team: Team,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeWeapon {
    pub player_id: u8,
    pub weapon: Weapon,
}

/// Every message of the protocol, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet<'a> {
    Position(Vec3),
    Orientation(Vec3),
    WorldUpdate(Box<WorldUpdate>),
    Input(InputData),
    WeaponInput(WeaponInput),
    Hit(Hit),
    SetHp(SetHp),
    Grenade(GrenadeThrown),
    SetTool(SetTool),
    SetColor(SetColor),
    ExistingPlayer(ExistingPlayer),
    MoveObject(MoveObject),
    CreatePlayer(CreatePlayer),
    BlockAction(BlockAction),
    BlockLine(BlockLine),
    StateData(StateData),
    KillAction(KillAction),
    Chat(ChatMessage<'a>),
    MapStart { size: u32 },
    MapChunk(&'a [u8]),
    PlayerLeft { player_id: u8 },
    IntelCapture(IntelCapture),
    IntelPickup { player_id: u8 },
    IntelDrop(IntelDrop),
    Restock { player_id: u8 },
    WeaponReload(WeaponReload),
    ChangeTeam(ChangeTeam),
    ChangeWeapon(ChangeWeapon),
}

impl<'a> Packet<'a> {
    pub fn id(&self) -> PacketId {
        match self {
            Packet::Position(_) => PacketId::Position,
            Packet::Orientation(_) => PacketId::Orientation,
            Packet::WorldUpdate(_) => PacketId::WorldUpdate,
            Packet::Input(_) => PacketId::Input,
            Packet::WeaponInput(_) => PacketId::WeaponInput,
            Packet::Hit(_) | Packet::SetHp(_) => PacketId::HitOrSetHp,
            Packet::Grenade(_) => PacketId::Grenade,
            Packet::SetTool(_) => PacketId::SetTool,
            Packet::SetColor(_) => PacketId::SetColor,
            Packet::ExistingPlayer(_) => PacketId::ExistingPlayer,
            Packet::MoveObject(_) => PacketId::MoveObject,
            Packet::CreatePlayer(_) => PacketId::CreatePlayer,
            Packet::BlockAction(_) => PacketId::BlockAction,
            Packet::BlockLine(_) => PacketId::BlockLine,
            Packet::StateData(_) => PacketId::StateData,
            Packet::KillAction(_) => PacketId::KillAction,
            Packet::Chat(_) => PacketId::Chat,
            Packet::MapStart { .. } => PacketId::MapStart,
            Packet::MapChunk(_) => PacketId::MapChunk,
            Packet::PlayerLeft { .. } => PacketId::PlayerLeft,
            Packet::IntelCapture(_) => PacketId::IntelCapture,
            Packet::IntelPickup { .. } => PacketId::IntelPickup,
            Packet::IntelDrop(_) => PacketId::IntelDrop,
            Packet::Restock { .. } => PacketId::Restock,
            Packet::WeaponReload(_) => PacketId::WeaponReload,
            Packet::ChangeTeam(_) => PacketId::ChangeTeam,
            Packet::ChangeWeapon(_) => PacketId::ChangeWeapon,
        }
    }

    /// Writes discriminant and payload into `w`.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), CodecError> {
        w.write_enum(self.id())?;
        match self {
            Packet::Position(v) | Packet::Orientation(v) => w.write_vec3(*v),
            Packet::WorldUpdate(update) => {
                for player in update.players.iter() {
                    w.write_vec3(player.position)?;
                    w.write_vec3(player.orientation)?;
                }
                Ok(())
            }
            Packet::Input(p) => {
                w.write_u8(p.player_id)?;
                w.write_u8(p.keys.0)
            }
            Packet::WeaponInput(p) => {
                w.write_u8(p.player_id)?;
                w.write_u8(p.buttons.0)
            }
            Packet::Hit(p) => {
                w.write_u8(p.target)?;
                w.write_enum(p.hit_type)
            }
            Packet::SetHp(p) => {
                w.write_u8(p.hp)?;
                w.write_enum(p.damage_type)?;
                w.write_vec3(p.source)
            }
            Packet::Grenade(p) => {
                w.write_u8(p.player_id)?;
                w.write_f32(p.fuse)?;
                w.write_vec3(p.position)?;
                w.write_vec3(p.velocity)
            }
            Packet::SetTool(p) => {
                w.write_u8(p.player_id)?;
                w.write_enum(p.tool)
            }
            Packet::SetColor(p) => {
                w.write_u8(p.player_id)?;
                w.write_color(p.color)
            }
            Packet::ExistingPlayer(p) => {
                w.write_u8(p.player_id)?;
                w.write_enum(p.team)?;
                w.write_enum(p.weapon)?;
                w.write_enum(p.tool)?;
                w.write_u32(p.kills)?;
                w.write_color(p.color)?;
                w.write_bytes(p.name.as_bytes())
            }
            Packet::MoveObject(p) => {
                w.write_u8(p.object_id)?;
                w.write_enum(p.team)?;
                w.write_vec3(p.position)
            }
            Packet::CreatePlayer(p) => {
                w.write_u8(p.player_id)?;
                w.write_enum(p.weapon)?;
                w.write_enum(p.team)?;
                w.write_vec3(p.position)?;
                w.write_bytes(p.name.as_bytes())
            }
            Packet::BlockAction(p) => {
                w.write_u8(p.player_id)?;
                w.write_enum(p.action)?;
                w.write_ivec3(p.position)
            }
            Packet::BlockLine(p) => {
                w.write_u8(p.player_id)?;
                w.write_ivec3(p.start)?;
                w.write_ivec3(p.end)
            }
            Packet::StateData(p) => encode_state_data(w, p),
            Packet::KillAction(p) => {
                w.write_u8(p.player_id)?;
                w.write_u8(p.killer_id)?;
                w.write_enum(p.kill_type)?;
                w.write_u8(p.respawn_time)
            }
            Packet::Chat(p) => {
                w.write_u8(p.player_id)?;
                w.write_enum(p.chat_type)?;
                let bytes = p.message.as_bytes();
                w.write_bytes(&bytes[..bytes.len().min(CHAT_MAX)])
            }
            Packet::MapStart { size } => w.write_u32(*size),
            Packet::MapChunk(data) => w.write_bytes(data),
            Packet::PlayerLeft { player_id }
            | Packet::IntelPickup { player_id }
            | Packet::Restock { player_id } => w.write_u8(*player_id),
            Packet::IntelCapture(p) => {
                w.write_u8(p.player_id)?;
                w.write_u8(p.winning as u8)
            }
            Packet::IntelDrop(p) => {
                w.write_u8(p.player_id)?;
                w.write_vec3(p.position)
            }
            Packet::WeaponReload(p) => {
                w.write_u8(p.player_id)?;
                w.write_u8(p.clip)?;
                w.write_u8(p.reserve)
            }
            Packet::ChangeTeam(p) => {
                w.write_u8(p.player_id)?;
                w.write_enum(p.team)
            }
            Packet::ChangeWeapon(p) => {
                w.write_u8(p.player_id)?;
                w.write_enum(p.weapon)
            }
        }
    }

    /// Decodes one packet sent by `origin`.
    pub fn decode(bytes: &'a [u8], origin: Origin) -> Result<Packet<'a>, CodecError> {
        let mut r = Reader::new(bytes);
        let raw = r.read_u8().map_err(|_| CodecError::Empty)?;
        let id = PacketId::from_byte(raw).ok_or(CodecError::UnknownPacket(raw))?;
        if origin == Origin::Client && !accepted_from_client(id) {
            return Err(CodecError::UnexpectedPacket(raw));
        }

        let packet = match id {
            PacketId::Position => Packet::Position(r.read_vec3()?),
            PacketId::Orientation => Packet::Orientation(r.read_vec3()?),
            PacketId::WorldUpdate => {
                let mut update = Box::<WorldUpdate>::default();
                for player in update.players.iter_mut() {
                    player.position = r.read_vec3()?;
                    player.orientation = r.read_vec3()?;
                }
                Packet::WorldUpdate(update)
            }
            PacketId::Input => Packet::Input(InputData {
                player_id: r.read_u8()?,
                keys: InputFlags(r.read_u8()?),
            }),
            PacketId::WeaponInput => Packet::WeaponInput(WeaponInput {
                player_id: r.read_u8()?,
                buttons: WeaponFlags(r.read_u8()?),
            }),
            PacketId::HitOrSetHp => match origin {
                Origin::Client => Packet::Hit(Hit {
                    target: r.read_u8()?,
                    hit_type: r.read_enum()?,
                }),
                Origin::Server => Packet::SetHp(SetHp {
                    hp: r.read_u8()?,
                    damage_type: r.read_enum()?,
                    source: r.read_vec3()?,
                }),
            },
            PacketId::Grenade => Packet::Grenade(GrenadeThrown {
                player_id: r.read_u8()?,
                fuse: r.read_f32()?,
                position: r.read_vec3()?,
                velocity: r.read_vec3()?,
            }),
            PacketId::SetTool => Packet::SetTool(SetTool {
                player_id: r.read_u8()?,
                tool: r.read_enum()?,
            }),
            PacketId::SetColor => Packet::SetColor(SetColor {
                player_id: r.read_u8()?,
                color: r.read_color()?,
            }),
            PacketId::ExistingPlayer => Packet::ExistingPlayer(ExistingPlayer {
                player_id: r.read_u8()?,
                team: r.read_enum()?,
                weapon: r.read_enum()?,
                tool: r.read_enum()?,
                kills: r.read_u32()?,
                color: r.read_color()?,
                name: PlayerName::sanitize(r.read_rest()),
            }),
            PacketId::MoveObject => Packet::MoveObject(MoveObject {
                object_id: r.read_u8()?,
                team: r.read_enum()?,
                position: r.read_vec3()?,
            }),
            PacketId::CreatePlayer => Packet::CreatePlayer(CreatePlayer {
                player_id: r.read_u8()?,
                weapon: r.read_enum()?,
                team: r.read_enum()?,
                position: r.read_vec3()?,
                name: PlayerName::sanitize(r.read_rest()),
            }),
            PacketId::BlockAction => Packet::BlockAction(BlockAction {
                player_id: r.read_u8()?,
                action: r.read_enum()?,
                position: r.read_ivec3()?,
            }),
            PacketId::BlockLine => Packet::BlockLine(BlockLine {
                player_id: r.read_u8()?,
                start: r.read_ivec3()?,
                end: r.read_ivec3()?,
            }),
            PacketId::StateData => Packet::StateData(decode_state_data(&mut r)?),
            PacketId::KillAction => Packet::KillAction(KillAction {
                player_id: r.read_u8()?,
                killer_id: r.read_u8()?,
                kill_type: r.read_enum()?,
                respawn_time: r.read_u8()?,
            }),
            PacketId::Chat => {
                let player_id = r.read_u8()?;
                let chat_type = r.read_enum()?;
                let text = r.read_rest();
                let text = text.split(|b| *b == 0).next().unwrap_or_default();
                Packet::Chat(ChatMessage {
                    player_id,
                    chat_type,
                    message: String::from_utf8_lossy(&text[..text.len().min(CHAT_MAX)]),
                })
            }
            PacketId::MapStart => Packet::MapStart {
                size: r.read_u32()?,
            },
            PacketId::MapChunk => Packet::MapChunk(r.read_rest()),
            PacketId::PlayerLeft => Packet::PlayerLeft {
                player_id: r.read_u8()?,
            },
            PacketId::IntelCapture => Packet::IntelCapture(IntelCapture {
                player_id: r.read_u8()?,
                winning: r.read_u8()? != 0,
            }),
            PacketId::IntelPickup => Packet::IntelPickup {
                player_id: r.read_u8()?,
            },
            PacketId::IntelDrop => Packet::IntelDrop(IntelDrop {
                player_id: r.read_u8()?,
                position: r.read_vec3()?,
            }),
            PacketId::Restock => Packet::Restock {
                player_id: r.read_u8()?,
            },
            PacketId::WeaponReload => Packet::WeaponReload(WeaponReload {
                player_id: r.read_u8()?,
                clip: r.read_u8()?,
                reserve: r.read_u8()?,
            }),
            PacketId::ChangeTeam => Packet::ChangeTeam(ChangeTeam {
                player_id: r.read_u8()?,
                team: r.read_enum()?,
            }),
            PacketId::ChangeWeapon => Packet::ChangeWeapon(ChangeWeapon {
                player_id: r.read_u8()?,
                weapon: r.read_enum()?,
            }),
        };
        Ok(packet)
    }
}

fn accepted_from_client(id: PacketId) -> bool {
    matches!(
        id,
        PacketId::Position
            | PacketId::Orientation
            | PacketId::Input
            | PacketId::WeaponInput
            | PacketId::HitOrSetHp
            | PacketId::Grenade
            | PacketId::SetTool
            | PacketId::SetColor
            | PacketId::ExistingPlayer
            | PacketId::BlockAction
            | PacketId::BlockLine
            | PacketId::Chat
            | PacketId::WeaponReload
            | PacketId::ChangeTeam
            | PacketId::ChangeWeapon
    )
}

/// Bit set in the intel flags byte when that team's intel is carried.
fn intel_held_bit(team_index: usize) -> u8 {
    1 << team_index
}

fn encode_state_data(w: &mut Writer<'_>, p: &StateData) -> Result<(), CodecError> {
    w.write_u8(p.player_id)?;
    w.write_color(p.fog_color)?;
    w.write_color(p.team_colors[0])?;
    w.write_color(p.team_colors[1])?;
    w.write_bytes(&p.team_names[0])?;
    w.write_bytes(&p.team_names[1])?;
    w.write_enum(GameMode::Ctf)?;

    let ctf = &p.ctf;
    w.write_u8(ctf.scores[0])?;
    w.write_u8(ctf.scores[1])?;
    w.write_u8(ctf.capture_limit)?;
    let mut flags = 0;
    for (i, intel) in ctf.intels.iter().enumerate() {
        if matches!(intel, IntelLocation::Held(_)) {
            flags |= intel_held_bit(i);
        }
    }
    w.write_u8(flags)?;
    for intel in ctf.intels.iter() {
        match intel {
            IntelLocation::Held(holder) => {
                w.write_u8(*holder)?;
                w.skip(11)?;
            }
            IntelLocation::Ground(position) => w.write_vec3(*position)?,
        }
    }
    w.write_vec3(ctf.bases[0])?;
    w.write_vec3(ctf.bases[1])
}

fn decode_state_data(r: &mut Reader<'_>) -> Result<StateData, CodecError> {
    let player_id = r.read_u8()?;
    let fog_color = r.read_color()?;
    let team_colors = [r.read_color()?, r.read_color()?];
    let mut team_names = [[0u8; TEAM_NAME_LEN]; 2];
    for name in team_names.iter_mut() {
        name.copy_from_slice(r.read_bytes(TEAM_NAME_LEN)?);
    }
    let mode: GameMode = r.read_enum()?;
    if mode != GameMode::Ctf {
        return Err(CodecError::InvalidEnum {
            name: "GameMode",
            value: mode.to_byte(),
        });
    }

    let scores = [r.read_u8()?, r.read_u8()?];
    let capture_limit = r.read_u8()?;
    let flags = r.read_u8()?;
    let mut intels = [IntelLocation::Ground(Vec3::ZERO); 2];
    for (i, intel) in intels.iter_mut().enumerate() {
        *intel = if flags & intel_held_bit(i) != 0 {
            let holder = r.read_u8()?;
            r.skip(11)?;
            IntelLocation::Held(holder)
        } else {
            IntelLocation::Ground(r.read_vec3()?)
        };
    }
    let bases = [r.read_vec3()?, r.read_vec3()?];

    Ok(StateData {
        player_id,
        fog_color,
        team_colors,
        team_names,
        ctf: CtfState {
            scores,
            capture_limit,
            intels,
            bases,
        },
    })
}

/// Pads or cuts a team name to its fixed wire width.
pub fn team_name_bytes(name: &str) -> [u8; TEAM_NAME_LEN] {
    let mut out = [0u8; TEAM_NAME_LEN];
    for (slot, byte) in out.iter_mut().zip(name.bytes().filter(u8::is_ascii)) {
        *slot = byte;
    }
    out
}
