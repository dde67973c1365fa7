//! Protocol enums and small value types shared by both ends of the wire.

use serde::{Deserialize, Serialize};

/// RGB color. Stored as RGB in memory, sent as BGR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Packs into `0x00RRGGBB`, the in-memory voxel color layout.
    pub const fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub const fn from_u32(value: u32) -> Self {
        Self {
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }
}

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum Team {
        A = 0,
        B = 1,
        Spectator = 255,
    }
}

impl Team {
    /// The opposing playing team; spectators have none.
    pub fn other(self) -> Option<Team> {
        match self {
            Team::A => Some(Team::B),
            Team::B => Some(Team::A),
            Team::Spectator => None,
        }
    }

    /// Index into per-team arrays.
    pub fn index(self) -> Option<usize> {
        match self {
            Team::A => Some(0),
            Team::B => Some(1),
            Team::Spectator => None,
        }
    }

    pub fn is_playing(self) -> bool {
        self != Team::Spectator
    }
}

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum Weapon {
        Rifle = 0,
        Smg = 1,
        Shotgun = 2,
    }
}

impl Weapon {
    /// Rounds per clip and reserve rounds on spawn or restock.
    pub fn ammo(self) -> (u8, u8) {
        match self {
            Weapon::Rifle => (10, 50),
            Weapon::Smg => (30, 120),
            Weapon::Shotgun => (6, 48),
        }
    }

    pub fn damage(self, hit: HitType) -> u8 {
        match (self, hit) {
            (_, HitType::Melee) => 80,
            (Weapon::Rifle, HitType::Head) => 100,
            (Weapon::Rifle, HitType::Torso) => 49,
            (Weapon::Rifle, _) => 33,
            (Weapon::Smg, HitType::Head) => 75,
            (Weapon::Smg, HitType::Torso) => 29,
            (Weapon::Smg, _) => 18,
            (Weapon::Shotgun, HitType::Head) => 37,
            (Weapon::Shotgun, HitType::Torso) => 27,
            (Weapon::Shotgun, _) => 16,
        }
    }
}

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Tool {
        Spade = 0,
        Block = 1,
        Gun = 2,
        Grenade = 3,
    }
}

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum HitType {
        Torso = 0,
        Head = 1,
        Arms = 2,
        Legs = 3,
        Melee = 4,
    }
}

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum KillType {
        Weapon = 0,
        Headshot = 1,
        Melee = 2,
        Grenade = 3,
        Fall = 4,
        TeamChange = 5,
        ClassChange = 6,
    }
}

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum DamageType {
        Fall = 0,
        Weapon = 1,
    }
}

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum BlockActionKind {
        Build = 0,
        /// Single cell, by bullet or spade swing.
        Destroy = 1,
        /// Spade secondary: the cell and its vertical neighbors.
        SpadeDestroy = 2,
        GrenadeDestroy = 3,
    }
}

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ChatType {
        All = 0,
        Team = 1,
        System = 2,
    }
}

crate::wire_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum GameMode {
        Ctf = 0,
        Territory = 1,
    }
}

crate::wire_enum! {
    /// Reason code delivered with a refused or terminated connection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum DisconnectReason {
        Undefined = 0,
        Banned = 1,
        IpLimit = 2,
        WrongVersion = 3,
        ServerFull = 4,
        Kicked = 10,
    }
}

/// Movement key bitmask carried by input packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFlags(pub u8);

impl InputFlags {
    pub const FORWARD: u8 = 1 << 0;
    pub const BACKWARD: u8 = 1 << 1;
    pub const LEFT: u8 = 1 << 2;
    pub const RIGHT: u8 = 1 << 3;
    pub const JUMP: u8 = 1 << 4;
    pub const CROUCH: u8 = 1 << 5;
    pub const SNEAK: u8 = 1 << 6;
    pub const SPRINT: u8 = 1 << 7;

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn forward(self) -> bool {
        self.contains(Self::FORWARD)
    }

    pub fn backward(self) -> bool {
        self.contains(Self::BACKWARD)
    }

    pub fn left(self) -> bool {
        self.contains(Self::LEFT)
    }

    pub fn right(self) -> bool {
        self.contains(Self::RIGHT)
    }

    pub fn jump(self) -> bool {
        self.contains(Self::JUMP)
    }

    pub fn crouch(self) -> bool {
        self.contains(Self::CROUCH)
    }

    pub fn sneak(self) -> bool {
        self.contains(Self::SNEAK)
    }

    pub fn sprint(self) -> bool {
        self.contains(Self::SPRINT)
    }
}

/// Fire button bitmask carried by weapon-input packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeaponFlags(pub u8);

impl WeaponFlags {
    pub const PRIMARY: u8 = 1 << 0;
    pub const SECONDARY: u8 = 1 << 1;

    pub fn primary(self) -> bool {
        self.0 & Self::PRIMARY != 0
    }

    pub fn secondary(self) -> bool {
        self.0 & Self::SECONDARY != 0
    }
}
