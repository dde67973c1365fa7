//! Damage rules: validated hit claims, live grenades and blast falloff.

use crate::connection::Connection;
use log::trace;
use shared::physics::{Bounce, GrenadeBody};
use shared::types::{HitType, KillType};
use shared::{Tool, Vec3, VoxelMap};
use thiserror::Error;

/// Furthest a spade swing can connect.
pub const MELEE_RANGE: f32 = 3.0;
/// Players beyond this distance from a blast take no damage.
pub const GRENADE_RADIUS: f32 = 16.0;
/// Fuses longer than this are clamped.
pub const MAX_FUSE: f32 = 3.0;

/// Why a client's hit claim was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum HitRejected {
    #[error("attacker is not in play")]
    AttackerInactive,
    #[error("target {0} is not in play")]
    TargetInactive(u8),
    #[error("target {0} is on the same team")]
    FriendlyFire(u8),
    #[error("melee hit while holding {0:?}")]
    NotSpade(Tool),
    #[error("weapon hit while holding {0:?}")]
    NotGun(Tool),
    #[error("target {target} out of melee range ({distance:.1})")]
    OutOfRange { target: u8, distance: f32 },
}

/// Checks a hit claim against server state and returns the damage it deals.
pub fn validate_hit(
    attacker: &Connection,
    target: &Connection,
    hit: HitType,
) -> Result<u8, HitRejected> {
    if !attacker.is_active() {
        return Err(HitRejected::AttackerInactive);
    }
    if !target.is_active() {
        return Err(HitRejected::TargetInactive(target.id));
    }
    if attacker.team == target.team {
        return Err(HitRejected::FriendlyFire(target.id));
    }
    match hit {
        HitType::Melee => {
            if attacker.tool() != Tool::Spade {
                return Err(HitRejected::NotSpade(attacker.tool()));
            }
            let distance = attacker.body.position.distance(&target.body.position);
            if distance > MELEE_RANGE {
                return Err(HitRejected::OutOfRange {
                    target: target.id,
                    distance,
                });
            }
        }
        _ => {
            if attacker.tool() != Tool::Gun {
                return Err(HitRejected::NotGun(attacker.tool()));
            }
        }
    }
    Ok(attacker.weapon.damage(hit))
}

pub fn kill_type_for(hit: HitType) -> KillType {
    match hit {
        HitType::Head => KillType::Headshot,
        HitType::Melee => KillType::Melee,
        _ => KillType::Weapon,
    }
}

/// Inverse-square falloff, capped at a full health bar.
pub fn grenade_damage(distance: f32) -> u8 {
    if !(0.0..GRENADE_RADIUS).contains(&distance) {
        return 0;
    }
    let damage = 4096.0 / (distance * distance).max(1.0);
    damage.min(100.0) as u8
}

/// A thrown grenade simulated until its fuse runs out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveGrenade {
    pub owner: u8,
    pub body: GrenadeBody,
    pub fuse: f32,
}

impl LiveGrenade {
    pub fn new(owner: u8, position: Vec3, velocity: Vec3, fuse: f32) -> Self {
        Self {
            owner,
            body: GrenadeBody::new(position, velocity),
            fuse: fuse.clamp(0.0, MAX_FUSE),
        }
    }

    /// Moves the grenade one step. Returns true once the fuse has burnt out.
    pub fn update(&mut self, map: &VoxelMap, dt: f32) -> bool {
        self.fuse -= dt;
        if self.fuse <= 0.0 {
            return true;
        }
        if self.body.move_grenade(map, dt) == Bounce::Loud {
            trace!("Grenade from {} bounced at {:?}", self.owner, self.body.position);
        }
        false
    }

    pub fn position(&self) -> Vec3 {
        self.body.position
    }
}
