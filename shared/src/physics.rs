//! Player movement and grenade flight against the voxel grid.
//!
//! Velocities are expressed in blocks per 1/32 second, so every integration
//! step scales by `dt * 32`. Positions are eye positions; the body extends
//! downwards (increasing `z`) from there.

use crate::map::VoxelMap;
use crate::math::Vec3;
use crate::types::{InputFlags, Tool};

const JUMP_VELOCITY: f32 = -0.36;
const DIAGONAL_FACTOR: f32 = 0.707_106_78;
const FALL_SLOW_DOWN: f32 = 0.24;
const FALL_DAMAGE_VELOCITY: f32 = 0.58;
const FALL_DAMAGE_SCALAR: f32 = 4096.0;

const HALF_WIDTH: f32 = 0.45;
const CROUCH_SHIFT: f32 = 0.9;
/// Water-line depth below which a grounded player wades.
const WADE_DEPTH: f32 = 61.0;
const GRENADE_BOUNCE: f32 = 0.36;
const BOUNCE_SOUND_THRESHOLD: f32 = 0.1;

/// Damage for a landing at downward velocity `v`: 0 when gentle, -1 for a
/// harmless thud, otherwise `(v - 0.58)² × 4096` truncated.
pub fn fall_damage(v: f32) -> i32 {
    if v <= FALL_SLOW_DOWN {
        0
    } else if v <= FALL_DAMAGE_VELOCITY {
        -1
    } else {
        let excess = v - FALL_DAMAGE_VELOCITY;
        (excess * excess * FALL_DAMAGE_SCALAR) as i32
    }
}

/// Outcome of one movement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    None,
    /// Touched down hard enough for a sound cue but no damage.
    Soft,
    Hard(i32),
}

impl Landing {
    fn from_code(code: i32) -> Self {
        match code {
            0 => Landing::None,
            -1 => Landing::Soft,
            damage => Landing::Hard(damage),
        }
    }

    /// `0`, `-1`, or the fall damage.
    pub fn code(self) -> i32 {
        match self {
            Landing::None => 0,
            Landing::Soft => -1,
            Landing::Hard(damage) => damage,
        }
    }
}

/// Kinematic state of one player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerBody {
    pub position: Vec3,
    pub velocity: Vec3,
    forward: Vec3,
    strafe: Vec3,
    pub input: InputFlags,
    pub secondary_fire: bool,
    pub tool: Tool,
    pub airborne: bool,
    pub crouch: bool,
    pub wade: bool,
}

impl Default for PlayerBody {
    fn default() -> Self {
        Self::new(Vec3::ZERO)
    }
}

impl PlayerBody {
    pub fn new(position: Vec3) -> Self {
        let mut body = Self {
            position,
            velocity: Vec3::ZERO,
            forward: Vec3::ZERO,
            strafe: Vec3::ZERO,
            input: InputFlags::default(),
            secondary_fire: false,
            tool: Tool::Gun,
            airborne: false,
            crouch: false,
            wade: false,
        };
        body.set_orientation(Vec3::new(1.0, 0.0, 0.0));
        body
    }

    pub fn orientation(&self) -> Vec3 {
        self.forward
    }

    /// Updates the view direction and the strafe axis derived from it.
    /// Non-finite or zero vectors are ignored.
    pub fn set_orientation(&mut self, orientation: Vec3) {
        let forward = orientation.normalize();
        if !forward.is_finite() || forward == Vec3::ZERO {
            return;
        }
        self.forward = forward;
        let horizontal = (forward.x * forward.x + forward.y * forward.y).sqrt();
        self.strafe = if horizontal > 0.0 {
            Vec3::new(-forward.y / horizontal, forward.x / horizontal, 0.0)
        } else {
            Vec3::ZERO
        };
    }

    /// Applies a new key state, toggling crouch when its bit changes.
    pub fn apply_input(&mut self, input: InputFlags, map: &VoxelMap) {
        self.input = input;
        if input.crouch() != self.crouch {
            self.set_crouch(input.crouch(), map);
        }
    }

    /// Crouching lowers the eye by a fixed step. Standing back up needs
    /// headroom; without it the player stays crouched.
    pub fn set_crouch(&mut self, crouch: bool, map: &VoxelMap) -> bool {
        if crouch == self.crouch {
            return true;
        }
        if crouch {
            self.position.z += CROUCH_SHIFT;
        } else {
            let head = self.position.z - CROUCH_SHIFT - HALF_WIDTH;
            if self.corners_clip(self.position.x, self.position.y, head, map) {
                return false;
            }
            self.position.z -= CROUCH_SHIFT;
        }
        self.crouch = crouch;
        true
    }

    fn corners_clip(&self, x: f32, y: f32, z: f32, map: &VoxelMap) -> bool {
        map.is_clip_box(x - HALF_WIDTH, y - HALF_WIDTH, z)
            || map.is_clip_box(x - HALF_WIDTH, y + HALF_WIDTH, z)
            || map.is_clip_box(x + HALF_WIDTH, y - HALF_WIDTH, z)
            || map.is_clip_box(x + HALF_WIDTH, y + HALF_WIDTH, z)
    }

    fn speed_factor(&self, dt: f32) -> f32 {
        let input = self.input;
        let mut f = dt;
        if self.airborne {
            f *= 0.1;
        } else if self.crouch {
            f *= 0.3;
        } else if (self.secondary_fire && self.tool == Tool::Gun) || input.sneak() {
            f *= 0.5;
        } else if input.sprint() {
            f *= 1.3;
        }
        if (input.forward() || input.backward()) && (input.left() || input.right()) {
            f *= DIAGONAL_FACTOR;
        }
        f
    }

    /// Advances the body by `dt` seconds and reports how it landed.
    pub fn move_player(&mut self, map: &VoxelMap, dt: f32) -> Landing {
        let input = self.input;
        if input.jump() && !self.airborne {
            self.velocity.z = JUMP_VELOCITY;
        }

        let f = self.speed_factor(dt);
        if input.forward() {
            self.velocity.x += self.forward.x * f;
            self.velocity.y += self.forward.y * f;
        } else if input.backward() {
            self.velocity.x -= self.forward.x * f;
            self.velocity.y -= self.forward.y * f;
        }
        if input.left() {
            self.velocity.x -= self.strafe.x * f;
            self.velocity.y -= self.strafe.y * f;
        } else if input.right() {
            self.velocity.x += self.strafe.x * f;
            self.velocity.y += self.strafe.y * f;
        }

        self.velocity.z += dt;
        self.velocity.z /= dt + 1.0;
        let drag = if self.wade {
            dt * 6.0 + 1.0
        } else if !self.airborne {
            dt * 4.0 + 1.0
        } else {
            dt + 1.0
        };
        self.velocity.x /= drag;
        self.velocity.y /= drag;

        let fall_velocity = self.velocity.z;
        self.box_clip_move(map, dt);

        if self.velocity.z == 0.0 && fall_velocity > FALL_SLOW_DOWN {
            self.velocity.x *= 0.5;
            self.velocity.y *= 0.5;
            return Landing::from_code(fall_damage(fall_velocity));
        }
        Landing::None
    }

    fn box_clip_move(&mut self, map: &VoxelMap, dt: f32) {
        let step = dt * 32.0;
        let nx = self.position.x + self.velocity.x * step;
        let ny = self.position.y + self.velocity.y * step;
        let (offset, mut m) = if self.crouch { (0.45, 0.9) } else { (0.9, 1.35) };
        let mut nz = self.position.z + offset;
        let can_climb = !self.crouch && self.forward.z < 0.5 && !self.input.sprint();
        let mut climb = false;

        let fx = if self.velocity.x < 0.0 { -HALF_WIDTH } else { HALF_WIDTH };
        let y = self.position.y;
        let x_blocked = |dz: f32| {
            map.is_clip_box(nx + fx, y - HALF_WIDTH, nz + dz)
                || map.is_clip_box(nx + fx, y + HALF_WIDTH, nz + dz)
        };
        if sweep_clear(&x_blocked, m, -1.36) {
            self.position.x = nx;
        } else if can_climb && sweep_clear(&x_blocked, 0.35, -2.36) {
            self.position.x = nx;
            climb = true;
        } else {
            self.velocity.x = 0.0;
        }

        let fy = if self.velocity.y < 0.0 { -HALF_WIDTH } else { HALF_WIDTH };
        let x = self.position.x;
        let y_blocked = |dz: f32| {
            map.is_clip_box(x - HALF_WIDTH, ny + fy, nz + dz)
                || map.is_clip_box(x + HALF_WIDTH, ny + fy, nz + dz)
        };
        if sweep_clear(&y_blocked, m, -1.36) {
            self.position.y = ny;
        } else if can_climb && !climb && sweep_clear(&y_blocked, 0.35, -2.36) {
            self.position.y = ny;
            climb = true;
        } else if !climb {
            self.velocity.y = 0.0;
        }

        if climb {
            self.velocity.x *= 0.5;
            self.velocity.y *= 0.5;
            nz -= 1.0;
            m = -1.35;
        } else {
            if self.velocity.z < 0.0 {
                m = -m;
            }
            nz += self.velocity.z * step;
        }

        self.airborne = true;
        if self.corners_clip(self.position.x, self.position.y, nz + m, map) {
            if self.velocity.z >= 0.0 {
                self.wade = self.position.z > WADE_DEPTH;
                self.airborne = false;
            }
            self.velocity.z = 0.0;
        } else {
            self.position.z = nz - offset;
        }
    }
}

/// Probes height offsets `start, start - 0.9, ...` down to `limit` and
/// reports whether all of them are clear.
fn sweep_clear(blocked: impl Fn(f32) -> bool, start: f32, limit: f32) -> bool {
    let mut z = start;
    while z >= limit && !blocked(z) {
        z -= 0.9;
    }
    z < limit
}

/// What a grenade did during one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bounce {
    None,
    Quiet,
    Loud,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrenadeBody {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl GrenadeBody {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self { position, velocity }
    }

    /// Integrates gravity and reflects off whichever face was crossed,
    /// losing most of the speed on each bounce.
    pub fn move_grenade(&mut self, map: &VoxelMap, dt: f32) -> Bounce {
        let previous = self.position;
        let step = dt * 32.0;
        self.velocity.z += dt;
        self.position = self.position + self.velocity * step;

        let cell = self.position.floor();
        let clip = |x: i32, y: i32, z: i32| map.is_clip_world(x as f32, y as f32, z as f32);
        if !clip(cell.x, cell.y, cell.z) {
            return Bounce::None;
        }

        let v = self.velocity;
        let bounce = if v.x.abs() > BOUNCE_SOUND_THRESHOLD
            || v.y.abs() > BOUNCE_SOUND_THRESHOLD
            || v.z.abs() > BOUNCE_SOUND_THRESHOLD
        {
            Bounce::Loud
        } else {
            Bounce::Quiet
        };

        let old = previous.floor();
        if cell.z != old.z && ((cell.x == old.x && cell.y == old.y) || !clip(cell.x, cell.y, old.z)) {
            self.velocity.z = -self.velocity.z;
        } else if cell.x != old.x
            && ((cell.y == old.y && cell.z == old.z) || !clip(old.x, cell.y, cell.z))
        {
            self.velocity.x = -self.velocity.x;
        } else if cell.y != old.y
            && ((cell.x == old.x && cell.z == old.z) || !clip(cell.x, old.y, cell.z))
        {
            self.velocity.y = -self.velocity.y;
        }
        self.position = previous;
        self.velocity = self.velocity * GRENADE_BOUNCE;
        bounce
    }
}
