//! Voxel map storage, the column span codec and spatial queries.
//!
//! The world is a dense 512×512×64 grid. `z` grows downwards: `z = 0` is
//! the sky layer and `z = 63` the water layer. Each cell carries a solid
//! bit and a color packed as `0x00RRGGBB`.
//!
//! The span format stores each (x, y) column as a chain of spans. A span
//! header is four bytes `span_size, top_start, top_end, air_start` followed
//! by 4-byte color words for the top run and, when the span is not the last
//! of its column, the bottom run of the following solid region. Columns are
//! laid out y-major, x-minor.

use crate::math::{IVec3, Vec3};
use crate::{MAP_X, MAP_Y, MAP_Z};
use std::path::Path;
use thiserror::Error;

const CELLS: usize = (MAP_X * MAP_Y * MAP_Z) as usize;
const WORDS: usize = CELLS / 64;

/// Color assigned to cells the span data leaves uncolored.
pub const DEFAULT_COLOR: u32 = 0x0067_4028;
const GRASS_COLOR: u32 = 0x0040_7A2C;

/// Cells at or below this depth cannot be built or destroyed.
pub const BREAKABLE_LIMIT: i32 = 62;
pub const WATER_LEVEL: i32 = 63;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("map io: {0}")]
    Io(#[from] std::io::Error),
    #[error("map data truncated at byte {offset}")]
    Truncated { offset: usize },
    #[error("malformed span in column ({x}, {y})")]
    BadSpan { x: i32, y: i32 },
    #[error("{0} bytes of trailing data after the last column")]
    TrailingData(usize),
}

/// Linear index of an in-bounds cell. `z` varies fastest.
#[inline]
pub fn offset(x: i32, y: i32, z: i32) -> usize {
    ((((x << 9) + y) << 6) + z) as usize
}

/// Inverse of [`offset`].
#[inline]
pub fn from_offset(offset: usize) -> (i32, i32, i32) {
    let offset = offset as i32;
    (offset >> 15, (offset >> 6) & 0x1FF, offset & 0x3F)
}

#[inline]
pub fn in_bounds(x: i32, y: i32, z: i32) -> bool {
    (0..MAP_X).contains(&x) && (0..MAP_Y).contains(&y) && (0..MAP_Z).contains(&z)
}

pub struct VoxelMap {
    solid: Vec<u64>,
    colors: Vec<u32>,
    changed: bool,
}

impl VoxelMap {
    /// A map with no solid cells.
    pub fn empty() -> Self {
        Self {
            solid: vec![0; WORDS],
            colors: vec![DEFAULT_COLOR; CELLS],
            changed: true,
        }
    }

    /// Flat terrain: every cell with `z >= height` is solid.
    pub fn flat(height: i32) -> Self {
        let height = height.clamp(0, MAP_Z - 1);
        let mut map = Self::empty();
        for x in 0..MAP_X {
            for y in 0..MAP_Y {
                for z in height..MAP_Z {
                    let color = if z == height { GRASS_COLOR } else { DEFAULT_COLOR };
                    map.set_cell(offset(x, y, z), true, color);
                }
            }
        }
        map
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let data = std::fs::read(path)?;
        Self::decode(&data)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MapError> {
        std::fs::write(path, self.encode())?;
        Ok(())
    }

    /// True when block edits happened since the last [`VoxelMap::mark_clean`].
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_clean(&mut self) {
        self.changed = false;
    }

    #[inline]
    pub fn is_solid(&self, offset: usize) -> bool {
        self.solid[offset >> 6] & (1u64 << (offset & 63)) != 0
    }

    /// Solidity with out-of-grid cells reported as empty.
    pub fn solid_at(&self, x: i32, y: i32, z: i32) -> bool {
        in_bounds(x, y, z) && self.is_solid(offset(x, y, z))
    }

    pub fn color(&self, offset: usize) -> u32 {
        self.colors[offset]
    }

    pub fn color_at(&self, x: i32, y: i32, z: i32) -> Option<u32> {
        in_bounds(x, y, z).then(|| self.colors[offset(x, y, z)])
    }

    fn set_solid(&mut self, offset: usize, solid: bool) {
        let bit = 1u64 << (offset & 63);
        if solid {
            self.solid[offset >> 6] |= bit;
        } else {
            self.solid[offset >> 6] &= !bit;
        }
    }

    fn set_cell(&mut self, offset: usize, solid: bool, color: u32) {
        self.set_solid(offset, solid);
        self.colors[offset] = color & 0x00FF_FFFF;
    }

    /// Solid with at least one open face. Neighbors past the x/y edges or
    /// below the floor count as solid; the sky above `z = 0` is open.
    pub fn is_surface(&self, x: i32, y: i32, z: i32) -> bool {
        if !self.solid_at(x, y, z) {
            return false;
        }
        if z == 0 {
            return true;
        }
        let open = |nx: i32, ny: i32, nz: i32| in_bounds(nx, ny, nz) && !self.solid_at(nx, ny, nz);
        open(x - 1, y, z)
            || open(x + 1, y, z)
            || open(x, y - 1, z)
            || open(x, y + 1, z)
            || open(x, y, z - 1)
            || open(x, y, z + 1)
    }

    /// Collision test for player movement. Leaving the map sideways or
    /// through the floor blocks; the sky never does. The water layer
    /// collides like the layer above it.
    pub fn is_clip_box(&self, x: f32, y: f32, z: f32) -> bool {
        let (x, y, z) = (x.floor() as i32, y.floor() as i32, z.floor() as i32);
        if !(0..MAP_X).contains(&x) || !(0..MAP_Y).contains(&y) {
            return true;
        }
        self.clip_z(x, y, z)
    }

    /// Like [`VoxelMap::is_clip_box`] but out-of-map cells never collide.
    /// Used for projectiles.
    pub fn is_clip_world(&self, x: f32, y: f32, z: f32) -> bool {
        let (x, y, z) = (x.floor() as i32, y.floor() as i32, z.floor() as i32);
        if !(0..MAP_X).contains(&x) || !(0..MAP_Y).contains(&y) {
            return false;
        }
        self.clip_z(x, y, z)
    }

    fn clip_z(&self, x: i32, y: i32, z: i32) -> bool {
        if z < 0 {
            return false;
        }
        if z >= MAP_Z {
            return true;
        }
        let z = if z == WATER_LEVEL { WATER_LEVEL - 1 } else { z };
        self.is_solid(offset(x, y, z))
    }

    /// Solidity with x and y wrapped around the map edges.
    pub fn is_block_wrap(&self, x: i32, y: i32, z: i32) -> bool {
        if !(0..MAP_Z).contains(&z) {
            return false;
        }
        self.is_solid(offset(x.rem_euclid(MAP_X), y.rem_euclid(MAP_Y), z))
    }

    /// Highest solid cell in a column.
    pub fn find_top_block(&self, x: i32, y: i32) -> Option<i32> {
        if !in_bounds(x, y, 0) {
            return None;
        }
        (0..MAP_Z).find(|z| self.is_solid(offset(x, y, *z)))
    }

    /// Walks the voxels between two points and reports whether none of the
    /// cells after `from`'s own cell blocks the view.
    pub fn can_see(&self, from: Vec3, to: Vec3) -> bool {
        let dir = to - from;
        if !dir.is_finite() {
            return false;
        }
        let mut cell = from.floor();
        let target = to.floor();
        let step = IVec3::new(
            dir.x.signum() as i32,
            dir.y.signum() as i32,
            dir.z.signum() as i32,
        );

        let axis = |p: f32, d: f32, c: i32| -> (f32, f32) {
            if d == 0.0 {
                return (f32::INFINITY, f32::INFINITY);
            }
            let boundary = if d > 0.0 { c as f32 + 1.0 } else { c as f32 };
            ((boundary - p) / d, 1.0 / d.abs())
        };
        let (mut tx, dx) = axis(from.x, dir.x, cell.x);
        let (mut ty, dy) = axis(from.y, dir.y, cell.y);
        let (mut tz, dz) = axis(from.z, dir.z, cell.z);

        let steps = (target.x - cell.x).abs() + (target.y - cell.y).abs() + (target.z - cell.z).abs();
        for _ in 0..steps {
            if tx <= ty && tx <= tz {
                cell.x += step.x;
                tx += dx;
            } else if ty <= tz {
                cell.y += step.y;
                ty += dy;
            } else {
                cell.z += step.z;
                tz += dz;
            }
            if cell == target {
                return true;
            }
            if self.is_block_wrap(cell.x, cell.y, cell.z) {
                return false;
            }
        }
        true
    }

    pub fn is_breakable(x: i32, y: i32, z: i32) -> bool {
        in_bounds(x, y, z) && z < BREAKABLE_LIMIT
    }

    /// Sets one cell. Out-of-map and unbreakable cells are left alone and
    /// `false` is returned.
    pub fn modify_block(&mut self, x: i32, y: i32, z: i32, solid: bool, color: u32) -> bool {
        if !Self::is_breakable(x, y, z) {
            return false;
        }
        self.set_cell(offset(x, y, z), solid, color);
        self.changed = true;
        true
    }

    pub fn destroy_block(&mut self, x: i32, y: i32, z: i32) -> bool {
        if !self.solid_at(x, y, z) {
            return false;
        }
        let color = self.colors[offset(x, y, z)];
        self.modify_block(x, y, z, false, color)
    }

    /// Clears the target cell and the cells directly above and below it.
    pub fn destroy_block_secondary(&mut self, x: i32, y: i32, z: i32) -> usize {
        (z - 1..=z + 1)
            .filter(|cz| self.destroy_block(x, y, *cz))
            .count()
    }

    /// Clears the 3×3×3 neighborhood around a grenade blast.
    pub fn destroy_grenade(&mut self, x: i32, y: i32, z: i32) -> usize {
        let mut destroyed = 0;
        for cx in x - 1..=x + 1 {
            for cy in y - 1..=y + 1 {
                for cz in z - 1..=z + 1 {
                    if self.destroy_block(cx, cy, cz) {
                        destroyed += 1;
                    }
                }
            }
        }
        destroyed
    }

    pub fn decode(data: &[u8]) -> Result<Self, MapError> {
        let mut map = Self {
            solid: vec![u64::MAX; WORDS],
            colors: vec![DEFAULT_COLOR; CELLS],
            changed: true,
        };

        let byte = |pos: usize| data.get(pos).copied().ok_or(MapError::Truncated { offset: pos });
        let word = |pos: usize| -> Result<u32, MapError> {
            data.get(pos..pos + 4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or(MapError::Truncated { offset: pos })
        };

        let mut pos = 0usize;
        for y in 0..MAP_Y {
            for x in 0..MAP_X {
                let mut z = 0i32;
                loop {
                    let span_size = byte(pos)? as usize;
                    let top_start = byte(pos + 1)? as i32;
                    let top_end = byte(pos + 2)? as i32;
                    let top_len = top_end - top_start + 1;
                    if top_start > MAP_Z || top_end >= MAP_Z || top_len < 0 {
                        return Err(MapError::BadSpan { x, y });
                    }

                    for air in z..top_start {
                        map.set_solid(offset(x, y, air), false);
                    }

                    let mut color_pos = pos + 4;
                    for cz in top_start..=top_end {
                        map.colors[offset(x, y, cz)] = word(color_pos)? & 0x00FF_FFFF;
                        color_pos += 4;
                    }
                    z = top_end + 1;

                    if span_size == 0 {
                        pos = color_pos;
                        break;
                    }

                    let bottom_len = span_size as i32 - 1 - top_len;
                    pos += span_size * 4;
                    let bottom_end = byte(pos + 3)? as i32;
                    let bottom_start = bottom_end - bottom_len;
                    if bottom_len < 0 || bottom_start < z || bottom_end > MAP_Z {
                        return Err(MapError::BadSpan { x, y });
                    }
                    for cz in bottom_start..bottom_end {
                        map.colors[offset(x, y, cz)] = word(color_pos)? & 0x00FF_FFFF;
                        color_pos += 4;
                    }
                    z = bottom_end;
                }
            }
        }

        if pos != data.len() {
            return Err(MapError::TrailingData(data.len() - pos));
        }
        Ok(map)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAP_X as usize * MAP_Y as usize * 16);
        for y in 0..MAP_Y {
            for x in 0..MAP_X {
                self.encode_column(x, y, &mut out);
            }
        }
        out
    }

    fn encode_column(&self, x: i32, y: i32, out: &mut Vec<u8>) {
        let solid = |z: i32| self.is_solid(offset(x, y, z));
        let mut z = 0;
        while z < MAP_Z {
            let air_start = z;
            while z < MAP_Z && !solid(z) {
                z += 1;
            }

            let top_start = z;
            while z < MAP_Z && self.is_surface(x, y, z) {
                z += 1;
            }
            let top_end = z;

            while z < MAP_Z && solid(z) && !self.is_surface(x, y, z) {
                z += 1;
            }

            // A surface run reaching the floor starts the next span instead
            // of closing this one.
            let bottom_start = z;
            let mut k = z;
            while k < MAP_Z && self.is_surface(x, y, k) {
                k += 1;
            }
            if k != MAP_Z {
                z = k;
            }
            let bottom_end = z;

            let colors = (top_end - top_start) + (bottom_end - bottom_start);
            let span_size = if z == MAP_Z { 0 } else { colors as u8 + 1 };
            out.extend_from_slice(&[
                span_size,
                top_start as u8,
                (top_end - 1) as u8,
                air_start as u8,
            ]);
            for cz in (top_start..top_end).chain(bottom_start..bottom_end) {
                let word = 0xFF00_0000 | self.colors[offset(x, y, cz)];
                out.extend_from_slice(&word.to_le_bytes());
            }
        }
    }
}

impl std::fmt::Debug for VoxelMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoxelMap")
            .field("solid_cells", &self.solid.iter().map(|w| w.count_ones()).sum::<u32>())
            .field("changed", &self.changed)
            .finish()
    }
}
