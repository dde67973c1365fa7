use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

///Represents a vector in 3D world space.
/// x and y span the map plane, z grows downwards (z = 63 is the water layer).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    ///Returns the normalized vector, or zero for a zero-length input.
    pub fn normalize(&self) -> Vec3 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec3::ZERO
        } else {
            self.scale(1.0 / mag)
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec3 {
        Vec3 {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }

    ///Returns the distance between two points.
    pub fn distance(&self, other: &Vec3) -> f32 {
        (*self - *other).magnitude()
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Voxel cell containing this point.
    pub fn floor(&self) -> IVec3 {
        IVec3 {
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, scalar: f32) -> Vec3 {
        self.scale(scalar)
    }
}

///Integer voxel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IVec3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl IVec3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Center of the voxel cell in world space.
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            self.x as f32 + 0.5,
            self.y as f32 + 0.5,
            self.z as f32 + 0.5,
        )
    }
}

/// Cells visited by a 3D line between two voxels, both ends included, or
/// `None` when the line would be longer than `max_cells`.
///
/// Steps one axis at a time so consecutive cells always share a face, which
/// keeps built lines walkable.
pub fn cube_line(start: IVec3, end: IVec3, max_cells: usize) -> Option<Vec<IVec3>> {
    let (ax, ay, az) = (
        (end.x as i64 - start.x as i64).abs(),
        (end.y as i64 - start.y as i64).abs(),
        (end.z as i64 - start.z as i64).abs(),
    );
    let total = ax + ay + az;
    if total >= max_cells as i64 {
        return None;
    }
    let step = IVec3::new(
        (end.x as i64 - start.x as i64).signum() as i32,
        (end.y as i64 - start.y as i64).signum() as i32,
        (end.z as i64 - start.z as i64).signum() as i32,
    );

    // Error terms scaled by the product of the other two extents, as in a
    // classic 3D Bresenham, but advancing a single axis per step.
    let mut cells = Vec::with_capacity(total as usize + 1);
    let mut current = start;
    let mut err_x = 0i64;
    let mut err_y = 0i64;
    let mut err_z = 0i64;

    cells.push(current);
    for _ in 0..total {
        // Compare progress fractions (err+1)/a per axis without division.
        let px = if ax == 0 { i64::MAX } else { (err_x + 1) * ay.max(1) * az.max(1) };
        let py = if ay == 0 { i64::MAX } else { (err_y + 1) * ax.max(1) * az.max(1) };
        let pz = if az == 0 { i64::MAX } else { (err_z + 1) * ax.max(1) * ay.max(1) };

        if px <= py && px <= pz {
            current.x += step.x;
            err_x += 1;
        } else if py <= pz {
            current.y += step.y;
            err_y += 1;
        } else {
            current.z += step.z;
            err_z += 1;
        }
        cells.push(current);
    }
    Some(cells)
}
