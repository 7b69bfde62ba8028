//! Math types.
//!
//! Positions and velocities are `f64` because the remote authority validates
//! movement in double precision; rotations stay `f32` like the wire format.

use serde::{Deserialize, Serialize};

/// Tolerance used when deciding whether a coordinate sits on a block edge.
pub const INTEGER_EPSILON: f64 = 0.001;

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f64 {
        self.dot(self)
    }

    pub fn distance(self, other: Self) -> f64 {
        (self - other).len_sq().sqrt()
    }

    pub fn with_y(self, y: f64) -> Self {
        Self { y, ..self }
    }

    /// Block containing this point.
    pub fn floored(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// True when every component is within [`INTEGER_EPSILON`] of an integer.
    pub fn is_block_aligned(self) -> bool {
        is_near_integer(self.x) && is_near_integer(self.y) && is_near_integer(self.z)
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Returns true if `v` is within [`INTEGER_EPSILON`] of its nearest integer.
pub fn is_near_integer(v: f64) -> bool {
    (v - v.round()).abs() < INTEGER_EPSILON
}

/// Integer voxel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const ORIGIN: Self = Self { x: 0, y: 0, z: 0 };

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub const fn up(self) -> Self {
        self.offset(0, 1, 0)
    }

    pub const fn down(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// Unit cube occupied by this voxel.
    pub fn bounds(self) -> Aabb {
        let min = Vec3::new(self.x as f64, self.y as f64, self.z as f64);
        Aabb::new(min, min + Vec3::new(1.0, 1.0, 1.0))
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box of the given width and height standing on `feet`.
    pub fn from_feet(feet: Vec3, width: f64, height: f64) -> Self {
        let half = width / 2.0;
        Self::new(
            Vec3::new(feet.x - half, feet.y, feet.z - half),
            Vec3::new(feet.x + half, feet.y + height, feet.z + half),
        )
    }

    /// Strict overlap test; boxes that only touch do not intersect.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Voxels whose unit cube could overlap this box.
    pub fn blocks(&self) -> impl Iterator<Item = BlockPos> {
        let (x0, x1) = (self.min.x.floor() as i32, self.max.x.ceil() as i32);
        let (y0, y1) = (self.min.y.floor() as i32, self.max.y.ceil() as i32);
        let (z0, z1) = (self.min.z.floor() as i32, self.max.z.ceil() as i32);
        (x0..x1).flat_map(move |x| {
            (y0..y1).flat_map(move |y| (z0..z1).map(move |z| BlockPos::new(x, y, z)))
        })
    }
}

/// Look direction in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rotation {
    pub yaw: f32,
    pub pitch: f32,
}

impl Rotation {
    pub const fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floored_handles_negative_coordinates() {
        let p = Vec3::new(-0.5, 4.99, 2.0);
        assert_eq!(p.floored(), BlockPos::new(-1, 4, 2));
    }

    #[test]
    fn block_alignment_tolerance() {
        assert!(Vec3::new(5.0, 10.0005, 4.9995).is_block_aligned());
        assert!(!Vec3::new(5.0, 10.002, 5.0).is_block_aligned());
    }

    #[test]
    fn touching_boxes_do_not_intersect() {
        let a = BlockPos::new(0, 0, 0).bounds();
        let b = BlockPos::new(1, 0, 0).bounds();
        assert!(!a.intersects(&b));
        let c = Aabb::new(Vec3::new(0.9, 0.1, 0.1), Vec3::new(1.1, 0.9, 0.9));
        assert!(a.intersects(&c) && b.intersects(&c));
    }

    #[test]
    fn box_block_iteration_covers_partial_voxels() {
        let bb = Aabb::new(Vec3::new(4.85, 10.1, 4.85), Vec3::new(5.15, 11.0, 5.15));
        let blocks: Vec<_> = bb.blocks().collect();
        assert_eq!(blocks.len(), 4);
        assert!(blocks.contains(&BlockPos::new(4, 10, 4)));
        assert!(blocks.contains(&BlockPos::new(5, 10, 5)));
    }
}
