//! World probing.
//!
//! Controllers never own world state. They read it through [`WorldProbe`],
//! which the host implements over whatever block storage it has resident.
//! [`GridWorld`] is a sparse in-memory implementation used by the sandbox and
//! by tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::math::{Aabb, BlockPos};

/// Recognized fluid types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FluidKind {
    Water,
    Lava,
}

/// Fluid occupying a voxel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluidState {
    pub kind: FluidKind,
    /// Absolute world height of the fluid surface in this voxel.
    pub surface_height: f64,
}

/// Read-only queries against resident world state.
pub trait WorldProbe {
    /// Whether the voxel has a collision shape.
    fn is_solid(&self, pos: BlockPos) -> bool;

    /// Number of collision boxes overlapping `region`.
    fn collision_box_count(&self, region: &Aabb) -> usize;

    /// Fluid in the voxel, if any.
    fn fluid_at(&self, pos: BlockPos) -> Option<FluidState>;
}

/// Voxel contents stored by [`GridWorld`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Block {
    Solid,
    /// `level` is the filled fraction of the voxel, 1.0 meaning full.
    Fluid { kind: FluidKind, level: f64 },
}

/// Fill level of a still source block.
pub const SOURCE_LEVEL: f64 = 8.0 / 9.0;

/// Sparse block grid. Missing entries are air.
#[derive(Debug, Default, Clone)]
pub struct GridWorld {
    blocks: HashMap<BlockPos, Block>,
}

impl GridWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, pos: BlockPos, block: Block) {
        self.blocks.insert(pos, block);
    }

    pub fn set_solid(&mut self, pos: BlockPos) {
        self.set(pos, Block::Solid);
    }

    pub fn clear(&mut self, pos: BlockPos) {
        self.blocks.remove(&pos);
    }

    pub fn get(&self, pos: BlockPos) -> Option<Block> {
        self.blocks.get(&pos).copied()
    }

    /// Fills the inclusive box `a..=b` with `block`.
    pub fn fill(&mut self, a: BlockPos, b: BlockPos, block: Block) {
        for x in a.x.min(b.x)..=a.x.max(b.x) {
            for y in a.y.min(b.y)..=a.y.max(b.y) {
                for z in a.z.min(b.z)..=a.z.max(b.z) {
                    self.set(BlockPos::new(x, y, z), block);
                }
            }
        }
    }

    /// Fills the inclusive box with still source fluid.
    pub fn fill_fluid(&mut self, a: BlockPos, b: BlockPos, kind: FluidKind) {
        self.fill(
            a,
            b,
            Block::Fluid {
                kind,
                level: SOURCE_LEVEL,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl WorldProbe for GridWorld {
    fn is_solid(&self, pos: BlockPos) -> bool {
        matches!(self.get(pos), Some(Block::Solid))
    }

    fn collision_box_count(&self, region: &Aabb) -> usize {
        region
            .blocks()
            .filter(|pos| self.is_solid(*pos) && pos.bounds().intersects(region))
            .count()
    }

    fn fluid_at(&self, pos: BlockPos) -> Option<FluidState> {
        match self.get(pos)? {
            Block::Fluid { kind, level } => Some(FluidState {
                kind,
                surface_height: pos.y as f64 + level,
            }),
            Block::Solid => None,
        }
    }
}

/// Decides whether a position is a "hole": an air pocket enclosed by solid
/// blocks on every horizontal side and underneath.
pub trait HoleDetector {
    fn is_hole(&self, world: &dyn WorldProbe, feet: BlockPos) -> bool;
}

/// Single-block hole: feet and head voxels are open, the floor and the four
/// horizontal neighbours of the feet voxel are solid.
#[derive(Debug, Default, Clone, Copy)]
pub struct SurroundHoleDetector;

impl HoleDetector for SurroundHoleDetector {
    fn is_hole(&self, world: &dyn WorldProbe, feet: BlockPos) -> bool {
        if world.is_solid(feet) || world.is_solid(feet.up()) {
            return false;
        }
        [
            feet.down(),
            feet.offset(1, 0, 0),
            feet.offset(-1, 0, 0),
            feet.offset(0, 0, 1),
            feet.offset(0, 0, -1),
        ]
        .into_iter()
        .all(|p| world.is_solid(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn collision_count_ignores_touching_blocks() {
        let mut world = GridWorld::new();
        world.set_solid(BlockPos::new(4, 10, 5));
        world.set_solid(BlockPos::new(5, 10, 4));
        world.set_solid(BlockPos::new(7, 10, 7));

        let slab = Aabb::new(Vec3::new(4.85, 10.1, 4.85), Vec3::new(5.15, 11.0, 5.15));
        assert_eq!(world.collision_box_count(&slab), 2);

        let flush = Aabb::new(Vec3::new(5.0, 10.1, 5.0), Vec3::new(5.5, 11.0, 5.5));
        assert_eq!(world.collision_box_count(&flush), 0);
    }

    #[test]
    fn fluid_surface_is_absolute() {
        let mut world = GridWorld::new();
        world.fill_fluid(BlockPos::new(0, 3, 0), BlockPos::new(0, 3, 0), FluidKind::Lava);
        let fluid = world.fluid_at(BlockPos::new(0, 3, 0)).unwrap();
        assert_eq!(fluid.kind, FluidKind::Lava);
        assert!((fluid.surface_height - (3.0 + SOURCE_LEVEL)).abs() < 1e-9);
        assert!(world.fluid_at(BlockPos::new(0, 4, 0)).is_none());
        assert!(!world.is_solid(BlockPos::new(0, 3, 0)));
    }

    #[test]
    fn surround_hole_requires_all_sides() {
        let mut world = GridWorld::new();
        let feet = BlockPos::new(0, 5, 0);
        for p in [
            feet.down(),
            feet.offset(1, 0, 0),
            feet.offset(-1, 0, 0),
            feet.offset(0, 0, 1),
        ] {
            world.set_solid(p);
        }
        assert!(!SurroundHoleDetector.is_hole(&world, feet));

        world.set_solid(feet.offset(0, 0, -1));
        assert!(SurroundHoleDetector.is_hole(&world, feet));

        world.set_solid(feet.up());
        assert!(!SurroundHoleDetector.is_hole(&world, feet));
    }
}
