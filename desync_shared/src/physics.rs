//! Physics abstraction.
//!
//! The host's real physics is external. [`SimplePhysics`] is just enough
//! integration for sandbox runs: gravity, drag, and a floor test against
//! solid voxels.

use crate::{entity::PlayerState, math::Vec3, world::WorldProbe};

/// Physics parameters, per tick.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub gravity: f64,
    pub drag: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 0.08,
            drag: 0.98,
        }
    }
}

/// Physics stepper trait.
pub trait PhysicsBackend {
    fn step(&mut self, player: &mut PlayerState, world: &dyn WorldProbe);
}

/// No-op physics.
#[derive(Default)]
pub struct NullPhysics;

impl PhysicsBackend for NullPhysics {
    fn step(&mut self, _player: &mut PlayerState, _world: &dyn WorldProbe) {}
}

/// Velocity integration with a ground test. Submerged bodies skip gravity so
/// controller-set vertical velocity is applied as is.
#[derive(Default)]
pub struct SimplePhysics {
    pub config: PhysicsConfig,
}

impl PhysicsBackend for SimplePhysics {
    fn step(&mut self, player: &mut PlayerState, world: &dyn WorldProbe) {
        let target = player.position + player.velocity;
        let in_fluid = world.fluid_at(player.position.floored()).is_some();

        let feet = target.floored();
        let start = player.position.floored();
        if player.velocity.y < 0.0 && world.is_solid(feet) && !world.is_solid(start) {
            // Land on top of the block.
            player.position = Vec3::new(target.x, (feet.y + 1) as f64, target.z);
            player.velocity.y = 0.0;
            player.on_ground = true;
            player.collided_vertically = true;
        } else {
            player.position = target;
            player.on_ground = false;
            player.collided_vertically = false;
        }

        if !in_fluid && !player.flying {
            player.velocity.y = (player.velocity.y - self.config.gravity) * self.config.drag;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{math::BlockPos, world::GridWorld};

    #[test]
    fn falling_body_lands_on_floor() {
        let mut world = GridWorld::new();
        world.fill(BlockPos::new(-1, 0, -1), BlockPos::new(1, 0, 1), crate::world::Block::Solid);
        let mut player = PlayerState::at(Vec3::new(0.5, 1.5, 0.5));
        let mut physics = SimplePhysics::default();

        for _ in 0..20 {
            physics.step(&mut player, &world);
        }
        assert_eq!(player.position.y, 1.0);
        assert!(player.on_ground);
        assert!(player.collided_vertically);
    }

    #[test]
    fn null_physics_leaves_state_alone() {
        let mut player = PlayerState::at(Vec3::new(0.0, 3.0, 0.0));
        player.velocity.y = -1.0;
        let before = player.clone();
        NullPhysics.step(&mut player, &GridWorld::new());
        assert_eq!(player, before);
    }
}
