//! Controlled entity state.
//!
//! The host owns the player's physics fields; controllers get `&mut` access
//! for the duration of a hook and overwrite them in place.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::math::{Aabb, Rotation, Vec3};

/// Player hitbox width.
pub const PLAYER_WIDTH: f64 = 0.6;
/// Player hitbox height.
pub const PLAYER_HEIGHT: f64 = 1.8;

bitflags! {
    /// Movement keys held this tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct InputFlags: u8 {
        const FORWARD = 1 << 0;
        const BACK = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const JUMP = 1 << 4;
        const SNEAK = 1 << 5;
    }
}

/// Sampled movement input for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementInput {
    pub keys: InputFlags,
    /// Forward magnitude, positive forward, negative backward.
    pub forward: f32,
    /// Strafe magnitude, positive left.
    pub strafe: f32,
}

impl MovementInput {
    pub fn jump(&self) -> bool {
        self.keys.contains(InputFlags::JUMP)
    }

    pub fn sneak(&self) -> bool {
        self.keys.contains(InputFlags::SNEAK)
    }

    /// Any horizontal direction requested.
    pub fn is_moving(&self) -> bool {
        self.forward != 0.0 || self.strafe != 0.0
    }

    /// Horizontal direction, jump or sneak requested.
    pub fn is_any(&self) -> bool {
        self.is_moving() || self.jump() || self.sneak()
    }
}

/// Physics and input fields of the controlled player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Rotation,
    pub on_ground: bool,
    pub collided_vertically: bool,
    pub width: f64,
    pub height: f64,
    pub input: MovementInput,
    /// Ticks since the entity was spawned.
    pub ticks_existed: u64,
    /// Creative flight, gliding, or anything else that replaces walking physics.
    pub flying: bool,
    /// Horizontal multiplier contributed by active speed/slowness effects.
    pub speed_multiplier: f64,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

impl PlayerState {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            rotation: Rotation::default(),
            on_ground: false,
            collided_vertically: false,
            width: PLAYER_WIDTH,
            height: PLAYER_HEIGHT,
            input: MovementInput::default(),
            ticks_existed: 0,
            flying: false,
            speed_multiplier: 1.0,
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_feet(self.position, self.width, self.height)
    }

    /// Teleports the local body without touching velocity.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }
}
