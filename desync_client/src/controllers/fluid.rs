//! Fluid locomotion.
//!
//! Replaces swimming physics while the body is fully inside water or lava:
//! vertical velocity follows jump/sneak up to a per-fluid terminal speed, and
//! horizontal speed ramps multiplicatively toward its own cap.

use std::any::Any;

use desync_shared::{
    config::{FluidProfile, FluidSettings, SettingSpec},
    console::CvarValue,
    entity::PlayerState,
    math::BlockPos,
    net::ClientboundMsg,
    timer::TICKS_PER_SECOND,
    world::{FluidKind, WorldProbe},
};
use tracing::{debug, trace};

use super::{collect_settings, Controller, DisableReason, HookContext, Inbound, DEFAULT_TICK_MS};
use crate::input::calc_move_yaw;

/// Lowest horizontal speed while moving in water, blocks per tick.
pub const WATER_MIN_SPEED: f64 = 0.075;
/// Lowest horizontal speed while moving in lava, blocks per tick.
pub const LAVA_MIN_SPEED: f64 = 0.05;
/// Required fluid depth above the entity's feet.
pub const MIN_SURFACE_DEPTH: f64 = 0.2;

/// True when every voxel of the inset bounding box holds `kind` with its
/// surface at least [`MIN_SURFACE_DEPTH`] above the player's feet.
pub fn is_immersed(player: &PlayerState, world: &dyn WorldProbe, kind: FluidKind) -> bool {
    let bb = player.bounding_box();
    let span = |lo: f64, hi: f64| lo.floor() as i32..=hi.floor() as i32;
    let feet_y = player.position.y;

    for x in span(bb.min.x + 0.1, bb.max.x - 0.1) {
        for y in span(bb.min.y + 0.5, bb.max.y - 0.25) {
            for z in span(bb.min.z + 0.1, bb.max.z - 0.1) {
                match world.fluid_at(BlockPos::new(x, y, z)) {
                    Some(f) if f.kind == kind && f.surface_height - feet_y >= MIN_SURFACE_DEPTH => {}
                    _ => return false,
                }
            }
        }
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwimState {
    #[default]
    Idle,
    Swimming {
        fluid: FluidKind,
    },
}

pub struct FluidLocomotion {
    settings: FluidSettings,
    enabled: bool,
    disabled_by: Option<DisableReason>,
    state: SwimState,
    /// Horizontal speed carried between ticks, blocks per tick.
    move_speed: f64,
    /// Vertical velocity carried between ticks, blocks per tick.
    motion_y: f64,
}

impl FluidLocomotion {
    pub const NAME: &'static str = "fluid";

    pub fn new(settings: FluidSettings) -> Self {
        Self {
            settings,
            enabled: false,
            disabled_by: None,
            state: SwimState::Idle,
            move_speed: 0.0,
            motion_y: 0.0,
        }
    }

    pub fn settings_ref(&self) -> &FluidSettings {
        &self.settings
    }

    pub fn state(&self) -> SwimState {
        self.state
    }

    pub fn move_speed(&self) -> f64 {
        self.move_speed
    }

    pub fn motion_y(&self) -> f64 {
        self.motion_y
    }

    /// Fluid to swim in this tick. Lava wins; a disabled lava profile does
    /// not fall back to water.
    fn select(&self, player: &PlayerState, world: &dyn WorldProbe) -> Option<(FluidKind, FluidProfile)> {
        if player.flying {
            return None;
        }
        for (kind, profile) in [
            (FluidKind::Lava, self.settings.lava),
            (FluidKind::Water, self.settings.water),
        ] {
            if is_immersed(player, world, kind) {
                return profile.enabled.then_some((kind, profile));
            }
        }
        None
    }

    fn transition(&mut self, next: SwimState, tick: u64) {
        if next == self.state {
            return;
        }
        debug!(tick, from = ?self.state, to = ?next, "Swim state changed");
        if next == SwimState::Idle {
            self.reset_motion();
        }
        self.state = next;
    }

    fn reset_motion(&mut self) {
        self.move_speed = 0.0;
        self.motion_y = 0.0;
    }

    fn vertical(&self, profile: &FluidProfile, player: &PlayerState) -> f64 {
        let (jump, sneak) = (player.input.jump(), player.input.sneak());
        let per_tick = |v: f64| v / TICKS_PER_SECOND;
        if jump != sneak {
            if jump {
                (self.motion_y + per_tick(profile.v_boost)).min(per_tick(profile.up_speed))
            } else {
                (self.motion_y - per_tick(profile.v_boost)).max(-per_tick(profile.down_speed))
            }
        } else {
            let y = 0.1f64.powi(self.settings.jitter as i32);
            if player.ticks_existed % 2 == 0 {
                y
            } else {
                -y
            }
        }
    }

    fn swim(&mut self, ctx: &mut HookContext<'_>, kind: FluidKind, profile: &FluidProfile) {
        self.motion_y = self.vertical(profile, ctx.player);
        ctx.player.velocity.y = self.motion_y;

        let input = ctx.player.input;
        if input.is_any() {
            ctx.tick_rate
                .request(DEFAULT_TICK_MS / self.settings.timer_boost as f32);
        }

        if !input.is_moving() {
            ctx.player.velocity.x = 0.0;
            ctx.player.velocity.z = 0.0;
            self.move_speed = 0.0;
            return;
        }

        let yaw = calc_move_yaw(ctx.player.rotation.yaw, &input);
        let floor = match kind {
            FluidKind::Water => WATER_MIN_SPEED,
            FluidKind::Lava => LAVA_MIN_SPEED,
        };
        let mut speed = (self.move_speed * profile.h_boost)
            .max(floor)
            .min(profile.h_speed / TICKS_PER_SECOND);
        let mut multiplier = 1.0;
        if kind == FluidKind::Water {
            if input.sneak() && !input.jump() {
                let down = ctx.player.velocity.y * 0.25;
                speed = speed.min((speed + down).max(0.0));
            }
            multiplier = ctx.player.speed_multiplier;
        }
        self.move_speed = speed;

        ctx.player.velocity.x = -yaw.sin() * speed * multiplier;
        ctx.player.velocity.z = yaw.cos() * speed * multiplier;
        trace!(tick = ctx.tick, speed, motion_y = self.motion_y, "Swim step");
    }
}

impl Controller for FluidLocomotion {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self, tick: u64) {
        if self.enabled {
            return;
        }
        debug!(tick, controller = Self::NAME, "Enabled");
        self.enabled = true;
        self.disabled_by = None;
    }

    fn disable(&mut self, tick: u64, reason: DisableReason) {
        if !self.enabled {
            return;
        }
        debug!(tick, controller = Self::NAME, %reason, "Disabled");
        self.enabled = false;
        self.disabled_by = Some(reason);
        self.state = SwimState::Idle;
        self.reset_motion();
    }

    fn disabled_by(&self) -> Option<DisableReason> {
        self.disabled_by
    }

    fn settings(&self) -> Vec<(SettingSpec, CvarValue)> {
        collect_settings(FluidSettings::SPECS, |key| self.settings.get(key))
    }

    fn apply_setting(&mut self, key: &str, value: &CvarValue, _tick: u64) -> anyhow::Result<()> {
        self.settings.apply(key, value)
    }

    fn pre_move(&mut self, ctx: &mut HookContext<'_>) {
        if !self.enabled {
            return;
        }
        match self.select(ctx.player, ctx.world) {
            Some((kind, profile)) => {
                self.transition(SwimState::Swimming { fluid: kind }, ctx.tick);
                self.swim(ctx, kind, &profile);
            }
            None => {
                self.transition(SwimState::Idle, ctx.tick);
                self.reset_motion();
            }
        }
    }

    fn on_receive(&mut self, inbound: &mut Inbound, _player: &PlayerState) {
        if let ClientboundMsg::PositionCorrection(_) = inbound.msg() {
            self.reset_motion();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
