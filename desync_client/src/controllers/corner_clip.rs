//! Corner clip.
//!
//! Wedges the player a fraction of a block into the corner between two
//! adjacent collision boxes. The server is shown the aligned position, then two
//! slightly lower ones, then the true position again; on alternate ticks a
//! random look is sent instead so consecutive movement checks never line up.

use std::any::Any;

use desync_shared::{
    config::{CornerClipSettings, SettingSpec},
    console::CvarValue,
    entity::PlayerState,
    math::{Aabb, Rotation, Vec3},
    net::ServerboundMsg,
    timer::{seconds_to_ticks, TickTimer, PRE_ARM_OFFSET},
    world::{HoleDetector, SurroundHoleDetector, WorldProbe},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

use super::{collect_settings, Controller, DisableReason, HookContext};

/// Consecutive clipped ticks tolerated before giving up.
pub const MAX_CLIPPED_TICKS: u32 = 5;

/// Vertical speed that means something else is moving the player.
pub const VELOCITY_LIMIT: f64 = 0.4;

/// True when the player stands block-aligned with at least two collision boxes
/// overlapping the narrow slab just above its feet.
pub fn is_clipped(player: &PlayerState, world: &dyn WorldProbe) -> bool {
    let pos = player.position;
    if !pos.is_block_aligned() {
        return false;
    }
    let q = player.width / 4.0;
    let slab = Aabb::new(
        Vec3::new(pos.x - q, pos.y + 0.1, pos.z - q),
        Vec3::new(pos.x + q, pos.y + 1.0, pos.z + q),
    );
    world.collision_box_count(&slab) >= 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipState {
    pub clipped_ticks: u32,
    /// Next tick sends a random look instead of a wedge attempt.
    pub alternate: bool,
}

/// Outcome of one enabled tick.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Abort(DisableReason),
    Look,
    Wedge,
    Wait,
}

pub struct CornerClip<R = StdRng> {
    settings: CornerClipSettings,
    enabled: bool,
    disabled_by: Option<DisableReason>,
    state: ClipState,
    enable_timer: TickTimer,
    timeout_timer: TickTimer,
    retry_timer: TickTimer,
    rng: R,
    holes: Box<dyn HoleDetector>,
}

impl CornerClip<StdRng> {
    pub fn new(settings: CornerClipSettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }
}

impl<R: Rng> CornerClip<R> {
    pub const NAME: &'static str = "corner_clip";

    pub fn with_rng(settings: CornerClipSettings, rng: R) -> Self {
        Self {
            settings,
            enabled: false,
            disabled_by: None,
            state: ClipState::default(),
            enable_timer: TickTimer::default(),
            timeout_timer: TickTimer::default(),
            retry_timer: TickTimer::default(),
            rng,
            holes: Box::new(SurroundHoleDetector),
        }
    }

    /// Replaces the hole detector used for auto-enable.
    pub fn with_hole_detector(mut self, holes: Box<dyn HoleDetector>) -> Self {
        self.holes = holes;
        self
    }

    pub fn settings_ref(&self) -> &CornerClipSettings {
        &self.settings
    }

    pub fn state(&self) -> ClipState {
        self.state
    }

    fn next_step(&mut self, clipped: bool, player: &PlayerState, tick: u64) -> Step {
        self.state.clipped_ticks = if clipped {
            self.state.clipped_ticks + 1
        } else {
            0
        };

        if self.state.clipped_ticks > MAX_CLIPPED_TICKS {
            return Step::Abort(DisableReason::ClipOverrun);
        }
        if player.velocity.y.abs() >= VELOCITY_LIMIT {
            return Step::Abort(DisableReason::AnomalousVelocity);
        }
        if self
            .timeout_timer
            .tick(tick, seconds_to_ticks(self.settings.timeout_seconds))
        {
            return Step::Abort(DisableReason::Timeout);
        }

        let step = if self.state.alternate {
            Step::Look
        } else if self.state.clipped_ticks <= 1
            && self
                .retry_timer
                .tick_and_reset(tick, seconds_to_ticks(self.settings.retry_timeout_seconds))
        {
            Step::Wedge
        } else {
            Step::Wait
        };
        self.state.alternate = !self.state.alternate;
        step
    }

    fn random_look(&mut self, player: &PlayerState) -> Rotation {
        let yaw = player.rotation.yaw + self.rng.gen_range(-180..=180) as f32;
        let pitch = self.rng.gen_range(-90..=90) as f32;
        Rotation::new(yaw, pitch)
    }

    fn wedge(&self, ctx: &mut HookContext<'_>) {
        let start = ctx.player.position;
        let on_ground = ctx.player.on_ground;
        let quarter = self.settings.y_down / 4.0;

        let mut y = start.y.round();
        ctx.packets.send(ServerboundMsg::Position {
            position: start.with_y(y),
            on_ground,
        });
        for step in [quarter, quarter * 3.0] {
            y -= step;
            ctx.player.set_position(start.with_y(y));
            ctx.packets.send(ServerboundMsg::Position {
                position: start.with_y(y),
                on_ground,
            });
        }

        let settled = ctx.player.position;
        ctx.packets.emit(|p| {
            p.move_to(settled).on_ground(on_ground);
        });
        debug!(tick = ctx.tick, y, "Corner clip wedge sent");
    }
}

impl<R: Rng + 'static> Controller for CornerClip<R> {
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
        self.state = ClipState::default();
        self.enable_timer.reset(tick);
        self.timeout_timer.reset(tick);
        self.retry_timer.reset_with_offset(tick, PRE_ARM_OFFSET);
    }

    fn disable(&mut self, tick: u64, reason: DisableReason) {
        if !self.enabled {
            return;
        }
        if reason == DisableReason::User {
            debug!(tick, controller = Self::NAME, "Disabled");
        } else {
            info!(tick, controller = Self::NAME, %reason, "Self-disabled");
        }
        self.enabled = false;
        self.disabled_by = Some(reason);
        self.state = ClipState::default();
        self.enable_timer.reset(tick);
    }

    fn disabled_by(&self) -> Option<DisableReason> {
        self.disabled_by
    }

    fn settings(&self) -> Vec<(SettingSpec, CvarValue)> {
        collect_settings(CornerClipSettings::SPECS, |key| self.settings.get(key))
    }

    fn apply_setting(&mut self, key: &str, value: &CvarValue, tick: u64) -> anyhow::Result<()> {
        self.settings.apply(key, value)?;
        if matches!(key, "auto_enable_in_hole" | "enable_seconds") {
            self.enable_timer.reset(tick);
        }
        Ok(())
    }

    fn pre_update(&mut self, ctx: &mut HookContext<'_>) {
        if !self.enabled {
            return;
        }
        let clipped = is_clipped(ctx.player, ctx.world);
        match self.next_step(clipped, ctx.player, ctx.tick) {
            Step::Abort(reason) => self.disable(ctx.tick, reason),
            Step::Look => {
                let look = self.random_look(ctx.player);
                ctx.packets.emit(|p| {
                    p.rotate(look);
                });
            }
            Step::Wedge => self.wedge(ctx),
            Step::Wait => {}
        }
    }

    fn post_tick(&mut self, ctx: &mut HookContext<'_>) {
        if self.enabled {
            return;
        }
        let feet = ctx.player.position.floored();
        if !self.settings.auto_enable_in_hole
            || is_clipped(ctx.player, ctx.world)
            || !self.holes.is_hole(ctx.world, feet)
        {
            self.enable_timer.reset(ctx.tick);
            return;
        }
        if self
            .enable_timer
            .tick_and_reset(ctx.tick, seconds_to_ticks(self.settings.enable_seconds))
        {
            info!(tick = ctx.tick, ?feet, "Standing in hole, enabling corner clip");
            self.enable(ctx.tick);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::RecordingBoundary;
    use crate::controllers::TickRateRequest;
    use desync_shared::{
        math::BlockPos,
        net::MoveUpdate,
        world::{Block, GridWorld},
    };

    /// Two blocks meeting at the (5, 10, 5) corner.
    fn corner_world() -> GridWorld {
        let mut world = GridWorld::new();
        world.set_solid(BlockPos::new(4, 10, 5));
        world.set_solid(BlockPos::new(5, 10, 4));
        world
    }

    fn seeded() -> CornerClip<StdRng> {
        CornerClip::with_rng(CornerClipSettings::default(), StdRng::seed_from_u64(7))
    }

    fn run_tick(
        clip: &mut CornerClip<StdRng>,
        tick: u64,
        player: &mut PlayerState,
        world: &GridWorld,
        net: &mut RecordingBoundary,
    ) {
        let mut rate = TickRateRequest::default();
        let mut ctx = HookContext::new(tick, player, world, net, &mut rate);
        clip.pre_update(&mut ctx);
        clip.post_tick(&mut ctx);
    }

    #[test]
    fn clipped_requires_alignment_and_two_boxes() {
        let world = corner_world();
        let mut player = PlayerState::at(Vec3::new(5.0, 10.0, 5.0));
        assert!(is_clipped(&player, &world));

        player.position.x = 5.0005;
        assert!(is_clipped(&player, &world));

        player.position.x = 5.002;
        assert!(!is_clipped(&player, &world));
        player.position.x = 5.0;

        player.position.y = 10.0005;
        assert!(is_clipped(&player, &world));
        player.position.y = 10.002;
        assert!(!is_clipped(&player, &world));
        player.position.y = 10.0;

        player.position.z = 4.9995;
        assert!(is_clipped(&player, &world));
        player.position.z = 5.002;
        assert!(!is_clipped(&player, &world));
        player.position.z = 5.0;
        assert!(is_clipped(&player, &world));

        let mut single = GridWorld::new();
        single.set_solid(BlockPos::new(4, 10, 5));
        assert!(!is_clipped(&player, &single));
    }

    #[test]
    fn first_tick_sends_wedge_sequence() {
        let world = GridWorld::new();
        let mut player = PlayerState::at(Vec3::new(5.0, 10.0, 5.0));
        player.on_ground = true;
        let mut net = RecordingBoundary::new();
        let mut clip = seeded();
        clip.enable(100);

        run_tick(&mut clip, 101, &mut player, &world, &mut net);

        let ys: Vec<f64> = net
            .sent()
            .iter()
            .filter_map(|m| m.reported_position().map(|p| p.y))
            .collect();
        assert_eq!(ys.len(), 4);
        assert_eq!(ys[0], 10.0);
        assert!((ys[1] - 9.995).abs() < 1e-9);
        assert!((ys[2] - 9.98).abs() < 1e-9);
        assert_eq!(ys[3], ys[2]);
        assert!(matches!(
            net.sent()[3],
            ServerboundMsg::PlayerMove(MoveUpdate {
                on_ground: Some(true),
                rotation: None,
                ..
            })
        ));
        assert!((player.position.y - 9.98).abs() < 1e-9);
        assert!(clip.state().alternate);
    }

    #[test]
    fn alternate_tick_sends_random_look() {
        let world = GridWorld::new();
        let mut player = PlayerState::at(Vec3::new(5.0, 10.0, 5.0));
        player.rotation = Rotation::new(30.0, 0.0);
        let mut net = RecordingBoundary::new();
        let mut clip = seeded();
        clip.enable(0);

        run_tick(&mut clip, 1, &mut player, &world, &mut net);
        net.take();
        for tick in 2..12 {
            run_tick(&mut clip, tick, &mut player, &world, &mut net);
        }

        let looks: Vec<Rotation> = net
            .sent()
            .iter()
            .filter_map(|m| match m {
                ServerboundMsg::PlayerMove(MoveUpdate {
                    rotation: Some(r),
                    position: None,
                    on_ground: None,
                }) => Some(*r),
                _ => None,
            })
            .collect();
        assert_eq!(looks.len(), 5);
        for r in looks {
            assert!((-150.0..=210.0).contains(&r.yaw));
            assert!((-90.0..=90.0).contains(&r.pitch));
        }
    }

    #[test]
    fn retry_cooldown_spaces_wedges() {
        let world = GridWorld::new();
        let mut player = PlayerState::at(Vec3::new(5.0, 10.0, 5.0));
        let mut net = RecordingBoundary::new();
        let mut clip = seeded();
        clip.enable(0);

        let mut wedges = Vec::new();
        for tick in 1..=9 {
            player.position = Vec3::new(5.0, 10.0, 5.0);
            let before = net.sent().len();
            run_tick(&mut clip, tick, &mut player, &world, &mut net);
            if net.sent().len() - before == 4 {
                wedges.push(tick);
            }
        }
        // 0.2 s retry = 4 ticks, never on a look tick.
        assert_eq!(wedges, vec![1, 5, 9]);
    }

    #[test]
    fn staying_clipped_disables() {
        let world = corner_world();
        let mut player = PlayerState::at(Vec3::new(5.0, 10.0, 5.0));
        let mut net = RecordingBoundary::new();
        let mut clip = seeded();
        clip.enable(0);

        for tick in 1..=5 {
            player.position = Vec3::new(5.0, 10.0, 5.0);
            run_tick(&mut clip, tick, &mut player, &world, &mut net);
            assert!(clip.is_enabled(), "tick {tick}");
        }
        player.position = Vec3::new(5.0, 10.0, 5.0);
        run_tick(&mut clip, 6, &mut player, &world, &mut net);
        assert!(!clip.is_enabled());
        assert_eq!(clip.disabled_by(), Some(DisableReason::ClipOverrun));
        assert_eq!(clip.state(), ClipState::default());
    }

    #[test]
    fn vertical_knockback_disables() {
        let world = GridWorld::new();
        let mut player = PlayerState::at(Vec3::new(5.0, 10.0, 5.0));
        player.velocity.y = -0.4;
        let mut net = RecordingBoundary::new();
        let mut clip = seeded();
        clip.enable(0);

        run_tick(&mut clip, 1, &mut player, &world, &mut net);
        assert_eq!(clip.disabled_by(), Some(DisableReason::AnomalousVelocity));
        assert!(net.sent().is_empty());
    }

    #[test]
    fn times_out() {
        let world = GridWorld::new();
        let mut player = PlayerState::at(Vec3::new(5.5, 10.0, 5.5));
        let mut net = RecordingBoundary::new();
        let mut clip = seeded();
        clip.enable(0);

        for tick in 1..20 {
            run_tick(&mut clip, tick, &mut player, &world, &mut net);
        }
        assert!(clip.is_enabled());
        run_tick(&mut clip, 20, &mut player, &world, &mut net);
        assert_eq!(clip.disabled_by(), Some(DisableReason::Timeout));
    }

    #[test]
    fn auto_enables_after_standing_in_hole() {
        let mut world = GridWorld::new();
        let feet = BlockPos::new(0, 5, 0);
        world.fill(feet.offset(-1, -1, -1), feet.offset(1, -1, 1), Block::Solid);
        for p in [
            feet.offset(1, 0, 0),
            feet.offset(-1, 0, 0),
            feet.offset(0, 0, 1),
            feet.offset(0, 0, -1),
        ] {
            world.set_solid(p);
        }
        let mut player = PlayerState::at(Vec3::new(0.5, 5.0, 0.5));
        let mut net = RecordingBoundary::new();
        let mut clip = seeded();
        clip.apply_setting("auto_enable_in_hole", &CvarValue::Bool(true), 0)
            .unwrap();

        let mut rate = TickRateRequest::default();
        for tick in 1..40 {
            let mut ctx = HookContext::new(tick, &mut player, &world, &mut net, &mut rate);
            clip.post_tick(&mut ctx);
        }
        assert!(!clip.is_enabled());
        let mut ctx = HookContext::new(40, &mut player, &world, &mut net, &mut rate);
        clip.post_tick(&mut ctx);
        assert!(clip.is_enabled());
    }

    #[test]
    fn custom_hole_detector_drives_auto_enable() {
        struct Everywhere;
        impl HoleDetector for Everywhere {
            fn is_hole(&self, _world: &dyn WorldProbe, _feet: BlockPos) -> bool {
                true
            }
        }

        let world = GridWorld::new();
        let mut player = PlayerState::at(Vec3::new(0.5, 70.0, 0.5));
        let mut net = RecordingBoundary::new();
        let settings = CornerClipSettings {
            auto_enable_in_hole: true,
            enable_seconds: 0.5,
            ..CornerClipSettings::default()
        };
        let mut clip = CornerClip::with_rng(settings, StdRng::seed_from_u64(1))
            .with_hole_detector(Box::new(Everywhere));

        let mut rate = TickRateRequest::default();
        for tick in 0..=10 {
            let mut ctx = HookContext::new(tick, &mut player, &world, &mut net, &mut rate);
            clip.post_tick(&mut ctx);
        }
        assert!(clip.is_enabled());
    }

    #[test]
    fn outside_hole_keeps_resetting_delay() {
        let world = GridWorld::new();
        let mut player = PlayerState::at(Vec3::new(0.5, 5.0, 0.5));
        let mut net = RecordingBoundary::new();
        let mut clip = seeded();
        clip.apply_setting("auto_enable_in_hole", &CvarValue::Bool(true), 0)
            .unwrap();

        let mut rate = TickRateRequest::default();
        let mut ctx = HookContext::new(100, &mut player, &world, &mut net, &mut rate);
        clip.post_tick(&mut ctx);
        assert!(!clip.is_enabled());
        assert_eq!(clip.enable_timer.last_trigger_tick(), 100);
    }
}
