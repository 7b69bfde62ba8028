//! Burrow escape.
//!
//! While the player's feet voxel is solid, the server is fed a stream of
//! small fabricated nudges plus a position far below the real one, so its
//! movement check never settles on the burrowed body. Locally the body is
//! kept from sinking until the server confirms a position above the anchor.

use std::any::Any;

use desync_shared::{
    config::{BurrowSettings, SettingSpec},
    console::CvarValue,
    entity::PlayerState,
    math::BlockPos,
    net::{ClientboundMsg, ServerboundMsg},
};
use tracing::{debug, info};

use super::{collect_settings, Controller, DisableReason, HookContext, Inbound};

/// Escape state, re-evaluated at the end of every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BurrowPhase {
    #[default]
    Free,
    Burrowed {
        /// Feet voxel captured when the episode started.
        anchor: BlockPos,
        /// Server has placed the player above the anchor.
        climbed_out: bool,
    },
}

pub struct BurrowEscape {
    settings: BurrowSettings,
    enabled: bool,
    disabled_by: Option<DisableReason>,
    phase: BurrowPhase,
    /// Jump key as sampled at the end of the previous tick.
    jumping: bool,
}

impl BurrowEscape {
    pub const NAME: &'static str = "burrow";

    pub fn new(settings: BurrowSettings) -> Self {
        Self {
            settings,
            enabled: false,
            disabled_by: None,
            phase: BurrowPhase::Free,
            jumping: false,
        }
    }

    pub fn settings_ref(&self) -> &BurrowSettings {
        &self.settings
    }

    pub fn phase(&self) -> BurrowPhase {
        self.phase
    }

    pub fn is_burrowed(&self) -> bool {
        matches!(self.phase, BurrowPhase::Burrowed { .. })
    }

    pub fn anchor(&self) -> Option<BlockPos> {
        match self.phase {
            BurrowPhase::Burrowed { anchor, .. } => Some(anchor),
            BurrowPhase::Free => None,
        }
    }

    pub fn climbed_out(&self) -> bool {
        matches!(self.phase, BurrowPhase::Burrowed { climbed_out: true, .. })
    }

    /// Anchor of an escape still in progress.
    fn escaping(&self) -> Option<BlockPos> {
        match self.phase {
            BurrowPhase::Burrowed {
                anchor,
                climbed_out: false,
            } if self.enabled => Some(anchor),
            _ => None,
        }
    }

    /// Applies this tick's solidity sample.
    fn transition(&mut self, burrowed_now: bool, feet: BlockPos, tick: u64) {
        match (self.phase, burrowed_now) {
            (BurrowPhase::Free, true) => {
                info!(tick, anchor = ?feet, "Burrow episode started");
                self.phase = BurrowPhase::Burrowed {
                    anchor: feet,
                    climbed_out: false,
                };
            }
            (BurrowPhase::Burrowed { anchor, climbed_out }, false) => {
                info!(tick, ?anchor, climbed_out, "Burrow episode ended");
                self.phase = BurrowPhase::Free;
            }
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.phase = BurrowPhase::Free;
        self.jumping = false;
    }
}

impl Controller for BurrowEscape {
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
        self.reset();
    }

    fn disable(&mut self, tick: u64, reason: DisableReason) {
        if !self.enabled {
            return;
        }
        debug!(tick, controller = Self::NAME, %reason, "Disabled");
        self.enabled = false;
        self.disabled_by = Some(reason);
        self.reset();
    }

    fn disabled_by(&self) -> Option<DisableReason> {
        self.disabled_by
    }

    fn settings(&self) -> Vec<(SettingSpec, CvarValue)> {
        collect_settings(BurrowSettings::SPECS, |key| self.settings.get(key))
    }

    fn apply_setting(&mut self, key: &str, value: &CvarValue, _tick: u64) -> anyhow::Result<()> {
        self.settings.apply(key, value)
    }

    fn pre_move(&mut self, ctx: &mut HookContext<'_>) {
        if self.escaping().is_some() {
            ctx.player.velocity.y = ctx.player.velocity.y.max(0.0);
        }
    }

    fn pre_update(&mut self, ctx: &mut HookContext<'_>) {
        let Some(anchor) = self.escaping() else {
            return;
        };
        let anchor_y = anchor.y as f64;
        let pos = ctx.player.position;
        let step = self.settings.nudge_step;

        if self.jumping {
            if pos.y - anchor_y < self.settings.anchor_epsilon {
                ctx.packets.emit(|p| {
                    p.move_to(pos.with_y(pos.y + step)).on_ground(false);
                });
            }
        } else if pos.y >= anchor_y {
            ctx.packets.emit(|p| {
                p.move_to(pos.with_y(pos.y - step)).on_ground(false);
            });
        } else {
            ctx.player.collided_vertically = true;
            ctx.player.on_ground = true;
            ctx.packets.emit(|p| {
                p.on_ground(true);
            });
        }
    }

    fn post_update(&mut self, ctx: &mut HookContext<'_>) {
        if self.escaping().is_none() {
            return;
        }
        let pos = ctx.player.position;
        ctx.packets.send(ServerboundMsg::Position {
            position: pos.with_y(pos.y - self.settings.spoof_offset),
            on_ground: true,
        });
    }

    fn post_tick(&mut self, ctx: &mut HookContext<'_>) {
        if !self.enabled {
            return;
        }
        let feet = ctx.player.position.floored();
        self.jumping = ctx.player.input.jump();
        let burrowed_now = ctx.world.is_solid(feet);
        self.transition(burrowed_now, feet, ctx.tick);
    }

    fn on_receive(&mut self, inbound: &mut Inbound, player: &PlayerState) {
        if !self.enabled {
            return;
        }
        let jumping = self.jumping;
        let BurrowPhase::Burrowed {
            anchor,
            climbed_out,
        } = &mut self.phase
        else {
            return;
        };

        let cancel = match inbound.msg() {
            ClientboundMsg::CloseWindow { window_id } => {
                debug!(window_id = *window_id, "Suppressing close-window while burrowed");
                true
            }
            ClientboundMsg::PositionCorrection(correction) if jumping => {
                let y = correction.resolved_y(player.position.y);
                if y > anchor.y as f64 && !*climbed_out {
                    info!(y, anchor_y = anchor.y, "Server placed player above anchor");
                    *climbed_out = true;
                }
                false
            }
            _ => false,
        };
        if cancel {
            inbound.cancel();
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
        entity::InputFlags,
        math::Vec3,
        net::{MoveUpdate, PositionCorrection, RelativeFlags},
        world::GridWorld,
    };

    struct Rig {
        world: GridWorld,
        player: PlayerState,
        net: RecordingBoundary,
        rate: TickRateRequest,
        burrow: BurrowEscape,
    }

    impl Rig {
        fn embedded_at(y: f64) -> Self {
            let mut world = GridWorld::new();
            world.set_solid(BlockPos::new(0, 4, 0));
            let mut burrow = BurrowEscape::new(BurrowSettings::default());
            burrow.enable(0);
            Self {
                world,
                player: PlayerState::at(Vec3::new(0.5, y, 0.5)),
                net: RecordingBoundary::new(),
                rate: TickRateRequest::default(),
                burrow,
            }
        }

        fn run(&mut self, tick: u64, hook: fn(&mut BurrowEscape, &mut HookContext<'_>)) {
            let mut ctx = HookContext::new(
                tick,
                &mut self.player,
                &self.world,
                &mut self.net,
                &mut self.rate,
            );
            hook(&mut self.burrow, &mut ctx);
        }
    }

    #[test]
    fn anchor_captured_on_entering_solid() {
        let mut rig = Rig::embedded_at(4.3);
        rig.run(1, BurrowEscape::post_tick);
        assert_eq!(
            rig.burrow.phase(),
            BurrowPhase::Burrowed {
                anchor: BlockPos::new(0, 4, 0),
                climbed_out: false
            }
        );

        // Anchor is fixed for the episode even if the body drifts.
        rig.player.position.y = 4.9;
        rig.run(2, BurrowEscape::post_tick);
        assert_eq!(rig.burrow.anchor(), Some(BlockPos::new(0, 4, 0)));

        rig.player.position.y = 6.0;
        rig.run(3, BurrowEscape::post_tick);
        assert_eq!(rig.burrow.phase(), BurrowPhase::Free);
    }

    #[test]
    fn sinking_is_clamped_while_escaping() {
        let mut rig = Rig::embedded_at(4.0);
        rig.run(1, BurrowEscape::post_tick);
        rig.player.velocity.y = -0.5;
        rig.run(2, BurrowEscape::pre_move);
        assert_eq!(rig.player.velocity.y, 0.0);
    }

    #[test]
    fn jump_near_anchor_nudges_up() {
        let mut rig = Rig::embedded_at(4.05);
        rig.player.input.keys = InputFlags::JUMP;
        rig.run(1, BurrowEscape::post_tick);
        rig.run(2, BurrowEscape::pre_update);
        rig.run(2, BurrowEscape::post_update);

        let sent = rig.net.take();
        assert_eq!(sent.len(), 2);
        match &sent[0] {
            ServerboundMsg::PlayerMove(MoveUpdate {
                position: Some(p),
                rotation: None,
                on_ground: Some(false),
            }) => assert!((p.y - (4.05 + 0.0622)).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
        match &sent[1] {
            ServerboundMsg::Position {
                position,
                on_ground: true,
            } => assert!((position.y - (4.05 - 69420.0)).abs() < 1e-6),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn jump_far_from_anchor_holds() {
        let mut rig = Rig::embedded_at(4.5);
        rig.player.input.keys = InputFlags::JUMP;
        rig.run(1, BurrowEscape::post_tick);
        rig.run(2, BurrowEscape::pre_update);
        assert!(rig.net.sent().is_empty());
    }

    #[test]
    fn no_jump_at_or_above_anchor_nudges_down() {
        let mut rig = Rig::embedded_at(4.0);
        rig.run(1, BurrowEscape::post_tick);
        rig.run(2, BurrowEscape::pre_update);
        match rig.net.sent() {
            [ServerboundMsg::PlayerMove(MoveUpdate {
                position: Some(p),
                on_ground: Some(false),
                ..
            })] => assert!((p.y - (4.0 - 0.0622)).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn no_jump_below_anchor_reports_ground() {
        let mut rig = Rig::embedded_at(4.2);
        rig.run(1, BurrowEscape::post_tick);
        rig.player.position.y = 3.95;
        rig.run(2, BurrowEscape::pre_update);

        assert!(rig.player.on_ground && rig.player.collided_vertically);
        assert_eq!(
            rig.net.sent(),
            &[ServerboundMsg::PlayerMove(MoveUpdate {
                on_ground: Some(true),
                ..MoveUpdate::default()
            })]
        );
    }

    #[test]
    fn close_window_cancelled_only_while_burrowed() {
        let mut rig = Rig::embedded_at(6.0);
        let mut inbound = Inbound::new(ClientboundMsg::CloseWindow { window_id: 1 });
        rig.burrow.on_receive(&mut inbound, &rig.player);
        assert!(!inbound.is_cancelled());

        rig.player.position.y = 4.0;
        rig.run(1, BurrowEscape::post_tick);
        rig.burrow.on_receive(&mut inbound, &rig.player);
        assert!(inbound.is_cancelled());
    }

    #[test]
    fn relative_correction_above_anchor_completes_climb() {
        let mut rig = Rig::embedded_at(4.0);
        rig.player.input.keys = InputFlags::JUMP;
        rig.run(1, BurrowEscape::post_tick);

        let mut below = PositionCorrection::absolute(Vec3::new(0.5, 0.0, 0.5), 1);
        below.relative = RelativeFlags::Y;
        rig.burrow
            .on_receive(&mut Inbound::new(ClientboundMsg::PositionCorrection(below)), &rig.player);
        assert!(!rig.burrow.climbed_out());

        let mut above = below;
        above.position.y = 1.0;
        rig.burrow
            .on_receive(&mut Inbound::new(ClientboundMsg::PositionCorrection(above)), &rig.player);
        assert!(rig.burrow.climbed_out());

        // Escape finished: no more overrides.
        rig.run(2, BurrowEscape::pre_update);
        rig.run(2, BurrowEscape::post_update);
        assert!(rig.net.sent().is_empty());
    }

    #[test]
    fn correction_without_jump_does_not_complete_climb() {
        let mut rig = Rig::embedded_at(4.0);
        rig.run(1, BurrowEscape::post_tick);

        let above = PositionCorrection::absolute(Vec3::new(0.5, 5.0, 0.5), 1);
        rig.burrow
            .on_receive(&mut Inbound::new(ClientboundMsg::PositionCorrection(above)), &rig.player);
        assert!(!rig.burrow.climbed_out());
        assert!(rig.burrow.is_burrowed());

        // Same correction once jump is sampled.
        rig.player.input.keys = InputFlags::JUMP;
        rig.run(2, BurrowEscape::post_tick);
        rig.burrow
            .on_receive(&mut Inbound::new(ClientboundMsg::PositionCorrection(above)), &rig.player);
        assert!(rig.burrow.climbed_out());
    }

    #[test]
    fn disable_is_idempotent() {
        let mut rig = Rig::embedded_at(4.0);
        rig.run(1, BurrowEscape::post_tick);
        rig.burrow.disable(2, DisableReason::User);
        let phase = rig.burrow.phase();
        rig.burrow.disable(3, DisableReason::Timeout);
        assert_eq!(phase, BurrowPhase::Free);
        assert_eq!(rig.burrow.phase(), phase);
        assert_eq!(rig.burrow.disabled_by(), Some(DisableReason::User));
    }
}
