//! Per-tick exploit controllers.
//!
//! Every controller follows the same shape: sense the world in a hook,
//! override the player's physics fields, emit packets, and give up on its own
//! when a timeout or an anomaly says the override is no longer working.
//!
//! Hooks run in a fixed order within a tick (see [`crate::host`]):
//!
//! 1. [`Controller::pre_move`] before the physics step
//! 2. [`Controller::pre_update`] before the movement packet
//! 3. [`Controller::post_update`] after the movement packet
//! 4. [`Controller::post_tick`] at the end of the tick, also for disabled
//!    controllers
//!
//! Inbound messages arrive through [`Controller::on_receive`] between ticks.

use std::any::Any;
use std::fmt;

use desync_shared::{
    config::SettingSpec, console::CvarValue, entity::PlayerState, net::ClientboundMsg,
    world::WorldProbe,
};

use crate::boundary::NetworkBoundary;
use crate::packet::PacketSynthesizer;

pub mod burrow;
pub mod corner_clip;
pub mod fluid;

pub use burrow::{BurrowEscape, BurrowPhase};
pub use corner_clip::{is_clipped, ClipState, CornerClip};
pub use fluid::{is_immersed, FluidLocomotion, SwimState};

/// Tick length the host runs at when nothing asks otherwise.
pub const DEFAULT_TICK_MS: f32 = 50.0;

/// Why a controller stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    /// Turned off from the console or by the embedding application.
    User,
    /// The configured maximum duration elapsed without reaching the goal.
    Timeout,
    /// Vertical speed crossed the safety threshold, usually knockback.
    AnomalousVelocity,
    /// Stayed clipped for longer than the wedge sequence allows.
    ClipOverrun,
}

impl fmt::Display for DisableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisableReason::User => "user",
            DisableReason::Timeout => "timeout",
            DisableReason::AnomalousVelocity => "anomalous velocity",
            DisableReason::ClipOverrun => "clip overrun",
        };
        f.write_str(s)
    }
}

/// Movement-rate override requested for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickRateRequest {
    tick_length_ms: Option<f32>,
}

impl TickRateRequest {
    /// Asks the host to run the next tick with this length.
    pub fn request(&mut self, tick_length_ms: f32) {
        self.tick_length_ms = Some(tick_length_ms);
    }

    pub fn requested(&self) -> Option<f32> {
        self.tick_length_ms
    }

    pub fn clear(&mut self) {
        self.tick_length_ms = None;
    }
}

/// Everything a hook may read or touch during one phase.
pub struct HookContext<'a> {
    pub tick: u64,
    pub player: &'a mut PlayerState,
    pub world: &'a dyn WorldProbe,
    pub packets: PacketSynthesizer<'a>,
    pub tick_rate: &'a mut TickRateRequest,
}

impl<'a> HookContext<'a> {
    pub fn new(
        tick: u64,
        player: &'a mut PlayerState,
        world: &'a dyn WorldProbe,
        net: &'a mut dyn NetworkBoundary,
        tick_rate: &'a mut TickRateRequest,
    ) -> Self {
        Self {
            tick,
            player,
            world,
            packets: PacketSynthesizer::new(net),
            tick_rate,
        }
    }
}

/// Inbound message that listeners may cancel before the host processes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    msg: ClientboundMsg,
    cancelled: bool,
}

impl Inbound {
    pub fn new(msg: ClientboundMsg) -> Self {
        Self {
            msg,
            cancelled: false,
        }
    }

    pub fn msg(&self) -> &ClientboundMsg {
        &self.msg
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn into_msg(self) -> ClientboundMsg {
        self.msg
    }
}

/// A tick-driven override of the controlled player.
pub trait Controller {
    /// Stable identifier, also the console prefix of its settings.
    fn name(&self) -> &'static str;

    fn is_enabled(&self) -> bool;

    /// Turns the controller on, resetting its state. No-op when already on.
    fn enable(&mut self, tick: u64);

    /// Turns the controller off and discards its state. No-op when already off.
    fn disable(&mut self, tick: u64, reason: DisableReason);

    /// Reason for the most recent disable, cleared on enable.
    fn disabled_by(&self) -> Option<DisableReason>;

    /// Declared settings with their current values.
    fn settings(&self) -> Vec<(SettingSpec, CvarValue)>;

    /// Single entry point for setting changes. Performs any timer reset tied
    /// to the setting in the same call.
    fn apply_setting(&mut self, key: &str, value: &CvarValue, tick: u64) -> anyhow::Result<()>;

    fn pre_move(&mut self, _ctx: &mut HookContext<'_>) {}

    fn pre_update(&mut self, _ctx: &mut HookContext<'_>) {}

    fn post_update(&mut self, _ctx: &mut HookContext<'_>) {}

    fn post_tick(&mut self, _ctx: &mut HookContext<'_>) {}

    fn on_receive(&mut self, _inbound: &mut Inbound, _player: &PlayerState) {}

    fn as_any(&self) -> &dyn Any;
}

/// Pairs each spec with the value `get` reports for it.
pub(crate) fn collect_settings(
    specs: &[SettingSpec],
    get: impl Fn(&str) -> Option<CvarValue>,
) -> Vec<(SettingSpec, CvarValue)> {
    specs
        .iter()
        .filter_map(|spec| get(spec.key).map(|v| (*spec, v)))
        .collect()
}
