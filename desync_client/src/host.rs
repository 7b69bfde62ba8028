//! Host event bridge.
//!
//! [`ModuleHost`] owns the controllers and drives them through one tick:
//!
//! 1. `pre_move` for enabled controllers
//! 2. physics step
//! 3. `pre_update` for enabled controllers
//! 4. vanilla movement packet, unless a controller synthesized one
//! 5. `post_update` for enabled controllers
//! 6. `post_tick` for every controller
//!
//! Inbound messages go through [`ModuleHost::deliver`] between ticks. Any
//! change of a controller's enabled flag is published as a
//! [`ControllerToggled`] event.

use anyhow::{bail, Context};
use desync_shared::{
    config::DesyncConfig,
    console::{Console, CvarValue},
    entity::PlayerState,
    event::EventBus,
    math::Vec3,
    net::{ClientboundMsg, MoveUpdate, PositionCorrection, RelativeFlags, ServerboundMsg},
    physics::{NullPhysics, PhysicsBackend},
    world::WorldProbe,
};
use tracing::{debug, info, warn};

use crate::boundary::NetworkBoundary;
use crate::controllers::{
    BurrowEscape, Controller, CornerClip, DisableReason, FluidLocomotion, HookContext, Inbound,
    TickRateRequest, DEFAULT_TICK_MS,
};

/// Published whenever a controller turns on or off.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerToggled {
    pub name: &'static str,
    pub enabled: bool,
    /// Set when the controller turned off.
    pub reason: Option<DisableReason>,
    pub tick: u64,
}

/// Hook phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreMove,
    PreUpdate,
    PostUpdate,
    PostTick,
}

/// What one call to [`ModuleHost::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickReport {
    pub tick: u64,
    /// Movement updates built by controllers.
    pub synthesized: usize,
    /// Raw messages sent by controllers.
    pub raw_sent: usize,
    pub vanilla_sent: bool,
    /// Length the next tick should run at.
    pub tick_length_ms: f32,
}

pub struct ModuleHost<N: NetworkBoundary> {
    controllers: Vec<Box<dyn Controller>>,
    console: Console,
    events: EventBus,
    physics: Box<dyn PhysicsBackend>,
    net: N,
    tick: u64,
    tick_rate: TickRateRequest,
    tick_length_ms: f32,
}

impl<N: NetworkBoundary> ModuleHost<N> {
    /// Host with no controllers and no physics.
    pub fn new(net: N) -> Self {
        Self {
            controllers: Vec::new(),
            console: Console::new(),
            events: EventBus::default(),
            physics: Box::new(NullPhysics),
            net,
            tick: 0,
            tick_rate: TickRateRequest::default(),
            tick_length_ms: DEFAULT_TICK_MS,
        }
    }

    /// Host carrying the three standard controllers, all disabled.
    pub fn with_config(cfg: &DesyncConfig, net: N) -> Self {
        let mut host = Self::new(net);
        host.add_controller(Box::new(BurrowEscape::new(cfg.burrow.clone())));
        host.add_controller(Box::new(CornerClip::new(cfg.corner_clip.clone())));
        host.add_controller(Box::new(FluidLocomotion::new(cfg.fluid.clone())));
        host
    }

    pub fn with_physics(mut self, physics: Box<dyn PhysicsBackend>) -> Self {
        self.physics = physics;
        self
    }

    /// Registers a controller and exposes its settings as `<name>.<key>` cvars.
    pub fn add_controller(&mut self, controller: Box<dyn Controller>) {
        let name = controller.name();
        for (spec, value) in controller.settings() {
            self.console
                .register_setting(&format!("{name}.{}", spec.key), &spec, value);
        }
        debug!(controller = name, "Controller registered");
        self.controllers.push(controller);
    }

    /// Runs one full tick against `player`.
    pub fn tick(&mut self, player: &mut PlayerState, world: &dyn WorldProbe) -> TickReport {
        player.ticks_existed += 1;
        self.tick_rate.clear();
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        self.run_phase(Phase::PreMove, player, world, &mut report);
        self.physics.step(player, world);
        self.run_phase(Phase::PreUpdate, player, world, &mut report);

        if report.synthesized == 0 {
            self.net.send(ServerboundMsg::PlayerMove(MoveUpdate {
                position: Some(player.position),
                rotation: Some(player.rotation),
                on_ground: Some(player.on_ground),
            }));
            report.vanilla_sent = true;
        }

        self.run_phase(Phase::PostUpdate, player, world, &mut report);
        self.run_phase(Phase::PostTick, player, world, &mut report);

        self.tick_length_ms = self.tick_rate.requested().unwrap_or(DEFAULT_TICK_MS);
        report.tick_length_ms = self.tick_length_ms;
        self.tick += 1;
        report
    }

    fn run_phase(
        &mut self,
        phase: Phase,
        player: &mut PlayerState,
        world: &dyn WorldProbe,
        report: &mut TickReport,
    ) {
        for controller in &mut self.controllers {
            let was_enabled = controller.is_enabled();
            if !was_enabled && phase != Phase::PostTick {
                continue;
            }

            let mut ctx =
                HookContext::new(self.tick, player, world, &mut self.net, &mut self.tick_rate);
            match phase {
                Phase::PreMove => controller.pre_move(&mut ctx),
                Phase::PreUpdate => controller.pre_update(&mut ctx),
                Phase::PostUpdate => controller.post_update(&mut ctx),
                Phase::PostTick => controller.post_tick(&mut ctx),
            }
            report.synthesized += ctx.packets.emitted();
            report.raw_sent += ctx.packets.raw_sent();

            if controller.is_enabled() != was_enabled {
                let event = toggled(&**controller, self.tick);
                debug!(?phase, controller = event.name, enabled = event.enabled, "Toggled in hook");
                self.events.push(event);
            }
        }
    }

    /// Offers an inbound message to every controller. Returns false when one
    /// of them cancelled it; otherwise the host processes it.
    pub fn deliver(&mut self, msg: ClientboundMsg, player: &mut PlayerState) -> bool {
        let mut inbound = Inbound::new(msg);
        for controller in &mut self.controllers {
            controller.on_receive(&mut inbound, player);
        }
        if inbound.is_cancelled() {
            debug!(msg = ?inbound.msg(), "Inbound message cancelled");
            return false;
        }

        match inbound.into_msg() {
            ClientboundMsg::PositionCorrection(correction) => {
                self.apply_correction(&correction, player);
            }
            ClientboundMsg::KeepAlive { id } => self.net.send(ServerboundMsg::KeepAlive { id }),
            ClientboundMsg::CloseWindow { window_id } => debug!(window_id, "Window closed"),
            ClientboundMsg::Disconnect { reason } => warn!(%reason, "Disconnected by server"),
        }
        true
    }

    fn apply_correction(&mut self, correction: &PositionCorrection, player: &mut PlayerState) {
        let relative = correction.relative;
        player.position = correction.resolve(player.position);
        let keep = |flag, v: f64| if relative.contains(flag) { v } else { 0.0 };
        player.velocity = Vec3::new(
            keep(RelativeFlags::X, player.velocity.x),
            keep(RelativeFlags::Y, player.velocity.y),
            keep(RelativeFlags::Z, player.velocity.z),
        );
        if relative.contains(RelativeFlags::YAW) {
            player.rotation.yaw += correction.rotation.yaw;
        } else {
            player.rotation.yaw = correction.rotation.yaw;
        }
        if relative.contains(RelativeFlags::PITCH) {
            player.rotation.pitch += correction.rotation.pitch;
        } else {
            player.rotation.pitch = correction.rotation.pitch;
        }

        debug!(teleport_id = correction.teleport_id, position = ?player.position, "Position corrected");
        self.net.send(ServerboundMsg::ConfirmTeleport {
            teleport_id: correction.teleport_id,
        });
        self.net.send(ServerboundMsg::PlayerMove(MoveUpdate {
            position: Some(player.position),
            rotation: Some(player.rotation),
            on_ground: Some(false),
        }));
    }

    fn index_of(&self, name: &str) -> anyhow::Result<usize> {
        self.controllers
            .iter()
            .position(|c| c.name() == name)
            .with_context(|| format!("unknown controller: {name}"))
    }

    fn set_enabled(&mut self, idx: usize, on: bool) {
        let tick = self.tick;
        let controller = &mut self.controllers[idx];
        if controller.is_enabled() == on {
            return;
        }
        if on {
            controller.enable(tick);
        } else {
            controller.disable(tick, DisableReason::User);
        }
        let event = toggled(&**controller, tick);
        info!(controller = event.name, enabled = event.enabled, "Controller toggled");
        self.events.push(event);
    }

    pub fn enable(&mut self, name: &str) -> anyhow::Result<()> {
        let idx = self.index_of(name)?;
        self.set_enabled(idx, true);
        Ok(())
    }

    pub fn disable(&mut self, name: &str) -> anyhow::Result<()> {
        let idx = self.index_of(name)?;
        self.set_enabled(idx, false);
        Ok(())
    }

    /// Flips a controller and returns its new state.
    pub fn toggle(&mut self, name: &str) -> anyhow::Result<bool> {
        let idx = self.index_of(name)?;
        let on = !self.controllers[idx].is_enabled();
        self.set_enabled(idx, on);
        Ok(on)
    }

    pub fn controller(&self, name: &str) -> Option<&dyn Controller> {
        self.controllers
            .iter()
            .find(|c| c.name() == name)
            .map(|c| &**c)
    }

    /// Concrete view of a registered controller.
    pub fn controller_as<T: 'static>(&self, name: &str) -> Option<&T> {
        self.controller(name)?.as_any().downcast_ref::<T>()
    }

    pub fn controller_names(&self) -> Vec<&'static str> {
        self.controllers.iter().map(|c| c.name()).collect()
    }

    /// Runs a console line. Controller commands are handled here; anything
    /// else goes to the cvar console and accepted setting changes are routed
    /// to their controllers.
    pub fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Ok(Vec::new()),
            ["modules"] => Ok(self
                .controllers
                .iter()
                .map(|c| {
                    let state = if c.is_enabled() { "on" } else { "off" };
                    match c.disabled_by() {
                        Some(reason) if !c.is_enabled() => {
                            format!("{}: {state} ({reason})", c.name())
                        }
                        _ => format!("{}: {state}", c.name()),
                    }
                })
                .collect()),
            [cmd @ ("toggle" | "enable" | "disable"), name] => {
                let on = match *cmd {
                    "toggle" => self.toggle(name)?,
                    "enable" => {
                        self.enable(name)?;
                        true
                    }
                    _ => {
                        self.disable(name)?;
                        false
                    }
                };
                Ok(vec![format!("{name}: {}", if on { "on" } else { "off" })])
            }
            [cmd @ ("toggle" | "enable" | "disable"), ..] => bail!("usage: {cmd} <controller>"),
            _ => {
                let output = self.console.exec(line)?;
                self.route_setting_changes()?;
                Ok(output)
            }
        }
    }

    /// Sets `<controller>.<key>` through the console so range checks apply.
    pub fn set_setting(&mut self, name: &str, value: CvarValue) -> anyhow::Result<CvarValue> {
        let stored = self.console.set_cvar(name, value)?;
        self.route_setting_changes()?;
        Ok(stored)
    }

    fn route_setting_changes(&mut self) -> anyhow::Result<()> {
        let tick = self.tick;
        for (cvar, value) in self.console.drain_changes() {
            let Some((name, key)) = cvar.split_once('.') else {
                continue;
            };
            let idx = self.index_of(name)?;
            self.controllers[idx]
                .apply_setting(key, &value, tick)
                .with_context(|| format!("apply {cvar}"))?;
            debug!(%cvar, %value, "Setting applied");
        }
        Ok(())
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Toggle events published since the last call.
    pub fn drain_toggles(&mut self) -> Vec<ControllerToggled> {
        self.events.drain::<ControllerToggled>()
    }

    /// Tick length requested by the last tick, in milliseconds.
    pub fn tick_length_ms(&self) -> f32 {
        self.tick_length_ms
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn net(&self) -> &N {
        &self.net
    }

    pub fn net_mut(&mut self) -> &mut N {
        &mut self.net
    }
}

fn toggled(controller: &dyn Controller, tick: u64) -> ControllerToggled {
    let enabled = controller.is_enabled();
    ControllerToggled {
        name: controller.name(),
        enabled,
        reason: if enabled {
            None
        } else {
            controller.disabled_by()
        },
        tick,
    }
}
