//! Scripted sandbox scenarios.
//!
//! Each scenario is a small world, a starting player, the controller under
//! test, a key schedule and a schedule of server messages. The `sandbox`
//! binary and the integration tests both drive them through a [`ModuleHost`].

use anyhow::bail;
use desync_shared::{
    config::DesyncConfig,
    entity::{InputFlags, PlayerState},
    math::{BlockPos, Vec3},
    net::{ClientboundMsg, PositionCorrection},
    physics::{NullPhysics, PhysicsBackend, SimplePhysics},
    world::{Block, FluidKind, GridWorld},
};
use tracing::debug;

use crate::boundary::NetworkBoundary;
use crate::controllers::{BurrowEscape, CornerClip, FluidLocomotion};
use crate::host::{ModuleHost, TickReport};
use crate::input::build_movement;

pub const SCENARIOS: &[&str] = &["burrow", "clip", "swim"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhysicsKind {
    Null,
    Simple,
}

/// A server message delivered before the given tick runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledMsg {
    pub at_tick: u64,
    pub msg: ClientboundMsg,
}

pub struct Scenario {
    pub name: &'static str,
    pub world: GridWorld,
    pub player: PlayerState,
    /// Controller enabled when the host is built.
    pub controller: &'static str,
    /// `(from_tick, keys)` pairs sorted by tick; keys hold until the next entry.
    keys: Vec<(u64, InputFlags)>,
    inbound: Vec<ScheduledMsg>,
    /// Server rejects every move by correcting back to this position.
    pin: Option<Vec3>,
    physics: PhysicsKind,
    next_teleport_id: i32,
}

impl Scenario {
    pub fn by_name(name: &str) -> anyhow::Result<Self> {
        Ok(match name {
            "burrow" => Self::burrow(),
            "clip" => Self::corner_clip(),
            "swim" => Self::swim(),
            other => bail!("unknown scenario '{other}', expected one of {SCENARIOS:?}"),
        })
    }

    /// Player embedded in the block at (0, 4, 0) holding jump. The server
    /// accepts a position above the block on tick 10.
    pub fn burrow() -> Self {
        let mut world = GridWorld::new();
        world.fill(BlockPos::new(-2, 3, -2), BlockPos::new(2, 3, 2), Block::Solid);
        world.set_solid(BlockPos::new(0, 4, 0));

        Self {
            name: "burrow",
            world,
            player: PlayerState::at(Vec3::new(0.5, 4.0, 0.5)),
            controller: BurrowEscape::NAME,
            keys: vec![(0, InputFlags::JUMP)],
            inbound: vec![
                ScheduledMsg {
                    at_tick: 4,
                    msg: ClientboundMsg::CloseWindow { window_id: 0 },
                },
                ScheduledMsg {
                    at_tick: 10,
                    msg: ClientboundMsg::PositionCorrection(PositionCorrection::absolute(
                        Vec3::new(0.5, 5.0, 0.5),
                        1,
                    )),
                },
            ],
            pin: None,
            physics: PhysicsKind::Simple,
            next_teleport_id: 100,
        }
    }

    /// Player standing on the corner where two blocks meet at (5, 10, 5);
    /// the server keeps putting it back.
    pub fn corner_clip() -> Self {
        let mut world = GridWorld::new();
        world.fill(BlockPos::new(3, 9, 3), BlockPos::new(7, 9, 7), Block::Solid);
        world.set_solid(BlockPos::new(4, 10, 5));
        world.set_solid(BlockPos::new(5, 10, 4));

        let start = Vec3::new(5.0, 10.0, 5.0);
        let mut player = PlayerState::at(start);
        player.on_ground = true;

        Self {
            name: "clip",
            world,
            player,
            controller: CornerClip::<rand::rngs::StdRng>::NAME,
            keys: Vec::new(),
            inbound: Vec::new(),
            pin: Some(start),
            physics: PhysicsKind::Null,
            next_teleport_id: 100,
        }
    }

    /// Player submerged in a deep lava pool: idle, then swimming forward and
    /// up, then sinking.
    pub fn swim() -> Self {
        let mut world = GridWorld::new();
        world.fill(BlockPos::new(-9, -1, -9), BlockPos::new(9, -1, 9), Block::Solid);
        world.fill_fluid(BlockPos::new(-8, 0, -8), BlockPos::new(8, 7, 8), FluidKind::Lava);

        Self {
            name: "swim",
            world,
            player: PlayerState::at(Vec3::new(0.5, 1.0, 0.5)),
            controller: FluidLocomotion::NAME,
            keys: vec![
                (0, InputFlags::empty()),
                (10, InputFlags::FORWARD | InputFlags::JUMP),
                (30, InputFlags::SNEAK),
            ],
            inbound: Vec::new(),
            pin: None,
            physics: PhysicsKind::Simple,
            next_teleport_id: 100,
        }
    }

    /// Host with the standard controllers, this scenario's physics and its
    /// controller enabled.
    pub fn build_host<N: NetworkBoundary>(
        &self,
        cfg: &DesyncConfig,
        net: N,
    ) -> anyhow::Result<ModuleHost<N>> {
        let physics: Box<dyn PhysicsBackend> = match self.physics {
            PhysicsKind::Null => Box::new(NullPhysics),
            PhysicsKind::Simple => Box::new(SimplePhysics::default()),
        };
        let mut host = ModuleHost::with_config(cfg, net).with_physics(physics);
        host.enable(self.controller)?;
        Ok(host)
    }

    /// Keys held on `tick`.
    pub fn keys_at(&self, tick: u64) -> InputFlags {
        self.keys
            .iter()
            .take_while(|(from, _)| *from <= tick)
            .last()
            .map(|(_, keys)| *keys)
            .unwrap_or_default()
    }

    fn inbound_at(&mut self, tick: u64) -> Vec<ClientboundMsg> {
        let mut due: Vec<ClientboundMsg> = self
            .inbound
            .iter()
            .filter(|m| m.at_tick == tick)
            .map(|m| m.msg.clone())
            .collect();
        if let Some(pin) = self.pin {
            self.next_teleport_id += 1;
            due.push(ClientboundMsg::PositionCorrection(PositionCorrection::absolute(
                pin,
                self.next_teleport_id,
            )));
        }
        due
    }

    /// Delivers this tick's server messages, samples input and runs one tick.
    pub fn step<N: NetworkBoundary>(&mut self, host: &mut ModuleHost<N>) -> TickReport {
        let tick = host.current_tick();
        self.player.input = build_movement(self.keys_at(tick));
        for msg in self.inbound_at(tick) {
            let kept = host.deliver(msg, &mut self.player);
            debug!(tick, kept, "Scenario message delivered");
        }
        host.tick(&mut self.player, &self.world)
    }
}
