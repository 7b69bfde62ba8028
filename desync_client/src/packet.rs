//! Composite packet synthesis.
//!
//! A controller fills a [`PendingPacket`] inside a closure; when the closure
//! returns, the fields that were set go out as exactly one
//! [`ServerboundMsg::PlayerMove`]. Unset fields are omitted, not zeroed.

use desync_shared::{
    math::{Rotation, Vec3},
    net::{MoveUpdate, ServerboundMsg},
};

use crate::boundary::NetworkBoundary;

/// Fields collected for one movement update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PendingPacket {
    position: Option<Vec3>,
    rotation: Option<Rotation>,
    on_ground: Option<bool>,
}

impl PendingPacket {
    pub fn move_to(&mut self, position: Vec3) -> &mut Self {
        self.position = Some(position);
        self
    }

    pub fn rotate(&mut self, rotation: Rotation) -> &mut Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn on_ground(&mut self, on_ground: bool) -> &mut Self {
        self.on_ground = Some(on_ground);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.into_update().is_empty()
    }

    pub fn into_update(self) -> MoveUpdate {
        MoveUpdate {
            position: self.position,
            rotation: self.rotation,
            on_ground: self.on_ground,
        }
    }
}

/// Send surface handed to controllers for one hook phase.
pub struct PacketSynthesizer<'a> {
    net: &'a mut dyn NetworkBoundary,
    emitted: usize,
    raw_sent: usize,
}

impl<'a> PacketSynthesizer<'a> {
    pub fn new(net: &'a mut dyn NetworkBoundary) -> Self {
        Self {
            net,
            emitted: 0,
            raw_sent: 0,
        }
    }

    /// Builds one movement update and sends it. An empty builder sends
    /// nothing; returns whether a message went out.
    pub fn emit(&mut self, build: impl FnOnce(&mut PendingPacket)) -> bool {
        let mut pending = PendingPacket::default();
        build(&mut pending);
        if pending.is_empty() {
            return false;
        }
        self.net.send(ServerboundMsg::PlayerMove(pending.into_update()));
        self.emitted += 1;
        true
    }

    /// Sends a message as is, bypassing the builder.
    pub fn send(&mut self, msg: ServerboundMsg) {
        self.net.send(msg);
        self.raw_sent += 1;
    }

    /// Movement updates built through [`emit`](Self::emit) so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn raw_sent(&self) -> usize {
        self.raw_sent
    }
}
