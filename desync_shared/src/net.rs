//! Protocol messages and transport.
//!
//! Goals:
//! - Model the handful of movement messages the controllers emit and react to.
//! - Keep serialization explicit: unset movement fields never reach the wire.
//! - Provide a length-prefixed TCP framing for forwarding to a real peer.

use anyhow::Context;
use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tracing::debug;

use crate::math::{Rotation, Vec3};

/// Largest frame accepted by [`FramedConn::recv`].
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Composite movement update. Fields left `None` are omitted from the message.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoveUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_ground: Option<bool>,
}

impl MoveUpdate {
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.rotation.is_none() && self.on_ground.is_none()
    }
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerboundMsg {
    /// Movement update carrying any subset of position, rotation and ground flag.
    PlayerMove(MoveUpdate),
    /// Bare position report, bypassing the composite builder.
    Position { position: Vec3, on_ground: bool },
    /// Acknowledges a correction so the server stops resending it.
    ConfirmTeleport { teleport_id: i32 },
    KeepAlive { id: u64 },
}

impl ServerboundMsg {
    /// Position this message reports, if any.
    pub fn reported_position(&self) -> Option<Vec3> {
        match self {
            ServerboundMsg::PlayerMove(update) => update.position,
            ServerboundMsg::Position { position, .. } => Some(*position),
            _ => None,
        }
    }

    /// Ground flag this message reports, if any.
    pub fn reported_on_ground(&self) -> Option<bool> {
        match self {
            ServerboundMsg::PlayerMove(update) => update.on_ground,
            ServerboundMsg::Position { on_ground, .. } => Some(*on_ground),
            _ => None,
        }
    }
}

bitflags! {
    /// Components of a correction that are deltas from the current value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct RelativeFlags: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
        const YAW = 1 << 3;
        const PITCH = 1 << 4;
    }
}

/// Authoritative position/look correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionCorrection {
    pub position: Vec3,
    pub rotation: Rotation,
    #[serde(default)]
    pub relative: RelativeFlags,
    pub teleport_id: i32,
}

impl PositionCorrection {
    /// Absolute correction with no relative components.
    pub fn absolute(position: Vec3, teleport_id: i32) -> Self {
        Self {
            position,
            rotation: Rotation::default(),
            relative: RelativeFlags::empty(),
            teleport_id,
        }
    }

    /// Vertical coordinate after applying the relative flag.
    pub fn resolved_y(&self, current_y: f64) -> f64 {
        if self.relative.contains(RelativeFlags::Y) {
            current_y + self.position.y
        } else {
            self.position.y
        }
    }

    /// Full position after applying relative flags.
    pub fn resolve(&self, current: Vec3) -> Vec3 {
        let axis = |flag, delta: f64, base: f64| {
            if self.relative.contains(flag) {
                base + delta
            } else {
                delta
            }
        };
        Vec3::new(
            axis(RelativeFlags::X, self.position.x, current.x),
            self.resolved_y(current.y),
            axis(RelativeFlags::Z, self.position.z, current.z),
        )
    }
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientboundMsg {
    PositionCorrection(PositionCorrection),
    CloseWindow { window_id: u8 },
    KeepAlive { id: u64 },
    Disconnect { reason: String },
}

/// Length-prefixed JSON frames over TCP.
#[derive(Debug)]
pub struct FramedConn {
    stream: TcpStream,
}

impl FramedConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        debug!(peer = %addr, "Connected");
        Ok(Self::new(stream))
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let payload = encode_to_bytes(msg)?;
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        self.stream.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .context("tcp read len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        anyhow::ensure!(len <= MAX_FRAME_LEN, "frame of {len} bytes exceeds limit");
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        decode_from_bytes(&payload)
    }
}

/// TCP listener producing [`FramedConn`]s.
pub struct FramedListener {
    listener: TcpListener,
}

impl FramedListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(FramedConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        debug!(peer = %addr, "Accepted connection");
        Ok((FramedConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes<T: DeserializeOwned>(b: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(b).context("deserialize")
}
