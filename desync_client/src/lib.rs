//! `desync_client`
//!
//! Client-side movement desynchronization:
//! - Controllers that override the player's physics and outgoing movement
//! - The host bridge that runs them through each tick's phases
//! - Packet synthesis and the network boundaries packets leave through
//! - A remote view of what the server has been told
//! - Scripted sandbox scenarios

pub mod boundary;
pub mod controllers;
pub mod host;
pub mod input;
pub mod packet;
pub mod remote;
pub mod sandbox;

pub use controllers::{BurrowEscape, Controller, CornerClip, DisableReason, FluidLocomotion};
pub use host::{ControllerToggled, ModuleHost, TickReport};
