//! `desync_shared`
//!
//! Shared libraries used by the client controllers and the test harness.
//!
//! Design goals:
//! - Deterministic: everything is driven by an external tick counter.
//! - Clear separation of concerns (world, entity, net, timers, settings).
//! - Traits at the collaborator seams so hosts and tests can inject their own.
//! - No `unsafe`.

pub mod config;
pub mod console;
pub mod entity;
pub mod event;
pub mod math;
pub mod net;
pub mod physics;
pub mod timer;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::entity::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::timer::*;
    pub use crate::world::*;
}
