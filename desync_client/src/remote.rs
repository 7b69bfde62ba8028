//! Remote view.
//!
//! Reconstructs what the server believes about the player purely from what
//! was sent to it, so the desync between local and reported state can be
//! measured.

use std::collections::VecDeque;

use desync_shared::{math::Vec3, net::ServerboundMsg};

use crate::boundary::NetworkBoundary;

/// Bounded history of positions reported to the server.
#[derive(Debug, Default)]
pub struct RemoteView {
    history: VecDeque<Vec3>,
    max: usize,
    on_ground: Option<bool>,
    observed: u64,
}

impl RemoteView {
    pub fn new(max: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(max),
            max,
            on_ground: None,
            observed: 0,
        }
    }

    /// Folds an outgoing message into the view.
    pub fn observe(&mut self, msg: &ServerboundMsg) {
        self.observed += 1;
        if let Some(pos) = msg.reported_position() {
            self.history.push_back(pos);
            while self.history.len() > self.max {
                self.history.pop_front();
            }
        }
        if let Some(on_ground) = msg.reported_on_ground() {
            self.on_ground = Some(on_ground);
        }
    }

    /// Last position the server was told about.
    pub fn position(&self) -> Option<Vec3> {
        self.history.back().copied()
    }

    pub fn on_ground(&self) -> Option<bool> {
        self.on_ground
    }

    /// Reported positions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Vec3> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Messages seen, including those without a position.
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Distance between `local` and the last reported position.
    pub fn desync(&self, local: Vec3) -> Option<f64> {
        self.position().map(|p| p.distance(local))
    }

    /// Lowest reported y in the history.
    pub fn min_y(&self) -> Option<f64> {
        self.history.iter().map(|p| p.y).reduce(f64::min)
    }
}

/// Boundary wrapper that records every outgoing message into a [`RemoteView`].
#[derive(Debug)]
pub struct TrackingBoundary<N> {
    inner: N,
    view: RemoteView,
}

impl<N: NetworkBoundary> TrackingBoundary<N> {
    pub fn new(inner: N, history: usize) -> Self {
        Self {
            inner,
            view: RemoteView::new(history),
        }
    }

    pub fn view(&self) -> &RemoteView {
        &self.view
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut N {
        &mut self.inner
    }
}

impl<N: NetworkBoundary> NetworkBoundary for TrackingBoundary<N> {
    fn send(&mut self, msg: ServerboundMsg) {
        self.view.observe(&msg);
        self.inner.send(msg);
    }
}
