//! Lock-free presenter statistics

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::state::RenderState;

/// Counters and state readable without taking the pipeline lock
///
/// Written by the presenter under its lock, read from any thread (UI,
/// monitoring). Values are individually consistent, not as a group.
#[derive(Debug)]
pub struct PresenterAtomics {
    /// Frames handed to the backend
    pub presented: AtomicU64,
    /// Frames skipped for being late
    pub dropped: AtomicU64,
    /// Presentation attempts repeated after the surface was unavailable
    pub retried: AtomicU64,
    /// Current render state (see [`RenderState`])
    pub state: AtomicU8,
}

impl PresenterAtomics {
    pub fn new() -> Self {
        Self {
            presented: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            state: AtomicU8::new(RenderState::Shutdown.as_u8()),
        }
    }

    #[inline]
    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    /// Current render state (lock-free)
    #[inline]
    pub fn render_state(&self) -> RenderState {
        RenderState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(super) fn record_presented(&self) {
        self.presented.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn set_render_state(&self, state: RenderState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }
}

impl Default for PresenterAtomics {
    fn default() -> Self {
        Self::new()
    }
}
