//! Presentation clock
//!
//! The scheduler treats the clock as the only source of truth for "now".
//! Hosts either supply their own implementation (a pipeline clock) or use
//! [`SoftwareClock`], which derives media time from `Instant` and the
//! playback rate. [`ManualClock`] is stepped explicitly, for offline
//! rendering and deterministic tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use crate::types::MediaTime;

/// Source of presentation time
pub trait PresentationClock: Send + Sync {
    /// Current media time
    fn time(&self) -> MediaTime;
}

/// Run state of a [`SoftwareClock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    #[default]
    Stopped,
    Running,
    Paused,
}

#[derive(Debug)]
struct SoftwareClockInner {
    state: ClockState,
    /// Media time at `anchor`
    base: MediaTime,
    /// Wall-clock instant `base` was sampled at, while running
    anchor: Option<Instant>,
    rate: f32,
}

impl SoftwareClockInner {
    fn now(&self) -> MediaTime {
        match (self.state, self.anchor) {
            (ClockState::Running, Some(anchor)) => {
                let elapsed = MediaTime::from_duration(anchor.elapsed());
                let scaled = (elapsed.ticks() as f64 * self.rate as f64) as i64;
                self.base + MediaTime::from_ticks(scaled)
            }
            _ => self.base,
        }
    }
}

/// Wall-clock driven presentation clock with rate control
#[derive(Debug)]
pub struct SoftwareClock {
    inner: Mutex<SoftwareClockInner>,
}

impl SoftwareClock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SoftwareClockInner {
                state: ClockState::Stopped,
                base: MediaTime::ZERO,
                anchor: None,
                rate: 1.0,
            }),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut SoftwareClockInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    /// Start running from `offset`, or from the current position if `None`
    pub fn start(&self, offset: Option<MediaTime>) {
        self.with_inner(|c| {
            c.base = offset.unwrap_or_else(|| c.now());
            c.anchor = Some(Instant::now());
            c.state = ClockState::Running;
        });
    }

    /// Resume from a pause without changing position
    pub fn restart(&self) {
        self.with_inner(|c| {
            if c.state == ClockState::Paused {
                c.anchor = Some(Instant::now());
                c.state = ClockState::Running;
            }
        });
    }

    pub fn pause(&self) {
        self.with_inner(|c| {
            if c.state == ClockState::Running {
                c.base = c.now();
                c.anchor = None;
                c.state = ClockState::Paused;
            }
        });
    }

    /// Stop and rewind to zero
    pub fn stop(&self) {
        self.with_inner(|c| {
            c.base = MediaTime::ZERO;
            c.anchor = None;
            c.state = ClockState::Stopped;
        });
    }

    /// Change rate without a discontinuity in media time
    pub fn set_rate(&self, rate: f32) {
        self.with_inner(|c| {
            if c.state == ClockState::Running {
                c.base = c.now();
                c.anchor = Some(Instant::now());
            }
            c.rate = rate;
        });
    }

    pub fn rate(&self) -> f32 {
        self.with_inner(|c| c.rate)
    }

    pub fn state(&self) -> ClockState {
        self.with_inner(|c| c.state)
    }
}

impl Default for SoftwareClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationClock for SoftwareClock {
    fn time(&self) -> MediaTime {
        self.with_inner(|c| c.now())
    }
}

/// Clock whose time only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicI64,
}

impl ManualClock {
    pub fn new(start: MediaTime) -> Self {
        Self {
            ticks: AtomicI64::new(start.ticks()),
        }
    }

    pub fn set(&self, time: MediaTime) {
        self.ticks.store(time.ticks(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: MediaTime) {
        self.ticks.fetch_add(by.ticks(), Ordering::SeqCst);
    }
}

impl PresentationClock for ManualClock {
    fn time(&self) -> MediaTime {
        MediaTime::from_ticks(self.ticks.load(Ordering::SeqCst))
    }
}
