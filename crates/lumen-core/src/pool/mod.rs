//! Sample pool - reusable presentation surfaces
//!
//! The pool owns the fixed set of surfaces allocated for the current format
//! and lends them out as [`Sample`]s. Every checkout gets a fresh
//! [`SampleToken`], so the token identifies one loan rather than one surface:
//! returning a token twice is detectable no matter who acquired the surface
//! in between.
//!
//! ## Thread safety
//!
//! `release` is reachable from the display backend's completion thread while
//! the presenter is acquiring on its own thread. Both go through one internal
//! mutex, and every release signals a condition variable so a waiter blocked
//! on an empty pool wakes without polling. `acquire` itself never blocks: an
//! empty pool is reported as `None`, the normal backpressure signal.
//!
//! ## Clearing with samples in flight
//!
//! Clearing (or re-initializing for a new format) force-invalidates
//! outstanding loans. Their tokens move to an abandoned set and are logged;
//! a later `release` of one reports [`PoolError::Abandoned`] and never
//! touches the new generation of surfaces.
//!
//! Abandoned tokens are tracked individually for the two most recent
//! generations only. Older ones are recognised by range (tokens increase
//! monotonically), so a backend that never returns its written-off samples
//! cannot grow the set without bound. A second release of such an old token
//! reports `Abandoned` again rather than `InvalidToken`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{PoolError, PoolResult};
use crate::types::{MediaTime, SampleToken, SurfaceId};

/// One loaned frame buffer plus its presentation metadata
///
/// Deliberately not `Clone`: a sample value exists in exactly one place
/// (scheduler queue, frame-step list, or on its way to the backend).
#[derive(Debug, PartialEq, Eq)]
pub struct Sample {
    token: SampleToken,
    surface: SurfaceId,
    epoch: u64,
    time: Option<MediaTime>,
    duration: Option<MediaTime>,
    attempts: u32,
}

impl Sample {
    pub fn token(&self) -> SampleToken {
        self.token
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// Pool generation this sample was issued from
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Presentation timestamp, if the mixer stamped one
    pub fn time(&self) -> Option<MediaTime> {
        self.time
    }

    pub fn set_time(&mut self, time: Option<MediaTime>) {
        self.time = time;
    }

    pub fn duration(&self) -> Option<MediaTime> {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Option<MediaTime>) {
        self.duration = duration;
    }

    /// Number of failed presentation attempts so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn record_failed_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }
}

struct PoolInner {
    /// Every surface of the current generation
    surfaces: Vec<SurfaceId>,
    free: VecDeque<SurfaceId>,
    checked_out: HashMap<SampleToken, SurfaceId>,
    abandoned: HashSet<SampleToken>,
    /// Tokens below this belong to retired generations
    retired_below: u64,
    /// First token issued in the current and the previous generation
    generation_first: u64,
    prev_generation_first: u64,
    next_token: u64,
    epoch: u64,
}

/// Bounded pool of presentation surfaces
pub struct SamplePool {
    inner: Mutex<PoolInner>,
    available: Condvar,
}

impl SamplePool {
    /// Create an empty (capacity 0) pool
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                surfaces: Vec::new(),
                free: VecDeque::new(),
                checked_out: HashMap::new(),
                abandoned: HashSet::new(),
                retired_below: 1,
                generation_first: 1,
                prev_generation_first: 1,
                next_token: 1,
                epoch: 0,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fill the pool with a new generation of surfaces
    ///
    /// Any previous generation is cleared first (see [`SamplePool::clear`]).
    pub fn initialize(&self, surfaces: Vec<SurfaceId>) -> PoolResult<()> {
        if surfaces.is_empty() {
            return Err(PoolError::ZeroCapacity);
        }

        let mut inner = self.lock();
        Self::clear_locked(&mut inner);
        inner.free = surfaces.iter().copied().collect();
        inner.surfaces = surfaces;
        log::info!(
            "[POOL] Initialized generation {} with {} surfaces",
            inner.epoch,
            inner.surfaces.len()
        );
        drop(inner);

        self.available.notify_all();
        Ok(())
    }

    /// Drop every surface and write off outstanding loans
    ///
    /// Returns the number of tokens that were abandoned.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let abandoned = Self::clear_locked(&mut inner);
        drop(inner);
        self.available.notify_all();
        abandoned
    }

    fn clear_locked(inner: &mut PoolInner) -> usize {
        let outstanding: Vec<SampleToken> = inner.checked_out.keys().copied().collect();
        if !outstanding.is_empty() {
            log::warn!(
                "[POOL] Clearing generation {} with {} samples in flight, abandoning {:?}",
                inner.epoch,
                outstanding.len(),
                outstanding
            );
        }
        inner.abandoned.extend(outstanding.iter().copied());

        // Keep per-token records for the cleared and the previous generation
        let retired_below = inner.prev_generation_first;
        inner.abandoned.retain(|token| token.0 >= retired_below);
        inner.retired_below = retired_below;
        inner.prev_generation_first = inner.generation_first;
        inner.generation_first = inner.next_token;

        inner.checked_out.clear();
        inner.free.clear();
        inner.surfaces.clear();
        inner.epoch += 1;
        outstanding.len()
    }

    /// Check out a free sample, or `None` when the pool is exhausted
    pub fn acquire(&self) -> Option<Sample> {
        let mut inner = self.lock();
        let surface = inner.free.pop_front()?;
        let token = SampleToken(inner.next_token);
        inner.next_token += 1;
        inner.checked_out.insert(token, surface);
        log::trace!("[POOL] Acquired {} (surface {:?})", token, surface);

        Some(Sample {
            token,
            surface,
            epoch: inner.epoch,
            time: None,
            duration: None,
            attempts: 0,
        })
    }

    /// Return a checked-out sample by token
    ///
    /// Safe to call from any thread. Wakes waiters blocked in
    /// [`SamplePool::wait_available`].
    pub fn release(&self, token: SampleToken) -> PoolResult<()> {
        let mut inner = self.lock();
        match inner.checked_out.remove(&token) {
            Some(surface) => {
                inner.free.push_back(surface);
                log::trace!("[POOL] Released {} ({} free)", token, inner.free.len());
            }
            None if inner.abandoned.remove(&token) || token.0 < inner.retired_below => {
                return Err(PoolError::Abandoned(token))
            }
            None => return Err(PoolError::InvalidToken(token)),
        }
        drop(inner);

        self.available.notify_all();
        Ok(())
    }

    /// Return a sample the caller still holds by value
    pub fn recycle(&self, sample: Sample) -> PoolResult<()> {
        self.release(sample.token)
    }

    /// Block until a sample is free or `timeout` elapses
    ///
    /// Never call this while holding the presenter lock; it exists for hosts
    /// that want to park a producer thread on backpressure.
    pub fn wait_available(&self, timeout: Duration) -> bool {
        let inner = self.lock();
        let (inner, _) = self
            .available
            .wait_timeout_while(inner, timeout, |inner| {
                inner.free.is_empty()
            })
            .unwrap_or_else(PoisonError::into_inner);
        !inner.free.is_empty()
    }

    /// Whether `token` is currently checked out of this generation
    pub fn is_checked_out(&self, token: SampleToken) -> bool {
        self.lock().checked_out.contains_key(&token)
    }

    pub fn capacity(&self) -> usize {
        self.lock().surfaces.len()
    }

    pub fn free_count(&self) -> usize {
        self.lock().free.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().checked_out.len()
    }

    /// Current generation; advances on every clear or re-initialization
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn is_initialized(&self) -> bool {
        !self.lock().surfaces.is_empty()
    }
}

impl Default for SamplePool {
    fn default() -> Self {
        Self::new()
    }
}
