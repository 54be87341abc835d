//! Presenter orchestrator
//!
//! Composes the pool, scheduler and state machines behind one pipeline lock
//! and drives the output loop:
//!
//! ```text
//!  clock / messages ──► RenderStateMachine ──► output loop
//!                                               │ acquire (SamplePool)
//!                                               │ process_output (Mixer)
//!                                               ▼
//!                              FrameStepController ──► Scheduler ──► outbox
//!                                                                      │ (lock released)
//!                                                                      ▼
//!  SampleReleaser ◄── backend completion thread ◄──────────── PresentBackend
//! ```
//!
//! ## Locking
//!
//! Every entry point (clock sink, control messages, display control, sample
//! release, timer wake-ups) takes the pipeline lock, then possibly the pool's
//! own lock, never the other way round. Samples ready for display are moved
//! into an outbox; the first caller to find the outbox non-empty drains it
//! after dropping the lock, one `present_sample` at a time. A backend that
//! returns a sample from inside `present_sample` therefore re-enters the
//! presenter without deadlocking, and frames still reach the backend in
//! order.
//!
//! ## Timer wake-ups
//!
//! The scheduler's timer thread carries the scheduler generation it was armed
//! under. Flushes, stops and rate changes bump the generation, so a wake-up
//! that fires after them is recognised as stale and ignored.

mod atomics;
mod format;
mod message;
mod output;
mod roles;
mod services;

#[cfg(test)]
mod tests;

pub use atomics::PresenterAtomics;
pub use message::PresenterMessage;
pub use roles::{ClockStateSink, DisplayControl, PresenterSettings, VideoPresenter};
pub use services::{Mixer, MixerOutput, PresentBackend, SampleReleaser, Services};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::config::PresenterConfig;
use crate::error::{PresenterError, PresenterResult};
use crate::events::{EventBus, PresenterEvent};
use crate::pool::{Sample, SamplePool};
use crate::scheduler::{Scheduler, SchedulerWorker};
use crate::state::{FrameStepController, FrameStepState, RenderState, RenderStateMachine};
use crate::types::{MediaTime, MediaType, NormalizedRect, Rect, SampleToken};

/// State guarded by the pipeline lock
struct Inner {
    render: RenderStateMachine,
    step: FrameStepController,
    scheduler: Scheduler,
    services: Option<Services>,
    worker: Option<SchedulerWorker>,
    /// Worker taken out under the lock, joined after it is dropped
    retired_worker: Option<SchedulerWorker>,

    /// Type the mixer offered, before cropping to `source_rect`
    native_type: Option<MediaType>,
    media_type: Option<MediaType>,
    source_rect: NormalizedRect,
    dest_rect: Rect,
    buffer_count: usize,
    retry_budget: u32,
    rate: f32,

    /// Samples waiting for `present_sample`, in order
    outbox: VecDeque<Sample>,
    /// Some caller is draining the outbox
    delivering: bool,
    /// Bumped by every flush; a failed present from before a flush is not retried
    flush_epoch: u64,

    /// First frame of the segment has been produced
    prerolled: bool,
    /// Mixer signalled input since it last needed more
    sample_notify: bool,
    /// Upstream signalled end of stream for this segment
    end_streaming: bool,
    /// EndOfStream already published for this segment
    eos_sent: bool,
}

impl Inner {
    fn clock_time(&self) -> MediaTime {
        self.services
            .as_ref()
            .and_then(|s| s.clock.as_ref())
            .map(|clock| clock.time())
            .unwrap_or(MediaTime::ZERO)
    }

    fn has_clock(&self) -> bool {
        self.services.as_ref().map(|s| s.clock.is_some()).unwrap_or(false)
    }

    fn services_mut(&mut self, operation: &'static str) -> PresenterResult<&mut Services> {
        let state = self.render.state();
        self.services
            .as_mut()
            .ok_or(PresenterError::InvalidState { operation, state })
    }

    fn reset_segment(&mut self) {
        self.prerolled = false;
        self.end_streaming = false;
        self.eos_sent = false;
    }
}

/// Presenter internals shared with the timer thread and the backend releaser
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    pool: SamplePool,
    events: EventBus,
    atomics: PresenterAtomics,
    weak_self: Weak<Shared>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the pipeline lock, then present whatever it queued
    ///
    /// Fatal errors returned by `f` stop playback before the lock is dropped.
    fn with_pipeline<R>(&self, f: impl FnOnce(&mut Inner) -> PresenterResult<R>) -> PresenterResult<R> {
        let (result, deliver, retired) = {
            let mut inner = self.lock();
            let result = f(&mut inner);
            if let Err(err) = &result {
                if err.is_fatal() {
                    self.fail(&mut inner, err.clone());
                }
            }
            self.atomics.set_render_state(inner.render.state());
            let deliver = Self::claim_delivery(&mut inner);
            (result, deliver, inner.retired_worker.take())
        };

        if let Some(mut worker) = retired {
            worker.shutdown();
        }
        if deliver {
            self.deliver_pending();
        }
        result
    }

    fn publish(&self, event: PresenterEvent) {
        self.events.publish(event);
    }
}

/// Video frame presenter
///
/// Implements the role traits [`ClockStateSink`], [`VideoPresenter`],
/// [`DisplayControl`] and [`PresenterSettings`]. Cheap to share: clones are
/// handles to the same presenter.
#[derive(Clone)]
pub struct Presenter {
    shared: Arc<Shared>,
}

impl Presenter {
    pub fn new(config: PresenterConfig) -> PresenterResult<Self> {
        config.validate()?;

        let shared = Arc::new_cyclic(|weak_self| Shared {
            inner: Mutex::new(Inner {
                render: RenderStateMachine::new(),
                step: FrameStepController::new(),
                scheduler: Scheduler::new(&config.scheduler),
                services: None,
                worker: None,
                retired_worker: None,
                native_type: None,
                media_type: None,
                source_rect: NormalizedRect::FULL,
                dest_rect: Rect::default(),
                buffer_count: config.pool.buffer_count,
                retry_budget: config.scheduler.retry_budget,
                rate: 1.0,
                outbox: VecDeque::new(),
                delivering: false,
                flush_epoch: 0,
                prerolled: false,
                sample_notify: false,
                end_streaming: false,
                eos_sent: false,
            }),
            pool: SamplePool::new(),
            events: EventBus::new(config.events.capacity),
            atomics: PresenterAtomics::new(),
            weak_self: weak_self.clone(),
        });

        Ok(Self { shared })
    }

    /// Attach collaborators: Shutdown -> Stopped
    ///
    /// Only legal once; the backend receives its [`SampleReleaser`] here.
    pub fn attach_services(&self, services: Services) -> PresenterResult<()> {
        self.shared.with_pipeline(|inner| {
            inner.render.attach_services()?;
            services
                .backend
                .bind_releaser(SampleReleaser::new(self.shared.weak_self.clone()));
            log::info!("[PRESENTER] Services attached ({:?})", services);
            inner.services = Some(services);
            Ok(())
        })
    }

    /// Drop all collaborators and shut down for good
    ///
    /// Queued samples go back to the pool and the pool is cleared; samples
    /// still held by the backend are abandoned.
    pub fn release_services(&self) -> PresenterResult<()> {
        self.shared.with_pipeline(|inner| {
            inner.render.check_shutdown("release services")?;
            self.shared.flush_locked(inner);
            inner.step.cancel();
            inner.render.shutdown();
            inner.scheduler.set_clock_running(false);
            self.shared.pool.clear();
            inner.media_type = None;
            inner.native_type = None;
            inner.services = None;
            inner.retired_worker = inner.worker.take();
            log::info!("[PRESENTER] Services released");
            Ok(())
        })
    }

    /// Backend returned a presented sample
    pub fn on_sample_released(&self, token: SampleToken) -> PresenterResult<()> {
        self.shared.sample_released(token)
    }

    /// Handle the backend can use to return samples
    pub fn releaser(&self) -> SampleReleaser {
        SampleReleaser::new(Arc::downgrade(&self.shared))
    }

    pub fn atomics(&self) -> &PresenterAtomics {
        &self.shared.atomics
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub fn pool(&self) -> &SamplePool {
        &self.shared.pool
    }

    pub fn render_state(&self) -> RenderState {
        self.shared.lock().render.state()
    }

    pub fn frame_step_state(&self) -> FrameStepState {
        self.shared.lock().step.state()
    }

    /// Frame steps still outstanding
    pub fn pending_steps(&self) -> u32 {
        self.shared.lock().step.remaining()
    }

    /// Samples waiting in the scheduler
    pub fn queued_samples(&self) -> usize {
        self.shared.lock().scheduler.len()
    }
}
