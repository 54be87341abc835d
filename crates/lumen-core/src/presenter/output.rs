//! Output loop, scheduling and delivery

use std::time::Duration;

use crate::error::{BackendError, PoolError, PresenterError, PresenterResult};
use crate::events::PresenterEvent;
use crate::pool::Sample;
use crate::scheduler::SchedulerWorker;
use crate::state::{RenderState, StepDecision, StepProgress};
use crate::types::SampleToken;

use super::{Inner, MixerOutput, Shared};

impl Shared {
    /// Pull frames from the mixer while there is room and input
    ///
    /// Stops on backpressure (pool empty), when the mixer needs more input,
    /// or when the render state does not allow presentation.
    pub(super) fn process_output_loop(&self, inner: &mut Inner) -> PresenterResult<()> {
        loop {
            if !inner.render.is_active() || inner.media_type.is_none() || inner.eos_sent {
                break;
            }
            // While paused only the preroll frame is produced
            if inner.render.state() == RenderState::Paused && inner.prerolled {
                break;
            }

            let sample_notify = inner.sample_notify;
            let Some(services) = inner.services.as_mut() else {
                break;
            };
            if !sample_notify && !services.mixer.has_input_available() {
                break;
            }

            let Some(mut sample) = self.pool.acquire() else {
                log::trace!("[PRESENTER] Pool empty, waiting for a release");
                break;
            };

            match services.mixer.process_output(&mut sample, false) {
                Ok(MixerOutput::Ready) => {
                    log::trace!(
                        "[PRESENTER] Mixed {} at {:?}",
                        sample.token(),
                        sample.time()
                    );
                    self.route_sample(inner, sample);
                }
                Ok(MixerOutput::NeedMoreInput) => {
                    self.recycle(sample);
                    inner.sample_notify = false;
                    break;
                }
                Err(err) => {
                    self.recycle(sample);
                    return Err(err.into());
                }
            }
        }

        self.drive(inner);
        Ok(())
    }

    /// Send a mixed sample down the frame-step or normal path
    pub(super) fn route_sample(&self, inner: &mut Inner, sample: Sample) {
        match inner.step.offer(sample) {
            StepDecision::PassThrough(sample) => self.schedule_normal(inner, sample),
            StepDecision::Present(sample) => {
                inner.prerolled = true;
                inner.scheduler.present_now(sample);
            }
            StepDecision::Held => {}
        }
    }

    /// Queue a sample against the clock, or for immediate display when
    /// there is no clock, no timestamp, or it is the preroll frame of a
    /// clock that is not running
    pub(super) fn schedule_normal(&self, inner: &mut Inner, sample: Sample) {
        let clock_running = inner.render.state() == RenderState::Started;
        match sample.time() {
            Some(due) if inner.has_clock() && (clock_running || inner.prerolled) => {
                inner.scheduler.schedule_sample(sample, due);
            }
            _ => inner.scheduler.present_now(sample),
        }
        inner.prerolled = true;
    }

    /// Run the scheduler against the clock and arm the next wake-up
    pub(super) fn drive(&self, inner: &mut Inner) {
        let now = inner.clock_time();
        let dispatch = inner.scheduler.process_queue(now);

        for sample in dispatch.late {
            log::warn!(
                "[SCHED] Skipping late frame {} (due {:?}, clock {})",
                sample.token(),
                sample.time(),
                now
            );
            self.atomics.record_dropped();
            self.publish(PresenterEvent::FrameDropped {
                token: sample.token(),
                time: sample.time(),
            });
            self.recycle(sample);
        }
        inner.outbox.extend(dispatch.ready);

        match dispatch.wake_in {
            Some(after) => {
                if let Err(err) = self.arm_worker(inner, after) {
                    log::error!("[SCHED] {}", err);
                }
            }
            None => {
                if let Some(worker) = inner.worker.as_ref() {
                    worker.disarm();
                }
            }
        }

        self.check_end_of_stream(inner);
    }

    fn arm_worker(&self, inner: &mut Inner, after: Duration) -> PresenterResult<()> {
        self.ensure_worker(inner)?;
        if let Some(worker) = inner.worker.as_ref() {
            worker.arm(inner.scheduler.generation(), after);
        }
        Ok(())
    }

    pub(super) fn ensure_worker(&self, inner: &mut Inner) -> PresenterResult<()> {
        if inner.worker.is_none() {
            let weak = self.weak_self.clone();
            let worker = SchedulerWorker::spawn(move |generation| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_timer(generation);
                }
            })?;
            inner.worker = Some(worker);
        }
        Ok(())
    }

    /// Scheduler wake-up from the timer thread
    fn on_timer(&self, generation: u64) {
        let result = self.with_pipeline(|inner| {
            if inner.render.is_released() || generation != inner.scheduler.generation() {
                log::trace!("[SCHED] Ignoring stale wake-up (generation {})", generation);
                return Ok(());
            }
            self.drive(inner);
            Ok(())
        });
        if let Err(err) = result {
            log::error!("[SCHED] Wake-up failed: {}", err);
        }
    }

    /// Publish EndOfStream once the mixer is drained and nothing is queued
    pub(super) fn check_end_of_stream(&self, inner: &mut Inner) {
        if !inner.end_streaming || inner.eos_sent || inner.sample_notify {
            return;
        }
        let mixer_has_input = inner
            .services
            .as_ref()
            .map(|s| s.mixer.has_input_available())
            .unwrap_or(false);
        if mixer_has_input
            || !inner.scheduler.is_empty()
            || !inner.outbox.is_empty()
            || inner.delivering
            || inner.step.held_count() > 0
        {
            return;
        }

        inner.eos_sent = true;
        log::info!("[PRESENTER] End of stream reached");
        self.publish(PresenterEvent::EndOfStream);
    }

    /// Discard everything queued or held and return it to the pool
    ///
    /// Samples already handed to the backend are not waited for.
    pub(super) fn flush_locked(&self, inner: &mut Inner) {
        let mut samples = inner.scheduler.cancel();
        samples.extend(inner.step.flush());
        samples.extend(inner.outbox.drain(..));

        if !samples.is_empty() {
            log::debug!("[PRESENTER] Flushing {} samples", samples.len());
        }
        for sample in samples {
            inner.step.on_sample_discarded(sample.token());
            self.recycle(sample);
        }

        if let Some(worker) = inner.worker.as_ref() {
            worker.disarm();
        }
        inner.flush_epoch += 1;
        inner.prerolled = false;
    }

    /// Give a sample the presenter still owns back to the pool
    pub(super) fn recycle(&self, sample: Sample) {
        match self.pool.recycle(sample) {
            Ok(()) => {}
            Err(PoolError::Abandoned(token)) => {
                log::debug!("[POOL] {} belonged to a cleared generation", token);
            }
            Err(err) => log::warn!("[POOL] {}", err),
        }
    }

    /// Stop playback after an error that makes presentation impossible
    pub(super) fn fail(&self, inner: &mut Inner, err: PresenterError) {
        log::error!("[PRESENTER] Fatal: {}", err);
        self.flush_locked(inner);
        for sample in inner.step.cancel() {
            self.recycle(sample);
        }
        inner.scheduler.set_clock_running(false);
        if inner.render.is_active() && inner.render.clock_stop().is_ok() {
            log::warn!("[PRESENTER] Playback stopped after fatal error");
        }
        self.publish(PresenterEvent::Error(err));
    }

    /// Claim the outbox for draining; only one caller drains at a time
    pub(super) fn claim_delivery(inner: &mut Inner) -> bool {
        if inner.delivering || inner.outbox.is_empty() {
            return false;
        }
        inner.delivering = true;
        true
    }

    /// Present outbox samples one by one without holding the pipeline lock
    pub(super) fn deliver_pending(&self) {
        loop {
            let (sample, flush_epoch, backend) = {
                let mut inner = self.lock();
                let backend = inner.services.as_ref().map(|s| s.backend.clone());
                let next = inner.outbox.pop_front();
                match (next, backend) {
                    (Some(sample), Some(backend)) => {
                        if sample.epoch() != self.pool.epoch() {
                            self.recycle(sample);
                            continue;
                        }
                        (sample, inner.flush_epoch, backend)
                    }
                    (next, _) => {
                        if let Some(sample) = next {
                            self.recycle(sample);
                        }
                        inner.delivering = false;
                        self.check_end_of_stream(&mut inner);
                        return;
                    }
                }
            };

            match backend.present_sample(&sample) {
                Ok(()) => {
                    log::trace!("[PRESENTER] Presented {}", sample.token());
                    self.atomics.record_presented();
                    self.publish(PresenterEvent::FramePresented {
                        token: sample.token(),
                        time: sample.time(),
                    });
                }
                Err(BackendError::SurfaceUnavailable) => {
                    if !self.retry_later(sample, flush_epoch) {
                        return;
                    }
                }
                Err(err) => {
                    let mut inner = self.lock();
                    inner.step.on_sample_discarded(sample.token());
                    self.recycle(sample);
                    inner.delivering = false;
                    self.fail(&mut inner, err.into());
                    self.atomics.set_render_state(inner.render.state());
                    return;
                }
            }
        }
    }

    /// Surface unavailable: requeue with backoff, or give up past the budget
    ///
    /// Returns whether the caller should keep draining the outbox.
    fn retry_later(&self, mut sample: Sample, flush_epoch: u64) -> bool {
        let mut inner = self.lock();
        inner.delivering = false;

        if flush_epoch != inner.flush_epoch || inner.render.is_released() {
            inner.step.on_sample_discarded(sample.token());
            self.recycle(sample);
            return Self::claim_delivery(&mut inner);
        }

        let attempts = sample.record_failed_attempt();
        if attempts > inner.retry_budget {
            let token = sample.token();
            inner.step.on_sample_discarded(token);
            self.recycle(sample);
            self.fail(&mut inner, PresenterError::RetryBudgetExceeded { token, attempts });
            self.atomics.set_render_state(inner.render.state());
            return false;
        }

        log::warn!(
            "[PRESENTER] Surface unavailable for {} (attempt {} of {})",
            sample.token(),
            attempts,
            inner.retry_budget
        );
        self.atomics.record_retried();
        let following: Vec<Sample> = inner.outbox.drain(..).collect();
        inner.scheduler.requeue_after_failure(sample, following);
        self.drive(&mut inner);
        Self::claim_delivery(&mut inner)
    }

    /// Backend returned a sample; may complete a frame step and frees room
    /// for the output loop
    pub(super) fn sample_released(&self, token: SampleToken) -> PresenterResult<()> {
        self.with_pipeline(|inner| {
            inner.render.check_shutdown("release sample")?;

            // A sample from a cleared generation still completes a frame step
            match self.pool.release(token) {
                Ok(()) => {}
                Err(PoolError::Abandoned(token)) => {
                    log::debug!("[POOL] Released {} from a cleared generation", token);
                }
                Err(err) => return Err(err.into()),
            }

            match inner.step.on_sample_released(token) {
                StepProgress::Unrelated => {}
                StepProgress::Advanced { remaining, next } => {
                    self.publish(PresenterEvent::StepComplete { remaining });
                    if let Some(sample) = next {
                        inner.scheduler.present_now(sample);
                    }
                }
                StepProgress::Finished { resumed } => {
                    log::info!("[STEP] Frame stepping finished");
                    self.publish(PresenterEvent::StepComplete { remaining: 0 });
                    for sample in resumed {
                        self.schedule_normal(inner, sample);
                    }
                }
            }

            self.process_output_loop(inner)
        })
    }
}
