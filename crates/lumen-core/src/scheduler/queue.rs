//! Due-time ordered sample queue
//!
//! Converts clock time into present / wait / drop decisions. The scheduler
//! itself never touches the backend or the timer thread: `process_queue`
//! returns a [`Dispatch`] describing what is ready, what was dropped as late
//! and how long to sleep, and the presenter acts on it after releasing the
//! pipeline lock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::SchedulerConfig;
use crate::pool::Sample;
use crate::types::MediaTime;

struct Queued {
    due: MediaTime,
    /// Arrival order, breaks ties between equal due times
    seq: u64,
    sample: Sample,
}

/// Outcome of one pass over the queue
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Samples to present now, in presentation order
    pub ready: Vec<Sample>,
    /// Samples that missed their slot by more than the late threshold
    pub late: Vec<Sample>,
    /// Wall-clock delay until the next queued sample is due
    pub wake_in: Option<Duration>,
}

impl Dispatch {
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.late.is_empty()
    }
}

/// Presentation scheduler
///
/// Two lanes feed presentation:
/// - the timed queue, ordered by due time in the direction of playback;
/// - the immediate lane, for samples that must go out as soon as the backend
///   can take them (frame-step and repaint samples, no-clock mode, and
///   samples being retried after the surface was unavailable).
///
/// The timed queue only releases samples while the clock is advancing
/// (started, rate non-zero). Paused, stopped and scrubbing all hold.
pub struct Scheduler {
    queue: VecDeque<Queued>,
    immediate: VecDeque<Sample>,
    next_seq: u64,
    rate: f32,
    clock_running: bool,
    tolerance: MediaTime,
    late_threshold: MediaTime,
    retry_backoff: Duration,
    /// Backoff after a surface-unavailable failure
    hold_until: Option<Instant>,
    /// Bumped whenever previously computed wake-ups become meaningless
    generation: u64,
}

impl Scheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            immediate: VecDeque::new(),
            next_seq: 0,
            rate: 1.0,
            clock_running: false,
            tolerance: config.present_tolerance(),
            late_threshold: config.late_threshold(),
            retry_backoff: config.retry_backoff(),
            hold_until: None,
            generation: 0,
        }
    }

    /// Key the timed queue is sorted by; reverse playback presents the
    /// highest timestamps first.
    fn order_key(&self, due: MediaTime) -> i64 {
        if self.rate < 0.0 {
            -due.ticks()
        } else {
            due.ticks()
        }
    }

    /// Time until `due` in the direction of playback (negative = overdue)
    fn lead(&self, due: MediaTime, now: MediaTime) -> MediaTime {
        if self.rate < 0.0 {
            now - due
        } else {
            due - now
        }
    }

    /// Queue a sample for presentation at `due`
    ///
    /// Samples are held (never dropped) while the clock is not advancing.
    pub fn schedule_sample(&mut self, sample: Sample, due: MediaTime) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let key = self.order_key(due);
        let index = self
            .queue
            .iter()
            .position(|q| self.order_key(q.due) > key)
            .unwrap_or(self.queue.len());

        log::trace!("[SCHED] Queued {} due {} at slot {}", sample.token(), due, index);
        self.queue.insert(index, Queued { due, seq, sample });
    }

    /// Queue a sample to be presented without regard to its due time
    pub fn present_now(&mut self, sample: Sample) {
        self.immediate.push_back(sample);
    }

    /// Put back a sample the backend could not take, ahead of everything else
    ///
    /// `following` are samples that were due right after it; they keep their
    /// order behind it. Presentation of every lane is held for the retry
    /// backoff.
    pub fn requeue_after_failure(&mut self, sample: Sample, following: Vec<Sample>) {
        log::debug!(
            "[SCHED] Retrying {} in {:?} (attempt {})",
            sample.token(),
            self.retry_backoff,
            sample.attempts() + 1
        );
        for next in following.into_iter().rev() {
            self.immediate.push_front(next);
        }
        self.immediate.push_front(sample);
        self.hold_until = Some(Instant::now() + self.retry_backoff);
    }

    /// Decide what to present at clock time `now`
    pub fn process_queue(&mut self, now: MediaTime) -> Dispatch {
        let mut dispatch = Dispatch::default();

        if let Some(until) = self.hold_until {
            let remaining = until.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                dispatch.wake_in = Some(remaining);
                return dispatch;
            }
            self.hold_until = None;
        }

        dispatch.ready.extend(self.immediate.drain(..));

        if !self.is_advancing() {
            return dispatch;
        }

        while let Some(front) = self.queue.front() {
            let lead = self.lead(front.due, now);

            if lead.ticks() < -self.late_threshold.ticks() {
                if let Some(q) = self.queue.pop_front() {
                    log::debug!(
                        "[SCHED] Dropping {} ({} late)",
                        q.sample.token(),
                        MediaTime::from_ticks(-lead.ticks())
                    );
                    dispatch.late.push(q.sample);
                }
            } else if lead <= self.tolerance {
                if let Some(q) = self.queue.pop_front() {
                    dispatch.ready.push(q.sample);
                }
            } else {
                dispatch.wake_in = lead.scaled_wall_duration(self.rate);
                break;
            }
        }

        dispatch
    }

    /// Empty both lanes and invalidate any armed wake-up
    ///
    /// Returns the samples so the caller can give them back to the pool.
    pub fn cancel(&mut self) -> Vec<Sample> {
        self.generation += 1;
        self.hold_until = None;
        let mut samples: Vec<Sample> = self.immediate.drain(..).collect();
        samples.extend(self.queue.drain(..).map(|q| q.sample));
        if !samples.is_empty() {
            log::debug!("[SCHED] Cancelled {} queued samples", samples.len());
        }
        samples
    }

    /// Change playback rate; wake-ups computed under the old rate go stale
    ///
    /// Reversing direction cancels everything queued: those samples were
    /// mixed for the old direction. They are returned for recycling.
    pub fn set_rate(&mut self, rate: f32) -> Vec<Sample> {
        let reversed = (rate < 0.0) != (self.rate < 0.0);
        self.rate = rate;
        self.generation += 1;

        if reversed {
            log::debug!("[SCHED] Playback direction reversed");
            return self.cancel();
        }
        Vec::new()
    }

    /// Whether the clock is started; a stopped or paused clock holds the queue
    pub fn set_clock_running(&mut self, running: bool) {
        if self.clock_running != running {
            self.clock_running = running;
            self.generation += 1;
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn is_scrubbing(&self) -> bool {
        self.rate == 0.0
    }

    /// Whether timed delivery can make progress
    pub fn is_advancing(&self) -> bool {
        self.clock_running && self.rate != 0.0
    }

    /// Token identifying the current set of valid wake-ups
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.queue.len() + self.immediate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.immediate.is_empty()
    }
}
