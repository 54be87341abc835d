//! Frame-step controller
//!
//! Layered on top of the render state: while a step request is outstanding,
//! every mixed sample is routed here instead of to the scheduler. One sample
//! at a time is designated the step sample and handed back for immediate
//! presentation; the rest are held in arrival order until stepping ends, at
//! which point they go back to normal delivery.
//!
//! ```text
//!   None ──request (clock stopped)──► WaitingStart ──clock start──► Pending
//!   None ──request (clock running)──────────────────────────────────► Pending
//!   Pending ──step sample chosen──► Scheduled ──sample released──► Complete
//!   Complete ──steps remain──► Pending        Complete ──none left──► None
//!   any ──cancel / clock stop / rate change──► None
//! ```

use std::collections::VecDeque;
use std::fmt;

use crate::error::{PresenterError, PresenterResult};
use crate::pool::Sample;
use crate::types::SampleToken;

/// Frame-step sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStepState {
    #[default]
    None,
    /// Request accepted, waiting for the clock to start
    WaitingStart,
    /// Waiting for a sample to become the step sample
    Pending,
    /// Step sample handed out, waiting for the backend to return it
    Scheduled,
    /// Step sample consumed
    Complete,
}

impl fmt::Display for FrameStepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStepState::None => "none",
            FrameStepState::WaitingStart => "waiting-start",
            FrameStepState::Pending => "pending",
            FrameStepState::Scheduled => "scheduled",
            FrameStepState::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// What to do with a freshly mixed sample
#[derive(Debug)]
pub enum StepDecision {
    /// Not stepping; deliver through the scheduler as usual
    PassThrough(Sample),
    /// This is the step sample; present it now
    Present(Sample),
    /// Held until the current step completes or stepping ends
    Held,
}

/// Result of a sample coming back from the backend
#[derive(Debug)]
pub enum StepProgress {
    /// Not the step sample
    Unrelated,
    /// One step done, more outstanding; `next` is the next step sample if
    /// one was already held
    Advanced {
        remaining: u32,
        next: Option<Sample>,
    },
    /// Last step done; held samples return to normal delivery
    Finished { resumed: Vec<Sample> },
}

#[derive(Debug, Default)]
pub struct FrameStepController {
    state: FrameStepState,
    remaining: u32,
    held: VecDeque<Sample>,
    /// Token of the sample that fulfils the current step
    marker: Option<SampleToken>,
}

impl FrameStepController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FrameStepState {
        self.state
    }

    /// Steps still to complete
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_stepping(&self) -> bool {
        self.state != FrameStepState::None
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Token of the outstanding step sample, if one has been handed out
    pub fn marker(&self) -> Option<SampleToken> {
        self.marker
    }

    fn transition(&mut self, to: FrameStepState) {
        if self.state != to {
            log::debug!("[STEP] {} -> {} ({} remaining)", self.state, to, self.remaining);
            self.state = to;
        }
    }

    /// Ask for `steps` more frames
    ///
    /// Additive while a request is outstanding; held samples are kept.
    pub fn request(&mut self, steps: u32, clock_running: bool) -> PresenterResult<()> {
        if steps == 0 {
            return Err(PresenterError::InvalidArgument(
                "step count must be at least 1".into(),
            ));
        }

        self.remaining = self.remaining.saturating_add(steps);
        if self.state == FrameStepState::None {
            if clock_running {
                self.transition(FrameStepState::Pending);
            } else {
                self.transition(FrameStepState::WaitingStart);
            }
        }
        log::info!("[STEP] Requested {} step(s), {} outstanding", steps, self.remaining);
        Ok(())
    }

    /// Clock started or restarted
    ///
    /// Returns the step sample to present if one was held while waiting.
    pub fn on_clock_start(&mut self) -> Option<Sample> {
        if self.state != FrameStepState::WaitingStart {
            return None;
        }
        self.transition(FrameStepState::Pending);
        self.take_next_held()
    }

    fn take_next_held(&mut self) -> Option<Sample> {
        let sample = self.held.pop_front()?;
        self.designate(&sample);
        Some(sample)
    }

    fn designate(&mut self, sample: &Sample) {
        self.marker = Some(sample.token());
        self.transition(FrameStepState::Scheduled);
    }

    /// Route a freshly mixed sample
    pub fn offer(&mut self, sample: Sample) -> StepDecision {
        match self.state {
            FrameStepState::None => StepDecision::PassThrough(sample),
            FrameStepState::Pending => {
                self.designate(&sample);
                StepDecision::Present(sample)
            }
            FrameStepState::WaitingStart
            | FrameStepState::Scheduled
            | FrameStepState::Complete => {
                log::trace!("[STEP] Holding {}", sample.token());
                self.held.push_back(sample);
                StepDecision::Held
            }
        }
    }

    /// The backend returned `token`
    pub fn on_sample_released(&mut self, token: SampleToken) -> StepProgress {
        if self.state != FrameStepState::Scheduled || self.marker != Some(token) {
            return StepProgress::Unrelated;
        }

        self.marker = None;
        self.remaining = self.remaining.saturating_sub(1);
        self.transition(FrameStepState::Complete);

        if self.remaining > 0 {
            self.transition(FrameStepState::Pending);
            let next = self.take_next_held();
            return StepProgress::Advanced {
                remaining: self.remaining,
                next,
            };
        }

        self.transition(FrameStepState::None);
        StepProgress::Finished {
            resumed: self.held.drain(..).collect(),
        }
    }

    /// The step sample was thrown away before the backend saw it
    ///
    /// The step is re-armed so the next sample fulfils it.
    pub fn on_sample_discarded(&mut self, token: SampleToken) {
        if self.state == FrameStepState::Scheduled && self.marker == Some(token) {
            self.marker = None;
            self.transition(FrameStepState::Pending);
        }
    }

    /// Drop held samples but keep the request (flush)
    pub fn flush(&mut self) -> Vec<Sample> {
        self.held.drain(..).collect()
    }

    /// Abandon stepping entirely; returns held samples
    pub fn cancel(&mut self) -> Vec<Sample> {
        if self.state != FrameStepState::None {
            log::info!("[STEP] Cancelled with {} step(s) outstanding", self.remaining);
        }
        self.remaining = 0;
        self.marker = None;
        self.transition(FrameStepState::None);
        self.held.drain(..).collect()
    }
}
