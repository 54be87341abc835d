//! Presentation scheduling
//!
//! - [`Scheduler`]: due-time ordered queue and the present / wait / drop policy
//! - [`SchedulerWorker`]: timer thread that wakes the presenter when the next
//!   queued sample comes due
//!
//! The queue lives under the presenter's pipeline lock. The worker runs on its
//! own thread and only carries a generation number back to the presenter,
//! which re-acquires the lock and checks the generation before touching any
//! state, so a wake-up armed before a flush or rate change is inert.

mod queue;
mod worker;

pub use queue::{Dispatch, Scheduler};
pub use worker::SchedulerWorker;
