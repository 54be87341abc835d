//! Lumen Core - video frame presentation scheduling
//!
//! Times mixed video frames against a presentation clock and hands them to a
//! display backend. See [`presenter::Presenter`] for the orchestrator.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod pool;
pub mod presenter;
pub mod scheduler;
pub mod state;
pub mod types;

pub use error::{PresenterError, PresenterResult};
pub use presenter::{
    ClockStateSink, DisplayControl, Presenter, PresenterMessage, PresenterSettings, VideoPresenter,
};
pub use types::*;
