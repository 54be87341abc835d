//! External collaborators supplied at attach time

use std::fmt;
use std::sync::{Arc, Weak};

use crate::clock::PresentationClock;
use crate::error::{BackendError, MixerError, PresenterError, PresenterResult};
use crate::pool::Sample;
use crate::state::RenderState;
use crate::types::{MediaType, Rect, SampleToken, SurfaceId};

use super::Shared;

/// Result of asking the mixer for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerOutput {
    /// The sample was filled and stamped
    Ready,
    /// Nothing to produce until more input arrives
    NeedMoreInput,
}

/// Upstream mixer
///
/// Called with the pipeline lock held; implementations must not call back
/// into the presenter.
pub trait Mixer: Send {
    /// Output types the mixer can produce, in order of preference
    fn available_output_types(&mut self) -> Result<Vec<MediaType>, MixerError>;

    /// Set (or clear, with `None`) the output type
    fn set_output_type(&mut self, media_type: Option<&MediaType>) -> Result<(), MixerError>;

    /// Whether input is queued that `process_output` could turn into a frame
    fn has_input_available(&self) -> bool;

    /// Render the next frame into `sample`, stamping its time and duration
    ///
    /// With `repaint` set the mixer renders the most recent frame again.
    fn process_output(&mut self, sample: &mut Sample, repaint: bool) -> Result<MixerOutput, MixerError>;
}

/// Display backend that owns the surfaces and shows them
///
/// `present_sample` is called without the pipeline lock, so a backend may
/// hand a sample back through its [`SampleReleaser`] before returning.
pub trait PresentBackend: Send + Sync {
    /// Whether the backend can display frames of this type
    fn supports(&self, media_type: &MediaType) -> bool;

    /// Allocate `count` surfaces for `media_type`, replacing any previous set
    fn allocate_surfaces(&self, media_type: &MediaType, count: usize) -> Result<Vec<SurfaceId>, BackendError>;

    /// Show the sample; the surface stays with the backend until released
    fn present_sample(&self, sample: &Sample) -> Result<(), BackendError>;

    /// Receive the handle used to return samples
    fn bind_releaser(&self, releaser: SampleReleaser);

    /// Destination rectangle within the output window changed
    fn set_destination(&self, _dest: Rect) {}
}

/// Collaborators the presenter runs against
///
/// Held from `attach_services` until `release_services`, then dropped
/// together.
pub struct Services {
    /// Presentation clock; `None` presents every frame as soon as it is mixed
    pub clock: Option<Arc<dyn PresentationClock>>,
    pub mixer: Box<dyn Mixer>,
    pub backend: Arc<dyn PresentBackend>,
}

impl Services {
    pub fn new(mixer: Box<dyn Mixer>, backend: Arc<dyn PresentBackend>) -> Self {
        Self {
            clock: None,
            mixer,
            backend,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn PresentationClock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("clock", &self.clock.is_some())
            .finish_non_exhaustive()
    }
}

/// Backend-side handle for returning presented samples
///
/// Safe to use from any thread. Does not keep the presenter alive.
#[derive(Clone)]
pub struct SampleReleaser {
    shared: Weak<Shared>,
}

impl SampleReleaser {
    pub(super) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }

    /// Return the sample loaned under `token`
    pub fn release(&self, token: SampleToken) -> PresenterResult<()> {
        match self.shared.upgrade() {
            Some(shared) => shared.sample_released(token),
            None => Err(PresenterError::InvalidState {
                operation: "release sample",
                state: RenderState::Shutdown,
            }),
        }
    }
}

impl fmt::Debug for SampleReleaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleReleaser")
            .field("attached", &(self.shared.strong_count() > 0))
            .finish()
    }
}
