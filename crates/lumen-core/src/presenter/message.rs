//! Pipeline control messages

use crate::error::{PresenterError, PresenterResult};
use crate::state::RenderState;

use super::{Inner, Shared};

/// Commands the pipeline sends to the presenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterMessage {
    /// Discard every queued and held sample
    Flush,
    /// Negotiate a new output format with the mixer and backend
    RenegotiateFormat,
    /// The mixer has new input
    ProcessInputNotify,
    /// A play segment begins
    BeginStreaming,
    /// The play segment ended
    EndStreaming,
    /// Upstream has no more input for this segment
    EndOfStream,
    /// Advance by this many frames
    Step(u32),
    CancelStep,
}

impl PresenterMessage {
    pub(super) fn operation(&self) -> &'static str {
        match self {
            PresenterMessage::Flush => "flush",
            PresenterMessage::RenegotiateFormat => "renegotiate format",
            PresenterMessage::ProcessInputNotify => "process input",
            PresenterMessage::BeginStreaming => "begin streaming",
            PresenterMessage::EndStreaming => "end streaming",
            PresenterMessage::EndOfStream => "end stream",
            PresenterMessage::Step(_) => "step",
            PresenterMessage::CancelStep => "cancel step",
        }
    }
}

impl Shared {
    pub(super) fn handle_message(&self, inner: &mut Inner, message: PresenterMessage) -> PresenterResult<()> {
        inner.render.check_shutdown(message.operation())?;
        log::debug!("[PRESENTER] Message {:?} in state {}", message, inner.render.state());

        match message {
            PresenterMessage::Flush => {
                self.flush_locked(inner);
                Ok(())
            }
            PresenterMessage::RenegotiateFormat => {
                self.renegotiate(inner)?;
                self.process_output_loop(inner)
            }
            PresenterMessage::ProcessInputNotify => {
                if inner.media_type.is_none() {
                    return Err(PresenterError::NoMediaType);
                }
                inner.sample_notify = true;
                self.process_output_loop(inner)
            }
            PresenterMessage::BeginStreaming => {
                inner.reset_segment();
                self.ensure_worker(inner)
            }
            PresenterMessage::EndStreaming => {
                inner.reset_segment();
                inner.retired_worker = inner.worker.take();
                Ok(())
            }
            PresenterMessage::EndOfStream => {
                inner.end_streaming = true;
                self.check_end_of_stream(inner);
                Ok(())
            }
            PresenterMessage::Step(steps) => {
                let was_stepping = inner.step.is_stepping();
                let clock_running = inner.render.state() == RenderState::Started;
                inner.step.request(steps, clock_running)?;

                // Samples already queued become step candidates instead of
                // playing out normally
                if !was_stepping {
                    for sample in inner.scheduler.cancel() {
                        self.route_sample(inner, sample);
                    }
                }
                self.process_output_loop(inner)
            }
            PresenterMessage::CancelStep => {
                for sample in inner.step.cancel() {
                    self.schedule_normal(inner, sample);
                }
                self.process_output_loop(inner)
            }
        }
    }
}
