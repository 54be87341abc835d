//! Role traits implemented by [`Presenter`]
//!
//! Each trait is one narrow capability a pipeline component needs: the clock
//! drives [`ClockStateSink`], the session drives [`VideoPresenter`], the
//! window owner drives [`DisplayControl`], configuration UIs use
//! [`PresenterSettings`].

use crate::error::{PresenterError, PresenterResult};
use crate::state::RenderState;
use crate::types::{MediaTime, MediaType, NormalizedRect, Rect, Size};

use super::{Presenter, PresenterMessage};

/// Clock state notifications
pub trait ClockStateSink {
    /// Clock started; `offset` is the new position when seeking
    fn on_clock_start(&self, offset: Option<MediaTime>) -> PresenterResult<()>;
    fn on_clock_stop(&self) -> PresenterResult<()>;
    fn on_clock_pause(&self) -> PresenterResult<()>;
    fn on_clock_restart(&self) -> PresenterResult<()>;
    fn on_clock_set_rate(&self, rate: f32) -> PresenterResult<()>;
}

/// Pipeline control
pub trait VideoPresenter {
    fn process_message(&self, message: PresenterMessage) -> PresenterResult<()>;
    fn current_media_type(&self) -> PresenterResult<MediaType>;
}

/// Output window geometry
pub trait DisplayControl {
    /// Native frame size and picture aspect ratio of the mixer's output
    fn native_video_size(&self) -> PresenterResult<(Size, Size)>;
    /// Update the source crop and/or destination rectangle; `None` keeps the
    /// current value
    fn set_video_position(&self, source: Option<NormalizedRect>, dest: Option<Rect>) -> PresenterResult<()>;
    fn video_position(&self) -> PresenterResult<(NormalizedRect, Rect)>;
    /// Present the current frame again
    fn repaint_video(&self) -> PresenterResult<()>;
}

/// Tunables that can change while attached
pub trait PresenterSettings {
    /// Surfaces to allocate on the next format negotiation
    fn set_buffer_count(&self, count: usize) -> PresenterResult<()>;
    fn buffer_count(&self) -> PresenterResult<usize>;
    /// The backend replaced its device: drop queued work and re-allocate
    fn notify_device_change(&self) -> PresenterResult<()>;
}

impl ClockStateSink for Presenter {
    fn on_clock_start(&self, offset: Option<MediaTime>) -> PresenterResult<()> {
        let shared = &self.shared;
        shared.with_pipeline(|inner| {
            inner.render.check_shutdown("start")?;
            log::info!("[PRESENTER] Clock start (offset {:?})", offset);

            // Seeking while already running invalidates everything queued
            if inner.render.is_active() && offset.is_some() {
                shared.flush_locked(inner);
            }
            inner.render.clock_start()?;
            inner.scheduler.set_clock_running(true);

            if let Some(sample) = inner.step.on_clock_start() {
                inner.scheduler.present_now(sample);
            }
            shared.process_output_loop(inner)
        })
    }

    fn on_clock_stop(&self) -> PresenterResult<()> {
        let shared = &self.shared;
        shared.with_pipeline(|inner| {
            inner.render.check_shutdown("stop")?;
            log::info!("[PRESENTER] Clock stop");

            let was_stopped = inner.render.state() == RenderState::Stopped;
            inner.render.clock_stop()?;
            inner.scheduler.set_clock_running(false);

            for sample in inner.step.cancel() {
                shared.recycle(sample);
            }
            if !was_stopped {
                shared.flush_locked(inner);
            }
            Ok(())
        })
    }

    fn on_clock_pause(&self) -> PresenterResult<()> {
        let shared = &self.shared;
        shared.with_pipeline(|inner| {
            inner.render.check_shutdown("pause")?;
            log::info!("[PRESENTER] Clock pause");

            inner.render.clock_pause()?;
            inner.scheduler.set_clock_running(false);
            shared.drive(inner);
            Ok(())
        })
    }

    fn on_clock_restart(&self) -> PresenterResult<()> {
        let shared = &self.shared;
        shared.with_pipeline(|inner| {
            inner.render.check_shutdown("restart")?;
            log::info!("[PRESENTER] Clock restart");

            inner.render.clock_restart()?;
            inner.scheduler.set_clock_running(true);

            if let Some(sample) = inner.step.on_clock_start() {
                inner.scheduler.present_now(sample);
            }
            shared.process_output_loop(inner)
        })
    }

    fn on_clock_set_rate(&self, rate: f32) -> PresenterResult<()> {
        let shared = &self.shared;
        shared.with_pipeline(|inner| {
            inner.render.check_shutdown("set rate")?;
            if !rate.is_finite() {
                return Err(PresenterError::InvalidArgument(format!("playback rate {}", rate)));
            }
            if rate == inner.rate {
                return Ok(());
            }
            log::info!("[PRESENTER] Rate {} -> {}", inner.rate, rate);

            let reversed = (rate < 0.0) != (inner.rate < 0.0);
            let held = inner.step.cancel();
            inner.rate = rate;

            // Frames mixed for the old direction are stale
            for sample in inner.scheduler.set_rate(rate) {
                shared.recycle(sample);
            }
            for sample in held {
                if reversed {
                    shared.recycle(sample);
                } else {
                    shared.schedule_normal(inner, sample);
                }
            }
            shared.process_output_loop(inner)
        })
    }
}

impl VideoPresenter for Presenter {
    fn process_message(&self, message: PresenterMessage) -> PresenterResult<()> {
        let shared = &self.shared;
        shared.with_pipeline(|inner| shared.handle_message(inner, message))
    }

    fn current_media_type(&self) -> PresenterResult<MediaType> {
        let inner = self.shared.lock();
        inner.render.check_shutdown("query media type")?;
        super::Shared::current_media_type(&inner)
    }
}

impl DisplayControl for Presenter {
    fn native_video_size(&self) -> PresenterResult<(Size, Size)> {
        let inner = self.shared.lock();
        inner.render.check_shutdown("query video size")?;
        super::Shared::native_video_size(&inner)
    }

    fn set_video_position(&self, source: Option<NormalizedRect>, dest: Option<Rect>) -> PresenterResult<()> {
        let shared = &self.shared;
        shared.with_pipeline(|inner| {
            inner.render.check_shutdown("set video position")?;
            shared.set_video_position(inner, source, dest)
        })
    }

    fn video_position(&self) -> PresenterResult<(NormalizedRect, Rect)> {
        let inner = self.shared.lock();
        inner.render.check_shutdown("query video position")?;
        Ok((inner.source_rect, inner.dest_rect))
    }

    fn repaint_video(&self) -> PresenterResult<()> {
        let shared = &self.shared;
        shared.with_pipeline(|inner| {
            inner.render.check_shutdown("repaint")?;
            shared.repaint(inner)
        })
    }
}

impl PresenterSettings for Presenter {
    fn set_buffer_count(&self, count: usize) -> PresenterResult<()> {
        if count == 0 {
            return Err(PresenterError::InvalidArgument(
                "buffer count must be at least 1".into(),
            ));
        }
        let mut inner = self.shared.lock();
        inner.render.check_shutdown("set buffer count")?;
        inner.buffer_count = count;
        Ok(())
    }

    fn buffer_count(&self) -> PresenterResult<usize> {
        let inner = self.shared.lock();
        inner.render.check_shutdown("query buffer count")?;
        Ok(inner.buffer_count)
    }

    fn notify_device_change(&self) -> PresenterResult<()> {
        let shared = &self.shared;
        shared.with_pipeline(|inner| {
            inner.render.check_shutdown("change device")?;
            log::info!("[PRESENTER] Display device changed");
            shared.flush_locked(inner);
            if inner.media_type.is_some() {
                shared.renegotiate(inner)?;
            }
            shared.process_output_loop(inner)
        })
    }
}
