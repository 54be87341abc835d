//! Format negotiation, repaint and display geometry

use crate::error::{MixerError, PresenterError, PresenterResult};
use crate::events::PresenterEvent;
use crate::types::{MediaType, NormalizedRect, Rect, Size};

use super::{Inner, MixerOutput, Shared};

impl Shared {
    /// Agree on an output type with the mixer and backend, then rebuild the pool
    ///
    /// Candidates are tried in the mixer's order of preference, each cropped
    /// to the current source rectangle. Queued samples of the old format are
    /// flushed before the pool is replaced.
    pub(super) fn renegotiate(&self, inner: &mut Inner) -> PresenterResult<()> {
        let source = inner.source_rect;
        let buffer_count = inner.buffer_count;
        let services = inner.services_mut("renegotiate format")?;

        let candidates = services.mixer.available_output_types()?;
        let mut chosen = None;

        for native in candidates {
            let proposed = native.cropped(&source);
            if !proposed.is_valid() {
                log::debug!("[PRESENTER] Skipping invalid output type {:?}", proposed);
                continue;
            }
            if !services.backend.supports(&proposed) {
                log::debug!("[PRESENTER] Backend rejects {:?}", proposed);
                continue;
            }
            match services.mixer.set_output_type(Some(&proposed)) {
                Ok(()) => {}
                Err(MixerError::TypeRejected(reason)) => {
                    log::debug!("[PRESENTER] Mixer rejects {:?}: {}", proposed, reason);
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
            let surfaces = services.backend.allocate_surfaces(&proposed, buffer_count)?;
            chosen = Some((native, proposed, surfaces));
            break;
        }

        self.flush_locked(inner);

        let Some((native, media_type, surfaces)) = chosen else {
            if let Some(services) = inner.services.as_mut() {
                if let Err(err) = services.mixer.set_output_type(None) {
                    log::warn!("[PRESENTER] Clearing mixer output type failed: {}", err);
                }
            }
            inner.media_type = None;
            inner.native_type = None;
            self.pool.clear();
            return Err(PresenterError::FormatNegotiation(
                "no mixer output type is supported by the display backend".into(),
            ));
        };

        self.pool.initialize(surfaces).map_err(|err| {
            PresenterError::FormatNegotiation(format!("surface allocation: {}", err))
        })?;

        log::info!(
            "[PRESENTER] Output type {}x{} @ {}/{} with {} buffers",
            media_type.size.width,
            media_type.size.height,
            media_type.frame_rate.num,
            media_type.frame_rate.den,
            buffer_count
        );
        inner.native_type = Some(native);
        inner.media_type = Some(media_type);
        self.publish(PresenterEvent::FormatChanged(media_type));
        Ok(())
    }

    /// Re-present the current frame
    ///
    /// Does nothing until the first frame of the segment has been produced.
    pub(super) fn repaint(&self, inner: &mut Inner) -> PresenterResult<()> {
        if !inner.prerolled || inner.media_type.is_none() {
            return Ok(());
        }
        let services = inner.services_mut("repaint")?;
        let Some(mut sample) = self.pool.acquire() else {
            log::debug!("[PRESENTER] Repaint skipped, pool empty");
            return Ok(());
        };

        match services.mixer.process_output(&mut sample, true) {
            Ok(MixerOutput::Ready) => {
                log::debug!("[PRESENTER] Repainting with {}", sample.token());
                inner.scheduler.present_now(sample);
                self.drive(inner);
                Ok(())
            }
            Ok(MixerOutput::NeedMoreInput) => {
                self.recycle(sample);
                Ok(())
            }
            Err(err) => {
                self.recycle(sample);
                Err(err.into())
            }
        }
    }

    pub(super) fn native_video_size(inner: &Inner) -> PresenterResult<(Size, Size)> {
        let native = inner.native_type.ok_or(PresenterError::NoMediaType)?;
        Ok((native.size, native.picture_aspect()))
    }

    /// Update the source crop and/or destination rectangle
    pub(super) fn set_video_position(
        &self,
        inner: &mut Inner,
        source: Option<NormalizedRect>,
        dest: Option<Rect>,
    ) -> PresenterResult<()> {
        if let Some(source) = source {
            if !source.is_valid() {
                return Err(PresenterError::InvalidArgument(format!(
                    "source rectangle {:?} must lie within 0..=1 with left < right and top < bottom",
                    source
                )));
            }
        }
        if let Some(dest) = dest {
            if !dest.is_well_formed() {
                return Err(PresenterError::InvalidArgument(format!(
                    "destination rectangle {:?} has a negative extent",
                    dest
                )));
            }
        }

        let mut repaint = false;

        if let Some(dest) = dest {
            if dest != inner.dest_rect {
                inner.dest_rect = dest;
                if let Some(services) = inner.services.as_ref() {
                    services.backend.set_destination(dest);
                }
                repaint = true;
            }
        }

        if let Some(source) = source {
            if source != inner.source_rect {
                inner.source_rect = source;
                if inner.media_type.is_some() {
                    // The mixer still holds the last frame, so it can be repainted
                    let prerolled = inner.prerolled;
                    self.renegotiate(inner)?;
                    inner.prerolled = prerolled;
                    repaint = true;
                }
            }
        }

        if repaint {
            self.repaint(inner)?;
        }
        Ok(())
    }

    pub(super) fn current_media_type(inner: &Inner) -> PresenterResult<MediaType> {
        inner.media_type.ok_or(PresenterError::NoMediaType)
    }
}
