//! Synthetic mixer and display backend
//!
//! The mixer counts frames at the configured rate. The display keeps each
//! presented surface for a fixed scan-out time on its own thread, then hands
//! it back through the presenter's releaser, like a real swap chain would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use lumen_core::error::{BackendError, MixerError};
use lumen_core::pool::Sample;
use lumen_core::presenter::{Mixer, MixerOutput, PresentBackend, SampleReleaser};
use lumen_core::{MediaTime, MediaType, Rect, SampleToken, SurfaceId};

/// Mixer producing a fixed number of timestamped frames
pub struct SyntheticMixer {
    native: MediaType,
    output: Option<MediaType>,
    frame_duration: MediaTime,
    total: u32,
    next: u32,
    last: Option<MediaTime>,
}

impl SyntheticMixer {
    pub fn new(native: MediaType, total: u32) -> Self {
        Self {
            native,
            output: None,
            frame_duration: native.frame_duration().unwrap_or(MediaTime::from_millis(33)),
            total,
            next: 0,
            last: None,
        }
    }
}

impl Mixer for SyntheticMixer {
    fn available_output_types(&mut self) -> Result<Vec<MediaType>, MixerError> {
        Ok(vec![self.native])
    }

    fn set_output_type(&mut self, media_type: Option<&MediaType>) -> Result<(), MixerError> {
        if let Some(media_type) = media_type {
            if media_type.frame_rate != self.native.frame_rate {
                return Err(MixerError::TypeRejected(format!(
                    "frame rate {}/{} differs from source",
                    media_type.frame_rate.num, media_type.frame_rate.den
                )));
            }
        }
        self.output = media_type.copied();
        Ok(())
    }

    fn has_input_available(&self) -> bool {
        self.output.is_some() && self.next < self.total
    }

    fn process_output(&mut self, sample: &mut Sample, repaint: bool) -> Result<MixerOutput, MixerError> {
        if self.output.is_none() {
            return Err(MixerError::Failed("no output type set".into()));
        }
        if repaint {
            return Ok(match self.last {
                Some(time) => {
                    sample.set_time(Some(time));
                    sample.set_duration(Some(self.frame_duration));
                    MixerOutput::Ready
                }
                None => MixerOutput::NeedMoreInput,
            });
        }
        if self.next >= self.total {
            return Ok(MixerOutput::NeedMoreInput);
        }

        let time = MediaTime::from_ticks(self.frame_duration.ticks() * self.next as i64);
        sample.set_time(Some(time));
        sample.set_duration(Some(self.frame_duration));
        self.last = Some(time);
        self.next += 1;
        Ok(MixerOutput::Ready)
    }
}

enum ScanoutCommand {
    Show(SampleToken),
    Shutdown,
}

/// Display that returns surfaces after a scan-out delay
pub struct SimulatedDisplay {
    scanout_tx: Sender<ScanoutCommand>,
    releaser: Arc<Mutex<Option<SampleReleaser>>>,
    next_surface: AtomicU64,
    presented: AtomicU64,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedDisplay {
    pub fn start(scanout: Duration) -> anyhow::Result<Arc<Self>> {
        let (scanout_tx, scanout_rx) = channel::unbounded();
        let releaser = Arc::new(Mutex::new(None));

        let thread_releaser = Arc::clone(&releaser);
        let handle = thread::Builder::new()
            .name("lumen-display".into())
            .spawn(move || scanout_loop(scanout_rx, thread_releaser, scanout))?;

        Ok(Arc::new(Self {
            scanout_tx,
            releaser,
            next_surface: AtomicU64::new(1),
            presented: AtomicU64::new(0),
            thread_handle: Mutex::new(Some(handle)),
        }))
    }

    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }

    /// Stop the scan-out thread after the frames already queued
    pub fn shutdown(&self) {
        *self.releaser.lock().unwrap_or_else(|e| e.into_inner()) = None;
        let handle = self.thread_handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = self.scanout_tx.send(ScanoutCommand::Shutdown);
            if handle.join().is_err() {
                log::error!("[DISPLAY] Scan-out thread panicked");
            }
        }
    }
}

fn scanout_loop(rx: Receiver<ScanoutCommand>, releaser: Arc<Mutex<Option<SampleReleaser>>>, scanout: Duration) {
    log::debug!("[DISPLAY] Scan-out thread started");
    while let Ok(ScanoutCommand::Show(token)) = rx.recv() {
        thread::sleep(scanout);
        let releaser = releaser.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(releaser) = releaser else {
            continue;
        };
        if let Err(e) = releaser.release(token) {
            log::warn!("[DISPLAY] Returning {} failed: {}", token, e);
        }
    }
    log::debug!("[DISPLAY] Scan-out thread stopped");
}

impl PresentBackend for SimulatedDisplay {
    fn supports(&self, media_type: &MediaType) -> bool {
        media_type.size.width <= 7680 && media_type.size.height <= 4320
    }

    fn allocate_surfaces(&self, media_type: &MediaType, count: usize) -> Result<Vec<SurfaceId>, BackendError> {
        log::info!(
            "[DISPLAY] Allocating {} surfaces of {}x{}",
            count,
            media_type.size.width,
            media_type.size.height
        );
        Ok((0..count)
            .map(|_| SurfaceId(self.next_surface.fetch_add(1, Ordering::Relaxed)))
            .collect())
    }

    fn present_sample(&self, sample: &Sample) -> Result<(), BackendError> {
        self.presented.fetch_add(1, Ordering::Relaxed);
        log::debug!("[DISPLAY] Scanning out {} at {:?}", sample.token(), sample.time());
        self.scanout_tx
            .send(ScanoutCommand::Show(sample.token()))
            .map_err(|_| BackendError::Failed("scan-out thread gone".into()))
    }

    fn bind_releaser(&self, releaser: SampleReleaser) {
        *self.releaser.lock().unwrap_or_else(|e| e.into_inner()) = Some(releaser);
    }

    fn set_destination(&self, dest: Rect) {
        log::info!("[DISPLAY] Destination {}x{}", dest.width(), dest.height());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::pool::SamplePool;
    use lumen_core::{fourcc, Ratio, Size};

    fn media_type() -> MediaType {
        MediaType::new(Size::new(64, 48), Ratio::new(25, 1), fourcc(b"NV12"))
    }

    #[test]
    fn test_mixer_stamps_consecutive_frames() {
        let pool = SamplePool::new();
        pool.initialize(vec![SurfaceId(1), SurfaceId(2)]).unwrap();

        let mut mixer = SyntheticMixer::new(media_type(), 2);
        mixer.set_output_type(Some(&media_type())).unwrap();

        let mut first = pool.acquire().unwrap();
        let mut second = pool.acquire().unwrap();
        assert_eq!(mixer.process_output(&mut first, false).unwrap(), MixerOutput::Ready);
        assert_eq!(mixer.process_output(&mut second, false).unwrap(), MixerOutput::Ready);
        assert_eq!(first.time(), Some(MediaTime::ZERO));
        assert_eq!(second.time(), Some(MediaTime::from_millis(40)));

        assert!(!mixer.has_input_available());
        assert_eq!(mixer.process_output(&mut first, false).unwrap(), MixerOutput::NeedMoreInput);

        // Repaint re-stamps the last frame
        assert_eq!(mixer.process_output(&mut first, true).unwrap(), MixerOutput::Ready);
        assert_eq!(first.time(), Some(MediaTime::from_millis(40)));
    }

    #[test]
    fn test_mixer_requires_output_type() {
        let pool = SamplePool::new();
        pool.initialize(vec![SurfaceId(1)]).unwrap();
        let mut sample = pool.acquire().unwrap();

        let mut mixer = SyntheticMixer::new(media_type(), 1);
        assert!(!mixer.has_input_available());
        assert!(mixer.process_output(&mut sample, false).is_err());
    }

    #[test]
    fn test_mixer_rejects_other_frame_rate() {
        let mut mixer = SyntheticMixer::new(media_type(), 1);
        let other = MediaType::new(Size::new(64, 48), Ratio::new(30, 1), fourcc(b"NV12"));
        assert!(matches!(
            mixer.set_output_type(Some(&other)),
            Err(MixerError::TypeRejected(_))
        ));
    }

    #[test]
    fn test_display_allocates_distinct_surfaces() {
        let display = SimulatedDisplay::start(Duration::from_millis(1)).unwrap();
        let surfaces = display.allocate_surfaces(&media_type(), 3).unwrap();
        assert_eq!(surfaces.len(), 3);
        assert_ne!(surfaces[0], surfaces[1]);
        assert_ne!(surfaces[1], surfaces[2]);
        display.shutdown();
    }
}
