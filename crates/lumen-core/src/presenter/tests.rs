use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;

use super::*;
use crate::clock::ManualClock;
use crate::error::{BackendError, MixerError, PoolError};
use crate::state::{FrameStepState, RenderState};
use crate::types::{fourcc, Ratio, SampleToken, Size, SurfaceId};

const NV12: u32 = fourcc(b"NV12");
const RGB4: u32 = fourcc(b"RGB4");

fn video_type(code: u32) -> MediaType {
    MediaType::new(Size::new(640, 360), Ratio::new(25, 1), code)
}

fn ms(v: i64) -> MediaTime {
    MediaTime::from_millis(v)
}

#[derive(Default)]
struct MixerState {
    types: Vec<MediaType>,
    output_type: Option<MediaType>,
    frames: VecDeque<MediaTime>,
    last: Option<MediaTime>,
    repaints: usize,
}

/// Mixer producing one frame per queued timestamp
#[derive(Clone, Default)]
struct FakeMixer(Arc<Mutex<MixerState>>);

impl FakeMixer {
    fn new(types: Vec<MediaType>) -> Self {
        let mixer = Self::default();
        mixer.0.lock().unwrap().types = types;
        mixer
    }

    fn push_frames(&self, times_ms: &[i64]) {
        let mut state = self.0.lock().unwrap();
        state.frames.extend(times_ms.iter().map(|&t| ms(t)));
    }

    fn output_type(&self) -> Option<MediaType> {
        self.0.lock().unwrap().output_type
    }

    fn repaints(&self) -> usize {
        self.0.lock().unwrap().repaints
    }
}

impl Mixer for FakeMixer {
    fn available_output_types(&mut self) -> Result<Vec<MediaType>, MixerError> {
        Ok(self.0.lock().unwrap().types.clone())
    }

    fn set_output_type(&mut self, media_type: Option<&MediaType>) -> Result<(), MixerError> {
        self.0.lock().unwrap().output_type = media_type.copied();
        Ok(())
    }

    fn has_input_available(&self) -> bool {
        !self.0.lock().unwrap().frames.is_empty()
    }

    fn process_output(&mut self, sample: &mut Sample, repaint: bool) -> Result<MixerOutput, MixerError> {
        let mut state = self.0.lock().unwrap();
        if repaint {
            let last = state.last;
            return match last {
                Some(time) => {
                    state.repaints += 1;
                    sample.set_time(Some(time));
                    Ok(MixerOutput::Ready)
                }
                None => Ok(MixerOutput::NeedMoreInput),
            };
        }
        match state.frames.pop_front() {
            Some(time) => {
                state.last = Some(time);
                sample.set_time(Some(time));
                sample.set_duration(Some(ms(40)));
                Ok(MixerOutput::Ready)
            }
            None => Ok(MixerOutput::NeedMoreInput),
        }
    }
}

/// Backend that records presents and holds samples until told to release
#[derive(Default)]
struct FakeBackend {
    /// Only this FourCC is accepted; `None` accepts everything
    supported: Option<u32>,
    presented: Mutex<Vec<(SampleToken, Option<MediaTime>)>>,
    held: Mutex<VecDeque<SampleToken>>,
    failures: Mutex<VecDeque<BackendError>>,
    releaser: Mutex<Option<SampleReleaser>>,
    release_inline: AtomicBool,
    next_surface: AtomicU64,
    allocations: AtomicUsize,
    dest: Mutex<Option<Rect>>,
}

impl FakeBackend {
    fn presented_times(&self) -> Vec<i64> {
        self.presented
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, t)| *t)
            .map(|t| t.ticks() / crate::types::TICKS_PER_MILLI)
            .collect()
    }

    fn presented_count(&self) -> usize {
        self.presented.lock().unwrap().len()
    }

    fn last_presented(&self) -> SampleToken {
        self.presented.lock().unwrap().last().unwrap().0
    }

    fn fail_next(&self, errors: &[BackendError]) {
        self.failures.lock().unwrap().extend(errors.iter().cloned());
    }

    fn releaser(&self) -> SampleReleaser {
        self.releaser.lock().unwrap().clone().unwrap()
    }

    /// Hand back the oldest held sample
    fn release_oldest(&self) -> PresenterResult<()> {
        let token = self.held.lock().unwrap().pop_front().unwrap();
        self.releaser().release(token)
    }

    /// Hand back every held sample, oldest first
    fn release_all(&self) -> Vec<PresenterResult<()>> {
        let mut results = Vec::new();
        loop {
            let next = self.held.lock().unwrap().pop_front();
            match next {
                Some(token) => results.push(self.releaser().release(token)),
                None => return results,
            }
        }
    }
}

impl PresentBackend for FakeBackend {
    fn supports(&self, media_type: &MediaType) -> bool {
        self.supported.map(|code| code == media_type.fourcc).unwrap_or(true)
    }

    fn allocate_surfaces(&self, _media_type: &MediaType, count: usize) -> Result<Vec<SurfaceId>, BackendError> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok((0..count)
            .map(|_| SurfaceId(self.next_surface.fetch_add(1, Ordering::SeqCst)))
            .collect())
    }

    fn present_sample(&self, sample: &Sample) -> Result<(), BackendError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.presented.lock().unwrap().push((sample.token(), sample.time()));
        if self.release_inline.load(Ordering::SeqCst) {
            self.releaser().release(sample.token()).unwrap();
        } else {
            self.held.lock().unwrap().push_back(sample.token());
        }
        Ok(())
    }

    fn bind_releaser(&self, releaser: SampleReleaser) {
        *self.releaser.lock().unwrap() = Some(releaser);
    }

    fn set_destination(&self, dest: Rect) {
        *self.dest.lock().unwrap() = Some(dest);
    }
}

struct Rig {
    presenter: Presenter,
    mixer: FakeMixer,
    backend: Arc<FakeBackend>,
    clock: Arc<ManualClock>,
    events: Receiver<PresenterEvent>,
}

impl Rig {
    fn events(&self) -> Vec<PresenterEvent> {
        self.events.try_iter().collect()
    }
}

fn attach(backend: FakeBackend, types: Vec<MediaType>, with_clock: bool) -> Rig {
    // RUST_LOG=debug cargo test shows the presenter's logs
    let _ = env_logger::builder().is_test(true).try_init();

    let presenter = Presenter::new(PresenterConfig::default()).unwrap();
    let events = presenter.events().subscribe();
    let mixer = FakeMixer::new(types);
    let backend = Arc::new(backend);
    let clock = Arc::new(ManualClock::new(MediaTime::ZERO));

    let mut services = Services::new(Box::new(mixer.clone()), backend.clone());
    if with_clock {
        services = services.with_clock(clock.clone());
    }
    presenter.attach_services(services).unwrap();

    Rig {
        presenter,
        mixer,
        backend,
        clock,
        events,
    }
}

/// Attached, negotiated and streaming
fn rig(with_clock: bool, frames_ms: &[i64]) -> Rig {
    let rig = attach(FakeBackend::default(), vec![video_type(NV12)], with_clock);
    rig.presenter
        .process_message(PresenterMessage::RenegotiateFormat)
        .unwrap();
    rig.presenter
        .process_message(PresenterMessage::BeginStreaming)
        .unwrap();
    rig.mixer.push_frames(frames_ms);
    rig
}

fn wait_for(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn test_attach_and_negotiate() {
    let rig = rig(true, &[]);
    assert_eq!(rig.presenter.render_state(), RenderState::Stopped);
    assert_eq!(rig.presenter.atomics().render_state(), RenderState::Stopped);
    assert_eq!(rig.presenter.current_media_type().unwrap(), video_type(NV12));
    assert_eq!(rig.mixer.output_type(), Some(video_type(NV12)));
    assert_eq!(rig.presenter.pool().capacity(), 4);
    assert!(rig
        .events()
        .contains(&PresenterEvent::FormatChanged(video_type(NV12))));
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = PresenterConfig::default();
    config.pool.buffer_count = 0;
    assert!(matches!(
        Presenter::new(config),
        Err(PresenterError::InvalidConfig(_))
    ));
}

#[test]
fn test_negotiation_skips_unsupported_types() {
    let backend = FakeBackend {
        supported: Some(NV12),
        ..FakeBackend::default()
    };
    let rig = attach(backend, vec![video_type(RGB4), video_type(NV12)], true);
    rig.presenter
        .process_message(PresenterMessage::RenegotiateFormat)
        .unwrap();
    assert_eq!(rig.presenter.current_media_type().unwrap().fourcc, NV12);
}

#[test]
fn test_negotiation_failure_is_fatal() {
    let backend = FakeBackend {
        supported: Some(NV12),
        ..FakeBackend::default()
    };
    let rig = attach(backend, vec![video_type(RGB4)], true);

    let result = rig.presenter.process_message(PresenterMessage::RenegotiateFormat);
    assert!(matches!(result, Err(PresenterError::FormatNegotiation(_))));
    assert_eq!(
        rig.presenter.current_media_type(),
        Err(PresenterError::NoMediaType)
    );
    assert!(rig
        .events()
        .iter()
        .any(|e| matches!(e, PresenterEvent::Error(PresenterError::FormatNegotiation(_)))));
}

#[test]
fn test_output_loop_waits_for_media_type() {
    let rig = attach(FakeBackend::default(), vec![video_type(NV12)], false);
    rig.mixer.push_frames(&[0]);
    rig.presenter.on_clock_start(None).unwrap();
    assert_eq!(
        rig.presenter.process_message(PresenterMessage::ProcessInputNotify),
        Err(PresenterError::NoMediaType)
    );
    assert_eq!(rig.backend.presented_count(), 0);
}

#[test]
fn test_no_clock_presents_immediately_with_backpressure() {
    let rig = rig(false, &[0, 40, 80, 120, 160, 200]);
    rig.presenter.on_clock_start(None).unwrap();

    // Four buffers, so two frames wait for releases
    assert_eq!(rig.backend.presented_count(), 4);
    assert_eq!(rig.presenter.pool().free_count(), 0);

    for result in rig.backend.release_all() {
        result.unwrap();
    }
    assert_eq!(rig.backend.presented_times(), vec![0, 40, 80, 120, 160, 200]);
    assert_eq!(rig.presenter.atomics().presented(), 6);
}

#[test]
fn test_end_of_stream_published_once() {
    let rig = rig(false, &[0, 40]);
    rig.presenter.on_clock_start(None).unwrap();
    rig.presenter
        .process_message(PresenterMessage::EndOfStream)
        .unwrap();
    rig.presenter
        .process_message(PresenterMessage::EndOfStream)
        .unwrap();

    let eos = rig
        .events()
        .iter()
        .filter(|e| **e == PresenterEvent::EndOfStream)
        .count();
    assert_eq!(eos, 1);
}

#[test]
fn test_end_of_stream_waits_for_queue() {
    let rig = rig(true, &[0, 500]);
    rig.presenter.on_clock_start(None).unwrap();
    rig.presenter
        .process_message(PresenterMessage::EndOfStream)
        .unwrap();
    assert!(!rig.events().contains(&PresenterEvent::EndOfStream));
    assert_eq!(rig.presenter.queued_samples(), 1);

    rig.clock.set(ms(500));
    assert!(wait_for(|| rig.backend.presented_count() == 2));
    assert!(wait_for(|| rig.presenter.queued_samples() == 0));
    assert!(wait_for(|| rig
        .events
        .try_iter()
        .any(|e| e == PresenterEvent::EndOfStream)));
}

#[test]
fn test_clock_drives_presentation_order() {
    let rig = rig(true, &[0, 40, 80]);
    rig.presenter.on_clock_start(None).unwrap();
    assert_eq!(rig.backend.presented_times(), vec![0]);
    assert_eq!(rig.presenter.queued_samples(), 2);

    // The timer fires 40ms later and reads the clock
    rig.clock.set(ms(40));
    assert!(wait_for(|| rig.backend.presented_count() == 2));
    rig.clock.set(ms(80));
    assert!(wait_for(|| rig.backend.presented_count() == 3));
    assert_eq!(rig.backend.presented_times(), vec![0, 40, 80]);
}

#[test]
fn test_late_frames_are_dropped() {
    let rig = rig(true, &[0, 10, 990, 1000]);
    rig.clock.set(ms(1000));
    rig.presenter.on_clock_start(None).unwrap();

    assert_eq!(rig.backend.presented_times(), vec![990, 1000]);
    assert_eq!(rig.presenter.atomics().dropped(), 2);
    let dropped = rig
        .events()
        .iter()
        .filter(|e| matches!(e, PresenterEvent::FrameDropped { .. }))
        .count();
    assert_eq!(dropped, 2);
    assert_eq!(rig.presenter.pool().free_count(), 2);
}

#[test]
fn test_pause_holds_queue_and_prerolls_after_flush() {
    let rig = rig(true, &[]);
    rig.presenter.on_clock_start(None).unwrap();
    rig.presenter.on_clock_pause().unwrap();
    rig.presenter.process_message(PresenterMessage::Flush).unwrap();

    rig.mixer.push_frames(&[0, 40]);
    rig.presenter
        .process_message(PresenterMessage::ProcessInputNotify)
        .unwrap();
    // Only the preroll frame is produced while paused
    assert_eq!(rig.backend.presented_times(), vec![0]);
    assert_eq!(rig.presenter.queued_samples(), 0);

    rig.presenter.on_clock_restart().unwrap();
    assert_eq!(rig.presenter.queued_samples(), 1);
}

#[test]
fn test_pause_only_from_started() {
    let rig = rig(true, &[]);
    assert!(matches!(
        rig.presenter.on_clock_pause(),
        Err(PresenterError::InvalidState { operation: "pause", state: RenderState::Stopped })
    ));
}

#[test]
fn test_frame_step_from_stopped_clock() {
    let rig = rig(true, &[0, 40, 80, 120]);

    rig.presenter.process_message(PresenterMessage::Step(1)).unwrap();
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::WaitingStart);

    rig.presenter.on_clock_start(None).unwrap();
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::Scheduled);
    assert_eq!(rig.backend.presented_times(), vec![0]);

    for result in rig.backend.release_all() {
        result.unwrap();
    }
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::None);
    assert_eq!(rig.presenter.pending_steps(), 0);
    assert!(rig
        .events()
        .contains(&PresenterEvent::StepComplete { remaining: 0 }));
    // Held frames resumed normal delivery
    assert_eq!(rig.presenter.queued_samples(), 3);
}

#[test]
fn test_multi_step_presents_one_frame_per_release() {
    let rig = rig(true, &[0, 40, 80, 120]);
    rig.presenter.on_clock_set_rate(0.0).unwrap();
    rig.presenter.on_clock_start(None).unwrap();
    // Scrubbing: nothing is timer-driven
    assert_eq!(rig.backend.presented_count(), 0);

    rig.presenter.process_message(PresenterMessage::Step(2)).unwrap();
    assert_eq!(rig.backend.presented_times(), vec![0]);

    rig.backend.release_oldest().unwrap();
    assert_eq!(rig.backend.presented_times(), vec![0, 40]);
    assert_eq!(rig.presenter.pending_steps(), 1);

    rig.backend.release_oldest().unwrap();
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::None);
    assert_eq!(rig.backend.presented_count(), 2);
}

#[test]
fn test_rate_change_cancels_step() {
    let rig = rig(true, &[0, 40, 80, 120]);
    rig.presenter.process_message(PresenterMessage::Step(3)).unwrap();
    rig.presenter.on_clock_start(None).unwrap();
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::Scheduled);
    let step_token = rig.backend.last_presented();

    rig.presenter.on_clock_set_rate(0.0).unwrap();
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::None);
    assert_eq!(rig.presenter.pending_steps(), 0);
    // Held frames went back to the scheduler, which holds them at rate 0
    assert_eq!(rig.presenter.queued_samples(), 3);

    rig.backend.releaser().release(step_token).unwrap();
    assert!(!rig
        .events()
        .iter()
        .any(|e| matches!(e, PresenterEvent::StepComplete { .. })));
}

#[test]
fn test_rate_change_cancels_pending_step() {
    let rig = rig(true, &[]);
    rig.presenter.on_clock_start(None).unwrap();
    rig.presenter.process_message(PresenterMessage::Step(2)).unwrap();
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::Pending);

    rig.presenter.on_clock_set_rate(0.5).unwrap();
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::None);
    assert_eq!(rig.presenter.pending_steps(), 0);

    // New input plays normally instead of becoming a step sample
    rig.mixer.push_frames(&[0]);
    rig.presenter
        .process_message(PresenterMessage::ProcessInputNotify)
        .unwrap();
    assert_eq!(rig.backend.presented_times(), vec![0]);
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::None);
}

#[test]
fn test_step_completes_when_pool_cleared_under_backend() {
    let rig = rig(false, &[0, 40, 80]);
    rig.presenter.process_message(PresenterMessage::Step(1)).unwrap();
    rig.presenter.on_clock_start(None).unwrap();
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::Scheduled);
    assert_eq!(rig.backend.presented_times(), vec![0]);

    // The backend still holds the step sample when its generation is cleared
    rig.presenter.notify_device_change().unwrap();
    for result in rig.backend.release_all() {
        result.unwrap();
    }
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::None);
    assert!(rig
        .events()
        .contains(&PresenterEvent::StepComplete { remaining: 0 }));

    rig.mixer.push_frames(&[160, 200]);
    rig.presenter
        .process_message(PresenterMessage::ProcessInputNotify)
        .unwrap();
    assert_eq!(rig.backend.presented_times(), vec![0, 160, 200]);
}

#[test]
fn test_rate_reversal_discards_queued_frames() {
    let rig = rig(true, &[100, 200, 300]);
    rig.presenter.on_clock_start(None).unwrap();
    assert_eq!(rig.presenter.queued_samples(), 3);
    assert_eq!(rig.presenter.pool().free_count(), 1);

    rig.presenter.on_clock_set_rate(-1.0).unwrap();
    assert_eq!(rig.presenter.queued_samples(), 0);
    assert_eq!(rig.presenter.pool().free_count(), 4);

    // The wake-up armed for the first frame went stale with the queue
    rig.clock.set(ms(400));
    thread::sleep(Duration::from_millis(150));
    assert_eq!(rig.backend.presented_count(), 0);
    assert!(!rig
        .events()
        .iter()
        .any(|e| matches!(e, PresenterEvent::FrameDropped { .. })));
    assert_eq!(rig.presenter.atomics().dropped(), 0);
}

#[test]
fn test_step_takes_over_already_queued_frames() {
    let rig = rig(true, &[100, 200, 300]);
    rig.presenter.on_clock_start(None).unwrap();
    assert_eq!(rig.presenter.queued_samples(), 3);
    assert_eq!(rig.backend.presented_count(), 0);

    rig.presenter.process_message(PresenterMessage::Step(1)).unwrap();
    // The earliest queued frame is stepped to at once, the rest are held
    assert_eq!(rig.backend.presented_times(), vec![100]);
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::Scheduled);
    assert_eq!(rig.presenter.queued_samples(), 0);

    rig.backend.release_oldest().unwrap();
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::None);
    assert_eq!(rig.presenter.queued_samples(), 2);
}

#[test]
fn test_cancel_step_message() {
    let rig = rig(true, &[]);
    rig.presenter.process_message(PresenterMessage::Step(1)).unwrap();
    rig.presenter.process_message(PresenterMessage::Step(2)).unwrap();
    assert_eq!(rig.presenter.pending_steps(), 3);

    rig.presenter.process_message(PresenterMessage::CancelStep).unwrap();
    assert_eq!(rig.presenter.frame_step_state(), FrameStepState::None);
    assert_eq!(rig.presenter.pending_steps(), 0);
}

#[test]
fn test_surface_unavailable_is_retried() {
    let rig = rig(false, &[0]);
    rig.backend.fail_next(&[BackendError::SurfaceUnavailable]);
    rig.presenter.on_clock_start(None).unwrap();

    assert!(wait_for(|| rig.backend.presented_count() == 1));
    assert_eq!(rig.presenter.atomics().retried(), 1);
    assert_eq!(rig.presenter.render_state(), RenderState::Started);
}

#[test]
fn test_retry_budget_exhaustion_stops_playback() {
    let rig = rig(false, &[0]);
    rig.backend.fail_next(&vec![BackendError::SurfaceUnavailable; 4]);
    rig.presenter.on_clock_start(None).unwrap();

    assert!(wait_for(|| rig.presenter.render_state() == RenderState::Stopped));
    assert_eq!(rig.backend.presented_count(), 0);
    assert_eq!(rig.presenter.pool().free_count(), 4);
    assert!(rig.events().iter().any(|e| matches!(
        e,
        PresenterEvent::Error(PresenterError::RetryBudgetExceeded { attempts: 4, .. })
    )));
}

#[test]
fn test_backend_failure_is_fatal() {
    let rig = rig(false, &[0]);
    rig.backend.fail_next(&[BackendError::Failed("device lost".into())]);
    rig.presenter.on_clock_start(None).unwrap();

    assert_eq!(rig.presenter.render_state(), RenderState::Stopped);
    assert_eq!(rig.presenter.atomics().render_state(), RenderState::Stopped);
    assert!(rig
        .events()
        .iter()
        .any(|e| matches!(e, PresenterEvent::Error(PresenterError::Backend(_)))));
}

#[test]
fn test_inline_release_does_not_deadlock() {
    let rig = rig(false, &[0, 40, 80, 120, 160, 200, 240, 280, 320, 360]);
    rig.backend.release_inline.store(true, Ordering::SeqCst);
    rig.presenter.on_clock_start(None).unwrap();

    assert_eq!(
        rig.backend.presented_times(),
        vec![0, 40, 80, 120, 160, 200, 240, 280, 320, 360]
    );
    assert_eq!(rig.presenter.pool().free_count(), 4);
}

#[test]
fn test_flush_returns_samples_and_stales_wakeup() {
    let rig = rig(true, &[100, 200, 300, 400]);
    rig.presenter.on_clock_start(None).unwrap();
    assert_eq!(rig.presenter.queued_samples(), 4);
    assert_eq!(rig.presenter.pool().free_count(), 0);

    rig.presenter.process_message(PresenterMessage::Flush).unwrap();
    assert_eq!(rig.presenter.queued_samples(), 0);
    assert_eq!(rig.presenter.pool().free_count(), 4);

    rig.clock.set(ms(1_000));
    thread::sleep(Duration::from_millis(150));
    assert_eq!(rig.backend.presented_count(), 0);
}

#[test]
fn test_stop_flushes_queue() {
    let rig = rig(true, &[100, 200]);
    rig.presenter.on_clock_start(None).unwrap();
    rig.presenter.on_clock_stop().unwrap();
    assert_eq!(rig.presenter.render_state(), RenderState::Stopped);
    assert_eq!(rig.presenter.queued_samples(), 0);
    assert_eq!(rig.presenter.pool().free_count(), 4);
}

#[test]
fn test_invalid_token_from_backend_is_fatal() {
    let rig = rig(false, &[]);
    rig.presenter.on_clock_start(None).unwrap();

    let result = rig.presenter.on_sample_released(SampleToken(999));
    assert_eq!(
        result,
        Err(PresenterError::InvalidToken(PoolError::InvalidToken(SampleToken(999))))
    );
    assert_eq!(rig.presenter.render_state(), RenderState::Stopped);
    assert!(rig
        .events()
        .iter()
        .any(|e| matches!(e, PresenterEvent::Error(PresenterError::InvalidToken(_)))));
}

#[test]
fn test_release_services_is_terminal() {
    let rig = rig(false, &[0]);
    rig.presenter.on_clock_start(None).unwrap();
    assert_eq!(rig.backend.presented_count(), 1);

    rig.presenter.release_services().unwrap();
    assert_eq!(rig.presenter.render_state(), RenderState::Shutdown);
    assert_eq!(rig.presenter.atomics().render_state(), RenderState::Shutdown);

    let is_invalid_state = |r: PresenterResult<()>| matches!(r, Err(PresenterError::InvalidState { .. }));
    assert!(is_invalid_state(rig.presenter.process_message(PresenterMessage::Flush)));
    assert!(is_invalid_state(rig.presenter.on_clock_start(None)));
    assert!(is_invalid_state(rig.presenter.on_clock_set_rate(2.0)));
    assert!(is_invalid_state(rig.presenter.release_services()));
    assert!(is_invalid_state(rig.presenter.set_buffer_count(2)));
    assert!(is_invalid_state(rig.presenter.repaint_video()));
    for result in rig.backend.release_all() {
        assert!(is_invalid_state(result));
    }
    assert!(rig.presenter.current_media_type().is_err());
    assert_eq!(rig.presenter.render_state(), RenderState::Shutdown);
}

#[test]
fn test_buffer_count_applies_on_renegotiation() {
    let rig = rig(false, &[]);
    assert!(matches!(
        rig.presenter.set_buffer_count(0),
        Err(PresenterError::InvalidArgument(_))
    ));
    rig.presenter.set_buffer_count(6).unwrap();
    assert_eq!(rig.presenter.buffer_count().unwrap(), 6);
    assert_eq!(rig.presenter.pool().capacity(), 4);

    rig.presenter
        .process_message(PresenterMessage::RenegotiateFormat)
        .unwrap();
    assert_eq!(rig.presenter.pool().capacity(), 6);
}

#[test]
fn test_device_change_reallocates_and_abandons_held_samples() {
    let rig = rig(false, &[0]);
    rig.presenter.on_clock_start(None).unwrap();
    let epoch = rig.presenter.pool().epoch();

    rig.presenter.notify_device_change().unwrap();
    assert_eq!(rig.backend.allocations.load(Ordering::SeqCst), 2);
    assert!(rig.presenter.pool().epoch() > epoch);

    // The sample the old device still held is written off, not an error
    for result in rig.backend.release_all() {
        result.unwrap();
    }
    assert_eq!(rig.presenter.pool().free_count(), 4);
}

#[test]
fn test_video_position_validation_and_crop() {
    let rig = rig(false, &[]);
    let bad = NormalizedRect {
        left: 0.6,
        top: 0.0,
        right: 0.4,
        bottom: 1.0,
    };
    assert!(matches!(
        rig.presenter.set_video_position(Some(bad), None),
        Err(PresenterError::InvalidArgument(_))
    ));
    assert!(matches!(
        rig.presenter.set_video_position(None, Some(Rect::new(10, 10, 0, 0))),
        Err(PresenterError::InvalidArgument(_))
    ));

    let left_half = NormalizedRect {
        left: 0.0,
        top: 0.0,
        right: 0.5,
        bottom: 1.0,
    };
    rig.presenter.set_video_position(Some(left_half), None).unwrap();
    assert_eq!(rig.presenter.current_media_type().unwrap().size, Size::new(320, 360));

    let (native, aspect) = rig.presenter.native_video_size().unwrap();
    assert_eq!(native, Size::new(640, 360));
    assert_eq!(aspect, Size::new(16, 9));
    assert_eq!(rig.presenter.video_position().unwrap().0, left_half);
}

#[test]
fn test_destination_change_repaints() {
    let rig = rig(false, &[0]);
    rig.presenter.on_clock_start(None).unwrap();
    assert_eq!(rig.backend.presented_count(), 1);

    let dest = Rect::new(0, 0, 1280, 720);
    rig.presenter.set_video_position(None, Some(dest)).unwrap();
    assert_eq!(*rig.backend.dest.lock().unwrap(), Some(dest));
    assert_eq!(rig.mixer.repaints(), 1);
    assert_eq!(rig.backend.presented_times(), vec![0, 0]);
}

#[test]
fn test_repaint_before_preroll_is_noop() {
    let rig = rig(false, &[]);
    rig.presenter.repaint_video().unwrap();
    assert_eq!(rig.mixer.repaints(), 0);
    assert_eq!(rig.backend.presented_count(), 0);
}

#[test]
fn test_concurrent_releases_keep_pool_balanced() {
    let frames: Vec<i64> = (0..200).map(|i| i * 40).collect();
    let rig = rig(false, &frames);
    rig.presenter.on_clock_start(None).unwrap();

    let backend = rig.backend.clone();
    let releaser = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        while backend.presented_count() < 200 && Instant::now() < deadline {
            backend.release_all();
            thread::yield_now();
        }
        backend.release_all();
    });
    releaser.join().unwrap();

    assert_eq!(rig.backend.presented_count(), 200);
    let pool = rig.presenter.pool();
    assert_eq!(pool.free_count() + pool.in_flight_count(), pool.capacity());
    assert_eq!(pool.free_count(), 4);
}
