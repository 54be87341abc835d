//! Lumen Player - headless presentation driver
//!
//! Runs the presenter against a synthetic mixer and a simulated display on a
//! software clock, through a scripted session:
//! 1. Negotiate the output format and start streaming
//! 2. Play, pause, frame-step on resume, then play at double speed
//! 3. Signal end of stream and wait for the presenter to drain
//!
//! ## Command line flags
//!
//! - `--frames <n>`: Override the number of frames the source produces

mod config;
mod sim;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver};

use lumen_core::clock::SoftwareClock;
use lumen_core::config::load_config;
use lumen_core::events::PresenterEvent;
use lumen_core::presenter::Services;
use lumen_core::{ClockStateSink, MediaTime, Presenter, PresenterMessage, VideoPresenter};

use sim::{SimulatedDisplay, SyntheticMixer};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let frames_override = args
        .iter()
        .position(|arg| arg == "--frames")
        .and_then(|i| args.get(i + 1))
        .map(|value| value.parse::<u32>())
        .transpose()
        .context("--frames expects a number")?;

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("lumen-player starting up");

    let config_path = config::default_config_path();
    let mut config: config::PlayerConfig = load_config(&config_path);
    if let Some(frames) = frames_override {
        config.source.frames = frames;
    }

    let presenter = Presenter::new(config.presenter.clone()).context("Invalid presenter config")?;
    let events = presenter.events().subscribe();

    let clock = Arc::new(SoftwareClock::new());
    let display = SimulatedDisplay::start(Duration::from_millis(config.display.scanout_ms))
        .context("Failed to start simulated display")?;
    let mixer = SyntheticMixer::new(config.source.media_type(), config.source.frames);

    presenter.attach_services(
        Services::new(Box::new(mixer), display.clone()).with_clock(clock.clone()),
    )?;

    let (eos_tx, eos_rx) = channel::bounded(1);
    let event_thread = thread::Builder::new()
        .name("lumen-events".into())
        .spawn(move || log_events(events, eos_tx))
        .context("Failed to spawn event thread")?;

    let result = run_session(&presenter, &clock, &eos_rx);

    if let Err(e) = presenter.release_services() {
        log::warn!("Releasing services failed: {}", e);
    }
    display.shutdown();

    let atomics = presenter.atomics();
    println!(
        "presented {} / dropped {} / retried {} (display saw {})",
        atomics.presented(),
        atomics.dropped(),
        atomics.retried(),
        display.presented()
    );

    drop(presenter);
    if event_thread.join().is_err() {
        log::error!("Event thread panicked");
    }
    result
}

fn run_session(presenter: &Presenter, clock: &SoftwareClock, eos_rx: &Receiver<()>) -> Result<()> {
    presenter.process_message(PresenterMessage::RenegotiateFormat)?;
    presenter.process_message(PresenterMessage::BeginStreaming)?;
    presenter.process_message(PresenterMessage::ProcessInputNotify)?;

    log::info!("Playing");
    clock.start(Some(MediaTime::ZERO));
    presenter.on_clock_start(Some(MediaTime::ZERO))?;
    thread::sleep(Duration::from_secs(1));

    log::info!("Pausing, then stepping 3 frames on resume");
    clock.pause();
    presenter.on_clock_pause()?;
    presenter.process_message(PresenterMessage::Step(3))?;
    thread::sleep(Duration::from_millis(300));
    clock.restart();
    presenter.on_clock_restart()?;
    thread::sleep(Duration::from_millis(300));

    log::info!("Playing at 2x");
    clock.set_rate(2.0);
    presenter.on_clock_set_rate(2.0)?;

    presenter.process_message(PresenterMessage::EndOfStream)?;
    if eos_rx.recv_timeout(Duration::from_secs(30)).is_err() {
        log::warn!("Timed out waiting for end of stream");
    }

    clock.stop();
    presenter.on_clock_stop()?;
    presenter.process_message(PresenterMessage::EndStreaming)?;
    Ok(())
}

/// Log presenter events until the presenter goes away
fn log_events(events: Receiver<PresenterEvent>, eos_tx: channel::Sender<()>) {
    loop {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(PresenterEvent::FramePresented { token, time }) => {
                log::debug!("[EVENT] Presented {} at {:?}", token, time);
            }
            Ok(PresenterEvent::FrameDropped { token, time }) => {
                log::warn!("[EVENT] Dropped late frame {} at {:?}", token, time);
            }
            Ok(PresenterEvent::StepComplete { remaining }) => {
                log::info!("[EVENT] Step complete, {} remaining", remaining);
            }
            Ok(PresenterEvent::EndOfStream) => {
                log::info!("[EVENT] End of stream");
                let _ = eos_tx.try_send(());
            }
            Ok(PresenterEvent::FormatChanged(media_type)) => {
                log::info!(
                    "[EVENT] Format {}x{}",
                    media_type.size.width,
                    media_type.size.height
                );
            }
            Ok(PresenterEvent::Error(e)) => {
                log::error!("[EVENT] Presenter error: {}", e);
            }
            Err(channel::RecvTimeoutError::Timeout) => {}
            Err(channel::RecvTimeoutError::Disconnected) => break,
        }
    }
}
