//! Scheduler timer thread
//!
//! A single-shot timer: the presenter arms it with a delay and the
//! scheduler generation that delay was computed under. When it expires the
//! thread calls `on_fire(generation)`; re-arming replaces the pending
//! wake-up, disarming drops it.

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{PresenterError, PresenterResult};

enum WorkerCommand {
    Arm { generation: u64, after: Duration },
    Disarm,
    Shutdown,
}

/// Handle to the scheduler timer thread
pub struct SchedulerWorker {
    command_tx: Sender<WorkerCommand>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl SchedulerWorker {
    /// Spawn the timer thread
    ///
    /// `on_fire` runs on the timer thread with no presenter lock held.
    pub fn spawn<F>(on_fire: F) -> PresenterResult<Self>
    where
        F: Fn(u64) + Send + 'static,
    {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();

        let handle = thread::Builder::new()
            .name("lumen-scheduler".into())
            .spawn(move || run(command_rx, on_fire))
            .map_err(|e| PresenterError::Worker(format!("Failed to spawn scheduler thread: {}", e)))?;

        log::debug!("[SCHED] Worker thread started");
        Ok(Self {
            command_tx,
            thread_handle: Some(handle),
        })
    }

    /// Fire once after `after`, tagged with `generation`
    pub fn arm(&self, generation: u64, after: Duration) {
        let _ = self.command_tx.send(WorkerCommand::Arm { generation, after });
    }

    pub fn disarm(&self) {
        let _ = self.command_tx.send(WorkerCommand::Disarm);
    }

    /// Stop the thread and wait for it to exit
    ///
    /// When called from the timer thread itself (a fire callback that ends in
    /// shutdown) the thread is detached instead of joined.
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("[SCHED] Worker thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for SchedulerWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<F>(command_rx: Receiver<WorkerCommand>, on_fire: F)
where
    F: Fn(u64),
{
    let mut armed: Option<(u64, Instant)> = None;

    loop {
        let command = match armed {
            Some((_, deadline)) => command_rx.recv_deadline(deadline),
            None => command_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match command {
            Ok(WorkerCommand::Arm { generation, after }) => {
                armed = Some((generation, Instant::now() + after));
            }
            Ok(WorkerCommand::Disarm) => armed = None,
            Ok(WorkerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if let Some((generation, _)) = armed.take() {
                    log::trace!("[SCHED] Wake-up fired (generation {})", generation);
                    on_fire(generation);
                }
            }
        }
    }

    log::debug!("[SCHED] Worker thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_with_generation() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let worker = SchedulerWorker::spawn(move |g| {
            let _ = tx.send(g);
        })
        .unwrap();

        worker.arm(7, Duration::from_millis(10));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(7));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_rearm_replaces_pending_wakeup() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let worker = SchedulerWorker::spawn(move |g| {
            let _ = tx.send(g);
        })
        .unwrap();

        worker.arm(1, Duration::from_millis(200));
        worker.arm(2, Duration::from_millis(5));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(2));
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_disarm_cancels() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let worker = SchedulerWorker::spawn(move |g| {
            let _ = tx.send(g);
        })
        .unwrap();

        worker.arm(3, Duration::from_millis(30));
        worker.disarm();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_shutdown_joins() {
        let mut worker = SchedulerWorker::spawn(|_| {}).unwrap();
        assert!(worker.is_running());
        worker.shutdown();
        assert!(!worker.is_running());
    }
}
