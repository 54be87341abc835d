//! Pipeline event sink
//!
//! The presenter never talks to a UI. Everything a host may want to react to
//! (frames shown, frames skipped, step completion, end of stream, fatal
//! errors) is published on a bounded [`EventBus`]. Publishing never blocks
//! the presenter: when subscribers fall behind and the bus is full, per-frame
//! events are discarded. `EndOfStream` and `Error` have a reserved overflow
//! allowance so slow subscribers still see them.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{Receiver, Sender, TrySendError};

use crate::error::PresenterError;
use crate::types::{MediaTime, MediaType, SampleToken};

/// Events published by the presenter
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterEvent {
    /// A frame was handed to the display backend
    FramePresented {
        token: SampleToken,
        time: Option<MediaTime>,
    },
    /// A frame missed its slot by more than the late threshold and was skipped
    FrameDropped {
        token: SampleToken,
        time: Option<MediaTime>,
    },
    /// One requested frame step finished
    StepComplete { remaining: u32 },
    /// All input of the current segment has been presented
    EndOfStream,
    /// A new output format was negotiated
    FormatChanged(MediaType),
    /// Presentation cannot continue
    Error(PresenterError),
}

impl PresenterEvent {
    /// Events that may use the reserved overflow allowance
    pub fn is_critical(&self) -> bool {
        matches!(self, PresenterEvent::EndOfStream | PresenterEvent::Error(_))
    }
}

/// Slots beyond the configured capacity kept for critical events
const CRITICAL_RESERVE: usize = 16;

/// Bounded broadcast channel for presenter events
pub struct EventBus {
    sender: Sender<PresenterEvent>,
    receiver: Receiver<PresenterEvent>,
    capacity: usize,
    /// Set while events are being discarded; the warning is logged once per overflow
    overflowing: AtomicBool,
}

impl EventBus {
    /// Create a new event bus with bounded capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam::channel::bounded(capacity + CRITICAL_RESERVE);
        Self {
            sender,
            receiver,
            capacity,
            overflowing: AtomicBool::new(false),
        }
    }

    /// Get a sender for publishing events
    pub fn sender(&self) -> Sender<PresenterEvent> {
        self.sender.clone()
    }

    /// Get a receiver for subscribing to events
    ///
    /// Receivers share one queue: each event is delivered to exactly one of
    /// them.
    pub fn subscribe(&self) -> Receiver<PresenterEvent> {
        self.receiver.clone()
    }

    /// Publish without blocking; returns `false` if the event was discarded
    pub fn publish(&self, event: PresenterEvent) -> bool {
        if !event.is_critical() && self.sender.len() >= self.capacity {
            self.discard(&event);
            return false;
        }
        match self.sender.try_send(event) {
            Ok(()) => {
                self.overflowing.store(false, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(event)) => {
                self.discard(&event);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn discard(&self, event: &PresenterEvent) {
        if event.is_critical() {
            log::error!("[PRESENTER] Event bus overflow, discarding {:?}", event);
        } else if !self.overflowing.swap(true, Ordering::Relaxed) {
            log::warn!("[PRESENTER] Event bus full, discarding events until subscribers catch up");
        }
    }

    /// Events currently waiting for a subscriber
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();

        assert!(bus.publish(PresenterEvent::StepComplete { remaining: 2 }));

        match rx.recv().unwrap() {
            PresenterEvent::StepComplete { remaining } => assert_eq!(remaining, 2),
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_full_bus_discards_without_blocking() {
        let bus = EventBus::new(1);
        assert!(bus.publish(PresenterEvent::StepComplete { remaining: 1 }));
        assert!(!bus.publish(PresenterEvent::StepComplete { remaining: 0 }));
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_critical_events_survive_full_bus() {
        let bus = EventBus::new(2);
        let rx = bus.subscribe();
        for i in 0..10 {
            bus.publish(PresenterEvent::FramePresented {
                token: SampleToken(i),
                time: None,
            });
        }
        assert_eq!(bus.len(), 2);

        assert!(bus.publish(PresenterEvent::Error(PresenterError::NoMediaType)));
        assert!(bus.publish(PresenterEvent::EndOfStream));

        let events: Vec<PresenterEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 4);
        assert_eq!(events[2], PresenterEvent::Error(PresenterError::NoMediaType));
        assert_eq!(events[3], PresenterEvent::EndOfStream);
    }

    #[test]
    fn test_critical_reserve_is_bounded() {
        let bus = EventBus::new(1);
        let accepted = (0..CRITICAL_RESERVE + 5)
            .filter(|_| bus.publish(PresenterEvent::EndOfStream))
            .count();
        assert_eq!(accepted, 1 + CRITICAL_RESERVE);
    }
}
