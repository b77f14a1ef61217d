//! Observer notification channels.
//!
//! Observers call `EventBus::subscribe` and receive a bounded queue of
//! `PipelineEvent`s. Events are emitted from background threads (the opening
//! task, the acquisition loop, and per-frame handoff tasks); receivers must
//! marshal onto their own execution context.
//!
//! Emission never blocks: a subscriber whose queue is full misses that event,
//! and subscribers whose receiver was dropped are pruned.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Mutex, PoisonError};

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    /// A new frame was published. Poll `peek()` for it.
    FrameUpdated,
    Status(String),
    Error(String),
}

pub struct EventBus {
    subscribers: Mutex<Vec<SyncSender<PipelineEvent>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = sync_channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn emit(&self, event: PipelineEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("EventBus: subscriber queue full, dropping {:?}", event);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("status: {}", message);
        self.emit(PipelineEvent::Status(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        log::error!("error: {}", message);
        self.emit(PipelineEvent::Error(message));
    }

    pub fn frame_updated(&self) {
        self.emit(PipelineEvent::FrameUpdated);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_events() {
        let bus = EventBus::new(4);
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.status("started");
        bus.frame_updated();

        for rx in [&a, &b] {
            assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Status("started".into()));
            assert_eq!(rx.try_recv().unwrap(), PipelineEvent::FrameUpdated);
        }
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let bus = EventBus::new(1);
        let rx = bus.subscribe();

        bus.error("first");
        bus.error("second");

        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Error("first".into()));
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = EventBus::new(4);
        let rx = bus.subscribe();
        drop(rx);

        bus.status("anyone there?");
        assert_eq!(bus.subscriber_count(), 0);
    }
}
