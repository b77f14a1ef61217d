//! Single-slot publication of the most recent annotated frame.
//!
//! One writer (the detection handoff) replaces the slot while any number of
//! readers copy it out. Both sides go through an `RwLock`, so a reader either
//! sees the previous frame or the new one, never a partial replacement. The
//! replaced frame is dropped after the write lock is released.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::frame::Frame;

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    epoch: u64,
    published: u64,
}

#[derive(Default)]
pub struct LatestFramePublisher {
    slot: RwLock<Slot>,
}

impl LatestFramePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the slot half-written:
    // every mutation is a single field assignment.
    fn read(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the published frame.
    pub fn publish(&self, frame: Frame) {
        let previous = {
            let mut slot = self.write();
            slot.published = slot.published.wrapping_add(1);
            slot.frame.replace(frame)
        };
        drop(previous);
    }

    /// Replace the published frame only if no `clear` happened since `epoch`
    /// was observed. Returns whether the frame was published.
    pub fn publish_in_epoch(&self, epoch: u64, frame: Frame) -> bool {
        let previous = {
            let mut slot = self.write();
            if slot.epoch != epoch {
                return false;
            }
            slot.published = slot.published.wrapping_add(1);
            slot.frame.replace(frame)
        };
        drop(previous);
        true
    }

    /// Copy of the current frame, if any.
    pub fn peek(&self) -> Option<Frame> {
        self.read().frame.clone()
    }

    /// Borrow the current frame for the duration of the read lock.
    pub fn with_latest<R>(&self, f: impl FnOnce(&Frame) -> R) -> Option<R> {
        self.read().frame.as_ref().map(f)
    }

    /// Release the current frame and start a new epoch.
    pub fn clear(&self) {
        let previous = {
            let mut slot = self.write();
            slot.epoch = slot.epoch.wrapping_add(1);
            slot.frame.take()
        };
        drop(previous);
    }

    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    /// Total number of successful publications.
    pub fn published_count(&self) -> u64 {
        self.read().published
    }

    pub fn is_empty(&self) -> bool {
        self.read().frame.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn peek_is_none_until_published() {
        let publisher = LatestFramePublisher::new();
        assert!(publisher.peek().is_none());

        publisher.publish(Frame::filled(4, 3, [1, 2, 3]));
        let frame = publisher.peek().expect("published frame");
        assert_eq!((frame.width(), frame.height()), (4, 3));
    }

    #[test]
    fn clear_empties_slot_and_bumps_epoch() {
        let publisher = LatestFramePublisher::new();
        publisher.publish(Frame::filled(2, 2, [0, 0, 0]));
        let epoch = publisher.epoch();

        publisher.clear();

        assert!(publisher.peek().is_none());
        assert_eq!(publisher.epoch(), epoch + 1);
        assert!(!publisher.publish_in_epoch(epoch, Frame::filled(2, 2, [0, 0, 0])));
        assert!(publisher.is_empty());
        assert!(publisher.publish_in_epoch(epoch + 1, Frame::filled(2, 2, [0, 0, 0])));
        assert!(!publisher.is_empty());
    }

    #[test]
    fn concurrent_readers_never_observe_torn_frames() {
        // Each published frame is solid-filled with a value derived from its
        // dimensions, so any mix of two frames is detectable.
        fn frame_for(i: u32) -> Frame {
            let w = 8 + (i % 7);
            let h = 4 + (i % 5);
            Frame::filled(w, h, [(w * 3) as u8, (h * 5) as u8, ((w + h) % 251) as u8])
        }

        let publisher = Arc::new(LatestFramePublisher::new());
        let mut handles = Vec::new();

        for t in 0..100u32 {
            let publisher = Arc::clone(&publisher);
            handles.push(thread::spawn(move || {
                for i in 0..50u32 {
                    if (t + i) % 2 == 0 {
                        publisher.publish(frame_for(t * 50 + i));
                    } else if let Some(frame) = publisher.peek() {
                        let (w, h) = (frame.width(), frame.height());
                        assert!((8..15).contains(&w));
                        assert!((4..9).contains(&h));
                        assert_eq!(frame.pixels().len(), (w * h * 3) as usize);
                        let expected = [(w * 3) as u8, (h * 5) as u8, ((w + h) % 251) as u8];
                        assert!(frame.image().pixels().all(|p| p.0 == expected));
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().expect("reader/writer thread panicked");
        }
        assert!(publisher.published_count() > 0);
    }
}
