//! Coordinates shared between the gesture thread and the renderer.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use super::coords::{HandlePosition, SessionCoordinates};

/// Live handle positions of the active session.
///
/// Written by the gesture translator during drags and by the controller on
/// session start or revert; read by the renderer every frame. An odd
/// sequence value marks a write in progress: writers claim it before
/// storing, and readers retry instead of seeing a half-written pair.
#[derive(Debug, Default)]
pub struct LiveCoordinates {
    seq: AtomicU64,
    start_minute: AtomicI32,
    start_offset: AtomicI32,
    end_minute: AtomicI32,
    end_offset: AtomicI32,
    editing: AtomicBool,
    committing: AtomicBool,
}

impl LiveCoordinates {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, coords: SessionCoordinates) {
        let claimed = loop {
            let current = self.seq.load(Ordering::Acquire);
            if current % 2 == 0
                && self
                    .seq
                    .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                break current + 1;
            }
            std::hint::spin_loop();
        };
        self.start_minute.store(coords.start.minute, Ordering::Release);
        self.start_offset.store(coords.start.day_offset, Ordering::Release);
        self.end_minute.store(coords.end.minute, Ordering::Release);
        self.end_offset.store(coords.end.day_offset, Ordering::Release);
        self.seq.store(claimed + 1, Ordering::Release);
    }

    /// Consistent copy of both handles.
    pub fn snapshot(&self) -> SessionCoordinates {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let coords = SessionCoordinates {
                start: HandlePosition::new(
                    self.start_minute.load(Ordering::Acquire),
                    self.start_offset.load(Ordering::Acquire),
                ),
                end: HandlePosition::new(
                    self.end_minute.load(Ordering::Acquire),
                    self.end_offset.load(Ordering::Acquire),
                ),
            };
            if self.seq.load(Ordering::Acquire) == before {
                return coords;
            }
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing.load(Ordering::Acquire)
    }

    pub fn set_editing(&self, editing: bool) {
        self.editing.store(editing, Ordering::Release);
    }

    pub fn is_committing(&self) -> bool {
        self.committing.load(Ordering::Acquire)
    }

    /// Claim the committing flag. `None` if a commit is already outstanding.
    ///
    /// The flag is released when the guard drops.
    pub fn try_begin_commit(self: &Arc<Self>) -> Option<CommitGuard> {
        self.committing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CommitGuard {
                live: Arc::clone(self),
            })
    }
}

/// Holds the committing flag for the duration of one commit.
#[derive(Debug)]
pub struct CommitGuard {
    live: Arc<LiveCoordinates>,
}

impl Drop for CommitGuard {
    fn drop(&mut self) {
        self.live.committing.store(false, Ordering::Release);
    }
}
