//! Per-session storage cell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use tokio::sync::{Mutex, MutexGuard};

use crate::{SessionRecord, SessionState};

/// One registry entry: a mutation gate plus the committed snapshot.
///
/// Writers hold `gate` for the whole read-modify-write (including any
/// automation client call in between). Readers never touch the gate; they
/// copy `record`, which is only locked for the duration of a clone or a
/// commit.
#[derive(Debug)]
pub(crate) struct SessionSlot {
    gate: Mutex<()>,
    record: RwLock<SessionRecord>,
    removed: AtomicBool,
    restoring: AtomicBool,
}

impl SessionSlot {
    /// Creates a slot; `restoring` marks a startup re-bind in progress.
    pub(crate) fn new(record: SessionRecord, restoring: bool) -> Self {
        Self {
            gate: Mutex::new(()),
            record: RwLock::new(record),
            removed: AtomicBool::new(false),
            restoring: AtomicBool::new(restoring),
        }
    }

    /// Copies the last committed record.
    pub(crate) fn snapshot(&self) -> SessionRecord {
        self.record
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn state(&self) -> SessionState {
        self.record.read().unwrap_or_else(|e| e.into_inner()).state
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    pub(crate) fn is_restoring(&self) -> bool {
        self.restoring.load(Ordering::Acquire)
    }

    /// Ends the startup re-bind; from now on the session onboards normally.
    pub(crate) fn finish_restoring(&self) {
        self.restoring.store(false, Ordering::Release);
    }

    /// Returns `true` if this session occupies the single onboarding slot.
    pub(crate) fn holds_onboarding(&self) -> bool {
        self.state().is_onboarding() && !self.is_restoring()
    }

    /// Waits for exclusive mutation rights.
    pub(crate) async fn lock(&self) -> SlotGuard<'_> {
        SlotGuard {
            slot: self,
            _gate: self.gate.lock().await,
        }
    }

    /// Takes mutation rights only if no writer holds them.
    pub(crate) fn try_lock(&self) -> Option<SlotGuard<'_>> {
        self.gate.try_lock().ok().map(|gate| SlotGuard {
            slot: self,
            _gate: gate,
        })
    }
}

/// Exclusive mutation rights over one slot.
pub(crate) struct SlotGuard<'a> {
    slot: &'a SessionSlot,
    _gate: MutexGuard<'a, ()>,
}

impl SlotGuard<'_> {
    pub(crate) fn record(&self) -> SessionRecord {
        self.slot.snapshot()
    }

    pub(crate) fn state(&self) -> SessionState {
        self.slot.state()
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.slot.is_removed()
    }

    /// Replaces the committed record in one write.
    pub(crate) fn commit(&mut self, record: SessionRecord) {
        *self.slot.record.write().unwrap_or_else(|e| e.into_inner()) = record;
    }

    pub(crate) fn mark_removed(&self) {
        self.slot.mark_removed();
    }
}
