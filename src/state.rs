use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use ts_rs::TS;

/// Where the UI-facing recipe selection currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
#[ts(export)]
pub enum SelectionState {
    Idle,
    Loading {
        #[ts(type = "number")]
        recipe_id: i64,
        #[ts(type = "number")]
        generation: u64,
    },
    Ready {
        #[ts(type = "number")]
        recipe_id: i64,
    },
    Error {
        #[ts(type = "number")]
        recipe_id: i64,
        reason: String,
    },
}

/// Proof that a selection was started. Only the ticket of the newest
/// selection may publish its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionTicket {
    pub recipe_id: i64,
    pub generation: u64,
}

#[derive(Debug)]
struct Selection {
    generation: u64,
    state: SelectionState,
}

/// Orders concurrent recipe selections so that a slow load finishing after a
/// newer one has started is dropped instead of overwriting it.
#[derive(Debug)]
pub struct SelectionTracker {
    inner: Mutex<Selection>,
}

impl Default for SelectionTracker {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Selection {
                generation: 0,
                state: SelectionState::Idle,
            }),
        }
    }
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, recipe_id: i64) -> SelectionTicket {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.generation += 1;
        let generation = inner.generation;
        inner.state = SelectionState::Loading {
            recipe_id,
            generation,
        };
        SelectionTicket {
            recipe_id,
            generation,
        }
    }

    /// Record the outcome of `ticket`'s load.
    ///
    /// `publish` runs under the tracker lock and only when the ticket is still
    /// current, so the caller's side effects (filling the cache) can never
    /// interleave with a newer selection's. Returns `None` for a stale ticket.
    pub fn complete<R>(
        &self,
        ticket: &SelectionTicket,
        failure: Option<String>,
        publish: impl FnOnce() -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.generation != ticket.generation {
            return None;
        }
        inner.state = match failure {
            None => SelectionState::Ready {
                recipe_id: ticket.recipe_id,
            },
            Some(reason) => SelectionState::Error {
                recipe_id: ticket.recipe_id,
                reason,
            },
        };
        Some(publish())
    }

    /// Invalidate any selection in flight and return to idle.
    ///
    /// `on_reset` runs under the tracker lock after the generation moves on,
    /// so no selection that started earlier can publish after it.
    pub fn reset<R>(&self, on_reset: impl FnOnce() -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.generation += 1;
        inner.state = SelectionState::Idle;
        on_reset()
    }

    pub fn state(&self) -> SelectionState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state.clone()
    }
}

/// Held for the duration of a database import. At most one exists per flag.
pub struct ImportGuard {
    flag: Arc<AtomicBool>,
}

impl ImportGuard {
    pub fn try_begin(flag: Arc<AtomicBool>) -> Option<Self> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        Some(Self { flag })
    }
}

impl Drop for ImportGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
