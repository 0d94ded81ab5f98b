//! Per-key write-back state machine.
//!
//! ```text
//! Idle ──request──▶ Scheduled{ticket} ──quiet window──▶ Flushing{rerun} ──finish──▶ Idle
//!                        │ request: coalesced                │ request: rerun = true
//!                                                            └─finish with rerun──▶ Scheduled{new ticket}
//! ```
//!
//! A delayed flush only runs if its ticket is still current, so a manual flush or an
//! invalidation quietly supersedes it. Keys are independent: one key's flush never
//! waits for another's.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::ignore_poison::IgnorePoison;
use crate::library::CacheKey;
use crate::sync::errors::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    Idle,
    /// A flush will run once the quiet window elapses.
    Scheduled,
    Flushing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Persisted { attempts: u32, version_tag: String },
    /// Nothing unsaved.
    Clean,
    /// The key is no longer cached, or a newer flush took over.
    Skipped,
    /// A flush of this key is already running; another one follows it.
    AlreadyFlushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushState {
    Scheduled { ticket: u64 },
    Flushing { rerun: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Begin {
    Started,
    Superseded,
    AlreadyFlushing,
}

#[derive(Debug, Default)]
struct SchedulerState {
    /// Absent means idle.
    keys: HashMap<CacheKey, FlushState>,
    next_ticket: u64,
    last: HashMap<CacheKey, Result<FlushOutcome, SyncError>>,
}

impl SchedulerState {
    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }
}

#[derive(Debug, Default)]
pub(crate) struct FlushScheduler {
    state: Mutex<SchedulerState>,
}

impl FlushScheduler {
    /// Asks for a flush after the quiet window. Returns a ticket when the caller must
    /// start the delayed flush; `None` when one is already pending.
    pub fn request(&self, key: &CacheKey) -> Option<u64> {
        let mut state = self.state.lock_ignore_poison();
        match state.keys.get(key).copied() {
            None => {
                let ticket = state.issue_ticket();
                state.keys.insert(key.clone(), FlushState::Scheduled { ticket });
                Some(ticket)
            }
            Some(FlushState::Scheduled { .. }) => None,
            Some(FlushState::Flushing { .. }) => {
                state.keys.insert(key.clone(), FlushState::Flushing { rerun: true });
                None
            }
        }
    }

    /// Moves the key to flushing. `ticket` is `Some` for a delayed flush and `None`
    /// for a manual one, which takes over any pending schedule.
    pub fn begin(&self, key: &CacheKey, ticket: Option<u64>) -> Begin {
        let mut state = self.state.lock_ignore_poison();
        let current = state.keys.get(key).copied();
        let begin = match (current, ticket) {
            (Some(FlushState::Scheduled { ticket: pending }), Some(ticket)) if pending == ticket => Begin::Started,
            (_, Some(_)) => Begin::Superseded,
            (Some(FlushState::Flushing { .. }), None) => Begin::AlreadyFlushing,
            (None | Some(FlushState::Scheduled { .. }), None) => Begin::Started,
        };
        match begin {
            Begin::Started => {
                state.keys.insert(key.clone(), FlushState::Flushing { rerun: false });
            }
            Begin::AlreadyFlushing => {
                state.keys.insert(key.clone(), FlushState::Flushing { rerun: true });
            }
            Begin::Superseded => {}
        }
        begin
    }

    /// Records the outcome and leaves the flushing state. Returns a new ticket if
    /// more mutations arrived meanwhile and another delayed flush must start.
    pub fn finish(&self, key: &CacheKey, outcome: Result<FlushOutcome, SyncError>) -> Option<u64> {
        let mut state = self.state.lock_ignore_poison();
        state.last.insert(key.clone(), outcome);
        match state.keys.remove(key) {
            Some(FlushState::Flushing { rerun: true }) => {
                let ticket = state.issue_ticket();
                state.keys.insert(key.clone(), FlushState::Scheduled { ticket });
                Some(ticket)
            }
            _ => None,
        }
    }

    /// Drops a pending schedule that can't be started.
    pub fn cancel(&self, key: &CacheKey, ticket: u64) {
        let mut state = self.state.lock_ignore_poison();
        if state.keys.get(key) == Some(&FlushState::Scheduled { ticket }) {
            state.keys.remove(key);
        }
    }

    pub fn status(&self, key: &CacheKey) -> FlushStatus {
        match self.state.lock_ignore_poison().keys.get(key) {
            None => FlushStatus::Idle,
            Some(FlushState::Scheduled { .. }) => FlushStatus::Scheduled,
            Some(FlushState::Flushing { .. }) => FlushStatus::Flushing,
        }
    }

    pub fn last_flush(&self, key: &CacheKey) -> Option<Result<FlushOutcome, SyncError>> {
        self.state.lock_ignore_poison().last.get(key).cloned()
    }
}
