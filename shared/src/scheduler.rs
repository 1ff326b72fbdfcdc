//! Tick-scheduled input replay
//!
//! Input is never applied the moment it happens. It is wrapped in an
//! [`Action`] due a few ticks ([`crate::LOOKAHEAD`]) in the future, giving the
//! network time to deliver the remote copy so that both nodes apply it on the
//! same logical tick.
//!
//! The pending set is written from the receive context and drained from the
//! tick loop. Dispatch always happens outside the lock, so a dispatcher may
//! schedule further actions.
//!
//! Actions due on the same tick are dispatched in unspecified order; domain
//! dispatchers must not depend on it.

use crate::entity::EntityId;
use crate::error::DesyncWarning;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One input event bound to the tick it must be applied on
///
/// A positive `command` is a key press, its negation the matching release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub actor: EntityId,
    pub command: i32,
    pub due_tick: u64,
}

impl Action {
    pub fn new(actor: EntityId, command: i32, due_tick: u64) -> Self {
        Self {
            actor,
            command,
            due_tick,
        }
    }
}

/// Outcome of one [`ActionScheduler::tick`] call
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub applied: usize,
    pub discarded: usize,
    pub desyncs: Vec<DesyncWarning>,
}

/// Holds pending actions until their tick comes up
#[derive(Debug, Default)]
pub struct ActionScheduler {
    pending: Mutex<Vec<Action>>,
    discard: AtomicBool,
    /// One past the last tick processed; anything due earlier is late
    horizon: AtomicU64,
}

impl ActionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an action to the pending set
    ///
    /// An action due on a tick that has already been processed can never be
    /// applied; it is dropped and reported instead.
    pub fn schedule(&self, action: Action) -> Result<(), DesyncWarning> {
        let mut pending = self.pending.lock();
        let horizon = self.horizon.load(Ordering::Acquire);
        if action.due_tick < horizon {
            let warning = DesyncWarning {
                action,
                now: horizon.saturating_sub(1),
            };
            warn!("Rejected late action: {}", warning);
            return Err(warning);
        }
        pending.push(action);
        Ok(())
    }

    /// Requests that every pending action be dropped
    ///
    /// Takes effect at the start of the next [`ActionScheduler::tick`], which
    /// then applies nothing.
    pub fn clear(&self) {
        self.discard.store(true, Ordering::Release);
    }

    /// Releases the actions due at `now` to `dispatch`
    ///
    /// Overdue actions are removed without being applied and reported as
    /// desyncs. Future actions stay pending.
    pub fn tick(&self, now: u64, mut dispatch: impl FnMut(Action)) -> TickReport {
        let mut report = TickReport::default();

        let due = {
            let mut pending = self.pending.lock();
            self.horizon.fetch_max(now.saturating_add(1), Ordering::AcqRel);

            if self.discard.swap(false, Ordering::AcqRel) {
                report.discarded = pending.len();
                pending.clear();
                debug!("Discarded {} pending actions at tick {}", report.discarded, now);
                return report;
            }

            let mut due = Vec::new();
            pending.retain(|action| {
                if action.due_tick > now {
                    return true;
                }
                if action.due_tick == now {
                    due.push(*action);
                } else {
                    report.desyncs.push(DesyncWarning {
                        action: *action,
                        now,
                    });
                }
                false
            });
            due
        };

        for warning in &report.desyncs {
            warn!("Desync: {}", warning);
        }

        report.applied = due.len();
        for action in due {
            dispatch(action);
        }
        report
    }

    /// Copies out the actions that will still be applied, e.g. for a snapshot
    ///
    /// Empty while a [`ActionScheduler::clear`] is waiting for the next tick.
    pub fn pending(&self) -> Vec<Action> {
        let pending = self.pending.lock();
        if self.discard.load(Ordering::Acquire) {
            return Vec::new();
        }
        pending.clone()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Resets the scheduler to a restored clock and pending set
    ///
    /// Used when bootstrapping from a snapshot: `now` is the next tick the
    /// restored simulation will process.
    pub fn restore(&self, now: u64, actions: Vec<Action>) {
        let mut pending = self.pending.lock();
        self.discard.store(false, Ordering::Release);
        self.horizon.store(now, Ordering::Release);
        *pending = actions;
        pending.retain(|action| action.due_tick >= now);
    }
}
