//! Per-field lock state with optimistic transitions.
//!
//! A toggle moves the field to its new state immediately and marks it
//! pending. The returned [`LockTransition`] remembers the state before the
//! toggle so a failed save restores exactly that, regardless of what else
//! changed in the meantime.

use crate::cases::record::LockedFields;
use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked,
}

impl LockState {
    pub fn toggled(self) -> Self {
        match self {
            Self::Unlocked => Self::Locked,
            Self::Locked => Self::Unlocked,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::Locked => "locked",
        }
    }
}

/// An in-flight toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a lock transition must be committed or rolled back"]
pub struct LockTransition {
    pub field: String,
    pub previous: LockState,
    pub next: LockState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockManager {
    locked: LockedFields,
    pending: LockedFields,
}

impl LockManager {
    pub fn new(locked: LockedFields) -> Self {
        Self {
            locked,
            pending: LockedFields::new(),
        }
    }

    /// Re-seed from a freshly loaded record. In-flight markers are dropped.
    pub fn reset(&mut self, locked: LockedFields) {
        *self = Self::new(locked);
    }

    pub fn locked_fields(&self) -> &LockedFields {
        &self.locked
    }

    pub fn is_locked(&self, field: &str) -> bool {
        self.locked.contains(field)
    }

    pub fn is_pending(&self, field: &str) -> bool {
        self.pending.contains(field)
    }

    pub fn state(&self, field: &str) -> LockState {
        if self.is_locked(field) {
            LockState::Locked
        } else {
            LockState::Unlocked
        }
    }

    /// Flip `field` optimistically and mark it pending.
    pub fn begin_toggle(&mut self, field: &str) -> Result<LockTransition, ReconcileError> {
        if self.is_pending(field) {
            return Err(ReconcileError::LockPending(field.to_string()));
        }
        let previous = self.state(field);
        let next = previous.toggled();
        self.set(field, next);
        self.pending.insert(field.to_string());
        Ok(LockTransition {
            field: field.to_string(),
            previous,
            next,
        })
    }

    /// Keep the optimistic state.
    pub fn commit(&mut self, transition: &LockTransition) {
        self.pending.remove(&transition.field);
    }

    /// Restore the state captured before the toggle.
    pub fn rollback(&mut self, transition: &LockTransition) {
        self.set(&transition.field, transition.previous);
        self.pending.remove(&transition.field);
    }

    fn set(&mut self, field: &str, state: LockState) {
        match state {
            LockState::Locked => {
                self.locked.insert(field.to_string());
            }
            LockState::Unlocked => {
                self.locked.remove(field);
            }
        }
    }
}
