//! In-flight save guard
//!
//! At most one save per form may be in flight. A second submit while the
//! first is pending is ignored, and an in-flight save can be cancelled: its
//! result, if the store still answers, is discarded.

use std::cell::Cell;

use tracing::debug;

use crate::error::{Error, Result};

/// What happened to a guarded save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome<T> {
    /// The write completed and its result was applied
    Saved(T),
    /// Another save for the same form was already in flight
    Ignored,
    /// The user cancelled before the result was applied
    Cancelled,
}

impl<T> SaveOutcome<T> {
    pub fn saved(self) -> Option<T> {
        match self {
            SaveOutcome::Saved(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }
}

/// Guard over one form's saves
#[derive(Debug)]
pub struct SaveGuard {
    name: &'static str,
    in_flight: Cell<bool>,
    cancelled: Cell<bool>,
}

impl SaveGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            in_flight: Cell::new(false),
            cancelled: Cell::new(false),
        }
    }

    /// Claim the guard, or `None` if a save is already in flight
    pub fn try_begin(&self) -> Option<SaveTicket<'_>> {
        if self.in_flight.replace(true) {
            debug!("{} save already in flight, ignoring submit", self.name);
            return None;
        }
        self.cancelled.set(false);
        Some(SaveTicket { guard: self })
    }

    /// Cancel the in-flight save; returns false when nothing is in flight
    pub fn cancel(&self) -> bool {
        if !self.in_flight.get() {
            return false;
        }
        debug!("{} save cancelled", self.name);
        self.cancelled.set(true);
        true
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.get()
    }
}

/// Held for the duration of one save; releasing it re-enables the form
#[derive(Debug)]
pub struct SaveTicket<'g> {
    guard: &'g SaveGuard,
}

impl SaveTicket<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.guard.cancelled.get()
    }

    /// `Err(Cancelled)` if the user cancelled since the save began
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Drop for SaveTicket<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.set(false);
        self.guard.cancelled.set(false);
    }
}
