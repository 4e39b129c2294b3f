//! Cooperative timer wheel serviced by the supervisor event loop.
//!
//! Entries are armed with a relative delay and collected once due; the
//! owning loop sleeps until [`Utimer::next_deadline`] and then drains
//! [`Utimer::take_due`]. Nothing here spawns threads or blocks.

use std::time::{Duration, Instant};

#[derive(Debug)]
struct UtimerEntry<T> {
    fire_at: Instant,
    item: T,
}

/// Cooperative delay queue.
#[derive(Debug)]
pub struct Utimer<T> {
    entries: Vec<UtimerEntry<T>>,
}

impl<T> Utimer<T> {
    /// Creates an empty wheel.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Arms an entry to fire after `delay`.
    pub fn add(&mut self, delay: Duration, item: T) {
        self.entries.push(UtimerEntry {
            fire_at: Instant::now() + delay,
            item,
        });
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| entry.fire_at).min()
    }

    /// Removes and returns every entry due at `now`, preserving arming
    /// order among entries that are due together.
    pub fn take_due(&mut self, now: Instant) -> Vec<T> {
        let mut due = Vec::new();
        let mut pending = Vec::new();
        for entry in self.entries.drain(..) {
            if entry.fire_at <= now {
                due.push(entry.item);
            } else {
                pending.push(entry);
            }
        }
        self.entries = pending;
        due
    }

    /// Drops every pending entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Utimer<T> {
    fn default() -> Self {
        Self::new()
    }
}
