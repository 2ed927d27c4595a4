//! System event triggers.
//!
//! Callbacks registered against a `(phase, event)` pair and fired by the
//! reactor when the event happens. Each trigger runs at most once.

use std::error::Error as StdError;
use std::fmt;

use futures_util::future::BoxFuture;

/// When, relative to an event, a trigger runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    During,
    After,
}

impl Phase {
    /// Firing order.
    pub const ORDER: [Phase; 3] = [Phase::Before, Phase::During, Phase::After];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Before => write!(f, "before"),
            Phase::During => write!(f, "during"),
            Phase::After => write!(f, "after"),
        }
    }
}

/// Reactor-level events triggers can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEvent {
    Startup,
    Shutdown,
}

impl fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemEvent::Startup => write!(f, "startup"),
            SystemEvent::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Result of running a trigger.
pub type TriggerResult = Result<(), Box<dyn StdError + Send + Sync>>;

/// A one-shot callback producing the future to await.
pub type Trigger = Box<dyn FnOnce() -> BoxFuture<'static, TriggerResult> + Send>;

/// Handle returned on registration, usable for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerId(u64);

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger-{}", self.0)
    }
}

struct Entry {
    id: TriggerId,
    phase: Phase,
    event: SystemEvent,
    trigger: Trigger,
}

/// Registered triggers, kept in registration order.
#[derive(Default)]
pub struct TriggerTable {
    next_id: u64,
    entries: Vec<Entry>,
}

impl TriggerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, phase: Phase, event: SystemEvent, trigger: Trigger) -> TriggerId {
        self.next_id += 1;
        let id = TriggerId(self.next_id);
        self.entries.push(Entry {
            id,
            phase,
            event,
            trigger,
        });
        id
    }

    /// Remove a trigger that has not fired yet.
    pub fn remove(&mut self, id: TriggerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Take every trigger registered for `(phase, event)`, in registration order.
    pub fn take(&mut self, phase: Phase, event: SystemEvent) -> Vec<(TriggerId, Trigger)> {
        let (taken, kept): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.phase == phase && entry.event == event);
        self.entries = kept;
        taken.into_iter().map(|entry| (entry.id, entry.trigger)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for TriggerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|entry| (entry.id, entry.phase, entry.event)),
            )
            .finish()
    }
}
