// src/status/snapshot.rs

//! Current-state derivation over a point-in-time read of a status log.

use crate::status::event::{State, StatusEvent, Verb};

/// Events of one log, stably sorted by timestamp.
///
/// Events written within the same microsecond keep their file order.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    events: Vec<StatusEvent>,
}

impl StatusSnapshot {
    pub fn new(mut events: Vec<StatusEvent>) -> Self {
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Self { events }
    }

    pub fn events(&self) -> &[StatusEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Most recent event that is not a gate marker.
    pub fn current_event(&self) -> Option<&StatusEvent> {
        self.binding_events().next()
    }

    pub fn current_state(&self) -> Option<&State> {
        self.current_event().map(|e| &e.state)
    }

    /// Whether the `(major, minor)` group currently asserts `verb`.
    ///
    /// For toggle pairs the later of the two verbs wins; any other verb only
    /// needs to appear once.
    pub fn asserts(&self, major: &str, minor: &str, verb: &Verb) -> bool {
        let mut group = self
            .events
            .iter()
            .rev()
            .filter(|e| e.state.major == major && e.state.minor == minor);

        match verb.opposite() {
            Some(opposite) => group
                .find(|e| e.state.verb == *verb || e.state.verb == opposite)
                .is_some_and(|e| e.state.verb == *verb),
            None => group.any(|e| e.state.verb == *verb),
        }
    }

    /// Latest Blocked/Unblocked toggle anywhere in the log is Blocked.
    pub fn is_blocked(&self) -> bool {
        self.latest_toggle(Verb::Blocked, Verb::Unblocked)
    }

    /// Latest Approved/Unapproved toggle anywhere in the log is Approved.
    pub fn is_approved(&self) -> bool {
        self.latest_toggle(Verb::Approved, Verb::Unapproved)
    }

    /// The two most recent binding events, newest first.
    pub fn last_two(&self) -> (Option<&StatusEvent>, Option<&StatusEvent>) {
        let mut it = self.binding_events();
        let last = it.next();
        let previous = it.next();
        (last, previous)
    }

    fn binding_events(&self) -> impl Iterator<Item = &StatusEvent> {
        self.events
            .iter()
            .rev()
            .filter(|e| !e.state.verb.is_non_binding())
    }

    fn latest_toggle(&self, on: Verb, off: Verb) -> bool {
        self.events
            .iter()
            .rev()
            .find(|e| e.state.verb == on || e.state.verb == off)
            .is_some_and(|e| e.state.verb == on)
    }
}
