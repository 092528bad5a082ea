use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use constellation_api::{Activity, ActivityIdentifier, Constellation, ConstellationIdentifier, Event};

/// The [`Constellation`] handle given to activity hooks.
///
/// Hooks run while their record is locked, so submissions and events are
/// only buffered here and handed to the node after the hook returns.
/// Identifiers are assigned immediately so hooks can address new activities
/// right away.
pub struct Outbox<'a> {
    identifier: ConstellationIdentifier,
    activity: ActivityIdentifier,
    sequence: &'a AtomicU64,
    submitted: Vec<(ActivityIdentifier, Box<dyn Activity>)>,
    events: Vec<Event>,
}

impl fmt::Debug for Outbox<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox")
            .field("executor", &self.identifier)
            .field("activity", &self.activity)
            .field("submitted", &self.submitted.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl<'a> Outbox<'a> {
    pub fn new(identifier: ConstellationIdentifier, activity: ActivityIdentifier, sequence: &'a AtomicU64) -> Self {
        Self {
            identifier,
            activity,
            sequence,
            submitted: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty() && self.events.is_empty()
    }

    /// Everything the hook produced, in the order it was produced per kind.
    pub fn drain(self) -> (Vec<(ActivityIdentifier, Box<dyn Activity>)>, Vec<Event>) {
        (self.submitted, self.events)
    }
}

impl Constellation for Outbox<'_> {
    fn identifier(&self) -> ConstellationIdentifier {
        self.identifier
    }

    fn activity(&self) -> ActivityIdentifier {
        self.activity
    }

    fn submit(&mut self, activity: Box<dyn Activity>) -> ActivityIdentifier {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let identifier = ActivityIdentifier::new(self.identifier, sequence, activity.expects_events());
        self.submitted.push((identifier, activity));
        identifier
    }

    fn send(&mut self, event: Event) {
        self.events.push(event);
    }
}
