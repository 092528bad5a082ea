//! # Activities
//!
//! An activity is a suspendable unit of work expressed as three hooks:
//!
//! 1. `initialize` runs once, when an executor first picks the activity up.
//! 2. `process` runs once per delivered event, in delivery order.
//! 3. `cleanup` runs once, after the activity decided to finish.
//!
//! `initialize` and `process` return a [`Step`]: `Suspend` releases the
//! executor until the next event arrives, `Finish` moves on to `cleanup`.
//! Suspension is logical; no thread blocks while an activity waits.
//!
//! Hooks talk to the scheduler through a [`Constellation`] handle. Work
//! submitted and events sent through it are buffered and dispatched after the
//! hook returns.
//!
//! Activities migrate between nodes when stolen, so they must be able to
//! encode their state; the receiving node rebuilds them from a factory
//! registered under [`Activity::kind`].

use downcast_rs::{impl_downcast, Downcast};

use crate::context::ActivityContext;
use crate::errors::{ActivityError, ConstellationResult};
use crate::event::Event;
use crate::identifier::{ActivityIdentifier, ConstellationIdentifier};

/// What an activity wants to happen after a hook returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Wait for the next event.
    Suspend,
    /// Run `cleanup` and complete.
    Finish,
}

/// Scheduler handle available to activity hooks.
pub trait Constellation {
    /// The executor running the hook.
    fn identifier(&self) -> ConstellationIdentifier;

    /// The activity whose hook is running.
    fn activity(&self) -> ActivityIdentifier;

    /// Submit a new activity; its identifier is available immediately.
    fn submit(&mut self, activity: Box<dyn Activity>) -> ActivityIdentifier;

    /// Send an event to another (or the same) activity.
    fn send(&mut self, event: Event);
}

/// A unit of work the scheduler can run, suspend, resume and migrate.
pub trait Activity: Downcast + Send {
    /// Key under which the activity's factory is registered.
    fn kind(&self) -> &'static str;

    /// Which executors may run this activity.
    fn context(&self) -> &ActivityContext;

    /// Whether other executors and nodes may take this activity.
    fn may_be_stolen(&self) -> bool {
        true
    }

    /// Whether the activity receives events. Events sent to an activity that
    /// does not expect them are a usage error.
    fn expects_events(&self) -> bool {
        false
    }

    fn initialize(&mut self, cx: &mut dyn Constellation) -> Result<Step, ActivityError>;

    fn process(&mut self, _cx: &mut dyn Constellation, event: Event) -> Result<Step, ActivityError> {
        Err(ActivityError(format!("unexpected event from {}", event.source)))
    }

    fn cleanup(&mut self, _cx: &mut dyn Constellation) -> Result<(), ActivityError> {
        Ok(())
    }

    /// Serialize the activity state for migration to another node.
    fn encode(&self) -> ConstellationResult<Vec<u8>>;
}

impl_downcast!(Activity);

impl std::fmt::Debug for dyn Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activity")
            .field("kind", &self.kind())
            .field("context", self.context())
            .field("may_be_stolen", &self.may_be_stolen())
            .field("expects_events", &self.expects_events())
            .finish()
    }
}
