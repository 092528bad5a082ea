//! # Activity Records
//!
//! An [`ActivityRecord`] wraps one activity with its identifier, its buffered
//! events and its run state. Every submitted activity has exactly one record.
//! The record moves between queues, executors and nodes, but is never in two
//! places at once.
//!
//! ## State Machine
//!
//! ```text
//!  Initializing --run--> Suspended | Runnable | Finishing | Error
//!  Suspended    --event--> Runnable
//!  Runnable     --run--> Suspended | Runnable | Finishing | Error
//!  Finishing    --run--> Done | Error
//!  Done, Error: terminal
//! ```
//!
//! Each `run()` performs exactly one transition and hands at most one event
//! to `process()`. Draining a backlog of events means calling `run()` again
//! for each of them.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, trace, warn};

use constellation_api::{
    Activity, ActivityContext, ActivityError, ActivityIdentifier, Constellation,
    ConstellationError, ConstellationResult, Event, Step,
};

/// Run state of an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Submitted, `initialize()` not called yet.
    Initializing,
    /// Waiting for an event.
    Suspended,
    /// Has at least one buffered event to process.
    Runnable,
    /// Decided to finish, `cleanup()` not called yet.
    Finishing,
    /// Completed normally.
    Done,
    /// Completed with a fault.
    Error,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Error)
    }
}

pub struct ActivityRecord {
    identifier: ActivityIdentifier,
    activity: Box<dyn Activity>,
    events: VecDeque<Event>,
    state: RunState,
    fault: Option<ActivityError>,
    stolen: bool,
}

impl fmt::Debug for ActivityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRecord")
            .field("identifier", &self.identifier)
            .field("kind", &self.activity.kind())
            .field("context", self.activity.context())
            .field("state", &self.state)
            .field("pending_events", &self.events.len())
            .field("stolen", &self.stolen)
            .finish()
    }
}

impl ActivityRecord {
    pub fn new(identifier: ActivityIdentifier, activity: Box<dyn Activity>) -> Self {
        Self {
            identifier,
            activity,
            events: VecDeque::new(),
            state: RunState::Initializing,
            fault: None,
            stolen: false,
        }
    }

    /// Rebuild a record that arrived from another node.
    ///
    /// Only records that never ran migrate, so the state is `Initializing`;
    /// events sent before the steal travel along.
    pub fn restore(
        identifier: ActivityIdentifier,
        activity: Box<dyn Activity>,
        events: Vec<Event>,
    ) -> Self {
        Self {
            identifier,
            activity,
            events: events.into(),
            state: RunState::Initializing,
            fault: None,
            stolen: true,
        }
    }

    pub fn identifier(&self) -> &ActivityIdentifier {
        &self.identifier
    }

    pub fn context(&self) -> &ActivityContext {
        self.activity.context()
    }

    pub fn activity(&self) -> &dyn Activity {
        self.activity.as_ref()
    }

    pub fn activity_mut(&mut self) -> &mut dyn Activity {
        self.activity.as_mut()
    }

    pub fn into_activity(self) -> Box<dyn Activity> {
        self.activity
    }

    pub fn may_be_stolen(&self) -> bool {
        self.activity.may_be_stolen()
    }

    pub fn expects_events(&self) -> bool {
        self.activity.expects_events()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn fault(&self) -> Option<&ActivityError> {
        self.fault.as_ref()
    }

    pub fn is_fresh(&self) -> bool {
        self.state == RunState::Initializing
    }

    pub fn is_runnable(&self) -> bool {
        self.state == RunState::Runnable
    }

    pub fn is_finishing(&self) -> bool {
        self.state == RunState::Finishing
    }

    pub fn is_done(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn is_error(&self) -> bool {
        self.state == RunState::Error
    }

    pub fn is_stolen(&self) -> bool {
        self.stolen
    }

    pub fn set_stolen(&mut self, stolen: bool) {
        self.stolen = stolen;
    }

    /// Buffer an event for `process()`.
    ///
    /// Returns `true` when the record went from `Suspended` to `Runnable`
    /// and must be handed to an executor.
    pub fn enqueue(&mut self, event: Event) -> ConstellationResult<bool> {
        if !self.expects_events() {
            return Err(ConstellationError::IllegalState(format!(
                "activity {} does not expect events",
                self.identifier
            )));
        }
        if self.state.is_terminal() {
            return Err(ConstellationError::IllegalState(format!(
                "activity {} is {:?} and cannot receive events",
                self.identifier, self.state
            )));
        }
        if self.state == RunState::Finishing {
            warn!(activity = %self.identifier, "event delivered to a finishing activity will not be processed");
        }
        self.events.push_back(event);
        if self.state == RunState::Suspended {
            self.state = RunState::Runnable;
            return Ok(true);
        }
        Ok(false)
    }

    /// Number of buffered events.
    pub fn pending_events(&self) -> ConstellationResult<usize> {
        if !self.expects_events() {
            return Err(ConstellationError::IllegalState(format!(
                "activity {} does not expect events",
                self.identifier
            )));
        }
        Ok(self.events.len())
    }

    /// Remove all buffered events, for forwarding or for dropping on
    /// completion.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Perform one state transition.
    pub fn run(&mut self, cx: &mut dyn Constellation) -> ConstellationResult<RunState> {
        let before = self.state;
        match self.state {
            RunState::Initializing => {
                let step = self.activity.initialize(cx);
                self.after_step(step);
            }
            RunState::Runnable => match self.events.pop_front() {
                Some(event) => {
                    let step = self.activity.process(cx, event);
                    self.after_step(step);
                }
                None => {
                    self.state = RunState::Suspended;
                }
            },
            RunState::Finishing => {
                let cleanup = self.activity.cleanup(cx);
                if let Err(fault) = cleanup {
                    self.fault.get_or_insert(fault);
                }
                self.state = if self.fault.is_some() {
                    RunState::Error
                } else {
                    RunState::Done
                };
            }
            RunState::Suspended => {
                return Err(ConstellationError::IllegalState(format!(
                    "activity {} is suspended and has no event to process",
                    self.identifier
                )));
            }
            RunState::Done | RunState::Error => {
                return Err(ConstellationError::IllegalState(format!(
                    "activity {} already completed ({:?})",
                    self.identifier, self.state
                )));
            }
        }
        trace!(activity = %self.identifier, from = ?before, to = ?self.state, "activity transition");
        if self.state == RunState::Error {
            debug!(activity = %self.identifier, fault = ?self.fault, "activity ended in error");
        }
        Ok(self.state)
    }

    fn after_step(&mut self, step: Result<Step, ActivityError>) {
        self.state = match step {
            Ok(Step::Finish) => RunState::Finishing,
            Ok(Step::Suspend) if !self.expects_events() => {
                self.fault = Some(ActivityError::new(
                    "activity suspended although it does not expect events",
                ));
                RunState::Error
            }
            Ok(Step::Suspend) if self.events.is_empty() => RunState::Suspended,
            Ok(Step::Suspend) => RunState::Runnable,
            Err(fault) => {
                // cleanup still runs; the fault decides the terminal state
                self.fault = Some(fault);
                RunState::Finishing
            }
        };
    }
}
