//! # Constellation Node
//!
//! `ConstellationNode` is one process's share of the cluster: its executors,
//! their queues, the orphan queue and the pool coordinator. It places
//! submitted activities, runs them, routes events to wherever their target
//! currently lives and answers steal requests from other nodes.
//!
//! ## Key Concepts
//! - Directory: where every activity known to this node is (queued, live,
//!   or relocated to another node) plus events parked for queued ones
//! - Placement: a matching local executor (round robin), else the orphan
//!   queue that only thieves are served from
//! - Export: stolen records leave with their parked events. They count as
//!   queued until the reply is handed to the transport; only then does a
//!   forwarding entry send later events after them to the thief
//! - Early events: remote events for an activity that is not here yet are
//!   held for one steal timeout, in case its record is still in flight
//!
//! ## Design Principles
//! - Activity hooks never run while the directory is locked
//! - A record is in exactly one place: a queue, a delivered list, the live
//!   map, or on the wire
//! - Steals never block on remote nodes

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use constellation_api::{
    Activity, ActivityIdentifier, ConstellationError, ConstellationIdentifier, ConstellationResult, Event,
    NodeId, NodeRank, StealPool, Transport,
};

use crate::activity::{ActivityFactory, ActivityRecord, RunState};
use crate::config::ConstellationConfig;
use crate::error::NodeError;
use crate::executor::{Executor, ExecutorShared, Outbox};
use crate::pool::{PoolCoordinator, PoolInfo, SchedulerRef};
use crate::queue::{create_queue, SharedRecord, SynchronizedWorkQueue};
use crate::wire::{RecordWire, StealReply, StealRequest};
use crate::{activity_span, log_error, log_lifecycle, log_steal};

/// Executor index used in identifiers of activities submitted from outside
/// any executor.
pub const EXTERNAL_EXECUTOR: u32 = u32::MAX;

/// Lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Built, executors not started
    Created,
    /// Executors running
    Running,
    /// Shut down; cannot be restarted
    Stopped,
}

struct LiveEntry {
    record: SharedRecord,
    executor: usize,
}

#[derive(Default)]
struct Directory {
    /// Not started, in a queue or a delivered list.
    queued: HashSet<ActivityIdentifier>,
    /// Events for queued activities.
    parked: HashMap<ActivityIdentifier, Vec<Event>>,
    /// Started and not completed.
    live: HashMap<ActivityIdentifier, LiveEntry>,
    /// Stolen from this node, by rank of the thief.
    relocated: HashMap<ActivityIdentifier, NodeRank>,
    /// Remote events that arrived before their activity, with arrival time.
    early: HashMap<ActivityIdentifier, (Instant, Vec<Event>)>,
}

impl Directory {
    /// Drop early events older than `window`, returning how many went.
    fn expire_early(&mut self, now: Instant, window: Duration) -> Vec<(ActivityIdentifier, usize)> {
        let mut expired = Vec::new();
        self.early.retain(|identifier, (since, events)| {
            let keep = now.duration_since(*since) < window;
            if !keep {
                expired.push((*identifier, events.len()));
            }
            keep
        });
        expired
    }
}

enum Route {
    Deliver(SharedRecord, usize),
    Forward(NodeRank),
    Unknown,
}

pub struct ConstellationNode {
    config: ConstellationConfig,
    transport: Arc<dyn Transport>,
    coordinator: Arc<PoolCoordinator>,
    factory: ActivityFactory,
    executors: Vec<Executor>,
    orphans: SynchronizedWorkQueue,
    directory: Mutex<Directory>,
    sequence: AtomicU64,
    next_executor: AtomicUsize,
    completed: AtomicU64,
    state: Mutex<NodeState>,
    self_ref: Weak<ConstellationNode>,
}

impl fmt::Debug for ConstellationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstellationNode")
            .field("rank", &self.rank())
            .field("state", &*self.state.lock().unwrap())
            .field("executors", &self.executors.len())
            .field("orphans", &self.orphans.size())
            .field("completed", &self.completed.load(Ordering::Relaxed))
            .finish()
    }
}

impl ConstellationNode {
    /// Join the cluster through `transport` and build executors and queues.
    ///
    /// Nothing runs until [`activate`](Self::activate).
    pub fn new(
        config: ConstellationConfig,
        transport: Arc<dyn Transport>,
        factory: ActivityFactory,
    ) -> Result<Arc<Self>, NodeError> {
        config.validate()?;
        let coordinator = PoolCoordinator::new(Arc::clone(&transport), (&config).into());
        let rank = coordinator.rank();

        let executors = config
            .executors
            .iter()
            .enumerate()
            .map(|(index, executor)| {
                let identifier = ConstellationIdentifier::new(rank, index as u32);
                Executor::new(Arc::new(ExecutorShared::new(
                    index,
                    identifier,
                    executor.clone(),
                    config.queue_kind,
                )))
            })
            .collect();

        let node = Arc::new_cyclic(|weak: &Weak<ConstellationNode>| {
            let scheduler: Weak<dyn SchedulerRef> = weak.clone();
            coordinator.set_scheduler(scheduler);
            Self {
                orphans: SynchronizedWorkQueue::new(create_queue(config.queue_kind, "orphans")),
                config,
                transport,
                coordinator,
                factory,
                executors,
                directory: Mutex::new(Directory::default()),
                sequence: AtomicU64::new(0),
                next_executor: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                state: Mutex::new(NodeState::Created),
                self_ref: weak.clone(),
            }
        });
        info!(rank, executors = node.executors.len(), master = node.is_master(), "node created");
        Ok(node)
    }

    pub fn rank(&self) -> NodeRank {
        self.coordinator.rank()
    }

    pub fn identifier(&self) -> NodeId {
        self.coordinator.identifier()
    }

    pub fn is_master(&self) -> bool {
        self.coordinator.is_master()
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock().unwrap()
    }

    pub fn coordinator(&self) -> &Arc<PoolCoordinator> {
        &self.coordinator
    }

    pub fn config(&self) -> &ConstellationConfig {
        &self.config
    }

    /// Membership of a pool as currently known here.
    pub fn pool(&self, tag: &str) -> Option<PoolInfo> {
        self.coordinator.pool(tag)
    }

    /// Activities that completed on this node, successfully or not.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Activities started here and not completed yet.
    pub fn live(&self) -> usize {
        self.directory.lock().unwrap().live.len()
    }

    /// Activities waiting in any queue of this node.
    pub fn pending(&self) -> usize {
        self.executors.iter().map(|e| e.shared().backlog()).sum::<usize>() + self.orphans.size()
    }

    // --- Lifecycle ---

    /// Run the activation handshake, join the configured pools and start
    /// the executor threads.
    pub fn activate(&self) -> Result<(), NodeError> {
        {
            let state = self.state.lock().unwrap();
            match *state {
                NodeState::Created => {}
                NodeState::Running => return Err(NodeError::AlreadyRunning),
                NodeState::Stopped => return Err(NodeError::NotRunning),
            }
        }

        self.coordinator.activate()?;

        let belongs: Vec<StealPool> = self.config.executors.iter().map(|e| e.belongs_to.clone()).collect();
        let belongs = StealPool::merge(&belongs);
        for tag in belongs.tags() {
            self.register_with_pool(tag)?;
        }
        let steals: Vec<StealPool> = self.config.executors.iter().map(|e| e.steals_from.clone()).collect();
        for tag in StealPool::merge(&steals).tags() {
            if belongs.tags().contains(tag) {
                continue;
            }
            if let Err(e) = self.follow_pool(tag) {
                warn!(pool = %tag, error = %e, "cannot follow pool yet, stealing from it is disabled");
            }
        }

        for executor in &self.executors {
            executor.start(self.self_ref.clone(), self.config.idle_sleep_duration)?;
        }
        *self.state.lock().unwrap() = NodeState::Running;
        info!(rank = self.rank(), "node active");
        Ok(())
    }

    /// Stop executors and the coordinator and leave the cluster.
    ///
    /// Activities still queued or suspended are dropped.
    pub fn shutdown(&self) -> Result<(), NodeError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == NodeState::Stopped {
                return Err(NodeError::NotRunning);
            }
            *state = NodeState::Stopped;
        }

        let mut first_error = None;
        for executor in &self.executors {
            if let Err(e) = executor.stop() {
                log_error!(e, rank = self.rank(), "executor did not stop cleanly");
                first_error.get_or_insert(e);
            }
        }
        self.coordinator.shutdown();
        self.transport.end();

        info!(
            rank = self.rank(),
            completed = self.completed(),
            dropped = self.pending() + self.live(),
            "node shut down"
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Join the pool `tag`, as its master if this node wins the election.
    pub fn register_with_pool(&self, tag: &str) -> Result<(), NodeError> {
        Ok(self.coordinator.register_with_pool(tag)?)
    }

    /// Follow the pool `tag` so executors can steal from it.
    pub fn follow_pool(&self, tag: &str) -> Result<(), NodeError> {
        Ok(self.coordinator.follow_pool(tag)?)
    }

    // --- Submission ---

    /// Submit an activity from outside any executor.
    pub fn submit(&self, activity: Box<dyn Activity>) -> Result<ActivityIdentifier, NodeError> {
        if self.state() == NodeState::Stopped {
            return Err(NodeError::NotRunning);
        }
        let origin = ConstellationIdentifier::new(self.rank(), EXTERNAL_EXECUTOR);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let identifier = ActivityIdentifier::new(origin, sequence, activity.expects_events());
        self.place(ActivityRecord::new(identifier, activity), None)?;
        Ok(identifier)
    }

    /// Send an event from outside any activity.
    pub fn send(&self, event: Event) -> Result<(), NodeError> {
        if self.state() == NodeState::Stopped {
            return Err(NodeError::NotRunning);
        }
        let target = event.target;
        if self.route_event(event, false) {
            Ok(())
        } else {
            Err(ConstellationError::IllegalState(format!("event for {} could not be delivered", target)).into())
        }
    }

    /// Choose the executor a record should live on: `preferred` if it
    /// accepts the record, else the next accepting executor round robin.
    fn select_executor(&self, record: &ActivityRecord, preferred: Option<usize>) -> Option<&Arc<ExecutorShared>> {
        if let Some(shared) = preferred.and_then(|i| self.executors.get(i)).map(Executor::shared) {
            if shared.accepts(record) {
                return Some(shared);
            }
        }
        let count = self.executors.len();
        let start = self.next_executor.fetch_add(1, Ordering::Relaxed) % count;
        (0..count)
            .map(|offset| self.executors[(start + offset) % count].shared())
            .find(|shared| shared.accepts(record))
    }

    fn place(&self, record: ActivityRecord, preferred: Option<usize>) -> ConstellationResult<()> {
        let identifier = *record.identifier();
        let kind = record.activity().kind();
        let target = self.select_executor(&record, preferred);

        if !record.may_be_stolen() && target.is_none() {
            return Err(ConstellationError::InvalidContext(format!(
                "no executor on node {} can run non-stealable activity {} ({})",
                self.rank(),
                identifier,
                record.context()
            )));
        }

        self.directory.lock().unwrap().queued.insert(identifier);
        match target {
            Some(shared) if !record.may_be_stolen() => {
                log_lifecycle!(identifier, kind, "submitted", queue = "restricted", executor = shared.index());
                shared.restricted().enqueue(record);
                shared.wake();
            }
            Some(shared) => {
                log_lifecycle!(identifier, kind, "submitted", queue = "fresh", executor = shared.index());
                shared.fresh().enqueue(record);
                shared.wake();
            }
            None => {
                log_lifecycle!(identifier, kind, "submitted", queue = "orphans");
                self.orphans.enqueue(record);
            }
        }
        Ok(())
    }

    // --- Stealing ---

    /// Find a fresh activity for executor `index` on this node: its own
    /// queues first, then those of its siblings.
    pub fn steal_local(&self, index: usize) -> Option<ActivityRecord> {
        let own = self.executors.get(index)?.shared();
        let context = &own.config().context;
        let strategy = own.config().local_strategy;

        if let Some(record) = own
            .fresh()
            .steal(context, &strategy)
            .or_else(|| own.restricted().steal(context, &strategy))
        {
            return Some(record);
        }
        for sibling in self.executors.iter().filter(|e| e.shared().index() != index) {
            let sibling = sibling.shared();
            if let Some(record) = sibling
                .fresh()
                .steal(context, &strategy)
                .or_else(|| sibling.restricted().steal(context, &strategy))
            {
                log_steal!("local", "sibling", thief = index, victim = sibling.index());
                return Some(record);
            }
        }
        None
    }

    /// Steal from the pool executor `index` belongs to.
    ///
    /// Returns an activity delivered by an earlier request, or sends a new
    /// request and returns `None`.
    pub fn steal_constellation(&self, index: usize) -> Option<ActivityRecord> {
        let pool = self.executors.get(index)?.shared().config().belongs_to.clone();
        self.steal_from_pool(index, &pool)
    }

    /// Steal from the pools executor `index` steals from, like
    /// [`steal_constellation`](Self::steal_constellation).
    pub fn steal_remote(&self, index: usize) -> Option<ActivityRecord> {
        let pool = self.executors.get(index)?.shared().config().steals_from.clone();
        self.steal_from_pool(index, &pool)
    }

    fn steal_from_pool(&self, index: usize, pool: &StealPool) -> Option<ActivityRecord> {
        let own = self.executors.get(index)?.shared();
        if let Some(record) = own.take_delivered() {
            return Some(record);
        }
        if !self.config.remote_stealing || pool.is_none() || !self.coordinator.is_active() {
            return None;
        }
        if !own.try_begin_steal(self.config.steal_timeout) {
            return None;
        }

        let config = own.config();
        let request = StealRequest {
            source: own.identifier(),
            context: config.context.clone(),
            local_strategy: config.local_strategy,
            constellation_strategy: config.constellation_strategy,
            remote_strategy: config.remote_strategy,
            pool: pool.random_select(),
            batch: self.config.steal_batch_size as u32,
        };
        if !self.coordinator.send_steal_request(request) {
            own.end_steal();
        }
        None
    }

    // --- Running ---

    /// Start a fresh record on `shared` and run its first transition.
    pub(crate) fn start(&self, shared: &ExecutorShared, mut record: ActivityRecord) {
        let identifier = *record.identifier();
        let kind = record.activity().kind();
        let started = {
            let mut directory = self.directory.lock().unwrap();
            directory.queued.remove(&identifier);
            directory.relocated.remove(&identifier);
            for event in directory.parked.remove(&identifier).unwrap_or_default() {
                if let Err(e) = record.enqueue(event) {
                    warn!(activity = %identifier, error = %e, "parked event dropped");
                }
            }
            let started: SharedRecord = Arc::new(Mutex::new(record));
            directory.live.insert(
                identifier,
                LiveEntry {
                    record: Arc::clone(&started),
                    executor: shared.index(),
                },
            );
            started
        };
        log_lifecycle!(identifier, kind, "started", executor = shared.index());
        self.run_started(shared, started);
    }

    /// Run one transition of a started record and act on the outcome.
    pub(crate) fn run_started(&self, shared: &ExecutorShared, record: SharedRecord) {
        let (identifier, kind, result, (submitted, events)) = {
            let mut guard = record.lock().unwrap();
            let identifier = *guard.identifier();
            let kind = guard.activity().kind();
            let span = activity_span!(identifier, kind, executor = shared.index());
            let _enter = span.enter();
            let mut outbox = Outbox::new(shared.identifier(), identifier, &self.sequence);
            let result = guard.run(&mut outbox);
            (identifier, kind, result, outbox.drain())
        };

        for (child, activity) in submitted {
            if let Err(e) = self.place(ActivityRecord::new(child, activity), Some(shared.index())) {
                log_error!(e, activity = %child, parent = %identifier, "submission rejected");
            }
        }
        for event in events {
            let target = event.target;
            if !self.route_event(event, false) {
                warn!(source = %identifier, activity = %target, "event could not be delivered");
            }
        }

        match result {
            Ok(RunState::Initializing | RunState::Runnable | RunState::Finishing) => shared.runnable().push(record),
            Ok(RunState::Suspended) => {}
            Ok(state @ (RunState::Done | RunState::Error)) => self.complete(identifier, kind, state, &record),
            Err(e) => {
                log_error!(e, activity = %identifier, "activity cannot run");
                self.complete(identifier, kind, RunState::Error, &record);
            }
        }
    }

    /// Retire a live record. Records already retired are left alone.
    fn complete(&self, identifier: ActivityIdentifier, kind: &str, state: RunState, record: &SharedRecord) {
        if self.directory.lock().unwrap().live.remove(&identifier).is_none() {
            return;
        }
        let (leftover, fault) = {
            let mut record = record.lock().unwrap();
            (record.take_events(), record.fault().cloned())
        };
        if !leftover.is_empty() {
            warn!(activity = %identifier, count = leftover.len(), "events left unprocessed at completion");
        }
        self.completed.fetch_add(1, Ordering::AcqRel);
        match (state, fault) {
            (RunState::Error, Some(fault)) => log_lifecycle!(identifier, kind, "failed", fault = %fault),
            (RunState::Error, None) => log_lifecycle!(identifier, kind, "failed"),
            _ => log_lifecycle!(identifier, kind, "finished"),
        }
    }

    // --- Events ---

    /// Deliver, park or forward an event.
    ///
    /// Events from other nodes are never sent back to the target's origin,
    /// which is what forwarded them here. Unknown ones are held as early
    /// events instead.
    fn route_event(&self, event: Event, from_remote: bool) -> bool {
        let target = event.target;
        let route = {
            let mut directory = self.directory.lock().unwrap();
            let expired = directory.expire_early(Instant::now(), self.config.steal_timeout);
            for (identifier, count) in expired {
                warn!(activity = %identifier, count, "event for an unknown or completed activity dropped");
            }
            let live = directory
                .live
                .get(&target)
                .map(|entry| (Arc::clone(&entry.record), entry.executor));
            match live {
                Some((record, executor)) => Route::Deliver(record, executor),
                None if directory.queued.contains(&target) => {
                    directory.parked.entry(target).or_default().push(event);
                    return true;
                }
                None => match directory.relocated.get(&target).copied() {
                    Some(rank) => Route::Forward(rank),
                    None if from_remote => {
                        debug!(activity = %target, "holding event for an activity not here yet");
                        directory
                            .early
                            .entry(target)
                            .or_insert_with(|| (Instant::now(), Vec::new()))
                            .1
                            .push(event);
                        return true;
                    }
                    None => Route::Unknown,
                },
            }
        };

        match route {
            Route::Deliver(record, executor) => {
                let woke = record.lock().unwrap().enqueue(event);
                match woke {
                    Ok(true) => {
                        self.executors[executor].shared().push_runnable(record);
                        true
                    }
                    Ok(false) => true,
                    Err(e) => {
                        warn!(activity = %target, error = %e, "event rejected");
                        false
                    }
                }
            }
            Route::Forward(rank) => {
                debug!(activity = %target, thief = rank, "forwarding event to relocated activity");
                self.coordinator.send_event(rank, event)
            }
            Route::Unknown if target.node() != self.rank() => self.coordinator.send_event(target.node(), event),
            Route::Unknown => {
                warn!(activity = %target, "event for an unknown or completed activity dropped");
                false
            }
        }
    }

    // --- Migration ---

    /// Turn stolen records into their wire form.
    ///
    /// The records stay queued in the directory, so events arriving before
    /// [`relocate`](Self::relocate) are parked rather than forwarded ahead
    /// of the reply.
    fn export(&self, stolen: Vec<ActivityRecord>, thief: NodeRank) -> Vec<RecordWire> {
        let mut exported = Vec::with_capacity(stolen.len());
        for mut record in stolen {
            let identifier = *record.identifier();
            let state = match record.activity().encode() {
                Ok(state) => state,
                Err(e) => {
                    log_error!(e, activity = %identifier, "cannot encode stolen activity, keeping it");
                    self.orphans.enqueue(record);
                    continue;
                }
            };
            let kind = record.activity().kind();
            let mut events = record.take_events();
            events.extend(self.directory.lock().unwrap().parked.remove(&identifier).unwrap_or_default());
            log_lifecycle!(identifier, kind, "stolen", thief, events = events.len());
            exported.push(RecordWire {
                identifier,
                kind: kind.to_string(),
                state,
                events,
            });
        }
        exported
    }

    /// Point exported records at the thief once their reply is on its way,
    /// and forward events parked since the export behind it.
    fn relocate(&self, exported: &[RecordWire], thief: NodeRank) {
        let mut late = Vec::new();
        {
            let mut directory = self.directory.lock().unwrap();
            for wire in exported {
                directory.queued.remove(&wire.identifier);
                directory.relocated.insert(wire.identifier, thief);
                late.extend(directory.parked.remove(&wire.identifier).unwrap_or_default());
            }
        }
        for event in late {
            let target = event.target;
            debug!(activity = %target, thief, "forwarding event parked during export");
            if !self.coordinator.send_event(thief, event) {
                warn!(activity = %target, thief, "event for a relocated activity not sent");
            }
        }
    }

    /// Rebuild migrated records and hand them to executor `target`, or
    /// place them like new submissions if it cannot run them.
    fn accept(&self, records: Vec<RecordWire>, target: Option<usize>) {
        for wire in records {
            let identifier = wire.identifier;
            let activity = match self.factory.decode(&wire.kind, &wire.state) {
                Ok(activity) => activity,
                Err(e) => {
                    log_error!(e, activity = %identifier, kind = %wire.kind, "cannot rebuild stolen activity, dropped");
                    continue;
                }
            };
            let record = ActivityRecord::restore(identifier, activity, wire.events);
            {
                let mut directory = self.directory.lock().unwrap();
                directory.relocated.remove(&identifier);
                directory.queued.insert(identifier);
                if let Some((_, early)) = directory.early.remove(&identifier) {
                    debug!(activity = %identifier, count = early.len(), "replaying events that arrived first");
                    directory.parked.entry(identifier).or_default().extend(early);
                }
            }
            let requester = target
                .and_then(|i| self.executors.get(i))
                .map(Executor::shared)
                .filter(|shared| shared.accepts(&record));
            match requester {
                Some(shared) => shared.deliver(record),
                None => {
                    if let Err(e) = self.place(record, None) {
                        log_error!(e, activity = %identifier, "stolen activity cannot be placed");
                    }
                }
            }
        }
    }

    fn steal_for(&self, request: &StealRequest) -> Vec<ActivityRecord> {
        let own_pool: Vec<StealPool> = self.config.executors.iter().map(|e| e.belongs_to.clone()).collect();
        let strategy = if StealPool::merge(&own_pool).overlap(&request.pool) {
            request.constellation_strategy
        } else {
            request.remote_strategy
        };
        let max = (request.batch as usize).max(1);

        let mut stolen = Vec::new();
        for executor in &self.executors {
            if stolen.len() >= max {
                break;
            }
            stolen.extend(
                executor
                    .shared()
                    .fresh()
                    .steal_batch(&request.context, &strategy, max - stolen.len()),
            );
        }
        if stolen.len() < max {
            stolen.extend(self.orphans.steal_batch(&request.context, &strategy, max - stolen.len()));
        }
        stolen
    }
}

impl SchedulerRef for ConstellationNode {
    fn handle_steal_request(&self, request: StealRequest) {
        let thief = request.source.node;
        if thief == self.rank() {
            return;
        }
        let stolen = self.steal_for(&request);
        let count = stolen.len();
        let records = self.export(stolen, thief);
        log_steal!("remote", "request_served", thief, records = count);

        let reply = StealReply {
            source: self.rank(),
            target: request.source,
            context: request.context,
            pool: request.pool,
            records,
        };
        let kept = reply.records.clone();
        if self.coordinator.send_steal_reply(reply) {
            self.relocate(&kept, thief);
        } else if !kept.is_empty() {
            warn!(thief, records = kept.len(), "steal reply not sent, taking activities back");
            self.accept(kept, None);
        }
    }

    fn handle_steal_reply(&self, reply: StealReply) {
        let target = reply.target.executor as usize;
        log_steal!("remote", "reply_received", victim = reply.source, records = reply.records.len());
        if let Some(executor) = self.executors.get(target) {
            executor.shared().end_steal();
        }
        self.accept(reply.records, Some(target));
    }

    fn handle_event(&self, event: Event) {
        self.route_event(event, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackNetwork;
    use constellation_api::context::DEFAULT_TAG;
    use constellation_api::{ActivityContext, ActivityError, Constellation, Step};

    struct Idle(ActivityContext);

    impl Activity for Idle {
        fn kind(&self) -> &'static str {
            "idle"
        }

        fn context(&self) -> &ActivityContext {
            &self.0
        }

        fn expects_events(&self) -> bool {
            true
        }

        fn initialize(&mut self, _cx: &mut dyn Constellation) -> Result<Step, ActivityError> {
            Ok(Step::Suspend)
        }

        fn encode(&self) -> ConstellationResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_record_that_cannot_run_is_retired() {
        let network = LoopbackNetwork::new();
        let node = ConstellationNode::new(ConstellationConfig::default(), network.join(), ActivityFactory::new())
            .unwrap();
        let shared = Arc::clone(node.executors[0].shared());
        let identifier = ActivityIdentifier::new(ConstellationIdentifier::new(node.rank(), 0), 1, true);
        let idle = Idle(ActivityContext::unit(DEFAULT_TAG, 0).unwrap());

        node.start(&shared, ActivityRecord::new(identifier, Box::new(idle)));
        assert_eq!(node.live(), 1);

        // suspended with nothing to process
        let stuck = Arc::clone(&node.directory.lock().unwrap().live[&identifier].record);
        node.run_started(&shared, Arc::clone(&stuck));
        assert_eq!(node.live(), 0);
        assert_eq!(node.completed(), 1);

        // a second failure does not count it twice
        node.run_started(&shared, stuck);
        assert_eq!(node.completed(), 1);
    }
}
