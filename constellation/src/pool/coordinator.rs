//! # Pool Coordinator
//!
//! The coordinator is the only part of a node that talks to the transport.
//! It owns the node's rank, the location cache, the registry of pools and
//! the activation handshake, and routes steal requests, steal replies and
//! events between nodes.
//!
//! ## Key Concepts
//! - Ranks: dense integers handed out by the `constellation-rank` counter
//! - Master: the node elected under `constellation-master`; it answers rank
//!   lookups and drives the closed-pool handshake
//! - Pools: each pool has its own master, elected under `STEALPOOL$<tag>`,
//!   that owns the authoritative membership list
//!
//! ## Design Principles
//! - Inbound bytes are decoded once into [`Message`] and matched exhaustively
//! - Undecodable or unexpected messages are logged and dropped
//! - Transport failures surface as `false`, never as panics
//! - Every activation wait is bounded by `activation_timeout`

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use rand::Rng;
use tracing::{debug, info, trace, warn};

use constellation_api::{Event, MessageHandler, NodeId, NodeRank, StealPool, Transport};

use crate::config::ConstellationConfig;
use crate::error::{NodeError, PoolError};
use crate::pool::clock::{now_nanos, TimeSync};
use crate::pool::info::PoolInfo;
use crate::pool::location::LocationCache;
use crate::pool::registry::PoolRegistry;
use crate::pool::updater::PoolUpdater;
use crate::wire::{self, Message, StealReply, StealRequest};
use crate::{log_error, log_pool, log_steal};

/// Sequence counter that hands out node ranks.
pub const RANK_COUNTER: &str = "constellation-rank";
/// Election that picks the node master.
pub const MASTER_ELECTION: &str = "constellation-master";
/// Prefix of the per-pool master elections.
pub const POOL_ELECTION_PREFIX: &str = "STEALPOOL$";

pub fn pool_election(tag: &str) -> String {
    format!("{}{}", POOL_ELECTION_PREFIX, tag)
}

/// Upcalls from the coordinator into the local scheduler.
///
/// Held as a `Weak` reference so the scheduler owns the coordinator and
/// not the other way around.
pub trait SchedulerRef: Send + Sync {
    fn handle_steal_request(&self, request: StealRequest);
    fn handle_steal_reply(&self, reply: StealReply);
    fn handle_event(&self, event: Event);
}

/// Timeouts and switches the coordinator needs from the node config.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub closed_pool: bool,
    pub activation_timeout: Duration,
    pub election_timeout: Duration,
    pub updater_min_interval: Duration,
    pub updater_max_interval: Duration,
    /// How often an unanswered rank lookup is sent again.
    pub lookup_retry: Duration,
    /// How long messages wait for an unknown rank before they are dropped.
    pub lookup_expiry: Duration,
}

impl From<&ConstellationConfig> for CoordinatorConfig {
    fn from(config: &ConstellationConfig) -> Self {
        Self {
            closed_pool: config.closed_pool,
            activation_timeout: config.activation_timeout,
            election_timeout: config.election_timeout,
            updater_min_interval: config.updater_min_interval,
            updater_max_interval: config.updater_max_interval,
            lookup_retry: config.steal_timeout,
            lookup_expiry: config.activation_timeout,
        }
    }
}

/// A node picked to steal from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Victim {
    /// A current member of the transport group, addressed directly.
    Node(NodeId),
    /// A pool member known only by rank.
    Rank(NodeRank),
}

/// Messages held for one rank whose location is still unknown.
struct Held {
    since: Instant,
    asked: Instant,
    messages: Vec<Message>,
}

/// One rendezvous channel per handshake message kind.
struct Rendezvous<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Rendezvous<T> {
    fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    fn post(&self, value: T) {
        let _ = self.tx.send(value);
    }

    /// Wait until `deadline` for a value accepted by `wanted`, discarding
    /// anything else.
    fn wait_for<F>(&self, deadline: Instant, mut wanted: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        loop {
            let value = self.rx.recv_deadline(deadline).ok()?;
            if wanted(&value) {
                return Some(value);
            }
        }
    }
}

pub struct PoolCoordinator {
    transport: Arc<dyn Transport>,
    config: CoordinatorConfig,
    identifier: NodeId,
    rank: NodeRank,
    master: NodeId,
    locations: LocationCache,
    registry: PoolRegistry,
    clock: TimeSync,
    /// Followed pools and the node mastering each.
    followed: Mutex<HashMap<String, NodeId>>,
    /// Messages waiting for the location of their destination rank.
    awaiting: Mutex<HashMap<NodeRank, Held>>,
    updated: AtomicBool,
    active: AtomicBool,
    pongs: Rendezvous<NodeId>,
    time_replies: Rendezvous<(NodeId, i64)>,
    arrivals: Rendezvous<NodeId>,
    releases: Rendezvous<NodeId>,
    scheduler: RwLock<Option<Weak<dyn SchedulerRef>>>,
    updater: Mutex<Option<PoolUpdater>>,
}

impl fmt::Debug for PoolCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolCoordinator")
            .field("identifier", &self.identifier)
            .field("rank", &self.rank)
            .field("master", &self.master)
            .field("known_locations", &self.locations.len())
            .field("pools", &self.registry.tags())
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

/// Forwards transport upcalls without keeping the coordinator alive.
struct Upcall(Weak<PoolCoordinator>);

impl MessageHandler for Upcall {
    fn on_message(&self, source: NodeId, opcode: u8, payload: &[u8]) {
        if let Some(coordinator) = self.0.upgrade() {
            coordinator.on_message(source, opcode, payload);
        }
    }
}

impl PoolCoordinator {
    /// Join the cluster: draw a rank, elect the master and enable upcalls.
    pub fn new(transport: Arc<dyn Transport>, config: CoordinatorConfig) -> Arc<Self> {
        let identifier = transport.identifier();
        let rank = transport.sequence_number(RANK_COUNTER) as NodeRank;
        let master = transport.elect(MASTER_ELECTION);

        let coordinator = Arc::new(Self {
            transport: Arc::clone(&transport),
            config,
            identifier,
            rank,
            master,
            locations: LocationCache::new(),
            registry: PoolRegistry::new(),
            clock: TimeSync::new(),
            followed: Mutex::new(HashMap::new()),
            awaiting: Mutex::new(HashMap::new()),
            updated: AtomicBool::new(false),
            active: AtomicBool::new(false),
            pongs: Rendezvous::new(),
            time_replies: Rendezvous::new(),
            arrivals: Rendezvous::new(),
            releases: Rendezvous::new(),
            scheduler: RwLock::new(None),
            updater: Mutex::new(None),
        });
        coordinator.locations.insert(rank, identifier);
        transport.enable_upcalls(Arc::new(Upcall(Arc::downgrade(&coordinator))));

        info!(node = %identifier, rank, master = %master, "joined constellation");
        coordinator
    }

    pub fn set_scheduler(&self, scheduler: Weak<dyn SchedulerRef>) {
        *self.scheduler.write().unwrap() = Some(scheduler);
    }

    fn scheduler(&self) -> Option<Arc<dyn SchedulerRef>> {
        self.scheduler.read().unwrap().as_ref().and_then(Weak::upgrade)
    }

    pub fn rank(&self) -> NodeRank {
        self.rank
    }

    pub fn identifier(&self) -> NodeId {
        self.identifier
    }

    pub fn is_master(&self) -> bool {
        self.master == self.identifier
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn locations(&self) -> &LocationCache {
        &self.locations
    }

    pub fn time_offset(&self, rank: NodeRank) -> Option<i64> {
        self.clock.offset(rank)
    }

    pub fn pool(&self, tag: &str) -> Option<PoolInfo> {
        self.registry.snapshot(tag)
    }

    // --- Activation ---

    /// Register with the master and, for closed pools, run the handshake.
    /// Starts the pool updater on success.
    pub fn activate(self: &Arc<Self>) -> Result<(), NodeError> {
        if self.active.load(Ordering::Acquire) {
            return Err(NodeError::AlreadyRunning);
        }
        if !self.is_master() {
            let registered = self.send_message(
                &self.master,
                Message::RankRegister {
                    rank: self.rank,
                    node: self.identifier,
                },
            );
            if !registered {
                return Err(PoolError::SendFailed {
                    what: "rank registration".to_string(),
                    destination: self.master.to_string(),
                }
                .into());
            }
        }

        if self.config.closed_pool {
            if self.is_master() {
                self.activate_as_master()?;
            } else {
                self.activate_as_member()?;
            }
        }

        let updater = PoolUpdater::start(
            Arc::downgrade(self),
            self.config.updater_min_interval,
            self.config.updater_max_interval,
            self.config.lookup_retry,
            format!("pool-updater-{}", self.rank),
        )?;
        *self.updater.lock().unwrap() = Some(updater);
        self.active.store(true, Ordering::Release);
        info!(rank = self.rank, closed = self.config.closed_pool, "coordinator active");
        Ok(())
    }

    fn activation_timeout(&self, what: impl Into<String>) -> PoolError {
        PoolError::ActivationTimeout {
            what: what.into(),
            timeout: self.config.activation_timeout,
        }
    }

    fn activate_as_master(&self) -> Result<(), PoolError> {
        let deadline = Instant::now() + self.config.activation_timeout;
        let peers: Vec<NodeId> = self
            .transport
            .list_nodes()
            .into_iter()
            .filter(|node| *node != self.identifier)
            .collect();
        debug!(peers = peers.len(), "closed pool: waiting for peers");

        // Every member announces itself once its rank registration is sent.
        let mut waiting: HashSet<NodeId> = peers.iter().copied().collect();
        while !waiting.is_empty() {
            let node = self
                .arrivals
                .wait_for(deadline, |node| waiting.contains(node))
                .ok_or_else(|| self.activation_timeout(format!("{} peer(s) to arrive", waiting.len())))?;
            waiting.remove(&node);
        }

        for peer in &peers {
            if !self.send_message(peer, Message::Ping) {
                return Err(PoolError::SendFailed {
                    what: "ping".to_string(),
                    destination: peer.to_string(),
                });
            }
        }
        let mut waiting: HashSet<NodeId> = peers.iter().copied().collect();
        while !waiting.is_empty() {
            let node = self
                .pongs
                .wait_for(deadline, |node| waiting.contains(node))
                .ok_or_else(|| self.activation_timeout(format!("pong from {} peer(s)", waiting.len())))?;
            waiting.remove(&node);
        }

        for peer in &peers {
            self.synchronize_clock(peer, deadline)?;
        }

        for peer in &peers {
            if !self.send_message(peer, Message::Release) {
                warn!(peer = %peer, "failed to release peer");
            }
        }
        info!(peers = peers.len(), "closed pool released");
        Ok(())
    }

    fn synchronize_clock(&self, peer: &NodeId, deadline: Instant) -> Result<(), PoolError> {
        let sent = now_nanos();
        if !self.send_message(peer, Message::TimeRequest) {
            return Err(PoolError::SendFailed {
                what: "time request".to_string(),
                destination: peer.to_string(),
            });
        }
        let (_, remote) = self
            .time_replies
            .wait_for(deadline, |(node, _)| node == peer)
            .ok_or_else(|| self.activation_timeout(format!("time reply from {}", peer)))?;
        let received = now_nanos();
        match self.locations.rank_of(peer) {
            Some(rank) => {
                let offset = self.clock.record(rank, sent, received, remote);
                debug!(peer = rank, offset_ns = offset, "clock offset measured");
            }
            None => warn!(peer = %peer, "time reply from a peer without a known rank"),
        }
        Ok(())
    }

    fn activate_as_member(&self) -> Result<(), PoolError> {
        if !self.send_message(&self.master, Message::Nothing) {
            return Err(PoolError::SendFailed {
                what: "arrival".to_string(),
                destination: self.master.to_string(),
            });
        }
        let deadline = Instant::now() + self.config.activation_timeout;
        let master = self.master;
        self.releases
            .wait_for(deadline, |node| *node == master)
            .ok_or_else(|| self.activation_timeout("release from master"))?;
        debug!(rank = self.rank, "released by master");
        Ok(())
    }

    /// Stop the updater. Inbound messages are still decoded but steals and
    /// events are no longer passed up.
    pub fn shutdown(&self) {
        self.active.store(false, Ordering::Release);
        if let Some(updater) = self.updater.lock().unwrap().take() {
            updater.stop();
        }
        debug!(rank = self.rank, "coordinator stopped");
    }

    // --- Pools ---

    /// Take part in the election for `tag`; join the pool as master or
    /// member and start following it in the latter case.
    pub fn register_with_pool(&self, tag: &str) -> Result<(), PoolError> {
        let winner = self.transport.elect(&pool_election(tag));
        if winner == self.identifier {
            let info = self.registry.create(tag, self.rank);
            log_pool!(tag, "elected_master", members = info.len(), timestamp = info.timestamp());
            return Ok(());
        }

        let registered = self.send_message(
            &winner,
            Message::PoolRegister {
                tag: tag.to_string(),
                rank: self.rank,
                node: self.identifier,
            },
        );
        if !registered {
            return Err(PoolError::SendFailed {
                what: format!("registration with pool {}", tag),
                destination: winner.to_string(),
            });
        }
        self.follow_master(tag, winner);
        log_pool!(tag, "registered", master = %winner);
        Ok(())
    }

    /// Track a pool without joining it, so it can be stolen from.
    pub fn follow_pool(&self, tag: &str) -> Result<(), PoolError> {
        let master = self
            .transport
            .election_result(&pool_election(tag), self.config.election_timeout)
            .ok_or_else(|| PoolError::ElectionUnresolved(tag.to_string()))?;
        if master == self.identifier {
            return Ok(());
        }
        self.follow_master(tag, master);
        log_pool!(tag, "following", master = %master);
        Ok(())
    }

    fn follow_master(&self, tag: &str, master: NodeId) {
        self.registry.follow(tag);
        self.followed.lock().unwrap().insert(tag.to_string(), master);
        // ask right away instead of waiting for the first updater round
        self.request_pool_update(tag, &master);
    }

    fn request_pool_update(&self, tag: &str, master: &NodeId) {
        let request = Message::PoolUpdateRequest {
            tag: tag.to_string(),
            timestamp: self.registry.timestamp(tag),
        };
        if !self.send_message(master, request) {
            trace!(pool = tag, "pool update request not sent");
        }
    }

    /// One updater round: ask every followed pool's master for news.
    pub fn poll_followed_pools(&self) {
        let followed: Vec<(String, NodeId)> = self
            .followed
            .lock()
            .unwrap()
            .iter()
            .map(|(tag, master)| (tag.clone(), *master))
            .collect();
        for (tag, master) in followed {
            self.request_pool_update(&tag, &master);
        }
    }

    /// Whether a pool update was committed since the last call.
    pub fn take_update_flag(&self) -> bool {
        self.updated.swap(false, Ordering::AcqRel)
    }

    // --- Routing ---

    /// Pick a victim in `pool` other than this node.
    ///
    /// The world pool draws from the transport's current members, so ranks
    /// that left or were never handed out are not picked.
    pub fn select_victim<R: Rng + ?Sized>(&self, pool: &StealPool, rng: &mut R) -> Option<Victim> {
        match pool.random_select_with(rng) {
            StealPool::None | StealPool::Set(_) => None,
            StealPool::World => {
                let others: Vec<NodeId> = self
                    .transport
                    .list_nodes()
                    .into_iter()
                    .filter(|node| *node != self.identifier)
                    .collect();
                if others.is_empty() {
                    return None;
                }
                Some(Victim::Node(others[rng.gen_range(0..others.len())]))
            }
            StealPool::Tag(tag) => self.registry.random_member(&tag, rng, self.rank).map(Victim::Rank),
        }
    }

    /// Send a steal request to a random node of `request.pool`.
    ///
    /// `false` when no victim exists, its location is unknown (a lookup is
    /// started) or the transport refused the message.
    pub fn send_steal_request(&self, request: StealRequest) -> bool {
        let node = match self.select_victim(&request.pool, &mut rand::thread_rng()) {
            None => return false,
            Some(Victim::Node(node)) => node,
            Some(Victim::Rank(rank)) => match self.locations.get(rank) {
                Some(node) => node,
                None => {
                    self.request_lookup(rank);
                    return false;
                }
            },
        };
        log_steal!("remote", "request_sent", victim = %node, pool = %request.pool);
        self.send_message(&node, Message::StealRequest(request))
    }

    /// Send stolen activities to the executor that asked for them.
    ///
    /// `false` only when the transport refused the message; the caller
    /// still owns the activities then.
    pub fn send_steal_reply(&self, reply: StealReply) -> bool {
        let target = reply.target.node;
        log_steal!("remote", "reply_sent", thief = target, records = reply.records.len());
        self.send_or_hold(target, Message::StealReply(reply))
    }

    /// Route an event to the node that currently holds its target.
    pub fn send_event(&self, rank: NodeRank, event: Event) -> bool {
        self.send_or_hold(rank, Message::Event(event))
    }

    /// Send to `rank`, or hold the message until its location is known.
    ///
    /// Locations are only published under the `awaiting` lock, so a message
    /// sent here never overtakes one still held for the same rank.
    fn send_or_hold(&self, rank: NodeRank, message: Message) -> bool {
        let mut awaiting = self.awaiting.lock().unwrap();
        if let Some(node) = self.locations.get(rank) {
            drop(awaiting);
            return self.send_message(&node, message);
        }
        debug!(rank, msg = message.name(), "unknown rank, holding message");
        let now = Instant::now();
        let first = !awaiting.contains_key(&rank);
        awaiting
            .entry(rank)
            .or_insert_with(|| Held {
                since: now,
                asked: now,
                messages: Vec::new(),
            })
            .messages
            .push(message);
        drop(awaiting);
        if first {
            self.request_lookup(rank);
        }
        true
    }

    /// Record a location and release messages held for it, in order.
    fn learn(&self, rank: NodeRank, node: NodeId) {
        let mut awaiting = self.awaiting.lock().unwrap();
        self.locations.insert(rank, node);
        if let Some(held) = awaiting.remove(&rank) {
            debug!(rank, count = held.messages.len(), "releasing held messages");
            for message in held.messages {
                self.send_message(&node, message);
            }
        }
    }

    /// Number of messages waiting for the location of `rank`.
    pub fn held_messages(&self, rank: NodeRank) -> usize {
        self.awaiting
            .lock()
            .unwrap()
            .get(&rank)
            .map_or(0, |held| held.messages.len())
    }

    /// Ask again for ranks whose lookup went unanswered and drop messages
    /// that waited longer than `lookup_expiry`.
    pub fn retry_lookups(&self) {
        let now = Instant::now();
        let mut retry = Vec::new();
        {
            let mut awaiting = self.awaiting.lock().unwrap();
            awaiting.retain(|&rank, held| {
                if now.duration_since(held.since) >= self.config.lookup_expiry {
                    log_error!(
                        PoolError::UnknownRank(rank),
                        dropped = held.messages.len(),
                        "held messages expired"
                    );
                    return false;
                }
                if now.duration_since(held.asked) >= self.config.lookup_retry {
                    held.asked = now;
                    retry.push(rank);
                }
                true
            });
        }
        for rank in retry {
            trace!(rank, "retrying rank lookup");
            self.request_lookup(rank);
        }
    }

    fn request_lookup(&self, rank: NodeRank) {
        if self.is_master() {
            return;
        }
        self.send_message(
            &self.master,
            Message::RankLookup {
                rank,
                requester: self.identifier,
            },
        );
    }

    fn send_message(&self, destination: &NodeId, message: Message) -> bool {
        let name = message.name();
        match wire::encode(message) {
            Ok((opcode, payload)) => {
                let sent = self.transport.send(destination, opcode, &payload);
                if !sent {
                    debug!(destination = %destination, msg = name, "transport refused message");
                }
                sent
            }
            Err(e) => {
                log_error!(e, msg = name, "failed to encode message");
                false
            }
        }
    }

    // --- Inbound ---

    fn on_message(&self, source: NodeId, opcode: u8, payload: &[u8]) {
        let message = match wire::decode(opcode, payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(source = %source, opcode, error = %e, "dropping undecodable message");
                return;
            }
        };
        trace!(source = %source, msg = message.name(), "message received");

        match message {
            Message::StealRequest(request) => {
                self.learn(request.source.node, source);
                match self.scheduler() {
                    Some(scheduler) => scheduler.handle_steal_request(request),
                    None => debug!("steal request before scheduler attached, dropped"),
                }
            }
            Message::StealReply(reply) => {
                self.learn(reply.source, source);
                match self.scheduler() {
                    Some(scheduler) => scheduler.handle_steal_reply(reply),
                    None => warn!(records = reply.records.len(), "steal reply without scheduler, activities lost"),
                }
            }
            Message::Event(event) => match self.scheduler() {
                Some(scheduler) => scheduler.handle_event(event),
                None => warn!(activity = %event.target, "event without scheduler, dropped"),
            },
            Message::RankRegister { rank, node } => {
                self.learn(rank, node);
                debug!(rank, node = %node, "rank registered");
            }
            Message::RankLookup { rank, requester } => self.answer_lookup(rank, requester),
            Message::RankLookupReply { rank, node } => self.learn(rank, node),
            Message::PoolRegister { tag, rank, node } => {
                self.learn(rank, node);
                match self.registry.register(&tag, rank) {
                    Some(info) => {
                        log_pool!(tag, "member_added", rank, timestamp = info.timestamp());
                    }
                    None => debug!(pool = %tag, rank, "registration kept until pool exists"),
                }
            }
            Message::PoolUpdateRequest { tag, timestamp } => {
                if let Some(info) = self.registry.newer_than(&tag, timestamp) {
                    self.send_message(&source, Message::PoolUpdateReply(info));
                }
            }
            Message::PoolUpdateReply(info) => {
                let tag = info.tag().to_string();
                let timestamp = info.timestamp();
                if self.registry.update(info) {
                    self.updated.store(true, Ordering::Release);
                    log_pool!(tag, "updated", timestamp);
                } else {
                    trace!(pool = %tag, timestamp, "stale pool update ignored");
                }
            }
            Message::TimeRequest => {
                self.send_message(&source, Message::TimeReply { time: now_nanos() });
            }
            Message::TimeReply { time } => self.time_replies.post((source, time)),
            Message::Ping => {
                self.send_message(&source, Message::Pong);
            }
            Message::Pong => self.pongs.post(source),
            Message::Nothing => self.arrivals.post(source),
            Message::Release => self.releases.post(source),
        }
    }

    fn answer_lookup(&self, rank: NodeRank, requester: NodeId) {
        match self.locations.get(rank) {
            Some(node) => {
                self.send_message(&requester, Message::RankLookupReply { rank, node });
            }
            None if self.is_master() => debug!(rank, "lookup for unknown rank dropped"),
            None => {
                self.send_message(&self.master, Message::RankLookup { rank, requester });
            }
        }
    }
}
