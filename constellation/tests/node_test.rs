// End-to-end tests: nodes running activities over the loopback transport

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{leaf_factory, mover_factory, wait_until, Gather, Leaf, Mover, Waiter, MOVER};
use constellation::pool::SchedulerRef;
use constellation::wire::{RecordWire, StealReply};
use constellation::{
    ActivityIdentifier, ConstellationConfig, ConstellationError, ConstellationIdentifier, ConstellationNode, Event,
    ExecutorConfig, ExecutorContext, LoopbackNetwork, NodeError, NodeState, StealPool, EXTERNAL_EXECUTOR,
};

const PATIENCE: Duration = Duration::from_secs(10);

fn config(tags: &[&str], pool: StealPool) -> ConstellationConfig {
    let executors = tags
        .iter()
        .map(|tag| {
            let mut executor = ExecutorConfig::with_context(ExecutorContext::unit(*tag).unwrap());
            executor.belongs_to = pool.clone();
            executor.steals_from = pool.clone();
            executor
        })
        .collect();
    ConstellationConfig {
        executors,
        steal_timeout: Duration::from_millis(200),
        updater_min_interval: Duration::from_millis(5),
        updater_max_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

#[test]
fn test_single_node_runs_everything() {
    let network = LoopbackNetwork::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let node = ConstellationNode::new(config(&["X", "X"], StealPool::World), network.join(), leaf_factory(ran.clone()))
        .unwrap();
    assert_eq!(node.state(), NodeState::Created);
    assert!(node.is_master());
    node.activate().unwrap();
    assert!(matches!(node.activate(), Err(NodeError::AlreadyRunning)));

    for value in 0..50 {
        let id = node.submit(Box::new(Leaf::new("X", value, None, ran.clone()))).unwrap();
        assert_eq!(id.origin, ConstellationIdentifier::new(node.rank(), EXTERNAL_EXECUTOR));
    }
    assert!(wait_until(PATIENCE, || node.completed() == 50));
    assert_eq!(ran.load(Ordering::SeqCst), 50);
    assert_eq!(node.pending(), 0);
    assert_eq!(node.live(), 0);

    node.shutdown().unwrap();
    assert_eq!(node.state(), NodeState::Stopped);
    assert!(matches!(node.shutdown(), Err(NodeError::NotRunning)));
    assert!(matches!(
        node.submit(Box::new(Leaf::new("X", 1, None, ran))),
        Err(NodeError::NotRunning)
    ));
}

#[test]
fn test_children_report_to_parent() {
    let network = LoopbackNetwork::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let node = ConstellationNode::new(config(&["X", "X"], StealPool::World), network.join(), leaf_factory(ran.clone()))
        .unwrap();
    node.activate().unwrap();

    let (tx, rx) = flume::unbounded();
    node.submit(Box::new(Gather::new("X", "X", 10, ran.clone(), tx))).unwrap();
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), 55);
    assert!(wait_until(PATIENCE, || node.completed() == 11));
    node.shutdown().unwrap();
}

#[test]
fn test_event_from_outside() {
    let network = LoopbackNetwork::new();
    let node = ConstellationNode::new(
        config(&["X"], StealPool::World),
        network.join(),
        leaf_factory(Arc::new(AtomicUsize::new(0))),
    )
    .unwrap();
    node.activate().unwrap();

    let (tx, rx) = flume::unbounded();
    let waiter = node.submit(Box::new(Waiter::new("X", tx))).unwrap();
    node.send(Event::new(waiter, waiter, b"ping".to_vec())).unwrap();
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), b"ping".to_vec());

    // completed activities no longer accept events
    assert!(wait_until(PATIENCE, || node.completed() == 1));
    assert!(node.send(Event::new(waiter, waiter, Vec::new())).is_err());
    node.shutdown().unwrap();
}

#[test]
fn test_unrunnable_restricted_activity_is_rejected() {
    let network = LoopbackNetwork::new();
    let node = ConstellationNode::new(
        config(&["X"], StealPool::World),
        network.join(),
        leaf_factory(Arc::new(AtomicUsize::new(0))),
    )
    .unwrap();
    let (tx, _rx) = flume::unbounded();
    let err = node.submit(Box::new(Waiter::new("Y", tx))).unwrap_err();
    assert!(matches!(err, NodeError::Constellation(ConstellationError::InvalidContext(_))));
    assert_eq!(node.pending(), 0);
}

#[test]
fn test_invalid_config_is_rejected() {
    let network = LoopbackNetwork::new();
    let mut bad = config(&["X"], StealPool::World);
    bad.executors.clear();
    let err = ConstellationNode::new(bad, network.join(), leaf_factory(Arc::new(AtomicUsize::new(0)))).unwrap_err();
    assert!(matches!(err, NodeError::ConfigError(_)));
}

/// Runs a parent on node A whose children only node B can run. Returns the
/// children's runs on A and B.
fn run_split(pool: StealPool) -> (usize, usize) {
    let network = LoopbackNetwork::new();
    let ran_a = Arc::new(AtomicUsize::new(0));
    let ran_b = Arc::new(AtomicUsize::new(0));
    let a = ConstellationNode::new(config(&["home"], pool.clone()), network.join(), leaf_factory(ran_a.clone()))
        .unwrap();
    let b = ConstellationNode::new(config(&["work"], pool), network.join(), leaf_factory(ran_b.clone())).unwrap();
    a.activate().unwrap();
    b.activate().unwrap();

    let (tx, rx) = flume::unbounded();
    a.submit(Box::new(Gather::new("home", "work", 20, ran_a.clone(), tx))).unwrap();
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), 210);
    assert!(wait_until(PATIENCE, || b.completed() == 20));
    assert!(wait_until(PATIENCE, || a.completed() == 1));

    // an event sent on B for an activity living on A follows it there
    let (tx, rx) = flume::unbounded();
    let waiter = a.submit(Box::new(Waiter::new("home", tx))).unwrap();
    let outsider = ActivityIdentifier::new(ConstellationIdentifier::new(b.rank(), EXTERNAL_EXECUTOR), 999, false);
    b.send(Event::new(outsider, waiter, b"across".to_vec())).unwrap();
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), b"across".to_vec());

    b.shutdown().unwrap();
    a.shutdown().unwrap();
    (ran_a.load(Ordering::SeqCst), ran_b.load(Ordering::SeqCst))
}

#[test]
fn test_work_stolen_across_world() {
    assert_eq!(run_split(StealPool::World), (0, 20));
}

#[test]
fn test_work_stolen_within_named_pool() {
    assert_eq!(run_split(StealPool::tag("render")), (0, 20));
}

#[test]
fn test_parked_events_travel_with_stolen_activity() {
    let network = LoopbackNetwork::new();
    let (tx, rx) = flume::unbounded();
    let a = ConstellationNode::new(config(&["home"], StealPool::World), network.join(), mover_factory(tx.clone()))
        .unwrap();
    let b = ConstellationNode::new(config(&["work"], StealPool::World), network.join(), mover_factory(tx.clone()))
        .unwrap();
    a.activate().unwrap();

    // only B can run it, and B is not stealing yet
    let mover = a.submit(Box::new(Mover::new("work", 2, tx))).unwrap();
    assert_eq!(a.pending(), 1);
    let outsider = ActivityIdentifier::new(ConstellationIdentifier::new(a.rank(), EXTERNAL_EXECUTOR), 500, false);
    a.send(Event::new(outsider, mover, b"parked".to_vec())).unwrap();

    b.activate().unwrap();
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), b"parked".to_vec());
    assert!(wait_until(PATIENCE, || b.live() == 1));
    assert_eq!(a.pending(), 0);

    // A keeps a forwarding entry for the activity it gave away
    a.send(Event::new(outsider, mover, b"forwarded".to_vec())).unwrap();
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), b"forwarded".to_vec());
    assert!(wait_until(PATIENCE, || b.completed() == 1));
    assert_eq!(b.live(), 0);
    assert_eq!(a.completed(), 0);

    b.shutdown().unwrap();
    a.shutdown().unwrap();
}

#[test]
fn test_event_ahead_of_steal_reply_is_replayed() {
    let network = LoopbackNetwork::new();
    let (tx, rx) = flume::unbounded();
    let thief = ConstellationNode::new(config(&["work"], StealPool::World), network.join(), mover_factory(tx))
        .unwrap();
    thief.activate().unwrap();

    let victim = 7;
    let moved = ActivityIdentifier::new(ConstellationIdentifier::new(victim, 0), 77, true);
    let outsider = ActivityIdentifier::new(ConstellationIdentifier::new(victim, EXTERNAL_EXECUTOR), 1, false);

    // the victim forwarded this before its reply arrived
    thief.handle_event(Event::new(outsider, moved, b"early".to_vec()));
    assert_eq!(thief.live(), 0);

    thief.handle_steal_reply(StealReply {
        source: victim,
        target: ConstellationIdentifier::new(thief.rank(), 0),
        context: ExecutorContext::unit("work").unwrap(),
        pool: StealPool::World,
        records: vec![RecordWire {
            identifier: moved,
            kind: MOVER.to_string(),
            state: Mover::state("work", 2),
            events: vec![Event::new(outsider, moved, b"carried".to_vec())],
        }],
    });

    // events that travelled with the record come first
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), b"carried".to_vec());
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), b"early".to_vec());
    assert!(wait_until(PATIENCE, || thief.completed() == 1));
    assert_eq!(thief.live(), 0);
    thief.shutdown().unwrap();
}
