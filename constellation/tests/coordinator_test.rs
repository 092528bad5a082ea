// Multi-node pool coordination over the loopback transport

mod common;

use std::sync::{Arc, Weak};
use std::time::Duration;

use common::wait_until;
use constellation::pool::{CoordinatorConfig, PoolCoordinator, SchedulerRef, Victim};
use constellation::wire::{StealReply, StealRequest};
use constellation::{
    ActivityIdentifier, ConstellationIdentifier, Event, LoopbackNetwork, LoopbackTransport, NodeError,
    PoolError, StealPool, Transport,
};
use flume::{Receiver, Sender};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        closed_pool: false,
        activation_timeout: Duration::from_secs(5),
        election_timeout: Duration::from_secs(1),
        updater_min_interval: Duration::from_millis(5),
        updater_max_interval: Duration::from_millis(50),
        lookup_retry: Duration::from_millis(50),
        lookup_expiry: Duration::from_secs(5),
    }
}

/// Collects events passed up by a coordinator.
struct Inbox(Sender<Event>);

impl SchedulerRef for Inbox {
    fn handle_steal_request(&self, _request: StealRequest) {}

    fn handle_steal_reply(&self, _reply: StealReply) {}

    fn handle_event(&self, event: Event) {
        let _ = self.0.send(event);
    }
}

fn attach_inbox(coordinator: &PoolCoordinator) -> (Arc<Inbox>, Receiver<Event>) {
    let (tx, rx) = flume::unbounded();
    let inbox = Arc::new(Inbox(tx));
    let weak: Weak<dyn SchedulerRef> = Arc::downgrade(&inbox) as Weak<dyn SchedulerRef>;
    coordinator.set_scheduler(weak);
    (inbox, rx)
}

fn start(network: &LoopbackNetwork, config: CoordinatorConfig) -> (Arc<LoopbackTransport>, Arc<PoolCoordinator>) {
    let transport = network.join();
    let coordinator = PoolCoordinator::new(transport.clone(), config);
    (transport, coordinator)
}

#[test]
fn test_ranks_and_master() {
    let network = LoopbackNetwork::new();
    let (_, a) = start(&network, config());
    let (_, b) = start(&network, config());

    assert_eq!(a.rank(), 0);
    assert_eq!(b.rank(), 1);
    assert!(a.is_master());
    assert!(!b.is_master());

    a.activate().unwrap();
    b.activate().unwrap();
    assert!(matches!(a.activate(), Err(NodeError::AlreadyRunning)));

    // the master learns every member from its registration
    assert!(wait_until(Duration::from_secs(5), || a.locations().get(1) == Some(b.identifier())));
    a.shutdown();
    b.shutdown();
}

#[test]
fn test_lookup_through_master_releases_held_event() {
    let network = LoopbackNetwork::new();
    let (_, a) = start(&network, config());
    let (_, b) = start(&network, config());
    let (_, c) = start(&network, config());
    let (_inbox, events) = attach_inbox(&b);

    a.activate().unwrap();
    b.activate().unwrap();
    c.activate().unwrap();
    assert!(wait_until(Duration::from_secs(5), || a.locations().get(b.rank()).is_some()));
    assert!(c.locations().get(b.rank()).is_none());

    let target = ActivityIdentifier::new(ConstellationIdentifier::new(b.rank(), 0), 0, true);
    let source = ActivityIdentifier::new(ConstellationIdentifier::new(c.rank(), 0), 0, false);
    let event = Event::new(source, target, b"hello".to_vec());
    assert!(c.send_event(b.rank(), event.clone()));

    let delivered = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(delivered, event);
    assert_eq!(c.locations().get(b.rank()), Some(b.identifier()));

    for coordinator in [a, b, c] {
        coordinator.shutdown();
    }
}

#[test]
fn test_pool_membership_converges() {
    let network = LoopbackNetwork::new();
    let (_, a) = start(&network, config());
    let (_, b) = start(&network, config());
    let (_, c) = start(&network, config());
    for coordinator in [&a, &b, &c] {
        coordinator.activate().unwrap();
    }

    a.register_with_pool("render").unwrap();
    b.register_with_pool("render").unwrap();
    c.follow_pool("render").unwrap();

    let converged = |coordinator: &PoolCoordinator| {
        coordinator
            .pool("render")
            .map(|info| info.members() == [0, 1])
            .unwrap_or(false)
    };
    assert!(wait_until(Duration::from_secs(5), || converged(&a)));
    assert!(wait_until(Duration::from_secs(5), || converged(&b)));
    assert!(wait_until(Duration::from_secs(5), || converged(&c)));
    assert_eq!(c.pool("render").unwrap().master(), Some(0));

    for coordinator in [a, b, c] {
        coordinator.shutdown();
    }
}

#[test]
fn test_follow_unknown_pool_fails() {
    let network = LoopbackNetwork::new();
    let mut config = config();
    config.election_timeout = Duration::from_millis(20);
    let (_, a) = start(&network, config);
    assert_eq!(
        a.follow_pool("nobody"),
        Err(PoolError::ElectionUnresolved("nobody".to_string()))
    );
}

#[test]
fn test_closed_pool_handshake() {
    let network = LoopbackNetwork::new();
    let mut config = config();
    config.closed_pool = true;
    let (_, a) = start(&network, config.clone());
    let (_, b) = start(&network, config);

    let member = std::thread::spawn(move || {
        b.activate().unwrap();
        b
    });
    a.activate().unwrap();
    let b = member.join().unwrap();

    assert!(a.is_active());
    assert!(b.is_active());
    assert!(a.time_offset(b.rank()).is_some());
    a.shutdown();
    b.shutdown();
}

#[test]
fn test_closed_pool_times_out_on_silent_peer() {
    let network = LoopbackNetwork::new();
    let mut config = config();
    config.closed_pool = true;
    config.activation_timeout = Duration::from_millis(100);
    let (_, a) = start(&network, config);
    // joins the group but never activates
    let silent = network.join();

    let err = a.activate().unwrap_err();
    assert!(matches!(err, NodeError::Pool(PoolError::ActivationTimeout { .. })));
    assert!(!a.is_active());
    silent.end();
}

#[test]
fn test_held_events_keep_their_order() {
    let network = LoopbackNetwork::new();
    let (_, a) = start(&network, config());
    let (_, b) = start(&network, config());
    let (_, c) = start(&network, config());
    let (_inbox, events) = attach_inbox(&b);
    for coordinator in [&a, &b, &c] {
        coordinator.activate().unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || a.locations().get(b.rank()).is_some()));

    let target = ActivityIdentifier::new(ConstellationIdentifier::new(b.rank(), 0), 0, true);
    let source = ActivityIdentifier::new(ConstellationIdentifier::new(c.rank(), 0), 0, false);
    let sent: Vec<Event> = (0u8..20).map(|i| Event::new(source, target, vec![i])).collect();
    // the first ones are held for the lookup, later ones race its answer
    for event in &sent {
        assert!(c.send_event(b.rank(), event.clone()));
    }

    let received: Vec<Event> = (0..sent.len())
        .map(|_| events.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert_eq!(received, sent);
    assert_eq!(c.held_messages(b.rank()), 0);

    for coordinator in [a, b, c] {
        coordinator.shutdown();
    }
}

#[test]
fn test_unanswered_lookup_expires_held_messages() {
    let network = LoopbackNetwork::new();
    let mut config = config();
    config.lookup_retry = Duration::from_millis(10);
    config.lookup_expiry = Duration::from_millis(150);
    let (_, a) = start(&network, config.clone());
    let (_, b) = start(&network, config);
    a.activate().unwrap();
    b.activate().unwrap();

    // no node ever takes rank 42
    let target = ActivityIdentifier::new(ConstellationIdentifier::new(42, 0), 0, true);
    let source = ActivityIdentifier::new(ConstellationIdentifier::new(b.rank(), 0), 0, false);
    assert!(b.send_event(42, Event::new(source, target, Vec::new())));
    assert_eq!(b.held_messages(42), 1);

    assert!(wait_until(Duration::from_secs(5), || b.held_messages(42) == 0));
    a.shutdown();
    b.shutdown();
}

#[test]
fn test_world_victims_come_from_current_members() {
    let network = LoopbackNetwork::new();
    let (_, a) = start(&network, config());
    let (_, b) = start(&network, config());
    let (gone, _c) = start(&network, config());
    gone.end();

    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        assert_eq!(a.select_victim(&StealPool::World, &mut rng), Some(Victim::Node(b.identifier())));
    }
    b.shutdown();
    assert_eq!(b.select_victim(&StealPool::World, &mut rng), Some(Victim::Node(a.identifier())));
}
