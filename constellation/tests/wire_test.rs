// Integration tests for constellation::wire

use constellation::wire::{self, Frame, Message, Opcode, RecordWire, StealReply, StealRequest};
use constellation::{
    ActivityIdentifier, ConstellationIdentifier, Event, ExecutorContext, NodeId, OrActivityContext, PoolInfo,
    StealPool, StealStrategy, UnitActivityContext, WireError,
};

fn aid(node: i32, sequence: u64) -> ActivityIdentifier {
    ActivityIdentifier::new(ConstellationIdentifier::new(node, 0), sequence, true)
}

fn through_wire(message: Message) -> Message {
    let (opcode, payload) = wire::encode(message).unwrap();
    wire::decode(opcode, &payload).unwrap()
}

#[test]
fn test_event_buffers_travel_outside_the_body() {
    let event = Event::new(aid(0, 1), aid(1, 2), b"body".to_vec()).with_buffers(vec![vec![1, 2, 3], vec![]]);
    let (opcode, payload) = wire::encode(Message::Event(event.clone())).unwrap();
    assert_eq!(opcode, Opcode::Event as u8);

    let frame = Frame::parse(&payload).unwrap();
    assert!(frame.body.is_some());
    assert_eq!(frame.buffers, vec![vec![1, 2, 3], vec![]]);

    assert_eq!(wire::decode(opcode, &payload).unwrap(), Message::Event(event));
}

#[test]
fn test_steal_reply_keeps_buffers_per_event() {
    let first = Event::new(aid(0, 1), aid(0, 7), vec![1]).with_buffers(vec![vec![10], vec![11]]);
    let second = Event::new(aid(0, 2), aid(0, 8), vec![2]).with_buffers(vec![vec![20]]);
    let reply = StealReply {
        source: 0,
        target: ConstellationIdentifier::new(1, 3),
        context: ExecutorContext::unit("X").unwrap(),
        pool: StealPool::World,
        records: vec![
            RecordWire {
                identifier: aid(0, 7),
                kind: "leaf".to_string(),
                state: vec![9, 9],
                events: vec![first],
            },
            RecordWire {
                identifier: aid(0, 8),
                kind: "leaf".to_string(),
                state: vec![],
                events: vec![second],
            },
        ],
    };

    let (opcode, payload) = wire::encode(Message::StealReply(reply.clone())).unwrap();
    assert_eq!(Frame::parse(&payload).unwrap().buffers.len(), 3);
    assert_eq!(wire::decode(opcode, &payload).unwrap(), Message::StealReply(reply));
}

#[test]
fn test_steal_request() {
    let request = StealRequest {
        source: ConstellationIdentifier::new(2, 1),
        context: ExecutorContext::or(["A", "B"], true).unwrap(),
        local_strategy: StealStrategy::Smallest,
        constellation_strategy: StealStrategy::Biggest,
        remote_strategy: StealStrategy::Range(1, 4),
        pool: StealPool::tag("render"),
        batch: 4,
    };
    assert_eq!(through_wire(Message::StealRequest(request.clone())), Message::StealRequest(request));
}

#[test]
fn test_pool_messages() {
    let node = NodeId::random();
    let mut info = PoolInfo::new("render", 0);
    info.add_member(4);

    for message in [
        Message::PoolRegister {
            tag: "render".to_string(),
            rank: 4,
            node,
        },
        Message::PoolUpdateRequest {
            tag: "render".to_string(),
            timestamp: 1,
        },
        Message::PoolUpdateReply(info),
        Message::RankLookup { rank: 4, requester: node },
        Message::TimeReply { time: -42 },
    ] {
        assert_eq!(through_wire(message.clone()), message);
    }
}

#[test]
fn test_bodiless_messages() {
    for message in [Message::Ping, Message::Pong, Message::Nothing, Message::Release, Message::TimeRequest] {
        let (opcode, payload) = wire::encode(message.clone()).unwrap();
        assert_eq!(Frame::parse(&payload).unwrap(), Frame::empty());
        assert_eq!(wire::decode(opcode, &payload).unwrap(), message);
    }
}

#[test]
fn test_unknown_opcode() {
    let payload = Frame::empty().to_bytes();
    assert_eq!(wire::decode(0, &payload), Err(WireError::UnknownOpcode(0)));
    assert_eq!(wire::decode(200, &payload), Err(WireError::UnknownOpcode(200)));
}

#[test]
fn test_missing_body() {
    let payload = Frame::empty().to_bytes();
    assert_eq!(
        wire::decode(Opcode::Event as u8, &payload),
        Err(WireError::MissingBody(Opcode::Event as u8))
    );
}

#[test]
fn test_surplus_buffers_are_rejected() {
    let event = Event::new(aid(0, 1), aid(1, 2), Vec::new());
    let (opcode, payload) = wire::encode(Message::Event(event)).unwrap();
    let mut frame = Frame::parse(&payload).unwrap();
    frame.buffers.push(vec![1]);

    assert!(matches!(
        wire::decode(opcode, &frame.to_bytes()),
        Err(WireError::BufferMismatch { carried: 1, .. })
    ));
}

#[test]
fn test_truncated_payload() {
    let (opcode, payload) = wire::encode(Message::TimeReply { time: 7 }).unwrap();
    assert!(matches!(
        wire::decode(opcode, &payload[..payload.len() - 2]),
        Err(WireError::Truncated { .. })
    ));
    assert!(matches!(wire::decode(opcode, &[]), Err(WireError::Truncated { .. })));
}

// Field-for-field copies of the context wire shapes, free of validation.
#[derive(serde::Serialize)]
struct LooseUnit {
    tag: String,
    rank: i64,
}

#[derive(serde::Serialize)]
struct LooseOr {
    members: Vec<LooseUnit>,
    ordered: bool,
}

fn bincode_bytes<T: serde::Serialize>(value: &T) -> Vec<u8> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).unwrap()
}

fn bincode_value<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::error::DecodeError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map(|(value, _)| value)
}

fn loose(tag: &str, rank: i64) -> LooseUnit {
    LooseUnit {
        tag: tag.to_string(),
        rank,
    }
}

#[test]
fn test_decoded_contexts_are_validated() {
    let empty_tag = bincode_bytes(&loose("", 1));
    assert!(bincode_value::<UnitActivityContext>(&empty_tag).is_err());

    let lonely = bincode_bytes(&LooseOr {
        members: vec![loose("A", 1)],
        ordered: false,
    });
    assert!(bincode_value::<OrActivityContext>(&lonely).is_err());

    // unordered members arrive in canonical order
    let pair = bincode_bytes(&LooseOr {
        members: vec![loose("B", 1), loose("A", 2)],
        ordered: false,
    });
    let decoded: OrActivityContext = bincode_value(&pair).unwrap();
    let local = OrActivityContext::new(
        vec![
            UnitActivityContext::new("A", 2).unwrap(),
            UnitActivityContext::new("B", 1).unwrap(),
        ],
        false,
    )
    .unwrap();
    assert_eq!(decoded, local);
    assert_eq!(decoded.members()[0].tag(), "A");
}
