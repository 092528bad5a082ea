//! # Wire Protocol
//!
//! Every message is a single-byte opcode plus a framed payload (see
//! [`frame`]). Payload bodies are `bincode`-encoded serde structs. Messages
//! are decoded once at the transport boundary into [`Message`] and handled
//! by exhaustive matching from then on.
//!
//! Events carry raw byte buffers. Those are stripped from the body and sent
//! as the frame's buffer list, in traversal order; each encoded event
//! records how many of the buffers are its own.

pub mod frame;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use constellation_api::{
    ActivityIdentifier, ConstellationIdentifier, Event, ExecutorContext, NodeId, NodeRank,
    StealPool, StealStrategy,
};

use crate::error::WireError;
use crate::pool::PoolInfo;
pub use frame::Frame;

/// Single-byte message tags.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    StealRequest = 1,
    StealReply = 2,
    Event = 3,
    RankRegister = 4,
    RankLookup = 5,
    RankLookupReply = 6,
    PoolRegister = 7,
    PoolUpdateRequest = 8,
    PoolUpdateReply = 9,
    TimeRequest = 10,
    TimeReply = 11,
    Ping = 12,
    Pong = 13,
    Nothing = 14,
    Release = 15,
}

impl TryFrom<u8> for Opcode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Opcode::StealRequest,
            2 => Opcode::StealReply,
            3 => Opcode::Event,
            4 => Opcode::RankRegister,
            5 => Opcode::RankLookup,
            6 => Opcode::RankLookupReply,
            7 => Opcode::PoolRegister,
            8 => Opcode::PoolUpdateRequest,
            9 => Opcode::PoolUpdateReply,
            10 => Opcode::TimeRequest,
            11 => Opcode::TimeReply,
            12 => Opcode::Ping,
            13 => Opcode::Pong,
            14 => Opcode::Nothing,
            15 => Opcode::Release,
            other => return Err(WireError::UnknownOpcode(other)),
        })
    }
}

/// A request for work on behalf of one executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealRequest {
    /// The requesting executor; the reply goes back to its node.
    pub source: ConstellationIdentifier,
    pub context: ExecutorContext,
    pub local_strategy: StealStrategy,
    pub constellation_strategy: StealStrategy,
    pub remote_strategy: StealStrategy,
    /// The pool the request was sent into.
    pub pool: StealPool,
    /// Maximum number of activities wanted.
    pub batch: u32,
}

/// A migrating activity: identity, factory key, encoded state and the
/// events that were sent to it before it was stolen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordWire {
    pub identifier: ActivityIdentifier,
    pub kind: String,
    pub state: Vec<u8>,
    pub events: Vec<Event>,
}

/// Zero or more activities for the executor that asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealReply {
    pub source: NodeRank,
    pub target: ConstellationIdentifier,
    pub context: ExecutorContext,
    pub pool: StealPool,
    pub records: Vec<RecordWire>,
}

/// Every message of the pool protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    StealRequest(StealRequest),
    StealReply(StealReply),
    Event(Event),
    RankRegister { rank: NodeRank, node: NodeId },
    RankLookup { rank: NodeRank, requester: NodeId },
    RankLookupReply { rank: NodeRank, node: NodeId },
    PoolRegister { tag: String, rank: NodeRank, node: NodeId },
    PoolUpdateRequest { tag: String, timestamp: u64 },
    PoolUpdateReply(PoolInfo),
    TimeRequest,
    TimeReply { time: i64 },
    Ping,
    Pong,
    Nothing,
    Release,
}

impl Message {
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::StealRequest(_) => Opcode::StealRequest,
            Message::StealReply(_) => Opcode::StealReply,
            Message::Event(_) => Opcode::Event,
            Message::RankRegister { .. } => Opcode::RankRegister,
            Message::RankLookup { .. } => Opcode::RankLookup,
            Message::RankLookupReply { .. } => Opcode::RankLookupReply,
            Message::PoolRegister { .. } => Opcode::PoolRegister,
            Message::PoolUpdateRequest { .. } => Opcode::PoolUpdateRequest,
            Message::PoolUpdateReply(_) => Opcode::PoolUpdateReply,
            Message::TimeRequest => Opcode::TimeRequest,
            Message::TimeReply { .. } => Opcode::TimeReply,
            Message::Ping => Opcode::Ping,
            Message::Pong => Opcode::Pong,
            Message::Nothing => Opcode::Nothing,
            Message::Release => Opcode::Release,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self.opcode() {
            Opcode::StealRequest => "steal-request",
            Opcode::StealReply => "steal-reply",
            Opcode::Event => "event",
            Opcode::RankRegister => "rank-register",
            Opcode::RankLookup => "rank-lookup",
            Opcode::RankLookupReply => "rank-lookup-reply",
            Opcode::PoolRegister => "pool-register",
            Opcode::PoolUpdateRequest => "pool-update-request",
            Opcode::PoolUpdateReply => "pool-update-reply",
            Opcode::TimeRequest => "time-request",
            Opcode::TimeReply => "time-reply",
            Opcode::Ping => "ping",
            Opcode::Pong => "pong",
            Opcode::Nothing => "nothing",
            Opcode::Release => "release",
        }
    }
}

// --- Wire bodies ---

#[derive(Serialize, Deserialize)]
struct EventBody {
    source: ActivityIdentifier,
    target: ActivityIdentifier,
    data: Vec<u8>,
    buffers: u32,
}

#[derive(Serialize, Deserialize)]
struct RecordBody {
    identifier: ActivityIdentifier,
    kind: String,
    state: Vec<u8>,
    events: Vec<EventBody>,
}

#[derive(Serialize, Deserialize)]
struct StealReplyBody {
    source: NodeRank,
    target: ConstellationIdentifier,
    context: ExecutorContext,
    pool: StealPool,
    records: Vec<RecordBody>,
}

#[derive(Serialize, Deserialize)]
struct RankBody {
    rank: NodeRank,
    node: NodeId,
}

#[derive(Serialize, Deserialize)]
struct PoolRegisterBody {
    tag: String,
    rank: NodeRank,
    node: NodeId,
}

#[derive(Serialize, Deserialize)]
struct PoolUpdateRequestBody {
    tag: String,
    timestamp: u64,
}

fn event_body(event: Event, buffers: &mut Vec<Vec<u8>>) -> EventBody {
    let count = event.buffers.len() as u32;
    buffers.extend(event.buffers);
    EventBody {
        source: event.source,
        target: event.target,
        data: event.data,
        buffers: count,
    }
}

fn event_from_body<I>(body: EventBody, buffers: &mut I, carried: usize) -> Result<Event, WireError>
where
    I: Iterator<Item = Vec<u8>>,
{
    let mut own = Vec::with_capacity(body.buffers as usize);
    for _ in 0..body.buffers {
        own.push(buffers.next().ok_or(WireError::BufferMismatch {
            declared: body.buffers as usize,
            carried,
        })?);
    }
    Ok(Event::new(body.source, body.target, body.data).with_buffers(own))
}

fn to_body<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| WireError::Encode(e.to_string()))
}

fn from_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| WireError::Decode(e.to_string()))
}

/// Encode a message into its opcode and framed payload.
pub fn encode(message: Message) -> Result<(u8, Vec<u8>), WireError> {
    let opcode = message.opcode() as u8;
    let mut buffers = Vec::new();
    let body = match message {
        Message::StealRequest(request) => Some(to_body(&request)?),
        Message::StealReply(reply) => {
            let records = reply
                .records
                .into_iter()
                .map(|record| RecordBody {
                    identifier: record.identifier,
                    kind: record.kind,
                    state: record.state,
                    events: record.events.into_iter().map(|e| event_body(e, &mut buffers)).collect(),
                })
                .collect();
            Some(to_body(&StealReplyBody {
                source: reply.source,
                target: reply.target,
                context: reply.context,
                pool: reply.pool,
                records,
            })?)
        }
        Message::Event(event) => Some(to_body(&event_body(event, &mut buffers))?),
        Message::RankRegister { rank, node }
        | Message::RankLookupReply { rank, node } => Some(to_body(&RankBody { rank, node })?),
        Message::RankLookup { rank, requester } => Some(to_body(&RankBody { rank, node: requester })?),
        Message::PoolRegister { tag, rank, node } => Some(to_body(&PoolRegisterBody { tag, rank, node })?),
        Message::PoolUpdateRequest { tag, timestamp } => Some(to_body(&PoolUpdateRequestBody { tag, timestamp })?),
        Message::PoolUpdateReply(info) => Some(to_body(&info)?),
        Message::TimeReply { time } => Some(to_body(&time)?),
        Message::TimeRequest | Message::Ping | Message::Pong | Message::Nothing | Message::Release => None,
    };
    Ok((opcode, Frame { body, buffers }.to_bytes()))
}

/// Decode an opcode and framed payload back into a message.
pub fn decode(opcode: u8, payload: &[u8]) -> Result<Message, WireError> {
    let opcode = Opcode::try_from(opcode)?;
    let frame = Frame::parse(payload)?;
    let carried = frame.buffers.len();
    let mut buffers = frame.buffers.into_iter();

    let body = || frame.body.as_deref().ok_or(WireError::MissingBody(opcode as u8));

    let message = match opcode {
        Opcode::StealRequest => Message::StealRequest(from_body(body()?)?),
        Opcode::StealReply => {
            let reply: StealReplyBody = from_body(body()?)?;
            let mut records = Vec::with_capacity(reply.records.len());
            for record in reply.records {
                let events = record
                    .events
                    .into_iter()
                    .map(|e| event_from_body(e, &mut buffers, carried))
                    .collect::<Result<Vec<_>, _>>()?;
                records.push(RecordWire {
                    identifier: record.identifier,
                    kind: record.kind,
                    state: record.state,
                    events,
                });
            }
            Message::StealReply(StealReply {
                source: reply.source,
                target: reply.target,
                context: reply.context,
                pool: reply.pool,
                records,
            })
        }
        Opcode::Event => Message::Event(event_from_body(from_body(body()?)?, &mut buffers, carried)?),
        Opcode::RankRegister => {
            let RankBody { rank, node } = from_body(body()?)?;
            Message::RankRegister { rank, node }
        }
        Opcode::RankLookup => {
            let RankBody { rank, node } = from_body(body()?)?;
            Message::RankLookup { rank, requester: node }
        }
        Opcode::RankLookupReply => {
            let RankBody { rank, node } = from_body(body()?)?;
            Message::RankLookupReply { rank, node }
        }
        Opcode::PoolRegister => {
            let PoolRegisterBody { tag, rank, node } = from_body(body()?)?;
            Message::PoolRegister { tag, rank, node }
        }
        Opcode::PoolUpdateRequest => {
            let PoolUpdateRequestBody { tag, timestamp } = from_body(body()?)?;
            Message::PoolUpdateRequest { tag, timestamp }
        }
        Opcode::PoolUpdateReply => Message::PoolUpdateReply(from_body(body()?)?),
        Opcode::TimeRequest => Message::TimeRequest,
        Opcode::TimeReply => Message::TimeReply { time: from_body(body()?)? },
        Opcode::Ping => Message::Ping,
        Opcode::Pong => Message::Pong,
        Opcode::Nothing => Message::Nothing,
        Opcode::Release => Message::Release,
    };

    if buffers.next().is_some() {
        return Err(WireError::BufferMismatch {
            declared: carried - buffers.len() - 1,
            carried,
        });
    }
    Ok(message)
}
