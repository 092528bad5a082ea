// Shared test activities for the runtime integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bincode::config;
use constellation::{
    Activity, ActivityContext, ActivityError, ActivityFactory, ActivityIdentifier, Constellation,
    ConstellationError, ConstellationResult, Event, Step,
};
use flume::Sender;

pub const LEAF: &str = "leaf";
pub const GATHER: &str = "gather";
pub const WAITER: &str = "waiter";
pub const MOVER: &str = "mover";

fn encode<T: serde::Serialize>(value: &T) -> ConstellationResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config::standard())
        .map_err(|e| ConstellationError::Encoding(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> ConstellationResult<T> {
    bincode::serde::decode_from_slice(bytes, config::standard())
        .map(|(value, _)| value)
        .map_err(|e| ConstellationError::Encoding(e.to_string()))
}

/// Finishes right away, reporting `value` to `parent` if there is one.
pub struct Leaf {
    context: ActivityContext,
    value: u64,
    parent: Option<ActivityIdentifier>,
    ran: Arc<AtomicUsize>,
}

impl Leaf {
    pub fn new(tag: &str, value: u64, parent: Option<ActivityIdentifier>, ran: Arc<AtomicUsize>) -> Self {
        Self {
            context: ActivityContext::unit(tag, value as i64).unwrap(),
            value,
            parent,
            ran,
        }
    }
}

impl Activity for Leaf {
    fn kind(&self) -> &'static str {
        LEAF
    }

    fn context(&self) -> &ActivityContext {
        &self.context
    }

    fn initialize(&mut self, cx: &mut dyn Constellation) -> Result<Step, ActivityError> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        if let Some(parent) = self.parent {
            cx.send(Event::new(cx.activity(), parent, self.value.to_le_bytes().to_vec()));
        }
        Ok(Step::Finish)
    }

    fn encode(&self) -> ConstellationResult<Vec<u8>> {
        encode(&(&self.context, self.value, self.parent))
    }
}

/// Submits `count` leaves tagged `child_tag`, sums what they report and
/// sends the total to `done` when all of them did.
pub struct Gather {
    context: ActivityContext,
    child_tag: String,
    count: u64,
    received: u64,
    sum: u64,
    ran: Arc<AtomicUsize>,
    done: Sender<u64>,
}

impl Gather {
    pub fn new(tag: &str, child_tag: &str, count: u64, ran: Arc<AtomicUsize>, done: Sender<u64>) -> Self {
        Self {
            context: ActivityContext::unit(tag, 0).unwrap(),
            child_tag: child_tag.to_string(),
            count,
            received: 0,
            sum: 0,
            ran,
            done,
        }
    }
}

impl Activity for Gather {
    fn kind(&self) -> &'static str {
        GATHER
    }

    fn context(&self) -> &ActivityContext {
        &self.context
    }

    fn may_be_stolen(&self) -> bool {
        false
    }

    fn expects_events(&self) -> bool {
        true
    }

    fn initialize(&mut self, cx: &mut dyn Constellation) -> Result<Step, ActivityError> {
        let me = cx.activity();
        for value in 1..=self.count {
            cx.submit(Box::new(Leaf::new(&self.child_tag, value, Some(me), Arc::clone(&self.ran))));
        }
        Ok(Step::Suspend)
    }

    fn process(&mut self, _cx: &mut dyn Constellation, event: Event) -> Result<Step, ActivityError> {
        let bytes: [u8; 8] = event
            .data
            .as_slice()
            .try_into()
            .map_err(|_| ActivityError::new("malformed report"))?;
        self.sum += u64::from_le_bytes(bytes);
        self.received += 1;
        if self.received == self.count {
            Ok(Step::Finish)
        } else {
            Ok(Step::Suspend)
        }
    }

    fn cleanup(&mut self, _cx: &mut dyn Constellation) -> Result<(), ActivityError> {
        let _ = self.done.send(self.sum);
        Ok(())
    }

    fn encode(&self) -> ConstellationResult<Vec<u8>> {
        Err(ConstellationError::Encoding("gather never migrates".to_string()))
    }
}

/// Waits for one event and forwards its data to `done`.
pub struct Waiter {
    context: ActivityContext,
    done: Sender<Vec<u8>>,
}

impl Waiter {
    pub fn new(tag: &str, done: Sender<Vec<u8>>) -> Self {
        Self {
            context: ActivityContext::unit(tag, 0).unwrap(),
            done,
        }
    }
}

impl Activity for Waiter {
    fn kind(&self) -> &'static str {
        WAITER
    }

    fn context(&self) -> &ActivityContext {
        &self.context
    }

    fn may_be_stolen(&self) -> bool {
        false
    }

    fn expects_events(&self) -> bool {
        true
    }

    fn initialize(&mut self, _cx: &mut dyn Constellation) -> Result<Step, ActivityError> {
        Ok(Step::Suspend)
    }

    fn process(&mut self, _cx: &mut dyn Constellation, event: Event) -> Result<Step, ActivityError> {
        let _ = self.done.send(event.data);
        Ok(Step::Finish)
    }

    fn encode(&self) -> ConstellationResult<Vec<u8>> {
        Err(ConstellationError::Encoding("waiter never migrates".to_string()))
    }
}

/// Stealable; passes the data of each of its `need` events to `done`,
/// then finishes.
pub struct Mover {
    context: ActivityContext,
    need: u32,
    done: Sender<Vec<u8>>,
}

impl Mover {
    pub fn new(tag: &str, need: u32, done: Sender<Vec<u8>>) -> Self {
        Self {
            context: ActivityContext::unit(tag, 0).unwrap(),
            need,
            done,
        }
    }

    /// Wire state of a mover, as a victim would export it.
    pub fn state(tag: &str, need: u32) -> Vec<u8> {
        encode(&(ActivityContext::unit(tag, 0).unwrap(), need)).unwrap()
    }
}

impl Activity for Mover {
    fn kind(&self) -> &'static str {
        MOVER
    }

    fn context(&self) -> &ActivityContext {
        &self.context
    }

    fn expects_events(&self) -> bool {
        true
    }

    fn initialize(&mut self, _cx: &mut dyn Constellation) -> Result<Step, ActivityError> {
        Ok(Step::Suspend)
    }

    fn process(&mut self, _cx: &mut dyn Constellation, event: Event) -> Result<Step, ActivityError> {
        let _ = self.done.send(event.data);
        self.need = self.need.saturating_sub(1);
        if self.need == 0 {
            Ok(Step::Finish)
        } else {
            Ok(Step::Suspend)
        }
    }

    fn encode(&self) -> ConstellationResult<Vec<u8>> {
        encode(&(&self.context, self.need))
    }
}

/// A factory that rebuilds movers, all reporting to `done`.
pub fn mover_factory(done: Sender<Vec<u8>>) -> ActivityFactory {
    let mut factory = ActivityFactory::new();
    factory.register(MOVER, move |bytes| {
        let (context, need): (ActivityContext, u32) = decode(bytes)?;
        Ok(Box::new(Mover {
            context,
            need,
            done: done.clone(),
        }) as Box<dyn Activity>)
    });
    factory
}

/// A factory that rebuilds leaves, counting their runs in `ran`.
pub fn leaf_factory(ran: Arc<AtomicUsize>) -> ActivityFactory {
    let mut factory = ActivityFactory::new();
    factory.register(LEAF, move |bytes| {
        let (context, value, parent): (ActivityContext, u64, Option<ActivityIdentifier>) = decode(bytes)?;
        Ok(Box::new(Leaf {
            context,
            value,
            parent,
            ran: Arc::clone(&ran),
        }) as Box<dyn Activity>)
    });
    factory
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
