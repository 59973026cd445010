//! Stable-memory event log. Events are CBOR-encoded and appended to an
//! `ic-stable-structures` log so the full history survives upgrades; the
//! in-memory state is rebuilt by replaying it (see `event::replay`).

use crate::event::Event;
use ic_stable_structures::{
    log::Log as StableLog,
    memory_manager::{MemoryId, MemoryManager, VirtualMemory},
    DefaultMemoryImpl,
};
use std::cell::RefCell;

const LOG_INDEX_MEMORY_ID: MemoryId = MemoryId::new(0);
const LOG_DATA_MEMORY_ID: MemoryId = MemoryId::new(1);

type VMem = VirtualMemory<DefaultMemoryImpl>;
type EventLog = StableLog<Vec<u8>, VMem, VMem>;

thread_local! {
    static MEMORY_MANAGER: RefCell<MemoryManager<DefaultMemoryImpl>> =
        RefCell::new(MemoryManager::init(DefaultMemoryImpl::default()));

    static EVENT_LOG: EventLog = MEMORY_MANAGER.with(|m| {
        StableLog::init(
            m.borrow().get(LOG_INDEX_MEMORY_ID),
            m.borrow().get(LOG_DATA_MEMORY_ID),
        )
        .expect("failed to initialize the event log")
    });
}

pub fn record_event(event: &Event) {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(event, &mut buf).expect("failed to encode an event");
    EVENT_LOG.with(|log| {
        log.append(&buf).expect("failed to append an event to the log");
    });
}

pub fn count_events() -> u64 {
    EVENT_LOG.with(|log| log.len())
}

pub fn events() -> Vec<Event> {
    EVENT_LOG.with(|log| {
        log.iter()
            .map(|bytes| {
                ciborium::de::from_reader(bytes.as_slice())
                    .expect("failed to decode an event from the log")
            })
            .collect()
    })
}
