//! The resource table: named audio resources, each a ring plus its
//! attached reader set, shared between the ingest writer and the relay
//! fan-out server.

use crate::{config::Config, ring::AudioRing};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::Notify;

/// A connected listener's position within a resource's ring.
///
/// The resource owns readers; a reader only ever looks up its resource by
/// name, never holds it directly, so resource removal cannot leave a
/// reader with a dangling strong reference.
pub struct Reader {
    session_no: u64,
    offset: AtomicU64,
    hungry: AtomicBool,
}

impl Reader {
    fn new(session_no: u64, offset: u64) -> Self {
        Reader {
            session_no,
            offset: AtomicU64::new(offset),
            hungry: AtomicBool::new(true),
        }
    }

    /// The session number assigned when this reader's connection was accepted.
    pub fn session_no(&self) -> u64 {
        self.session_no
    }

    /// This reader's current absolute offset into the resource's ring.
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    fn set_offset(&self, offset: u64) {
        self.offset.store(offset, Ordering::SeqCst);
    }

    /// Whether the transport can currently accept another block write.
    pub fn is_hungry(&self) -> bool {
        self.hungry.load(Ordering::SeqCst)
    }

    /// Sets the hungry bit; the server calls this as the transport drains
    /// and refills its send buffer.
    pub fn set_hungry(&self, hungry: bool) {
        self.hungry.store(hungry, Ordering::SeqCst);
    }
}

/// A named live audio stream: one ring plus its reader set.
pub struct AudioResource {
    name: String,
    ring: Mutex<AudioRing>,
    readers: Mutex<HashMap<u64, Arc<Reader>>>,
    notify: Notify,
    closed: AtomicBool,
}

impl AudioResource {
    fn new(name: String, config: &Config) -> Self {
        AudioResource {
            name,
            ring: Mutex::new(AudioRing::new(config.block_size, config.block_count, 0)),
            readers: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// The resource's name, i.e. the broadcaster's resource identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches a new reader positioned at the ring's current middle
    /// offset, per the relay admission rule, and returns it alongside its
    /// `begin_offset`.
    pub fn attach(&self, session_no: u64) -> (Arc<Reader>, u64) {
        let begin_offset = self.ring.lock().middle();
        let reader = Arc::new(Reader::new(session_no, begin_offset));
        self.readers.lock().insert(session_no, reader.clone());
        (reader, begin_offset)
    }

    /// Detaches `session_no`'s reader, e.g. once its connection closes.
    pub fn detach(&self, session_no: u64) {
        self.readers.lock().remove(&session_no);
    }

    /// Appends `chunk` to the ring; wakes any producer loops waiting on
    /// new data whenever at least one whole block completed.
    pub fn write(&self, chunk: &[u8]) -> usize {
        let blocks = self.ring.lock().write(chunk);
        if blocks > 0 {
            self.notify.notify_waiters();
        }
        blocks
    }

    /// Reads the block at `offset`, advancing `reader`'s stored offset and
    /// hungry bit to match the outcome.
    pub fn read_for(&self, reader: &Reader) -> Option<Vec<u8>> {
        let (block, new_offset) = self.ring.lock().read(reader.offset());
        match block {
            Some(b) => {
                reader.set_offset(new_offset);
                reader.set_hungry(false);
                Some(b)
            },
            None => None,
        }
    }

    /// Absolute offset of the oldest byte currently held.
    pub fn base(&self) -> u64 {
        self.ring.lock().base()
    }

    /// The notification point producer loops wait on between writes.
    pub fn notify_handle(&self) -> &Notify {
        &self.notify
    }

    /// Marks this resource closed and wakes every waiting producer loop so
    /// it can observe [`is_closed`][AudioResource::is_closed] and exit.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether [`close`][AudioResource::close] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of attached readers.
    pub fn reader_count(&self) -> usize {
        self.readers.lock().len()
    }
}

/// The server-wide `{name -> AudioResource}` table. Mutated only by
/// [`add`][ResourceTable::add]/[`remove`][ResourceTable::remove]; readers
/// look up by name but never mutate the table itself.
pub struct ResourceTable {
    config: Config,
    resources: Mutex<HashMap<String, Arc<AudioResource>>>,
}

impl ResourceTable {
    /// Creates an empty table; every resource it creates uses `config`'s
    /// block size and count.
    pub fn new(config: Config) -> Self {
        ResourceTable {
            config,
            resources: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a fresh resource under `name`, replacing any existing entry.
    pub fn add(&self, name: &str) -> Arc<AudioResource> {
        let resource = Arc::new(AudioResource::new(name.to_string(), &self.config));
        self.resources.lock().insert(name.to_string(), resource.clone());
        resource
    }

    /// Returns the existing resource for `name`, creating one if absent.
    ///
    /// Whether a reappearing broadcaster should reuse or replace its prior
    /// resource was left inconsistent upstream; this pins the idempotent
    /// "reuse if present" behavior as the transport contract.
    pub fn add_or_get(&self, name: &str) -> Arc<AudioResource> {
        if let Some(existing) = self.resources.lock().get(name) {
            return existing.clone();
        }
        self.add(name)
    }

    /// Looks up a resource by name without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<AudioResource>> {
        self.resources.lock().get(name).cloned()
    }

    /// Detaches `name` from the table and marks it closed so every
    /// in-flight produce loop observes the closure and tears itself down.
    pub fn remove(&self, name: &str) -> Option<Arc<AudioResource>> {
        let resource = self.resources.lock().remove(name);
        if let Some(resource) = &resource {
            resource.close();
        }
        resource
    }

    /// Appends `chunk` to the named resource, if it exists.
    pub fn write(&self, name: &str, chunk: &[u8]) {
        if let Some(resource) = self.get(name) {
            resource.write(chunk);
        }
    }

    /// Sum of reader-set sizes across every resource.
    pub fn get_count_of_streams(&self) -> usize {
        self.resources.lock().values().map(|r| r.reader_count()).sum()
    }
}
