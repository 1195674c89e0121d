//! One priority tier of the event log.
//!
//! Tiers form a chain ordered from lowest to highest priority. New events
//! always enter the first tier; when a tier runs out of space its oldest
//! event is either dropped (the tier is the event's final destination) or
//! moved on to the next tier.
//!
//! A tier stores its records in a fixed, preallocated byte ring. Each record
//! is an encoded TLV structure behind a two byte little-endian length, and
//! the prefix counts against the tier's capacity.

use super::data::{EventPriority, EventRecord, RecordHeader, StoredTimestamp, Timestamp};
use crate::error::{ImError, Result};
use crate::matter::tlv::TlvBuf;
use crate::matter::types::EventNumber;

/// Observer for events permanently dropped from a tier.
pub type EvictionHook = Box<dyn FnMut(&[u8]) + Send>;

/// Length prefix in front of every stored record
const LEN_PREFIX: usize = 2;

/// Reference to the next tier in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLink {
    pub index: usize,
    pub priority: EventPriority,
}

/// What evicting the oldest event of a tier requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EvictOutcome {
    /// The event was dropped; `record` holds its stored bytes.
    Dropped { record: Vec<u8> },
    /// The event belongs further down the chain and needs this much space
    /// in the next tier before it can leave.
    Relocate { space_needed: usize },
}

/// Fixed-capacity ring of length-prefixed records.
#[derive(Debug, Clone)]
struct EventRing {
    storage: Box<[u8]>,
    head: usize,
    used: usize,
    records: usize,
}

impl EventRing {
    fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity].into_boxed_slice(),
            head: 0,
            used: 0,
            records: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn available(&self) -> usize {
        self.capacity() - self.used
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        let cap = self.capacity();
        let start = offset % cap;
        let first = bytes.len().min(cap - start);
        self.storage[start..start + first].copy_from_slice(&bytes[..first]);
        self.storage[..bytes.len() - first].copy_from_slice(&bytes[first..]);
    }

    fn read_at(&self, offset: usize, out: &mut [u8]) {
        let cap = self.capacity();
        let start = offset % cap;
        let first = out.len().min(cap - start);
        out[..first].copy_from_slice(&self.storage[start..start + first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&self.storage[..rest]);
    }

    /// Store one record. Fails without side effects when it does not fit.
    fn push(&mut self, record: &[u8]) -> Result<()> {
        let len = u16::try_from(record.len())
            .map_err(|_| ImError::InvalidArgument("event record too large".into()))?;
        if LEN_PREFIX + record.len() > self.available() {
            return Err(ImError::BufferTooSmall);
        }
        let tail = self.head + self.used;
        self.write_at(tail, &len.to_le_bytes());
        self.write_at(tail + LEN_PREFIX, record);
        self.used += LEN_PREFIX + record.len();
        self.records += 1;
        Ok(())
    }

    /// Record starting at ring offset `offset` (relative to head), and the
    /// offset of the one after it.
    fn record_at(&self, offset: usize) -> (Vec<u8>, usize) {
        let mut prefix = [0u8; LEN_PREFIX];
        self.read_at(self.head + offset, &mut prefix);
        let len = u16::from_le_bytes(prefix) as usize;
        let mut record = vec![0; len];
        self.read_at(self.head + offset + LEN_PREFIX, &mut record);
        (record, offset + LEN_PREFIX + len)
    }

    fn front(&self) -> Option<Vec<u8>> {
        (self.records > 0).then(|| self.record_at(0).0)
    }

    fn pop_front(&mut self) -> Option<Vec<u8>> {
        if self.records == 0 {
            return None;
        }
        let (record, next) = self.record_at(0);
        self.head = (self.head + next) % self.capacity();
        self.used -= next;
        self.records -= 1;
        if self.records == 0 {
            self.head = 0;
        }
        Some(record)
    }

    /// Stored records, oldest first, copied out of the ring.
    fn iter(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        let mut offset = 0;
        (0..self.records).map(move |_| {
            let (record, next) = self.record_at(offset);
            offset = next;
            record
        })
    }
}

/// Undo point for appends to a tier that evicted nothing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferCheckpoint {
    used: usize,
    records: usize,
    first_event_timestamp: Timestamp,
    last_event_timestamp: Timestamp,
}

/// Complete copy of a tier's contents and bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct TierSnapshot {
    ring: EventRing,
    first_event_number: EventNumber,
    last_event_number: EventNumber,
    first_event_timestamp: Timestamp,
    last_event_timestamp: Timestamp,
}

/// Storage of one priority tier.
pub struct EventBuffer {
    priority: EventPriority,
    ring: EventRing,
    prev: Option<usize>,
    next: Option<TierLink>,
    first_event_number: EventNumber,
    last_event_number: EventNumber,
    first_event_timestamp: Timestamp,
    last_event_timestamp: Timestamp,
    eviction_hook: Option<EvictionHook>,
}

impl EventBuffer {
    /// Create an empty, unlinked tier.
    pub fn new(priority: EventPriority, capacity: usize) -> Self {
        Self {
            priority,
            ring: EventRing::new(capacity),
            prev: None,
            next: None,
            first_event_number: 1,
            last_event_number: 0,
            first_event_timestamp: Timestamp::default(),
            last_event_timestamp: Timestamp::default(),
            eviction_hook: None,
        }
    }

    pub(crate) fn link(&mut self, prev: Option<usize>, next: Option<TierLink>) {
        self.prev = prev;
        self.next = next;
    }

    pub fn priority(&self) -> EventPriority {
        self.priority
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn bytes_in_use(&self) -> usize {
        self.ring.used
    }

    pub fn available(&self) -> usize {
        self.ring.available()
    }

    pub fn event_count(&self) -> usize {
        self.ring.records
    }

    pub fn is_empty(&self) -> bool {
        self.ring.records == 0
    }

    pub fn prev(&self) -> Option<usize> {
        self.prev
    }

    pub fn next(&self) -> Option<TierLink> {
        self.next
    }

    /// Lowest event number that may still be stored here; every event of
    /// this tier's priorities numbered below it is gone.
    pub fn first_event_number(&self) -> EventNumber {
        self.first_event_number
    }

    pub fn last_event_number(&self) -> EventNumber {
        self.last_event_number
    }

    pub fn first_event_timestamp(&self) -> Timestamp {
        self.first_event_timestamp
    }

    pub fn last_event_timestamp(&self) -> Timestamp {
        self.last_event_timestamp
    }

    /// Whether events of priority `priority` stay in this tier for good.
    pub fn is_final_destination_for_priority(&self, priority: EventPriority) -> bool {
        !self.next.is_some_and(|next| next.priority <= priority)
    }

    /// Note that `number` was handed to an event whose home is this tier.
    pub fn record_vended(&mut self, number: EventNumber) {
        // no numbered event outstanding yet
        if self.first_event_number > self.last_event_number {
            self.first_event_number = number;
        }
        self.last_event_number = number;
    }

    /// Record the timestamp of an event about to be appended.
    ///
    /// The first event of an empty tier sets both ends of the range.
    pub fn update_first_last_event_time(&mut self, timestamp: Timestamp) {
        if self.is_empty() || self.first_event_timestamp.is_zero() {
            self.first_event_timestamp = timestamp;
        }
        self.last_event_timestamp = timestamp;
    }

    /// Forget the numbered event `number` and everything before it.
    pub fn remove_event(&mut self, number: EventNumber) {
        self.first_event_number = self.first_event_number.max(number.saturating_add(1));
    }

    pub fn set_eviction_hook(&mut self, hook: EvictionHook) {
        self.eviction_hook = Some(hook);
    }

    /// Hand a dropped record to the eviction hook.
    pub(crate) fn notify_evicted(&mut self, record: &[u8]) {
        if let Some(hook) = self.eviction_hook.as_mut() {
            hook(record);
        }
    }

    pub(crate) fn checkpoint(&self) -> BufferCheckpoint {
        BufferCheckpoint {
            used: self.ring.used,
            records: self.ring.records,
            first_event_timestamp: self.first_event_timestamp,
            last_event_timestamp: self.last_event_timestamp,
        }
    }

    /// Undo every append made since `checkpoint`.
    ///
    /// Only valid while nothing was evicted from the tier in between.
    pub(crate) fn restore(&mut self, checkpoint: BufferCheckpoint) {
        self.ring.used = checkpoint.used;
        self.ring.records = checkpoint.records;
        if self.ring.records == 0 {
            self.ring.head = 0;
        }
        self.first_event_timestamp = checkpoint.first_event_timestamp;
        self.last_event_timestamp = checkpoint.last_event_timestamp;
    }

    pub(crate) fn snapshot(&self) -> TierSnapshot {
        TierSnapshot {
            ring: self.ring.clone(),
            first_event_number: self.first_event_number,
            last_event_number: self.last_event_number,
            first_event_timestamp: self.first_event_timestamp,
            last_event_timestamp: self.last_event_timestamp,
        }
    }

    pub(crate) fn restore_snapshot(&mut self, snapshot: TierSnapshot) {
        self.ring = snapshot.ring;
        self.first_event_number = snapshot.first_event_number;
        self.last_event_number = snapshot.last_event_number;
        self.first_event_timestamp = snapshot.first_event_timestamp;
        self.last_event_timestamp = snapshot.last_event_timestamp;
    }

    /// Encode and append one record.
    ///
    /// The timestamp is stored relative to the previous event of this tier
    /// when possible.
    pub(crate) fn append(
        &mut self,
        header: &RecordHeader,
        timestamp: Timestamp,
        data: Option<&[u8]>,
    ) -> Result<()> {
        let previous = (!self.is_empty()).then_some(self.last_event_timestamp);
        let stored = StoredTimestamp::relative_to(timestamp, previous);

        let mut w = TlvBuf::new(self.available().saturating_sub(LEN_PREFIX));
        EventRecord::encode(&mut w, header, stored, data).map_err(|e| match ImError::from(e) {
            e if e.is_no_space() => ImError::BufferTooSmall,
            e => e,
        })?;

        self.ring.push(w.as_slice())?;
        self.update_first_last_event_time(timestamp);
        Ok(())
    }

    /// Decode the oldest record together with its absolute timestamp.
    pub(crate) fn oldest(&self) -> Result<Option<(EventRecord, Timestamp)>> {
        let Some(raw) = self.ring.front() else {
            return Ok(None);
        };
        let record = EventRecord::decode(&raw)?;
        let timestamp = match record.timestamp {
            StoredTimestamp::Absolute(ts) => ts,
            StoredTimestamp::Delta(..) => self.first_event_timestamp,
        };
        Ok(Some((record, timestamp)))
    }

    /// Decode every record with its absolute timestamp, oldest first.
    pub(crate) fn for_each_record<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&EventRecord, Timestamp) -> Result<()>,
    {
        let mut previous = self.first_event_timestamp;
        for (i, raw) in self.ring.iter().enumerate() {
            let record = EventRecord::decode(&raw)?;
            let timestamp = match (i, record.timestamp) {
                (_, StoredTimestamp::Absolute(ts)) => ts,
                (0, StoredTimestamp::Delta(..)) => self.first_event_timestamp,
                (_, delta) => delta.resolve(previous),
            };
            f(&record, timestamp)?;
            previous = timestamp;
        }
        Ok(())
    }

    /// Free the oldest record without any bookkeeping of event numbers.
    ///
    /// Returns the stored bytes of the record.
    pub(crate) fn discard_oldest(&mut self) -> Result<Option<Vec<u8>>> {
        let evicted_ts = match self.oldest()? {
            Some((_, ts)) => ts,
            None => return Ok(None),
        };
        let raw = self.ring.pop_front();

        match self.ring.front() {
            Some(next) => {
                let stored = EventRecord::decode(&next)?.timestamp;
                self.first_event_timestamp = stored.resolve(evicted_ts);
            }
            None => {
                self.first_event_timestamp = Timestamp::default();
                self.last_event_timestamp = Timestamp::default();
            }
        }
        Ok(raw)
    }

    /// Evict the oldest event, or report that it must move on first.
    ///
    /// A dropped record is returned, not yet shown to the eviction hook.
    pub(crate) fn evict_event(&mut self) -> Result<EvictOutcome> {
        let (header, space_needed) = match self.oldest()? {
            Some((record, timestamp)) => {
                let size = record_size(
                    &record.header,
                    StoredTimestamp::Absolute(timestamp),
                    record.data.as_deref(),
                )?;
                (record.header, size)
            }
            None => {
                return Err(ImError::IncorrectState(format!(
                    "nothing to evict from the {:?} tier",
                    self.priority
                )));
            }
        };

        if !self.is_final_destination_for_priority(header.priority) {
            return Ok(EvictOutcome::Relocate { space_needed });
        }

        self.remove_event(header.event_number);
        let record = self.discard_oldest()?.unwrap_or_default();
        Ok(EvictOutcome::Dropped { record })
    }

    /// Move the oldest event of this tier into `next`.
    pub(crate) fn copy_to_next_buffer(&mut self, next: &mut EventBuffer) -> Result<()> {
        let Some((record, timestamp)) = self.oldest()? else {
            return Ok(());
        };
        next.append(&record.header, timestamp, record.data.as_deref())?;
        self.discard_oldest()?;
        Ok(())
    }

    /// Re-encode every record `f` wants to change.
    ///
    /// The tier is rebuilt in a fresh ring, swapped in only once every
    /// record was written.
    pub(crate) fn rewrite_records<F>(&mut self, mut f: F) -> Result<usize>
    where
        F: FnMut(&RecordHeader) -> Option<RecordHeader>,
    {
        let mut ring = EventRing::new(self.capacity());
        let mut rewritten = 0;
        for raw in self.ring.iter() {
            let record = EventRecord::decode(&raw)?;
            match f(&record.header) {
                Some(header) => {
                    let mut w = TlvBuf::unbounded();
                    EventRecord::encode(&mut w, &header, record.timestamp, record.data.as_deref())?;
                    ring.push(w.as_slice())?;
                    rewritten += 1;
                }
                None => ring.push(&raw)?,
            }
        }
        self.ring = ring;
        Ok(rewritten)
    }
}

/// Space a record takes in a tier, length prefix included.
pub(crate) fn record_size(
    header: &RecordHeader,
    timestamp: StoredTimestamp,
    data: Option<&[u8]>,
) -> Result<usize> {
    let mut w = TlvBuf::unbounded();
    EventRecord::encode(&mut w, header, timestamp, data)?;
    Ok(LEN_PREFIX + w.len())
}
