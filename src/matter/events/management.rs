//! Tiered circular event log.
//!
//! `EventManagement` owns the chain of [`EventBuffer`] tiers. Events are
//! appended to the first (lowest priority) tier; making room there evicts
//! the oldest events, which are either dropped at their final tier or moved
//! on to the next one, possibly cascading through the whole chain.
//!
//! Event numbers come from one counter shared by every priority, so a
//! number identifies a single event across the whole log.
//!
//! All state sits behind one mutex: logging, fetching, fabric removal and
//! shutdown never observe a half-finished cascade.

use super::buffer::{EventBuffer, EvictOutcome, EvictionHook, TierLink, record_size};
use super::counter::{EventNumberCounter, MonotonicCounter, PersistedEventCounter};
use super::data::{
    Clock, EventLoggingDelegate, EventOptions, EventPriority, RecordHeader, StoredTimestamp,
    SystemClock, Timestamp, tags,
};
use super::notifier::UrgentEventScheduler;
use super::path::EventPath;
use crate::config::EventLogConfig;
use crate::error::{ImError, Result};
use crate::matter::access::{AccessControl, AclError, AllowAll, RequestPath};
use crate::matter::tlv::{TLVTag, TLVWrite, TlvBuf};
use crate::matter::types::{
    EventNumber, FabricIndex, Privilege, SubjectDescriptor, UNDEFINED_FABRIC_INDEX,
};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// Events below this priority are discarded unless configured otherwise.
pub const EVENT_GLOBAL_PRIORITY: EventPriority = EventPriority::Debug;

/// File holding the persisted event number counter
const COUNTER_FILE: &str = "events.json";

/// Storage of one tier.
#[derive(Debug, Clone, Copy)]
pub struct TierResources {
    pub priority: EventPriority,
    pub capacity: usize,
}

impl TierResources {
    pub fn new(priority: EventPriority, capacity: usize) -> Self {
        Self { priority, capacity }
    }
}

/// Lifecycle of the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLogState {
    Running,
    Shutdown,
}

/// Resume point of an event fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCursor {
    /// Lowest event number still wanted
    pub next_event_number: EventNumber,
    /// Events written so far by all fetches using this cursor
    pub event_count: usize,
}

impl FetchCursor {
    pub fn starting_at(next_event_number: EventNumber) -> Self {
        Self {
            next_event_number,
            event_count: 0,
        }
    }
}

enum FetchDecision {
    Skip,
    Deliver,
}

struct EventLog {
    tiers: Vec<EventBuffer>,
    counter: Box<dyn EventNumberCounter>,
    state: EventLogState,
}

impl EventLog {
    /// Tier where events of `priority` end up, and which tracks their
    /// event number range.
    fn home_tier(&self, priority: EventPriority) -> usize {
        self.tiers
            .iter()
            .position(|t| t.is_final_destination_for_priority(priority))
            .unwrap_or(self.tiers.len() - 1)
    }

    /// Store one event of `required` bytes and number it, all or nothing.
    ///
    /// Making room can evict and move events through every tier, so each
    /// tier is snapshotted first and all of them are restored on failure.
    /// Eviction hooks only see drops that were kept.
    fn append_event(
        &mut self,
        header: &RecordHeader,
        timestamp: Timestamp,
        data: &[u8],
        required: usize,
    ) -> Result<EventNumber> {
        if self.tiers[0].available() >= required {
            let checkpoint = self.tiers[0].checkpoint();
            return match self.store(header, timestamp, data) {
                Ok(number) => Ok(number),
                Err(e) => {
                    self.tiers[0].restore(checkpoint);
                    Err(e)
                }
            };
        }

        let snapshots: Vec<_> = self.tiers.iter().map(EventBuffer::snapshot).collect();
        let result = ensure_space_in_circular_buffer(&mut self.tiers, required)
            .and_then(|dropped| Ok((self.store(header, timestamp, data)?, dropped)));
        match result {
            Ok((number, dropped)) => {
                for (tier, record) in dropped {
                    self.tiers[tier].notify_evicted(&record);
                }
                Ok(number)
            }
            Err(e) => {
                for (tier, snapshot) in self.tiers.iter_mut().zip(snapshots) {
                    tier.restore_snapshot(snapshot);
                }
                Err(e)
            }
        }
    }

    /// Append to the first tier, then consume the event number.
    fn store(
        &mut self,
        header: &RecordHeader,
        timestamp: Timestamp,
        data: &[u8],
    ) -> Result<EventNumber> {
        self.tiers[0].append(header, timestamp, Some(data))?;
        self.counter.advance()?;
        let home = self.home_tier(header.priority);
        self.tiers[home].record_vended(header.event_number);
        Ok(header.event_number)
    }
}

/// Chained multi-priority event log.
pub struct EventManagement {
    inner: Mutex<EventLog>,
    scheduler: Option<Arc<dyn UrgentEventScheduler>>,
    access_control: Arc<dyn AccessControl>,
    clock: Arc<dyn Clock>,
    min_priority: EventPriority,
}

impl EventManagement {
    /// Build the tier chain, lowest priority first.
    ///
    /// Events are numbered from zero by an in-memory counter until
    /// [`EventManagement::with_counter`] installs another one.
    pub fn new(tiers: Vec<TierResources>, clock: Arc<dyn Clock>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(ImError::InvalidArgument("no event tiers configured".into()));
        }
        if tiers.windows(2).any(|w| w[0].priority > w[1].priority) {
            return Err(ImError::InvalidArgument(
                "event tiers must be ordered by priority".into(),
            ));
        }
        if let Some(t) = tiers.iter().find(|t| t.capacity == 0) {
            return Err(ImError::InvalidArgument(format!(
                "event tier {:?} has no capacity",
                t.priority
            )));
        }

        let links: Vec<Option<TierLink>> = tiers
            .iter()
            .enumerate()
            .map(|(i, _)| {
                tiers.get(i + 1).map(|next| TierLink {
                    index: i + 1,
                    priority: next.priority,
                })
            })
            .collect();

        let mut buffers = Vec::with_capacity(tiers.len());
        for (i, (tier, next)) in tiers.into_iter().zip(links).enumerate() {
            let mut buffer = EventBuffer::new(tier.priority, tier.capacity);
            buffer.link(i.checked_sub(1), next);
            buffers.push(buffer);
        }

        info!(
            "Event log initialized with {} tiers: {}",
            buffers.len(),
            buffers
                .iter()
                .map(|b| format!("{:?}={}B", b.priority(), b.capacity()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            inner: Mutex::new(EventLog {
                tiers: buffers,
                counter: Box::new(MonotonicCounter::default()),
                state: EventLogState::Running,
            }),
            scheduler: None,
            access_control: Arc::new(AllowAll),
            clock,
            min_priority: EVENT_GLOBAL_PRIORITY,
        })
    }

    /// Build the event log described by `config`.
    pub fn from_config(config: &EventLogConfig) -> Result<Self> {
        let tiers = config
            .tiers
            .iter()
            .map(|t| TierResources::new(t.priority, t.capacity))
            .collect();
        let events =
            Self::new(tiers, Arc::new(SystemClock))?.with_min_priority(config.min_priority);
        match &config.counter_dir {
            Some(dir) => {
                let counter =
                    PersistedEventCounter::open(dir.join(COUNTER_FILE), config.counter_epoch)?;
                Ok(events.with_counter(Box::new(counter)))
            }
            None => Ok(events),
        }
    }

    /// Number events with `counter` from now on.
    pub fn with_counter(mut self, counter: Box<dyn EventNumberCounter>) -> Self {
        self.inner.get_mut().counter = counter;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn UrgentEventScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_access_control(mut self, access_control: Arc<dyn AccessControl>) -> Self {
        self.access_control = access_control;
        self
    }

    pub fn with_min_priority(mut self, min_priority: EventPriority) -> Self {
        self.min_priority = min_priority;
        self
    }

    pub fn state(&self) -> EventLogState {
        self.inner.lock().state
    }

    /// Stop accepting new events. Stored events stay readable.
    pub fn shutdown(&self) {
        let mut log = self.inner.lock();
        if log.state == EventLogState::Running {
            info!("Event log shut down");
        }
        log.state = EventLogState::Shutdown;
    }

    /// Log one event.
    ///
    /// Returns the assigned event number, or `None` when the priority is
    /// below the configured minimum and the event was discarded. On error
    /// the log is left exactly as it was.
    pub fn log_event<D>(&self, delegate: &D, options: EventOptions) -> Result<Option<EventNumber>>
    where
        D: EventLoggingDelegate + ?Sized,
    {
        let mut log = self.inner.lock();
        if log.state == EventLogState::Shutdown {
            return Err(ImError::IncorrectState("event log is shut down".into()));
        }
        if options.priority < self.min_priority {
            trace!(
                "Discarding {:?} event ep={} cluster=0x{:04X} event=0x{:04X}",
                options.priority,
                options.path.endpoint_id,
                options.path.cluster_id,
                options.path.event_id
            );
            return Ok(None);
        }

        let timestamp = options.timestamp.unwrap_or_else(|| self.clock.now());
        let home = log.home_tier(options.priority);
        let data = capture_payload(delegate)?;
        let header = RecordHeader {
            path: options.path,
            urgent: options.urgent,
            event_number: log.counter.value(),
            priority: options.priority,
            fabric_index: options.fabric_index,
        };

        // absolute timestamps are never shorter than deltas
        let required = record_size(&header, StoredTimestamp::Absolute(timestamp), Some(&data))?;
        if let Some(tier) = log.tiers[..=home].iter().find(|t| t.capacity() < required) {
            warn!(
                "Event of {} bytes can never fit the {:?} tier ({} bytes)",
                required,
                tier.priority(),
                tier.capacity()
            );
            return Err(ImError::BufferTooSmall);
        }

        let event_number = log.append_event(&header, timestamp, &data, required)?;
        drop(log);

        debug!(
            "Logged {:?} event #{} ep={} cluster=0x{:04X} event=0x{:04X}",
            options.priority,
            event_number,
            options.path.endpoint_id,
            options.path.cluster_id,
            options.path.event_id
        );

        if options.urgent {
            if let Some(scheduler) = &self.scheduler {
                scheduler.schedule_urgent_event_delivery(options.path);
            }
        }
        Ok(Some(event_number))
    }

    /// Write stored events of `priority` matching `filters` as EventReportIBs.
    ///
    /// Events are written oldest first starting at `cursor.next_event_number`;
    /// the cursor is advanced past every event written. When `writer` fills
    /// up, the partially written event is rolled back and the writer's error
    /// is returned with the cursor pointing at that event, so a later call
    /// can resume.
    ///
    /// With a `subject`, fabric-scoped events of other fabrics and events the
    /// subject may not view are skipped. Without one, only events of removed
    /// fabrics are skipped.
    pub fn fetch_events_since<W: TLVWrite>(
        &self,
        writer: &mut W,
        filters: &[EventPath],
        priority: EventPriority,
        cursor: &mut FetchCursor,
        subject: Option<&SubjectDescriptor>,
    ) -> Result<()> {
        let log = self.inner.lock();
        let home = log.home_tier(priority);

        // older events of a priority sit further down the chain
        for tier in log.tiers[..=home].iter().rev() {
            tier.for_each_record(|record, timestamp| {
                let header = &record.header;
                let decision = if header.priority != priority
                    || header.event_number < cursor.next_event_number
                    || !filters.iter().any(|f| f.is_superset_of(&header.path))
                {
                    FetchDecision::Skip
                } else {
                    self.check_read_access(header, subject)?
                };
                if let FetchDecision::Skip = decision {
                    return Ok(());
                }

                let tail = writer.get_tail();
                if let Err(e) = record.encode_report(writer, timestamp) {
                    writer.rewind_to(tail);
                    return Err(e.into());
                }
                cursor.next_event_number = header.event_number + 1;
                cursor.event_count += 1;
                Ok(())
            })?;
        }
        Ok(())
    }

    fn check_read_access(
        &self,
        header: &RecordHeader,
        subject: Option<&SubjectDescriptor>,
    ) -> Result<FetchDecision> {
        if header.fabric_index == Some(UNDEFINED_FABRIC_INDEX) {
            return Ok(FetchDecision::Skip);
        }
        let Some(subject) = subject else {
            return Ok(FetchDecision::Deliver);
        };
        if header
            .fabric_index
            .is_some_and(|f| f != subject.fabric_index)
        {
            return Ok(FetchDecision::Skip);
        }

        let path = RequestPath::event_read(
            header.path.endpoint_id,
            header.path.cluster_id,
            header.path.event_id,
        );
        match self.access_control.check(subject, &path, Privilege::View) {
            Ok(()) => Ok(FetchDecision::Deliver),
            Err(AclError::Denied) | Err(AclError::Restricted) => Ok(FetchDecision::Skip),
            Err(AclError::Engine(e)) => Err(ImError::AccessControl(e)),
        }
    }

    /// Detach stored events of a removed fabric from it.
    ///
    /// Returns the number of events scrubbed.
    pub fn fabric_removed(&self, fabric_index: FabricIndex) -> Result<usize> {
        let mut log = self.inner.lock();
        let mut scrubbed = 0;
        for tier in log.tiers.iter_mut() {
            scrubbed += tier.rewrite_records(|header| {
                (header.fabric_index == Some(fabric_index)).then_some(RecordHeader {
                    fabric_index: Some(UNDEFINED_FABRIC_INDEX),
                    ..*header
                })
            })?;
        }
        info!(
            "Scrubbed {} events of removed fabric {}",
            scrubbed, fabric_index
        );
        Ok(scrubbed)
    }

    /// Lower bound of the event numbers of `priority` still stored: every
    /// event of that priority numbered below it was dropped.
    pub fn first_event_number(&self, priority: EventPriority) -> EventNumber {
        let log = self.inner.lock();
        log.tiers[log.home_tier(priority)].first_event_number()
    }

    /// Newest event number of `priority` handed out.
    pub fn last_event_number(&self, priority: EventPriority) -> EventNumber {
        let log = self.inner.lock();
        log.tiers[log.home_tier(priority)].last_event_number()
    }

    pub fn tier_count(&self) -> usize {
        self.inner.lock().tiers.len()
    }

    pub fn bytes_in_use(&self, tier: usize) -> Option<usize> {
        self.inner.lock().tiers.get(tier).map(|t| t.bytes_in_use())
    }

    pub fn event_count(&self, tier: usize) -> Option<usize> {
        self.inner.lock().tiers.get(tier).map(|t| t.event_count())
    }

    /// Observe events permanently dropped from `tier`.
    pub fn set_eviction_hook(&self, tier: usize, hook: EvictionHook) -> Result<()> {
        let mut log = self.inner.lock();
        let buffer = log
            .tiers
            .get_mut(tier)
            .ok_or_else(|| ImError::InvalidArgument(format!("no event tier {}", tier)))?;
        buffer.set_eviction_hook(hook);
        Ok(())
    }
}

/// Run the delegate into a scratch writer, producing the `data` element.
fn capture_payload<D>(delegate: &D) -> Result<Vec<u8>>
where
    D: EventLoggingDelegate + ?Sized,
{
    let mut w = TlvBuf::unbounded();
    w.start_struct(&TLVTag::Context(tags::DATA))?;
    delegate.write_event(&mut w)?;
    w.end_container()?;
    Ok(w.into_vec())
}

/// Make `required` bytes available in the first tier.
///
/// Evicts oldest events tier by tier. An event that must move on but does
/// not fit the next tier first makes room there, after which the walk
/// returns to the tier it came from. Returns the records dropped for good,
/// with the index of the tier they were dropped from.
fn ensure_space_in_circular_buffer(
    tiers: &mut [EventBuffer],
    required: usize,
) -> Result<Vec<(usize, Vec<u8>)>> {
    let mut dropped = Vec::new();
    if tiers[0].available() >= required {
        return Ok(dropped);
    }

    let mut pending: Vec<(usize, usize)> = vec![(0, required)];
    while let Some(&(index, needed)) = pending.last() {
        let tier = &mut tiers[index];
        if tier.available() >= needed {
            pending.pop();
            continue;
        }
        if needed > tier.capacity() {
            warn!(
                "{:?} tier cannot hold {} bytes (capacity {})",
                tier.priority(),
                needed,
                tier.capacity()
            );
            return Err(ImError::BufferTooSmall);
        }

        match tier.evict_event()? {
            EvictOutcome::Dropped { record } => {
                debug!(
                    "Dropped oldest event from {:?} tier, {} bytes free",
                    tier.priority(),
                    tier.available()
                );
                dropped.push((index, record));
            }
            EvictOutcome::Relocate { space_needed } => {
                let next = tier
                    .next()
                    .map(|n| n.index)
                    .ok_or_else(|| ImError::IncorrectState("last tier relocated".into()))?;
                if tiers[next].available() >= space_needed {
                    let (head, tail) = tiers.split_at_mut(next);
                    head[index].copy_to_next_buffer(&mut tail[0])?;
                    trace!("Moved oldest event from tier {} to tier {}", index, next);
                } else {
                    pending.push((next, space_needed));
                }
            }
        }
    }
    Ok(dropped)
}
