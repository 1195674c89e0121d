//! Event data structures and the stored event record format.
//!
//! TLV encoding follows Matter Core Specification 1.4, Section 10.6.9.

use super::path::{ConcreteEventPath, tags as path_tags};
use crate::error::Result;
use crate::matter::tlv::{
    TLVElement, TLVTag, TLVWrite, TlvBuf, field, optional_field, write_raw,
};
use crate::matter::types::{EventNumber, FabricIndex};
use rs_matter::error::{Error, ErrorCode};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use strum::FromRepr;

/// Event priority levels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromRepr, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum EventPriority {
    /// Debug events - low priority, may be dropped
    Debug = 0,
    /// Info events - normal priority
    Info = 1,
    /// Critical events - high priority, should not be dropped
    Critical = 2,
}

impl EventPriority {
    /// Get the priority value as u8.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Which clock a timestamp was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimestampKind {
    /// Milliseconds since boot
    #[default]
    System,
    /// Milliseconds since the Unix epoch
    Epoch,
}

/// Absolute event timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub kind: TimestampKind,
    pub value: u64,
}

impl Timestamp {
    pub fn system(ms: u64) -> Self {
        Self {
            kind: TimestampKind::System,
            value: ms,
        }
    }

    pub fn epoch(ms: u64) -> Self {
        Self {
            kind: TimestampKind::Epoch,
            value: ms,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }
}

/// Timestamp as stored in a tier: absolute, or relative to the previous
/// event of the same tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredTimestamp {
    Absolute(Timestamp),
    Delta(TimestampKind, u64),
}

impl StoredTimestamp {
    /// Encode `timestamp` relative to `previous` when both come from the
    /// same clock and time did not go backwards.
    pub fn relative_to(timestamp: Timestamp, previous: Option<Timestamp>) -> Self {
        match previous {
            Some(prev) if prev.kind == timestamp.kind && timestamp.value >= prev.value => {
                StoredTimestamp::Delta(timestamp.kind, timestamp.value - prev.value)
            }
            _ => StoredTimestamp::Absolute(timestamp),
        }
    }

    /// Absolute timestamp given the absolute timestamp of the previous event.
    pub fn resolve(self, previous: Timestamp) -> Timestamp {
        match self {
            StoredTimestamp::Absolute(ts) => ts,
            StoredTimestamp::Delta(kind, delta) => Timestamp {
                kind,
                value: previous.value.saturating_add(delta),
            },
        }
    }
}

/// Source of event timestamps when the caller does not supply one.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time since the Unix epoch.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::epoch(chrono::Utc::now().timestamp_millis().max(0) as u64)
    }
}

/// Milliseconds elapsed since the clock was created.
pub struct BootClock {
    start_time: Instant,
}

impl BootClock {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for BootClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for BootClock {
    fn now(&self) -> Timestamp {
        // zero is reserved for "no event yet"
        Timestamp::system(self.start_time.elapsed().as_millis() as u64 + 1)
    }
}

/// Options describing one event to log.
#[derive(Debug, Clone, Copy)]
pub struct EventOptions {
    pub path: ConcreteEventPath,
    pub priority: EventPriority,
    /// Urgent events trigger immediate report scheduling
    pub urgent: bool,
    /// Explicit timestamp; the log's clock is used when `None`
    pub timestamp: Option<Timestamp>,
    /// Set for fabric-sensitive events
    pub fabric_index: Option<FabricIndex>,
}

impl EventOptions {
    pub fn new(path: ConcreteEventPath, priority: EventPriority) -> Self {
        Self {
            path,
            priority,
            urgent: false,
            timestamp: None,
            fabric_index: None,
        }
    }

    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn for_fabric(mut self, fabric_index: FabricIndex) -> Self {
        self.fabric_index = Some(fabric_index);
        self
    }
}

/// Writes the cluster-specific payload of one event.
///
/// Invoked once per logged event, inside the `data` structure of the
/// record: implementations write context-tagged fields only.
pub trait EventLoggingDelegate {
    fn write_event(&self, writer: &mut TlvBuf) -> Result<()>;
}

impl<F> EventLoggingDelegate for F
where
    F: Fn(&mut TlvBuf) -> Result<()>,
{
    fn write_event(&self, writer: &mut TlvBuf) -> Result<()> {
        self(writer)
    }
}

/// Context tags for EventDataIB TLV encoding
pub mod tags {
    /// Tag for path field
    pub const PATH: u8 = 0;
    /// Tag for event_number field
    pub const EVENT_NUMBER: u8 = 1;
    /// Tag for priority field
    pub const PRIORITY: u8 = 2;
    /// Tag for epoch_timestamp field
    pub const EPOCH_TIMESTAMP: u8 = 3;
    /// Tag for system_timestamp field
    pub const SYSTEM_TIMESTAMP: u8 = 4;
    /// Tag for delta_epoch_timestamp field
    pub const DELTA_EPOCH_TIMESTAMP: u8 = 5;
    /// Tag for delta_system_timestamp field
    pub const DELTA_SYSTEM_TIMESTAMP: u8 = 6;
    /// Tag for data field
    pub const DATA: u8 = 7;
    /// Fabric of a fabric-sensitive event; only present in stored records
    pub const FABRIC_INDEX: u8 = 8;

    /// Tag of EventDataIB inside EventReportIB
    pub const REPORT_EVENT_DATA: u8 = 1;
}

fn priority_from_wire(value: u8) -> Result<EventPriority, Error> {
    EventPriority::from_repr(value).ok_or_else(|| ErrorCode::InvalidData.into())
}

/// Fields of a record other than its timestamp and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub path: ConcreteEventPath,
    pub urgent: bool,
    pub event_number: EventNumber,
    pub priority: EventPriority,
    pub fabric_index: Option<FabricIndex>,
}

/// One event record as stored in a tier.
///
/// ```text
/// EventRecord ::= STRUCTURE {
///     path [0]: EventPathIB (endpoint, cluster, event, is_urgent),
///     event_number [1]: unsigned,
///     priority [2]: unsigned 8-bit,
///     // exactly one of the four timestamp tags [3]..[6]
///     data [7, opt]: OCTET STRING holding the encoded `data` element,
///     fabric_index [8, opt]: unsigned 8-bit,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EventRecord {
    pub header: RecordHeader,
    pub timestamp: StoredTimestamp,
    /// Encoded `data` element of the report, tag included
    pub data: Option<Vec<u8>>,
}

impl EventRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let s = TLVElement::new(bytes).structure()?;

        let path_list = field(&s, tags::PATH)?.list()?;
        let path = ConcreteEventPath::decode(&path_list)?;
        let urgent = match optional_field(&path_list, path_tags::IS_URGENT) {
            Some(e) => e.bool()?,
            None => false,
        };

        let timestamp = if let Some(e) = optional_field(&s, tags::EPOCH_TIMESTAMP) {
            StoredTimestamp::Absolute(Timestamp::epoch(e.u64()?))
        } else if let Some(e) = optional_field(&s, tags::SYSTEM_TIMESTAMP) {
            StoredTimestamp::Absolute(Timestamp::system(e.u64()?))
        } else if let Some(e) = optional_field(&s, tags::DELTA_EPOCH_TIMESTAMP) {
            StoredTimestamp::Delta(TimestampKind::Epoch, e.u64()?)
        } else {
            let delta = field(&s, tags::DELTA_SYSTEM_TIMESTAMP)?.u64()?;
            StoredTimestamp::Delta(TimestampKind::System, delta)
        };

        let header = RecordHeader {
            path,
            urgent,
            event_number: field(&s, tags::EVENT_NUMBER)?.u64()?,
            priority: priority_from_wire(field(&s, tags::PRIORITY)?.u8()?)?,
            fabric_index: match optional_field(&s, tags::FABRIC_INDEX) {
                Some(e) => Some(e.u8()?),
                None => None,
            },
        };
        let data = match optional_field(&s, tags::DATA) {
            Some(e) => Some(e.str()?.to_vec()),
            None => None,
        };

        Ok(Self {
            header,
            timestamp,
            data,
        })
    }

    /// Write a stored record.
    pub fn encode(
        tw: &mut impl TLVWrite,
        header: &RecordHeader,
        timestamp: StoredTimestamp,
        data: Option<&[u8]>,
    ) -> Result<(), Error> {
        tw.start_struct(&TLVTag::Anonymous)?;

        tw.start_list(&TLVTag::Context(tags::PATH))?;
        tw.u16(&TLVTag::Context(path_tags::ENDPOINT), header.path.endpoint_id)?;
        tw.u32(&TLVTag::Context(path_tags::CLUSTER), header.path.cluster_id)?;
        tw.u32(&TLVTag::Context(path_tags::EVENT), header.path.event_id)?;
        if header.urgent {
            tw.bool(&TLVTag::Context(path_tags::IS_URGENT), true)?;
        }
        tw.end_container()?;

        tw.u64(&TLVTag::Context(tags::EVENT_NUMBER), header.event_number)?;
        tw.u8(&TLVTag::Context(tags::PRIORITY), header.priority.as_u8())?;
        let (tag, value) = match timestamp {
            StoredTimestamp::Absolute(ts) => match ts.kind {
                TimestampKind::Epoch => (tags::EPOCH_TIMESTAMP, ts.value),
                TimestampKind::System => (tags::SYSTEM_TIMESTAMP, ts.value),
            },
            StoredTimestamp::Delta(TimestampKind::Epoch, d) => (tags::DELTA_EPOCH_TIMESTAMP, d),
            StoredTimestamp::Delta(TimestampKind::System, d) => (tags::DELTA_SYSTEM_TIMESTAMP, d),
        };
        tw.u64(&TLVTag::Context(tag), value)?;
        if let Some(data) = data {
            tw.str(&TLVTag::Context(tags::DATA), data)?;
        }
        if let Some(fabric_index) = header.fabric_index {
            tw.u8(&TLVTag::Context(tags::FABRIC_INDEX), fabric_index)?;
        }
        tw.end_container()
    }

    /// Write this record as an EventReportIB, with an absolute timestamp.
    ///
    /// ```text
    /// EventReportIB ::= STRUCTURE {
    ///     event_data [1]: EventDataIB,
    /// }
    /// ```
    pub fn encode_report(&self, tw: &mut impl TLVWrite, timestamp: Timestamp) -> Result<(), Error> {
        tw.start_struct(&TLVTag::Anonymous)?;
        tw.start_struct(&TLVTag::Context(tags::REPORT_EVENT_DATA))?;
        self.header.path.encode(&TLVTag::Context(tags::PATH), tw)?;
        tw.u64(&TLVTag::Context(tags::EVENT_NUMBER), self.header.event_number)?;
        tw.u8(&TLVTag::Context(tags::PRIORITY), self.header.priority.as_u8())?;
        let tag = match timestamp.kind {
            TimestampKind::Epoch => tags::EPOCH_TIMESTAMP,
            TimestampKind::System => tags::SYSTEM_TIMESTAMP,
        };
        tw.u64(&TLVTag::Context(tag), timestamp.value)?;
        if let Some(data) = &self.data {
            write_raw(tw, data)?;
        }
        tw.end_container()?;
        tw.end_container()
    }
}

/// Decoded EventDataIB from a fetched EventReportIB.
#[derive(Debug, Clone)]
pub struct EventDataIB<'a> {
    pub path: ConcreteEventPath,
    pub event_number: EventNumber,
    pub priority: EventPriority,
    pub timestamp: Timestamp,
    pub data: Option<TLVElement<'a>>,
}

impl<'a> EventDataIB<'a> {
    /// Decode one EventReportIB element.
    pub fn from_report(report: &TLVElement<'a>) -> Result<Self, Error> {
        let s = field(&report.structure()?, tags::REPORT_EVENT_DATA)?.structure()?;
        let timestamp = match optional_field(&s, tags::EPOCH_TIMESTAMP) {
            Some(e) => Timestamp::epoch(e.u64()?),
            None => Timestamp::system(field(&s, tags::SYSTEM_TIMESTAMP)?.u64()?),
        };
        Ok(Self {
            path: ConcreteEventPath::decode(&field(&s, tags::PATH)?.list()?)?,
            event_number: field(&s, tags::EVENT_NUMBER)?.u64()?,
            priority: priority_from_wire(field(&s, tags::PRIORITY)?.u8()?)?,
            timestamp,
            data: optional_field(&s, tags::DATA),
        })
    }
}

/// GenericSwitch event IDs
pub mod generic_switch_events {
    /// GenericSwitch cluster id
    pub const CLUSTER_ID: u32 = 0x003B;
    /// Button was initially pressed down
    pub const INITIAL_PRESS: u32 = 0x01;
    /// Button was released after being held for a long time
    pub const LONG_PRESS: u32 = 0x02;
    /// Button was released after a short press
    pub const SHORT_RELEASE: u32 = 0x03;
    /// Button was released after a long press
    pub const LONG_RELEASE: u32 = 0x04;
    /// Multi-press sequence is ongoing
    pub const MULTI_PRESS_ONGOING: u32 = 0x05;
    /// Multi-press sequence completed
    pub const MULTI_PRESS_COMPLETE: u32 = 0x06;
}
