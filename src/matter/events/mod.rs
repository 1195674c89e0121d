//! Matter event logging.
//!
//! ## Architecture
//!
//! Events in Matter are different from attributes:
//! - Events have sequential event numbers that never reset
//! - Events have timestamps and priorities
//! - Events are reported in EventReportIB structures alongside AttributeReportIBs
//!
//! Logged events live in a chain of fixed-size tiers, one per priority.
//! Low-priority events are overwritten first; higher-priority events move
//! down the chain as the tiers in front of them fill up.

mod buffer;
mod counter;
pub mod data;
mod management;
mod notifier;
mod path;

pub use buffer::{EventBuffer, EvictionHook, TierLink};
pub use counter::{EventNumberCounter, MonotonicCounter, PersistedEventCounter};
pub use data::{
    BootClock, Clock, EventDataIB, EventLoggingDelegate, EventOptions, EventPriority,
    SystemClock, Timestamp, TimestampKind,
};
pub use management::{
    EVENT_GLOBAL_PRIORITY, EventLogState, EventManagement, FetchCursor, TierResources,
};
pub use notifier::{MAX_PENDING_URGENT, UrgentEventNotifier, UrgentEventScheduler};
pub use path::{ConcreteEventPath, EventPath};
