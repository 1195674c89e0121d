//! Event paths.
//!
//! TLV encoding follows Matter Core Specification 1.4, Section 10.6.8.

use crate::matter::tlv::{TLVSequence, TLVTag, TLVWrite, field};
use crate::matter::types::{ClusterId, EndpointId, EventId, NodeId};
use rs_matter::error::Error;

/// Path of one concrete event: endpoint, cluster and event id are all set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConcreteEventPath {
    pub endpoint_id: EndpointId,
    pub cluster_id: ClusterId,
    pub event_id: EventId,
}

impl ConcreteEventPath {
    pub fn new(endpoint_id: EndpointId, cluster_id: ClusterId, event_id: EventId) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            event_id,
        }
    }

    pub(crate) fn encode(&self, tag: &TLVTag, tw: &mut impl TLVWrite) -> Result<(), Error> {
        tw.start_list(tag)?;
        tw.u16(&TLVTag::Context(tags::ENDPOINT), self.endpoint_id)?;
        tw.u32(&TLVTag::Context(tags::CLUSTER), self.cluster_id)?;
        tw.u32(&TLVTag::Context(tags::EVENT), self.event_id)?;
        tw.end_container()
    }

    pub(crate) fn decode(path: &TLVSequence<'_>) -> Result<Self, Error> {
        Ok(Self {
            endpoint_id: field(path, tags::ENDPOINT)?.u16()?,
            cluster_id: field(path, tags::CLUSTER)?.u32()?,
            event_id: field(path, tags::EVENT)?.u32()?,
        })
    }
}

/// EventPath identifies an event or a set of events in the Matter data model.
///
/// Used as an interest filter when fetching events: a missing field is a
/// wildcard.
///
/// ## TLV Structure
/// ```text
/// EventPathIB ::= LIST {
///     node [0, opt]: node-id,
///     endpoint [1, opt]: endpoint-id,
///     cluster [2, opt]: cluster-id,
///     event [3, opt]: event-id,
///     is_urgent [4, opt]: bool,
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventPath {
    pub node_id: Option<NodeId>,
    /// Endpoint ID (optional for wildcard)
    pub endpoint_id: Option<EndpointId>,
    /// Cluster ID (optional for wildcard)
    pub cluster_id: Option<ClusterId>,
    /// Event ID (optional for wildcard)
    pub event_id: Option<EventId>,
    /// Whether this event should be reported urgently
    pub is_urgent: bool,
}

impl EventPath {
    /// Create a new EventPath with specific endpoint, cluster, and event.
    pub fn new(endpoint_id: EndpointId, cluster_id: ClusterId, event_id: EventId) -> Self {
        Self {
            node_id: None,
            endpoint_id: Some(endpoint_id),
            cluster_id: Some(cluster_id),
            event_id: Some(event_id),
            is_urgent: false,
        }
    }

    /// Every event on every endpoint.
    pub fn wildcard() -> Self {
        Self::default()
    }

    /// Every event of one cluster, on any endpoint.
    pub fn cluster(cluster_id: ClusterId) -> Self {
        Self {
            cluster_id: Some(cluster_id),
            ..Self::default()
        }
    }

    /// Create an urgent event path.
    pub fn urgent(mut self) -> Self {
        self.is_urgent = true;
        self
    }

    /// Whether this (possibly wildcard) path covers `path`.
    pub fn is_superset_of(&self, path: &ConcreteEventPath) -> bool {
        self.endpoint_id.is_none_or(|e| e == path.endpoint_id)
            && self.cluster_id.is_none_or(|c| c == path.cluster_id)
            && self.event_id.is_none_or(|ev| ev == path.event_id)
    }
}

/// Context tags for EventPathIB TLV encoding
pub mod tags {
    /// Tag for node_id field
    pub const NODE: u8 = 0;
    /// Tag for endpoint_id field
    pub const ENDPOINT: u8 = 1;
    /// Tag for cluster_id field
    pub const CLUSTER: u8 = 2;
    /// Tag for event_id field
    pub const EVENT: u8 = 3;
    /// Tag for is_urgent field
    pub const IS_URGENT: u8 = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_matches_everything() {
        let concrete = ConcreteEventPath::new(1, 0x003B, 0x01);
        assert!(EventPath::wildcard().is_superset_of(&concrete));
        assert!(EventPath::cluster(0x003B).is_superset_of(&concrete));
        assert!(!EventPath::cluster(0x0045).is_superset_of(&concrete));
    }

    #[test]
    fn test_concrete_filter_needs_all_fields() {
        let concrete = ConcreteEventPath::new(1, 0x003B, 0x01);
        assert!(EventPath::new(1, 0x003B, 0x01).is_superset_of(&concrete));
        assert!(!EventPath::new(2, 0x003B, 0x01).is_superset_of(&concrete));
        assert!(!EventPath::new(1, 0x003B, 0x02).is_superset_of(&concrete));
    }
}
