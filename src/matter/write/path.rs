//! Attribute paths used by write transactions.
//!
//! TLV encoding follows Matter Core Specification 1.4, Section 10.6.2.

use crate::matter::tlv::{TLVSequence, TLVTag, TLVWrite, optional_field};
use crate::matter::types::{AttributeId, ClusterId, DataVersion, EndpointId, NodeId};
use rs_matter::error::{Error, ErrorCode};
use std::fmt;

/// One concrete attribute: endpoint, cluster and attribute are all set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConcreteAttributePath {
    pub endpoint_id: EndpointId,
    pub cluster_id: ClusterId,
    pub attribute_id: AttributeId,
}

impl ConcreteAttributePath {
    pub fn new(endpoint_id: EndpointId, cluster_id: ClusterId, attribute_id: AttributeId) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            attribute_id,
        }
    }
}

impl fmt::Display for ConcreteAttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ep={} cluster=0x{:04X} attr=0x{:04X}",
            self.endpoint_id, self.cluster_id, self.attribute_id
        )
    }
}

/// How a write touches a list attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListOperation {
    /// Not a list write
    #[default]
    NotList,
    /// Replace the whole list with the written array
    ReplaceAll,
    /// Append one item to the list
    AppendItem,
}

/// Attribute path of one AttributeDataIB being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcreteDataAttributePath {
    pub endpoint_id: EndpointId,
    pub cluster_id: ClusterId,
    pub attribute_id: AttributeId,
    pub list_op: ListOperation,
    pub data_version: Option<DataVersion>,
}

impl ConcreteDataAttributePath {
    pub fn new(path: ConcreteAttributePath) -> Self {
        Self {
            endpoint_id: path.endpoint_id,
            cluster_id: path.cluster_id,
            attribute_id: path.attribute_id,
            list_op: ListOperation::NotList,
            data_version: None,
        }
    }

    pub fn attribute_path(&self) -> ConcreteAttributePath {
        ConcreteAttributePath::new(self.endpoint_id, self.cluster_id, self.attribute_id)
    }

    pub fn is_list_operation(&self) -> bool {
        self.list_op != ListOperation::NotList
    }

    pub fn is_list_item_operation(&self) -> bool {
        self.list_op == ListOperation::AppendItem
    }

    /// Same endpoint, cluster and attribute, ignoring list operation.
    pub fn is_same_attribute(&self, other: &ConcreteAttributePath) -> bool {
        self.attribute_path() == *other
    }
}

impl fmt::Display for ConcreteDataAttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} list_op={:?}", self.attribute_path(), self.list_op)
    }
}

/// ListIndex field of an AttributePathIB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListIndex {
    #[default]
    Absent,
    /// Null: append to the list
    Null,
    Index(u16),
}

/// Context tags for AttributePathIB
pub mod tags {
    pub const ENABLE_TAG_COMPRESSION: u8 = 0;
    pub const NODE: u8 = 1;
    pub const ENDPOINT: u8 = 2;
    pub const CLUSTER: u8 = 3;
    pub const ATTRIBUTE: u8 = 4;
    pub const LIST_INDEX: u8 = 5;
}

/// Attribute path as carried on the wire. Fields may be missing.
///
/// ## TLV Structure
/// ```text
/// AttributePathIB ::= LIST {
///     enable_tag_compression [0, opt]: bool,
///     node [1, opt]: node-id,
///     endpoint [2, opt]: endpoint-id,
///     cluster [3, opt]: cluster-id,
///     attribute [4, opt]: attribute-id,
///     list_index [5, opt]: nullable unsigned 16-bit,
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributePathIB {
    pub node_id: Option<NodeId>,
    pub endpoint_id: Option<EndpointId>,
    pub cluster_id: Option<ClusterId>,
    pub attribute_id: Option<AttributeId>,
    pub list_index: ListIndex,
}

impl AttributePathIB {
    pub fn concrete(
        endpoint_id: EndpointId,
        cluster_id: ClusterId,
        attribute_id: AttributeId,
    ) -> Self {
        Self {
            endpoint_id: Some(endpoint_id),
            cluster_id: Some(cluster_id),
            attribute_id: Some(attribute_id),
            ..Self::default()
        }
    }

    /// Path of a group write: no endpoint.
    pub fn group(cluster_id: ClusterId, attribute_id: AttributeId) -> Self {
        Self {
            cluster_id: Some(cluster_id),
            attribute_id: Some(attribute_id),
            ..Self::default()
        }
    }

    /// Mark the path as appending one list item.
    pub fn append_item(mut self) -> Self {
        self.list_index = ListIndex::Null;
        self
    }

    pub fn decode(list: &TLVSequence<'_>) -> Result<Self, Error> {
        let list_index = match optional_field(list, tags::LIST_INDEX) {
            None => ListIndex::Absent,
            Some(e) if e.null().is_ok() => ListIndex::Null,
            Some(e) => ListIndex::Index(e.u16()?),
        };
        Ok(Self {
            node_id: optional_field(list, tags::NODE).map(|e| e.u64()).transpose()?,
            endpoint_id: optional_field(list, tags::ENDPOINT).map(|e| e.u16()).transpose()?,
            cluster_id: optional_field(list, tags::CLUSTER).map(|e| e.u32()).transpose()?,
            attribute_id: optional_field(list, tags::ATTRIBUTE)
                .map(|e| e.u32())
                .transpose()?,
            list_index,
        })
    }

    pub fn encode(&self, tag: &TLVTag, tw: &mut impl TLVWrite) -> Result<(), Error> {
        tw.start_list(tag)?;
        if let Some(node) = self.node_id {
            tw.u64(&TLVTag::Context(tags::NODE), node)?;
        }
        if let Some(endpoint) = self.endpoint_id {
            tw.u16(&TLVTag::Context(tags::ENDPOINT), endpoint)?;
        }
        if let Some(cluster) = self.cluster_id {
            tw.u32(&TLVTag::Context(tags::CLUSTER), cluster)?;
        }
        if let Some(attribute) = self.attribute_id {
            tw.u32(&TLVTag::Context(tags::ATTRIBUTE), attribute)?;
        }
        match self.list_index {
            ListIndex::Absent => {}
            ListIndex::Null => tw.null(&TLVTag::Context(tags::LIST_INDEX))?,
            ListIndex::Index(i) => tw.u16(&TLVTag::Context(tags::LIST_INDEX), i)?,
        }
        tw.end_container()
    }

    /// Response path for a processed write.
    pub fn from_data_path(path: &ConcreteDataAttributePath) -> Self {
        let mut ib = Self::concrete(path.endpoint_id, path.cluster_id, path.attribute_id);
        if path.is_list_item_operation() {
            ib.list_index = ListIndex::Null;
        }
        ib
    }

    /// List operation requested by this path, before any schema lookup.
    ///
    /// Only appending is supported; explicit item indices are rejected.
    pub fn list_operation(&self) -> Result<ListOperation, Error> {
        match self.list_index {
            ListIndex::Absent => Ok(ListOperation::NotList),
            ListIndex::Null => Ok(ListOperation::AppendItem),
            ListIndex::Index(_) => Err(ErrorCode::InvalidData.into()),
        }
    }

    /// Concrete path of a unicast write; every field must be present.
    pub fn to_concrete(&self) -> Result<ConcreteDataAttributePath, Error> {
        let (Some(endpoint), Some(cluster), Some(attribute)) =
            (self.endpoint_id, self.cluster_id, self.attribute_id)
        else {
            return Err(ErrorCode::NotFound.into());
        };
        let mut path = ConcreteDataAttributePath::new(ConcreteAttributePath::new(
            endpoint, cluster, attribute,
        ));
        path.list_op = self.list_operation()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::tlv::{TLVElement, TlvBuf};

    #[test]
    fn test_append_path_keeps_null_list_index() {
        let ib = AttributePathIB::concrete(1, 0x001F, 0x0000).append_item();
        let mut w = TlvBuf::unbounded();
        ib.encode(&TLVTag::Anonymous, &mut w).unwrap();
        let e = TLVElement::new(w.as_slice());
        let decoded = AttributePathIB::decode(&e.list().unwrap()).unwrap();
        assert_eq!(decoded, ib);
        let concrete = decoded.to_concrete().unwrap();
        assert!(concrete.is_list_item_operation());
    }

    #[test]
    fn test_wildcard_is_not_concrete() {
        let ib = AttributePathIB::group(0x0006, 0x4003);
        assert!(ib.to_concrete().is_err());
        let indexed = AttributePathIB {
            list_index: ListIndex::Index(3),
            ..AttributePathIB::concrete(1, 0x0006, 0)
        };
        assert_eq!(
            indexed.to_concrete().unwrap_err().code(),
            ErrorCode::InvalidData
        );
    }
}
