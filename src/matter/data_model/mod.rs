//! Data model collaborator of the write handler.
//!
//! The provider answers schema questions (is the attribute a list, does it
//! need a timed interaction, which privilege does writing require) and
//! performs the actual attribute writes.

mod memory;

pub use memory::{AttributeValue, DataModelEvent, InMemoryDataModel};

use super::status::{Status, StatusIB};
use super::types::{Privilege, SubjectDescriptor};
use super::write::{AttributeValueDecoder, ConcreteAttributePath, ConcreteDataAttributePath};

/// Global attributes every cluster carries.
pub mod global_attributes {
    pub const GENERATED_COMMAND_LIST: u32 = 0xFFF8;
    pub const ACCEPTED_COMMAND_LIST: u32 = 0xFFF9;
    pub const EVENT_LIST: u32 = 0xFFFA;
    pub const ATTRIBUTE_LIST: u32 = 0xFFFB;
    pub const FEATURE_MAP: u32 = 0xFFFC;
    pub const CLUSTER_REVISION: u32 = 0xFFFD;

    /// Global attributes that are never writable.
    pub fn is_read_only_global(attribute_id: u32) -> bool {
        matches!(
            attribute_id,
            GENERATED_COMMAND_LIST
                | ACCEPTED_COMMAND_LIST
                | EVENT_LIST
                | ATTRIBUTE_LIST
                | FEATURE_MAP
                | CLUSTER_REVISION
        )
    }
}

/// Schema entry of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeMetadata {
    pub is_list: bool,
    /// Writes must be part of a timed interaction
    pub needs_timed: bool,
    /// `None` for read-only attributes
    pub write_privilege: Option<Privilege>,
    pub read_privilege: Privilege,
}

impl AttributeMetadata {
    pub fn read_only() -> Self {
        Self {
            is_list: false,
            needs_timed: false,
            write_privilege: None,
            read_privilege: Privilege::View,
        }
    }

    pub fn writable(privilege: Privilege) -> Self {
        Self {
            write_privilege: Some(privilege),
            ..Self::read_only()
        }
    }

    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    pub fn timed(mut self) -> Self {
        self.needs_timed = true;
        self
    }
}

/// Phase of a list write reported to the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListWriteOperation {
    Begin,
    Success,
    Failure,
}

/// Context of one attribute write.
#[derive(Debug, Clone, Copy)]
pub struct WriteAttributeRequest {
    pub path: ConcreteDataAttributePath,
    pub subject: SubjectDescriptor,
    pub is_timed: bool,
}

/// Attribute storage and schema.
pub trait DataModelProvider: Send + Sync {
    /// Schema of `path`, or the status explaining why it does not exist
    /// (`UnsupportedEndpoint`, `UnsupportedCluster`, `UnsupportedAttribute`).
    fn attribute_metadata(&self, path: &ConcreteAttributePath) -> Result<AttributeMetadata, Status>;

    fn write_attribute(
        &self,
        request: &WriteAttributeRequest,
        decoder: &mut AttributeValueDecoder<'_>,
    ) -> Result<(), StatusIB>;

    /// A list write started, or finished with the given outcome.
    fn list_attribute_write_notification(
        &self,
        path: &ConcreteAttributePath,
        operation: ListWriteOperation,
    );

    /// Called before every attempted write.
    fn pre_attribute_write(&self, _path: &ConcreteDataAttributePath) {}

    /// Called after every attempted write with its outcome.
    fn post_attribute_write(&self, _path: &ConcreteDataAttributePath, _status: &StatusIB) {}
}
