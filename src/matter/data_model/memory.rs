//! In-memory data model.
//!
//! Stores attribute values per concrete path, keeps one data version per
//! cluster instance and records every call the write handler makes, which
//! the demo binary prints and tests assert on.

use super::{AttributeMetadata, DataModelProvider, ListWriteOperation, WriteAttributeRequest};
use crate::matter::status::{Status, StatusIB};
use crate::matter::types::{ClusterId, DataVersion, EndpointId};
use crate::matter::write::{
    AttributeValueDecoder, ConcreteAttributePath, ConcreteDataAttributePath, ListOperation,
};
use crate::matter::tlv::{TLVElement, TLVTag};
use log::{debug, info};
use parking_lot::Mutex;
use rs_matter::error::{Error, ErrorCode};
use serde::Serialize;
use std::collections::HashMap;

/// Decoded attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Utf8(String),
    Bytes(Vec<u8>),
    /// Struct members by context tag
    Struct(Vec<(u8, AttributeValue)>),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn from_element(element: &TLVElement<'_>) -> Result<Self, Error> {
        if element.null().is_ok() {
            return Ok(AttributeValue::Null);
        }
        if let Ok(b) = element.bool() {
            return Ok(AttributeValue::Bool(b));
        }
        if let Ok(v) = element.u64() {
            return Ok(AttributeValue::Unsigned(v));
        }
        if let Ok(v) = element.i64() {
            return Ok(AttributeValue::Signed(v));
        }
        if let Ok(s) = element.utf8() {
            return Ok(AttributeValue::Utf8(s.to_string()));
        }
        if let Ok(b) = element.str() {
            return Ok(AttributeValue::Bytes(b.to_vec()));
        }
        if let Ok(members) = element.structure() {
            let mut fields = Vec::new();
            for member in members.iter() {
                let member = member?;
                let TLVTag::Context(tag) = member.tag()? else {
                    return Err(ErrorCode::InvalidData.into());
                };
                fields.push((tag, Self::from_element(&member)?));
            }
            return Ok(AttributeValue::Struct(fields));
        }
        let items = element.array().or_else(|_| element.list())?;
        Ok(AttributeValue::List(
            items
                .iter()
                .map(|item| item.and_then(|e| Self::from_element(&e)))
                .collect::<Result<_, _>>()?,
        ))
    }

    pub fn empty_list() -> Self {
        AttributeValue::List(Vec::new())
    }
}

/// One call observed by the data model.
#[derive(Debug, Clone, PartialEq)]
pub enum DataModelEvent {
    PreWrite(ConcreteDataAttributePath),
    Write(ConcreteDataAttributePath),
    PostWrite(ConcreteDataAttributePath, Status),
    ListWrite(ConcreteAttributePath, ListWriteOperation),
}

struct AttributeEntry {
    metadata: AttributeMetadata,
    value: AttributeValue,
    max_value: Option<u64>,
}

#[derive(Default)]
struct DataModelState {
    attributes: HashMap<ConcreteAttributePath, AttributeEntry>,
    versions: HashMap<(EndpointId, ClusterId), DataVersion>,
    /// List contents before the list write in progress started
    list_snapshots: HashMap<ConcreteAttributePath, AttributeValue>,
    log: Vec<DataModelEvent>,
}

/// Attribute store backing the write handler in the demo and in tests.
#[derive(Default)]
pub struct InMemoryDataModel {
    state: Mutex<DataModelState>,
}

fn constraint_error(_: Error) -> StatusIB {
    StatusIB::new(Status::CONSTRAINT_ERROR)
}

fn check_max(value: &AttributeValue, max_value: Option<u64>) -> Result<(), StatusIB> {
    match (value, max_value) {
        (AttributeValue::Unsigned(v), Some(max)) if *v > max => {
            Err(StatusIB::new(Status::CONSTRAINT_ERROR))
        }
        _ => Ok(()),
    }
}

impl InMemoryDataModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an attribute with its initial value.
    pub fn add_attribute(
        &self,
        path: ConcreteAttributePath,
        metadata: AttributeMetadata,
        initial: AttributeValue,
    ) {
        let mut state = self.state.lock();
        state
            .versions
            .entry((path.endpoint_id, path.cluster_id))
            .or_insert(0);
        state.attributes.insert(
            path,
            AttributeEntry {
                metadata,
                value: initial,
                max_value: None,
            },
        );
    }

    /// Reject unsigned values (or list items) above `max`.
    pub fn set_max_value(&self, path: &ConcreteAttributePath, max: u64) {
        if let Some(entry) = self.state.lock().attributes.get_mut(path) {
            entry.max_value = Some(max);
        }
    }

    pub fn value(&self, path: &ConcreteAttributePath) -> Option<AttributeValue> {
        self.state.lock().attributes.get(path).map(|e| e.value.clone())
    }

    pub fn data_version(
        &self,
        endpoint_id: EndpointId,
        cluster_id: ClusterId,
    ) -> Option<DataVersion> {
        self.state
            .lock()
            .versions
            .get(&(endpoint_id, cluster_id))
            .copied()
    }

    /// Every call observed so far, oldest first.
    pub fn events(&self) -> Vec<DataModelEvent> {
        self.state.lock().log.clone()
    }

    /// Paths `write_attribute` was called for.
    pub fn writes(&self) -> Vec<ConcreteDataAttributePath> {
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|e| match e {
                DataModelEvent::Write(path) => Some(*path),
                _ => None,
            })
            .collect()
    }

    /// List write notifications received so far.
    pub fn list_notifications(&self) -> Vec<(ConcreteAttributePath, ListWriteOperation)> {
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|e| match e {
                DataModelEvent::ListWrite(path, op) => Some((*path, *op)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_events(&self) {
        self.state.lock().log.clear();
    }
}

impl DataModelProvider for InMemoryDataModel {
    fn attribute_metadata(
        &self,
        path: &ConcreteAttributePath,
    ) -> Result<AttributeMetadata, Status> {
        let state = self.state.lock();
        if let Some(entry) = state.attributes.get(path) {
            return Ok(entry.metadata);
        }
        if !state.versions.keys().any(|(ep, _)| *ep == path.endpoint_id) {
            Err(Status::UNSUPPORTED_ENDPOINT)
        } else if !state
            .versions
            .contains_key(&(path.endpoint_id, path.cluster_id))
        {
            Err(Status::UNSUPPORTED_CLUSTER)
        } else {
            Err(Status::UNSUPPORTED_ATTRIBUTE)
        }
    }

    fn write_attribute(
        &self,
        request: &WriteAttributeRequest,
        decoder: &mut AttributeValueDecoder<'_>,
    ) -> Result<(), StatusIB> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let path = request.path;
        state.log.push(DataModelEvent::Write(path));

        let version_key = (path.endpoint_id, path.cluster_id);
        let current_version = state.versions.get(&version_key).copied().unwrap_or(0);
        if request.path.data_version.is_some_and(|v| v != current_version) {
            debug!("Data version mismatch on {}", path);
            return Err(StatusIB::new(Status::DATA_VERSION_MISMATCH));
        }

        let entry = state
            .attributes
            .get_mut(&path.attribute_path())
            .ok_or(StatusIB::new(Status::UNSUPPORTED_ATTRIBUTE))?;

        match path.list_op {
            ListOperation::NotList => {
                let value =
                    AttributeValue::from_element(&decoder.element()).map_err(constraint_error)?;
                check_max(&value, entry.max_value)?;
                entry.value = value;
            }
            ListOperation::ReplaceAll => {
                let mut items = Vec::new();
                for item in decoder.list_items()? {
                    let value = AttributeValue::from_element(&item).map_err(constraint_error)?;
                    check_max(&value, entry.max_value)?;
                    items.push(value);
                }
                entry.value = AttributeValue::List(items);
            }
            ListOperation::AppendItem => {
                let value =
                    AttributeValue::from_element(&decoder.element()).map_err(constraint_error)?;
                check_max(&value, entry.max_value)?;
                match &mut entry.value {
                    AttributeValue::List(items) => items.push(value),
                    _ => return Err(StatusIB::new(Status::CONSTRAINT_ERROR)),
                }
            }
        }

        state
            .versions
            .insert(version_key, current_version.wrapping_add(1));
        Ok(())
    }

    fn list_attribute_write_notification(
        &self,
        path: &ConcreteAttributePath,
        operation: ListWriteOperation,
    ) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.log.push(DataModelEvent::ListWrite(*path, operation));
        match operation {
            ListWriteOperation::Begin => {
                if let Some(entry) = state.attributes.get(path) {
                    state.list_snapshots.insert(*path, entry.value.clone());
                }
            }
            ListWriteOperation::Success => {
                state.list_snapshots.remove(path);
            }
            ListWriteOperation::Failure => {
                if let (Some(snapshot), Some(entry)) =
                    (state.list_snapshots.remove(path), state.attributes.get_mut(path))
                {
                    info!("Reverting failed list write on {}", path);
                    entry.value = snapshot;
                }
            }
        }
    }

    fn pre_attribute_write(&self, path: &ConcreteDataAttributePath) {
        self.state.lock().log.push(DataModelEvent::PreWrite(*path));
    }

    fn post_attribute_write(&self, path: &ConcreteDataAttributePath, status: &StatusIB) {
        self.state
            .lock()
            .log
            .push(DataModelEvent::PostWrite(*path, status.status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::tlv::{TLVWrite, TlvBuf};
    use crate::matter::types::{Privilege, SubjectDescriptor};

    const BINDING: ConcreteAttributePath = ConcreteAttributePath {
        endpoint_id: 1,
        cluster_id: 0x001E,
        attribute_id: 0x0000,
    };

    fn model() -> InMemoryDataModel {
        let model = InMemoryDataModel::new();
        model.add_attribute(
            BINDING,
            AttributeMetadata::writable(Privilege::Manage).list(),
            AttributeValue::List(vec![AttributeValue::Unsigned(1)]),
        );
        model
    }

    fn write(
        model: &InMemoryDataModel,
        list_op: ListOperation,
        encode: impl FnOnce(&mut TlvBuf),
    ) -> Result<(), StatusIB> {
        let mut w = TlvBuf::unbounded();
        encode(&mut w);
        let element = TLVElement::new(w.as_slice());
        let mut path = ConcreteDataAttributePath::new(BINDING);
        path.list_op = list_op;
        let request = WriteAttributeRequest {
            path,
            subject: SubjectDescriptor::case(1, 1),
            is_timed: false,
        };
        let mut decoder = AttributeValueDecoder::new(element, request.subject);
        model.write_attribute(&request, &mut decoder)
    }

    #[test]
    fn test_missing_paths_report_most_specific_status() {
        let model = model();
        let missing =
            |ep, cl, at| model.attribute_metadata(&ConcreteAttributePath::new(ep, cl, at));
        assert_eq!(missing(9, 0x001E, 0), Err(Status::UNSUPPORTED_ENDPOINT));
        assert_eq!(missing(1, 0x0006, 0), Err(Status::UNSUPPORTED_CLUSTER));
        assert_eq!(missing(1, 0x001E, 5), Err(Status::UNSUPPORTED_ATTRIBUTE));
        assert!(missing(1, 0x001E, 0).unwrap().is_list);
    }

    #[test]
    fn test_failed_list_write_restores_previous_contents() {
        let model = model();
        model.list_attribute_write_notification(&BINDING, ListWriteOperation::Begin);
        write(&model, ListOperation::ReplaceAll, |w| {
            w.start_array(&TLVTag::Anonymous).unwrap();
            w.end_container().unwrap();
        })
        .unwrap();
        write(&model, ListOperation::AppendItem, |w| {
            w.u8(&TLVTag::Anonymous, 7).unwrap()
        })
        .unwrap();
        assert_eq!(
            model.value(&BINDING),
            Some(AttributeValue::List(vec![AttributeValue::Unsigned(7)]))
        );

        model.list_attribute_write_notification(&BINDING, ListWriteOperation::Failure);
        assert_eq!(
            model.value(&BINDING),
            Some(AttributeValue::List(vec![AttributeValue::Unsigned(1)]))
        );
        assert_eq!(model.data_version(1, 0x001E), Some(2));
    }

    #[test]
    fn test_constraint_and_version_checks() {
        let model = model();
        model.set_max_value(&BINDING, 10);
        assert_eq!(
            write(&model, ListOperation::AppendItem, |w| {
                w.u8(&TLVTag::Anonymous, 11).unwrap()
            }),
            Err(StatusIB::new(Status::CONSTRAINT_ERROR))
        );

        let mut w = TlvBuf::unbounded();
        w.u8(&TLVTag::Anonymous, 3).unwrap();
        let mut path = ConcreteDataAttributePath::new(BINDING);
        path.list_op = ListOperation::AppendItem;
        path.data_version = Some(42);
        let request = WriteAttributeRequest {
            path,
            subject: SubjectDescriptor::case(1, 1),
            is_timed: false,
        };
        let element = TLVElement::new(w.as_slice());
        let mut decoder = AttributeValueDecoder::new(element, request.subject);
        assert_eq!(
            model.write_attribute(&request, &mut decoder),
            Err(StatusIB::new(Status::DATA_VERSION_MISMATCH))
        );
        assert_eq!(model.writes().len(), 2);
    }

    #[test]
    fn test_struct_values_keep_member_tags() {
        let mut w = TlvBuf::unbounded();
        w.start_struct(&TLVTag::Anonymous).unwrap();
        w.u64(&TLVTag::Context(1), 0x1122).unwrap();
        w.utf8(&TLVTag::Context(3), "hall").unwrap();
        w.null(&TLVTag::Context(4)).unwrap();
        w.end_container().unwrap();

        let value = AttributeValue::from_element(&TLVElement::new(w.as_slice())).unwrap();
        assert_eq!(
            value,
            AttributeValue::Struct(vec![
                (1, AttributeValue::Unsigned(0x1122)),
                (3, AttributeValue::Utf8("hall".into())),
                (4, AttributeValue::Null),
            ])
        );
    }
}
