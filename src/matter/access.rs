//! Access control collaborator.
//!
//! The write handler asks access control before every attribute write (unless
//! the same attribute was just written successfully in the same transaction),
//! and event fetching asks it before delivering each event.

use super::types::{
    AttributeId, AuthMode, ClusterId, EndpointId, EventId, FabricIndex, Privilege,
    SubjectDescriptor,
};
use parking_lot::RwLock;
use thiserror::Error;

/// What kind of request an access check is made for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestType {
    AttributeReadRequest,
    AttributeWriteRequest,
    EventReadRequest,
}

/// Target of an access check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RequestPath {
    pub endpoint: EndpointId,
    pub cluster: ClusterId,
    pub request_type: RequestType,
    /// Attribute or event id
    pub entity_id: u32,
}

impl RequestPath {
    pub fn attribute_write(
        endpoint: EndpointId,
        cluster: ClusterId,
        attribute: AttributeId,
    ) -> Self {
        Self {
            endpoint,
            cluster,
            request_type: RequestType::AttributeWriteRequest,
            entity_id: attribute,
        }
    }

    pub fn event_read(endpoint: EndpointId, cluster: ClusterId, event: EventId) -> Self {
        Self {
            endpoint,
            cluster,
            request_type: RequestType::EventReadRequest,
            entity_id: event,
        }
    }
}

/// Outcome of a failed access check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AclError {
    #[error("access denied")]
    Denied,

    /// Blocked by an access restriction list entry
    #[error("access restricted")]
    Restricted,

    /// The access control engine itself failed.
    #[error("access control engine error: {0}")]
    Engine(String),
}

/// Access control engine.
pub trait AccessControl: Send + Sync {
    fn check(
        &self,
        subject: &SubjectDescriptor,
        path: &RequestPath,
        privilege: Privilege,
    ) -> Result<(), AclError>;
}

/// Grants every request.
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn check(&self, _: &SubjectDescriptor, _: &RequestPath, _: Privilege) -> Result<(), AclError> {
        Ok(())
    }
}

/// One access control entry.
#[derive(Clone, Debug)]
pub struct AclEntry {
    pub fabric_index: FabricIndex,
    pub auth_mode: AuthMode,
    pub privilege: Privilege,
    /// Subjects granted by this entry; empty means any subject on the fabric
    pub subjects: Vec<u64>,
    /// Endpoint restriction, `None` for all endpoints
    pub endpoint: Option<EndpointId>,
    /// Cluster restriction, `None` for all clusters
    pub cluster: Option<ClusterId>,
}

impl AclEntry {
    fn matches(&self, subject: &SubjectDescriptor, path: &RequestPath) -> bool {
        self.fabric_index == subject.fabric_index
            && self.auth_mode == subject.auth_mode
            && (self.subjects.is_empty() || self.subjects.contains(&subject.subject))
            && self.endpoint.is_none_or(|e| e == path.endpoint)
            && self.cluster.is_none_or(|c| c == path.cluster)
    }
}

/// Entry-list access control with an optional restriction list.
///
/// PASE sessions during commissioning are implicitly administrators.
#[derive(Default)]
pub struct EntryAccessControl {
    entries: RwLock<Vec<AclEntry>>,
    restrictions: RwLock<Vec<(FabricIndex, EndpointId, ClusterId)>>,
}

impl EntryAccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&self, entry: AclEntry) {
        self.entries.write().push(entry);
    }

    /// Restrict every write to a cluster instance for one fabric.
    pub fn add_restriction(&self, fabric: FabricIndex, endpoint: EndpointId, cluster: ClusterId) {
        self.restrictions.write().push((fabric, endpoint, cluster));
    }
}

impl AccessControl for EntryAccessControl {
    fn check(
        &self,
        subject: &SubjectDescriptor,
        path: &RequestPath,
        privilege: Privilege,
    ) -> Result<(), AclError> {
        if subject.auth_mode == AuthMode::Pase && subject.is_commissioning {
            return Ok(());
        }

        let granted = self
            .entries
            .read()
            .iter()
            .any(|e| e.matches(subject, path) && e.privilege.grants(privilege));
        if !granted {
            return Err(AclError::Denied);
        }

        let restricted = path.request_type == RequestType::AttributeWriteRequest
            && self.restrictions.read().iter().any(|(f, e, c)| {
                *f == subject.fabric_index && *e == path.endpoint && *c == path.cluster
            });
        if restricted {
            return Err(AclError::Restricted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operate_entry() -> AclEntry {
        AclEntry {
            fabric_index: 1,
            auth_mode: AuthMode::Case,
            privilege: Privilege::Operate,
            subjects: vec![0x1122],
            endpoint: Some(1),
            cluster: None,
        }
    }

    #[test]
    fn test_entry_grants_matching_subject() {
        let acl = EntryAccessControl::new();
        acl.add_entry(operate_entry());
        let subject = SubjectDescriptor::case(1, 0x1122);
        let path = RequestPath::attribute_write(1, 0x0006, 0x4003);
        assert_eq!(acl.check(&subject, &path, Privilege::Operate), Ok(()));
        assert_eq!(
            acl.check(&subject, &path, Privilege::Manage),
            Err(AclError::Denied)
        );
    }

    #[test]
    fn test_other_fabric_or_endpoint_is_denied() {
        let acl = EntryAccessControl::new();
        acl.add_entry(operate_entry());
        let path = RequestPath::attribute_write(1, 0x0006, 0x4003);
        assert_eq!(
            acl.check(&SubjectDescriptor::case(2, 0x1122), &path, Privilege::View),
            Err(AclError::Denied)
        );
        let other_ep = RequestPath::attribute_write(2, 0x0006, 0x4003);
        assert_eq!(
            acl.check(&SubjectDescriptor::case(1, 0x1122), &other_ep, Privilege::View),
            Err(AclError::Denied)
        );
    }

    #[test]
    fn test_restriction_only_applies_to_writes() {
        let acl = EntryAccessControl::new();
        acl.add_entry(operate_entry());
        acl.add_restriction(1, 1, 0x0006);
        let subject = SubjectDescriptor::case(1, 0x1122);
        assert_eq!(
            acl.check(
                &subject,
                &RequestPath::attribute_write(1, 0x0006, 0),
                Privilege::Operate
            ),
            Err(AclError::Restricted)
        );
        assert_eq!(
            acl.check(&subject, &RequestPath::event_read(1, 0x0006, 0), Privilege::View),
            Ok(())
        );
    }
}
