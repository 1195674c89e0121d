//! Group membership collaborator.
//!
//! Group writes are expanded to every endpoint the fabric's group table maps
//! to the destination group.

use super::types::{EndpointId, FabricIndex, GroupId};
use parking_lot::RwLock;

/// Fabric group table lookups.
pub trait GroupDataProvider: Send + Sync {
    /// Endpoints of this node that are members of `group_id` on `fabric_index`.
    fn group_endpoints(&self, fabric_index: FabricIndex, group_id: GroupId) -> Vec<EndpointId>;
}

/// One entry of the group table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupEndpoint {
    pub fabric_index: FabricIndex,
    pub group_id: GroupId,
    pub endpoint_id: EndpointId,
}

/// In-memory group table.
#[derive(Default)]
pub struct GroupTable {
    entries: RwLock<Vec<GroupEndpoint>>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an endpoint to a group. Adding it twice has no effect.
    pub fn add_endpoint(
        &self,
        fabric_index: FabricIndex,
        group_id: GroupId,
        endpoint_id: EndpointId,
    ) {
        let entry = GroupEndpoint {
            fabric_index,
            group_id,
            endpoint_id,
        };
        let mut entries = self.entries.write();
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }

    pub fn remove_endpoint(
        &self,
        fabric_index: FabricIndex,
        group_id: GroupId,
        endpoint_id: EndpointId,
    ) {
        self.entries.write().retain(|e| {
            !(e.fabric_index == fabric_index
                && e.group_id == group_id
                && e.endpoint_id == endpoint_id)
        });
    }

    /// Drop every group of a removed fabric.
    pub fn remove_fabric(&self, fabric_index: FabricIndex) {
        self.entries.write().retain(|e| e.fabric_index != fabric_index);
    }
}

impl GroupDataProvider for GroupTable {
    fn group_endpoints(&self, fabric_index: FabricIndex, group_id: GroupId) -> Vec<EndpointId> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.fabric_index == fabric_index && e.group_id == group_id)
            .map(|e| e.endpoint_id)
            .collect()
    }
}
