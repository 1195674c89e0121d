//! Identifier aliases and access subjects shared by the event and write paths.

use serde::{Deserialize, Serialize};
use strum::FromRepr;

pub type NodeId = u64;
pub type EndpointId = u16;
pub type ClusterId = u32;
pub type AttributeId = u32;
pub type EventId = u32;
pub type FabricIndex = u8;
pub type GroupId = u16;
pub type DataVersion = u32;
pub type EventNumber = u64;

/// Fabric index meaning "no fabric".
pub const UNDEFINED_FABRIC_INDEX: FabricIndex = 0;

/// Access privilege levels, ordered from least to most powerful.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, FromRepr, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Privilege {
    View = 1,
    ProxyView = 2,
    Operate = 3,
    Manage = 4,
    Administer = 5,
}

impl Privilege {
    /// Whether holding `self` grants `required`.
    pub fn grants(self, required: Privilege) -> bool {
        self >= required
    }
}

/// How the peer of an exchange was authenticated.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AuthMode {
    None,
    Pase,
    Case,
    Group,
}

/// Who is performing an interaction, as seen by access control.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubjectDescriptor {
    pub fabric_index: FabricIndex,
    pub auth_mode: AuthMode,
    /// Operational node id (CASE) or group id (Group)
    pub subject: u64,
    pub is_commissioning: bool,
}

impl SubjectDescriptor {
    pub fn case(fabric_index: FabricIndex, node_id: NodeId) -> Self {
        Self {
            fabric_index,
            auth_mode: AuthMode::Case,
            subject: node_id,
            is_commissioning: false,
        }
    }

    pub fn group(fabric_index: FabricIndex, group_id: GroupId) -> Self {
        Self {
            fabric_index,
            auth_mode: AuthMode::Group,
            subject: group_id as u64,
            is_commissioning: false,
        }
    }
}
