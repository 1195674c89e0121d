//! Interaction Model status codes.
//!
//! Codes come from `rs_matter::im::IMStatusCode`. `AccessRestricted` (0x9D),
//! raised when an access restriction list blocks a write, is not in that
//! table and is defined here.

use super::tlv::{TLVSequence, TLVTag, TLVWrite, field, optional_field};
use rs_matter::error::Error;
use rs_matter::im::IMStatusCode;
use std::fmt;

/// Interaction Model status code, as carried on the wire.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Status(u8);

impl Status {
    pub const SUCCESS: Status = Status(IMStatusCode::Success as u8);
    pub const FAILURE: Status = Status(IMStatusCode::Failure as u8);
    pub const UNSUPPORTED_ACCESS: Status = Status(IMStatusCode::UnsupportedAccess as u8);
    pub const UNSUPPORTED_ENDPOINT: Status = Status(IMStatusCode::UnsupportedEndpoint as u8);
    pub const INVALID_ACTION: Status = Status(IMStatusCode::InvalidAction as u8);
    pub const UNSUPPORTED_ATTRIBUTE: Status = Status(IMStatusCode::UnsupportedAttribute as u8);
    pub const CONSTRAINT_ERROR: Status = Status(IMStatusCode::ConstraintError as u8);
    pub const UNSUPPORTED_WRITE: Status = Status(IMStatusCode::UnsupportedWrite as u8);
    pub const RESOURCE_EXHAUSTED: Status = Status(IMStatusCode::ResourceExhausted as u8);
    pub const NOT_FOUND: Status = Status(IMStatusCode::NotFound as u8);
    pub const INVALID_DATA_TYPE: Status = Status(IMStatusCode::InvalidDataType as u8);
    pub const DATA_VERSION_MISMATCH: Status = Status(IMStatusCode::DataVersionMismatch as u8);
    pub const BUSY: Status = Status(IMStatusCode::Busy as u8);
    pub const ACCESS_RESTRICTED: Status = Status(0x9D);
    pub const UNSUPPORTED_CLUSTER: Status = Status(IMStatusCode::UnsupportedCluster as u8);
    pub const NEEDS_TIMED_INTERACTION: Status =
        Status(IMStatusCode::NeedsTimedInteraction as u8);
    pub const UNSUPPORTED_EVENT: Status = Status(IMStatusCode::UnsupportedEvent as u8);
    pub const TIMED_REQUEST_MISMATCH: Status = Status(IMStatusCode::TimedRequestMisMatch as u8);

    pub const fn from_code(code: u8) -> Self {
        Status(code)
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Status::SUCCESS
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Status::SUCCESS => "Success",
            Status::FAILURE => "Failure",
            Status::UNSUPPORTED_ACCESS => "UnsupportedAccess",
            Status::UNSUPPORTED_ENDPOINT => "UnsupportedEndpoint",
            Status::INVALID_ACTION => "InvalidAction",
            Status::UNSUPPORTED_ATTRIBUTE => "UnsupportedAttribute",
            Status::CONSTRAINT_ERROR => "ConstraintError",
            Status::UNSUPPORTED_WRITE => "UnsupportedWrite",
            Status::RESOURCE_EXHAUSTED => "ResourceExhausted",
            Status::NOT_FOUND => "NotFound",
            Status::INVALID_DATA_TYPE => "InvalidDataType",
            Status::DATA_VERSION_MISMATCH => "DataVersionMismatch",
            Status::BUSY => "Busy",
            Status::ACCESS_RESTRICTED => "AccessRestricted",
            Status::UNSUPPORTED_CLUSTER => "UnsupportedCluster",
            Status::NEEDS_TIMED_INTERACTION => "NeedsTimedInteraction",
            Status::UNSUPPORTED_EVENT => "UnsupportedEvent",
            Status::TIMED_REQUEST_MISMATCH => "TimedRequestMismatch",
            _ => return None,
        })
    }
}

impl From<IMStatusCode> for Status {
    fn from(code: IMStatusCode) -> Self {
        Status(code as u8)
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Status(0x{:02X})", self.0),
        }
    }
}

/// Context tags for StatusIB
pub mod tags {
    pub const STATUS: u8 = 0;
    pub const CLUSTER_STATUS: u8 = 1;
}

/// StatusIB: an IM status with an optional cluster-specific status.
///
/// ## TLV Structure
/// ```text
/// StatusIB ::= STRUCTURE {
///     status [0]: unsigned 8-bit,
///     cluster_status [1, opt]: unsigned 8-bit,
/// }
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusIB {
    pub status: Status,
    pub cluster_status: Option<u8>,
}

impl StatusIB {
    pub const SUCCESS: StatusIB = StatusIB::new(Status::SUCCESS);

    pub const fn new(status: Status) -> Self {
        Self {
            status,
            cluster_status: None,
        }
    }

    pub const fn cluster_specific(cluster_status: u8) -> Self {
        Self {
            status: Status::FAILURE,
            cluster_status: Some(cluster_status),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn encode(&self, tag: &TLVTag, tw: &mut impl TLVWrite) -> Result<(), Error> {
        tw.start_struct(tag)?;
        tw.u8(&TLVTag::Context(tags::STATUS), self.status.code())?;
        if let Some(cluster_status) = self.cluster_status {
            tw.u8(&TLVTag::Context(tags::CLUSTER_STATUS), cluster_status)?;
        }
        tw.end_container()
    }

    pub fn decode(s: &TLVSequence<'_>) -> Result<Self, Error> {
        Ok(Self {
            status: Status::from_code(field(s, tags::STATUS)?.u8()?),
            cluster_status: optional_field(s, tags::CLUSTER_STATUS).and_then(|e| e.u8().ok()),
        })
    }
}

impl From<Status> for StatusIB {
    fn from(status: Status) -> Self {
        StatusIB::new(status)
    }
}
