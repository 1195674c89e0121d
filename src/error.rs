use crate::matter::status::Status;
use rs_matter::error::ErrorCode;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum ImError {
    /// The request can never fit, even into an empty buffer.
    #[error("buffer too small")]
    BufferTooSmall,

    #[error("out of memory: {0}")]
    NoMemory(String),

    #[error("incorrect state: {0}")]
    IncorrectState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("access denied")]
    AccessDenied,

    #[error("access restricted by access restriction list")]
    AccessRestricted,

    #[error("access control failure: {0}")]
    AccessControl(String),

    /// An interaction-model status raised as an error.
    #[error("interaction model status {0:?}")]
    Status(Status),

    /// TLV encoding or decoding failure, or any other `rs_matter` error.
    #[error("matter error: {0:?}")]
    Matter(rs_matter::error::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl ImError {
    /// Status reported to a peer for this error.
    pub fn to_status(&self) -> Status {
        match self {
            ImError::Status(status) => *status,
            ImError::AccessDenied => Status::UNSUPPORTED_ACCESS,
            ImError::AccessRestricted => Status::ACCESS_RESTRICTED,
            ImError::BufferTooSmall | ImError::NoMemory(_) => Status::RESOURCE_EXHAUSTED,
            ImError::InvalidMessage(_) | ImError::Matter(_) => Status::INVALID_ACTION,
            _ => Status::FAILURE,
        }
    }

    /// Whether this is an encoder running out of room.
    pub fn is_no_space(&self) -> bool {
        matches!(self, ImError::Matter(e) if e.code() == ErrorCode::NoSpace)
    }
}

impl From<rs_matter::error::Error> for ImError {
    fn from(e: rs_matter::error::Error) -> Self {
        ImError::Matter(e)
    }
}

impl From<Status> for ImError {
    fn from(status: Status) -> Self {
        ImError::Status(status)
    }
}

pub type Result<T> = std::result::Result<T, ImError>;
