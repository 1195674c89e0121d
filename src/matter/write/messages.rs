//! Write interaction messages.
//!
//! TLV encoding follows Matter Core Specification 1.4, Sections 10.7.6,
//! 10.7.7 and 10.6.4.

use super::path::{AttributePathIB, ConcreteDataAttributePath};
use crate::matter::status::{Status, StatusIB};
use crate::matter::tlv::{TLVElement, TLVSequence, TLVTag, TLVWrite, TlvBuf, field, optional_field};
use crate::matter::types::DataVersion;
use rs_matter::error::Error;

/// Interaction Model revision sent in every message.
pub const INTERACTION_MODEL_REVISION: u8 = 12;

/// Context tag of the revision field common to all IM messages.
pub const TAG_IM_REVISION: u8 = 0xFF;

/// Context tags for WriteRequestMessage
pub mod request_tags {
    pub const SUPPRESS_RESPONSE: u8 = 0;
    pub const TIMED_REQUEST: u8 = 1;
    pub const WRITE_REQUESTS: u8 = 2;
    pub const MORE_CHUNKED_MESSAGES: u8 = 3;
}

/// Context tags for AttributeDataIB
pub mod data_tags {
    pub const DATA_VERSION: u8 = 0;
    pub const PATH: u8 = 1;
    pub const DATA: u8 = 2;
}

/// Context tags for WriteResponseMessage and AttributeStatusIB
pub mod response_tags {
    pub const WRITE_RESPONSES: u8 = 0;
    pub const STATUS_PATH: u8 = 0;
    pub const STATUS: u8 = 1;
}

/// A parsed WriteRequestMessage.
///
/// ## TLV Structure
/// ```text
/// WriteRequestMessage ::= STRUCTURE {
///     suppress_response [0, opt]: bool,
///     timed_request [1]: bool,
///     write_requests [2]: ARRAY OF AttributeDataIB,
///     more_chunked_messages [3, opt]: bool,
///     interaction_model_revision [0xFF]: unsigned 8-bit,
/// }
/// ```
#[derive(Debug, Clone)]
pub struct WriteRequestMessage<'a> {
    pub suppress_response: bool,
    pub timed_request: bool,
    pub write_requests: TLVSequence<'a>,
    pub more_chunked_messages: bool,
}

fn optional_bool(s: &TLVSequence<'_>, tag: u8) -> Result<bool, Error> {
    Ok(optional_field(s, tag)
        .map(|e| e.bool())
        .transpose()?
        .unwrap_or(false))
}

impl<'a> WriteRequestMessage<'a> {
    pub fn decode(payload: &'a [u8]) -> Result<Self, Error> {
        let s = TLVElement::new(payload).structure()?;
        Ok(Self {
            suppress_response: optional_bool(&s, request_tags::SUPPRESS_RESPONSE)?,
            timed_request: field(&s, request_tags::TIMED_REQUEST)?.bool()?,
            write_requests: field(&s, request_tags::WRITE_REQUESTS)?.array()?,
            more_chunked_messages: optional_bool(&s, request_tags::MORE_CHUNKED_MESSAGES)?,
        })
    }
}

/// One attribute to write.
///
/// ## TLV Structure
/// ```text
/// AttributeDataIB ::= STRUCTURE {
///     data_version [0, opt]: unsigned 32-bit,
///     path [1]: AttributePathIB,
///     data [2]: any,
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AttributeDataIB<'a> {
    pub data_version: Option<DataVersion>,
    pub path: AttributePathIB,
    pub data: TLVElement<'a>,
}

impl<'a> AttributeDataIB<'a> {
    pub fn decode(element: &TLVElement<'a>) -> Result<Self, Error> {
        let s = element.structure()?;
        Ok(Self {
            data_version: optional_field(&s, data_tags::DATA_VERSION)
                .map(|e| e.u32())
                .transpose()?,
            path: AttributePathIB::decode(&field(&s, data_tags::PATH)?.list()?)?,
            data: field(&s, data_tags::DATA)?,
        })
    }
}

/// Closing bytes of a write response: end of array, revision, end of struct.
const RESPONSE_TRAILER_LEN: usize = 1 + 3 + 1;

/// Incremental WriteResponseMessage encoder.
///
/// Space for the message trailer is reserved up front, so a response that
/// accepted its last status can always be finished.
///
/// ## TLV Structure
/// ```text
/// WriteResponseMessage ::= STRUCTURE {
///     write_responses [0]: ARRAY OF AttributeStatusIB,
///     interaction_model_revision [0xFF]: unsigned 8-bit,
/// }
///
/// AttributeStatusIB ::= STRUCTURE {
///     path [0]: AttributePathIB,
///     status [1]: StatusIB,
/// }
/// ```
#[derive(Debug)]
pub struct WriteResponseBuilder {
    writer: TlvBuf,
    statuses: usize,
}

impl WriteResponseBuilder {
    pub fn new(limit: usize) -> Result<Self, Error> {
        let mut writer = TlvBuf::new(limit);
        writer.start_struct(&TLVTag::Anonymous)?;
        writer.start_array(&TLVTag::Context(response_tags::WRITE_RESPONSES))?;
        writer.reserve(RESPONSE_TRAILER_LEN)?;
        Ok(Self {
            writer,
            statuses: 0,
        })
    }

    /// Bytes encoded so far, trailer excluded.
    pub fn encoded_len(&self) -> usize {
        self.writer.len()
    }

    pub fn status_count(&self) -> usize {
        self.statuses
    }

    /// Append one AttributeStatusIB; nothing is written if it does not fit.
    pub fn add_status(
        &mut self,
        path: &ConcreteDataAttributePath,
        status: &StatusIB,
    ) -> Result<(), Error> {
        let tail = self.writer.get_tail();
        let result = self.encode_status(path, status);
        match result {
            Ok(()) => self.statuses += 1,
            Err(_) => self.writer.rewind_to(tail),
        }
        result
    }

    fn encode_status(
        &mut self,
        path: &ConcreteDataAttributePath,
        status: &StatusIB,
    ) -> Result<(), Error> {
        let w = &mut self.writer;
        w.start_struct(&TLVTag::Anonymous)?;
        AttributePathIB::from_data_path(path)
            .encode(&TLVTag::Context(response_tags::STATUS_PATH), w)?;
        status.encode(&TLVTag::Context(response_tags::STATUS), w)?;
        w.end_container()
    }

    pub fn finish(mut self) -> Result<Vec<u8>, Error> {
        self.writer.unreserve(RESPONSE_TRAILER_LEN);
        self.writer.end_container()?;
        self.writer
            .u8(&TLVTag::Context(TAG_IM_REVISION), INTERACTION_MODEL_REVISION)?;
        self.writer.end_container()?;
        Ok(self.writer.into_vec())
    }
}

/// One decoded AttributeStatusIB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeStatus {
    pub path: AttributePathIB,
    pub status: StatusIB,
}

/// Decode the statuses of a WriteResponseMessage.
pub fn decode_write_response(payload: &[u8]) -> Result<Vec<AttributeStatus>, Error> {
    let s = TLVElement::new(payload).structure()?;
    let responses = field(&s, response_tags::WRITE_RESPONSES)?.array()?;
    responses
        .iter()
        .map(|e| {
            let ib = e?.structure()?;
            Ok(AttributeStatus {
                path: AttributePathIB::decode(&field(&ib, response_tags::STATUS_PATH)?.list()?)?,
                status: StatusIB::decode(&field(&ib, response_tags::STATUS)?.structure()?)?,
            })
        })
        .collect()
}

/// Encode a StatusResponseMessage.
///
/// ```text
/// StatusResponseMessage ::= STRUCTURE {
///     status [0]: unsigned 8-bit,
///     interaction_model_revision [0xFF]: unsigned 8-bit,
/// }
/// ```
pub fn encode_status_response(status: Status) -> Result<Vec<u8>, Error> {
    let mut w = TlvBuf::unbounded();
    w.start_struct(&TLVTag::Anonymous)?;
    w.u8(&TLVTag::Context(0), status.code())?;
    w.u8(&TLVTag::Context(TAG_IM_REVISION), INTERACTION_MODEL_REVISION)?;
    w.end_container()?;
    Ok(w.into_vec())
}

pub fn decode_status_response(payload: &[u8]) -> Result<Status, Error> {
    let s = TLVElement::new(payload).structure()?;
    Ok(Status::from_code(field(&s, 0)?.u8()?))
}

/// Client-side WriteRequestMessage encoder.
pub struct WriteRequestBuilder {
    writer: TlvBuf,
}

impl WriteRequestBuilder {
    pub fn new(timed_request: bool, suppress_response: bool) -> Result<Self, Error> {
        let mut writer = TlvBuf::unbounded();
        writer.start_struct(&TLVTag::Anonymous)?;
        if suppress_response {
            writer.bool(&TLVTag::Context(request_tags::SUPPRESS_RESPONSE), true)?;
        }
        writer.bool(&TLVTag::Context(request_tags::TIMED_REQUEST), timed_request)?;
        writer.start_array(&TLVTag::Context(request_tags::WRITE_REQUESTS))?;
        Ok(Self { writer })
    }

    /// Add one AttributeDataIB; `write_data` writes the value under the
    /// tag it is given.
    pub fn attribute<F>(
        mut self,
        path: AttributePathIB,
        data_version: Option<DataVersion>,
        write_data: F,
    ) -> Result<Self, Error>
    where
        F: FnOnce(&mut TlvBuf, &TLVTag) -> Result<(), Error>,
    {
        let w = &mut self.writer;
        w.start_struct(&TLVTag::Anonymous)?;
        if let Some(version) = data_version {
            w.u32(&TLVTag::Context(data_tags::DATA_VERSION), version)?;
        }
        path.encode(&TLVTag::Context(data_tags::PATH), w)?;
        write_data(w, &TLVTag::Context(data_tags::DATA))?;
        w.end_container()?;
        Ok(self)
    }

    pub fn finish(mut self, more_chunked_messages: bool) -> Result<Vec<u8>, Error> {
        self.writer.end_container()?;
        if more_chunked_messages {
            self.writer
                .bool(&TLVTag::Context(request_tags::MORE_CHUNKED_MESSAGES), true)?;
        }
        self.writer
            .u8(&TLVTag::Context(TAG_IM_REVISION), INTERACTION_MODEL_REVISION)?;
        self.writer.end_container()?;
        Ok(self.writer.into_vec())
    }
}
