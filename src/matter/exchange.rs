//! Exchange layer collaborator.
//!
//! An exchange carries the messages of one interaction between two nodes
//! (or from a node to a group). The write handler holds the exchange of the
//! transaction it is processing and sends its responses through it.

use super::types::{GroupId, SubjectDescriptor};
use crate::error::{ImError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use strum::FromRepr;

pub type ExchangeId = u16;

/// Interaction Model protocol opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u8)]
pub enum MessageType {
    StatusResponse = 0x01,
    ReadRequest = 0x02,
    SubscribeRequest = 0x03,
    SubscribeResponse = 0x04,
    ReportData = 0x05,
    WriteRequest = 0x06,
    WriteResponse = 0x07,
    InvokeRequest = 0x08,
    InvokeResponse = 0x09,
    TimedRequest = 0x0A,
}

/// One exchange, as seen by an interaction handler.
pub trait ExchangeContext: Send {
    fn id(&self) -> ExchangeId;

    /// Whether the exchange was opened by a group-addressed message.
    fn is_group(&self) -> bool;

    /// Destination group of a group exchange.
    fn group_id(&self) -> Option<GroupId>;

    /// Subject of the session the exchange runs on.
    fn subject_descriptor(&self) -> SubjectDescriptor;

    fn send_message(
        &mut self,
        message_type: MessageType,
        payload: Vec<u8>,
        expect_response: bool,
    ) -> Result<()>;
}

/// A message handed to [`RecordingExchange::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
    pub expect_response: bool,
}

/// In-process exchange that records everything sent on it.
///
/// The outbox is shared, so it stays readable after the handler that owned
/// the exchange released it.
pub struct RecordingExchange {
    id: ExchangeId,
    subject: SubjectDescriptor,
    group_id: Option<GroupId>,
    outbox: Arc<Mutex<Vec<SentMessage>>>,
    fail_sends: bool,
}

impl RecordingExchange {
    pub fn unicast(id: ExchangeId, subject: SubjectDescriptor) -> Self {
        Self {
            id,
            subject,
            group_id: None,
            outbox: Arc::new(Mutex::new(Vec::new())),
            fail_sends: false,
        }
    }

    pub fn group(id: ExchangeId, subject: SubjectDescriptor, group_id: GroupId) -> Self {
        Self {
            group_id: Some(group_id),
            ..Self::unicast(id, subject)
        }
    }

    /// Make every send fail, as if the peer went away.
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn outbox(&self) -> Arc<Mutex<Vec<SentMessage>>> {
        self.outbox.clone()
    }
}

impl ExchangeContext for RecordingExchange {
    fn id(&self) -> ExchangeId {
        self.id
    }

    fn is_group(&self) -> bool {
        self.group_id.is_some()
    }

    fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    fn subject_descriptor(&self) -> SubjectDescriptor {
        self.subject
    }

    fn send_message(
        &mut self,
        message_type: MessageType,
        payload: Vec<u8>,
        expect_response: bool,
    ) -> Result<()> {
        if self.fail_sends {
            return Err(ImError::IncorrectState(format!(
                "exchange {} is closed",
                self.id
            )));
        }
        self.outbox.lock().push(SentMessage {
            message_type,
            payload,
            expect_response,
        });
        Ok(())
    }
}
