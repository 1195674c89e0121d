//! Write interaction handler.
//!
//! One `WriteHandler` serves one write transaction: a single WriteRequest,
//! or a chain of chunked WriteRequests on the same exchange. Every
//! AttributeDataIB is checked (schema, ACL, timed) and written through the
//! data model; unicast writes answer with one AttributeStatusIB per
//! attribute, group writes never answer.
//!
//! ## State machine
//! ```text
//! Uninitialized --init--> Initialized --status added--> AddStatus --response sent--> Sending
//!       ^                                                                               |
//!       +---------------------------------- close ---------------------------------------+
//! ```
//! A chunked transaction loops from `Sending` back through `AddStatus` for
//! every further chunk.

use super::decoder::AttributeValueDecoder;
use super::messages::{
    AttributeDataIB, WriteRequestMessage, WriteResponseBuilder, encode_status_response,
};
use super::path::{ConcreteAttributePath, ConcreteDataAttributePath, ListOperation};
use super::tracker::{WriteHandlerDelegate, WriteHandlerId};
use crate::config::WriteConfig;
use crate::error::{ImError, Result};
use crate::matter::access::{AccessControl, AclError, RequestPath};
use crate::matter::data_model::{
    DataModelProvider, ListWriteOperation, WriteAttributeRequest, global_attributes,
};
use crate::matter::exchange::{ExchangeContext, ExchangeId, MessageType};
use crate::matter::groups::GroupDataProvider;
use crate::matter::status::{Status, StatusIB};
use crate::matter::tlv::{TLVElement, TLVSequence};
use crate::matter::types::SubjectDescriptor;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteHandlerState {
    Uninitialized,
    Initialized,
    AddStatus,
    Sending,
}

/// Status reported for an error that aborted a whole WriteRequest.
fn processing_error_status(err: &ImError) -> Status {
    match err {
        ImError::Status(status) => *status,
        // the response itself ran out of room
        e if e.is_no_space() => Status::FAILURE,
        ImError::IncorrectState(_) => Status::FAILURE,
        _ => Status::INVALID_ACTION,
    }
}

/// Handler of one (possibly chunked) write transaction.
pub struct WriteHandler {
    id: WriteHandlerId,
    state: WriteHandlerState,
    exchange: Option<Box<dyn ExchangeContext>>,
    data_model: Option<Arc<dyn DataModelProvider>>,
    delegate: Option<Arc<dyn WriteHandlerDelegate>>,
    access_control: Arc<dyn AccessControl>,
    group_data: Arc<dyn GroupDataProvider>,
    config: WriteConfig,
    response: Option<WriteResponseBuilder>,
    /// Attribute being written, kept across chunks for list bracketing
    processing_path: Option<ConcreteAttributePath>,
    processing_is_list: bool,
    /// Whether every write of the list in progress succeeded
    attribute_write_successful: bool,
    /// ACL checks are skipped for repeated writes to this attribute
    last_successfully_written_path: Option<ConcreteAttributePath>,
    suppress_response: bool,
    is_timed_request: bool,
    has_more_chunks: bool,
}

impl WriteHandler {
    pub fn new(
        access_control: Arc<dyn AccessControl>,
        group_data: Arc<dyn GroupDataProvider>,
        config: WriteConfig,
    ) -> Self {
        Self {
            id: NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed),
            state: WriteHandlerState::Uninitialized,
            exchange: None,
            data_model: None,
            delegate: None,
            access_control,
            group_data,
            config,
            response: None,
            processing_path: None,
            processing_is_list: false,
            attribute_write_successful: false,
            last_successfully_written_path: None,
            suppress_response: false,
            is_timed_request: false,
            has_more_chunks: false,
        }
    }

    /// Prepare the handler for a new transaction.
    pub fn init(
        &mut self,
        data_model: Arc<dyn DataModelProvider>,
        delegate: Arc<dyn WriteHandlerDelegate>,
    ) -> Result<()> {
        if self.exchange.is_some() {
            return Err(ImError::IncorrectState(
                "write handler still owns an exchange".into(),
            ));
        }
        self.data_model = Some(data_model);
        self.delegate = Some(delegate);
        self.last_successfully_written_path = None;
        self.processing_path = None;
        self.processing_is_list = false;
        self.state = WriteHandlerState::Initialized;
        Ok(())
    }

    pub fn id(&self) -> WriteHandlerId {
        self.id
    }

    pub fn state(&self) -> WriteHandlerState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.state == WriteHandlerState::Uninitialized
    }

    pub fn exchange_id(&self) -> Option<ExchangeId> {
        self.exchange.as_ref().map(|e| e.id())
    }

    pub fn processing_path(&self) -> Option<ConcreteAttributePath> {
        self.processing_path
    }

    /// Handle the first WriteRequest of a transaction.
    ///
    /// The handler takes the exchange and keeps it until the transaction
    /// closes. Returns the status of the request: `Success` when it was
    /// processed (the transaction stays open if more chunks follow), or the
    /// status the transaction was closed with.
    pub fn on_write_request(
        &mut self,
        exchange: Box<dyn ExchangeContext>,
        payload: &[u8],
        is_timed_write: bool,
    ) -> Result<Status> {
        if self.state != WriteHandlerState::Initialized || self.exchange.is_some() {
            return Err(ImError::IncorrectState(format!(
                "write handler {} cannot start a transaction in state {:?}",
                self.id, self.state
            )));
        }
        self.exchange = Some(exchange);
        Ok(self.handle_write_request_message(payload, is_timed_write))
    }

    /// Handle a further message on the transaction's exchange.
    ///
    /// Only WriteRequest chunks are accepted; anything else is answered with
    /// `InvalidAction` and closes the transaction.
    pub fn on_message_received(
        &mut self,
        exchange_id: ExchangeId,
        message_type: MessageType,
        payload: &[u8],
    ) -> Result<Status> {
        match self.exchange_id() {
            Some(id) if id == exchange_id => {}
            other => {
                return Err(ImError::IncorrectState(format!(
                    "message on exchange {} delivered to write handler holding {:?}",
                    exchange_id, other
                )));
            }
        }

        if message_type != MessageType::WriteRequest || self.state != WriteHandlerState::Sending {
            warn!(
                "Unexpected {:?} on write exchange {} in state {:?}",
                message_type, exchange_id, self.state
            );
            self.send_status_response(Status::INVALID_ACTION);
            self.close();
            return Ok(Status::INVALID_ACTION);
        }

        // chunked writes are never timed
        Ok(self.handle_write_request_message(payload, false))
    }

    /// The peer did not send the next chunk in time.
    pub fn on_response_timeout(&mut self, exchange_id: ExchangeId) {
        if self.exchange_id() != Some(exchange_id) {
            return;
        }
        warn!(
            "Write handler {} timed out waiting for the next chunk on exchange {}",
            self.id, exchange_id
        );
        self.close();
    }

    /// End the transaction and release the exchange.
    ///
    /// A list write still in progress is reported as failed.
    pub fn close(&mut self) {
        if self.state == WriteHandlerState::Uninitialized {
            return;
        }
        self.deliver_final_list_write_end(false);
        self.exchange = None;
        self.response = None;
        self.data_model = None;
        self.delegate = None;
        self.last_successfully_written_path = None;
        self.suppress_response = false;
        self.is_timed_request = false;
        self.has_more_chunks = false;
        self.state = WriteHandlerState::Uninitialized;
        debug!("Write handler {} closed", self.id);
    }

    fn handle_write_request_message(&mut self, payload: &[u8], is_timed_write: bool) -> Status {
        let is_group = self.exchange.as_ref().is_some_and(|e| e.is_group());

        let status = match self.process_write_request(payload, is_timed_write, is_group) {
            Ok(()) => Status::SUCCESS,
            Err(status) => status,
        };
        if !status.is_success() {
            if !is_group {
                self.send_status_response(status);
            }
            self.close();
            return status;
        }

        if !is_group && (!self.suppress_response || self.has_more_chunks) {
            if let Err(e) = self.send_write_response() {
                error!("Failed to send write response: {}", e);
                self.close();
                return Status::FAILURE;
            }
        }

        if !self.has_more_chunks {
            self.close();
        }
        Status::SUCCESS
    }

    fn process_write_request(
        &mut self,
        payload: &[u8],
        is_timed_write: bool,
        is_group: bool,
    ) -> std::result::Result<(), Status> {
        let request = WriteRequestMessage::decode(payload).map_err(|e| {
            warn!("Malformed WriteRequest: {}", e);
            Status::INVALID_ACTION
        })?;
        self.suppress_response = request.suppress_response;
        self.is_timed_request = request.timed_request;
        self.has_more_chunks = request.more_chunked_messages;

        if self.has_more_chunks && (is_group || self.is_timed_request) {
            warn!("Rejecting chunked write that is group-addressed or timed");
            return Err(Status::INVALID_ACTION);
        }
        if self.is_timed_request != is_timed_write {
            warn!(
                "TimedRequest flag {} does not match the interaction (timed={})",
                self.is_timed_request, is_timed_write
            );
            return Err(Status::TIMED_REQUEST_MISMATCH);
        }

        self.response = Some(
            WriteResponseBuilder::new(self.config.max_response_size)
                .map_err(|_| Status::RESOURCE_EXHAUSTED)?,
        );

        let result = if is_group {
            self.process_group_attribute_data_ibs(request.write_requests)
        } else {
            self.process_attribute_data_ibs(request.write_requests)
        };
        result.map_err(|e| {
            warn!("Write request processing failed: {}", e);
            processing_error_status(&e)
        })
    }

    fn collaborators(
        &self,
    ) -> Result<(Arc<dyn DataModelProvider>, Arc<dyn WriteHandlerDelegate>)> {
        match (&self.data_model, &self.delegate) {
            (Some(dm), Some(delegate)) => Ok((dm.clone(), delegate.clone())),
            _ => Err(ImError::IncorrectState("write handler not initialized".into())),
        }
    }

    fn subject_descriptor(&self) -> Result<SubjectDescriptor> {
        self.exchange
            .as_ref()
            .map(|e| e.subject_descriptor())
            .ok_or_else(|| ImError::IncorrectState("write handler has no exchange".into()))
    }

    /// Rewrite a plain write of a list attribute as a ReplaceAll.
    fn normalize_list_operation(
        data_model: &dyn DataModelProvider,
        path: &mut ConcreteDataAttributePath,
    ) {
        if path.is_list_operation() {
            return;
        }
        if data_model
            .attribute_metadata(&path.attribute_path())
            .is_ok_and(|m| m.is_list)
        {
            path.list_op = ListOperation::ReplaceAll;
        }
    }

    /// Whether `path` must be answered with `Busy` instead of written.
    fn is_busy(
        &self,
        delegate: &dyn WriteHandlerDelegate,
        path: &ConcreteDataAttributePath,
    ) -> bool {
        let attribute = path.attribute_path();
        // list items are only accepted for the list whose ReplaceAll we saw
        delegate.has_conflict_write_requests(self.id, &attribute)
            || (path.is_list_item_operation() && self.processing_path != Some(attribute))
    }

    fn process_attribute_data_ibs(&mut self, items: TLVSequence<'_>) -> Result<()> {
        let (data_model, delegate) = self.collaborators()?;
        let subject = self.subject_descriptor()?;

        for item in items.iter() {
            let data = AttributeDataIB::decode(&item?)?;
            let mut path = data.path.to_concrete()?;
            path.data_version = data.data_version;
            Self::normalize_list_operation(data_model.as_ref(), &mut path);

            if self.is_busy(delegate.as_ref(), &path) {
                debug!("Write to {} is busy", path);
                self.add_status(&path, StatusIB::new(Status::BUSY))?;
                continue;
            }

            self.update_processing_path(&path, data_model.as_ref(), delegate.as_ref());

            data_model.pre_attribute_write(&path);
            let status =
                match self.write_cluster_data(&subject, &path, data.data, data_model.as_ref()) {
                    Ok(()) => StatusIB::SUCCESS,
                    Err(status) => status,
                };
            self.add_status(&path, status)?;
            data_model.post_attribute_write(&path, &status);
        }

        if !self.has_more_chunks {
            self.deliver_final_list_write_end(self.attribute_write_successful);
        }
        Ok(())
    }

    fn process_group_attribute_data_ibs(&mut self, items: TLVSequence<'_>) -> Result<()> {
        let result = self.process_group_items(items);
        match result {
            Ok(()) => self.deliver_final_list_write_end_for_group(true),
            Err(_) => self.deliver_final_list_write_end_for_group(false),
        }
        result
    }

    fn process_group_items(&mut self, items: TLVSequence<'_>) -> Result<()> {
        let (data_model, delegate) = self.collaborators()?;
        let subject = self.subject_descriptor()?;
        let group_id = self
            .exchange
            .as_ref()
            .and_then(|e| e.group_id())
            .ok_or_else(|| ImError::InvalidMessage("group write without group id".into()))?;

        for item in items.iter() {
            let data = AttributeDataIB::decode(&item?)?;
            let (None, Some(cluster_id), Some(attribute_id)) =
                (data.path.endpoint_id, data.path.cluster_id, data.path.attribute_id)
            else {
                return Err(ImError::InvalidMessage(
                    "group write path must name cluster and attribute only".into(),
                ));
            };
            let list_op = data.path.list_operation()?;

            let endpoints = self.group_data.group_endpoints(subject.fabric_index, group_id);
            if endpoints.is_empty() {
                debug!(
                    "Group 0x{:04X} has no endpoints on fabric {}",
                    group_id, subject.fabric_index
                );
            }

            for endpoint_id in endpoints {
                let mut path = ConcreteDataAttributePath::new(ConcreteAttributePath::new(
                    endpoint_id,
                    cluster_id,
                    attribute_id,
                ));
                path.list_op = list_op;
                path.data_version = data.data_version;
                Self::normalize_list_operation(data_model.as_ref(), &mut path);

                if self.is_busy(delegate.as_ref(), &path) {
                    debug!("Skipping busy group write to {}", path);
                    continue;
                }

                self.update_processing_path(&path, data_model.as_ref(), delegate.as_ref());

                data_model.pre_attribute_write(&path);
                let value = data.data.clone();
                let status =
                    match self.write_cluster_data(&subject, &path, value, data_model.as_ref()) {
                        Ok(()) => StatusIB::SUCCESS,
                        Err(status) => {
                            debug!("Group write to {} failed: {:?}", path, status.status);
                            self.attribute_write_successful = false;
                            status
                        }
                    };
                data_model.post_attribute_write(&path, &status);
            }
        }
        Ok(())
    }

    /// Fire list end/begin notifications when the attribute being written
    /// changes, and make `path` the one in progress.
    fn update_processing_path(
        &mut self,
        path: &ConcreteDataAttributePath,
        data_model: &dyn DataModelProvider,
        delegate: &dyn WriteHandlerDelegate,
    ) {
        let attribute = path.attribute_path();
        let changed = self.processing_path != Some(attribute);

        if let Some(previous) = self.processing_path {
            if self.processing_is_list && changed {
                self.deliver_list_write_end(data_model, &previous, self.attribute_write_successful);
            }
        }
        if path.is_list_operation() && changed {
            debug!("List write begin on {}", attribute);
            data_model.list_attribute_write_notification(&attribute, ListWriteOperation::Begin);
            self.attribute_write_successful = true;
        }

        self.processing_is_list = path.is_list_operation();
        if changed {
            self.processing_path = Some(attribute);
            delegate.processing_path_changed(self.id, Some(&attribute));
        }
    }

    fn deliver_list_write_end(
        &self,
        data_model: &dyn DataModelProvider,
        path: &ConcreteAttributePath,
        write_was_successful: bool,
    ) {
        debug!(
            "List write end on {} ({})",
            path,
            if write_was_successful { "success" } else { "failure" }
        );
        let operation = if write_was_successful {
            ListWriteOperation::Success
        } else {
            ListWriteOperation::Failure
        };
        data_model.list_attribute_write_notification(path, operation);
    }

    /// Close the bracket of the list still in progress, if any.
    fn deliver_final_list_write_end(&mut self, write_was_successful: bool) {
        if let (Some(path), true) = (self.processing_path, self.processing_is_list) {
            if let Some(data_model) = &self.data_model {
                self.deliver_list_write_end(data_model.as_ref(), &path, write_was_successful);
            }
        }
        if self.processing_path.take().is_some() {
            if let Some(delegate) = &self.delegate {
                delegate.processing_path_changed(self.id, None);
            }
        }
        self.processing_is_list = false;
    }

    fn deliver_final_list_write_end_for_group(&mut self, write_was_successful: bool) {
        if self.processing_is_list {
            debug!(
                "Closing group list write ({})",
                if write_was_successful { "success" } else { "failure" }
            );
        }
        self.deliver_final_list_write_end(write_was_successful && self.attribute_write_successful);
    }

    fn write_cluster_data(
        &mut self,
        subject: &SubjectDescriptor,
        path: &ConcreteDataAttributePath,
        data: TLVElement<'_>,
        data_model: &dyn DataModelProvider,
    ) -> std::result::Result<(), StatusIB> {
        self.check_write_allowed(subject, path, data_model)
            .map_err(|e| {
                debug!("Write to {} not allowed: {}", path, e);
                StatusIB::new(e.to_status())
            })?;

        let request = WriteAttributeRequest {
            path: *path,
            subject: *subject,
            is_timed: self.is_timed_request,
        };
        let mut decoder = AttributeValueDecoder::new(data, *subject);
        data_model.write_attribute(&request, &mut decoder)?;
        self.last_successfully_written_path = Some(path.attribute_path());
        Ok(())
    }

    /// Schema, privilege, ACL and timed checks for one attribute write.
    fn check_write_allowed(
        &self,
        subject: &SubjectDescriptor,
        path: &ConcreteDataAttributePath,
        data_model: &dyn DataModelProvider,
    ) -> Result<()> {
        let attribute = path.attribute_path();
        let metadata = match data_model.attribute_metadata(&attribute) {
            Ok(metadata) => metadata,
            Err(Status::UNSUPPORTED_ATTRIBUTE)
                if global_attributes::is_read_only_global(attribute.attribute_id) =>
            {
                return Err(Status::UNSUPPORTED_WRITE.into());
            }
            Err(status) => return Err(status.into()),
        };
        let Some(privilege) = metadata.write_privilege else {
            return Err(Status::UNSUPPORTED_WRITE.into());
        };

        if self.last_successfully_written_path != Some(attribute) {
            let request = RequestPath::attribute_write(
                attribute.endpoint_id,
                attribute.cluster_id,
                attribute.attribute_id,
            );
            match self.access_control.check(subject, &request, privilege) {
                Ok(()) => {}
                Err(AclError::Denied) => return Err(ImError::AccessDenied),
                Err(AclError::Restricted) => return Err(ImError::AccessRestricted),
                Err(AclError::Engine(e)) => return Err(ImError::AccessControl(e)),
            }
        }

        if metadata.needs_timed && !self.is_timed_request {
            return Err(Status::NEEDS_TIMED_INTERACTION.into());
        }
        Ok(())
    }

    fn response_builder(&mut self) -> Result<&mut WriteResponseBuilder> {
        self.response
            .as_mut()
            .ok_or_else(|| ImError::IncorrectState("no write response in progress".into()))
    }

    /// Append one AttributeStatusIB to the response.
    fn add_status(&mut self, path: &ConcreteDataAttributePath, status: StatusIB) -> Result<()> {
        self.response_builder()?.add_status(path, &status)?;
        if !status.is_success() {
            debug!("Write to {} answered {:?}", path, status.status);
            self.attribute_write_successful = false;
        }
        self.state = WriteHandlerState::AddStatus;
        Ok(())
    }

    fn send_write_response(&mut self) -> Result<()> {
        let response = self
            .response
            .take()
            .ok_or_else(|| ImError::IncorrectState("no write response in progress".into()))?;
        let statuses = response.status_count();
        let payload = response.finish()?;
        let expect_response = self.has_more_chunks;
        let exchange = self
            .exchange
            .as_mut()
            .ok_or_else(|| ImError::IncorrectState("write handler has no exchange".into()))?;
        exchange.send_message(MessageType::WriteResponse, payload, expect_response)?;
        self.state = WriteHandlerState::Sending;
        info!(
            "Sent WriteResponse with {} statuses on exchange {}{}",
            statuses,
            exchange.id(),
            if expect_response { ", awaiting next chunk" } else { "" }
        );
        Ok(())
    }

    fn send_status_response(&mut self, status: Status) {
        let Some(exchange) = self.exchange.as_mut() else {
            return;
        };
        let sent = encode_status_response(status)
            .map_err(ImError::from)
            .and_then(|payload| exchange.send_message(MessageType::StatusResponse, payload, false));
        if let Err(e) = sent {
            warn!("Failed to send StatusResponse {:?}: {}", status, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::access::{AclEntry, AllowAll, EntryAccessControl};
    use crate::matter::data_model::{
        AttributeMetadata, AttributeValue, DataModelEvent, InMemoryDataModel,
    };
    use crate::matter::exchange::{RecordingExchange, SentMessage};
    use crate::matter::groups::GroupTable;
    use crate::matter::tlv::{TLVTag, TLVWrite, TlvBuf};
    use crate::matter::types::{AuthMode, Privilege};
    use crate::matter::write::messages::{
        AttributeStatus, WriteRequestBuilder, decode_status_response, decode_write_response,
    };
    use crate::matter::write::path::AttributePathIB;
    use crate::matter::write::tracker::ActiveWrites;
    use parking_lot::Mutex;
    use rs_matter::error::Error;
    use std::sync::atomic::AtomicUsize;

    const ON_OFF: u32 = 0x0006;
    const ON_OFF_ATTR: u32 = 0x0000;
    const ON_TIME: u32 = 0x4001;
    const OFF_WAIT_TIME: u32 = 0x4002;
    const ACCESS_CONTROL: u32 = 0x001F;
    const BINDING: u32 = 0x001E;
    const DOOR_LOCK: u32 = 0x0101;
    const AUTO_RELOCK_TIME: u32 = 0x0023;
    const GROUP: u16 = 0x0101;

    fn acl_path() -> ConcreteAttributePath {
        ConcreteAttributePath::new(0, ACCESS_CONTROL, 0x0000)
    }

    fn on_time(endpoint: u16) -> ConcreteAttributePath {
        ConcreteAttributePath::new(endpoint, ON_OFF, ON_TIME)
    }

    fn binding(endpoint: u16) -> ConcreteAttributePath {
        ConcreteAttributePath::new(endpoint, BINDING, 0x0000)
    }

    struct Fixture {
        model: Arc<InMemoryDataModel>,
        writes: Arc<ActiveWrites>,
        groups: Arc<GroupTable>,
    }

    impl Fixture {
        fn new() -> Self {
            let model = InMemoryDataModel::new();
            for ep in [1, 2] {
                model.add_attribute(
                    on_time(ep),
                    AttributeMetadata::writable(Privilege::Operate),
                    AttributeValue::Unsigned(0),
                );
                model.add_attribute(
                    binding(ep),
                    AttributeMetadata::writable(Privilege::Manage).list(),
                    AttributeValue::empty_list(),
                );
            }
            model.add_attribute(
                ConcreteAttributePath::new(1, ON_OFF, OFF_WAIT_TIME),
                AttributeMetadata::writable(Privilege::Operate),
                AttributeValue::Unsigned(0),
            );
            model.add_attribute(
                ConcreteAttributePath::new(1, ON_OFF, ON_OFF_ATTR),
                AttributeMetadata::read_only(),
                AttributeValue::Bool(false),
            );
            model.add_attribute(
                acl_path(),
                AttributeMetadata::writable(Privilege::Administer).list(),
                AttributeValue::empty_list(),
            );
            model.add_attribute(
                ConcreteAttributePath::new(1, DOOR_LOCK, AUTO_RELOCK_TIME),
                AttributeMetadata::writable(Privilege::Manage).timed(),
                AttributeValue::Unsigned(0),
            );

            let groups = GroupTable::new();
            groups.add_endpoint(1, GROUP, 1);
            groups.add_endpoint(1, GROUP, 2);

            Self {
                model: Arc::new(model),
                writes: Arc::new(ActiveWrites::new()),
                groups: Arc::new(groups),
            }
        }

        fn handler_with(&self, acl: Arc<dyn AccessControl>, config: WriteConfig) -> WriteHandler {
            let mut handler = WriteHandler::new(acl, self.groups.clone(), config);
            handler
                .init(self.model.clone(), self.writes.clone())
                .unwrap();
            handler
        }

        fn handler(&self) -> WriteHandler {
            self.handler_with(Arc::new(AllowAll), WriteConfig::default())
        }
    }

    type Outbox = Arc<Mutex<Vec<SentMessage>>>;

    fn unicast(id: ExchangeId) -> (Box<dyn ExchangeContext>, Outbox) {
        let exchange = RecordingExchange::unicast(id, SubjectDescriptor::case(1, 0x1234));
        let outbox = exchange.outbox();
        (Box::new(exchange), outbox)
    }

    fn group_exchange(id: ExchangeId) -> (Box<dyn ExchangeContext>, Outbox) {
        let exchange = RecordingExchange::group(id, SubjectDescriptor::group(1, GROUP), GROUP);
        let outbox = exchange.outbox();
        (Box::new(exchange), outbox)
    }

    fn u8_value(
        value: u8,
    ) -> impl FnOnce(&mut TlvBuf, &TLVTag) -> std::result::Result<(), Error> {
        move |w, tag| w.u8(tag, value)
    }

    fn u16_value(
        value: u16,
    ) -> impl FnOnce(&mut TlvBuf, &TLVTag) -> std::result::Result<(), Error> {
        move |w, tag| w.u16(tag, value)
    }

    fn list_value(
        items: &'static [u8],
    ) -> impl FnOnce(&mut TlvBuf, &TLVTag) -> std::result::Result<(), Error> {
        move |w, tag| {
            w.start_array(tag)?;
            for item in items {
                w.u8(&TLVTag::Anonymous, *item)?;
            }
            w.end_container()
        }
    }

    fn bool_value(
        value: bool,
    ) -> impl FnOnce(&mut TlvBuf, &TLVTag) -> std::result::Result<(), Error> {
        move |w, tag| w.bool(tag, value)
    }

    fn path_ib(path: ConcreteAttributePath) -> AttributePathIB {
        AttributePathIB::concrete(path.endpoint_id, path.cluster_id, path.attribute_id)
    }

    fn last_message(outbox: &Outbox) -> SentMessage {
        outbox.lock().last().cloned().unwrap()
    }

    fn statuses(message: &SentMessage) -> Vec<AttributeStatus> {
        assert_eq!(message.message_type, MessageType::WriteResponse);
        decode_write_response(&message.payload).unwrap()
    }

    fn codes(message: &SentMessage) -> Vec<Status> {
        statuses(message).iter().map(|s| s.status.status).collect()
    }

    #[test]
    fn test_one_status_per_attribute_in_request_order() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, outbox) = unicast(1);

        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u16_value(300))
            .unwrap()
            .attribute(
                path_ib(ConcreteAttributePath::new(1, ON_OFF, ON_OFF_ATTR)),
                None,
                bool_value(true),
            )
            .unwrap()
            .attribute(path_ib(ConcreteAttributePath::new(1, ON_OFF, 0x9999)), None, u8_value(1))
            .unwrap()
            .attribute(path_ib(ConcreteAttributePath::new(1, ON_OFF, 0xFFFD)), None, u8_value(5))
            .unwrap()
            .attribute(path_ib(ConcreteAttributePath::new(7, ON_OFF, ON_TIME)), None, u8_value(1))
            .unwrap()
            .attribute(path_ib(ConcreteAttributePath::new(1, 0x0300, 0x0000)), None, u8_value(1))
            .unwrap()
            .finish(false)
            .unwrap();

        assert_eq!(handler.on_write_request(exchange, &payload, false).unwrap(), Status::SUCCESS);
        let response = last_message(&outbox);
        assert!(!response.expect_response);
        assert_eq!(
            codes(&response),
            vec![
                Status::SUCCESS,
                Status::UNSUPPORTED_WRITE,
                Status::UNSUPPORTED_ATTRIBUTE,
                Status::UNSUPPORTED_WRITE,
                Status::UNSUPPORTED_ENDPOINT,
                Status::UNSUPPORTED_CLUSTER,
            ]
        );
        let paths: Vec<_> = statuses(&response).iter().map(|s| s.path.attribute_id).collect();
        assert_eq!(paths[0], Some(ON_TIME));
        assert_eq!(paths[2], Some(0x9999));

        assert_eq!(fx.model.value(&on_time(1)), Some(AttributeValue::Unsigned(300)));
        assert!(handler.is_free());
        assert_eq!(handler.exchange_id(), None);
    }

    #[test]
    fn test_chunked_list_write_is_bracketed_once() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, outbox) = unicast(7);
        let acl = path_ib(acl_path());

        let chunk1 = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(acl, None, list_value(&[]))
            .unwrap()
            .attribute(acl.append_item(), None, u8_value(1))
            .unwrap()
            .finish(true)
            .unwrap();
        assert_eq!(handler.on_write_request(exchange, &chunk1, false).unwrap(), Status::SUCCESS);
        assert_eq!(handler.state(), WriteHandlerState::Sending);
        let response = last_message(&outbox);
        assert!(response.expect_response);
        assert_eq!(codes(&response), vec![Status::SUCCESS, Status::SUCCESS]);
        assert_eq!(statuses(&response)[1].path.list_index, crate::matter::write::ListIndex::Null);

        let chunk2 = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(acl.append_item(), None, u8_value(2))
            .unwrap()
            .attribute(acl.append_item(), None, u8_value(3))
            .unwrap()
            .finish(true)
            .unwrap();
        assert_eq!(
            handler
                .on_message_received(7, MessageType::WriteRequest, &chunk2)
                .unwrap(),
            Status::SUCCESS
        );
        assert_eq!(handler.processing_path(), Some(acl_path()));
        assert_eq!(
            fx.model.list_notifications(),
            vec![(acl_path(), ListWriteOperation::Begin)]
        );

        let chunk3 = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(acl.append_item(), None, u8_value(4))
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u8_value(9))
            .unwrap()
            .finish(false)
            .unwrap();
        assert_eq!(
            handler
                .on_message_received(7, MessageType::WriteRequest, &chunk3)
                .unwrap(),
            Status::SUCCESS
        );
        assert!(!last_message(&outbox).expect_response);
        assert_eq!(outbox.lock().len(), 3);

        assert_eq!(
            fx.model.list_notifications(),
            vec![
                (acl_path(), ListWriteOperation::Begin),
                (acl_path(), ListWriteOperation::Success),
            ]
        );
        let events = fx.model.events();
        let end = events
            .iter()
            .position(|e| *e == DataModelEvent::ListWrite(acl_path(), ListWriteOperation::Success))
            .unwrap();
        let on_time_write = events
            .iter()
            .position(|e| matches!(e, DataModelEvent::Write(p) if p.attribute_path() == on_time(1)))
            .unwrap();
        assert!(end < on_time_write);

        assert_eq!(
            fx.model.value(&acl_path()),
            Some(AttributeValue::List(
                (1..=4).map(AttributeValue::Unsigned).collect()
            ))
        );
        assert!(handler.is_free());
        assert_eq!(fx.writes.active_count(), 0);
    }

    #[test]
    fn test_list_last_in_final_chunk_ends_at_flush() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, _outbox) = unicast(3);
        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u8_value(1))
            .unwrap()
            .attribute(path_ib(binding(1)), None, list_value(&[5, 6]))
            .unwrap()
            .finish(false)
            .unwrap();
        handler.on_write_request(exchange, &payload, false).unwrap();
        assert_eq!(
            fx.model.list_notifications(),
            vec![
                (binding(1), ListWriteOperation::Begin),
                (binding(1), ListWriteOperation::Success),
            ]
        );
    }

    #[test]
    fn test_conflicting_write_is_busy_and_not_attempted() {
        let fx = Fixture::new();
        let mut first = fx.handler();
        let (exchange, _) = unicast(1);
        let chunk = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(acl_path()), None, list_value(&[1]))
            .unwrap()
            .finish(true)
            .unwrap();
        first.on_write_request(exchange, &chunk, false).unwrap();
        let writes_before = fx.model.writes().len();

        let mut second = fx.handler();
        let (exchange, outbox) = unicast(2);
        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(acl_path()), None, list_value(&[9]))
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u8_value(4))
            .unwrap()
            .finish(false)
            .unwrap();
        second.on_write_request(exchange, &payload, false).unwrap();

        assert_eq!(codes(&last_message(&outbox)), vec![Status::BUSY, Status::SUCCESS]);
        let writes = fx.model.writes();
        assert_eq!(writes.len(), writes_before + 1);
        assert_eq!(writes.last().map(|p| p.attribute_path()), Some(on_time(1)));
        assert_eq!(
            fx.model.value(&acl_path()),
            Some(AttributeValue::List(vec![AttributeValue::Unsigned(1)]))
        );

        first.close();
        assert_eq!(
            fx.model.list_notifications().last(),
            Some(&(acl_path(), ListWriteOperation::Failure))
        );
    }

    #[test]
    fn test_list_item_without_replace_all_is_busy() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, outbox) = unicast(1);
        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(binding(1)).append_item(), None, u8_value(1))
            .unwrap()
            .finish(false)
            .unwrap();
        handler.on_write_request(exchange, &payload, false).unwrap();
        assert_eq!(codes(&last_message(&outbox)), vec![Status::BUSY]);
        assert!(fx.model.writes().is_empty());
        assert!(fx.model.list_notifications().is_empty());
    }

    #[test]
    fn test_group_write_fans_out_without_response() {
        let fx = Fixture::new();
        fx.model.set_max_value(&binding(2), 1);
        let mut handler = fx.handler();
        let (exchange, outbox) = group_exchange(11);

        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(AttributePathIB::group(BINDING, 0x0000), None, list_value(&[5]))
            .unwrap()
            .attribute(AttributePathIB::group(ON_OFF, ON_TIME), None, u8_value(30))
            .unwrap()
            .finish(false)
            .unwrap();
        assert_eq!(handler.on_write_request(exchange, &payload, false).unwrap(), Status::SUCCESS);

        assert!(outbox.lock().is_empty());
        assert_eq!(
            fx.model.list_notifications(),
            vec![
                (binding(1), ListWriteOperation::Begin),
                (binding(1), ListWriteOperation::Success),
                (binding(2), ListWriteOperation::Begin),
                (binding(2), ListWriteOperation::Failure),
            ]
        );
        assert_eq!(fx.model.value(&on_time(1)), Some(AttributeValue::Unsigned(30)));
        assert_eq!(fx.model.value(&on_time(2)), Some(AttributeValue::Unsigned(30)));
        assert!(handler.is_free());
    }

    #[test]
    fn test_group_list_write_closed_on_final_sweep() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, _) = group_exchange(12);
        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(AttributePathIB::group(BINDING, 0x0000), None, list_value(&[1]))
            .unwrap()
            .finish(false)
            .unwrap();
        handler.on_write_request(exchange, &payload, false).unwrap();
        assert_eq!(
            fx.model.list_notifications(),
            vec![
                (binding(1), ListWriteOperation::Begin),
                (binding(1), ListWriteOperation::Success),
                (binding(2), ListWriteOperation::Begin),
                (binding(2), ListWriteOperation::Success),
            ]
        );
    }

    #[test]
    fn test_chunked_group_write_is_rejected_silently() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, outbox) = group_exchange(13);
        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(AttributePathIB::group(ON_OFF, ON_TIME), None, u8_value(1))
            .unwrap()
            .finish(true)
            .unwrap();
        assert_eq!(
            handler.on_write_request(exchange, &payload, false).unwrap(),
            Status::INVALID_ACTION
        );
        assert!(outbox.lock().is_empty());
        assert!(fx.model.writes().is_empty());
        assert!(handler.is_free());
    }

    #[test]
    fn test_timed_flag_mismatch_closes_without_writing() {
        for (flag, negotiated) in [(true, false), (false, true)] {
            let fx = Fixture::new();
            let mut handler = fx.handler();
            let (exchange, outbox) = unicast(4);
            let payload = WriteRequestBuilder::new(flag, false)
                .unwrap()
                .attribute(path_ib(on_time(1)), None, u8_value(1))
                .unwrap()
                .finish(false)
                .unwrap();
            assert_eq!(
                handler.on_write_request(exchange, &payload, negotiated).unwrap(),
                Status::TIMED_REQUEST_MISMATCH
            );
            let message = last_message(&outbox);
            assert_eq!(message.message_type, MessageType::StatusResponse);
            assert_eq!(
                decode_status_response(&message.payload).unwrap(),
                Status::TIMED_REQUEST_MISMATCH
            );
            assert!(fx.model.writes().is_empty());
            assert!(handler.is_free());
        }
    }

    #[test]
    fn test_timed_write_cannot_be_chunked() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, outbox) = unicast(5);
        let payload = WriteRequestBuilder::new(true, false)
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u8_value(1))
            .unwrap()
            .finish(true)
            .unwrap();
        assert_eq!(
            handler.on_write_request(exchange, &payload, true).unwrap(),
            Status::INVALID_ACTION
        );
        assert_eq!(
            decode_status_response(&last_message(&outbox).payload).unwrap(),
            Status::INVALID_ACTION
        );
    }

    #[test]
    fn test_timed_attribute_requires_timed_interaction() {
        let fx = Fixture::new();
        let relock = ConcreteAttributePath::new(1, DOOR_LOCK, AUTO_RELOCK_TIME);

        for timed in [false, true] {
            let mut handler = fx.handler();
            let (exchange, outbox) = unicast(6);
            let payload = WriteRequestBuilder::new(timed, false)
                .unwrap()
                .attribute(path_ib(relock), None, u8_value(60))
                .unwrap()
                .finish(false)
                .unwrap();
            handler.on_write_request(exchange, &payload, timed).unwrap();
            let expected = if timed {
                Status::SUCCESS
            } else {
                Status::NEEDS_TIMED_INTERACTION
            };
            assert_eq!(codes(&last_message(&outbox)), vec![expected]);
        }
        assert_eq!(fx.model.value(&relock), Some(AttributeValue::Unsigned(60)));
    }

    #[test]
    fn test_acl_outcomes_map_to_statuses() {
        let fx = Fixture::new();
        let acl = Arc::new(EntryAccessControl::new());
        acl.add_entry(AclEntry {
            fabric_index: 1,
            auth_mode: AuthMode::Case,
            privilege: Privilege::Operate,
            subjects: vec![0x1234],
            endpoint: None,
            cluster: None,
        });
        acl.add_restriction(1, 2, ON_OFF);
        let mut handler = fx.handler_with(acl, WriteConfig::default());
        let (exchange, outbox) = unicast(8);

        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u8_value(1))
            .unwrap()
            .attribute(path_ib(on_time(2)), None, u8_value(1))
            .unwrap()
            .attribute(path_ib(binding(1)), None, list_value(&[1]))
            .unwrap()
            .finish(false)
            .unwrap();
        handler.on_write_request(exchange, &payload, false).unwrap();
        assert_eq!(
            codes(&last_message(&outbox)),
            vec![Status::SUCCESS, Status::ACCESS_RESTRICTED, Status::UNSUPPORTED_ACCESS]
        );
        // a denied list write still closes its bracket, as failed
        assert_eq!(
            fx.model.list_notifications(),
            vec![
                (binding(1), ListWriteOperation::Begin),
                (binding(1), ListWriteOperation::Failure),
            ]
        );
    }

    struct BrokenAcl;

    impl AccessControl for BrokenAcl {
        fn check(
            &self,
            _: &SubjectDescriptor,
            _: &RequestPath,
            _: Privilege,
        ) -> std::result::Result<(), AclError> {
            Err(AclError::Engine("entry storage corrupt".into()))
        }
    }

    #[test]
    fn test_acl_engine_error_is_failure() {
        let fx = Fixture::new();
        let mut handler = fx.handler_with(Arc::new(BrokenAcl), WriteConfig::default());
        let (exchange, outbox) = unicast(9);
        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u8_value(1))
            .unwrap()
            .finish(false)
            .unwrap();
        handler.on_write_request(exchange, &payload, false).unwrap();
        assert_eq!(codes(&last_message(&outbox)), vec![Status::FAILURE]);
    }

    struct CountingAcl {
        checks: AtomicUsize,
    }

    impl AccessControl for CountingAcl {
        fn check(
            &self,
            _: &SubjectDescriptor,
            _: &RequestPath,
            _: Privilege,
        ) -> std::result::Result<(), AclError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_acl_skipped_for_attribute_just_written() {
        let fx = Fixture::new();
        let acl = Arc::new(CountingAcl {
            checks: AtomicUsize::new(0),
        });
        let mut handler = fx.handler_with(acl.clone(), WriteConfig::default());
        let (exchange, _) = unicast(10);
        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(acl_path()), None, list_value(&[]))
            .unwrap()
            .attribute(path_ib(acl_path()).append_item(), None, u8_value(1))
            .unwrap()
            .attribute(path_ib(acl_path()).append_item(), None, u8_value(2))
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u8_value(1))
            .unwrap()
            .finish(false)
            .unwrap();
        handler.on_write_request(exchange, &payload, false).unwrap();
        assert_eq!(acl.checks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_write_does_not_stop_siblings() {
        let fx = Fixture::new();
        fx.model.set_max_value(&on_time(1), 100);
        let mut handler = fx.handler();
        let (exchange, outbox) = unicast(11);
        let version = fx.model.data_version(1, ON_OFF).unwrap();
        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u16_value(500))
            .unwrap()
            .attribute(path_ib(on_time(1)), Some(version + 5), u8_value(5))
            .unwrap()
            .attribute(
                path_ib(ConcreteAttributePath::new(1, ON_OFF, OFF_WAIT_TIME)),
                Some(version),
                u8_value(7),
            )
            .unwrap()
            .finish(false)
            .unwrap();
        handler.on_write_request(exchange, &payload, false).unwrap();
        assert_eq!(
            codes(&last_message(&outbox)),
            vec![Status::CONSTRAINT_ERROR, Status::DATA_VERSION_MISMATCH, Status::SUCCESS]
        );
        assert_eq!(fx.model.value(&on_time(1)), Some(AttributeValue::Unsigned(0)));
        assert_eq!(fx.model.data_version(1, ON_OFF), Some(version + 1));
    }

    #[test]
    fn test_chunk_on_other_exchange_is_refused() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, _) = unicast(20);
        let chunk = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(acl_path()), None, list_value(&[]))
            .unwrap()
            .finish(true)
            .unwrap();
        handler.on_write_request(exchange, &chunk, false).unwrap();

        assert!(matches!(
            handler.on_message_received(21, MessageType::WriteRequest, &chunk),
            Err(ImError::IncorrectState(_))
        ));
        assert_eq!(handler.state(), WriteHandlerState::Sending);
        assert!(matches!(
            handler.init(fx.model.clone(), fx.writes.clone()),
            Err(ImError::IncorrectState(_))
        ));
    }

    #[test]
    fn test_unexpected_message_type_closes_with_invalid_action() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, outbox) = unicast(30);
        let chunk = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(acl_path()), None, list_value(&[1]))
            .unwrap()
            .finish(true)
            .unwrap();
        handler.on_write_request(exchange, &chunk, false).unwrap();

        assert_eq!(
            handler
                .on_message_received(30, MessageType::ReadRequest, &[])
                .unwrap(),
            Status::INVALID_ACTION
        );
        let message = last_message(&outbox);
        assert_eq!(message.message_type, MessageType::StatusResponse);
        assert_eq!(decode_status_response(&message.payload).unwrap(), Status::INVALID_ACTION);
        assert!(handler.is_free());
        assert_eq!(
            fx.model.list_notifications().last(),
            Some(&(acl_path(), ListWriteOperation::Failure))
        );
        // the failed list write was reverted
        assert_eq!(fx.model.value(&acl_path()), Some(AttributeValue::empty_list()));
    }

    #[test]
    fn test_response_timeout_releases_claimed_path() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, _) = unicast(40);
        let chunk = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(acl_path()), None, list_value(&[]))
            .unwrap()
            .finish(true)
            .unwrap();
        handler.on_write_request(exchange, &chunk, false).unwrap();
        assert_eq!(fx.writes.processing_path(handler.id()), Some(acl_path()));

        handler.on_response_timeout(99);
        assert!(!handler.is_free());
        handler.on_response_timeout(40);
        assert!(handler.is_free());
        assert_eq!(fx.writes.active_count(), 0);
    }

    #[test]
    fn test_suppressed_response_only_for_last_chunk() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, outbox) = unicast(50);
        let single = WriteRequestBuilder::new(false, true)
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u8_value(1))
            .unwrap()
            .finish(false)
            .unwrap();
        handler.on_write_request(exchange, &single, false).unwrap();
        assert!(outbox.lock().is_empty());

        let mut handler = fx.handler();
        let (exchange, outbox) = unicast(51);
        let chunked = WriteRequestBuilder::new(false, true)
            .unwrap()
            .attribute(path_ib(acl_path()), None, list_value(&[]))
            .unwrap()
            .finish(true)
            .unwrap();
        handler.on_write_request(exchange, &chunked, false).unwrap();
        assert_eq!(outbox.lock().len(), 1);
    }

    #[test]
    fn test_response_overflow_fails_transaction() {
        let fx = Fixture::new();
        let mut handler = fx.handler_with(
            Arc::new(AllowAll),
            WriteConfig {
                max_response_size: 20,
            },
        );
        let (exchange, outbox) = unicast(60);
        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u8_value(1))
            .unwrap()
            .finish(false)
            .unwrap();
        assert_eq!(
            handler.on_write_request(exchange, &payload, false).unwrap(),
            Status::FAILURE
        );
        let message = last_message(&outbox);
        assert_eq!(message.message_type, MessageType::StatusResponse);
        assert_eq!(decode_status_response(&message.payload).unwrap(), Status::FAILURE);
    }

    #[test]
    fn test_malformed_request_is_invalid_action() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let (exchange, outbox) = unicast(70);
        assert_eq!(
            handler.on_write_request(exchange, &[0x15, 0x28], false).unwrap(),
            Status::INVALID_ACTION
        );
        assert_eq!(
            decode_status_response(&last_message(&outbox).payload).unwrap(),
            Status::INVALID_ACTION
        );
    }

    #[test]
    fn test_failed_send_closes_transaction() {
        let fx = Fixture::new();
        let mut handler = fx.handler();
        let exchange =
            RecordingExchange::unicast(80, SubjectDescriptor::case(1, 1)).failing_sends();
        let payload = WriteRequestBuilder::new(false, false)
            .unwrap()
            .attribute(path_ib(on_time(1)), None, u8_value(1))
            .unwrap()
            .finish(false)
            .unwrap();
        assert_eq!(
            handler
                .on_write_request(Box::new(exchange), &payload, false)
                .unwrap(),
            Status::FAILURE
        );
        assert!(handler.is_free());
    }

    #[test]
    fn test_uninitialized_handler_refuses_requests() {
        let fx = Fixture::new();
        let mut handler =
            WriteHandler::new(Arc::new(AllowAll), fx.groups.clone(), WriteConfig::default());
        let (exchange, _) = unicast(90);
        assert!(handler.on_write_request(exchange, &[], false).is_err());
    }
}
