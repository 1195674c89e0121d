//! Matter write interaction.
//!
//! A WriteRequest carries a list of AttributeDataIBs. The server writes each
//! one through the data model and answers with a WriteResponse holding one
//! AttributeStatusIB per attribute. Large list writes are split across
//! chunks: the first chunk replaces the list, later chunks append items.
//!
//! ## Flow
//! 1. `WriteHandler::init()` binds the data model and the write registry
//! 2. `on_write_request()` takes the exchange and processes the first chunk
//! 3. `on_message_received()` processes every further chunk
//! 4. The handler closes itself after the last chunk or on any error

mod decoder;
mod handler;
pub mod messages;
mod path;
mod tracker;

pub use decoder::AttributeValueDecoder;
pub use handler::{WriteHandler, WriteHandlerState};
pub use messages::{
    AttributeDataIB, AttributeStatus, WriteRequestBuilder, WriteRequestMessage,
    WriteResponseBuilder,
};
pub use path::{
    AttributePathIB, ConcreteAttributePath, ConcreteDataAttributePath, ListIndex, ListOperation,
};
pub use tracker::{ActiveWrites, WriteHandlerDelegate, WriteHandlerId};
