//! Matter Interaction Model core.
//!
//! Protocol engines (`events`, `write`) and the collaborator interfaces they
//! are wired to (`access`, `data_model`, `exchange`, `groups`).

pub mod access;
pub mod data_model;
pub mod events;
pub mod exchange;
pub mod groups;
pub mod status;
pub mod tlv;
pub mod types;
pub mod write;
