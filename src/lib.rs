//! Matter Interaction Model engine library.
//!
//! This library provides the tiered event log and the chunked attribute
//! write handler of a Matter node, built on the `rs_matter` TLV codec.

pub mod config;
pub mod error;
pub mod matter;
