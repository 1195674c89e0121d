//! Typed access to the value of one AttributeDataIB.

use crate::matter::status::{Status, StatusIB};
use crate::matter::tlv::TLVElement;
use crate::matter::types::SubjectDescriptor;
use rs_matter::error::Error;

/// Decoder handed to the data model for one attribute write.
///
/// Decoding failures are reported as `ConstraintError`, the status a
/// provider should answer with for malformed values.
pub struct AttributeValueDecoder<'a> {
    element: TLVElement<'a>,
    subject: SubjectDescriptor,
    tried_decode: bool,
}

fn invalid(_: Error) -> StatusIB {
    StatusIB::new(Status::CONSTRAINT_ERROR)
}

impl<'a> AttributeValueDecoder<'a> {
    pub fn new(element: TLVElement<'a>, subject: SubjectDescriptor) -> Self {
        Self {
            element,
            subject,
            tried_decode: false,
        }
    }

    pub fn subject_descriptor(&self) -> &SubjectDescriptor {
        &self.subject
    }

    /// Whether the provider looked at the value at all.
    pub fn tried_decode(&self) -> bool {
        self.tried_decode
    }

    /// Raw element, for values the typed accessors do not cover.
    pub fn element(&mut self) -> TLVElement<'a> {
        self.tried_decode = true;
        self.element.clone()
    }

    pub fn is_null(&mut self) -> bool {
        self.element().null().is_ok()
    }

    pub fn bool(&mut self) -> Result<bool, StatusIB> {
        self.element().bool().map_err(invalid)
    }

    pub fn u8(&mut self) -> Result<u8, StatusIB> {
        self.element().u8().map_err(invalid)
    }

    pub fn u16(&mut self) -> Result<u16, StatusIB> {
        self.element().u16().map_err(invalid)
    }

    pub fn u32(&mut self) -> Result<u32, StatusIB> {
        self.element().u32().map_err(invalid)
    }

    pub fn u64(&mut self) -> Result<u64, StatusIB> {
        self.element().u64().map_err(invalid)
    }

    pub fn i64(&mut self) -> Result<i64, StatusIB> {
        self.element().i64().map_err(invalid)
    }

    pub fn utf8(&mut self) -> Result<&'a str, StatusIB> {
        self.element().utf8().map_err(invalid)
    }

    /// Octet string value.
    pub fn bytes(&mut self) -> Result<&'a [u8], StatusIB> {
        self.element().str().map_err(invalid)
    }

    /// Items of a list value written with ReplaceAll.
    pub fn list_items(&mut self) -> Result<Vec<TLVElement<'a>>, StatusIB> {
        let array = self.element().array().map_err(invalid)?;
        array
            .iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::tlv::{TLVTag, TLVWrite, TlvBuf};

    #[test]
    fn test_type_mismatch_is_constraint_error() {
        let mut w = TlvBuf::unbounded();
        w.utf8(&TLVTag::Anonymous, "kitchen").unwrap();
        let element = TLVElement::new(w.as_slice());

        let mut decoder = AttributeValueDecoder::new(element, SubjectDescriptor::case(1, 5));
        assert!(!decoder.tried_decode());
        assert_eq!(decoder.u8(), Err(StatusIB::new(Status::CONSTRAINT_ERROR)));
        assert_eq!(decoder.utf8(), Ok("kitchen"));
        assert!(decoder.tried_decode());
    }

    #[test]
    fn test_list_items() {
        let mut w = TlvBuf::unbounded();
        w.start_array(&TLVTag::Anonymous).unwrap();
        w.u8(&TLVTag::Anonymous, 1).unwrap();
        w.u8(&TLVTag::Anonymous, 2).unwrap();
        w.end_container().unwrap();
        let element = TLVElement::new(w.as_slice());

        let mut decoder = AttributeValueDecoder::new(element, SubjectDescriptor::case(1, 5));
        let items = decoder.list_items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].u8().unwrap(), 2);
    }
}
