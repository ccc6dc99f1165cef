//! Serialization: walks a host value and emits a wire form.
//
//  ser/mod.rs -- the Marshal trait.
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Animats
//  February, 2024.
//  License: LGPL.
//
pub mod binary;
pub mod xml;

pub use xml::{marshal_xml, marshal_xml_indent, XmlEncoder};

use crate::error::LLSDError;
use crate::record::Encoding;
use std::io::Write;

/// A value the XML encoder can emit. Implementations exist for the
/// primitive types, containers, `Option`, `LLSDValue` and
/// macro-declared records. 64-bit integers decode but do not encode
/// (LLSD integers are 32 bits on the wire); marshaling one reports
/// `MarshalType`.
pub trait Marshal {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError>;

    /// Encode with a record field's binary text-encoding preference.
    /// Everything except byte sequences ignores it.
    fn marshal_tagged<W: Write>(
        &self,
        enc: &mut XmlEncoder<W>,
        encoding: Encoding,
    ) -> Result<(), LLSDError> {
        let _ = encoding;
        self.marshal(enc)
    }

    //  Byte elements specialize this so Vec<u8> and [u8; N] emit
    //  <binary> while other element types emit <array>.
    #[doc(hidden)]
    fn marshal_slice<W: Write>(
        items: &[Self],
        enc: &mut XmlEncoder<W>,
        encoding: Encoding,
    ) -> Result<(), LLSDError>
    where
        Self: Sized,
    {
        let _ = encoding;
        enc.open("array")?;
        for item in items {
            item.marshal(enc)?;
        }
        enc.close("array")
    }

    /// The omit_empty test: true for empty containers and strings,
    /// false booleans, numeric zero and empty options.
    fn is_empty_value(&self) -> bool {
        false
    }
}
