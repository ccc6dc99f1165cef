//
//  lib.rs
//
//  Rust library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//
//  Supports the XML and binary wire forms, decoding either into typed
//  records declared with the llsd_record! macro or into the dynamic
//  LLSDValue tree. Both forms go through one token stream, so the
//  unmarshaling engine is shared.
//
//  Animats
//  January, 2024.
//  License: LGPL.
//
//
//  Modules
//
pub mod de;
pub mod error;
pub mod record;
pub mod ser;
pub mod token;

#[cfg(test)]
mod tests;

pub use crate::{
    de::{
        auto_unmarshal, from_binary, from_xml, unmarshal_binary, unmarshal_xml, ScalarDecoder,
        Unmarshal, Unmarshaler,
    },
    error::LLSDError,
    record::{
        parse_tag, render_tag, Encoding, FieldDescriptor, MarshalTextScalar, Record, Tag,
        UnmarshalBinaryScalar, UnmarshalTextScalar,
    },
    ser::{marshal_xml, marshal_xml_indent, Marshal, XmlEncoder},
    token::{ScalarToken, ScalarType, Token, TokenReader},
};

use enum_as_inner::EnumAsInner;
use std::collections::HashMap;
use uuid::Uuid;

///  The primitive LLSD data item.
#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum LLSDValue {
    Undefined,
    Boolean(bool),
    Real(f64),
    Integer(i32),
    UUID(Uuid),
    String(String),
    Date(i64),
    URI(String),
    Binary(Vec<u8>),
    Map(HashMap<String, LLSDValue>),
    Array(Vec<LLSDValue>),
}

/// A string carrying the URI tag on the wire.
/// Plain strings decode from `<string>`; this type decodes from
/// `<uri>` and encodes back to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Uri(pub String);

impl Uri {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Uri {
        Uri(s.to_string())
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Uri {
        Uri(s)
    }
}

impl std::fmt::Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
