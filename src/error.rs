//
//  error.rs
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Error taxonomy. Three families: wire-level violations carry a byte
//  offset, unmarshal type mismatches carry the wire value label, the
//  destination type name and an offset, and marshal failures carry the
//  destination type name. Decoding errors from the support crates are
//  wrapped and propagate unmodified.
//
//  Animats
//  January, 2024.
//  License: LGPL.
//
use thiserror::Error;

/// All errors produced by LLSD encoding and decoding.
#[derive(Debug, Error)]
pub enum LLSDError {
    /// Wire-level violation: unbalanced containers, bad key sequence,
    /// bad header, unknown op code or element name.
    #[error("Invalid LLSD: {problem}")]
    InvalidLLSD { problem: String, offset: u64 },

    /// A wire value cannot be converted to the destination type.
    /// `value` is the wire-type label followed by the raw payload.
    #[error("LLSD: Cannot unmarshal {value} into value of type {dest}.")]
    UnmarshalType {
        value: String,
        dest: &'static str,
        offset: u64,
    },

    /// The encoder cannot represent a destination type. Mostly
    /// unreachable from safe code since unencodable types have no
    /// Marshal impl; kept for custom scalar hooks.
    #[error("LLSD: Cannot marshal value of type {dest}.")]
    MarshalType { dest: &'static str },

    /// A map key with no matching record field, with
    /// disallow_unknown_fields set.
    #[error("LLSD: Unknown field {0:?}")]
    UnknownField(String),

    #[error("Invalid boolean value {0}")]
    InvalidBoolean(String),

    /// Unrecognized binary text encoding name on the wire.
    #[error("Unknown encoding {0:?}")]
    UnknownEncoding(String),

    /// Clean end of input before any token. Distinguishable from wire
    /// errors so callers can probe streams.
    #[error("unexpected end of LLSD input")]
    Eof,

    /// Format auto-detection failed. Carries a snippet of the input.
    #[error("LLSD format not recognized: {0:?}")]
    UnknownFormat(String),

    #[error("date out of range: {0}")]
    DateRange(i64),

    #[error("base 85 decode error: {0}")]
    Base85(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid UTF-8 in LLSD data: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("invalid real value: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("invalid integer value: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("invalid UUID: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("invalid date: {0}")]
    Date(#[from] chrono::ParseError),

    #[error("invalid base 16 payload: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid base 64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl LLSDError {
    /// True for the distinguishable end-of-input condition.
    pub fn is_eof(&self) -> bool {
        matches!(self, LLSDError::Eof)
    }
}
