//
//  token.rs
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Wire-level token model. Both the XML and the binary tokenizer
//  reduce their input to this one event vocabulary, and the
//  unmarshaling engine dispatches on the tag alone.
//
//  Animats
//  January, 2024.
//  License: LGPL.
//
use crate::error::LLSDError;
use std::collections::HashMap;
use std::fmt;

/// XML attributes captured from a scalar element. The only attribute
/// with meaning is `encoding` on `<binary>`.
pub type Attrs = HashMap<String, String>;

/// The nine primitive LLSD types, tagged on every scalar token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Undefined,
    Boolean,
    Integer,
    Real,
    Uuid,
    String,
    Binary,
    Date,
    Uri,
}

impl ScalarType {
    /// The XML element name for this type.
    pub fn element_name(&self) -> &'static str {
        match self {
            ScalarType::Undefined => "undef",
            ScalarType::Boolean => "boolean",
            ScalarType::Integer => "integer",
            ScalarType::Real => "real",
            ScalarType::Uuid => "uuid",
            ScalarType::String => "string",
            ScalarType::Binary => "binary",
            ScalarType::Date => "date",
            ScalarType::Uri => "uri",
        }
    }

    /// Map an XML element name to a scalar type, if it names one.
    pub fn from_element(name: &[u8]) -> Option<ScalarType> {
        match name {
            b"undef" => Some(ScalarType::Undefined),
            b"boolean" => Some(ScalarType::Boolean),
            b"integer" => Some(ScalarType::Integer),
            b"real" => Some(ScalarType::Real),
            b"uuid" => Some(ScalarType::Uuid),
            b"string" => Some(ScalarType::String),
            b"binary" => Some(ScalarType::Binary),
            b"date" => Some(ScalarType::Date),
            b"uri" => Some(ScalarType::Uri),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element_name())
    }
}

/// One scalar wire event. `data` is the raw payload: element inner
/// text for XML, undecoded bytes for binary. Empty data means the
/// type's zero value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarToken {
    pub kind: ScalarType,
    pub data: Vec<u8>,
    pub attrs: Attrs,
}

impl ScalarToken {
    pub fn new(kind: ScalarType) -> ScalarToken {
        ScalarToken {
            kind,
            data: Vec::new(),
            attrs: Attrs::new(),
        }
    }

    pub fn with_data(kind: ScalarType, data: Vec<u8>) -> ScalarToken {
        ScalarToken {
            kind,
            data,
            attrs: Attrs::new(),
        }
    }
}

/// One wire event. The DocumentStart/End pair wraps a single root
/// value and is never emitted from within nested contexts.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    DocumentStart,
    DocumentEnd,
    MapStart,
    MapEnd,
    ArrayStart,
    ArrayEnd,
    Key(Vec<u8>),
    Scalar(ScalarToken),
}

impl Token {
    /// Token name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Token::DocumentStart => "DocumentStart",
            Token::DocumentEnd => "DocumentEnd",
            Token::MapStart => "MapStart",
            Token::MapEnd => "MapEnd",
            Token::ArrayStart => "ArrayStart",
            Token::ArrayEnd => "ArrayEnd",
            Token::Key(_) => "Key",
            Token::Scalar(_) => "Scalar",
        }
    }
}

/// A single-pass, stateful token source over one wire format.
/// Not resumable after an error.
pub trait TokenReader {
    /// Produce the next token, `LLSDError::Eof` at clean end of input.
    fn token(&mut self) -> Result<Token, LLSDError>;

    /// Byte position in the input, for diagnostics.
    fn offset(&self) -> u64;

    /// Discard the remainder of a composite whose start token was just
    /// read. Used to tolerate unknown map fields.
    fn skip(&mut self) -> Result<(), LLSDError> {
        let mut depth = 1u32;
        while depth > 0 {
            match self.token()? {
                Token::MapStart | Token::ArrayStart => depth += 1,
                Token::MapEnd | Token::ArrayEnd => depth -= 1,
                Token::Key(_) | Token::Scalar(_) => {}
                tok => {
                    return Err(LLSDError::InvalidLLSD {
                        problem: format!("unexpected {} inside container", tok.name()),
                        offset: self.offset(),
                    })
                }
            }
        }
        Ok(())
    }
}
