//! De-serialization: drives a token stream into a caller-owned
//! destination, either a typed record or an LLSDValue tree.
//
//  de/mod.rs -- the unmarshaling engine and its conversion matrix.
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  The engine reads tokens one at a time and dispatches through the
//  Unmarshal trait on the destination. Composite destinations loop
//  back into the engine; scalar destinations consume the current
//  scalar token and apply the cross-type conversion rules.
//
//  Animats
//  February, 2024.
//  License: LGPL.
//
pub mod binary;
pub mod xml;

use crate::error::LLSDError;
use crate::record::{cached_fields, Record};
use crate::token::{ScalarToken, ScalarType, Token, TokenReader};
use crate::{LLSDValue, Uri};
use chrono::{DateTime, Utc};
use std::any::type_name;
use std::collections::HashMap;
use std::io::{BufRead, Read};
use uuid::Uuid;

/// Payload-level decoding of primitive values. One implementation per
/// wire family: text payloads for XML, raw bytes for binary. Empty
/// payloads decode to the type's zero value.
pub trait ScalarDecoder {
    fn real(&self, data: &[u8]) -> Result<f64, LLSDError>;
    fn uuid(&self, data: &[u8]) -> Result<Uuid, LLSDError>;
    fn integer(&self, data: &[u8]) -> Result<i64, LLSDError>;
    fn binary(&self, data: &[u8], encoding: &str) -> Result<Vec<u8>, LLSDError>;
    fn date(&self, data: &[u8]) -> Result<DateTime<Utc>, LLSDError>;
    fn boolean(&self, data: &[u8]) -> Result<bool, LLSDError>;
}

/// A destination the engine can populate from a token stream.
///
/// Implementations for the primitive types, containers, `Option`,
/// `LLSDValue` and macro-declared records are provided; `llsd_scalar!`
/// wires in custom scalar handling for user types.
pub trait Unmarshal {
    /// Decode the current wire value into `self`.
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError>;

    /// The LLSD zero value, used when the engine allocates slots.
    fn zero() -> Self
    where
        Self: Sized;

    //  Byte elements specialize the two methods below so that Vec<u8>
    //  and [u8; N] read <binary> scalars while every other element
    //  type reads <array> containers.

    #[doc(hidden)]
    fn unmarshal_vec(vec: &mut Vec<Self>, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError>
    where
        Self: Sized,
    {
        if !u.open_composite(type_name::<Vec<Self>>(), true)? {
            return Ok(());
        }
        loop {
            u.advance()?;
            if matches!(u.peek()?, Token::ArrayEnd) {
                u.take()?;
                return Ok(());
            }
            vec.push(Self::zero());
            if let Some(slot) = vec.last_mut() {
                u.value(slot)?;
            }
        }
    }

    #[doc(hidden)]
    fn unmarshal_slots(
        slots: &mut [Self],
        u: &mut Unmarshaler<'_>,
        dest: &'static str,
    ) -> Result<(), LLSDError>
    where
        Self: Sized,
    {
        if !u.open_composite(dest, true)? {
            return Ok(());
        }
        let mut index = 0;
        loop {
            u.advance()?;
            if matches!(u.peek()?, Token::ArrayEnd) {
                u.take()?;
                return Ok(());
            }
            if index < slots.len() {
                u.value(&mut slots[index])?;
            } else {
                //  Excess wire elements are drained and dropped.
                u.drain_value()?;
            }
            index += 1;
        }
    }
}

/// The unmarshaling engine. Owns a tokenizer, a scalar decoder and the
/// current token; destinations pull from it through `Unmarshal`.
pub struct Unmarshaler<'a> {
    /// Error on map keys with no matching record field.
    pub disallow_unknown_fields: bool,
    text: bool,
    dec: &'static dyn ScalarDecoder,
    scan: Box<dyn TokenReader + 'a>,
    tok: Option<Token>,
}

impl<'a> Unmarshaler<'a> {
    /// Unmarshaler reading LLSD XML.
    pub fn from_xml_reader<R: BufRead + 'a>(source: R) -> Unmarshaler<'a> {
        Unmarshaler {
            disallow_unknown_fields: false,
            text: true,
            dec: &xml::TextDecoder,
            scan: Box::new(xml::XmlScanner::new(source)),
            tok: None,
        }
    }

    /// Unmarshaler reading binary LLSD.
    pub fn from_binary_reader<R: Read + 'a>(source: R) -> Unmarshaler<'a> {
        Unmarshaler {
            disallow_unknown_fields: false,
            text: false,
            dec: &binary::BinaryDecoder,
            scan: Box::new(binary::BinaryScanner::new(source)),
            tok: None,
        }
    }

    /// Unmarshaler over any token source. Text mode selects the text
    /// scalar decoder and the encoding attribute handling.
    pub fn from_token_reader(scan: Box<dyn TokenReader + 'a>, text: bool) -> Unmarshaler<'a> {
        Unmarshaler {
            disallow_unknown_fields: false,
            text,
            dec: if text {
                &xml::TextDecoder
            } else {
                &binary::BinaryDecoder
            },
            scan,
            tok: None,
        }
    }

    /// Decode one complete document into `dst`. A clean end of input
    /// before the first token surfaces as `LLSDError::Eof`.
    pub fn unmarshal<T: Unmarshal>(&mut self, dst: &mut T) -> Result<(), LLSDError> {
        self.advance()?;
        match self.peek()? {
            Token::DocumentStart => {}
            _ => return Err(self.invalid("missing document start.")),
        }
        self.advance()?;
        self.value(dst)
    }

    /// Byte position of the underlying tokenizer.
    pub fn offset(&self) -> u64 {
        self.scan.offset()
    }

    /// Whether this engine reads a text wire form.
    pub fn is_text(&self) -> bool {
        self.text
    }

    /// Dispatch the current token into a destination. Only container
    /// starts and scalars may begin a value.
    pub fn value<T: Unmarshal>(&mut self, dst: &mut T) -> Result<(), LLSDError> {
        match self.peek()? {
            Token::MapStart | Token::ArrayStart | Token::Scalar(_) => dst.unmarshal(self),
            tok => {
                let name = tok.name();
                Err(self.invalid(format!("unexpected {}", name)))
            }
        }
    }

    /// Decode a map into a record, consulting the field descriptor
    /// cache. Unknown keys are skipped (one whole value each) unless
    /// `disallow_unknown_fields` is set.
    pub fn record<T: Record>(&mut self, dst: &mut T) -> Result<(), LLSDError> {
        if !self.open_composite(type_name::<T>(), false)? {
            return Ok(());
        }
        let fields = cached_fields::<T>();
        loop {
            match self.next_token()? {
                Token::Key(raw) => {
                    let key =
                        String::from_utf8(raw).map_err(|e| LLSDError::Utf8(e.utf8_error()))?;
                    match fields.get(&key) {
                        Some(desc) => {
                            let source = desc.source;
                            self.advance()?;
                            dst.unmarshal_field(source, self)?;
                        }
                        None => {
                            if self.disallow_unknown_fields {
                                return Err(LLSDError::UnknownField(key));
                            }
                            self.advance()?;
                            self.drain_value()?;
                        }
                    }
                }
                Token::MapEnd => return Ok(()),
                tok => {
                    return Err(self.invalid(format!(
                        "expected map to start with key, got {}",
                        tok.name()
                    )))
                }
            }
        }
    }

    /// Current token as a scalar, consumed. Container starts report
    /// the object/array type-mismatch labels.
    pub fn take_scalar(&mut self, dest: &'static str) -> Result<ScalarToken, LLSDError> {
        match self.take()? {
            Token::Scalar(s) => Ok(s),
            Token::MapStart => Err(self.type_error(dest, "object")),
            Token::ArrayStart => Err(self.type_error(dest, "array")),
            tok => Err(self.invalid(format!("unexpected {}", tok.name()))),
        }
    }

    /// Decode a binary scalar payload, honoring the wire encoding
    /// attribute in text mode (base16 when absent).
    pub fn decode_binary(&self, tok: &ScalarToken) -> Result<Vec<u8>, LLSDError> {
        let encoding = if self.text {
            tok.attrs
                .get("encoding")
                .map(|s| s.as_str())
                .unwrap_or("base16")
        } else {
            ""
        };
        self.dec.binary(&tok.data, encoding)
    }

    /// Type-mismatch error for a scalar token, labeled with the wire
    /// type and raw payload.
    pub fn scalar_mismatch(&self, dest: &'static str, tok: &ScalarToken) -> LLSDError {
        self.type_error(
            dest,
            format!("{} {}", tok.kind, String::from_utf8_lossy(&tok.data)),
        )
    }

    //  Internal machinery below; destinations outside this module go
    //  through the public methods above.

    fn advance(&mut self) -> Result<(), LLSDError> {
        self.tok = Some(self.scan.token()?);
        Ok(())
    }

    fn peek(&self) -> Result<&Token, LLSDError> {
        self.tok.as_ref().ok_or_else(|| LLSDError::InvalidLLSD {
            problem: "no current token".to_string(),
            offset: self.scan.offset(),
        })
    }

    fn take(&mut self) -> Result<Token, LLSDError> {
        self.tok.take().ok_or_else(|| LLSDError::InvalidLLSD {
            problem: "no current token".to_string(),
            offset: self.scan.offset(),
        })
    }

    fn next_token(&mut self) -> Result<Token, LLSDError> {
        self.advance()?;
        self.take()
    }

    fn invalid(&self, problem: impl Into<String>) -> LLSDError {
        LLSDError::InvalidLLSD {
            problem: problem.into(),
            offset: self.scan.offset(),
        }
    }

    fn type_error(&self, dest: &'static str, value: impl Into<String>) -> LLSDError {
        LLSDError::UnmarshalType {
            value: value.into(),
            dest,
            offset: self.scan.offset(),
        }
    }

    fn short_binary(&self, dest: &'static str, tok: &ScalarToken) -> LLSDError {
        self.type_error(
            dest,
            format!(
                "binary (too few bytes) {}",
                String::from_utf8_lossy(&tok.data)
            ),
        )
    }

    /// Open a composite destination. Ok(true) consumes the start
    /// token; Ok(false) means the wire value was `<undef />` and the
    /// destination is left untouched.
    fn open_composite(&mut self, dest: &'static str, array: bool) -> Result<bool, LLSDError> {
        match self.take()? {
            Token::ArrayStart if array => Ok(true),
            Token::MapStart if !array => Ok(true),
            Token::MapStart => Err(self.type_error(dest, "object")),
            Token::ArrayStart => Err(self.type_error(dest, "array")),
            Token::Scalar(s) if s.kind == ScalarType::Undefined => Ok(false),
            Token::Scalar(s) => Err(self.scalar_mismatch(dest, &s)),
            tok => Err(self.invalid(format!("unexpected {}", tok.name()))),
        }
    }

    /// Discard the current value completely, containers included.
    fn drain_value(&mut self) -> Result<(), LLSDError> {
        match self.take()? {
            Token::Scalar(_) => Ok(()),
            Token::MapStart | Token::ArrayStart => self.scan.skip(),
            tok => Err(self.invalid(format!("unexpected {}", tok.name()))),
        }
    }
}

//
//  The conversion matrix, one Unmarshal impl per destination kind.
//  Every impl accepts Undefined as a no-op (the LLSD null leaves the
//  destination at its prior value).
//

//  Signed integers without binary conversions.
macro_rules! narrow_signed_unmarshal {
    ($($t:ty),*) => {$(
        impl Unmarshal for $t {
            fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
                let dest = type_name::<$t>();
                let tok = u.take_scalar(dest)?;
                match tok.kind {
                    ScalarType::Integer => {
                        let value = u.dec.integer(&tok.data)?;
                        *self = <$t>::try_from(value)
                            .map_err(|_| u.scalar_mismatch(dest, &tok))?;
                        Ok(())
                    }
                    ScalarType::Date => {
                        let epoch = u.dec.date(&tok.data)?.timestamp();
                        *self = <$t>::try_from(epoch)
                            .map_err(|_| u.scalar_mismatch(dest, &tok))?;
                        Ok(())
                    }
                    ScalarType::Undefined => Ok(()),
                    _ => Err(u.scalar_mismatch(dest, &tok)),
                }
            }

            fn zero() -> $t {
                0
            }
        }
    )*};
}

narrow_signed_unmarshal!(i8, i16);

impl Unmarshal for i32 {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<i32>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Integer => {
                let value = u.dec.integer(&tok.data)?;
                *self = i32::try_from(value).map_err(|_| u.scalar_mismatch(dest, &tok))?;
                Ok(())
            }
            ScalarType::Date => {
                let epoch = u.dec.date(&tok.data)?.timestamp();
                *self = i32::try_from(epoch).map_err(|_| u.scalar_mismatch(dest, &tok))?;
                Ok(())
            }
            ScalarType::Binary => {
                let value = u.decode_binary(&tok)?;
                if value.len() < 4 {
                    return Err(u.short_binary(dest, &tok));
                }
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&value[..4]);
                *self = i32::from_be_bytes(bytes);
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> i32 {
        0
    }
}

impl Unmarshal for i64 {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<i64>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Integer => {
                *self = u.dec.integer(&tok.data)?;
                Ok(())
            }
            ScalarType::Date => {
                *self = u.dec.date(&tok.data)?.timestamp();
                Ok(())
            }
            ScalarType::Binary => {
                let value = u.decode_binary(&tok)?;
                if value.len() < 8 {
                    return Err(u.short_binary(dest, &tok));
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&value[..8]);
                *self = i64::from_be_bytes(bytes);
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> i64 {
        0
    }
}

impl Unmarshal for u32 {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<u32>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Binary => {
                let value = u.decode_binary(&tok)?;
                if value.len() < 4 {
                    return Err(u.short_binary(dest, &tok));
                }
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&value[..4]);
                *self = u32::from_be_bytes(bytes);
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> u32 {
        0
    }
}

impl Unmarshal for u64 {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<u64>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Binary => {
                let value = u.decode_binary(&tok)?;
                if value.len() < 8 {
                    return Err(u.short_binary(dest, &tok));
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&value[..8]);
                *self = u64::from_be_bytes(bytes);
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> u64 {
        0
    }
}

//  u8 and u16 accept no scalar conversions on their own; u8 gets its
//  meaning as the element of a byte sequence.
impl Unmarshal for u8 {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<u8>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> u8 {
        0
    }

    fn unmarshal_vec(vec: &mut Vec<u8>, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<Vec<u8>>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Binary => {
                *vec = u.decode_binary(&tok)?;
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn unmarshal_slots(
        slots: &mut [u8],
        u: &mut Unmarshaler<'_>,
        dest: &'static str,
    ) -> Result<(), LLSDError> {
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Binary => {
                //  Fixed byte arrays copy, truncating extra payload.
                let value = u.decode_binary(&tok)?;
                let count = slots.len().min(value.len());
                slots[..count].copy_from_slice(&value[..count]);
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }
}

impl Unmarshal for u16 {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<u16>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> u16 {
        0
    }
}

impl Unmarshal for f64 {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<f64>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Real => {
                *self = u.dec.real(&tok.data)?;
                Ok(())
            }
            ScalarType::Date => {
                *self = u.dec.date(&tok.data)?.timestamp() as f64;
                Ok(())
            }
            ScalarType::Binary => {
                let value = u.decode_binary(&tok)?;
                if value.len() < 8 {
                    return Err(u.short_binary(dest, &tok));
                }
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&value[..8]);
                *self = f64::from_be_bytes(bytes);
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> f64 {
        0.0
    }
}

impl Unmarshal for f32 {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<f32>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Real => {
                let value = u.dec.real(&tok.data)?;
                if value.abs() > f64::from(f32::MAX) {
                    return Err(u.scalar_mismatch(dest, &tok));
                }
                *self = value as f32;
                Ok(())
            }
            ScalarType::Date => {
                let epoch = u.dec.date(&tok.data)?.timestamp() as f64;
                if epoch.abs() > f64::from(f32::MAX) {
                    return Err(u.scalar_mismatch(dest, &tok));
                }
                *self = epoch as f32;
                Ok(())
            }
            ScalarType::Binary => {
                let value = u.decode_binary(&tok)?;
                if value.len() < 4 {
                    return Err(u.short_binary(dest, &tok));
                }
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&value[..4]);
                *self = f32::from_be_bytes(bytes);
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> f32 {
        0.0
    }
}

impl Unmarshal for bool {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<bool>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Boolean => {
                *self = u.dec.boolean(&tok.data)?;
                Ok(())
            }
            //  Binary into bool: true iff the raw payload is nonempty.
            ScalarType::Binary => {
                *self = !tok.data.is_empty();
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> bool {
        false
    }
}

impl Unmarshal for String {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<String>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::String => {
                *self = std::str::from_utf8(&tok.data)
                    .map_err(LLSDError::Utf8)?
                    .to_string();
                Ok(())
            }
            ScalarType::Boolean => {
                *self = if u.dec.boolean(&tok.data)? {
                    "true".to_string()
                } else {
                    "false".to_string()
                };
                Ok(())
            }
            ScalarType::Binary => {
                let value = u.decode_binary(&tok)?;
                *self = String::from_utf8(value).map_err(|e| LLSDError::Utf8(e.utf8_error()))?;
                Ok(())
            }
            //  Date into string keeps the raw wire text.
            ScalarType::Date => {
                *self = std::str::from_utf8(&tok.data)
                    .map_err(LLSDError::Utf8)?
                    .to_string();
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> String {
        String::new()
    }
}

impl Unmarshal for Uri {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<Uri>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Uri => {
                self.0 = std::str::from_utf8(&tok.data)
                    .map_err(LLSDError::Utf8)?
                    .to_string();
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> Uri {
        Uri(String::new())
    }
}

impl Unmarshal for Uuid {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<Uuid>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Uuid => {
                *self = u.dec.uuid(&tok.data)?;
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> Uuid {
        Uuid::nil()
    }
}

impl Unmarshal for DateTime<Utc> {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        let dest = type_name::<DateTime<Utc>>();
        let tok = u.take_scalar(dest)?;
        match tok.kind {
            ScalarType::Date => {
                *self = u.dec.date(&tok.data)?;
                Ok(())
            }
            ScalarType::Undefined => Ok(()),
            _ => Err(u.scalar_mismatch(dest, &tok)),
        }
    }

    fn zero() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }
}

impl<T: Unmarshal> Unmarshal for Vec<T> {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        T::unmarshal_vec(self, u)
    }

    fn zero() -> Vec<T> {
        Vec::new()
    }
}

impl<T: Unmarshal, const N: usize> Unmarshal for [T; N] {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        T::unmarshal_slots(self.as_mut_slice(), u, type_name::<Self>())
    }

    fn zero() -> [T; N] {
        std::array::from_fn(|_| T::zero())
    }
}

impl<V: Unmarshal> Unmarshal for HashMap<String, V> {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        if !u.open_composite(type_name::<Self>(), false)? {
            return Ok(());
        }
        loop {
            match u.next_token()? {
                Token::Key(raw) => {
                    let key =
                        String::from_utf8(raw).map_err(|e| LLSDError::Utf8(e.utf8_error()))?;
                    u.advance()?;
                    let mut slot = V::zero();
                    u.value(&mut slot)?;
                    //  Duplicate keys are not errors; the last one wins.
                    self.insert(key, slot);
                }
                Token::MapEnd => return Ok(()),
                tok => {
                    return Err(u.invalid(format!(
                        "expected map to start with key, got {}",
                        tok.name()
                    )))
                }
            }
        }
    }

    fn zero() -> HashMap<String, V> {
        HashMap::new()
    }
}

impl<T: Unmarshal> Unmarshal for Option<T> {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        //  <undef /> leaves an option empty; anything else allocates
        //  the zero value and decodes into it.
        let is_undef = matches!(u.peek()?, Token::Scalar(s) if s.kind == ScalarType::Undefined);
        if is_undef {
            u.take()?;
            *self = None;
            return Ok(());
        }
        if self.is_none() {
            *self = Some(T::zero());
        }
        match self.as_mut() {
            Some(inner) => inner.unmarshal(u),
            None => Ok(()),
        }
    }

    fn zero() -> Option<T> {
        None
    }
}

impl Unmarshal for LLSDValue {
    fn unmarshal(&mut self, u: &mut Unmarshaler<'_>) -> Result<(), LLSDError> {
        match u.peek()? {
            Token::MapStart => {
                let mut map: HashMap<String, LLSDValue> = HashMap::new();
                map.unmarshal(u)?;
                *self = LLSDValue::Map(map);
                Ok(())
            }
            Token::ArrayStart => {
                let mut items: Vec<LLSDValue> = Vec::new();
                items.unmarshal(u)?;
                *self = LLSDValue::Array(items);
                Ok(())
            }
            Token::Scalar(_) => {
                let tok = u.take_scalar(type_name::<LLSDValue>())?;
                *self = match tok.kind {
                    ScalarType::Undefined => LLSDValue::Undefined,
                    ScalarType::Boolean => LLSDValue::Boolean(u.dec.boolean(&tok.data)?),
                    //  The wire integer is 32 bits; wider text is truncated.
                    ScalarType::Integer => LLSDValue::Integer(u.dec.integer(&tok.data)? as i32),
                    ScalarType::Real => LLSDValue::Real(u.dec.real(&tok.data)?),
                    ScalarType::Uuid => LLSDValue::UUID(u.dec.uuid(&tok.data)?),
                    ScalarType::String => LLSDValue::String(
                        std::str::from_utf8(&tok.data)
                            .map_err(LLSDError::Utf8)?
                            .to_string(),
                    ),
                    ScalarType::Uri => LLSDValue::URI(
                        std::str::from_utf8(&tok.data)
                            .map_err(LLSDError::Utf8)?
                            .to_string(),
                    ),
                    ScalarType::Date => LLSDValue::Date(u.dec.date(&tok.data)?.timestamp()),
                    ScalarType::Binary => LLSDValue::Binary(u.decode_binary(&tok)?),
                };
                Ok(())
            }
            tok => {
                let name = tok.name();
                Err(u.invalid(format!("unexpected {}", name)))
            }
        }
    }

    fn zero() -> LLSDValue {
        LLSDValue::Undefined
    }
}

//
//  Facade entry points.
//

/// Deserialize LLSD XML into a destination.
pub fn unmarshal_xml<T: Unmarshal>(data: &[u8], dst: &mut T) -> Result<(), LLSDError> {
    Unmarshaler::from_xml_reader(data).unmarshal(dst)
}

/// Deserialize binary LLSD into a destination.
pub fn unmarshal_binary<T: Unmarshal>(data: &[u8], dst: &mut T) -> Result<(), LLSDError> {
    Unmarshaler::from_binary_reader(data).unmarshal(dst)
}

/// Deserialize LLSD XML, returning the decoded value.
pub fn from_xml<T: Unmarshal>(data: &[u8]) -> Result<T, LLSDError> {
    let mut value = T::zero();
    unmarshal_xml(data, &mut value)?;
    Ok(value)
}

/// Deserialize binary LLSD, returning the decoded value.
pub fn from_binary<T: Unmarshal>(data: &[u8]) -> Result<T, LLSDError> {
    let mut value = T::zero();
    unmarshal_binary(data, &mut value)?;
    Ok(value)
}

/// Parse LLSD, detecting the wire format.
/// Recognizes binary with the sentinel header, XML with or without the
/// declaration, and headerless binary starting at a container op.
/// Leading whitespace is tolerated for the text form only.
pub fn auto_unmarshal<T: Unmarshal>(data: &[u8], dst: &mut T) -> Result<(), LLSDError> {
    if data.starts_with(binary::BINARY_HEADER) {
        return unmarshal_binary(data, dst);
    }
    let trimmed = data.trim_ascii_start();
    if trimmed.starts_with(b"<?xml") || trimmed.starts_with(b"<llsd") {
        return unmarshal_xml(trimmed, dst);
    }
    if matches!(data.first(), Some(b'{') | Some(b'[')) {
        return unmarshal_binary(data, dst);
    }
    //  Trim input to a short snippet for the error message.
    let snippet: String = String::from_utf8_lossy(data).chars().take(60).collect();
    Err(LLSDError::UnknownFormat(snippet))
}
