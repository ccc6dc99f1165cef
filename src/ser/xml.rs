//
//  ser/xml.rs -- XML encoder for LLSD
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//
//  XML format. Output is buffered and flushed once at the end.
//  Compact by default; the indent option inserts a newline and a
//  repeated indent string before tags.
//
//  Animats
//  February, 2024.
//  License: LGPL.
//
use crate::error::LLSDError;
use crate::record::{cached_fields, Encoding, Record};
use crate::ser::Marshal;
use crate::token::ScalarType;
use crate::{LLSDValue, Uri};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use std::any::type_name;
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use uuid::Uuid;

pub const LLSD_XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// The XML encoder. Walks destinations through the Marshal trait.
pub struct XmlEncoder<W: Write> {
    w: BufWriter<W>,
    indent: String,
    depth: usize,
}

impl<W: Write> XmlEncoder<W> {
    pub fn new(writer: W) -> XmlEncoder<W> {
        XmlEncoder {
            w: BufWriter::new(writer),
            indent: String::new(),
            depth: 0,
        }
    }

    /// Indent string inserted before tags; empty means compact output.
    pub fn set_indent(&mut self, indent: &str) {
        self.indent = indent.to_string();
    }

    /// Encode one complete document and flush.
    pub fn encode<T: Marshal + ?Sized>(&mut self, value: &T) -> Result<(), LLSDError> {
        self.w.write_all(LLSD_XML_HEADER.as_bytes())?;
        self.w.write_all(b"<llsd>")?;
        self.depth += 1;
        value.marshal(self)?;
        self.depth -= 1;
        self.write_indent()?;
        self.w.write_all(b"</llsd>")?;
        self.w.flush()?;
        Ok(())
    }

    pub fn write_indent(&mut self) -> Result<(), LLSDError> {
        if self.indent.is_empty() {
            return Ok(());
        }
        self.w.write_all(b"\n")?;
        for _ in 0..self.depth {
            self.w.write_all(self.indent.as_bytes())?;
        }
        Ok(())
    }

    pub fn raw(&mut self, text: &str) -> Result<(), LLSDError> {
        self.w.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn escaped(&mut self, text: &str) -> Result<(), LLSDError> {
        self.raw(&xml_escape(text))
    }

    /// Opening container tag, indented; nested content indents deeper.
    pub fn open(&mut self, tag: &str) -> Result<(), LLSDError> {
        self.write_indent()?;
        write!(self.w, "<{}>", tag)?;
        self.depth += 1;
        Ok(())
    }

    pub fn close(&mut self, tag: &str) -> Result<(), LLSDError> {
        self.depth -= 1;
        self.write_indent()?;
        write!(self.w, "</{}>", tag)?;
        Ok(())
    }

    /// One scalar element with literal text.
    pub fn scalar_raw(&mut self, tag: &str, text: &str) -> Result<(), LLSDError> {
        self.write_indent()?;
        write!(self.w, "<{}>{}</{}>", tag, text, tag)?;
        Ok(())
    }

    /// One scalar element with XML-escaped text.
    pub fn scalar_escaped(&mut self, tag: &str, text: &str) -> Result<(), LLSDError> {
        self.scalar_raw(tag, &xml_escape(text))
    }

    /// Output of a custom text-scalar hook. Not escaped; the hook
    /// controls the payload.
    pub fn hook_scalar(&mut self, kind: ScalarType, text: &str) -> Result<(), LLSDError> {
        self.write_indent()?;
        write!(self.w, "<{}>{}</{}>", kind, text, kind)?;
        Ok(())
    }

    /// The LLSD null element.
    pub fn undef(&mut self) -> Result<(), LLSDError> {
        self.write_indent()?;
        self.raw("<undef />")
    }

    /// Encode a record as a map, iterating cached descriptors in
    /// declaration order. Omitted and empty omit_empty fields are
    /// skipped.
    pub fn record<T: Record>(&mut self, value: &T) -> Result<(), LLSDError> {
        let fields = cached_fields::<T>();
        self.open("map")?;
        for desc in fields.iter() {
            if desc.omit {
                continue;
            }
            if desc.omit_empty && value.field_is_empty(desc.source) {
                continue;
            }
            self.write_indent()?;
            self.raw("<key>")?;
            self.escaped(&desc.name)?;
            self.raw("</key>")?;
            value.marshal_field(desc.source, self, desc)?;
        }
        self.close("map")
    }

    /// A <binary> element in the requested text encoding. The
    /// attribute is omitted for the base16 default; base16 payload is
    /// upper case, as the llbase python module expects it.
    pub fn binary_payload(&mut self, data: &[u8], encoding: Encoding) -> Result<(), LLSDError> {
        self.write_indent()?;
        match encoding {
            Encoding::Base16 => self.raw("<binary>")?,
            other => write!(self.w, "<binary encoding=\"{}\">", other)
                .map_err(LLSDError::Io)?,
        }
        match encoding {
            Encoding::Base16 => self.raw(&hex::encode_upper(data))?,
            Encoding::Base64 => self.raw(&STANDARD.encode(data))?,
            Encoding::Base85 => self.escaped(&ascii85::encode(data))?,
        }
        self.raw("</binary>")
    }
}

/// XML standard character escapes.
fn xml_escape(unescaped: &str) -> String {
    let mut out = String::with_capacity(unescaped.len());
    for ch in unescaped.chars() {
        match ch {
            '<' => out += "&lt;",
            '>' => out += "&gt;",
            '\'' => out += "&apos;",
            '&' => out += "&amp;",
            '"' => out += "&quot;",
            _ => out.push(ch),
        }
    }
    out
}

//  Six-digit fixed formatting, with the Second Life "nan" spelling.
fn format_real(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{:.6}", value)
    }
}

fn date_string(epoch: i64) -> Result<String, LLSDError> {
    let dt = DateTime::from_timestamp(epoch, 0).ok_or(LLSDError::DateRange(epoch))?;
    Ok(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

//
//  Marshal impls.
//

macro_rules! integer_marshal {
    ($($t:ty),*) => {$(
        impl Marshal for $t {
            fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
                enc.scalar_raw("integer", &self.to_string())
            }

            fn is_empty_value(&self) -> bool {
                *self == 0
            }
        }
    )*};
}

integer_marshal!(i8, i16, i32, u16, u32);

//  LLSD integers are 32 bits on the wire; 64-bit destinations decode
//  (dates, binary reinterpretation) but cannot be represented back.
macro_rules! wide_integer_marshal {
    ($($t:ty),*) => {$(
        impl Marshal for $t {
            fn marshal<W: Write>(&self, _enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
                Err(LLSDError::MarshalType {
                    dest: type_name::<$t>(),
                })
            }

            fn is_empty_value(&self) -> bool {
                *self == 0
            }
        }
    )*};
}

wide_integer_marshal!(i64, u64);

impl Marshal for u8 {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        enc.scalar_raw("integer", &self.to_string())
    }

    fn is_empty_value(&self) -> bool {
        *self == 0
    }

    fn marshal_slice<W: Write>(
        items: &[u8],
        enc: &mut XmlEncoder<W>,
        encoding: Encoding,
    ) -> Result<(), LLSDError> {
        enc.binary_payload(items, encoding)
    }
}

impl Marshal for f64 {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        enc.scalar_raw("real", &format_real(*self))
    }

    fn is_empty_value(&self) -> bool {
        *self == 0.0
    }
}

impl Marshal for f32 {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        enc.scalar_raw("real", &format_real(f64::from(*self)))
    }

    fn is_empty_value(&self) -> bool {
        *self == 0.0
    }
}

impl Marshal for bool {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        enc.scalar_raw("boolean", if *self { "1" } else { "0" })
    }

    fn is_empty_value(&self) -> bool {
        !*self
    }
}

impl Marshal for str {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        enc.scalar_escaped("string", self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Marshal for String {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        self.as_str().marshal(enc)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Marshal for Uri {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        enc.scalar_escaped("uri", &self.0)
    }

    fn is_empty_value(&self) -> bool {
        self.0.is_empty()
    }
}

impl Marshal for Uuid {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        enc.scalar_raw("uuid", &self.simple().to_string())
    }
}

impl Marshal for DateTime<Utc> {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        enc.scalar_raw("date", &self.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl<T: Marshal> Marshal for Vec<T> {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        T::marshal_slice(self, enc, Encoding::Base16)
    }

    fn marshal_tagged<W: Write>(
        &self,
        enc: &mut XmlEncoder<W>,
        encoding: Encoding,
    ) -> Result<(), LLSDError> {
        T::marshal_slice(self, enc, encoding)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Marshal, const N: usize> Marshal for [T; N] {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        T::marshal_slice(self.as_slice(), enc, Encoding::Base16)
    }

    fn marshal_tagged<W: Write>(
        &self,
        enc: &mut XmlEncoder<W>,
        encoding: Encoding,
    ) -> Result<(), LLSDError> {
        T::marshal_slice(self.as_slice(), enc, encoding)
    }

    fn is_empty_value(&self) -> bool {
        N == 0
    }
}

impl<V: Marshal> Marshal for HashMap<String, V> {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        enc.open("map")?;
        for (key, value) in self {
            enc.write_indent()?;
            enc.raw("<key>")?;
            enc.escaped(key)?;
            enc.raw("</key>")?;
            value.marshal(enc)?;
        }
        enc.close("map")
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Marshal> Marshal for Option<T> {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        match self {
            //  Empty options write the LLSD null.
            None => enc.undef(),
            Some(value) => value.marshal(enc),
        }
    }

    fn marshal_tagged<W: Write>(
        &self,
        enc: &mut XmlEncoder<W>,
        encoding: Encoding,
    ) -> Result<(), LLSDError> {
        match self {
            None => enc.undef(),
            Some(value) => value.marshal_tagged(enc, encoding),
        }
    }

    fn is_empty_value(&self) -> bool {
        self.is_none()
    }
}

impl Marshal for LLSDValue {
    fn marshal<W: Write>(&self, enc: &mut XmlEncoder<W>) -> Result<(), LLSDError> {
        match self {
            LLSDValue::Undefined => enc.undef(),
            LLSDValue::Boolean(v) => v.marshal(enc),
            LLSDValue::Real(v) => v.marshal(enc),
            LLSDValue::Integer(v) => v.marshal(enc),
            LLSDValue::UUID(v) => v.marshal(enc),
            LLSDValue::String(v) => v.marshal(enc),
            LLSDValue::Date(v) => enc.scalar_raw("date", &date_string(*v)?),
            LLSDValue::URI(v) => enc.scalar_escaped("uri", v),
            LLSDValue::Binary(v) => enc.binary_payload(v, Encoding::Base16),
            LLSDValue::Map(v) => {
                enc.open("map")?;
                for (key, value) in v {
                    enc.write_indent()?;
                    enc.raw("<key>")?;
                    enc.escaped(key)?;
                    enc.raw("</key>")?;
                    value.marshal(enc)?;
                }
                enc.close("map")
            }
            LLSDValue::Array(v) => {
                enc.open("array")?;
                for value in v {
                    value.marshal(enc)?;
                }
                enc.close("array")
            }
        }
    }

    fn is_empty_value(&self) -> bool {
        //  An "any" holding the zero of its contained type is still a
        //  value; only the LLSD null is empty.
        matches!(self, LLSDValue::Undefined)
    }
}

//
//  Facade entry points.
//

/// Serialize a value as LLSD XML, compact.
pub fn marshal_xml<T: Marshal + ?Sized>(value: &T) -> Result<Vec<u8>, LLSDError> {
    let mut out: Vec<u8> = Vec::new();
    XmlEncoder::new(&mut out).encode(value)?;
    Ok(out)
}

/// Serialize a value as LLSD XML with the given indent string.
pub fn marshal_xml_indent<T: Marshal + ?Sized>(
    value: &T,
    indent: &str,
) -> Result<Vec<u8>, LLSDError> {
    let mut out: Vec<u8> = Vec::new();
    {
        let mut enc = XmlEncoder::new(&mut out);
        enc.set_indent(indent);
        enc.encode(value)?;
    }
    Ok(out)
}

// Unit tests
