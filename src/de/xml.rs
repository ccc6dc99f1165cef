//
//  de/xml.rs -- XML tokenizer and text scalar decoder for LLSD
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//
//  Wraps the streaming quick-xml parser and reduces its events to the
//  common token vocabulary. Inner text of keys and scalars is copied
//  out before the end tag is consumed, so the parser buffer can be
//  reused.
//
//  Animats
//  February, 2024.
//  License: LGPL.
//
use crate::de::ScalarDecoder;
use crate::error::LLSDError;
use crate::token::{Attrs, ScalarToken, ScalarType, Token, TokenReader};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use uuid::Uuid;

/// Token source over LLSD XML.
pub struct XmlScanner<R: BufRead> {
    reader: Reader<R>,
}

//  What a Start event resolved to, once the parse buffer is released.
enum Started {
    Key,
    Scalar(ScalarType, Attrs),
}

impl<R: BufRead> XmlScanner<R> {
    pub fn new(source: R) -> XmlScanner<R> {
        let mut reader = Reader::from_reader(source);
        reader.expand_empty_elements(true); // want end tag events always
        XmlScanner { reader }
    }

    fn invalid(&self, problem: impl Into<String>) -> LLSDError {
        LLSDError::InvalidLLSD {
            problem: problem.into(),
            offset: self.reader.buffer_position() as u64,
        }
    }

    fn collect_attrs(&self, e: &BytesStart<'_>) -> Result<Attrs, LLSDError> {
        let mut attrs = Attrs::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key)?.to_string();
            let value = attr.unescaped_value()?;
            attrs.insert(key, std::str::from_utf8(&value)?.to_string());
        }
        Ok(attrs)
    }

    /// Accumulate inner text up to the matching end tag.
    fn inner_text(&mut self, tag: &[u8]) -> Result<String, LLSDError> {
        let mut texts: Vec<String> = Vec::new();
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event(&mut buf) {
                Ok(Event::Text(e)) => texts.push(e.unescape_and_decode(&self.reader)?),
                Ok(Event::End(ref e)) => {
                    if e.name() != tag {
                        return Err(self.invalid(format!(
                            "Unmatched XML tags: <{}> .. </{}>",
                            String::from_utf8_lossy(tag),
                            String::from_utf8_lossy(e.name())
                        )));
                    }
                    return Ok(texts.concat());
                }
                Ok(Event::Comment(_)) => {}
                Ok(Event::Eof) => {
                    return Err(self.invalid(format!(
                        "unexpected end of data inside <{}>",
                        String::from_utf8_lossy(tag)
                    )))
                }
                Ok(_) => {
                    return Err(self.invalid(format!(
                        "unexpected content inside <{}>",
                        String::from_utf8_lossy(tag)
                    )))
                }
                Err(e) => return Err(LLSDError::Xml(e)),
            }
            buf.clear();
        }
    }
}

impl<R: BufRead> TokenReader for XmlScanner<R> {
    fn offset(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn token(&mut self) -> Result<Token, LLSDError> {
        let mut buf = Vec::new();
        loop {
            let started: Started;
            match self.reader.read_event(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name() {
                    b"llsd" => return Ok(Token::DocumentStart),
                    b"map" => return Ok(Token::MapStart),
                    b"array" => return Ok(Token::ArrayStart),
                    b"key" => started = Started::Key,
                    name => match ScalarType::from_element(name) {
                        Some(kind) => started = Started::Scalar(kind, self.collect_attrs(e)?),
                        None => {
                            return Err(self.invalid(format!(
                                "Unknown LLSD type {:?}",
                                String::from_utf8_lossy(name)
                            )))
                        }
                    },
                },
                Ok(Event::End(ref e)) => match e.name() {
                    b"llsd" => return Ok(Token::DocumentEnd),
                    b"map" => return Ok(Token::MapEnd),
                    b"array" => return Ok(Token::ArrayEnd),
                    name => {
                        return Err(self.invalid(format!(
                            "unexpected end element </{}>",
                            String::from_utf8_lossy(name)
                        )))
                    }
                },
                Ok(Event::Eof) => return Err(LLSDError::Eof),
                //  Declarations, comments, processing instructions and
                //  character data between elements are skipped.
                Ok(_) => {
                    buf.clear();
                    continue;
                }
                Err(e) => return Err(LLSDError::Xml(e)),
            }
            //  Parse buffer released; read the element body.
            return match started {
                Started::Key => {
                    let text = self.inner_text(b"key")?;
                    Ok(Token::Key(text.into_bytes()))
                }
                Started::Scalar(kind, attrs) => {
                    let text = self.inner_text(kind.element_name().as_bytes())?;
                    Ok(Token::Scalar(ScalarToken {
                        kind,
                        data: text.into_bytes(),
                        attrs,
                    }))
                }
            };
        }
    }
}

/// Scalar decoder for the text wire form.
pub struct TextDecoder;

fn payload_str(data: &[u8]) -> Result<&str, LLSDError> {
    Ok(std::str::from_utf8(data)?.trim())
}

impl ScalarDecoder for TextDecoder {
    fn real(&self, data: &[u8]) -> Result<f64, LLSDError> {
        let text = payload_str(data)?;
        if text.is_empty() {
            return Ok(0.0);
        }
        //  Second Life writes "nan"; Rust parses "NaN".
        let text = if text.eq_ignore_ascii_case("nan") {
            "NaN"
        } else {
            text
        };
        Ok(text.parse::<f64>()?)
    }

    fn uuid(&self, data: &[u8]) -> Result<Uuid, LLSDError> {
        let text = payload_str(data)?;
        if text.is_empty() {
            return Ok(Uuid::nil());
        }
        Ok(Uuid::parse_str(text)?)
    }

    fn integer(&self, data: &[u8]) -> Result<i64, LLSDError> {
        let text = payload_str(data)?;
        if text.is_empty() {
            return Ok(0);
        }
        Ok(text.parse::<i64>()?)
    }

    fn binary(&self, data: &[u8], encoding: &str) -> Result<Vec<u8>, LLSDError> {
        let text = payload_str(data)?;
        match encoding {
            "" | "base16" => Ok(hex::decode(text)?),
            "base64" => Ok(STANDARD.decode(text)?),
            "base85" => ascii85::decode(text).map_err(|e| LLSDError::Base85(format!("{:?}", e))),
            other => Err(LLSDError::UnknownEncoding(other.to_string())),
        }
    }

    fn date(&self, data: &[u8]) -> Result<DateTime<Utc>, LLSDError> {
        let text = payload_str(data)?;
        if text.is_empty() {
            return Ok(DateTime::<Utc>::UNIX_EPOCH);
        }
        Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
    }

    fn boolean(&self, data: &[u8]) -> Result<bool, LLSDError> {
        let text = payload_str(data)?;
        match text {
            "" | "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(LLSDError::InvalidBoolean(other.to_string())),
        }
    }
}

// Unit tests
