//
//  ser/binary.rs -- binary serializer for LLSD value trees
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//
//  Binary format, serialization. Exact inverse of the binary
//  tokenizer: sentinel header, big-endian payloads, u32 length
//  prefixes, advisory container counts.
//
//  Animats
//  February, 2024.
//  License: LGPL.
//
use crate::de::binary::BINARY_HEADER;
use crate::error::LLSDError;
use crate::LLSDValue;
use std::io::Write;

/// Outputs an LLSDValue as a string of bytes, in LLSD "binary" format.
pub fn to_bytes(value: &LLSDValue) -> Result<Vec<u8>, LLSDError> {
    let mut writer: Vec<u8> = Vec::new();
    to_writer(&mut writer, value)?;
    Ok(writer)
}

/// Outputs an LLSD value to an output stream.
pub fn to_writer<W: Write>(writer: &mut W, value: &LLSDValue) -> Result<(), LLSDError> {
    writer.write_all(BINARY_HEADER)?;
    generate_value(writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Generate one value. Recursive.
fn generate_value<W: Write>(writer: &mut W, value: &LLSDValue) -> Result<(), LLSDError> {
    match value {
        LLSDValue::Undefined => writer.write_all(b"!")?,
        LLSDValue::Boolean(v) => writer.write_all(if *v { b"1" } else { b"0" })?,
        LLSDValue::String(v) => {
            writer.write_all(b"s")?;
            writer.write_all(&(v.len() as u32).to_be_bytes())?;
            writer.write_all(v.as_bytes())?
        }
        LLSDValue::URI(v) => {
            writer.write_all(b"l")?;
            writer.write_all(&(v.len() as u32).to_be_bytes())?;
            writer.write_all(v.as_bytes())?
        }
        LLSDValue::Integer(v) => {
            writer.write_all(b"i")?;
            writer.write_all(&v.to_be_bytes())?
        }
        LLSDValue::Real(v) => {
            writer.write_all(b"r")?;
            writer.write_all(&v.to_be_bytes())?
        }
        LLSDValue::UUID(v) => {
            writer.write_all(b"u")?;
            writer.write_all(v.as_bytes())?
        }
        LLSDValue::Binary(v) => {
            writer.write_all(b"b")?;
            writer.write_all(&(v.len() as u32).to_be_bytes())?;
            writer.write_all(v)?
        }
        //  Dates go on the wire as a big-endian double of epoch seconds.
        LLSDValue::Date(v) => {
            writer.write_all(b"d")?;
            writer.write_all(&(*v as f64).to_be_bytes())?
        }
        //  Map is { count key value key value ... }
        LLSDValue::Map(v) => {
            writer.write_all(b"{")?;
            writer.write_all(&(v.len() as u32).to_be_bytes())?;
            for (key, value) in v {
                writer.write_all(b"k")?;
                writer.write_all(&(key.len() as u32).to_be_bytes())?;
                writer.write_all(key.as_bytes())?;
                generate_value(writer, value)?;
            }
            writer.write_all(b"}")?
        }
        //  Array is [ count child child ... ]
        LLSDValue::Array(v) => {
            writer.write_all(b"[")?;
            writer.write_all(&(v.len() as u32).to_be_bytes())?;
            for value in v {
                generate_value(writer, value)?;
            }
            writer.write_all(b"]")?
        }
    };
    Ok(())
}

// Unit tests

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn binaryroundtrip1() {
        //  Construct a test value.
        let map: HashMap<String, LLSDValue> = [
            ("val1".to_string(), LLSDValue::Real(456.0)),
            ("val2".to_string(), LLSDValue::Integer(999)),
            (
                "dest".to_string(),
                LLSDValue::URI("http://secondlife.com".to_string()),
            ),
        ]
        .into_iter()
        .collect();
        let value = LLSDValue::Array(vec![
            LLSDValue::Real(123.5),
            LLSDValue::Map(map),
            LLSDValue::Integer(42),
            LLSDValue::String("Hello world".to_string()),
            LLSDValue::Binary(b"Binary data".to_vec()),
            LLSDValue::Date(1_138_804_193),
            LLSDValue::Boolean(true),
            LLSDValue::Boolean(false),
            LLSDValue::Undefined,
        ]);
        //  Convert to binary form and back.
        let bytes = to_bytes(&value).expect("binary encode failed");
        assert!(bytes.starts_with(BINARY_HEADER));
        let decoded: LLSDValue =
            crate::de::from_binary(&bytes).expect("binary decode failed");
        assert_eq!(value, decoded);
    }
}
