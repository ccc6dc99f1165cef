//
//  de/binary.rs -- binary tokenizer and scalar decoder for LLSD
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Format documentation is at http://wiki.secondlife.com/wiki/LLSD
//
//  Binary format. One-byte op codes, big-endian sizes and payloads.
//  The scanner synthesizes the DocumentStart/DocumentEnd pair around
//  the root value so both wire forms meet the same engine contract.
//
//  Animats
//  February, 2024.
//  License: LGPL.
//
use crate::de::ScalarDecoder;
use crate::error::LLSDError;
use crate::token::{ScalarToken, ScalarType, Token, TokenReader};
use chrono::{DateTime, Utc};
use std::io::Read;
use uuid::Uuid;

/// Binary LLSD sentinel header, recognized at offset 0 only.
pub const BINARY_HEADER: &[u8] = b"<?llsd/binary?>\n";

enum ScanState {
    Start,
    Body,
    Done,
}

/// Token source over binary LLSD.
pub struct BinaryScanner<R: Read> {
    source: R,
    offset: u64,
    state: ScanState,
    pending: Option<u8>,
}

impl<R: Read> BinaryScanner<R> {
    pub fn new(source: R) -> BinaryScanner<R> {
        BinaryScanner {
            source,
            offset: 0,
            state: ScanState::Start,
            pending: None,
        }
    }

    fn invalid(&self, problem: impl Into<String>) -> LLSDError {
        LLSDError::InvalidLLSD {
            problem: problem.into(),
            offset: self.offset,
        }
    }

    //  Reads below error on truncation inside a value; only the op
    //  position distinguishes clean end of input.

    fn read_n(&mut self, count: usize) -> Result<Vec<u8>, LLSDError> {
        let mut buf = vec![0u8; count];
        self.source.read_exact(&mut buf)?;
        self.offset += count as u64;
        Ok(buf)
    }

    fn read_u32(&mut self) -> Result<u32, LLSDError> {
        let mut buf = [0u8; 4];
        self.source.read_exact(&mut buf)?;
        self.offset += 4;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_variable(&mut self) -> Result<Vec<u8>, LLSDError> {
        //  Length prefixes are not validated against an upper bound.
        let count = self.read_u32()?;
        self.read_n(count as usize)
    }

    /// Next op byte, or None at clean end of input.
    fn read_op(&mut self) -> Result<Option<u8>, LLSDError> {
        if let Some(op) = self.pending.take() {
            return Ok(Some(op));
        }
        let mut buf = [0u8; 1];
        match self.source.read_exact(&mut buf) {
            Ok(()) => {
                self.offset += 1;
                Ok(Some(buf[0]))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(LLSDError::Io(e)),
        }
    }
}

impl<R: Read> TokenReader for BinaryScanner<R> {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn token(&mut self) -> Result<Token, LLSDError> {
        if matches!(self.state, ScanState::Start) {
            //  An empty stream is EOF, not an empty document.
            match self.read_op()? {
                Some(op) => {
                    self.pending = Some(op);
                    self.state = ScanState::Body;
                    return Ok(Token::DocumentStart);
                }
                None => return Err(LLSDError::Eof),
            }
        }
        loop {
            let op = match self.read_op()? {
                Some(op) => op,
                None => {
                    return match self.state {
                        ScanState::Body => {
                            self.state = ScanState::Done;
                            Ok(Token::DocumentEnd)
                        }
                        _ => Err(LLSDError::Eof),
                    }
                }
            };
            if op == b'<' {
                //  Sentinel header, legal only at the start of input.
                if self.offset == 1 {
                    let rest = self.read_n(BINARY_HEADER.len() - 1)?;
                    if rest.as_slice() != &BINARY_HEADER[1..] {
                        return Err(self.invalid(format!(
                            "unrecognized header <{}",
                            String::from_utf8_lossy(&rest)
                        )));
                    }
                    continue;
                }
                return Err(self.invalid("unexpected type code '<'"));
            }
            let tok = match op {
                b'!' => Token::Scalar(ScalarToken::new(ScalarType::Undefined)),
                b'1' => Token::Scalar(ScalarToken::with_data(ScalarType::Boolean, vec![1])),
                b'0' => Token::Scalar(ScalarToken::new(ScalarType::Boolean)),
                b'i' => Token::Scalar(ScalarToken::with_data(ScalarType::Integer, self.read_n(4)?)),
                b'r' => Token::Scalar(ScalarToken::with_data(ScalarType::Real, self.read_n(8)?)),
                b'u' => Token::Scalar(ScalarToken::with_data(ScalarType::Uuid, self.read_n(16)?)),
                b'd' => Token::Scalar(ScalarToken::with_data(ScalarType::Date, self.read_n(8)?)),
                b's' => Token::Scalar(ScalarToken::with_data(
                    ScalarType::String,
                    self.read_variable()?,
                )),
                b'l' => Token::Scalar(ScalarToken::with_data(
                    ScalarType::Uri,
                    self.read_variable()?,
                )),
                b'b' => Token::Scalar(ScalarToken::with_data(
                    ScalarType::Binary,
                    self.read_variable()?,
                )),
                b'k' => Token::Key(self.read_variable()?),
                b'{' => {
                    //  Size hint is advisory; '}' terminates the map.
                    self.read_u32()?;
                    Token::MapStart
                }
                b'}' => Token::MapEnd,
                b'[' => {
                    self.read_u32()?;
                    Token::ArrayStart
                }
                b']' => Token::ArrayEnd,
                other => {
                    return Err(
                        self.invalid(format!("unexpected type code {:?}", char::from(other)))
                    )
                }
            };
            return Ok(tok);
        }
    }
}

/// Scalar decoder for the binary wire form. Payloads arrive raw.
pub struct BinaryDecoder;

/// First N payload bytes; empty means the zero value, short payloads
/// are truncation errors.
fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N], LLSDError> {
    let mut buf = [0u8; N];
    if data.is_empty() {
        return Ok(buf);
    }
    if data.len() < N {
        return Err(LLSDError::InvalidLLSD {
            problem: format!("truncated {}-byte payload", N),
            offset: 0,
        });
    }
    buf.copy_from_slice(&data[..N]);
    Ok(buf)
}

impl ScalarDecoder for BinaryDecoder {
    fn real(&self, data: &[u8]) -> Result<f64, LLSDError> {
        Ok(f64::from_be_bytes(fixed::<8>(data)?))
    }

    fn uuid(&self, data: &[u8]) -> Result<Uuid, LLSDError> {
        Ok(Uuid::from_bytes(fixed::<16>(data)?))
    }

    fn integer(&self, data: &[u8]) -> Result<i64, LLSDError> {
        Ok(i64::from(i32::from_be_bytes(fixed::<4>(data)?)))
    }

    fn binary(&self, data: &[u8], _encoding: &str) -> Result<Vec<u8>, LLSDError> {
        Ok(data.to_vec())
    }

    fn date(&self, data: &[u8]) -> Result<DateTime<Utc>, LLSDError> {
        //  Epoch seconds as a big-endian double.
        let seconds = f64::from_be_bytes(fixed::<8>(data)?);
        let whole = seconds.floor();
        let nanos = ((seconds - whole) * 1e9) as u32;
        DateTime::from_timestamp(whole as i64, nanos)
            .ok_or(LLSDError::DateRange(whole as i64))
    }

    fn boolean(&self, data: &[u8]) -> Result<bool, LLSDError> {
        //  The tokenizer normalizes the 1/0 ops to nonempty/empty data.
        Ok(!data.is_empty())
    }
}

// Unit tests

#[cfg(test)]
mod tests {
    use super::*;

    fn push_str(out: &mut Vec<u8>, op: u8, s: &str) {
        out.push(op);
        out.extend_from_slice(&(s.len() as u32).to_be_bytes());
        out.extend_from_slice(s.as_bytes());
    }

    //  Binary form of:
    //  { "scale": "one minute", "stats": [ 0.9878624, 42, true ] }
    fn sample_bytes(with_header: bool) -> Vec<u8> {
        let mut out = Vec::new();
        if with_header {
            out.extend_from_slice(BINARY_HEADER);
        }
        out.push(b'{');
        out.extend_from_slice(&2u32.to_be_bytes());
        push_str(&mut out, b'k', "scale");
        push_str(&mut out, b's', "one minute");
        push_str(&mut out, b'k', "stats");
        out.push(b'[');
        out.extend_from_slice(&3u32.to_be_bytes());
        out.push(b'r');
        out.extend_from_slice(&0.9878624f64.to_be_bytes());
        out.push(b'i');
        out.extend_from_slice(&42i32.to_be_bytes());
        out.push(b'1');
        out.push(b']');
        out.push(b'}');
        out
    }

    fn scan_all(scanner: &mut dyn TokenReader) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            match scanner.token() {
                Ok(tok) => tokens.push(tok),
                Err(e) => {
                    assert!(e.is_eof(), "scan failed: {:?}", e);
                    return tokens;
                }
            }
        }
    }

    #[test]
    fn binaryscantest1() {
        for with_header in [false, true] {
            let bytes = sample_bytes(with_header);
            let mut scanner = BinaryScanner::new(bytes.as_slice());
            let tokens = scan_all(&mut scanner);
            let expected = vec![
                Token::DocumentStart,
                Token::MapStart,
                Token::Key(b"scale".to_vec()),
                Token::Scalar(ScalarToken::with_data(
                    ScalarType::String,
                    b"one minute".to_vec(),
                )),
                Token::Key(b"stats".to_vec()),
                Token::ArrayStart,
                Token::Scalar(ScalarToken::with_data(
                    ScalarType::Real,
                    0.9878624f64.to_be_bytes().to_vec(),
                )),
                Token::Scalar(ScalarToken::with_data(
                    ScalarType::Integer,
                    42i32.to_be_bytes().to_vec(),
                )),
                Token::Scalar(ScalarToken::with_data(ScalarType::Boolean, vec![1])),
                Token::ArrayEnd,
                Token::MapEnd,
                Token::DocumentEnd,
            ];
            assert_eq!(tokens, expected, "with_header={}", with_header);
        }
    }

    #[test]
    fn binaryscanemptyinputiseof() {
        let mut scanner = BinaryScanner::new(&b""[..]);
        assert!(scanner.token().is_err_and(|e| e.is_eof()));
    }

    #[test]
    fn binaryscanbadop() {
        let mut scanner = BinaryScanner::new(&b"x"[..]);
        assert_eq!(scanner.token().ok(), Some(Token::DocumentStart));
        let err = scanner.token().map(|t| t.name()).err().map(|e| e.to_string());
        assert!(
            err.as_deref()
                .is_some_and(|m| m.contains("unexpected type code")),
            "unexpected result: {:?}",
            err
        );
    }

    #[test]
    fn binaryscanbadheader() {
        let mut bytes = b"<?llsd/notbin?>\n".to_vec();
        bytes.push(b'!');
        let mut scanner = BinaryScanner::new(bytes.as_slice());
        assert_eq!(scanner.token().ok(), Some(Token::DocumentStart));
        let err = scanner.token().map(|t| t.name()).err().map(|e| e.to_string());
        assert!(
            err.as_deref()
                .is_some_and(|m| m.contains("unrecognized header")),
            "unexpected result: {:?}",
            err
        );
    }

    #[test]
    fn binarybooleandecode() {
        let d = BinaryDecoder;
        assert_eq!(d.boolean(&[]).ok(), Some(false));
        assert_eq!(d.boolean(&[1]).ok(), Some(true));
    }

    #[test]
    fn binaryscalardecode() {
        let d = BinaryDecoder;
        assert_eq!(d.integer(&0xFFFF_FFFDu32.to_be_bytes()).ok(), Some(-3));
        assert_eq!(d.integer(&[]).ok(), Some(0));
        assert_eq!(d.real(&1.5f64.to_be_bytes()).ok(), Some(1.5));
        assert_eq!(d.real(&[]).ok(), Some(0.0));
        let id = Uuid::parse_str("67153d5b-3659-afb4-8510-adda2c034649").expect("uuid");
        assert_eq!(d.uuid(id.as_bytes()).ok(), Some(id));
        assert_eq!(d.uuid(&[]).ok(), Some(Uuid::nil()));
        let date = d
            .date(&1_138_804_193.0f64.to_be_bytes())
            .expect("date decode");
        assert_eq!(date.timestamp(), 1_138_804_193);
        assert_eq!(d.date(&[]).map(|t| t.timestamp()).ok(), Some(0));
    }
}
