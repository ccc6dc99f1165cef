//! # tests.rs -- end-to-end tests for serialization and deserialization
//! Part of llsd-codec.
//
//  Animats
//  March, 2024.
//  License: LGPL.
//
use crate::de::{auto_unmarshal, from_binary, from_xml, unmarshal_binary, unmarshal_xml};
use crate::error::LLSDError;
use crate::record::{MarshalTextScalar, UnmarshalBinaryScalar, UnmarshalTextScalar};
use crate::ser::{marshal_xml, xml::LLSD_XML_HEADER};
use crate::token::{ScalarToken, ScalarType, Token, TokenReader};
use crate::{llsd_record, llsd_scalar, LLSDValue, Unmarshaler, Uri};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

fn body(bytes: &[u8]) -> String {
    std::str::from_utf8(bytes)
        .expect("output not UTF-8")
        .replace(LLSD_XML_HEADER, "")
}

//
//  A canned token source, for driving the engine without a wire form.
//
struct MockReader {
    tokens: std::collections::VecDeque<Token>,
    offset: u64,
}

impl MockReader {
    fn new(tokens: Vec<Token>) -> MockReader {
        MockReader {
            tokens: tokens.into(),
            offset: 0,
        }
    }
}

impl TokenReader for MockReader {
    fn token(&mut self) -> Result<Token, LLSDError> {
        self.offset += 1;
        self.tokens.pop_front().ok_or(LLSDError::Eof)
    }

    fn offset(&self) -> u64 {
        self.offset
    }
}

fn mock_decoder(tokens: Vec<Token>) -> Unmarshaler<'static> {
    Unmarshaler::from_token_reader(Box::new(MockReader::new(tokens)), true)
}

fn scalar_int(value: i32) -> Token {
    Token::Scalar(ScalarToken::with_data(
        ScalarType::Integer,
        value.to_string().into_bytes(),
    ))
}

fn scalar_binary_hex(data: &[u8]) -> Token {
    Token::Scalar(ScalarToken::with_data(
        ScalarType::Binary,
        hex::encode(data).into_bytes(),
    ))
}

//
//  Records used across the tests.
//

llsd_record! {
    #[derive(Debug, Default, PartialEq)]
    struct OneString {
        a: String => "a",
    }
}

llsd_record! {
    #[derive(Debug, Default, PartialEq)]
    struct OneInt {
        a: i32 => "A",
    }
}

llsd_record! {
    #[derive(Debug, Default, PartialEq)]
    struct EmptyRecord {}
}

llsd_record! {
    #[derive(Debug, Default, PartialEq)]
    struct Inner {
        b: String => "B",
        c: String => "c",
        d: Option<String> => "D",
        e: Option<String> => "E",
        f: Option<String> => "F",
    }
}

llsd_record! {
    #[derive(Debug, Default, PartialEq)]
    struct Basic {
        string: String => "String",
        real: f64 => "Real",
        boolean: bool => "Boolean",
        uri: Uri => "URI",
        binary: Vec<u8> => "Binary",
        binary_arr: [u8; 11] => "BinaryArr",
        object: Inner => "Object",
    }
}

#[test]
fn xmlunmarshalonestring() {
    //  Scenario: one map entry into a renamed record field.
    let xml = br#"<llsd><map><key>a</key><string>hi</string></map></llsd>"#;
    let mut dst = OneString::default();
    unmarshal_xml(xml, &mut dst).expect("unmarshal failed");
    assert_eq!(dst.a, "hi");
}

#[test]
fn xmlunmarshalbinarytoint() {
    //  Binary payload bytes land in an int32 big-endian.
    let xml = br#"<llsd><map><key>A</key><binary>FFFFFFFD</binary></map></llsd>"#;
    let mut dst = OneInt::default();
    unmarshal_xml(xml, &mut dst).expect("unmarshal failed");
    assert_eq!(dst.a, -3);
}

#[test]
fn xmltruncatefixedarray() {
    //  Excess wire elements past a fixed-size destination are dropped.
    let xml = br#"<llsd><array><integer>1</integer><binary>42696E6172792064617461</binary><integer>2</integer></array></llsd>"#;
    let mut dst: [LLSDValue; 2] = [LLSDValue::Undefined, LLSDValue::Undefined];
    unmarshal_xml(xml, &mut dst).expect("unmarshal failed");
    assert_eq!(dst[0], LLSDValue::Integer(1));
    assert_eq!(dst[1], LLSDValue::Binary(b"Binary data".to_vec()));
}

#[test]
fn xmldisallowunknownfields() {
    let xml = br#"<?xml version="1.0" encoding="UTF-8"?><llsd><map><key>a</key><string>a</string></llsd>"#;
    let mut dst = EmptyRecord::default();
    let mut dec = Unmarshaler::from_xml_reader(&xml[..]);
    dec.disallow_unknown_fields = true;
    let err = dec.unmarshal(&mut dst).err().map(|e| e.to_string());
    assert_eq!(err.as_deref(), Some("LLSD: Unknown field \"a\""));
}

#[test]
fn xmlskipsunknownfields() {
    //  Without the flag, unknown fields are skipped whole, containers
    //  included.
    let xml = br#"<llsd><map>
        <key>junk</key><map><key>x</key><array><integer>1</integer></array></map>
        <key>a</key><string>kept</string>
    </map></llsd>"#;
    let mut dst = OneString::default();
    unmarshal_xml(xml, &mut dst).expect("unmarshal failed");
    assert_eq!(dst.a, "kept");
}

#[test]
fn xmlmarshalbase64field() {
    llsd_record! {
        #[derive(Debug, Default)]
        struct B64 {
            a: Vec<u8> => "A,base64",
        }
    }
    let src = B64 {
        a: b"Binary data".to_vec(),
    };
    let out = marshal_xml(&src).expect("marshal failed");
    assert!(
        body(&out).contains(r#"<binary encoding="base64">QmluYXJ5IGRhdGE=</binary>"#),
        "got {}",
        body(&out)
    );
}

#[test]
fn binaryunmarshalinteger() {
    //  Binary op 'i' with payload 00 00 00 2A.
    let bytes = [b'i', 0, 0, 0, 42];
    let value: i32 = from_binary(&bytes).expect("unmarshal failed");
    assert_eq!(value, 42);
}

#[test]
fn xmlbasicunmarshal() {
    let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
    <llsd>
      <map>
        <key>String</key><string>a</string>
        <key>Real</key><real>1.0</real>
        <key>Boolean</key><boolean>true</boolean>
        <key>URI</key><uri>http://example.org</uri>
        <key>Binary</key><binary>42696e6172792064617461</binary>
        <key>BinaryArr</key><binary>42696e6172792064617461</binary>
        <key>Undef</key><undef/><key>StringAfterUndef</key><string>A</string>
        <key>Object</key>
        <map>
          <key>B</key><string>b</string>
          <key>c</key><string>c</string>
          <key>d</key><string>d</string>
          <key>E</key><string>e</string>
          <key>F</key><undef />
        </map>
      </map>
    </llsd>"#;
    let mut dst = Basic::default();
    unmarshal_xml(xml, &mut dst).expect("unmarshal failed");
    assert_eq!(dst.string, "a");
    assert_eq!(dst.real, 1.0);
    assert!(dst.boolean);
    assert_eq!(dst.uri, Uri::from("http://example.org"));
    assert_eq!(dst.binary, b"Binary data".to_vec());
    assert_eq!(&dst.binary_arr, b"Binary data");
    assert_eq!(dst.object.b, "b");
    assert_eq!(dst.object.c, "c");
    //  Wire key "d" does not match the tag "D"; the field is skipped.
    assert_eq!(dst.object.d, None);
    assert_eq!(dst.object.e, Some("e".to_string()));
    assert_eq!(dst.object.f, None);
}

#[test]
fn xmlunmarshalmap() {
    let xml = br#"<llsd><map><key>a</key><string>a</string><key>b</key><string>b</string></map></llsd>"#;
    let dst: HashMap<String, String> = from_xml(xml).expect("unmarshal failed");
    assert_eq!(dst.get("a").map(String::as_str), Some("a"));
    assert_eq!(dst.get("b").map(String::as_str), Some("b"));

    let dst2: HashMap<String, Option<String>> = from_xml(xml).expect("unmarshal failed");
    assert_eq!(dst2.get("a"), Some(&Some("a".to_string())));

    let xml3 = br#"<llsd><map><key>a</key><string>a</string><key>b</key><binary>42696e6172792064617461</binary></map></llsd>"#;
    let dst3: HashMap<String, LLSDValue> = from_xml(xml3).expect("unmarshal failed");
    assert_eq!(dst3.get("a"), Some(&LLSDValue::String("a".to_string())));
    assert_eq!(dst3.get("b"), Some(&LLSDValue::Binary(b"Binary data".to_vec())));
}

#[test]
fn xmlparsedate() {
    llsd_record! {
        #[derive(Debug, Default)]
        struct Dates {
            time: DateTime<Utc> => "Time",
            time_ptr: Option<DateTime<Utc>> => "TimePtr",
            integer: i64 => "Integer",
            real: f64 => "Real",
            epoch: DateTime<Utc> => "Epoch",
        }
    }
    let xml = br#"<llsd><map>
        <key>Time</key><date>2006-02-01T14:29:53Z</date>
        <key>TimePtr</key><date>2006-02-01T14:29:53Z</date>
        <key>Integer</key><date>2006-02-01T14:29:53Z</date>
        <key>Real</key><date>2006-02-01T14:29:53Z</date>
        <key>Epoch</key><date />
    </map></llsd>"#;
    let mut dst = Dates::default();
    unmarshal_xml(xml, &mut dst).expect("unmarshal failed");
    assert_eq!(dst.time.timestamp(), 1_138_804_193);
    assert_eq!(dst.time_ptr.map(|t| t.timestamp()), Some(1_138_804_193));
    assert_eq!(dst.integer, 1_138_804_193);
    assert_eq!(dst.real, 1_138_804_193.0);
    assert_eq!(dst.epoch.timestamp(), 0);
}

#[test]
fn xmlparsebinaryconversions() {
    llsd_record! {
        #[derive(Debug, Default)]
        struct Binaries {
            slice: Vec<u8> => "Slice",
            array: [u8; 11] => "Array",
            string: String => "String",
            int32: i32 => "Int32",
            int64: i64 => "Int64",
            boolean: bool => "Boolean",
        }
    }
    let xml = br#"<llsd><map>
        <key>Slice</key><binary>42696e6172792064617461</binary>
        <key>Array</key><binary>42696e6172792064617461</binary>
        <key>String</key><binary>42696e6172792064617461</binary>
        <key>Int32</key><binary>FFFFFFFD</binary>
        <key>Int64</key><binary>FFFFFFFFFFFFFFFD</binary>
        <key>Boolean</key><binary>FF</binary>
    </map></llsd>"#;
    let mut dst = Binaries::default();
    unmarshal_xml(xml, &mut dst).expect("unmarshal failed");
    assert_eq!(dst.slice, b"Binary data".to_vec());
    assert_eq!(&dst.array, b"Binary data");
    assert_eq!(dst.string, "Binary data");
    assert_eq!(dst.int32, -3);
    assert_eq!(dst.int64, -3);
    assert!(dst.boolean);
}

#[test]
fn xmlintegeroverflow() {
    llsd_record! {
        #[derive(Debug, Default)]
        struct Narrow {
            a: i8 => "a",
        }
    }
    let xml = br#"<llsd><map><key>a</key><integer>300</integer></map></llsd>"#;
    let mut dst = Narrow::default();
    let err = unmarshal_xml(xml, &mut dst).err().map(|e| e.to_string());
    assert!(
        err.as_deref()
            .is_some_and(|m| m.contains("Cannot unmarshal integer 300")),
        "unexpected result: {:?}",
        err
    );
}

#[test]
fn xmltypemismatch() {
    //  A scalar cannot populate a record destination.
    let xml = br#"<llsd><string>v</string></llsd>"#;
    let mut dst = EmptyRecord::default();
    let err = unmarshal_xml(xml, &mut dst).err();
    match err {
        Some(LLSDError::UnmarshalType { value, offset, .. }) => {
            assert_eq!(value, "string v");
            assert!(offset > 0, "type errors carry the stream offset");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn enginewireerrors() {
    //  Missing document start.
    let mut dst = EmptyRecord::default();
    let err = mock_decoder(vec![scalar_int(1)])
        .unmarshal(&mut dst)
        .err()
        .map(|e| e.to_string());
    assert_eq!(err.as_deref(), Some("Invalid LLSD: missing document start."));

    //  EOF on a fresh decode passes through verbatim.
    let err = mock_decoder(vec![]).unmarshal(&mut dst).err();
    assert!(err.is_some_and(|e| e.is_eof()));

    //  Key at document root.
    let mut s = String::new();
    let err = mock_decoder(vec![
        Token::DocumentStart,
        Token::Key(b"a".to_vec()),
        Token::DocumentEnd,
    ])
    .unmarshal(&mut s)
    .err()
    .map(|e| e.to_string());
    assert_eq!(err.as_deref(), Some("Invalid LLSD: unexpected Key"));

    //  MapEnd directly after a key.
    let mut dst = OneString::default();
    let err = mock_decoder(vec![
        Token::DocumentStart,
        Token::MapStart,
        Token::Key(b"a".to_vec()),
        Token::MapEnd,
        Token::DocumentEnd,
    ])
    .unmarshal(&mut dst)
    .err()
    .map(|e| e.to_string());
    assert_eq!(err.as_deref(), Some("Invalid LLSD: unexpected MapEnd"));

    //  Two consecutive keys.
    let err = mock_decoder(vec![
        Token::DocumentStart,
        Token::MapStart,
        Token::Key(b"a".to_vec()),
        Token::Key(b"b".to_vec()),
        Token::MapEnd,
        Token::DocumentEnd,
    ])
    .unmarshal(&mut dst)
    .err()
    .map(|e| e.to_string());
    assert_eq!(err.as_deref(), Some("Invalid LLSD: unexpected Key"));

    //  A value in key position.
    let err = mock_decoder(vec![
        Token::DocumentStart,
        Token::MapStart,
        scalar_int(1),
        Token::MapEnd,
        Token::DocumentEnd,
    ])
    .unmarshal(&mut dst)
    .err()
    .map(|e| e.to_string());
    assert_eq!(
        err.as_deref(),
        Some("Invalid LLSD: expected map to start with key, got Scalar")
    );
}

#[test]
fn mockfixedarraytruncation() {
    //  The same truncation path, driven at token level.
    let mut dst: [LLSDValue; 2] = [LLSDValue::Undefined, LLSDValue::Undefined];
    mock_decoder(vec![
        Token::DocumentStart,
        Token::ArrayStart,
        scalar_int(1),
        scalar_binary_hex(b"Binary data"),
        scalar_int(2),
        Token::ArrayEnd,
        Token::DocumentEnd,
    ])
    .unmarshal(&mut dst)
    .expect("unmarshal failed");
    assert_eq!(dst[0].as_integer(), Some(&1));
    assert_eq!(dst[1], LLSDValue::Binary(b"Binary data".to_vec()));
}

//
//  Custom scalar hooks.
//

#[derive(Debug, Default, PartialEq)]
struct Csv(Vec<String>);

impl UnmarshalTextScalar for Csv {
    fn unmarshal_text(&mut self, data: &[u8]) -> Result<(), LLSDError> {
        let text = std::str::from_utf8(data).map_err(LLSDError::Utf8)?;
        self.0.extend(text.split(',').map(str::to_string));
        Ok(())
    }
}

impl UnmarshalBinaryScalar for Csv {
    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), LLSDError> {
        self.unmarshal_text(data)
    }
}

impl MarshalTextScalar for Csv {
    fn marshal_text(&self) -> Result<(ScalarType, String), LLSDError> {
        Ok((ScalarType::String, self.0.join(",")))
    }
}

llsd_scalar!(Csv);

#[test]
fn customscalarhooks() {
    let xml = br#"<?xml version="1.0" encoding="UTF-8"?><llsd><string>a,b</string></llsd>"#;
    let dst: Csv = from_xml(xml).expect("unmarshal failed");
    assert_eq!(dst.0, vec!["a".to_string(), "b".to_string()]);

    //  The marshal hook output is wrapped without escaping.
    let out = marshal_xml(&dst).expect("marshal failed");
    assert_eq!(body(&out), "<llsd><string>a,b</string></llsd>");
}

//
//  Encoder behavior on records.
//

#[test]
fn xmlmarshalrecordshape() {
    let src = OneString {
        a: "a".to_string(),
    };
    let out = marshal_xml(&src).expect("marshal failed");
    assert_eq!(
        body(&out),
        "<llsd><map><key>a</key><string>a</string></map></llsd>"
    );
}

#[test]
fn xmlmarshalomitandempty() {
    llsd_record! {
        #[derive(Debug, Default)]
        struct Omits {
            a: String => ",omitempty",
            b: i32 => ",omitempty",
            c: Option<String> => ",omitempty",
            d: String => "-",
        }
    }
    let src = Omits {
        a: String::new(),
        b: 0,
        c: None,
        d: "hidden".to_string(),
    };
    let out = marshal_xml(&src).expect("marshal failed");
    assert_eq!(body(&out), "<llsd><map></map></llsd>");
}

#[test]
fn xmlmarshalwideintegerrejected() {
    //  64-bit integers decode but cannot be represented on the wire.
    llsd_record! {
        #[derive(Debug, Default)]
        struct Wide {
            a: i64 => "a",
        }
    }
    let err = marshal_xml(&Wide { a: 7 }).err().map(|e| e.to_string());
    assert!(
        err.as_deref()
            .is_some_and(|m| m.contains("Cannot marshal value of type")),
        "unexpected result: {:?}",
        err
    );
    //  An empty omitempty field is skipped before the encoder sees it.
    llsd_record! {
        #[derive(Debug, Default)]
        struct WideOmit {
            a: i64 => "a,omitempty",
        }
    }
    let out = marshal_xml(&WideOmit { a: 0 }).expect("marshal failed");
    assert_eq!(body(&out), "<llsd><map></map></llsd>");
}

#[test]
fn xmlmarshalhyphenname() {
    llsd_record! {
        #[derive(Debug, Default)]
        struct Hyphen {
            a: String => "-,",
        }
    }
    let src = Hyphen {
        a: "str".to_string(),
    };
    let out = marshal_xml(&src).expect("marshal failed");
    assert_eq!(
        body(&out),
        "<llsd><map><key>-</key><string>str</string></map></llsd>"
    );
}

#[test]
fn xmlmarshalnonemptyany() {
    //  An "any" holding the zero of its contained type is not empty.
    llsd_record! {
        #[derive(Debug)]
        struct AnyHolder {
            v: LLSDValue => ",omitempty",
            w: LLSDValue => "w,omitempty",
        }
    }
    let src = AnyHolder {
        v: LLSDValue::Integer(0),
        w: LLSDValue::Undefined,
    };
    let out = marshal_xml(&src).expect("marshal failed");
    assert_eq!(
        body(&out),
        "<llsd><map><key>v</key><integer>0</integer></map></llsd>"
    );
}

//
//  Round trips and cross-format properties.
//

#[test]
fn xmlroundtripvaluetree() {
    let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<llsd>
<map>
  <key>region_id</key><uuid>67153d5b-3659-afb4-8510-adda2c034649</uuid>
  <key>scale</key><string>one minute</string>
  <key>stats</key>
  <map>
    <key>time dilation</key><real>0.987862</real>
    <key>hex number</key><binary encoding="base16">0fa1</binary>
    <key>base64 number</key><binary encoding="base64">SGVsbG8gd29ybGQ=</binary>
    <key>date</key><date>2006-02-01T14:29:53Z</date>
    <key>array</key>
    <array>
      <boolean>false</boolean>
      <integer>42</integer>
      <undef/>
      <uuid/>
      <boolean>1</boolean>
      <uri>http://example.org/x?a=b</uri>
    </array>
  </map>
</map>
</llsd>"#;
    let first: LLSDValue = from_xml(xml).expect("parse failed");
    let regenerated = marshal_xml(&first).expect("marshal failed");
    let second: LLSDValue = from_xml(&regenerated).expect("reparse failed");
    assert_eq!(first, second);
    //  And through the binary form.
    let bytes = crate::ser::binary::to_bytes(&first).expect("binary encode failed");
    let third: LLSDValue = from_binary(&bytes).expect("binary decode failed");
    assert_eq!(first, third);
}

#[test]
fn base85payloadroundtrip() {
    let data: Vec<u8> = b"Binary data".to_vec();
    llsd_record! {
        #[derive(Debug, Default, PartialEq)]
        struct B85 {
            a: Vec<u8> => "A,base85",
        }
    }
    let out = marshal_xml(&B85 { a: data.clone() }).expect("marshal failed");
    assert!(
        body(&out).contains(r#"<binary encoding="base85">"#),
        "got {}",
        body(&out)
    );
    let mut back = B85::default();
    unmarshal_xml(&out, &mut back).expect("unmarshal failed");
    assert_eq!(back.a, data);
}

#[test]
fn tokenstreamsmatchacrossformats() {
    //  The two tokenizers produce the same event sequence for the
    //  same document, modulo payload encoding.
    let value = LLSDValue::Map(
        [(
            "stats".to_string(),
            LLSDValue::Array(vec![
                LLSDValue::Integer(7),
                LLSDValue::String("x".to_string()),
                LLSDValue::Boolean(true),
            ]),
        )]
        .into_iter()
        .collect(),
    );
    let xml = marshal_xml(&value).expect("xml encode failed");
    let bin = crate::ser::binary::to_bytes(&value).expect("binary encode failed");

    fn shape(scanner: &mut dyn TokenReader) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            match scanner.token() {
                Ok(Token::Scalar(s)) => out.push(format!("Scalar/{}", s.kind)),
                Ok(Token::Key(k)) => out.push(format!("Key/{}", String::from_utf8_lossy(&k))),
                Ok(tok) => out.push(tok.name().to_string()),
                Err(e) => {
                    assert!(e.is_eof(), "scan failed: {:?}", e);
                    return out;
                }
            }
        }
    }

    let mut xml_scanner = crate::de::xml::XmlScanner::new(xml.as_slice());
    let mut bin_scanner = crate::de::binary::BinaryScanner::new(bin.as_slice());
    assert_eq!(shape(&mut xml_scanner), shape(&mut bin_scanner));
}

#[test]
fn emptyscalarsdecodetozero() {
    for (xml, expected) in [
        (&b"<llsd><real/></llsd>"[..], LLSDValue::Real(0.0)),
        (b"<llsd><integer/></llsd>", LLSDValue::Integer(0)),
        (b"<llsd><string/></llsd>", LLSDValue::String(String::new())),
        (b"<llsd><boolean/></llsd>", LLSDValue::Boolean(false)),
        (b"<llsd><uuid/></llsd>", LLSDValue::UUID(Uuid::nil())),
        (b"<llsd><date/></llsd>", LLSDValue::Date(0)),
        (b"<llsd><binary/></llsd>", LLSDValue::Binary(Vec::new())),
        (b"<llsd><undef/></llsd>", LLSDValue::Undefined),
    ] {
        let got: LLSDValue = from_xml(xml).expect("parse failed");
        assert_eq!(got, expected);
    }
}

#[test]
fn autodetectformats() {
    let value = LLSDValue::Array(vec![LLSDValue::Integer(5)]);
    let xml = marshal_xml(&value).expect("xml encode failed");
    let bin = crate::ser::binary::to_bytes(&value).expect("binary encode failed");

    let mut from_xml_auto = LLSDValue::Undefined;
    auto_unmarshal(&xml, &mut from_xml_auto).expect("xml auto decode failed");
    assert_eq!(from_xml_auto, value);

    let mut from_bin_auto = LLSDValue::Undefined;
    auto_unmarshal(&bin, &mut from_bin_auto).expect("binary auto decode failed");
    assert_eq!(from_bin_auto, value);

    //  Headerless binary starting at a container op.
    let mut headerless = LLSDValue::Undefined;
    auto_unmarshal(&bin[crate::de::binary::BINARY_HEADER.len()..], &mut headerless)
        .expect("headerless decode failed");
    assert_eq!(headerless, value);

    let mut sink = LLSDValue::Undefined;
    let err = auto_unmarshal(b"garbage", &mut sink).err().map(|e| e.to_string());
    assert!(
        err.as_deref()
            .is_some_and(|m| m.contains("LLSD format not recognized")),
        "unexpected result: {:?}",
        err
    );
}

#[test]
fn binaryrecordunmarshal() {
    llsd_record! {
        #[derive(Debug, Default, PartialEq)]
        struct Region {
            region_id: Uuid => "region_id",
            scale: String => "scale",
        }
    }
    let id = Uuid::parse_str("67153d5b-3659-afb4-8510-adda2c034649").expect("uuid");
    let value = LLSDValue::Map(
        [
            ("region_id".to_string(), LLSDValue::UUID(id)),
            (
                "scale".to_string(),
                LLSDValue::String("one minute".to_string()),
            ),
        ]
        .into_iter()
        .collect(),
    );
    let bytes = crate::ser::binary::to_bytes(&value).expect("binary encode failed");
    let mut dst = Region::default();
    unmarshal_binary(&bytes, &mut dst).expect("unmarshal failed");
    assert_eq!(dst.region_id, id);
    assert_eq!(dst.scale, "one minute");
}

#[test]
fn optionpointersemantics() {
    //  Undef leaves pointers empty; values allocate.
    let xml = br#"<llsd><map><key>A</key><string>a</string></map></llsd>"#;
    llsd_record! {
        #[derive(Debug, Default)]
        struct Ptr {
            a: Option<String> => "A",
        }
    }
    let mut dst = Ptr::default();
    unmarshal_xml(xml, &mut dst).expect("unmarshal failed");
    assert_eq!(dst.a, Some("a".to_string()));

    llsd_record! {
        #[derive(Debug, Default)]
        struct PtrMap {
            a: Option<Inner> => "A",
        }
    }
    let xml2 = br#"<llsd><map><key>A</key><map><key>B</key><string>b</string></map></map></llsd>"#;
    let mut dst2 = PtrMap::default();
    unmarshal_xml(xml2, &mut dst2).expect("unmarshal failed");
    assert_eq!(dst2.a.as_ref().map(|i| i.b.as_str()), Some("b"));
}
