//
//  record.rs
//
//  Library for serializing and de-serializing data in
//  Linden Lab Structured Data format.
//
//  Typed-record support: the field tag language, the process-wide
//  field descriptor cache, and the macros that generate per-record
//  marshal/unmarshal code.
//
//  Animats
//  February, 2024.
//  License: LGPL.
//
use crate::de::Unmarshaler;
use crate::error::LLSDError;
use crate::ser::xml::XmlEncoder;
use crate::token::ScalarType;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Text encodings for binary payloads in the XML form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Base16,
    Base64,
    Base85,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Base16 => "base16",
            Encoding::Base64 => "base64",
            Encoding::Base85 => "base85",
        }
    }

    fn from_option(opt: &str) -> Option<Encoding> {
        match opt {
            "base16" => Some(Encoding::Base16),
            "base64" => Some(Encoding::Base64),
            "base85" => Some(Encoding::Base85),
            _ => None,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed form of one field tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Key used for the field on the wire.
    pub name: String,
    /// Field excluded from marshaling entirely.
    pub omit: bool,
    /// Field excluded when its value is empty at encode time.
    pub omit_empty: bool,
    /// Binary text-encoding preference, encode side only.
    pub encoding: Encoding,
}

/// Parse a field tag.
///
/// Grammar: `name-part ("," option)*` where the name part may be empty
/// (keep the source field name) or `-` alone (omit the field; `-,`
/// names the field literally `-`). Options are `omitempty` and the
/// binary encodings; unrecognized options are ignored.
pub fn parse_tag(tag: &str, source: &str) -> Tag {
    let mut parsed = Tag {
        name: source.to_string(),
        omit: false,
        omit_empty: false,
        encoding: Encoding::Base16,
    };
    if tag.is_empty() {
        return parsed;
    }
    if tag == "-" {
        parsed.omit = true;
        return parsed;
    }
    let mut parts = tag.split(',');
    if let Some(name) = parts.next() {
        if !name.is_empty() {
            parsed.name = name.to_string();
        }
    }
    for opt in parts {
        if opt == "omitempty" {
            parsed.omit_empty = true;
        } else if let Some(encoding) = Encoding::from_option(opt) {
            parsed.encoding = encoding;
        }
    }
    parsed
}

/// Render a tag back to its canonical string form, such that
/// `parse_tag(render_tag(t)) == t` for any parsed tag.
pub fn render_tag(tag: &Tag, source: &str) -> String {
    if tag.omit {
        return "-".to_string();
    }
    let mut out = if tag.name == source {
        String::new()
    } else {
        tag.name.clone()
    };
    let mut options: Vec<&str> = Vec::new();
    if tag.omit_empty {
        options.push("omitempty");
    }
    if tag.encoding != Encoding::Base16 {
        options.push(tag.encoding.as_str());
    }
    if tag.name == "-" && options.is_empty() {
        return "-,".to_string();
    }
    for opt in options {
        out.push(',');
        out.push_str(opt);
    }
    out
}

/// Cached metadata describing how one record field participates in
/// marshaling.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Declared field name in the record.
    pub source: &'static str,
    /// Position within the record declaration.
    pub index: usize,
    /// Key used on the wire.
    pub name: String,
    pub omit: bool,
    pub omit_empty: bool,
    pub encoding: Encoding,
}

/// The descriptor table for one record type: descriptors in
/// declaration order plus a wire-name index. Immutable once built.
#[derive(Debug)]
pub struct FieldTable {
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<String, usize>,
}

impl FieldTable {
    fn build(raw: &[(&'static str, &'static str)]) -> FieldTable {
        let mut fields = Vec::with_capacity(raw.len());
        let mut by_name = HashMap::with_capacity(raw.len());
        for (index, &(source, tag_str)) in raw.iter().enumerate() {
            let tag = parse_tag(tag_str, source);
            //  A later field with the same wire name wins the lookup.
            by_name.insert(tag.name.clone(), index);
            fields.push(FieldDescriptor {
                source,
                index,
                name: tag.name,
                omit: tag.omit,
                omit_empty: tag.omit_empty,
                encoding: tag.encoding,
            });
        }
        FieldTable { fields, by_name }
    }

    /// Look up a descriptor by wire name.
    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|i| &self.fields[*i])
    }

    /// Descriptors in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, FieldDescriptor> {
        self.fields.iter()
    }
}

//
//  The field descriptor cache. Readers take the shared lock; a miss
//  computes the table outside any lock, then inserts under the write
//  lock. If another writer won the race its table is used and the
//  fresh one dropped. Entries are never mutated or evicted.
//
static FIELD_CACHE: OnceLock<RwLock<HashMap<TypeId, Arc<FieldTable>>>> = OnceLock::new();

/// Descriptor table for a record type, computed once per process.
pub fn cached_fields<T: Record>() -> Arc<FieldTable> {
    let cache = FIELD_CACHE.get_or_init(|| RwLock::new(HashMap::new()));
    {
        let read = cache.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = read.get(&TypeId::of::<T>()) {
            return Arc::clone(table);
        }
    }
    let built = Arc::new(FieldTable::build(T::FIELDS));
    let mut write = cache.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(write.entry(TypeId::of::<T>()).or_insert(built))
}

/// A struct declared through `llsd_record!`, marshaled as an LLSD map.
/// The engine and the encoder drive individual fields through these
/// methods; field metadata comes from the cached descriptor table.
pub trait Record: 'static {
    /// Declared (field name, tag string) pairs, in declaration order.
    const FIELDS: &'static [(&'static str, &'static str)];

    /// Decode the current wire value into the named field.
    fn unmarshal_field(
        &mut self,
        source: &str,
        u: &mut Unmarshaler<'_>,
    ) -> Result<(), LLSDError>;

    /// Encode the named field.
    fn marshal_field<W: Write>(
        &self,
        source: &str,
        enc: &mut XmlEncoder<W>,
        desc: &FieldDescriptor,
    ) -> Result<(), LLSDError>;

    /// omit_empty test for the named field.
    fn field_is_empty(&self, source: &str) -> bool;
}

//
//  Custom scalar hooks. A type wired in with llsd_scalar! handles raw
//  scalar payloads itself, superseding the conversion matrix.
//

/// Custom scalar decoding from the text (XML) wire form.
pub trait UnmarshalTextScalar {
    fn unmarshal_text(&mut self, data: &[u8]) -> Result<(), LLSDError>;
}

/// Custom scalar decoding from the binary wire form.
pub trait UnmarshalBinaryScalar {
    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), LLSDError>;
}

/// Custom scalar encoding to the text (XML) wire form. The returned
/// string is emitted inside `<TYPE>…</TYPE>` without escaping.
pub trait MarshalTextScalar {
    fn marshal_text(&self) -> Result<(ScalarType, String), LLSDError>;
}

/// Declare a struct as an LLSD record.
///
/// Each field may carry a tag after `=>`, in the tag language of
/// `parse_tag`. Untagged fields marshal under their declared name.
///
/// ```
/// llsd::llsd_record! {
///     #[derive(Debug, Default, PartialEq)]
///     pub struct RegionStats {
///         pub scale: String => "scale,omitempty",
///         pub agents: i32 => "agent_count",
///         pub payload: Vec<u8> => "data,base64",
///     }
/// }
/// ```
#[macro_export]
macro_rules! llsd_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty $(=> $tag:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $fty, )*
        }

        impl $crate::record::Record for $name {
            const FIELDS: &'static [(&'static str, &'static str)] = &[
                $( (stringify!($field), $crate::llsd_record!(@tag $($tag)?)) ),*
            ];

            #[allow(unused_variables)]
            fn unmarshal_field(
                &mut self,
                source: &str,
                u: &mut $crate::de::Unmarshaler<'_>,
            ) -> ::std::result::Result<(), $crate::error::LLSDError> {
                match source {
                    $( stringify!($field) => u.value(&mut self.$field), )*
                    _ => ::std::result::Result::Ok(()),
                }
            }

            #[allow(unused_variables)]
            fn marshal_field<W: ::std::io::Write>(
                &self,
                source: &str,
                enc: &mut $crate::ser::xml::XmlEncoder<W>,
                desc: &$crate::record::FieldDescriptor,
            ) -> ::std::result::Result<(), $crate::error::LLSDError> {
                match source {
                    $(
                        stringify!($field) => {
                            $crate::ser::Marshal::marshal_tagged(&self.$field, enc, desc.encoding)
                        }
                    )*
                    _ => ::std::result::Result::Ok(()),
                }
            }

            fn field_is_empty(&self, source: &str) -> bool {
                match source {
                    $( stringify!($field) => $crate::ser::Marshal::is_empty_value(&self.$field), )*
                    _ => false,
                }
            }
        }

        impl $crate::de::Unmarshal for $name {
            fn unmarshal(
                &mut self,
                u: &mut $crate::de::Unmarshaler<'_>,
            ) -> ::std::result::Result<(), $crate::error::LLSDError> {
                u.record(self)
            }

            fn zero() -> Self {
                Self {
                    $( $field: <$fty as $crate::de::Unmarshal>::zero(), )*
                }
            }
        }

        impl $crate::ser::Marshal for $name {
            fn marshal<W: ::std::io::Write>(
                &self,
                enc: &mut $crate::ser::xml::XmlEncoder<W>,
            ) -> ::std::result::Result<(), $crate::error::LLSDError> {
                enc.record(self)
            }
        }
    };
    (@tag) => { "" };
    (@tag $t:literal) => { $t };
}

/// Wire a type with custom scalar hooks into the engine. The type must
/// implement `UnmarshalTextScalar`, `UnmarshalBinaryScalar`,
/// `MarshalTextScalar` and `Default`; the hooks then supersede the
/// built-in conversion matrix for it.
#[macro_export]
macro_rules! llsd_scalar {
    ($ty:ty) => {
        impl $crate::de::Unmarshal for $ty {
            fn unmarshal(
                &mut self,
                u: &mut $crate::de::Unmarshaler<'_>,
            ) -> ::std::result::Result<(), $crate::error::LLSDError> {
                let tok = u.take_scalar(::std::any::type_name::<$ty>())?;
                if u.is_text() {
                    $crate::record::UnmarshalTextScalar::unmarshal_text(self, &tok.data)
                } else {
                    $crate::record::UnmarshalBinaryScalar::unmarshal_binary(self, &tok.data)
                }
            }

            fn zero() -> Self {
                <$ty as ::std::default::Default>::default()
            }
        }

        impl $crate::ser::Marshal for $ty {
            fn marshal<W: ::std::io::Write>(
                &self,
                enc: &mut $crate::ser::xml::XmlEncoder<W>,
            ) -> ::std::result::Result<(), $crate::error::LLSDError> {
                let (kind, text) = $crate::record::MarshalTextScalar::marshal_text(self)?;
                enc.hook_scalar(kind, &text)
            }
        }
    };
}

// Unit tests

#[cfg(test)]
mod tag_tests {
    use super::*;

    #[test]
    fn tagparse() {
        //  (tag, source) -> (name, omit, omit_empty, encoding)
        let cases: Vec<(&str, &str, (&str, bool, bool, Encoding))> = vec![
            ("", "Field", ("Field", false, false, Encoding::Base16)),
            ("-", "Field", ("Field", true, false, Encoding::Base16)),
            ("-,", "Field", ("-", false, false, Encoding::Base16)),
            ("name", "Field", ("name", false, false, Encoding::Base16)),
            (",omitempty", "Field", ("Field", false, true, Encoding::Base16)),
            ("n,omitempty,base64", "Field", ("n", false, true, Encoding::Base64)),
            (",base85", "Field", ("Field", false, false, Encoding::Base85)),
            (",bogus", "Field", ("Field", false, false, Encoding::Base16)),
        ];
        for (tag_str, source, (name, omit, omit_empty, encoding)) in cases {
            let tag = parse_tag(tag_str, source);
            assert_eq!(tag.name, name, "tag {:?}", tag_str);
            assert_eq!(tag.omit, omit, "tag {:?}", tag_str);
            assert_eq!(tag.omit_empty, omit_empty, "tag {:?}", tag_str);
            assert_eq!(tag.encoding, encoding, "tag {:?}", tag_str);
        }
    }

    #[test]
    fn tagrendersroundtrip() {
        //  parse(render(parse(t))) == parse(t) for the whole grammar.
        let tags = [
            "", "-", "-,", "name", ",omitempty", "name,omitempty", "n,base64",
            "n,omitempty,base85", ",base16", "-,omitempty",
        ];
        for tag_str in tags {
            let first = parse_tag(tag_str, "Field");
            let rendered = render_tag(&first, "Field");
            let second = parse_tag(&rendered, "Field");
            assert_eq!(first, second, "render of {:?} gave {:?}", tag_str, rendered);
        }
    }

    #[test]
    fn fieldtablelookup() {
        let table = FieldTable::build(&[
            ("alpha", ""),
            ("beta", "b,omitempty"),
            ("gamma", "-"),
        ]);
        assert_eq!(table.get("alpha").map(|d| d.index), Some(0));
        assert_eq!(table.get("b").map(|d| d.source), Some("beta"));
        assert!(table.get("beta").is_none()); // renamed away
        assert_eq!(table.get("gamma").map(|d| d.omit), Some(true));
        let order: Vec<&str> = table.iter().map(|d| d.source).collect();
        assert_eq!(order, vec!["alpha", "beta", "gamma"]);
    }
}
