//! Typed values: the closed type-tag enumeration, the payload sum type, and
//! the binary wire codec.
//!
//! The wire format is the native registry one: strings are UTF-16LE with a
//! trailing NUL, multi-strings end with a double NUL, integers are fixed
//! width (DWORD stored big-endian only for the big-endian tag). Decoding
//! canonicalizes trailing terminators away; encoding re-adds them, so a
//! round trip is equivalence-preserving rather than bit-for-bit.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Registry value type tags, with their native numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// `REG_NONE`
    None,
    /// `REG_SZ`
    String,
    /// `REG_EXPAND_SZ`
    ExpandString,
    /// `REG_BINARY`
    Binary,
    /// `REG_DWORD`
    DWord,
    /// `REG_DWORD_BIG_ENDIAN`
    DWordBigEndian,
    /// `REG_LINK`
    Link,
    /// `REG_MULTI_SZ`
    MultiString,
    /// `REG_RESOURCE_LIST`
    ResourceList,
    /// `REG_FULL_RESOURCE_DESCRIPTOR`
    FullResourceDescriptor,
    /// `REG_RESOURCE_REQUIREMENTS_LIST`
    ResourceRequirementsList,
    /// `REG_QWORD`
    QWord,
}

impl ValueType {
    /// Native `REG_*` numeric code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::String => 1,
            Self::ExpandString => 2,
            Self::Binary => 3,
            Self::DWord => 4,
            Self::DWordBigEndian => 5,
            Self::Link => 6,
            Self::MultiString => 7,
            Self::ResourceList => 8,
            Self::FullResourceDescriptor => 9,
            Self::ResourceRequirementsList => 10,
            Self::QWord => 11,
        }
    }

    /// Map a native numeric code back to a tag. Unknown codes fall back to
    /// `Binary` so foreign data is carried rather than dropped.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            0 => Self::None,
            1 => Self::String,
            2 => Self::ExpandString,
            4 => Self::DWord,
            5 => Self::DWordBigEndian,
            6 => Self::Link,
            7 => Self::MultiString,
            8 => Self::ResourceList,
            9 => Self::FullResourceDescriptor,
            10 => Self::ResourceRequirementsList,
            11 => Self::QWord,
            _ => Self::Binary,
        }
    }

    /// Native constant name, for display and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "REG_NONE",
            Self::String => "REG_SZ",
            Self::ExpandString => "REG_EXPAND_SZ",
            Self::Binary => "REG_BINARY",
            Self::DWord => "REG_DWORD",
            Self::DWordBigEndian => "REG_DWORD_BIG_ENDIAN",
            Self::Link => "REG_LINK",
            Self::MultiString => "REG_MULTI_SZ",
            Self::ResourceList => "REG_RESOURCE_LIST",
            Self::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR",
            Self::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST",
            Self::QWord => "REG_QWORD",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// In-memory payload shapes. Accessors return `Option` on the wrong variant;
/// nothing here panics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueData {
    /// No payload (`REG_NONE`).
    None,
    /// A single string (`REG_SZ`, `REG_EXPAND_SZ`, `REG_LINK`).
    String(String),
    /// An ordered string sequence (`REG_MULTI_SZ`).
    MultiString(Vec<String>),
    /// A raw byte sequence (`REG_BINARY` and the resource-descriptor tags).
    Binary(Vec<u8>),
    /// A 32-bit integer.
    DWord(u32),
    /// A 64-bit integer.
    QWord(u64),
}

/// A named, type-tagged value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegValue {
    /// Value name; the empty name denotes the node's default value.
    pub name: String,
    /// Type tag.
    pub value_type: ValueType,
    /// Decoded payload.
    pub data: ValueData,
}

impl RegValue {
    /// Construct a value.
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType, data: ValueData) -> Self {
        Self {
            name: name.into(),
            value_type,
            data,
        }
    }

    /// Shorthand for a `REG_SZ` value.
    #[must_use]
    pub fn string(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, ValueType::String, ValueData::String(text.into()))
    }

    /// Shorthand for a `REG_DWORD` value.
    #[must_use]
    pub fn dword(name: impl Into<String>, value: u32) -> Self {
        Self::new(name, ValueType::DWord, ValueData::DWord(value))
    }

    /// The payload as a string, if it holds one.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match &self.data {
            ValueData::String(s) => Some(s),
            _ => None,
        }
    }

    /// The payload as a string sequence, if it holds one.
    #[must_use]
    pub fn as_multi_string(&self) -> Option<&[String]> {
        match &self.data {
            ValueData::MultiString(v) => Some(v),
            _ => None,
        }
    }

    /// The payload as raw bytes, if it holds them.
    #[must_use]
    pub fn as_binary(&self) -> Option<&[u8]> {
        match &self.data {
            ValueData::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// The payload as a 32-bit integer, if it holds one.
    #[must_use]
    pub fn as_dword(&self) -> Option<u32> {
        match self.data {
            ValueData::DWord(v) => Some(v),
            _ => None,
        }
    }

    /// The payload as a 64-bit integer, if it holds one.
    #[must_use]
    pub fn as_qword(&self) -> Option<u64> {
        match self.data {
            ValueData::QWord(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the tag is one of the single-string kinds.
    #[must_use]
    pub const fn is_string_type(&self) -> bool {
        matches!(
            self.value_type,
            ValueType::String | ValueType::ExpandString | ValueType::Link
        )
    }

    /// Encode the payload to its wire byte form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.data {
            ValueData::None => Vec::new(),
            ValueData::String(s) => encode_utf16_nul(s),
            ValueData::MultiString(strings) => {
                let mut out = Vec::new();
                for s in strings {
                    out.extend_from_slice(&encode_utf16_nul(s));
                }
                // terminating empty string
                out.extend_from_slice(&[0, 0]);
                out
            }
            ValueData::Binary(bytes) => bytes.clone(),
            ValueData::DWord(v) => {
                if self.value_type == ValueType::DWordBigEndian {
                    v.to_be_bytes().to_vec()
                } else {
                    v.to_le_bytes().to_vec()
                }
            }
            ValueData::QWord(v) => v.to_le_bytes().to_vec(),
        }
    }

    /// Decode wire bytes under a type tag.
    ///
    /// Trailing NUL terminators on strings are canonicalized away; integer
    /// payloads shorter than their width decode to zero, matching native
    /// tolerance for malformed entries.
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, value_type: ValueType, bytes: &[u8]) -> Self {
        let data = match value_type {
            ValueType::None => ValueData::None,
            ValueType::String | ValueType::ExpandString | ValueType::Link => {
                ValueData::String(decode_utf16_trimmed(bytes))
            }
            ValueType::MultiString => ValueData::MultiString(decode_multi_string(bytes)),
            ValueType::Binary
            | ValueType::ResourceList
            | ValueType::FullResourceDescriptor
            | ValueType::ResourceRequirementsList => ValueData::Binary(bytes.to_vec()),
            ValueType::DWord | ValueType::DWordBigEndian => {
                let value = if bytes.len() >= 4 {
                    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                    if value_type == ValueType::DWordBigEndian {
                        u32::from_be_bytes(raw)
                    } else {
                        u32::from_le_bytes(raw)
                    }
                } else {
                    0
                };
                ValueData::DWord(value)
            }
            ValueType::QWord => {
                let value = if bytes.len() >= 8 {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(&bytes[..8]);
                    u64::from_le_bytes(raw)
                } else {
                    0
                };
                ValueData::QWord(value)
            }
        };
        Self::new(name, value_type, data)
    }

    /// Human-readable payload rendering for logs and reports.
    #[must_use]
    pub fn display_data(&self) -> String {
        match &self.data {
            ValueData::None => "(empty)".to_string(),
            ValueData::String(s) => s.clone(),
            ValueData::MultiString(v) => v.join("; "),
            ValueData::Binary(b) => format!("(binary data, {} bytes)", b.len()),
            ValueData::DWord(v) => v.to_string(),
            ValueData::QWord(v) => v.to_string(),
        }
    }
}

fn encode_utf16_nul(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity((s.len() + 1) * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    out
}

fn to_utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn decode_utf16_trimmed(bytes: &[u8]) -> String {
    let mut units = to_utf16_units(bytes);
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16_lossy(&units)
}

fn decode_multi_string(bytes: &[u8]) -> Vec<String> {
    let units = to_utf16_units(bytes);
    let mut strings = Vec::new();
    let mut start = 0usize;
    for (i, &unit) in units.iter().enumerate() {
        if unit == 0 {
            if i == start {
                // empty string terminates the sequence
                break;
            }
            strings.push(String::from_utf16_lossy(&units[start..i]));
            start = i + 1;
        }
    }
    // tolerate a missing final terminator
    if start < units.len() {
        strings.push(String::from_utf16_lossy(&units[start..]));
    }
    strings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &RegValue) -> RegValue {
        RegValue::from_bytes(value.name.clone(), value.value_type, &value.to_bytes())
    }

    #[test]
    fn string_round_trip_strips_terminator() {
        let v = RegValue::string("Run", "C:\\Tools\\app.exe --quiet");
        let encoded = v.to_bytes();
        // UTF-16LE with trailing NUL
        assert_eq!(encoded.len(), ("C:\\Tools\\app.exe --quiet".len() + 1) * 2);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn empty_string_round_trip() {
        let v = RegValue::string("", "");
        assert_eq!(v.to_bytes(), vec![0, 0]);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn expand_string_and_link_decode_as_strings() {
        for vt in [ValueType::ExpandString, ValueType::Link] {
            let v = RegValue::new(
                "path",
                vt,
                ValueData::String("%SystemRoot%\\notepad.exe".to_string()),
            );
            assert_eq!(round_trip(&v), v);
        }
    }

    #[test]
    fn multi_string_round_trip() {
        let v = RegValue::new(
            "Sources",
            ValueType::MultiString,
            ValueData::MultiString(vec!["alpha".to_string(), "beta".to_string()]),
        );
        let encoded = v.to_bytes();
        // two NUL-terminated strings plus the empty terminator
        assert_eq!(encoded.len(), (6 + 5 + 1) * 2);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn empty_multi_string_round_trip() {
        let v = RegValue::new(
            "Sources",
            ValueType::MultiString,
            ValueData::MultiString(Vec::new()),
        );
        assert_eq!(v.to_bytes(), vec![0, 0]);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn binary_round_trip_including_empty() {
        for payload in [Vec::new(), vec![0xde, 0xad, 0xbe, 0xef]] {
            let v = RegValue::new("blob", ValueType::Binary, ValueData::Binary(payload));
            assert_eq!(round_trip(&v), v);
        }
    }

    #[test]
    fn dword_boundaries_round_trip() {
        for raw in [0u32, 1, u32::MAX] {
            let v = RegValue::dword("count", raw);
            assert_eq!(v.to_bytes(), raw.to_le_bytes());
            assert_eq!(round_trip(&v), v);
        }
    }

    #[test]
    fn big_endian_dword_swaps_on_the_wire() {
        let v = RegValue::new(
            "be",
            ValueType::DWordBigEndian,
            ValueData::DWord(0x0102_0304),
        );
        assert_eq!(v.to_bytes(), vec![1, 2, 3, 4]);
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn qword_boundaries_round_trip() {
        for raw in [0u64, u64::from(u32::MAX), u64::MAX] {
            let v = RegValue::new("big", ValueType::QWord, ValueData::QWord(raw));
            assert_eq!(round_trip(&v), v);
        }
    }

    #[test]
    fn short_integer_payloads_decode_to_zero() {
        let v = RegValue::from_bytes("d", ValueType::DWord, &[1, 2]);
        assert_eq!(v.as_dword(), Some(0));
        let v = RegValue::from_bytes("q", ValueType::QWord, &[1, 2, 3, 4]);
        assert_eq!(v.as_qword(), Some(0));
    }

    #[test]
    fn resource_tags_carry_raw_bytes() {
        let v = RegValue::from_bytes("r", ValueType::ResourceList, &[9, 8, 7]);
        assert_eq!(v.as_binary(), Some(&[9u8, 8, 7][..]));
        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn wrong_variant_accessors_return_none() {
        let v = RegValue::dword("n", 7);
        assert!(v.as_string().is_none());
        assert!(v.as_binary().is_none());
        assert_eq!(v.as_dword(), Some(7));
    }

    #[test]
    fn type_codes_match_native_constants() {
        assert_eq!(ValueType::String.code(), 1);
        assert_eq!(ValueType::MultiString.code(), 7);
        assert_eq!(ValueType::QWord.code(), 11);
        assert_eq!(ValueType::from_code(4), ValueType::DWord);
        // unknown codes carried as binary
        assert_eq!(ValueType::from_code(99), ValueType::Binary);
    }
}
