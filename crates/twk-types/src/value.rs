use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Kind of a stored value.
///
/// The numeric tags match the host store's type codes and are written to the
/// ledger file. Tag `0` is reserved for "no value" and has no variant here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Text,
    Binary,
    Integer,
}

impl ValueKind {
    /// Tag written when an address had no value at capture time.
    pub const ABSENT_TAG: u32 = 0;

    pub fn tag(self) -> u32 {
        match self {
            Self::Text => 1,
            Self::Binary => 3,
            Self::Integer => 4,
        }
    }

    pub fn from_tag(tag: u32) -> Result<Self, TypeError> {
        match tag {
            1 => Ok(Self::Text),
            3 => Ok(Self::Binary),
            4 => Ok(Self::Integer),
            other => Err(TypeError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Binary => write!(f, "binary"),
            Self::Integer => write!(f, "integer"),
        }
    }
}

/// A value as the store holds it: a kind tag plus opaque bytes.
///
/// Raw layouts:
/// - integer: 4 bytes, little-endian
/// - text: UTF-8 followed by a single NUL terminator
/// - binary: the bytes verbatim
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawValue {
    pub kind: ValueKind,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl RawValue {
    pub fn new(kind: ValueKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    pub fn integer(value: u32) -> Self {
        Self::new(ValueKind::Integer, value.to_le_bytes().to_vec())
    }

    pub fn text(value: &str) -> Self {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        Self::new(ValueKind::Text, data)
    }

    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        Self::new(ValueKind::Binary, value.into())
    }

    /// Decode as an integer. `None` if the kind or length is wrong.
    pub fn as_integer(&self) -> Option<u32> {
        if self.kind != ValueKind::Integer {
            return None;
        }
        let bytes: [u8; 4] = self.data.as_slice().try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }

    /// Decode as text, dropping trailing NUL terminators.
    pub fn as_text(&self) -> Option<String> {
        if self.kind != ValueKind::Text {
            return None;
        }
        let end = self
            .data
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |i| i + 1);
        Some(String::from_utf8_lossy(&self.data[..end]).into_owned())
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        (self.kind == ValueKind::Binary).then_some(self.data.as_slice())
    }
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ValueKind::Integer => match self.as_integer() {
                Some(v) => write!(f, "Integer({v})"),
                None => write!(f, "Integer(<{}>)", hex::encode(&self.data)),
            },
            ValueKind::Text => write!(f, "Text({:?})", self.as_text().unwrap_or_default()),
            ValueKind::Binary => write!(f, "Binary({})", hex::encode(&self.data)),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_match_host_codes() {
        assert_eq!(ValueKind::Text.tag(), 1);
        assert_eq!(ValueKind::Binary.tag(), 3);
        assert_eq!(ValueKind::Integer.tag(), 4);
        assert_eq!(ValueKind::from_tag(4), Ok(ValueKind::Integer));
        assert_eq!(ValueKind::from_tag(7), Err(TypeError::UnknownKind(7)));
    }

    #[test]
    fn integer_layout_is_little_endian() {
        let v = RawValue::integer(0x0102_0304);
        assert_eq!(v.data, vec![4, 3, 2, 1]);
        assert_eq!(v.as_integer(), Some(0x0102_0304));
        assert_eq!(v.as_text(), None);
    }

    #[test]
    fn text_is_nul_terminated() {
        let v = RawValue::text("a=1;b=2");
        assert_eq!(v.data.last(), Some(&0));
        assert_eq!(v.as_text().as_deref(), Some("a=1;b=2"));
        assert_eq!(RawValue::text("").as_text().as_deref(), Some(""));
    }

    #[test]
    fn wrong_length_integer_is_unreadable() {
        let v = RawValue::new(ValueKind::Integer, vec![1, 2]);
        assert_eq!(v.as_integer(), None);
    }

    #[test]
    fn json_encodes_data_as_hex() {
        let v = RawValue::binary(vec![0xde, 0xad]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"kind":"binary","data":"dead"}"#);
        let back: RawValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
