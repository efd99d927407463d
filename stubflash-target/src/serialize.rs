//! Serde helpers for the target description files.
//!
//! Addresses and sizes are written as hex strings when the output format is
//! human readable (YAML), and as plain integers otherwise.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{ser::SerializeStruct, Deserializer, Serializer};
use std::ops::Range;

/// Unsigned integers that can be written as a hex string or a native integer.
pub(crate) trait HexInt: std::fmt::LowerHex + Copy {
    fn serialize_native<S: Serializer>(self, serializer: S) -> Result<S::Ok, S::Error>;
}

impl HexInt for u8 {
    fn serialize_native<S: Serializer>(self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self)
    }
}

impl HexInt for u32 {
    fn serialize_native<S: Serializer>(self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self)
    }
}

impl HexInt for u64 {
    fn serialize_native<S: Serializer>(self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self)
    }
}

pub(crate) fn hex_u_int<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: HexInt,
    S: Serializer,
{
    if serializer.is_human_readable() {
        serializer.serialize_str(&format!("{:#x}", value))
    } else {
        value.serialize_native(serializer)
    }
}

pub(crate) fn hex_range<S>(range: &Range<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let human_readable = serializer.is_human_readable();
    let mut state = serializer.serialize_struct("Range", 2)?;
    if human_readable {
        state.serialize_field("start", &format!("{:#x}", range.start))?;
        state.serialize_field("end", &format!("{:#x}", range.end))?;
    } else {
        state.serialize_field("start", &range.start)?;
        state.serialize_field("end", &range.end)?;
    }
    state.end()
}

/// Writes instruction words as base64 of their little endian bytes.
pub(crate) fn serialize_words<S>(words: &[u32], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    serializer.serialize_str(&STANDARD.encode(bytes))
}

pub(crate) fn deserialize_words<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Base64Visitor;

    impl<'de> serde::de::Visitor<'de> for Base64Visitor {
        type Value = Vec<u32>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "base64 encoded instruction words")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let bytes = STANDARD.decode(v).map_err(serde::de::Error::custom)?;
            if bytes.len() % 4 != 0 {
                return Err(E::custom(format!(
                    "instruction blob is {} bytes long, which is not a multiple of 4",
                    bytes.len()
                )));
            }

            Ok(bytes
                .chunks_exact(4)
                .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
                .collect())
        }
    }

    deserializer.deserialize_str(Base64Visitor)
}
