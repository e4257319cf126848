//! Value serialization.
//!
//! Values are [`serde_json::Value`]s: a closed set of shapes (null, bool,
//! number, string, sequence, field map) shared by every structure. Two
//! codecs turn them into the bytes of the `value` column:
//!
//! - [`Codec::MessagePack`]: compact binary via `rmp_serde` (default).
//! - [`Codec::Json`]: plain JSON text.
//!
//! Decoding never fails: a value that cannot be decoded comes back as its
//! raw text so one corrupt row cannot break a whole read.

use std::io::Cursor;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::StoreResult;

/// MessagePack markers that open an array (fixarray, array16, array32).
const MSGPACK_FIXARRAY: std::ops::RangeInclusive<u8> = 0x90..=0x9f;
const MSGPACK_ARRAY16: u8 = 0xdc;
const MSGPACK_ARRAY32: u8 = 0xdd;

/// Encoding used for the `value` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// MessagePack binary encoding.
    #[default]
    MessagePack,
    /// JSON text encoding.
    Json,
}

impl Codec {
    /// `true` selects MessagePack, `false` selects JSON.
    pub fn from_flag(use_msgpack: bool) -> Self {
        if use_msgpack {
            Self::MessagePack
        } else {
            Self::Json
        }
    }

    /// Encode a value into column bytes.
    pub fn encode(&self, value: &Value) -> StoreResult<Vec<u8>> {
        Ok(match self {
            Self::MessagePack => rmp_serde::to_vec(value)?,
            Self::Json => serde_json::to_vec(value)?,
        })
    }

    /// Decode column bytes, or `None` if they are not valid for this codec.
    pub fn try_decode(&self, bytes: &[u8]) -> Option<Value> {
        match self {
            Self::MessagePack => {
                // A valid leading marker is not enough: the value must span
                // every byte of the cell.
                let mut cursor = Cursor::new(bytes);
                let mut de = rmp_serde::Deserializer::new(&mut cursor);
                let value = Value::deserialize(&mut de).ok()?;
                (cursor.position() == bytes.len() as u64).then_some(value)
            }
            Self::Json => serde_json::from_slice(bytes).ok(),
        }
    }

    /// Column bytes for a cell SQLite stored as text or a number.
    ///
    /// Such cells hold JSON text. Under MessagePack they are parsed and
    /// packed so they read back like any other row; text that is not JSON is
    /// packed as a string.
    pub fn from_text_cell(&self, text: String) -> Vec<u8> {
        match self {
            Self::Json => text.into_bytes(),
            Self::MessagePack => {
                let value = match serde_json::from_str::<Value>(&text) {
                    Ok(value) => value,
                    Err(_) => Value::String(text),
                };
                match rmp_serde::to_vec(&value) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(%err, "could not pack text cell, keeping it as text");
                        value.to_string().into_bytes()
                    }
                }
            }
        }
    }

    /// Decode column bytes, falling back to their raw text.
    pub fn decode(&self, bytes: &[u8]) -> Value {
        match self.try_decode(bytes) {
            Some(value) => value,
            None => {
                warn!(codec = ?self, len = bytes.len(), "undecodable value, returning raw text");
                Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }

    /// Whether the encoded bytes hold a sequence, judged from the leading
    /// marker only.
    ///
    /// This is the sole basis for telling lists from scalars in storage, so it
    /// has to stay in step with what [`Codec::encode`] writes for arrays.
    pub fn is_sequence(&self, bytes: &[u8]) -> bool {
        match self {
            Self::MessagePack => bytes.first().is_some_and(|b| {
                MSGPACK_FIXARRAY.contains(b) || *b == MSGPACK_ARRAY16 || *b == MSGPACK_ARRAY32
            }),
            Self::Json => bytes
                .iter()
                .find(|b| !b.is_ascii_whitespace())
                .is_some_and(|b| *b == b'['),
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
