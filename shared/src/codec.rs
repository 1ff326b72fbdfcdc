//! Byte-exact encoding used on the wire
//!
//! Everything is serialized with bincode configured for big-endian,
//! fixed-width integers:
//! - integers and doubles are written at their natural width, big-endian
//! - enum variants are prefixed with their index as a 4-byte integer, which is
//!   how opcodes and entity type tags end up on the wire
//! - strings carry an 8-byte length prefix followed by UTF-8 bytes
//! - `bool` is a single byte, `Option<T>` a presence byte then the value
//!
//! Lists that the protocol counts with an `i32` go through [`Counted`].

use crate::error::FramingError;
use bincode::Options;
use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
use serde::ser::{self, SerializeTuple};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Largest payload a single UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
        .with_limit(MAX_DATAGRAM_SIZE as u64)
        .allow_trailing_bytes()
}

/// Serializes a value into its wire bytes
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, FramingError> {
    options()
        .serialize(value)
        .map_err(|e| FramingError::Malformed(e.to_string()))
}

/// Deserializes a value from wire bytes
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FramingError> {
    options().deserialize(bytes).map_err(FramingError::from)
}

/// A list written as an `i32` count followed by that many records
#[derive(Debug, Clone, PartialEq)]
pub struct Counted<T>(pub Vec<T>);

impl<T> Default for Counted<T> {
    fn default() -> Self {
        Counted(Vec::new())
    }
}

impl<T> From<Vec<T>> for Counted<T> {
    fn from(items: Vec<T>) -> Self {
        Counted(items)
    }
}

impl<T: Serialize> Serialize for Counted<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let count = i32::try_from(self.0.len())
            .map_err(|_| ser::Error::custom("too many records for an i32 count"))?;

        let mut tuple = serializer.serialize_tuple(self.0.len() + 1)?;
        tuple.serialize_element(&count)?;
        for item in &self.0 {
            tuple.serialize_element(item)?;
        }
        tuple.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Counted<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountedVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for CountedVisitor<T> {
            type Value = Counted<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an i32 count followed by that many records")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let count: i32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let count = usize::try_from(count).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Signed(count.into()), &self)
                })?;

                // The count is untrusted; let the records prove it.
                let mut items = Vec::with_capacity(count.min(256));
                for index in 0..count {
                    let item = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(index + 1, &self))?;
                    items.push(item);
                }
                Ok(Counted(items))
            }
        }

        deserializer.deserialize_tuple(usize::MAX, CountedVisitor(PhantomData))
    }
}
