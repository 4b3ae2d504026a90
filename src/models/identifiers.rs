//! # Record Identifiers
//!
//! Every persisted record is keyed by an opaque unsigned 64-bit value. Keys are
//! drawn at random rather than from a sequence, so identifiers reveal nothing
//! about order volume. Generated keys stay within `1..=i64::MAX` so they fit a
//! PostgreSQL `BIGINT` column unchanged.

use crate::utils::serde::{deserialize_u64_from_string_or_number, serialize_u64_as_string};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Postgres, Type};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Draw a fresh random key
    pub fn generate() -> Self {
        Self(rand::thread_rng().gen_range(1..=i64::MAX as u64))
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Whether the key fits a `BIGINT` column. Keys above `i64::MAX` are
    /// valid at the boundary but can never name a stored record.
    pub fn is_storable(&self) -> bool {
        i64::try_from(self.0).is_ok()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<u64>() {
            Ok(0) => Err("Identifier must be greater than zero".to_string()),
            Ok(value) => Ok(Self(value)),
            Err(_) => Err(format!("Invalid identifier: {s}")),
        }
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_u64_as_string(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        match deserialize_u64_from_string_or_number(deserializer)? {
            0 => Err(D::Error::custom("Identifier must be greater than zero")),
            value => Ok(Self(value)),
        }
    }
}

impl Type<Postgres> for RecordId {
    fn type_info() -> PgTypeInfo {
        <i64 as Type<Postgres>>::type_info()
    }
}

impl<'q> Encode<'q, Postgres> for RecordId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        let raw = i64::try_from(self.0)?;
        <i64 as Encode<'q, Postgres>>::encode_by_ref(&raw, buf)
    }
}

impl<'r> Decode<'r, Postgres> for RecordId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <i64 as Decode<'r, Postgres>>::decode(value)?;
        Ok(Self(u64::try_from(raw)?))
    }
}
