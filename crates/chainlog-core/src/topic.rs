//! Topic encoder: indexed filter values to 32-byte log topics.
//!
//! # Encoding rules (value types only)
//! - `address`: 20 bytes left-padded with zeros
//! - `uintN`: big-endian, left-padded with zeros
//! - `intN`: 256-bit two's complement (negative values sign-extend with `0xff`)
//! - `bool`: `1` or `0` in the last byte
//! - `bytesN`: the given bytes left-padded with zeros
//!
//! Reference types are hashed into their topic and cannot be filtered by value.

use alloy_primitives::{Address, B256, I256, U256};
use serde::{Serialize, Serializer};
use std::str::FromStr;

use crate::args::{ArgFilter, ArgValue, NormalizedArgs};
use crate::descriptor::EventDescriptor;
use crate::error::EventError;
use crate::types::IndexedType;

/// One positional filter slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Matches any value. Rendered as `null` on the wire.
    Wildcard,
    Exact(B256),
    /// Matches if the log's topic equals any listed value.
    AnyOf(Vec<B256>),
}

impl Topic {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }

    /// `eth_getLogs` matching for a single slot.
    pub fn matches(&self, actual: Option<&B256>) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Exact(expected) => actual == Some(expected),
            Self::AnyOf(options) => actual.is_some_and(|a| options.contains(a)),
        }
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Wildcard => serializer.serialize_none(),
            Self::Exact(t) => t.serialize(serializer),
            Self::AnyOf(ts) => ts.serialize(serializer),
        }
    }
}

/// Encode the normalized indexed arguments of `descriptor` into one topic per
/// indexed parameter, in declaration order. The signature slot is not included.
pub fn encode_topics(
    descriptor: &EventDescriptor,
    args: &NormalizedArgs,
) -> Result<Vec<Topic>, EventError> {
    descriptor
        .indexed_params()
        .map(|(index, param)| {
            let key = descriptor.param_key(index);
            match args.get(&key) {
                None | Some(ArgFilter::Wildcard) => Ok(Topic::Wildcard),
                Some(ArgFilter::Exact(value)) => {
                    encode_value(&key, &param.ty, value).map(Topic::Exact)
                }
                Some(ArgFilter::AnyOf(values)) => values
                    .iter()
                    .map(|v| encode_value(&key, &param.ty, v))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Topic::AnyOf),
            }
        })
        .collect()
}

/// The full wire filter: the signature topic (unless the event is anonymous)
/// followed by the indexed slots.
pub fn topic_filter(descriptor: &EventDescriptor, indexed: Vec<Topic>) -> Vec<Topic> {
    if descriptor.anonymous {
        return indexed;
    }
    let mut topics = Vec::with_capacity(indexed.len() + 1);
    topics.push(Topic::Exact(descriptor.signature_topic()));
    topics.extend(indexed);
    topics
}

/// Encode a single scalar for a parameter of type `ty`.
pub fn encode_value(param: &str, ty: &str, value: &ArgValue) -> Result<B256, EventError> {
    let kind = IndexedType::classify(ty)
        .ok_or_else(|| EventError::UnsupportedIndexedType { ty: ty.to_string() })?;
    let mismatch = || EventError::invalid_value(param, format!("{value:?} is not a valid {kind}"));

    match kind {
        IndexedType::Address => {
            let addr = match value {
                ArgValue::Address(a) => *a,
                ArgValue::Bytes(b) if b.len() == 20 => Address::from_slice(b),
                ArgValue::Str(s) => Address::from_str(s.trim())
                    .map_err(|e| EventError::invalid_value(param, format!("address '{s}': {e}")))?,
                _ => return Err(mismatch()),
            };
            Ok(addr.into_word())
        }

        IndexedType::Uint(bits) => {
            let u = match value {
                ArgValue::Uint(u) => *u,
                ArgValue::Int(i) if !i.is_negative() => i.into_raw(),
                ArgValue::Str(s) => parse_u256(param, s)?,
                _ => return Err(mismatch()),
            };
            if u.bit_len() > bits as usize {
                return Err(EventError::invalid_value(param, format!("{u} overflows uint{bits}")));
            }
            Ok(B256::from(u.to_be_bytes::<32>()))
        }

        IndexedType::Int(bits) => {
            let i = match value {
                ArgValue::Int(i) => *i,
                ArgValue::Uint(u) => I256::try_from(*u)
                    .map_err(|_| EventError::invalid_value(param, format!("{u} overflows int{bits}")))?,
                ArgValue::Str(s) => parse_i256(param, s)?,
                _ => return Err(mismatch()),
            };
            if !fits_signed(i, bits) {
                return Err(EventError::invalid_value(param, format!("{i} overflows int{bits}")));
            }
            Ok(B256::from(i.into_raw().to_be_bytes::<32>()))
        }

        IndexedType::Bool => {
            let b = match value {
                ArgValue::Bool(b) => *b,
                ArgValue::Str(s) if s == "true" => true,
                ArgValue::Str(s) if s == "false" => false,
                _ => return Err(mismatch()),
            };
            let mut word = [0u8; 32];
            word[31] = b as u8;
            Ok(B256::from(word))
        }

        IndexedType::FixedBytes(len) => {
            let bytes = match value {
                ArgValue::Bytes(b) => b.clone(),
                ArgValue::Str(s) => hex::decode(s.trim().trim_start_matches("0x"))
                    .map_err(|e| EventError::invalid_value(param, format!("hex '{s}': {e}")))?,
                _ => return Err(mismatch()),
            };
            if bytes.len() > len as usize {
                return Err(EventError::invalid_value(
                    param,
                    format!("{} bytes do not fit bytes{len}", bytes.len()),
                ));
            }
            Ok(B256::left_padding_from(&bytes))
        }
    }
}

fn parse_u256(param: &str, s: &str) -> Result<U256, EventError> {
    U256::from_str(s.trim())
        .map_err(|e| EventError::invalid_value(param, format!("integer '{s}': {e}")))
}

fn parse_i256(param: &str, s: &str) -> Result<I256, EventError> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = parse_u256(param, digits)?;
    let half = U256::from(1u8) << 255usize;
    let out_of_range = || EventError::invalid_value(param, format!("{s} overflows int256"));
    if negative {
        if magnitude > half {
            return Err(out_of_range());
        }
        Ok(I256::from_raw(U256::ZERO.wrapping_sub(magnitude)))
    } else {
        if magnitude >= half {
            return Err(out_of_range());
        }
        Ok(I256::from_raw(magnitude))
    }
}

/// `-2^(bits-1) <= i < 2^(bits-1)`
fn fits_signed(i: I256, bits: u16) -> bool {
    let limit = U256::from(1u8) << (bits as usize - 1);
    if i.is_negative() {
        i.unsigned_abs() <= limit
    } else {
        i.unsigned_abs() < limit
    }
}
