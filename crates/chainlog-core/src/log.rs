//! Log normalizer: backend-native log entries to [`NormalizedLog`].
//!
//! Every backend has its own log shape. Each implements [`NativeLog`] to
//! expose a canonical [`RawLog`] view; the normalizer decodes that view
//! against an [`EventDescriptor`] and keeps the original entry under
//! `native` for escape-hatch access.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, Bytes, B256, I256, U256};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::ops::Index;

use crate::descriptor::{EventDescriptor, Parameter};
use crate::error::DecodeFailure;

/// Canonical typed view of a log entry, independent of backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub block_hash: Option<B256>,
    pub transaction_index: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
    /// Set when the log was dropped by a chain reorganization.
    #[serde(default)]
    pub removed: bool,
}

/// A backend's own log representation.
pub trait NativeLog: Clone + Send + Sync + 'static {
    /// The canonical view of this entry.
    fn to_raw(&self) -> Result<RawLog, DecodeFailure>;
}

impl NativeLog for RawLog {
    fn to_raw(&self) -> Result<RawLog, DecodeFailure> {
        Ok(self.clone())
    }
}

/// A decoded event argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum LogValue {
    Address(Address),
    Uint(U256),
    Int(I256),
    Bool(bool),
    /// bytes1 .. bytes32, exactly as long as the declared size
    FixedBytes(Bytes),
    Bytes(Bytes),
    Str(String),
    Array(Vec<LogValue>),
    Tuple(Vec<LogValue>),
    /// Indexed reference type: only the keccak256 of the value is in the topic.
    Hash(B256),
}

impl From<DynSolValue> for LogValue {
    fn from(val: DynSolValue) -> Self {
        match val {
            DynSolValue::Bool(b) => Self::Bool(b),
            DynSolValue::Int(i, _) => Self::Int(i),
            DynSolValue::Uint(u, _) => Self::Uint(u),
            DynSolValue::FixedBytes(word, size) => {
                Self::FixedBytes(Bytes::copy_from_slice(&word[..size]))
            }
            DynSolValue::Address(a) => Self::Address(a),
            DynSolValue::Function(f) => Self::Bytes(Bytes::from(f.to_vec())),
            DynSolValue::Bytes(b) => Self::Bytes(b.into()),
            DynSolValue::String(s) => Self::Str(s),
            DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) => {
                Self::Array(vals.into_iter().map(Self::from).collect())
            }
            DynSolValue::Tuple(vals) => Self::Tuple(vals.into_iter().map(Self::from).collect()),
        }
    }
}

impl LogValue {
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Self::Uint(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<I256> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Decoded arguments, addressable both by declaration index and by name.
///
/// `args[0]` and `args["from"]` refer to the same value. Positions cover all
/// parameters, indexed and non-indexed, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogArgs {
    names: Vec<String>,
    values: Vec<LogValue>,
}

impl LogArgs {
    fn new(params: &[Parameter], values: Vec<LogValue>) -> Self {
        Self {
            names: params.iter().map(|p| p.name.clone()).collect(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LogValue> {
        self.values.get(index)
    }

    /// The first parameter with this name.
    pub fn by_name(&self, name: &str) -> Option<&LogValue> {
        if name.is_empty() {
            return None;
        }
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i))
    }

    /// Look up by name, falling back to a decimal index.
    pub fn get_key(&self, key: &str) -> Option<&LogValue> {
        self.by_name(key)
            .or_else(|| key.parse::<usize>().ok().and_then(|i| self.get(i)))
    }

    /// `(index, name, value)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str, &LogValue)> + '_ {
        self.names
            .iter()
            .zip(&self.values)
            .enumerate()
            .map(|(i, (n, v))| (i, n.as_str(), v))
    }
}

impl Index<usize> for LogArgs {
    type Output = LogValue;

    fn index(&self, index: usize) -> &LogValue {
        &self.values[index]
    }
}

impl Index<&str> for LogArgs {
    type Output = LogValue;

    fn index(&self, key: &str) -> &LogValue {
        self.get_key(key)
            .unwrap_or_else(|| panic!("no event argument named '{key}'"))
    }
}

impl Serialize for LogArgs {
    /// `{"0": v0, "from": v0, "1": v1, "to": v1, ...}`
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        let mut seen: Vec<&str> = Vec::new();
        for (i, name, value) in self.iter() {
            map.serialize_entry(&i.to_string(), value)?;
            if !name.is_empty() && !seen.contains(&name) {
                map.serialize_entry(name, value)?;
                seen.push(name);
            }
        }
        map.end()
    }
}

/// The canonical log record returned by every fetch and watch operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedLog<N> {
    pub name: String,
    pub signature: String,
    pub address: Address,
    pub args: LogArgs,
    pub block_number: Option<u64>,
    pub block_hash: Option<B256>,
    pub transaction_index: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
    /// The untouched backend entry.
    pub native: N,
}

/// Decode `native` against `descriptor`; `None` when it does not match.
pub fn normalize_log<N: NativeLog>(
    descriptor: &EventDescriptor,
    native: N,
) -> Option<NormalizedLog<N>> {
    match try_normalize_log(descriptor, native) {
        Ok(log) => Some(log),
        Err(reason) => {
            tracing::debug!(event = %descriptor.name, %reason, "log does not decode against event");
            None
        }
    }
}

/// Like [`normalize_log`], but reports why decoding failed.
pub fn try_normalize_log<N: NativeLog>(
    descriptor: &EventDescriptor,
    native: N,
) -> Result<NormalizedLog<N>, DecodeFailure> {
    let raw = native.to_raw()?;

    let mut topics = raw.topics.iter();
    if !descriptor.anonymous {
        match topics.next() {
            Some(sig) if *sig == descriptor.signature_topic() => {}
            _ => return Err(DecodeFailure::SignatureMismatch),
        }
    }
    let indexed_topics: Vec<&B256> = topics.collect();
    let expected = descriptor.indexed_count();
    if indexed_topics.len() != expected {
        return Err(DecodeFailure::TopicCount {
            expected,
            got: indexed_topics.len(),
        });
    }

    let mut values: Vec<Option<LogValue>> = vec![None; descriptor.parameters.len()];

    for ((index, param), topic) in descriptor.indexed_params().zip(indexed_topics) {
        values[index] = Some(decode_topic(param, topic)?);
    }

    let data_params: Vec<(usize, &Parameter)> = descriptor.data_params().collect();
    if !data_params.is_empty() {
        let types = data_params
            .iter()
            .map(|(_, p)| parse_type(&p.ty))
            .collect::<Result<Vec<_>, _>>()?;
        let decoded = DynSolType::Tuple(types)
            .abi_decode_params(&raw.data)
            .map_err(|e| DecodeFailure::Abi(e.to_string()))?;
        let DynSolValue::Tuple(items) = decoded else {
            return Err(DecodeFailure::Abi("data payload is not a tuple".into()));
        };
        if items.len() != data_params.len() {
            return Err(DecodeFailure::Abi(format!(
                "expected {} data values, got {}",
                data_params.len(),
                items.len()
            )));
        }
        for ((index, _), item) in data_params.iter().zip(items) {
            values[*index] = Some(LogValue::from(item));
        }
    }

    let values = values
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| DecodeFailure::Abi("parameter left undecoded".into()))?;

    Ok(NormalizedLog {
        name: descriptor.name.clone(),
        signature: descriptor.signature(),
        address: raw.address,
        args: LogArgs::new(&descriptor.parameters, values),
        block_number: raw.block_number,
        block_hash: raw.block_hash,
        transaction_index: raw.transaction_index,
        transaction_hash: raw.transaction_hash,
        log_index: raw.log_index,
        native,
    })
}

/// Value types decode from the 32-byte word; reference types only yield their hash.
fn decode_topic(param: &Parameter, topic: &B256) -> Result<LogValue, DecodeFailure> {
    if param.indexed_type().is_none() {
        return Ok(LogValue::Hash(*topic));
    }
    parse_type(&param.ty)?
        .abi_decode(topic.as_slice())
        .map(LogValue::from)
        .map_err(|e| DecodeFailure::Abi(format!("topic for '{}': {e}", param.name)))
}

fn parse_type(ty: &str) -> Result<DynSolType, DecodeFailure> {
    DynSolType::parse(ty).map_err(|e| DecodeFailure::Abi(format!("type '{ty}': {e}")))
}
