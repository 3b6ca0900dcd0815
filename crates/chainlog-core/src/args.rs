//! Indexed filter arguments and their normalization.
//!
//! Callers describe indexed filter values either positionally (aligned with
//! the event's indexed parameters) or by parameter name. Both shapes are
//! normalized into the same [`NormalizedArgs`] map of tagged [`ArgFilter`]s
//! before topic encoding.

use alloy_primitives::{Address, I256, U256};
use indexmap::IndexMap;
use serde_json::Value;

use crate::descriptor::EventDescriptor;
use crate::error::EventError;

/// A scalar filter value.
///
/// `Str` is parsed according to the parameter type at encoding time, so
/// loosely typed input (CLI flags, JSON) can be passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Address(Address),
    Uint(U256),
    Int(I256),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
}

/// A user-supplied filter value for one indexed parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterArg {
    /// Match any value.
    Null,
    Value(ArgValue),
    /// Match any of the listed values.
    List(Vec<FilterArg>),
}

impl FilterArg {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert a JSON value: `null` → `Null`, array → `List`, scalar → `Value`.
    ///
    /// Negative numbers become `Int`, non-negative numbers `Uint`; strings stay
    /// strings and are interpreted per parameter type when encoded.
    pub fn from_json(value: &Value) -> Result<Self, EventError> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Value(ArgValue::Bool(*b)),
            Value::String(s) => Self::Value(ArgValue::Str(s.clone())),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Self::Value(ArgValue::Uint(U256::from(u)))
                } else if let Some(i) = n.as_i64() {
                    Self::Value(ArgValue::Int(i256_from_i64(i)))
                } else {
                    return Err(EventError::invalid_value(
                        n.to_string(),
                        "non-integer numbers cannot be filter values",
                    ));
                }
            }
            Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect::<Result<_, _>>()?)
            }
            Value::Object(_) => {
                return Err(EventError::invalid_value(
                    value.to_string(),
                    "objects cannot be filter values",
                ))
            }
        })
    }
}

impl From<ArgValue> for FilterArg {
    fn from(v: ArgValue) -> Self {
        Self::Value(v)
    }
}

impl<T: Into<FilterArg>> From<Option<T>> for FilterArg {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<FilterArg>> From<Vec<T>> for FilterArg {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<Address> for FilterArg {
    fn from(v: Address) -> Self {
        Self::Value(ArgValue::Address(v))
    }
}

impl From<U256> for FilterArg {
    fn from(v: U256) -> Self {
        Self::Value(ArgValue::Uint(v))
    }
}

impl From<I256> for FilterArg {
    fn from(v: I256) -> Self {
        Self::Value(ArgValue::Int(v))
    }
}

impl From<u64> for FilterArg {
    fn from(v: u64) -> Self {
        Self::Value(ArgValue::Uint(U256::from(v)))
    }
}

impl From<i64> for FilterArg {
    fn from(v: i64) -> Self {
        Self::Value(ArgValue::Int(i256_from_i64(v)))
    }
}

impl From<bool> for FilterArg {
    fn from(v: bool) -> Self {
        Self::Value(ArgValue::Bool(v))
    }
}

impl From<&str> for FilterArg {
    fn from(v: &str) -> Self {
        Self::Value(ArgValue::Str(v.to_string()))
    }
}

impl From<String> for FilterArg {
    fn from(v: String) -> Self {
        Self::Value(ArgValue::Str(v))
    }
}

fn i256_from_i64(v: i64) -> I256 {
    let magnitude = I256::from_raw(U256::from(v.unsigned_abs()));
    if v < 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Indexed filter values as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IndexedArgs {
    /// No filter: every indexed slot is a wildcard.
    #[default]
    None,
    /// Aligned with the event's indexed parameters by position.
    Positional(Vec<FilterArg>),
    /// Keyed by parameter name (or declaration index for unnamed parameters).
    Named(IndexMap<String, FilterArg>),
}

impl IndexedArgs {
    pub fn positional<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FilterArg>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<FilterArg>,
    {
        Self::Named(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// JSON array → positional, object → named, `null` → none.
    pub fn from_json(value: &Value) -> Result<Self, EventError> {
        match value {
            Value::Null => Ok(Self::None),
            Value::Array(items) => Ok(Self::Positional(
                items.iter().map(FilterArg::from_json).collect::<Result<_, _>>()?,
            )),
            Value::Object(map) => Ok(Self::Named(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), FilterArg::from_json(v)?)))
                    .collect::<Result<_, EventError>>()?,
            )),
            other => Err(EventError::invalid_value(
                other.to_string(),
                "indexed arguments must be an array, an object or null",
            )),
        }
    }
}

/// The filter for one indexed slot after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgFilter {
    Wildcard,
    Exact(ArgValue),
    AnyOf(Vec<ArgValue>),
}

impl ArgFilter {
    fn from_arg(key: &str, arg: FilterArg) -> Result<Self, EventError> {
        match arg {
            FilterArg::Null => Ok(Self::Wildcard),
            FilterArg::Value(v) => Ok(Self::Exact(v)),
            FilterArg::List(items) => {
                if items.is_empty() {
                    return Err(EventError::invalid_value(key, "empty list of alternatives"));
                }
                items
                    .into_iter()
                    .map(|item| match item {
                        FilterArg::Value(v) => Ok(v),
                        FilterArg::Null => Err(EventError::invalid_value(
                            key,
                            "null is not allowed inside a list of alternatives",
                        )),
                        FilterArg::List(_) => Err(EventError::invalid_value(
                            key,
                            "nested lists are not allowed inside a list of alternatives",
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::AnyOf)
            }
        }
    }
}

/// Parameter key → slot filter. Keys absent from the map are wildcards.
pub type NormalizedArgs = IndexMap<String, ArgFilter>;

/// Normalize positional or named indexed arguments against `descriptor`.
pub fn normalize_args(
    descriptor: &EventDescriptor,
    args: IndexedArgs,
) -> Result<NormalizedArgs, EventError> {
    let indexed: Vec<String> = descriptor
        .indexed_params()
        .map(|(i, _)| descriptor.param_key(i))
        .collect();

    let mut out = NormalizedArgs::new();
    match args {
        IndexedArgs::None => {}
        IndexedArgs::Positional(values) => {
            if values.len() > indexed.len() {
                return Err(EventError::TooManyArguments {
                    expected: indexed.len(),
                    got: values.len(),
                });
            }
            for (key, value) in indexed.into_iter().zip(values) {
                if value.is_null() {
                    continue;
                }
                let filter = ArgFilter::from_arg(&key, value)?;
                out.insert(key, filter);
            }
        }
        IndexedArgs::Named(entries) => {
            for (key, value) in entries {
                if !indexed.contains(&key) {
                    tracing::debug!(event = %descriptor.name, key = %key, "ignoring filter key with no indexed parameter");
                    continue;
                }
                let filter = ArgFilter::from_arg(&key, value)?;
                out.insert(key, filter);
            }
        }
    }
    Ok(out)
}
