//! Classification of the value types that may appear as indexed filter values.
//!
//! Only fixed-width value types are stored verbatim in a log topic.
//! Reference types (`string`, `bytes`, arrays, tuples) are stored as the
//! keccak256 of their encoding and cannot be filtered by value here.

use std::fmt;

/// A value type that can be encoded into a 32-byte topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexedType {
    /// 20-byte address
    Address,
    /// Unsigned integer, width in bits (8..=256, multiple of 8)
    Uint(u16),
    /// Signed integer, width in bits (8..=256, multiple of 8)
    Int(u16),
    Bool,
    /// Fixed-size byte array, length in bytes (1..=32)
    FixedBytes(u8),
}

impl IndexedType {
    /// Classify a canonical ABI type name.
    ///
    /// Returns `None` for anything outside the finite value-type set.
    pub fn classify(ty: &str) -> Option<Self> {
        match ty {
            "address" => return Some(Self::Address),
            "bool" => return Some(Self::Bool),
            "uint" => return Some(Self::Uint(256)),
            "int" => return Some(Self::Int(256)),
            _ => {}
        }
        if let Some(bits) = ty.strip_prefix("uint") {
            return int_width(bits).map(Self::Uint);
        }
        if let Some(bits) = ty.strip_prefix("int") {
            return int_width(bits).map(Self::Int);
        }
        if let Some(len) = ty.strip_prefix("bytes") {
            return byte_len(len).map(Self::FixedBytes);
        }
        None
    }

    /// Bit width of integer types.
    pub fn bits(&self) -> Option<u16> {
        match self {
            Self::Uint(bits) | Self::Int(bits) => Some(*bits),
            _ => None,
        }
    }
}

impl fmt::Display for IndexedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address => write!(f, "address"),
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::Bool => write!(f, "bool"),
            Self::FixedBytes(n) => write!(f, "bytes{n}"),
        }
    }
}

// Digits only: "uint08" and "uint+8" must not slip through `parse`.
fn int_width(s: &str) -> Option<u16> {
    if s.is_empty() || s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let bits: u16 = s.parse().ok()?;
    (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(bits)
}

fn byte_len(s: &str) -> Option<u8> {
    if s.is_empty() || s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let len: u8 = s.parse().ok()?;
    (1..=32).contains(&len).then_some(len)
}
