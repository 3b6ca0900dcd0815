//! Event descriptors and human-readable signature parsing.
//!
//! The canonical signature of an event joins its parameter types in
//! declaration order, e.g. `Transfer(address,address,uint256)`. Its keccak256
//! hash is the first topic of every non-anonymous log the event emits:
//!   keccak256("Transfer(address,address,uint256)")
//!   → 0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef

use alloy_json_abi::Event;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;
use tiny_keccak::{Hasher, Keccak};

use crate::error::EventError;
use crate::types::IndexedType;

/// One event parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    /// May be empty for unnamed parameters.
    #[serde(default)]
    pub name: String,
    /// Canonical ABI type, e.g. `uint256`, `(uint256,address)`, `bytes32[]`
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub indexed: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: impl Into<String>, indexed: bool) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            indexed,
        }
    }

    /// The value type of this parameter, if it is one of the topic-encodable types.
    pub fn indexed_type(&self) -> Option<IndexedType> {
        IndexedType::classify(&self.ty)
    }
}

/// An event as declared in a contract interface. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// Anonymous events carry no signature topic.
    #[serde(default)]
    pub anonymous: bool,
}

impl EventDescriptor {
    pub fn new(name: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            parameters,
            anonymous: false,
        }
    }

    pub fn with_anonymous(mut self, anonymous: bool) -> Self {
        self.anonymous = anonymous;
        self
    }

    /// Build a descriptor from a JSON-ABI event entry.
    pub fn from_abi_event(event: &Event) -> Self {
        let parameters = event
            .inputs
            .iter()
            .map(|p| {
                let selector = p.selector_type();
                let ty = canonical_type(&selector).unwrap_or_else(|_| selector.into_owned());
                Parameter::new(p.name.clone(), ty, p.indexed)
            })
            .collect();
        Self {
            name: event.name.clone(),
            parameters,
            anonymous: event.anonymous,
        }
    }

    /// Parse a human-readable signature.
    ///
    /// Accepts the type-only form `Transfer(address,address,uint256)` as well as
    /// the annotated form `Transfer(address indexed from, address indexed to, uint256 value)`,
    /// optionally prefixed with `event` and suffixed with `anonymous`.
    pub fn parse(signature: &str) -> Result<Self, EventError> {
        let invalid = |reason: &str| EventError::InvalidSignature {
            signature: signature.to_string(),
            reason: reason.to_string(),
        };

        let mut text = signature.trim();
        if let Some(rest) = text.strip_prefix("event ") {
            text = rest.trim_start();
        }
        let mut anonymous = false;
        if let Some(rest) = text.strip_suffix("anonymous") {
            if rest.trim_end().ends_with(')') {
                anonymous = true;
                text = rest.trim_end();
            }
        }

        let open = text.find('(').ok_or_else(|| invalid("missing '('"))?;
        let name = text[..open].trim();
        if name.is_empty() || !is_identifier(name) {
            return Err(invalid("invalid event name"));
        }
        let body = text[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| invalid("missing closing ')'"))?;

        let parameters = split_top_level(body)
            .map_err(|e| invalid(&e))?
            .into_iter()
            .map(|part| parse_param(part).map_err(|e| invalid(&e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            parameters,
            anonymous,
        })
    }

    /// `Name(type0,type1,...)`
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.parameters.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// keccak256 of the canonical signature.
    pub fn signature_topic(&self) -> B256 {
        keccak256(self.signature().as_bytes())
    }

    /// Indexed parameters with their declaration index, in declaration order.
    pub fn indexed_params(&self) -> impl Iterator<Item = (usize, &Parameter)> + '_ {
        self.parameters.iter().enumerate().filter(|(_, p)| p.indexed)
    }

    pub fn indexed_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.indexed).count()
    }

    /// Non-indexed parameters with their declaration index.
    pub fn data_params(&self) -> impl Iterator<Item = (usize, &Parameter)> + '_ {
        self.parameters.iter().enumerate().filter(|(_, p)| !p.indexed)
    }

    /// Key a parameter is addressed by in named arguments: its name, or its
    /// declaration index when unnamed.
    pub fn param_key(&self, index: usize) -> String {
        match self.parameters.get(index) {
            Some(p) if !p.name.is_empty() => p.name.clone(),
            _ => index.to_string(),
        }
    }
}

impl fmt::Display for EventDescriptor {
    /// Full annotated form: `Transfer(address indexed from, address indexed to, uint256 value)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let mut s = p.ty.clone();
                if p.indexed {
                    s.push_str(" indexed");
                }
                if !p.name.is_empty() {
                    s.push(' ');
                    s.push_str(&p.name);
                }
                s
            })
            .collect();
        write!(f, "{}({})", self.name, params.join(", "))?;
        if self.anonymous {
            write!(f, " anonymous")?;
        }
        Ok(())
    }
}

/// keccak256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> B256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    B256::from(output)
}

/// Normalize a type as written by a human into its canonical ABI form.
///
/// `uint` → `uint256`, `tuple(uint a, address b)[]` → `(uint256,address)[]`.
pub fn canonical_type(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    let (base, suffix) = split_array_suffix(raw)?;

    let base = match base.strip_prefix("tuple(").or_else(|| base.strip_prefix('(')) {
        Some(inner) => {
            let inner = inner
                .strip_suffix(')')
                .ok_or_else(|| format!("unbalanced tuple type '{raw}'"))?;
            let components = split_top_level(inner)?
                .into_iter()
                .map(|c| parse_param(c).map(|p| p.ty))
                .collect::<Result<Vec<_>, _>>()?;
            format!("({})", components.join(","))
        }
        None => match base {
            "uint" => "uint256".to_string(),
            "int" => "int256".to_string(),
            "" => return Err("empty type".to_string()),
            other if is_identifier(other) => other.to_string(),
            other => return Err(format!("invalid type '{other}'")),
        },
    };
    Ok(format!("{base}{suffix}"))
}

/// Split trailing `[..]` groups off a type. Each group is empty or a decimal length.
fn split_array_suffix(raw: &str) -> Result<(&str, &str), String> {
    let mut end = raw.len();
    while raw[..end].ends_with(']') {
        let open = raw[..end]
            .rfind('[')
            .ok_or_else(|| format!("unbalanced array suffix in '{raw}'"))?;
        let len = &raw[open + 1..end - 1];
        if !len.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid array length '{len}'"));
        }
        end = open;
    }
    Ok((raw[..end].trim_end(), &raw[end..]))
}

/// Split on commas that are not nested inside parentheses.
fn split_top_level(s: &str) -> Result<Vec<&str>, String> {
    if s.trim().is_empty() {
        return Ok(vec![]);
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err("unbalanced ')'".to_string());
                }
            }
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unbalanced '('".to_string());
    }
    parts.push(&s[start..]);
    Ok(parts)
}

/// `type [indexed] [name]`
fn parse_param(text: &str) -> Result<Parameter, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty parameter".to_string());
    }

    let type_end = if text.starts_with('(') || text.starts_with("tuple(") {
        let mut depth = 0i32;
        let mut close = None;
        for (i, c) in text.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| format!("unbalanced tuple in '{text}'"))?;
        let rest = &text[close + 1..];
        let suffix_len = rest
            .find(|c: char| !(c == '[' || c == ']' || c.is_ascii_digit()))
            .unwrap_or(rest.len());
        close + 1 + suffix_len
    } else {
        text.find(char::is_whitespace).unwrap_or(text.len())
    };

    let ty = canonical_type(&text[..type_end])?;

    let mut indexed = false;
    let mut name = String::new();
    for token in text[type_end..].split_whitespace() {
        match token {
            "indexed" if !indexed && name.is_empty() => indexed = true,
            _ if name.is_empty() && is_identifier(token) => name = token.to_string(),
            _ => return Err(format!("unexpected token '{token}'")),
        }
    }

    Ok(Parameter { name, ty, indexed })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
