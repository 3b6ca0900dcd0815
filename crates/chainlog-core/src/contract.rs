//! Contract handle: an address plus its events in declaration order.

use alloy_json_abi::Event;
use alloy_primitives::Address;
use serde_json::Value;
use std::path::Path;

use crate::descriptor::EventDescriptor;
use crate::error::{ConfigError, EventError};
use crate::resolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    pub address: Address,
    pub events: Vec<EventDescriptor>,
}

impl Contract {
    pub fn new(address: Address, events: Vec<EventDescriptor>) -> Self {
        Self { address, events }
    }

    /// Build from a JSON ABI array. Non-event entries are skipped.
    pub fn from_abi_json(address: Address, abi: &str) -> Result<Self, EventError> {
        let value: Value = serde_json::from_str(abi).map_err(|e| EventError::InvalidAbi {
            reason: e.to_string(),
        })?;
        Self::from_abi_value(address, &value)
    }

    pub fn from_abi_value(address: Address, abi: &Value) -> Result<Self, EventError> {
        let entries = abi.as_array().ok_or_else(|| EventError::InvalidAbi {
            reason: "ABI must be a JSON array".into(),
        })?;

        // JsonAbi groups events by name, so walk the array to keep declaration order.
        let events = entries
            .iter()
            .filter(|entry| entry.get("type").and_then(Value::as_str) == Some("event"))
            .map(|entry| {
                serde_json::from_value::<Event>(entry.clone())
                    .map(|event| EventDescriptor::from_abi_event(&event))
                    .map_err(|e| EventError::InvalidAbi {
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { address, events })
    }

    /// Load a deployment artifact: `{"address": "0x..", "abi": [..]}`.
    ///
    /// `address` overrides the artifact's own address when given.
    pub fn from_artifact_file(
        path: impl AsRef<Path>,
        address: Option<Address>,
    ) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let artifact: Value = serde_json::from_str(&text)?;

        let abi = artifact.get("abi").ok_or_else(|| EventError::InvalidAbi {
            reason: format!("{} has no 'abi' field", path.as_ref().display()),
        })?;
        let address = match address {
            Some(a) => a,
            None => artifact
                .get("address")
                .and_then(Value::as_str)
                .ok_or_else(|| EventError::InvalidAbi {
                    reason: format!("{} has no 'address' field", path.as_ref().display()),
                })?
                .parse::<Address>()
                .map_err(|e| EventError::InvalidAbi {
                    reason: format!("invalid address: {e}"),
                })?,
        };
        Ok(Self::from_abi_value(address, abi)?)
    }

    /// Resolve an event identifier against this contract's events.
    pub fn event(&self, identifier: &str) -> Result<&EventDescriptor, EventError> {
        resolver::resolve(&self.events, identifier)
    }
}
