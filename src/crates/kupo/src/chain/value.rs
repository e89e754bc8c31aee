//! Output values
//!
//! A value is an Ada quantity plus a multi-asset bundle. Values are stored
//! as CBOR blobs (an unsigned integer when there are no assets, otherwise a
//! two-element array of coins and a nested policy/asset map) and surfaced on
//! the wire as JSON with `"<policy>.<asset>"` keys.

use ciborium::value::{Integer, Value as Cbor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error raised by the value CBOR codec.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("failed to encode value: {0}")]
    Encode(String),
    #[error("failed to decode value: {0}")]
    Decode(String),
}

/// An Ada+assets quantity attached to an output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    /// Lovelace quantity.
    pub coins: u64,
    /// Asset quantities, keyed by `"<policy>.<asset>"` (bare policy when the
    /// asset name is empty). Policy ids and asset names are hex-encoded.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, u64>,
}

/// Compose the canonical asset key for a policy id and asset name.
pub fn asset_key(policy_id: &str, asset_name: &str) -> String {
    if asset_name.is_empty() {
        policy_id.to_string()
    } else {
        format!("{}.{}", policy_id, asset_name)
    }
}

/// Split an asset key back into its policy id and asset name.
pub fn split_asset_key(key: &str) -> (&str, &str) {
    key.split_once('.').unwrap_or((key, ""))
}

impl Value {
    /// An Ada-only value.
    pub fn new(coins: u64) -> Self {
        Value {
            coins,
            assets: BTreeMap::new(),
        }
    }

    /// Add an asset quantity to this value.
    pub fn with_asset(mut self, policy_id: &str, asset_name: &str, quantity: u64) -> Self {
        self.assets
            .insert(asset_key(policy_id, asset_name), quantity);
        self
    }

    /// Policy ids present in this value.
    pub fn policies(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(|key| split_asset_key(key).0)
    }

    /// Whether any asset under the policy is present.
    pub fn has_policy(&self, policy_id: &str) -> bool {
        self.policies().any(|policy| policy == policy_id)
    }

    /// Whether the exact asset is present.
    pub fn has_asset(&self, policy_id: &str, asset_name: &str) -> bool {
        self.assets.contains_key(&asset_key(policy_id, asset_name))
    }

    /// Encode to the storage CBOR form.
    pub fn to_cbor(&self) -> Result<Vec<u8>, ValueError> {
        let cbor = if self.assets.is_empty() {
            Cbor::Integer(Integer::from(self.coins))
        } else {
            let mut by_policy: BTreeMap<Vec<u8>, Vec<(Cbor, Cbor)>> = BTreeMap::new();
            for (key, quantity) in &self.assets {
                let (policy, asset) = split_asset_key(key);
                let policy = hex::decode(policy)
                    .map_err(|e| ValueError::Encode(format!("bad policy id {}: {}", policy, e)))?;
                let asset = hex::decode(asset)
                    .map_err(|e| ValueError::Encode(format!("bad asset name {}: {}", asset, e)))?;
                by_policy.entry(policy).or_default().push((
                    Cbor::Bytes(asset),
                    Cbor::Integer(Integer::from(*quantity)),
                ));
            }
            let assets = by_policy
                .into_iter()
                .map(|(policy, entries)| (Cbor::Bytes(policy), Cbor::Map(entries)))
                .collect();
            Cbor::Array(vec![
                Cbor::Integer(Integer::from(self.coins)),
                Cbor::Map(assets),
            ])
        };
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&cbor, &mut bytes)
            .map_err(|e| ValueError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Decode from the storage CBOR form.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ValueError> {
        let cbor: Cbor = ciborium::de::from_reader(bytes)
            .map_err(|e| ValueError::Decode(e.to_string()))?;
        match cbor {
            Cbor::Integer(coins) => Ok(Value::new(integer_to_u64(coins)?)),
            Cbor::Array(items) if items.len() == 2 => {
                let mut items = items.into_iter();
                let coins = match items.next() {
                    Some(Cbor::Integer(coins)) => integer_to_u64(coins)?,
                    _ => return Err(ValueError::Decode("expected coin quantity".into())),
                };
                let mut value = Value::new(coins);
                let policies = match items.next() {
                    Some(Cbor::Map(policies)) => policies,
                    _ => return Err(ValueError::Decode("expected asset map".into())),
                };
                for (policy, assets) in policies {
                    let policy = match policy {
                        Cbor::Bytes(bytes) => hex::encode(bytes),
                        _ => return Err(ValueError::Decode("expected policy bytes".into())),
                    };
                    let assets = match assets {
                        Cbor::Map(assets) => assets,
                        _ => return Err(ValueError::Decode("expected asset entries".into())),
                    };
                    for (name, quantity) in assets {
                        let name = match name {
                            Cbor::Bytes(bytes) => hex::encode(bytes),
                            _ => return Err(ValueError::Decode("expected asset name bytes".into())),
                        };
                        let quantity = match quantity {
                            Cbor::Integer(quantity) => integer_to_u64(quantity)?,
                            _ => return Err(ValueError::Decode("expected asset quantity".into())),
                        };
                        value.assets.insert(asset_key(&policy, &name), quantity);
                    }
                }
                Ok(value)
            }
            _ => Err(ValueError::Decode("unexpected value shape".into())),
        }
    }
}

fn integer_to_u64(integer: Integer) -> Result<u64, ValueError> {
    u64::try_from(integer).map_err(|_| ValueError::Decode("quantity out of range".into()))
}
