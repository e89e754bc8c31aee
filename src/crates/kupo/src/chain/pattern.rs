//! Patterns
//!
//! A pattern is a declarative matcher selecting which transaction outputs get
//! indexed. The variant set is closed: the SQL pre-filter translator and the
//! overlap predicate are total functions over it.
//!
//! Canonical text forms:
//!
//! | variant | text |
//! |---|---|
//! | `Any` | `*` (or `*/*`) |
//! | `ExactAddress` | bech32 or hex address |
//! | `PaymentCredential` | `<credential>/*` |
//! | `DelegationCredential` | `*/<credential>` |
//! | `AddressPair` | `<payment>/<delegation>` |
//! | `PolicyId` | `<policy>.*` |
//! | `AssetId` | `<policy>.<asset-name>` |
//! | `TransactionId` | `*@<tx-id>` |
//! | `OutputReference` | `<index>@<tx-id>` |

use crate::chain::address::{self, CREDENTIAL_HEX_LEN};
use crate::chain::value::Value;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a policy id, in hex digits.
pub const POLICY_ID_HEX_LEN: usize = 56;

/// Length of a transaction id, in hex digits.
pub const TRANSACTION_ID_HEX_LEN: usize = 64;

/// Maximum length of an asset name, in hex digits.
pub const ASSET_NAME_MAX_HEX_LEN: usize = 64;

/// A declarative matcher over transaction outputs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pattern {
    /// Matches every output.
    Any,
    /// Matches outputs at exactly this address text.
    ExactAddress(String),
    /// Matches outputs whose payment credential equals this hash.
    PaymentCredential(String),
    /// Matches outputs whose delegation credential equals this hash.
    DelegationCredential(String),
    /// Matches outputs carrying both credentials.
    AddressPair {
        payment: String,
        delegation: String,
    },
    /// Matches outputs carrying any asset under this policy.
    PolicyId(String),
    /// Matches outputs carrying this exact asset.
    AssetId {
        policy_id: String,
        asset_name: String,
    },
    /// Matches outputs produced by this transaction.
    TransactionId(String),
    /// Matches one specific output.
    OutputReference {
        transaction_id: String,
        output_index: u64,
    },
}

/// Error raised when parsing a pattern from its text form.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid pattern: {0}")]
pub struct InvalidPattern(pub String);

/// An output viewed through the eyes of the match predicate.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub address: &'a str,
    pub payment_credential: Option<&'a str>,
    pub delegation_credential: Option<&'a str>,
    pub value: &'a Value,
    pub transaction_id: &'a str,
    pub output_index: u64,
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_credential(s: &str) -> bool {
    s.len() == CREDENTIAL_HEX_LEN && is_hex(s)
}

fn is_policy_id(s: &str) -> bool {
    s.len() == POLICY_ID_HEX_LEN && is_hex(s)
}

fn is_transaction_id(s: &str) -> bool {
    s.len() == TRANSACTION_ID_HEX_LEN && is_hex(s)
}

fn is_asset_name(s: &str) -> bool {
    s.is_empty() || (s.len() <= ASSET_NAME_MAX_HEX_LEN && is_hex(s))
}

impl Pattern {
    /// Whether the candidate output is selected by this pattern.
    pub fn matches(&self, candidate: &Candidate<'_>) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::ExactAddress(address) => candidate.address == address,
            Pattern::PaymentCredential(payment) => {
                candidate.payment_credential == Some(payment.as_str())
            }
            Pattern::DelegationCredential(delegation) => {
                candidate.delegation_credential == Some(delegation.as_str())
            }
            Pattern::AddressPair {
                payment,
                delegation,
            } => {
                candidate.payment_credential == Some(payment.as_str())
                    && candidate.delegation_credential == Some(delegation.as_str())
            }
            Pattern::PolicyId(policy_id) => candidate.value.has_policy(policy_id),
            Pattern::AssetId {
                policy_id,
                asset_name,
            } => candidate.value.has_asset(policy_id, asset_name),
            Pattern::TransactionId(transaction_id) => {
                candidate.transaction_id == transaction_id
            }
            Pattern::OutputReference {
                transaction_id,
                output_index,
            } => {
                candidate.transaction_id == transaction_id
                    && candidate.output_index == *output_index
            }
        }
    }

    /// Whether every output matched by `other` is also matched by `self`.
    ///
    /// Address specializations are absorbed by credential specializations and
    /// assets by their policy; transactions absorb their output references.
    pub fn includes(&self, other: &Pattern) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Pattern::Any, _) => true,
            (Pattern::PaymentCredential(payment), Pattern::ExactAddress(address)) => {
                address::extract_credentials(address).payment.as_deref() == Some(payment.as_str())
            }
            (Pattern::DelegationCredential(delegation), Pattern::ExactAddress(address)) => {
                address::extract_credentials(address).delegation.as_deref()
                    == Some(delegation.as_str())
            }
            (
                Pattern::PaymentCredential(payment),
                Pattern::AddressPair { payment: other, .. },
            ) => payment == other,
            (
                Pattern::DelegationCredential(delegation),
                Pattern::AddressPair {
                    delegation: other, ..
                },
            ) => delegation == other,
            (
                Pattern::AddressPair {
                    payment,
                    delegation,
                },
                Pattern::ExactAddress(address),
            ) => {
                let creds = address::extract_credentials(address);
                creds.payment.as_deref() == Some(payment.as_str())
                    && creds.delegation.as_deref() == Some(delegation.as_str())
            }
            (Pattern::PolicyId(policy_id), Pattern::AssetId { policy_id: other, .. }) => {
                policy_id == other
            }
            (
                Pattern::TransactionId(transaction_id),
                Pattern::OutputReference {
                    transaction_id: other,
                    ..
                },
            ) => transaction_id == other,
            _ => false,
        }
    }

    /// Whether some output could be matched by both patterns.
    ///
    /// Conservative where it must be: one output carries exactly one payment
    /// credential and transaction id, so those constraints can conflict, but
    /// a single output may carry assets under many policies, so asset
    /// patterns never rule each other out.
    pub fn overlaps(&self, other: &Pattern) -> bool {
        let a = Constraints::of(self);
        let b = Constraints::of(other);
        a.compatible(&b)
    }
}

/// The per-output exclusive constraints a pattern imposes, used to decide
/// overlap by satisfiability.
#[derive(Debug, Default)]
struct Constraints<'a> {
    address: Option<&'a str>,
    payment: Option<String>,
    delegation: Option<String>,
    transaction_id: Option<&'a str>,
    output_index: Option<u64>,
}

impl<'a> Constraints<'a> {
    fn of(pattern: &'a Pattern) -> Self {
        let mut constraints = Constraints::default();
        match pattern {
            Pattern::Any | Pattern::PolicyId(_) | Pattern::AssetId { .. } => {}
            Pattern::ExactAddress(addr) => {
                let creds = address::extract_credentials(addr);
                constraints.address = Some(addr);
                constraints.payment = creds.payment;
                constraints.delegation = creds.delegation;
            }
            Pattern::PaymentCredential(payment) => {
                constraints.payment = Some(payment.clone());
            }
            Pattern::DelegationCredential(delegation) => {
                constraints.delegation = Some(delegation.clone());
            }
            Pattern::AddressPair {
                payment,
                delegation,
            } => {
                constraints.payment = Some(payment.clone());
                constraints.delegation = Some(delegation.clone());
            }
            Pattern::TransactionId(transaction_id) => {
                constraints.transaction_id = Some(transaction_id);
            }
            Pattern::OutputReference {
                transaction_id,
                output_index,
            } => {
                constraints.transaction_id = Some(transaction_id);
                constraints.output_index = Some(*output_index);
            }
        }
        constraints
    }

    fn compatible(&self, other: &Self) -> bool {
        fn agree<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        agree(&self.address, &other.address)
            && agree(&self.payment, &other.payment)
            && agree(&self.delegation, &other.delegation)
            && agree(&self.transaction_id, &other.transaction_id)
            && agree(&self.output_index, &other.output_index)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => write!(f, "*"),
            Pattern::ExactAddress(address) => write!(f, "{}", address),
            Pattern::PaymentCredential(payment) => write!(f, "{}/*", payment),
            Pattern::DelegationCredential(delegation) => write!(f, "*/{}", delegation),
            Pattern::AddressPair {
                payment,
                delegation,
            } => write!(f, "{}/{}", payment, delegation),
            Pattern::PolicyId(policy_id) => write!(f, "{}.*", policy_id),
            Pattern::AssetId {
                policy_id,
                asset_name,
            } => write!(f, "{}.{}", policy_id, asset_name),
            Pattern::TransactionId(transaction_id) => write!(f, "*@{}", transaction_id),
            Pattern::OutputReference {
                transaction_id,
                output_index,
            } => write!(f, "{}@{}", output_index, transaction_id),
        }
    }
}

impl FromStr for Pattern {
    type Err = InvalidPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" || s == "*/*" {
            return Ok(Pattern::Any);
        }
        if let Some((left, right)) = s.split_once('@') {
            if !is_transaction_id(right) {
                return Err(InvalidPattern(s.to_string()));
            }
            if left == "*" {
                return Ok(Pattern::TransactionId(right.to_lowercase()));
            }
            let output_index: u64 = left
                .parse()
                .map_err(|_| InvalidPattern(s.to_string()))?;
            return Ok(Pattern::OutputReference {
                transaction_id: right.to_lowercase(),
                output_index,
            });
        }
        if let Some((left, right)) = s.split_once('/') {
            return match (left, right) {
                ("*", delegation) if is_credential(delegation) => {
                    Ok(Pattern::DelegationCredential(delegation.to_lowercase()))
                }
                (payment, "*") if is_credential(payment) => {
                    Ok(Pattern::PaymentCredential(payment.to_lowercase()))
                }
                (payment, delegation) if is_credential(payment) && is_credential(delegation) => {
                    Ok(Pattern::AddressPair {
                        payment: payment.to_lowercase(),
                        delegation: delegation.to_lowercase(),
                    })
                }
                _ => Err(InvalidPattern(s.to_string())),
            };
        }
        if let Some((left, right)) = s.split_once('.') {
            if !is_policy_id(left) {
                return Err(InvalidPattern(s.to_string()));
            }
            if right == "*" {
                return Ok(Pattern::PolicyId(left.to_lowercase()));
            }
            if is_asset_name(right) {
                return Ok(Pattern::AssetId {
                    policy_id: left.to_lowercase(),
                    asset_name: right.to_lowercase(),
                });
            }
            return Err(InvalidPattern(s.to_string()));
        }
        if address::is_address(s) {
            return Ok(Pattern::ExactAddress(s.to_string()));
        }
        Err(InvalidPattern(s.to_string()))
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
