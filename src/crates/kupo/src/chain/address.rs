//! Address decoding and credential extraction
//!
//! Addresses arrive as text, either bech32 (Shelley and stake addresses) or
//! hex. Pattern matching and the credential index columns both need the
//! payment and delegation credentials embedded in the raw address bytes, so
//! decoding lives here in one place.
//!
//! The Shelley layout puts an address type in the high nibble of the first
//! byte. Types 0-3 are base addresses (payment then delegation credential),
//! 4-5 pointer addresses, 6-7 enterprise addresses (payment only), 14-15
//! reward accounts (delegation only). Type 8 is a Byron bootstrap address
//! and carries no extractable credential.

use bech32::FromBase32;

/// Length of a credential hash, in bytes.
pub const CREDENTIAL_LEN: usize = 28;

/// Length of a credential hash, in hex digits.
pub const CREDENTIAL_HEX_LEN: usize = 2 * CREDENTIAL_LEN;

/// Payment and delegation credentials extracted from an address, hex-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub payment: Option<String>,
    pub delegation: Option<String>,
}

/// Decode an address text (bech32 or hex) into raw bytes.
pub fn address_bytes(text: &str) -> Option<Vec<u8>> {
    if let Ok((_hrp, data, _variant)) = bech32::decode(text) {
        return Vec::<u8>::from_base32(&data).ok();
    }
    hex::decode(text).ok()
}

/// Whether the text is a decodable address.
pub fn is_address(text: &str) -> bool {
    address_bytes(text).map_or(false, |bytes| !bytes.is_empty())
}

/// Extract credentials from an address text.
///
/// Returns empty credentials for Byron addresses and undecodable input; the
/// caller treats those as unmatchable by credential patterns.
pub fn extract_credentials(text: &str) -> Credentials {
    let bytes = match address_bytes(text) {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Credentials::default(),
    };

    let address_type = bytes[0] >> 4;
    let credential_at = |offset: usize| -> Option<String> {
        bytes
            .get(offset..offset + CREDENTIAL_LEN)
            .map(hex::encode)
    };

    match address_type {
        // Base addresses: payment + delegation.
        0..=3 => Credentials {
            payment: credential_at(1),
            delegation: credential_at(1 + CREDENTIAL_LEN),
        },
        // Pointer and enterprise addresses: payment only.
        4..=7 => Credentials {
            payment: credential_at(1),
            delegation: None,
        },
        // Reward accounts: delegation only.
        14 | 15 => Credentials {
            payment: None,
            delegation: credential_at(1),
        },
        _ => Credentials::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bech32::{ToBase32, Variant};

    fn base_address_bytes() -> Vec<u8> {
        let mut bytes = vec![0x00];
        bytes.extend(std::iter::repeat(0x11).take(CREDENTIAL_LEN));
        bytes.extend(std::iter::repeat(0x22).take(CREDENTIAL_LEN));
        bytes
    }

    #[test]
    fn test_base_address_from_hex() {
        let creds = extract_credentials(&hex::encode(base_address_bytes()));
        assert_eq!(creds.payment, Some("11".repeat(CREDENTIAL_LEN)));
        assert_eq!(creds.delegation, Some("22".repeat(CREDENTIAL_LEN)));
    }

    #[test]
    fn test_base_address_from_bech32() {
        let encoded = bech32::encode(
            "addr_test",
            base_address_bytes().to_base32(),
            Variant::Bech32,
        )
        .unwrap();
        let creds = extract_credentials(&encoded);
        assert_eq!(creds.payment, Some("11".repeat(CREDENTIAL_LEN)));
        assert_eq!(creds.delegation, Some("22".repeat(CREDENTIAL_LEN)));
    }

    #[test]
    fn test_enterprise_address_has_no_delegation() {
        let mut bytes = vec![0x60];
        bytes.extend(std::iter::repeat(0x33).take(CREDENTIAL_LEN));
        let creds = extract_credentials(&hex::encode(bytes));
        assert_eq!(creds.payment, Some("33".repeat(CREDENTIAL_LEN)));
        assert_eq!(creds.delegation, None);
    }

    #[test]
    fn test_reward_account_has_only_delegation() {
        let mut bytes = vec![0xe1];
        bytes.extend(std::iter::repeat(0x44).take(CREDENTIAL_LEN));
        let creds = extract_credentials(&hex::encode(bytes));
        assert_eq!(creds.payment, None);
        assert_eq!(creds.delegation, Some("44".repeat(CREDENTIAL_LEN)));
    }

    #[test]
    fn test_byron_address_yields_nothing() {
        let bytes = vec![0x82, 0x01, 0x02, 0x03];
        assert_eq!(extract_credentials(&hex::encode(bytes)), Credentials::default());
    }

    #[test]
    fn test_undecodable_text_yields_nothing() {
        assert_eq!(extract_credentials("not-an-address"), Credentials::default());
        assert!(!is_address("not-an-address"));
    }
}
