//! Address and amount encoding helpers shared by the scanner and reconciler.

use crate::events::Approval;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, U256, hex};
use std::str::FromStr;
use thiserror::Error;

/// topic0 of `Approval(address,address,uint256)`.
pub const APPROVAL_EVENT_SIGNATURE: B256 = Approval::SIGNATURE_HASH;

/// Sentinel returned by metadata lookups that could not resolve a value.
pub const UNKNOWN_TOKEN: &str = "UnknownERC20";

/// Rendered amount for approvals at or above [`UNLIMITED_THRESHOLD`].
pub const INFINITY: &str = "INFINITY";

/// 2^255. Any approval with the top bit set is reported as unlimited.
pub const UNLIMITED_THRESHOLD: U256 = U256::from_limbs([0, 0, 0, 1 << 63]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid Ethereum address: {0}")]
pub struct InvalidAddress(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount word is {0} bytes, expected at most 32")]
    TooLong(usize),
    #[error("amount word is not valid hex: {0}")]
    InvalidHex(String),
}

/// Accepts `0x` followed by exactly 40 hex digits in any letter case.
pub fn validate_address(s: &str) -> Result<Address, InvalidAddress> {
    let invalid = || InvalidAddress(s.to_string());

    let body = s.strip_prefix("0x").ok_or_else(invalid)?;
    if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    Address::from_str(s).map_err(|_| invalid())
}

/// Lowercase `0x`-prefixed form used for every stored address.
pub fn canonical(address: &Address) -> String {
    hex::encode_prefixed(address)
}

/// Left-pads an address into the 32-byte word used for indexed topic filters.
pub fn pad_topic(address: &Address) -> B256 {
    address.into_word()
}

pub fn pad_topic_hex(address: &Address) -> String {
    hex::encode_prefixed(pad_topic(address))
}

/// Interprets up to 32 big-endian bytes as an unsigned integer.
pub fn decode_amount(word: &[u8]) -> Result<U256, AmountError> {
    if word.len() > 32 {
        return Err(AmountError::TooLong(word.len()));
    }
    Ok(U256::from_be_slice(word))
}

/// Same as [`decode_amount`] for a hex string, with or without `0x`.
pub fn decode_amount_hex(word: &str) -> Result<U256, AmountError> {
    let body = word.strip_prefix("0x").unwrap_or(word);
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AmountError::InvalidHex(word.to_string()));
    }
    if body.len() > 64 {
        return Err(AmountError::TooLong(body.len().div_ceil(2)));
    }
    U256::from_str_radix(body, 16).map_err(|_| AmountError::InvalidHex(word.to_string()))
}

pub fn normalize_amount(value: U256) -> String {
    if value >= UNLIMITED_THRESHOLD {
        INFINITY.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    #[test]
    fn approval_signature_is_erc20_topic() {
        assert_eq!(
            APPROVAL_EVENT_SIGNATURE,
            b256!("8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925")
        );
    }

    #[test]
    fn validate_address_canonicalizes_case() {
        let mixed = validate_address("0xdAC17F958D2ee523a2206206994597C13D831ec7").unwrap();
        let lower = validate_address("0xdac17f958d2ee523a2206206994597c13d831ec7").unwrap();
        let upper = validate_address("0xDAC17F958D2EE523A2206206994597C13D831EC7").unwrap();

        assert_eq!(mixed, lower);
        assert_eq!(lower, upper);
        assert_eq!(
            canonical(&mixed),
            "0xdac17f958d2ee523a2206206994597c13d831ec7"
        );
    }

    #[test]
    fn validate_address_rejects_malformed_input() {
        for bad in [
            "not-an-address",
            "dac17f958d2ee523a2206206994597c13d831ec7",
            "0xdac17f958d2ee523a2206206994597c13d831ec",
            "0xdac17f958d2ee523a2206206994597c13d831ec7a",
            "0xgac17f958d2ee523a2206206994597c13d831ec7",
            "",
        ] {
            assert_eq!(validate_address(bad), Err(InvalidAddress(bad.to_string())));
        }
    }

    #[test]
    fn pad_topic_left_pads_with_zeros() {
        let input = format!("0x{}", "a".repeat(40));
        let address = validate_address(&input).unwrap();
        let padded = pad_topic_hex(&address);

        assert_eq!(padded.len(), 66);
        assert!(padded.starts_with("0x"));
        assert_eq!(&padded[26..], "a".repeat(40));
        assert!(padded[2..26].chars().all(|c| c == '0'));
    }

    #[test]
    fn normalize_amount_flags_top_bit() {
        assert_eq!(normalize_amount(U256::MAX), INFINITY);
        assert_eq!(normalize_amount(UNLIMITED_THRESHOLD), INFINITY);
        assert_eq!(
            normalize_amount(UNLIMITED_THRESHOLD - U256::from(1)),
            "57896044618658097711785492504343953926634992332820282019728792003956564819967"
        );
        assert_eq!(normalize_amount(U256::ZERO), "0");
        assert_eq!(normalize_amount(U256::from(1000)), "1000");
    }

    #[test]
    fn decode_amount_reads_big_endian_words() {
        let word = U256::from(123_456_789u64).to_be_bytes::<32>();
        assert_eq!(decode_amount(&word).unwrap(), U256::from(123_456_789u64));
        assert_eq!(decode_amount(&[0xff; 32]).unwrap(), U256::MAX);
        assert_eq!(decode_amount(&[0u8; 33]), Err(AmountError::TooLong(33)));

        let below_threshold = UNLIMITED_THRESHOLD - U256::from(7);
        let hex_word = hex::encode_prefixed(below_threshold.to_be_bytes::<32>());
        assert_eq!(decode_amount_hex(&hex_word).unwrap(), below_threshold);
    }

    #[test]
    fn decode_amount_hex_accepts_short_words() {
        assert_eq!(decode_amount_hex("0x3e8").unwrap(), U256::from(1000));
        assert_eq!(decode_amount_hex("ff").unwrap(), U256::from(255));
        assert!(decode_amount_hex("0x").is_err());
        assert!(decode_amount_hex("0xzz").is_err());
        assert!(decode_amount_hex(&format!("0x{}", "f".repeat(65))).is_err());
    }
}
