//! Pure input predicates and the parsers built on them.
//!
//! Nothing here is registered globally; each call site composes the checks it
//! needs. The `parse_*` functions turn a failed predicate into a
//! [Validation][crate::ErrorKind::Validation] error tagged with the caller's
//! method name.

use crate::{
    types::{Address, Balance, Hash, Signature, U256},
    Error, Result,
};

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn is_hex_of_len(s: &str, bytes: usize) -> bool {
    let s = strip_0x(s);
    s.len() == bytes * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn is_valid_address(s: &str) -> bool {
    is_hex_of_len(s, Address::LEN)
}

pub fn is_valid_hash(s: &str) -> bool {
    is_hex_of_len(s, Hash::LEN)
}

pub fn is_valid_signature(s: &str) -> bool {
    is_hex_of_len(s, Signature::LEN)
}

/// Non-negative integer that fits into 256 bits, either decimal or `0x` hex.
pub fn is_valid_amount(s: &str) -> bool {
    amount_from_str(s).is_some()
}

/// A party must be a real account, not the zero address.
pub fn is_valid_party(addr: &Address) -> bool {
    !addr.is_zero()
}

pub fn is_nonzero_balance(b: &Balance) -> bool {
    !b.is_zero()
}

/// Ledger channels are always between a user and someone else.
pub fn are_distinct_parties(a: &Address, b: &Address) -> bool {
    a != b
}

fn amount_from_str(s: &str) -> Option<U256> {
    if s.is_empty() {
        return None;
    }
    if let Some(hex) = s.strip_prefix("0x") {
        if hex.is_empty() || hex.len() > 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        U256::from_str_radix(hex, 16).ok()
    } else {
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        U256::from_dec_str(s).ok()
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(strip_0x(s), &mut out).ok()?;
    Some(out)
}

pub fn parse_address(s: &str, method: &'static str) -> Result<Address> {
    if !is_valid_address(s) {
        return Err(Error::validation(method, format!("malformed address: {:?}", s)));
    }
    decode_fixed(s)
        .map(Address)
        .ok_or_else(|| Error::validation(method, format!("malformed address: {:?}", s)))
}

pub fn parse_hash(s: &str, method: &'static str) -> Result<Hash> {
    if !is_valid_hash(s) {
        return Err(Error::validation(method, format!("malformed hash: {:?}", s)));
    }
    decode_fixed(s)
        .map(Hash)
        .ok_or_else(|| Error::validation(method, format!("malformed hash: {:?}", s)))
}

pub fn parse_signature(s: &str, method: &'static str) -> Result<Signature> {
    if !is_valid_signature(s) {
        return Err(Error::validation(method, format!("malformed signature: {:?}", s)));
    }
    decode_fixed(s)
        .map(Signature)
        .ok_or_else(|| Error::validation(method, format!("malformed signature: {:?}", s)))
}

pub fn parse_amount(s: &str, method: &'static str) -> Result<U256> {
    amount_from_str(s).ok_or_else(|| Error::validation(method, format!("malformed amount: {:?}", s)))
}
