//! Canonical fingerprints of channel and thread states.
//!
//! A fingerprint is the Keccak-256 hash of the tightly packed encoding of a
//! state, in the exact field order the on-chain verifier rebuilds it. Each
//! field is encoded according to its Solidity type (`bytes32`, `bool`,
//! `uint256`, `address`). The two layouts differ in shape and length (297
//! vs. 296 bytes), so a channel preimage can never be a thread preimage.

use serde::Serialize;

use crate::{
    channel::ChannelState,
    error::ensure,
    packed,
    thread::ThreadState,
    types::{Address, Hash, U256},
    Error, Result,
};

#[derive(Serialize)]
struct ChannelFingerprint {
    channel_id: Hash,
    is_close: bool,
    nonce: u64,
    open_thread_count: u64,
    thread_root_hash: Hash,
    party_a: Address,
    party_hub: Address,
    eth_balance_a: U256,
    eth_balance_hub: U256,
    token_balance_a: U256,
    token_balance_hub: U256,
}

#[derive(Serialize)]
struct ThreadFingerprint {
    channel_id: Hash,
    nonce: u64,
    party_a: Address,
    party_b: Address,
    // The bond goes first so the contract can read the locked total without
    // adding the balances itself.
    eth_bond: U256,
    token_bond: U256,
    eth_balance_a: U256,
    eth_balance_b: U256,
    token_balance_a: U256,
    token_balance_b: U256,
}

impl From<packed::Error> for Error {
    fn from(e: packed::Error) -> Self {
        Error::validation("packed_encode", e.to_string())
    }
}

pub fn channel_fingerprint(state: &ChannelState) -> Result<Hash> {
    const METHOD: &str = "channel_fingerprint";
    ensure!(!state.party_a.is_zero(), Validation, METHOD, "party A is the zero address");
    ensure!(!state.party_hub.is_zero(), Validation, METHOD, "hub is the zero address");

    Ok(packed::to_hash(&ChannelFingerprint {
        channel_id: state.channel_id,
        is_close: state.is_closing,
        nonce: state.nonce,
        open_thread_count: state.open_thread_count,
        thread_root_hash: state.thread_root_hash,
        party_a: state.party_a,
        party_hub: state.party_hub,
        eth_balance_a: state.balance_a.eth,
        eth_balance_hub: state.balance_hub.eth,
        token_balance_a: state.balance_a.token,
        token_balance_hub: state.balance_hub.token,
    })?)
}

pub fn thread_fingerprint(state: &ThreadState) -> Result<Hash> {
    const METHOD: &str = "thread_fingerprint";
    ensure!(!state.party_a.is_zero(), Validation, METHOD, "party A is the zero address");
    ensure!(!state.party_b.is_zero(), Validation, METHOD, "party B is the zero address");

    let bond = state
        .total()
        .ok_or_else(|| Error::validation(METHOD, "thread balances overflow"))?;

    Ok(packed::to_hash(&ThreadFingerprint {
        channel_id: state.channel_id,
        nonce: state.nonce,
        party_a: state.party_a,
        party_b: state.party_b,
        eth_bond: bond.eth,
        token_bond: bond.token,
        eth_balance_a: state.balance_a.eth,
        eth_balance_b: state.balance_b.eth,
        token_balance_a: state.balance_a.token,
        token_balance_b: state.balance_b.token,
    })?)
}
