//! Client side of a hub based payment channel network.
//!
//! Every user has a *ledger channel* with the hub, anchored on chain. Two
//! users pay each other through a *thread*, a virtual channel bonded by the
//! hub in both of their ledger channels. Each ledger channel state commits to
//! the threads open in it with the root of a Merkle tree over their initial
//! states. States are signed over their [fingerprint], the Keccak-256 hash of
//! their tightly packed encoding, exactly as the contract recomputes it.
//!
//! The hub and the contract are reached through the [Hub] and [Contract]
//! traits. [Client] drives the channel and thread lifecycles on top of them.

mod packed {
    mod error;
    mod hashing;
    mod ser;

    pub use error::Error;
    pub use hashing::{keccak, to_bytes, to_hash};
    pub use ser::{to_writer, Writer};
}

mod client;
mod error;
pub mod fingerprint;
pub mod merkle;
pub mod sig;
pub mod types;
pub mod validate;

pub mod channel;
pub mod config;
pub mod contract;
pub mod hub;
pub mod thread;

#[cfg(test)]
pub(crate) mod testing;

pub use client::Client;
pub use config::{ClientConfig, PollPolicy};
pub use contract::Contract;
pub use error::{Error, ErrorKind, Result};
pub use hub::Hub;
pub use types::{Address, Balance, Hash, Signature, EMPTY_ROOT, U256};
