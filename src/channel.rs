//! Ledger channels: the on-chain anchored channel between a user and the hub.

mod lifecycle;
mod update;

use serde::{Deserialize, Serialize};

use crate::{
    fingerprint,
    types::{Address, Balance, Hash, Signature, U256, EMPTY_ROOT},
    Error, ErrorKind, Result,
};

pub use lifecycle::{CloseOutcome, InitialDeposit};
pub use update::{propose_channel_update, Adjustment, Bond};

/// Stores the complete state of a ledger channel, as both parties sign it.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    pub channel_id: Hash,
    pub nonce: u64,
    pub open_thread_count: u64,
    pub thread_root_hash: Hash,
    pub party_a: Address,
    pub party_hub: Address,
    pub balance_a: Balance,
    pub balance_hub: Balance,
    pub is_closing: bool,
}

impl ChannelState {
    /// State at nonce 0, as created on chain: no threads, everything
    /// deposited by party A.
    pub fn genesis(channel_id: Hash, party_a: Address, party_hub: Address, deposit: Balance) -> Self {
        ChannelState {
            channel_id,
            nonce: 0,
            open_thread_count: 0,
            thread_root_hash: EMPTY_ROOT,
            party_a,
            party_hub,
            balance_a: deposit,
            balance_hub: Balance::ZERO,
            is_closing: false,
        }
    }

    /// Create a new state that will replace this state: same content, next
    /// nonce. Callers change the fields the update is about. `None` once the
    /// nonce is exhausted.
    pub fn make_next_state(&self) -> Option<Self> {
        Some(ChannelState {
            nonce: self.nonce.checked_add(1)?,
            ..*self
        })
    }

    pub(crate) fn next_state_for(&self, method: &'static str, kind: ErrorKind) -> Result<Self> {
        self.make_next_state()
            .ok_or_else(|| Error::new(kind, method, format!("nonce of {} is exhausted", self.channel_id)))
    }

    pub fn total(&self) -> Option<Balance> {
        self.balance_a.checked_add(&self.balance_hub)
    }

    pub fn fingerprint(&self) -> Result<Hash> {
        fingerprint::channel_fingerprint(self)
    }

    pub fn is_party(&self, addr: &Address) -> bool {
        self.party_a == *addr || self.party_hub == *addr
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    /// Created on chain, the hub has not joined yet.
    Opening,
    Opened,
    /// A close or dispute is in progress on chain.
    Settling,
    Settled,
}

/// Which assets a channel holds, derived from the initial deposit.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    Eth,
    Token,
    EthAndToken,
}

impl ChannelType {
    pub fn from_deposits(eth: Option<U256>, token: Option<U256>) -> Option<Self> {
        match (eth, token) {
            (Some(_), Some(_)) => Some(ChannelType::EthAndToken),
            (Some(_), None) => Some(ChannelType::Eth),
            (None, Some(_)) => Some(ChannelType::Token),
            (None, None) => None,
        }
    }

    pub fn has_token(self) -> bool {
        matches!(self, ChannelType::Token | ChannelType::EthAndToken)
    }
}

/// A ledger channel as the hub reports it.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub state: ChannelState,
    pub status: ChannelStatus,
}

/// A channel state together with the signatures collected for it so far.
///
/// The nonce-0 state is established on chain and carries no signatures.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedChannelState {
    pub state: ChannelState,
    pub sig_a: Option<Signature>,
    pub sig_hub: Option<Signature>,
}

impl SignedChannelState {
    pub fn is_double_signed(&self) -> bool {
        self.sig_a.is_some() && self.sig_hub.is_some()
    }
}

/// A deposit seen on chain. It is *untracked* until a signed state
/// accounting for it exists.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub recipient: Address,
    pub amount: Balance,
    pub tx_hash: Hash,
    pub applied_nonce: Option<u64>,
}

impl DepositRecord {
    pub fn is_untracked(&self) -> bool {
        self.applied_nonce.is_none()
    }
}
