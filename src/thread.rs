//! Threads: unidirectional virtual channels between two users, bonded by the
//! hub inside both users' ledger channels.

mod lifecycle;
mod update;

use serde::{Deserialize, Serialize};

use crate::{
    channel::ChannelState,
    fingerprint,
    types::{Address, Balance, Hash, Signature},
    Result,
};

pub use update::propose_thread_update;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadState {
    /// Id of the thread itself, not of a ledger channel.
    pub channel_id: Hash,
    pub nonce: u64,
    /// Sender, the only party that signs updates.
    pub party_a: Address,
    /// Receiver.
    pub party_b: Address,
    pub balance_a: Balance,
    pub balance_b: Balance,
}

impl ThreadState {
    /// Nonce-0 state: the whole deposit belongs to the sender.
    pub fn initial(thread_id: Hash, party_a: Address, party_b: Address, deposit: Balance) -> Self {
        ThreadState {
            channel_id: thread_id,
            nonce: 0,
            party_a,
            party_b,
            balance_a: deposit,
            balance_b: Balance::ZERO,
        }
    }

    /// The bond: the value locked in the thread, fixed for its lifetime.
    pub fn total(&self) -> Option<Balance> {
        self.balance_a.checked_add(&self.balance_b)
    }

    pub fn fingerprint(&self) -> Result<Hash> {
        fingerprint::thread_fingerprint(self)
    }

    pub fn is_party(&self, addr: &Address) -> bool {
        self.party_a == *addr || self.party_b == *addr
    }

    /// Final balances as seen from the ledger channel `channel`: what goes
    /// back to its user and what goes back to the hub.
    ///
    /// In the sender's channel the hub receives what the receiver earned,
    /// in the receiver's channel the hub receives what the sender kept.
    pub(crate) fn split_for(&self, channel: &ChannelState) -> Option<(Balance, Balance)> {
        if channel.party_a == self.party_a {
            Some((self.balance_a, self.balance_b))
        } else if channel.party_a == self.party_b {
            Some((self.balance_b, self.balance_a))
        } else {
            None
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadStatus {
    /// Signed by the sender, not joined by the receiver yet.
    Opening,
    Opened,
    Settling,
    Settled,
}

/// A thread as the hub reports it.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecord {
    pub initial_state: ThreadState,
    pub status: ThreadStatus,
    /// Ledger channel of the sender.
    pub channel_a: Hash,
    /// Ledger channel of the receiver.
    pub channel_b: Hash,
}

impl ThreadRecord {
    pub fn thread_id(&self) -> Hash {
        self.initial_state.channel_id
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedThreadState {
    pub state: ThreadState,
    pub sig_a: Signature,
    /// Only the nonce-0 state is countersigned, by the receiver on join.
    pub sig_b: Option<Signature>,
}

/// One payment in a batch: the new absolute balances of a thread.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPayment {
    pub thread_id: Hash,
    pub balance_a: Balance,
    pub balance_b: Balance,
}

/// Outcome of closing one thread of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadCloseOutcome {
    pub thread_id: Hash,
    pub result: Result<ChannelState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Address = Address([0xaa; 20]);
    const B: Address = Address([0xcc; 20]);
    const HUB: Address = Address([0xbb; 20]);

    #[test]
    fn initial_state_pays_nothing_to_b() {
        let t = ThreadState::initial(Hash([1; 32]), A, B, Balance::new(100u64, 3u64));
        assert_eq!(t.nonce, 0);
        assert!(t.balance_b.is_zero());
        assert_eq!(t.total(), Some(Balance::new(100u64, 3u64)));
    }

    #[test]
    fn split_depends_on_the_channel_owner() {
        let mut t = ThreadState::initial(Hash([1; 32]), A, B, Balance::eth(100u64));
        t.balance_a = Balance::eth(70u64);
        t.balance_b = Balance::eth(30u64);

        let ch_a = ChannelState::genesis(Hash([2; 32]), A, HUB, Balance::ZERO);
        let ch_b = ChannelState::genesis(Hash([3; 32]), B, HUB, Balance::ZERO);
        let ch_x = ChannelState::genesis(Hash([4; 32]), Address([0xdd; 20]), HUB, Balance::ZERO);

        assert_eq!(t.split_for(&ch_a), Some((Balance::eth(70u64), Balance::eth(30u64))));
        assert_eq!(t.split_for(&ch_b), Some((Balance::eth(30u64), Balance::eth(70u64))));
        assert_eq!(t.split_for(&ch_x), None);
    }
}
