//! Interface to the on-chain channel manager contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    channel::ChannelState,
    thread::ThreadState,
    types::{Address, Balance, Hash, Signature},
    Error, Result,
};

/// What a contract call returned. A transaction is only confirmed once it
/// has both a hash and a block.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: Option<Hash>,
    pub block: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MinedTx {
    pub tx_hash: Hash,
    pub block: u64,
}

impl TxReceipt {
    pub fn mined(tx_hash: Hash, block: u64) -> Self {
        TxReceipt {
            tx_hash: Some(tx_hash),
            block: Some(block),
        }
    }

    pub fn confirm(self, method: &'static str) -> Result<MinedTx> {
        match (self.tx_hash, self.block) {
            (Some(tx_hash), Some(block)) => Ok(MinedTx { tx_hash, block }),
            (Some(tx_hash), None) => Err(Error::contract(
                method,
                "transaction was not mined",
                Some(tx_hash),
            )),
            (None, _) => Err(Error::contract(method, "transaction was not sent", None)),
        }
    }
}

/// Arguments of `createChannel`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannel {
    pub channel_id: Hash,
    pub hub: Address,
    /// Seconds.
    pub challenge_period: u64,
    pub token: Option<Address>,
    pub deposit: Balance,
}

#[async_trait]
pub trait Contract: Send + Sync {
    async fn create_channel(&self, args: CreateChannel) -> Result<TxReceipt>;

    async fn deposit(&self, channel_id: Hash, recipient: Address, amount: Balance) -> Result<TxReceipt>;

    async fn consensus_close_channel(
        &self,
        state: ChannelState,
        sig_a: Signature,
        sig_hub: Signature,
    ) -> Result<TxReceipt>;

    /// Starts the dispute with a double-signed state.
    async fn update_channel_state(
        &self,
        state: ChannelState,
        sig_a: Signature,
        sig_hub: Signature,
    ) -> Result<TxReceipt>;

    /// Proves that `initial` is part of the disputed channel's thread root.
    async fn init_thread_state(
        &self,
        channel_id: Hash,
        initial: ThreadState,
        sig_a: Signature,
        proof: Vec<Hash>,
    ) -> Result<TxReceipt>;

    async fn settle_thread(&self, channel_id: Hash, state: ThreadState, sig_a: Signature) -> Result<TxReceipt>;

    async fn byzantine_close_channel(&self, channel_id: Hash) -> Result<TxReceipt>;

    /// Reclaims the deposit of a channel the hub never joined.
    async fn channel_open_timeout(&self, channel_id: Hash) -> Result<TxReceipt>;
}
