//! Interface to the hub. The transport (HTTP in practice) lives outside of
//! this crate; the client only needs these calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    channel::{ChannelRecord, ChannelState, DepositRecord, SignedChannelState},
    thread::{SignedThreadState, ThreadRecord, ThreadState},
    types::{Address, Hash, Signature},
    Result,
};

/// Answer of the hub to every mutating request. The hub never silently
/// ignores a request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum HubResponse {
    /// The hub signed the state it was sent.
    Countersigned(Signature),
    /// Stored, no signature of the hub is involved.
    Accepted,
    Rejected(String),
}

/// A ledger channel update signed by its user.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdateRequest {
    pub state: ChannelState,
    pub sig_a: Signature,
    /// Set when the update accounts for an on-chain deposit.
    pub deposit_tx: Option<Hash>,
}

/// Sent by the thread's sender. The hub countersigns `channel_update`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpenThreadRequest {
    pub initial_state: ThreadState,
    pub sig_a: Signature,
    pub channel_update: ChannelState,
    pub channel_sig: Signature,
}

/// Sent by the thread's receiver. The hub countersigns `channel_update`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinThreadRequest {
    pub thread_id: Hash,
    pub sig_b: Signature,
    pub channel_update: ChannelState,
    pub channel_sig: Signature,
}

/// Fast close of a thread from one side. The hub countersigns
/// `channel_update`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloseThreadRequest {
    pub thread_id: Hash,
    pub channel_update: ChannelState,
    pub channel_sig: Signature,
}

/// Lookups fail with a `NotFound` error when the object does not exist,
/// unless they return an `Option`.
#[async_trait]
pub trait Hub: Send + Sync {
    async fn channel_by_id(&self, channel_id: Hash) -> Result<ChannelRecord>;

    /// The channel of `party` that is not settled yet, if any.
    async fn channel_by_party(&self, party: Address) -> Result<Option<ChannelRecord>>;

    /// Latest state signed by both parties, or the on-chain nonce-0 state.
    async fn latest_channel_state(&self, channel_id: Hash) -> Result<SignedChannelState>;

    async fn channel_state_by_nonce(&self, channel_id: Hash, nonce: u64) -> Result<SignedChannelState>;

    async fn channel_deposits(&self, channel_id: Hash) -> Result<Vec<DepositRecord>>;

    async fn thread_by_id(&self, thread_id: Hash) -> Result<ThreadRecord>;

    /// The thread from `party_a` to `party_b` that is not settled yet, if any.
    async fn thread_by_parties(&self, party_a: Address, party_b: Address) -> Result<Option<ThreadRecord>>;

    /// Initial states of the threads open in a ledger channel.
    async fn thread_initial_states(&self, channel_id: Hash) -> Result<Vec<ThreadState>>;

    async fn latest_thread_state(&self, thread_id: Hash) -> Result<SignedThreadState>;

    async fn thread_state_by_nonce(&self, thread_id: Hash, nonce: u64) -> Result<SignedThreadState>;

    async fn request_join_channel(&self, channel_id: Hash) -> Result<HubResponse>;

    async fn post_channel_update(&self, update: ChannelUpdateRequest) -> Result<HubResponse>;

    async fn open_thread(&self, request: OpenThreadRequest) -> Result<HubResponse>;

    async fn join_thread(&self, request: JoinThreadRequest) -> Result<HubResponse>;

    async fn post_thread_update(&self, state: ThreadState, sig_a: Signature) -> Result<HubResponse>;

    async fn close_thread(&self, request: CloseThreadRequest) -> Result<HubResponse>;

    /// Asks the hub to countersign a closing state for a fast close.
    async fn request_channel_close(&self, state: ChannelState, sig_a: Signature) -> Result<HubResponse>;
}
