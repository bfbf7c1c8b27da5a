//! In-memory hub and contract for tests. The hub keeps every state it has
//! countersigned and checks nonces and signatures of what it is sent, but
//! trusts the balances.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    channel::{ChannelRecord, ChannelState, ChannelStatus, DepositRecord, SignedChannelState},
    config::{ClientConfig, PollPolicy},
    contract::{Contract, CreateChannel, TxReceipt},
    hub::{
        ChannelUpdateRequest, CloseThreadRequest, Hub, HubResponse, JoinThreadRequest,
        OpenThreadRequest,
    },
    packed,
    sig::{recover_signer, Signer, SigningConvention},
    thread::{SignedThreadState, ThreadRecord, ThreadState, ThreadStatus},
    types::{Address, Balance, Hash, Signature},
    Client, Error, Result,
};

pub type TestClient = Client<MemoryHub, MemoryContract>;

pub fn test_signer(seed: u64) -> Signer {
    Signer::new(&mut StdRng::seed_from_u64(seed))
}

/// A client with its own contract, talking to `hub`. Deposit polling gives
/// up after a few milliseconds.
pub fn client(hub: &MemoryHub, seed: u64) -> TestClient {
    let signer = test_signer(seed);
    let contract = MemoryContract::new(hub.clone(), signer.address());
    let mut config = ClientConfig::new(hub.address(), 3600);
    config.deposit_poll = PollPolicy::bounded(Duration::from_millis(1), 5);
    Client::new(hub.clone(), contract, signer, config)
}

/// Switches to make the hub misbehave.
#[derive(Debug, Default, Clone, Copy)]
pub struct Behaviour {
    pub refuse_join_channel: bool,
    pub refuse_channel_close: bool,
    pub refuse_thread_close: bool,
    pub ignore_deposits: bool,
}

struct ChannelEntry {
    status: ChannelStatus,
    states: Vec<SignedChannelState>,
    deposits: Vec<DepositRecord>,
    threads: Vec<ThreadState>,
}

impl ChannelEntry {
    fn latest(&self) -> &ChannelState {
        &self.states[self.states.len() - 1].state
    }
}

struct ThreadEntry {
    record: ThreadRecord,
    states: Vec<SignedThreadState>,
}

#[derive(Default)]
struct HubState {
    channels: HashMap<Hash, ChannelEntry>,
    threads: HashMap<Hash, ThreadEntry>,
    behaviour: Behaviour,
}

impl HubState {
    fn channel_of(&self, party: Address) -> Option<Hash> {
        self.channels
            .iter()
            .find(|(_, c)| c.latest().party_a == party && c.status != ChannelStatus::Settled)
            .map(|(id, _)| *id)
    }

    /// Reason to reject a user-signed update of a ledger channel, if any.
    fn check_update(&self, state: &ChannelState, sig_a: Signature) -> Option<String> {
        let entry = match self.channels.get(&state.channel_id) {
            Some(entry) => entry,
            None => return Some(format!("unknown channel {}", state.channel_id)),
        };
        let latest = entry.latest();
        if state.nonce != latest.nonce + 1 {
            return Some(format!("expected nonce {}, got {}", latest.nonce + 1, state.nonce));
        }
        let signer = state
            .fingerprint()
            .and_then(|fp| recover_signer(fp, sig_a, SigningConvention::Personal));
        match signer {
            Ok(signer) if signer == latest.party_a => None,
            _ => Some("bad signature".to_string()),
        }
    }
}

#[derive(Clone)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
    signer: Signer,
}

impl MemoryHub {
    pub fn new(seed: u64) -> Self {
        MemoryHub {
            state: Arc::new(Mutex::new(HubState::default())),
            signer: test_signer(seed),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn countersign(&self, state: &ChannelState) -> Signature {
        self.signer.sign_eth(state.fingerprint().unwrap()).unwrap()
    }

    pub fn behave(&self, f: impl FnOnce(&mut Behaviour)) {
        f(&mut self.state.lock().behaviour)
    }

    pub fn latest_state(&self, channel_id: Hash) -> ChannelState {
        *self.state.lock().channels[&channel_id].latest()
    }

    pub fn channel_status(&self, channel_id: Hash) -> ChannelStatus {
        self.state.lock().channels[&channel_id].status
    }

    pub fn thread_status(&self, thread_id: Hash) -> ThreadStatus {
        self.state.lock().threads[&thread_id].record.status
    }

    pub fn open_threads(&self, channel_id: Hash) -> Vec<ThreadState> {
        self.state.lock().channels[&channel_id].threads.clone()
    }

    pub fn set_channel_status(&self, channel_id: Hash, status: ChannelStatus) {
        if let Some(entry) = self.state.lock().channels.get_mut(&channel_id) {
            entry.status = status;
        }
    }

    /// Lists `initial` as open in the channel without any state committing
    /// to it.
    pub fn list_thread(&self, channel_id: Hash, initial: ThreadState) {
        if let Some(entry) = self.state.lock().channels.get_mut(&channel_id) {
            entry.threads.push(initial);
        }
    }

    /// Stores a channel the hub has not countersigned yet. Only meant for
    /// tests that need a state the hub would not accept.
    pub fn force_state(&self, state: SignedChannelState) {
        if let Some(entry) = self.state.lock().channels.get_mut(&state.state.channel_id) {
            entry.states.push(state);
        }
    }

    fn register_channel(&self, genesis: ChannelState) {
        self.state.lock().channels.insert(
            genesis.channel_id,
            ChannelEntry {
                status: ChannelStatus::Opening,
                states: vec![SignedChannelState {
                    state: genesis,
                    sig_a: None,
                    sig_hub: None,
                }],
                deposits: vec![],
                threads: vec![],
            },
        );
    }

    fn record_deposit(&self, channel_id: Hash, recipient: Address, amount: Balance, tx_hash: Hash) {
        let mut st = self.state.lock();
        if st.behaviour.ignore_deposits {
            return;
        }
        if let Some(entry) = st.channels.get_mut(&channel_id) {
            entry.deposits.push(DepositRecord {
                recipient,
                amount,
                tx_hash,
                applied_nonce: None,
            });
        }
    }

    /// Checks, countersigns and stores a user update.
    fn accept_update(&self, st: &mut HubState, state: ChannelState, sig_a: Signature) -> HubResponse {
        if let Some(reason) = st.check_update(&state, sig_a) {
            return HubResponse::Rejected(reason);
        }
        let sig_hub = self.countersign(&state);
        if let Some(entry) = st.channels.get_mut(&state.channel_id) {
            entry.states.push(SignedChannelState {
                state,
                sig_a: Some(sig_a),
                sig_hub: Some(sig_hub),
            });
        }
        HubResponse::Countersigned(sig_hub)
    }
}

fn not_found(method: &'static str, id: Hash) -> Error {
    Error::not_found(method, format!("{} does not exist", id))
}

#[async_trait]
impl Hub for MemoryHub {
    async fn channel_by_id(&self, channel_id: Hash) -> Result<ChannelRecord> {
        let st = self.state.lock();
        let entry = st
            .channels
            .get(&channel_id)
            .ok_or_else(|| not_found("channel_by_id", channel_id))?;
        Ok(ChannelRecord {
            state: *entry.latest(),
            status: entry.status,
        })
    }

    async fn channel_by_party(&self, party: Address) -> Result<Option<ChannelRecord>> {
        let st = self.state.lock();
        Ok(st.channel_of(party).map(|id| ChannelRecord {
            state: *st.channels[&id].latest(),
            status: st.channels[&id].status,
        }))
    }

    async fn latest_channel_state(&self, channel_id: Hash) -> Result<SignedChannelState> {
        let st = self.state.lock();
        st.channels
            .get(&channel_id)
            .and_then(|c| c.states.last().copied())
            .ok_or_else(|| not_found("latest_channel_state", channel_id))
    }

    async fn channel_state_by_nonce(&self, channel_id: Hash, nonce: u64) -> Result<SignedChannelState> {
        let st = self.state.lock();
        st.channels
            .get(&channel_id)
            .and_then(|c| c.states.iter().find(|s| s.state.nonce == nonce).copied())
            .ok_or_else(|| not_found("channel_state_by_nonce", channel_id))
    }

    async fn channel_deposits(&self, channel_id: Hash) -> Result<Vec<DepositRecord>> {
        let st = self.state.lock();
        st.channels
            .get(&channel_id)
            .map(|c| c.deposits.clone())
            .ok_or_else(|| not_found("channel_deposits", channel_id))
    }

    async fn thread_by_id(&self, thread_id: Hash) -> Result<ThreadRecord> {
        let st = self.state.lock();
        st.threads
            .get(&thread_id)
            .map(|t| t.record)
            .ok_or_else(|| not_found("thread_by_id", thread_id))
    }

    async fn thread_by_parties(&self, party_a: Address, party_b: Address) -> Result<Option<ThreadRecord>> {
        let st = self.state.lock();
        Ok(st
            .threads
            .values()
            .map(|t| t.record)
            .find(|r| {
                r.initial_state.party_a == party_a
                    && r.initial_state.party_b == party_b
                    && r.status != ThreadStatus::Settled
            }))
    }

    async fn thread_initial_states(&self, channel_id: Hash) -> Result<Vec<ThreadState>> {
        let st = self.state.lock();
        st.channels
            .get(&channel_id)
            .map(|c| c.threads.clone())
            .ok_or_else(|| not_found("thread_initial_states", channel_id))
    }

    async fn latest_thread_state(&self, thread_id: Hash) -> Result<SignedThreadState> {
        let st = self.state.lock();
        st.threads
            .get(&thread_id)
            .and_then(|t| t.states.last().copied())
            .ok_or_else(|| not_found("latest_thread_state", thread_id))
    }

    async fn thread_state_by_nonce(&self, thread_id: Hash, nonce: u64) -> Result<SignedThreadState> {
        let st = self.state.lock();
        st.threads
            .get(&thread_id)
            .and_then(|t| t.states.iter().find(|s| s.state.nonce == nonce).copied())
            .ok_or_else(|| not_found("thread_state_by_nonce", thread_id))
    }

    async fn request_join_channel(&self, channel_id: Hash) -> Result<HubResponse> {
        let mut st = self.state.lock();
        let refuse = st.behaviour.refuse_join_channel;
        let entry = st
            .channels
            .get_mut(&channel_id)
            .ok_or_else(|| not_found("request_join_channel", channel_id))?;
        if refuse || entry.status != ChannelStatus::Opening {
            return Ok(HubResponse::Rejected("will not join".into()));
        }
        entry.status = ChannelStatus::Opened;
        Ok(HubResponse::Accepted)
    }

    async fn post_channel_update(&self, update: ChannelUpdateRequest) -> Result<HubResponse> {
        let mut st = self.state.lock();
        let response = self.accept_update(&mut st, update.state, update.sig_a);
        if let (HubResponse::Countersigned(_), Some(tx)) = (&response, update.deposit_tx) {
            if let Some(entry) = st.channels.get_mut(&update.state.channel_id) {
                for d in entry.deposits.iter_mut().filter(|d| d.tx_hash == tx) {
                    d.applied_nonce = Some(update.state.nonce);
                }
            }
        }
        Ok(response)
    }

    async fn open_thread(&self, request: OpenThreadRequest) -> Result<HubResponse> {
        let mut st = self.state.lock();
        let initial = request.initial_state;
        match recover_signer(initial.fingerprint()?, request.sig_a, SigningConvention::Personal) {
            Ok(signer) if signer == initial.party_a => {}
            _ => return Ok(HubResponse::Rejected("bad thread signature".into())),
        }
        let (channel_a, channel_b) = match (st.channel_of(initial.party_a), st.channel_of(initial.party_b)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(HubResponse::Rejected("both parties need a channel".into())),
        };

        let response = self.accept_update(&mut st, request.channel_update, request.channel_sig);
        if let HubResponse::Countersigned(_) = response {
            st.threads.insert(
                initial.channel_id,
                ThreadEntry {
                    record: ThreadRecord {
                        initial_state: initial,
                        status: ThreadStatus::Opening,
                        channel_a,
                        channel_b,
                    },
                    states: vec![SignedThreadState {
                        state: initial,
                        sig_a: request.sig_a,
                        sig_b: None,
                    }],
                },
            );
            if let Some(entry) = st.channels.get_mut(&channel_a) {
                entry.threads.push(initial);
            }
        }
        Ok(response)
    }

    async fn join_thread(&self, request: JoinThreadRequest) -> Result<HubResponse> {
        let mut st = self.state.lock();
        let record = match st.threads.get(&request.thread_id) {
            Some(t) if t.record.status == ThreadStatus::Opening => t.record,
            _ => return Ok(HubResponse::Rejected("thread is not opening".into())),
        };

        let response = self.accept_update(&mut st, request.channel_update, request.channel_sig);
        if let HubResponse::Countersigned(_) = response {
            if let Some(t) = st.threads.get_mut(&request.thread_id) {
                t.record.status = ThreadStatus::Opened;
                t.states[0].sig_b = Some(request.sig_b);
            }
            if let Some(entry) = st.channels.get_mut(&record.channel_b) {
                entry.threads.push(record.initial_state);
            }
        }
        Ok(response)
    }

    async fn post_thread_update(&self, state: ThreadState, sig_a: Signature) -> Result<HubResponse> {
        let mut st = self.state.lock();
        let entry = match st.threads.get_mut(&state.channel_id) {
            Some(t) if t.record.status == ThreadStatus::Opened => t,
            _ => return Ok(HubResponse::Rejected("thread is not opened".into())),
        };
        let latest = entry.states[entry.states.len() - 1].state;
        if state.nonce <= latest.nonce {
            return Ok(HubResponse::Rejected(format!("stale nonce {}", state.nonce)));
        }
        match recover_signer(state.fingerprint()?, sig_a, SigningConvention::Personal) {
            Ok(signer) if signer == latest.party_a => {}
            _ => return Ok(HubResponse::Rejected("bad thread signature".into())),
        }
        entry.states.push(SignedThreadState {
            state,
            sig_a,
            sig_b: None,
        });
        Ok(HubResponse::Accepted)
    }

    async fn close_thread(&self, request: CloseThreadRequest) -> Result<HubResponse> {
        let mut st = self.state.lock();
        if st.behaviour.refuse_thread_close {
            return Ok(HubResponse::Rejected("thread close refused".into()));
        }
        let initial = match st.threads.get(&request.thread_id) {
            Some(t) => t.record.initial_state,
            None => return Ok(HubResponse::Rejected("unknown thread".into())),
        };

        let response = self.accept_update(&mut st, request.channel_update, request.channel_sig);
        if let HubResponse::Countersigned(_) = response {
            if let Some(entry) = st.channels.get_mut(&request.channel_update.channel_id) {
                entry.threads.retain(|t| *t != initial);
            }
            let still_open = st.channels.values().any(|c| c.threads.contains(&initial));
            if let Some(t) = st.threads.get_mut(&request.thread_id) {
                t.record.status = if still_open {
                    ThreadStatus::Settling
                } else {
                    ThreadStatus::Settled
                };
            }
        }
        Ok(response)
    }

    async fn request_channel_close(&self, state: ChannelState, sig_a: Signature) -> Result<HubResponse> {
        let mut st = self.state.lock();
        if st.behaviour.refuse_channel_close {
            return Ok(HubResponse::Rejected("channel close refused".into()));
        }
        let response = self.accept_update(&mut st, state, sig_a);
        if let HubResponse::Countersigned(_) = response {
            if let Some(entry) = st.channels.get_mut(&state.channel_id) {
                entry.status = ChannelStatus::Settling;
            }
        }
        Ok(response)
    }
}

struct ContractState {
    calls: Vec<&'static str>,
    next_block: u64,
    omit_block: bool,
}

/// Contract that mines every transaction immediately and tells the hub about
/// channel creations and deposits. It acts for a single sender.
#[derive(Clone)]
pub struct MemoryContract {
    hub: MemoryHub,
    sender: Address,
    state: Arc<Mutex<ContractState>>,
}

impl MemoryContract {
    pub fn new(hub: MemoryHub, sender: Address) -> Self {
        MemoryContract {
            hub,
            sender,
            state: Arc::new(Mutex::new(ContractState {
                calls: vec![],
                next_block: 1,
                omit_block: false,
            })),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// Transactions are sent but never mined.
    pub fn omit_block(&self, omit: bool) {
        self.state.lock().omit_block = omit;
    }

    fn receipt(&self, call: &'static str) -> TxReceipt {
        let mut st = self.state.lock();
        st.calls.push(call);
        let tx_hash = packed::keccak(&[self.sender.as_bytes(), &st.calls.len().to_be_bytes()]);
        if st.omit_block {
            return TxReceipt {
                tx_hash: Some(tx_hash),
                block: None,
            };
        }
        st.next_block += 1;
        TxReceipt::mined(tx_hash, st.next_block)
    }
}

#[async_trait]
impl Contract for MemoryContract {
    async fn create_channel(&self, args: CreateChannel) -> Result<TxReceipt> {
        let receipt = self.receipt("createChannel");
        if receipt.block.is_some() {
            self.hub.register_channel(ChannelState::genesis(
                args.channel_id,
                self.sender,
                args.hub,
                args.deposit,
            ));
        }
        Ok(receipt)
    }

    async fn deposit(&self, channel_id: Hash, recipient: Address, amount: Balance) -> Result<TxReceipt> {
        let receipt = self.receipt("deposit");
        if let (Some(tx), Some(_)) = (receipt.tx_hash, receipt.block) {
            self.hub.record_deposit(channel_id, recipient, amount, tx);
        }
        Ok(receipt)
    }

    async fn consensus_close_channel(&self, state: ChannelState, _: Signature, _: Signature) -> Result<TxReceipt> {
        self.hub.set_channel_status(state.channel_id, ChannelStatus::Settled);
        Ok(self.receipt("consensusCloseChannel"))
    }

    async fn update_channel_state(&self, state: ChannelState, _: Signature, _: Signature) -> Result<TxReceipt> {
        self.hub.set_channel_status(state.channel_id, ChannelStatus::Settling);
        Ok(self.receipt("updateChannelState"))
    }

    async fn init_thread_state(&self, _: Hash, _: ThreadState, _: Signature, _: Vec<Hash>) -> Result<TxReceipt> {
        Ok(self.receipt("initThreadState"))
    }

    async fn settle_thread(&self, _: Hash, _: ThreadState, _: Signature) -> Result<TxReceipt> {
        Ok(self.receipt("settleThread"))
    }

    async fn byzantine_close_channel(&self, channel_id: Hash) -> Result<TxReceipt> {
        self.hub.set_channel_status(channel_id, ChannelStatus::Settled);
        Ok(self.receipt("byzantineCloseChannel"))
    }

    async fn channel_open_timeout(&self, channel_id: Hash) -> Result<TxReceipt> {
        self.hub.set_channel_status(channel_id, ChannelStatus::Settled);
        Ok(self.receipt("channelOpenTimeout"))
    }
}
