use std::collections::{hash_map::Entry, HashMap};

use tracing::{debug, info, warn};

use super::{
    propose_thread_update, SignedThreadState, ThreadCloseOutcome, ThreadPayment, ThreadState,
    ThreadStatus,
};
use crate::{
    channel::{propose_channel_update, Adjustment, ChannelState, ChannelStatus},
    contract::Contract,
    error::ensure,
    hub::{CloseThreadRequest, Hub, HubResponse, JoinThreadRequest, OpenThreadRequest},
    merkle,
    types::{Address, Balance, Hash},
    validate, Client, Error, ErrorKind, Result,
};

impl<H: Hub, C: Contract> Client<H, C> {
    /// Opens a thread to `to`, bonding `deposit` from our ledger channel.
    /// The receiver still has to join it.
    pub async fn open_thread(&self, to: Address, deposit: Balance) -> Result<SignedThreadState> {
        const METHOD: &str = "open_thread";
        let me = self.address();

        ensure!(validate::is_valid_party(&to), Validation, METHOD, "receiver is the zero address");
        ensure!(validate::is_nonzero_balance(&deposit), Validation, METHOD, "thread deposit is zero");
        ensure!(
            validate::are_distinct_parties(&me, &to) && to != self.config.hub_address,
            ThreadOpen,
            METHOD,
            "cannot open a thread to {}",
            to
        );

        let mine = self.my_opened_channel(METHOD, ErrorKind::ThreadOpen).await?;
        match self.hub.channel_by_party(to).await? {
            Some(theirs) if theirs.status == ChannelStatus::Opened => {}
            _ => {
                return Err(Error::new(
                    ErrorKind::ThreadOpen,
                    METHOD,
                    format!("{} has no open channel", to),
                ))
            }
        }
        if let Some(existing) = self.hub.thread_by_parties(me, to).await? {
            ensure!(
                existing.status == ThreadStatus::Settled,
                ThreadOpen,
                METHOD,
                "thread {} from {} to {} is still {:?}",
                existing.thread_id(),
                me,
                to,
                existing.status
            );
        }

        let channel_id = mine.state.channel_id;
        let latest = self.hub.latest_channel_state(channel_id).await?.state;
        ensure!(
            latest.balance_a.covers(&deposit),
            ThreadOpen,
            METHOD,
            "balance {:?} does not cover the thread deposit {:?}",
            latest.balance_a,
            deposit
        );

        let initial = ThreadState::initial(self.random_id(), me, to, deposit);
        let mut initials = self.open_thread_set(METHOD, ErrorKind::ThreadOpen, &latest).await?;
        initials.push(initial);

        let mut next = latest.next_state_for(METHOD, ErrorKind::ThreadOpen)?;
        next.balance_a = latest.balance_a.checked_sub(&deposit).unwrap_or_default();
        next.open_thread_count = latest
            .open_thread_count
            .checked_add(1)
            .ok_or_else(|| Error::new(ErrorKind::ThreadOpen, METHOD, "thread count overflows"))?;
        next.thread_root_hash = merkle::thread_root(&initials)?;
        let next = propose_channel_update(Some(&latest), next, me, Adjustment::open_thread(deposit))?;

        let sig_a = self.sign_thread(&initial)?;
        let channel_sig = self.sign_channel(&next)?;
        let response = self
            .hub
            .open_thread(OpenThreadRequest {
                initial_state: initial,
                sig_a,
                channel_update: next,
                channel_sig,
            })
            .await?;
        self.expect_countersig(METHOD, ErrorKind::ThreadOpen, response, &next)?;

        info!(thread_id = %initial.channel_id, %to, nonce = next.nonce, "thread opened");
        Ok(SignedThreadState {
            state: initial,
            sig_a,
            sig_b: None,
        })
    }

    /// Joins a thread opened to us: countersigns its initial state and lets
    /// the hub bond the same amount in our ledger channel.
    pub async fn join_thread(&self, thread_id: Hash) -> Result<ChannelState> {
        const METHOD: &str = "join_thread";
        let me = self.address();

        let record = self.hub.thread_by_id(thread_id).await?;
        let initial = record.initial_state;
        ensure!(
            record.status == ThreadStatus::Opening,
            ThreadOpen,
            METHOD,
            "thread {} is {:?}, not opening",
            thread_id,
            record.status
        );
        ensure!(initial.party_b == me, ThreadOpen, METHOD, "thread {} is not for {}", thread_id, me);
        ensure!(
            initial.nonce == 0 && initial.balance_b.is_zero(),
            ThreadOpen,
            METHOD,
            "thread {} does not start at nonce 0 with nothing paid",
            thread_id
        );

        let mine = self.my_opened_channel(METHOD, ErrorKind::ThreadOpen).await?;
        let channel_id = mine.state.channel_id;
        ensure!(
            channel_id == record.channel_b,
            ThreadOpen,
            METHOD,
            "thread {} is bonded in {}, not in {}",
            thread_id,
            record.channel_b,
            channel_id
        );

        let signed = self.hub.thread_state_by_nonce(thread_id, 0).await?;
        ensure!(
            signed.state == initial && self.thread_signer(&initial, signed.sig_a)? == initial.party_a,
            ThreadOpen,
            METHOD,
            "initial state of thread {} is not signed by its sender",
            thread_id
        );

        let bond = initial
            .total()
            .ok_or_else(|| Error::new(ErrorKind::ThreadOpen, METHOD, "thread total overflows"))?;
        let latest = self.hub.latest_channel_state(channel_id).await?.state;
        ensure!(
            latest.balance_hub.covers(&bond),
            ThreadOpen,
            METHOD,
            "hub balance {:?} does not cover the bond {:?}",
            latest.balance_hub,
            bond
        );

        let mut initials = self.open_thread_set(METHOD, ErrorKind::ThreadOpen, &latest).await?;
        initials.push(initial);

        let mut next = latest.next_state_for(METHOD, ErrorKind::ThreadOpen)?;
        next.balance_hub = latest.balance_hub.checked_sub(&bond).unwrap_or_default();
        next.open_thread_count = latest
            .open_thread_count
            .checked_add(1)
            .ok_or_else(|| Error::new(ErrorKind::ThreadOpen, METHOD, "thread count overflows"))?;
        next.thread_root_hash = merkle::thread_root(&initials)?;
        let next = propose_channel_update(Some(&latest), next, me, Adjustment::open_thread(bond))?;

        let sig_b = self.sign_thread(&initial)?;
        let channel_sig = self.sign_channel(&next)?;
        let response = self
            .hub
            .join_thread(JoinThreadRequest {
                thread_id,
                sig_b,
                channel_update: next,
                channel_sig,
            })
            .await?;
        self.expect_countersig(METHOD, ErrorKind::ThreadOpen, response, &next)?;

        info!(%thread_id, nonce = next.nonce, "thread joined");
        Ok(next)
    }

    /// Pays through a thread by signing new absolute balances.
    pub async fn update_thread(
        &self,
        thread_id: Hash,
        balance_a: Balance,
        balance_b: Balance,
    ) -> Result<SignedThreadState> {
        let mut signed = self
            .update_threads(&[ThreadPayment {
                thread_id,
                balance_a,
                balance_b,
            }])
            .await?;
        signed
            .pop()
            .ok_or_else(|| Error::new(ErrorKind::ThreadUpdate, "update_thread", "no state was signed"))
    }

    /// Applies `payments` in order. All of them are validated before the
    /// first one is signed. Several payments to the same thread get
    /// consecutive nonces.
    pub async fn update_threads(&self, payments: &[ThreadPayment]) -> Result<Vec<SignedThreadState>> {
        const METHOD: &str = "update_threads";
        let me = self.address();

        // thread id -> (hub's latest state, last state of this batch, offset)
        let mut batch: HashMap<Hash, (ThreadState, ThreadState, u64)> = HashMap::new();
        let mut proposed = Vec::with_capacity(payments.len());
        for payment in payments {
            let entry = match batch.entry(payment.thread_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(slot) => {
                    let record = self.hub.thread_by_id(payment.thread_id).await?;
                    ensure!(
                        record.status == ThreadStatus::Opened,
                        ThreadUpdate,
                        METHOD,
                        "thread {} is {:?}, not opened",
                        payment.thread_id,
                        record.status
                    );
                    let latest = self.hub.latest_thread_state(payment.thread_id).await?.state;
                    slot.insert((latest, latest, 0))
                }
            };
            let (base, prev, offset) = entry;
            *offset += 1;
            let next = propose_thread_update(base, payment.balance_a, payment.balance_b, me, *offset)?;
            ensure!(
                next.balance_b.covers(&prev.balance_b),
                ThreadUpdate,
                METHOD,
                "payment {:?} to thread {} pays less than the one before it",
                payment.balance_b,
                payment.thread_id
            );
            *prev = next;
            proposed.push(next);
        }

        let mut signed = Vec::with_capacity(proposed.len());
        for state in proposed {
            let sig_a = self.sign_thread(&state)?;
            if let HubResponse::Rejected(reason) = self.hub.post_thread_update(state, sig_a).await? {
                return Err(Error::new(
                    ErrorKind::ThreadUpdate,
                    METHOD,
                    format!("hub rejected nonce {} of thread {}: {}", state.nonce, state.channel_id, reason),
                ));
            }
            debug!(thread_id = %state.channel_id, nonce = state.nonce, "thread updated");
            signed.push(SignedThreadState {
                state,
                sig_a,
                sig_b: None,
            });
        }
        Ok(signed)
    }

    /// Fast close of a thread from our side: its final balances go back
    /// into our ledger channel. If the hub refuses, the thread can only be
    /// settled on chain with [Client::dispute_channel].
    pub async fn close_thread(&self, thread_id: Hash) -> Result<ChannelState> {
        const METHOD: &str = "close_thread";
        let me = self.address();

        let record = self.hub.thread_by_id(thread_id).await?;
        let initial = record.initial_state;
        ensure!(
            matches!(record.status, ThreadStatus::Opened | ThreadStatus::Settling),
            ThreadClose,
            METHOD,
            "thread {} is {:?}",
            thread_id,
            record.status
        );
        ensure!(initial.is_party(&me), ThreadClose, METHOD, "{} is not a party of thread {}", me, thread_id);

        let last = self.hub.latest_thread_state(thread_id).await?;
        let fin = last.state;
        ensure!(
            self.thread_signer(&fin, last.sig_a)? == initial.party_a,
            ThreadClose,
            METHOD,
            "latest state of thread {} is not signed by its sender",
            thread_id
        );
        ensure!(
            fin.channel_id == thread_id
                && fin.party_a == initial.party_a
                && fin.party_b == initial.party_b
                && fin.total() == initial.total(),
            ThreadClose,
            METHOD,
            "latest state of thread {} does not belong to it",
            thread_id
        );
        let bond = initial
            .total()
            .ok_or_else(|| Error::new(ErrorKind::ThreadClose, METHOD, "thread total overflows"))?;

        let mine = self.my_channel(METHOD).await?;
        let channel_id = mine.state.channel_id;
        let latest = self.hub.latest_channel_state(channel_id).await?.state;

        let initials = self.open_thread_set(METHOD, ErrorKind::ThreadClose, &latest).await?;
        ensure!(
            initials.contains(&initial),
            ThreadClose,
            METHOD,
            "thread {} is not open in channel {}",
            thread_id,
            channel_id
        );
        let remaining: Vec<ThreadState> = initials.into_iter().filter(|t| *t != initial).collect();

        let (to_user, to_hub) = fin.split_for(&latest).ok_or_else(|| {
            Error::new(ErrorKind::ThreadClose, METHOD, format!("channel {} is not on thread {}", channel_id, thread_id))
        })?;
        let overflow = || Error::new(ErrorKind::ThreadClose, METHOD, "balance overflow");
        let mut next = latest.next_state_for(METHOD, ErrorKind::ThreadClose)?;
        next.balance_a = latest.balance_a.checked_add(&to_user).ok_or_else(overflow)?;
        next.balance_hub = latest.balance_hub.checked_add(&to_hub).ok_or_else(overflow)?;
        next.open_thread_count = latest.open_thread_count - 1;
        next.thread_root_hash = merkle::thread_root(&remaining)?;
        let next = propose_channel_update(Some(&latest), next, me, Adjustment::close_thread(bond))?;

        let channel_sig = self.sign_channel(&next)?;
        let response = self
            .hub
            .close_thread(CloseThreadRequest {
                thread_id,
                channel_update: next,
                channel_sig,
            })
            .await?;
        self.expect_countersig(METHOD, ErrorKind::ThreadClose, response, &next)
            .map_err(|mut e| {
                if e.kind == ErrorKind::ThreadClose {
                    e.message.push_str("; settle the thread on chain with dispute_channel");
                }
                e
            })?;

        info!(%thread_id, %channel_id, nonce = next.nonce, "thread closed");
        Ok(next)
    }

    /// Closes the threads one after the other. A failing thread does not
    /// stop the others.
    pub async fn close_threads(&self, thread_ids: &[Hash]) -> Vec<ThreadCloseOutcome> {
        let mut outcomes = Vec::with_capacity(thread_ids.len());
        for &thread_id in thread_ids {
            let result = self.close_thread(thread_id).await;
            if let Err(e) = &result {
                warn!(%thread_id, error = %e, "closing thread failed");
            }
            outcomes.push(ThreadCloseOutcome { thread_id, result });
        }
        outcomes
    }
}
