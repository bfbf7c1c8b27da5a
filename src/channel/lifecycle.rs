use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    propose_channel_update, Adjustment, ChannelState, ChannelStatus, ChannelType,
    SignedChannelState,
};
use crate::{
    contract::{Contract, CreateChannel, MinedTx},
    error::ensure,
    hub::{ChannelUpdateRequest, Hub, HubResponse},
    merkle,
    types::{Address, Balance, Hash, Signature, U256},
    Client, Error, ErrorKind, Result,
};

/// Deposit of a new channel. Which fields are present decides the channel
/// type, a present zero still makes the channel hold that asset.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InitialDeposit {
    pub eth: Option<U256>,
    pub token: Option<U256>,
}

impl InitialDeposit {
    pub fn balance(&self) -> Balance {
        Balance {
            eth: self.eth.unwrap_or_default(),
            token: self.token.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Closed on chain with the double-signed closing state.
    Closed { state: ChannelState, tx: MinedTx },
    /// The hub did not countersign. The closing state is signed by us only,
    /// the funds have to be recovered with a dispute.
    DisputeRequired {
        state: ChannelState,
        sig_a: Signature,
        reason: String,
    },
}

impl<H: Hub, C: Contract> Client<H, C> {
    /// Creates a ledger channel with the hub on chain and asks the hub to
    /// join it. Returns the channel id.
    pub async fn open_channel(&self, deposit: InitialDeposit) -> Result<Hash> {
        const METHOD: &str = "open_channel";
        let me = self.address();
        let hub = self.config.hub_address;

        let channel_type = ChannelType::from_deposits(deposit.eth, deposit.token)
            .ok_or_else(|| Error::validation(METHOD, "deposit needs an eth or a token amount"))?;
        let token = if channel_type.has_token() {
            Some(self.config.token_address.ok_or_else(|| {
                Error::validation(METHOD, "token deposit without a configured token address")
            })?)
        } else {
            None
        };
        ensure!(me != hub, ChannelOpen, METHOD, "cannot open a channel with yourself");

        if let Some(existing) = self.hub.channel_by_party(me).await? {
            ensure!(
                existing.status != ChannelStatus::Opened,
                ChannelOpen,
                METHOD,
                "{} already has the open channel {}",
                me,
                existing.state.channel_id
            );
        }

        let genesis = propose_channel_update(
            None,
            ChannelState::genesis(self.random_id(), me, hub, deposit.balance()),
            me,
            Adjustment::default(),
        )?;
        let channel_id = genesis.channel_id;
        debug!(%channel_id, ?channel_type, "creating channel");

        let tx = self
            .contract
            .create_channel(CreateChannel {
                channel_id,
                hub,
                challenge_period: self.config.challenge_period,
                token,
                deposit: genesis.balance_a,
            })
            .await?
            .confirm(METHOD)?;

        match self.hub.request_join_channel(channel_id).await? {
            HubResponse::Rejected(reason) => {
                warn!(%channel_id, %reason, "hub refused to join");
                Err(Error::new(
                    ErrorKind::ChannelOpen,
                    METHOD,
                    format!("hub refused to join {}: {}", channel_id, reason),
                )
                .with_tx_hash(Some(tx.tx_hash)))
            }
            _ => {
                info!(%channel_id, block = tx.block, "channel opened");
                Ok(channel_id)
            }
        }
    }

    /// Deposits `amount` on chain for `recipient` (our own balance if `None`),
    /// waits until the hub sees it and signs one update per deposit the hub
    /// has not accounted for yet.
    pub async fn deposit(
        &self,
        amount: Balance,
        recipient: Option<Address>,
    ) -> Result<Vec<SignedChannelState>> {
        const METHOD: &str = "deposit";
        ensure!(!amount.is_zero(), Validation, METHOD, "deposit amount is zero");

        let channel = self.my_opened_channel(METHOD, ErrorKind::ChannelUpdate).await?;
        let channel_id = channel.state.channel_id;
        let recipient = recipient.unwrap_or(channel.state.party_a);
        ensure!(
            channel.state.is_party(&recipient),
            Validation,
            METHOD,
            "{} is not a party of channel {}",
            recipient,
            channel_id
        );

        let known = self.hub.channel_deposits(channel_id).await?.len();
        let tx = self
            .contract
            .deposit(channel_id, recipient, amount)
            .await?
            .confirm(METHOD)?;
        debug!(%channel_id, tx = %tx.tx_hash, "deposit mined, waiting for the hub");

        let policy = self.config.deposit_poll;
        let mut attempt = 0;
        let deposits = loop {
            let deposits = self.hub.channel_deposits(channel_id).await?;
            if deposits.len() > known {
                break deposits;
            }
            attempt += 1;
            if !policy.allows(attempt) {
                return Err(Error::new(
                    ErrorKind::Timeout,
                    METHOD,
                    format!("hub did not see the deposit after {} attempts", attempt),
                )
                .with_tx_hash(Some(tx.tx_hash)));
            }
            tokio::time::sleep(policy.interval).await;
        };

        let mut latest = self.hub.latest_channel_state(channel_id).await?.state;
        let mut signed = Vec::new();
        for d in deposits.iter().filter(|d| d.is_untracked()) {
            let mut next = latest.next_state_for(METHOD, ErrorKind::ChannelUpdate)?;
            let target = if d.recipient == next.party_a {
                &mut next.balance_a
            } else if d.recipient == next.party_hub {
                &mut next.balance_hub
            } else {
                warn!(%channel_id, recipient = %d.recipient, "skipping deposit for a stranger");
                continue;
            };
            *target = target.checked_add(&d.amount).ok_or_else(|| {
                Error::new(ErrorKind::ChannelUpdate, METHOD, "deposit overflows the balance")
            })?;

            let next = propose_channel_update(Some(&latest), next, self.address(), Adjustment::deposit(d.amount))?;
            let sig_a = self.sign_channel(&next)?;
            let response = self
                .hub
                .post_channel_update(ChannelUpdateRequest {
                    state: next,
                    sig_a,
                    deposit_tx: Some(d.tx_hash),
                })
                .await?;
            let sig_hub = self.expect_countersig(METHOD, ErrorKind::ChannelUpdate, response, &next)?;

            debug!(%channel_id, nonce = next.nonce, "deposit applied");
            signed.push(SignedChannelState {
                state: next,
                sig_a: Some(sig_a),
                sig_hub: Some(sig_hub),
            });
            latest = next;
        }

        info!(%channel_id, updates = signed.len(), "deposit complete");
        Ok(signed)
    }

    /// Fast close: signs a closing copy of the latest state and, if the hub
    /// countersigns it, settles the channel on chain.
    pub async fn close_channel(&self) -> Result<CloseOutcome> {
        const METHOD: &str = "close_channel";
        let channel = self.my_opened_channel(METHOD, ErrorKind::ChannelClose).await?;
        let latest = self.hub.latest_channel_state(channel.state.channel_id).await?.state;
        let channel_id = latest.channel_id;

        ensure!(
            latest.open_thread_count == 0 && latest.thread_root_hash.is_empty_root(),
            ChannelClose,
            METHOD,
            "channel {} still has {} open threads",
            channel_id,
            latest.open_thread_count
        );

        let mut closing = latest.next_state_for(METHOD, ErrorKind::ChannelClose)?;
        closing.is_closing = true;
        let closing = propose_channel_update(Some(&latest), closing, self.address(), Adjustment::default())?;
        let sig_a = self.sign_channel(&closing)?;

        let reason = match self.hub.request_channel_close(closing, sig_a).await? {
            HubResponse::Countersigned(sig_hub) => {
                self.verify_hub_sig(METHOD, &closing, sig_hub)?;
                let tx = self
                    .contract
                    .consensus_close_channel(closing, sig_a, sig_hub)
                    .await?
                    .confirm(METHOD)?;
                info!(%channel_id, block = tx.block, "channel closed");
                return Ok(CloseOutcome::Closed { state: closing, tx });
            }
            HubResponse::Accepted => "hub did not countersign".to_string(),
            HubResponse::Rejected(reason) => reason,
        };

        warn!(%channel_id, %reason, "fast close failed, dispute required");
        Ok(CloseOutcome::DisputeRequired {
            state: closing,
            sig_a,
            reason,
        })
    }

    /// Starts a dispute on chain with the latest double-signed state and
    /// settles every open thread of it. Returns the mined transactions.
    pub async fn dispute_channel(&self) -> Result<Vec<MinedTx>> {
        const METHOD: &str = "dispute_channel";
        let channel = self.my_channel(METHOD).await?;
        let channel_id = channel.state.channel_id;
        let latest = self.hub.latest_channel_state(channel_id).await?;
        let mut txs = Vec::new();

        match (latest.sig_a, latest.sig_hub) {
            (Some(sig_a), Some(sig_hub)) => {
                ensure!(
                    self.channel_signer(&latest.state, sig_a)? == latest.state.party_a,
                    InvalidSignature,
                    METHOD,
                    "latest state of {} is not signed by {}",
                    channel_id,
                    latest.state.party_a
                );
                self.verify_hub_sig(METHOD, &latest.state, sig_hub)?;
                let tx = self
                    .contract
                    .update_channel_state(latest.state, sig_a, sig_hub)
                    .await?
                    .confirm(METHOD)?;
                debug!(%channel_id, nonce = latest.state.nonce, "dispute started");
                txs.push(tx);
            }
            // The contract already holds the state it was created with.
            _ if latest.state.nonce == 0 => {}
            _ => {
                return Err(Error::new(
                    ErrorKind::ChannelClose,
                    METHOD,
                    format!("latest state {} of {} is not double signed", latest.state.nonce, channel_id),
                ))
            }
        }

        let initials = self.open_thread_set(METHOD, ErrorKind::ChannelClose, &latest.state).await?;

        for initial in &initials {
            let thread_id = initial.channel_id;
            let signed_initial = self.hub.thread_state_by_nonce(thread_id, 0).await?;
            let proof = merkle::thread_proof(&initials, initial)?;
            txs.push(
                self.contract
                    .init_thread_state(channel_id, *initial, signed_initial.sig_a, proof)
                    .await?
                    .confirm(METHOD)?,
            );

            let last = self.hub.latest_thread_state(thread_id).await?;
            ensure!(
                self.thread_signer(&last.state, last.sig_a)? == initial.party_a,
                InvalidSignature,
                METHOD,
                "latest state of thread {} is not signed by its sender",
                thread_id
            );
            txs.push(
                self.contract
                    .settle_thread(channel_id, last.state, last.sig_a)
                    .await?
                    .confirm(METHOD)?,
            );
            debug!(%channel_id, %thread_id, nonce = last.state.nonce, "thread settled");
        }

        info!(%channel_id, threads = initials.len(), "dispute submitted");
        Ok(txs)
    }

    /// Ends a dispute once the challenge period is over.
    pub async fn finalize_dispute(&self) -> Result<MinedTx> {
        const METHOD: &str = "finalize_dispute";
        let channel = self.my_channel(METHOD).await?;
        let channel_id = channel.state.channel_id;
        let tx = self
            .contract
            .byzantine_close_channel(channel_id)
            .await?
            .confirm(METHOD)?;
        info!(%channel_id, block = tx.block, "dispute finalized");
        Ok(tx)
    }

    /// Takes the deposit back out of a channel the hub never joined.
    pub async fn reclaim_unjoined_channel(&self) -> Result<MinedTx> {
        const METHOD: &str = "reclaim_unjoined_channel";
        let channel = self.my_channel(METHOD).await?;
        let channel_id = channel.state.channel_id;
        ensure!(
            channel.status == ChannelStatus::Opening,
            ChannelOpen,
            METHOD,
            "channel {} was joined, it is {:?}",
            channel_id,
            channel.status
        );
        let tx = self
            .contract
            .channel_open_timeout(channel_id)
            .await?
            .confirm(METHOD)?;
        info!(%channel_id, "unjoined channel reclaimed");
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MemoryHub, TestClient};

    fn eth(x: u64) -> InitialDeposit {
        InitialDeposit {
            eth: Some(U256::from(x)),
            token: None,
        }
    }

    async fn opened(hub: &MemoryHub, seed: u64, amount: u64) -> (TestClient, Hash) {
        let client = testing::client(hub, seed);
        let id = client.open_channel(eth(amount)).await.unwrap();
        (client, id)
    }

    #[tokio::test]
    async fn open_creates_and_joins() {
        let hub = MemoryHub::new(0);
        let (client, id) = opened(&hub, 1, 150).await;

        assert_eq!(hub.channel_status(id), ChannelStatus::Opened);
        let state = hub.latest_state(id);
        assert_eq!(state.nonce, 0);
        assert_eq!(state.party_a, client.address());
        assert_eq!(state.party_hub, hub.address());
        assert_eq!(state.balance_a, Balance::eth(150u64));
        assert_eq!(client.contract().calls(), vec!["createChannel"]);
    }

    #[tokio::test]
    async fn open_needs_a_deposit_field() {
        let hub = MemoryHub::new(0);
        let client = testing::client(&hub, 1);
        let e = client.open_channel(InitialDeposit::default()).await.unwrap_err();
        assert_eq!(e.kind, ErrorKind::Validation);

        // token channels need to know the token
        let e = client
            .open_channel(InitialDeposit {
                eth: None,
                token: Some(U256::one()),
            })
            .await
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::Validation);
        assert!(client.contract().calls().is_empty());
    }

    #[tokio::test]
    async fn second_open_channel_is_rejected() {
        let hub = MemoryHub::new(0);
        let (client, _) = opened(&hub, 1, 10).await;
        let e = client.open_channel(eth(10)).await.unwrap_err();
        assert_eq!(e.kind, ErrorKind::ChannelOpen);
    }

    #[tokio::test]
    async fn hub_cannot_open_with_itself() {
        let hub = MemoryHub::new(0);
        let client = testing::client(&hub, 0);
        let e = client.open_channel(eth(10)).await.unwrap_err();
        assert_eq!(e.kind, ErrorKind::ChannelOpen);
    }

    #[tokio::test]
    async fn unmined_create_is_a_contract_error() {
        let hub = MemoryHub::new(0);
        let client = testing::client(&hub, 1);
        client.contract().omit_block(true);
        let e = client.open_channel(eth(10)).await.unwrap_err();
        assert_eq!(e.kind, ErrorKind::Contract);
        assert!(e.tx_hash.is_some());
    }

    #[tokio::test]
    async fn refused_join_can_be_reclaimed() {
        let hub = MemoryHub::new(0);
        hub.behave(|b| b.refuse_join_channel = true);
        let client = testing::client(&hub, 1);
        let e = client.open_channel(eth(10)).await.unwrap_err();
        assert_eq!(e.kind, ErrorKind::ChannelOpen);
        assert!(e.tx_hash.is_some());

        client.reclaim_unjoined_channel().await.unwrap();
        assert_eq!(client.contract().calls(), vec!["createChannel", "channelOpenTimeout"]);
    }

    #[tokio::test]
    async fn joined_channel_cannot_be_reclaimed() {
        let hub = MemoryHub::new(0);
        let (client, _) = opened(&hub, 1, 10).await;
        let e = client.reclaim_unjoined_channel().await.unwrap_err();
        assert_eq!(e.kind, ErrorKind::ChannelOpen);
    }

    #[tokio::test]
    async fn deposit_is_signed_once_the_hub_sees_it() {
        let hub = MemoryHub::new(0);
        let (client, id) = opened(&hub, 1, 100).await;

        let signed = client.deposit(Balance::eth(50u64), None).await.unwrap();
        assert_eq!(signed.len(), 1);
        assert!(signed[0].is_double_signed());
        assert_eq!(signed[0].state.nonce, 1);

        let state = hub.latest_state(id);
        assert_eq!(state, signed[0].state);
        assert_eq!(state.balance_a, Balance::eth(150u64));

        // the deposit is tracked now, a second one only adds itself
        let signed = client.deposit(Balance::eth(5u64), Some(hub.address())).await.unwrap();
        assert_eq!(signed.len(), 1);
        assert_eq!(hub.latest_state(id).balance_hub, Balance::eth(5u64));
        assert_eq!(hub.latest_state(id).nonce, 2);
    }

    #[tokio::test]
    async fn deposit_polling_gives_up() {
        let hub = MemoryHub::new(0);
        let (client, id) = opened(&hub, 1, 100).await;
        hub.behave(|b| b.ignore_deposits = true);

        let e = client.deposit(Balance::eth(50u64), None).await.unwrap_err();
        assert_eq!(e.kind, ErrorKind::Timeout);
        assert!(e.tx_hash.is_some());
        assert_eq!(hub.latest_state(id).nonce, 0);
    }

    #[tokio::test]
    async fn deposit_for_a_stranger_is_rejected() {
        let hub = MemoryHub::new(0);
        let (client, _) = opened(&hub, 1, 100).await;
        let e = client
            .deposit(Balance::eth(1u64), Some(Address([0x77; 20])))
            .await
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::Validation);
        assert_eq!(client.contract().calls(), vec!["createChannel"]);
    }

    #[tokio::test]
    async fn fast_close() {
        let hub = MemoryHub::new(0);
        let (client, id) = opened(&hub, 1, 100).await;

        match client.close_channel().await.unwrap() {
            CloseOutcome::Closed { state, .. } => {
                assert!(state.is_closing);
                assert_eq!(state.nonce, 1);
                assert_eq!(state.balance_a, Balance::eth(100u64));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(hub.channel_status(id), ChannelStatus::Settled);
        assert_eq!(client.contract().calls(), vec!["createChannel", "consensusCloseChannel"]);
    }

    #[tokio::test]
    async fn refused_close_requires_dispute() {
        let hub = MemoryHub::new(0);
        let (client, _) = opened(&hub, 1, 100).await;
        hub.behave(|b| b.refuse_channel_close = true);

        match client.close_channel().await.unwrap() {
            CloseOutcome::DisputeRequired { state, sig_a, .. } => {
                assert!(state.is_closing);
                assert_eq!(client.channel_signer(&state, sig_a).unwrap(), client.address());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(client.contract().calls(), vec!["createChannel"]);
    }

    #[tokio::test]
    async fn dispute_without_threads() {
        let hub = MemoryHub::new(0);
        let (client, id) = opened(&hub, 1, 100).await;
        client.deposit(Balance::eth(1u64), None).await.unwrap();

        let txs = client.dispute_channel().await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(hub.channel_status(id), ChannelStatus::Settling);

        client.finalize_dispute().await.unwrap();
        assert_eq!(hub.channel_status(id), ChannelStatus::Settled);
        assert_eq!(
            client.contract().calls(),
            vec!["createChannel", "deposit", "updateChannelState", "byzantineCloseChannel"]
        );
    }

    #[tokio::test]
    async fn dispute_needs_double_signed_state() {
        let hub = MemoryHub::new(0);
        let (client, id) = opened(&hub, 1, 100).await;
        let mut next = hub.latest_state(id).make_next_state().unwrap();
        next.balance_a = Balance::eth(90u64);
        next.balance_hub = Balance::eth(10u64);
        hub.force_state(SignedChannelState {
            state: next,
            sig_a: None,
            sig_hub: Some(hub.countersign(&next)),
        });

        let e = client.dispute_channel().await.unwrap_err();
        assert_eq!(e.kind, ErrorKind::ChannelClose);
    }

    #[tokio::test]
    async fn exhausted_nonce_is_refused_before_signing() {
        let hub = MemoryHub::new(0);
        let (client, id) = opened(&hub, 1, 100).await;
        let last = ChannelState {
            nonce: u64::MAX,
            ..hub.latest_state(id)
        };
        hub.force_state(SignedChannelState {
            state: last,
            sig_a: None,
            sig_hub: None,
        });

        let e = client.close_channel().await.unwrap_err();
        assert_eq!(e.kind, ErrorKind::ChannelClose);
        assert!(e.message.contains("exhausted"));
        assert_eq!(client.contract().calls(), vec!["createChannel"]);
    }
}
