use crate::{
    channel::{ChannelRecord, ChannelState, ChannelStatus},
    config::ClientConfig,
    contract::Contract,
    hub::{Hub, HubResponse},
    merkle,
    sig::{self, Signer},
    thread::ThreadState,
    types::{Address, Hash, Signature},
    Error, ErrorKind, Result,
};

/// The main object of this crate, used to open channels and threads and to
/// move funds through them.
///
/// It owns the key of one user and knows how to reach the hub and the
/// contract. All lifecycle operations are methods on it, see
/// [crate::channel] and [crate::thread]. Usually an application has only one
/// client per user.
#[derive(Debug)]
pub struct Client<H: Hub, C: Contract> {
    pub(crate) hub: H,
    pub(crate) contract: C,
    pub(crate) signer: Signer,
    pub(crate) config: ClientConfig,
}

impl<H: Hub, C: Contract> Client<H, C> {
    /// The signer uses the convention from `config`, whatever it was created
    /// with.
    pub fn new(hub: H, contract: C, signer: Signer, config: ClientConfig) -> Self {
        Client {
            hub,
            contract,
            signer: signer.with_convention(config.signing),
            config,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    pub fn contract(&self) -> &C {
        &self.contract
    }

    pub(crate) fn sign_channel(&self, state: &ChannelState) -> Result<Signature> {
        self.signer.sign_eth(state.fingerprint()?)
    }

    pub(crate) fn sign_thread(&self, state: &ThreadState) -> Result<Signature> {
        self.signer.sign_eth(state.fingerprint()?)
    }

    pub(crate) fn channel_signer(&self, state: &ChannelState, sig: Signature) -> Result<Address> {
        sig::recover_signer(state.fingerprint()?, sig, self.config.signing)
    }

    pub(crate) fn thread_signer(&self, state: &ThreadState, sig: Signature) -> Result<Address> {
        sig::recover_signer(state.fingerprint()?, sig, self.config.signing)
    }

    /// Checks that `sig` is the hub's signature on `state`.
    pub(crate) fn verify_hub_sig(
        &self,
        method: &'static str,
        state: &ChannelState,
        sig: Signature,
    ) -> Result<()> {
        let signer = self.channel_signer(state, sig)?;
        if signer != self.config.hub_address {
            return Err(Error::new(
                ErrorKind::InvalidSignature,
                method,
                format!(
                    "countersignature is from {}, expected the hub {}",
                    signer, self.config.hub_address
                ),
            ));
        }
        Ok(())
    }

    /// Turns the hub's answer to a channel update into its verified
    /// countersignature. Anything else is an error of the given kind.
    pub(crate) fn expect_countersig(
        &self,
        method: &'static str,
        kind: ErrorKind,
        response: HubResponse,
        state: &ChannelState,
    ) -> Result<Signature> {
        match response {
            HubResponse::Countersigned(sig) => {
                self.verify_hub_sig(method, state, sig)?;
                Ok(sig)
            }
            HubResponse::Accepted => Err(Error::new(
                kind,
                method,
                format!("hub did not countersign nonce {}", state.nonce),
            )),
            HubResponse::Rejected(reason) => {
                Err(Error::new(kind, method, format!("hub rejected: {}", reason)))
            }
        }
    }

    /// The ledger channel of this client that is not settled yet.
    pub(crate) async fn my_channel(&self, method: &'static str) -> Result<ChannelRecord> {
        self.hub
            .channel_by_party(self.address())
            .await?
            .ok_or_else(|| Error::not_found(method, format!("no channel for {}", self.address())))
    }

    /// Like [Self::my_channel], but the channel must be `Opened`. A missing
    /// channel is an error of `kind` as well.
    pub(crate) async fn my_opened_channel(
        &self,
        method: &'static str,
        kind: ErrorKind,
    ) -> Result<ChannelRecord> {
        let channel = self.my_channel(method).await.map_err(|mut e| {
            if e.is_not_found() {
                e.kind = kind;
                e.status_code = kind.default_status_code();
            }
            e
        })?;
        if channel.status != ChannelStatus::Opened {
            return Err(Error::new(
                kind,
                method,
                format!(
                    "channel {} is {:?}, not opened",
                    channel.state.channel_id, channel.status
                ),
            ));
        }
        Ok(channel)
    }

    /// Initial states of the threads open in `latest`, as the hub reports
    /// them. They must reproduce its thread root and count before a new root
    /// is built from them.
    pub(crate) async fn open_thread_set(
        &self,
        method: &'static str,
        kind: ErrorKind,
        latest: &ChannelState,
    ) -> Result<Vec<ThreadState>> {
        let initials = self.hub.thread_initial_states(latest.channel_id).await?;
        if merkle::thread_root(&initials)? != latest.thread_root_hash
            || initials.len() as u64 != latest.open_thread_count
        {
            return Err(Error::new(
                kind,
                method,
                format!(
                    "hub reports {} open threads that do not match the thread root of {} at nonce {}",
                    initials.len(),
                    latest.channel_id,
                    latest.nonce
                ),
            ));
        }
        Ok(initials)
    }

    pub(crate) fn random_id(&self) -> Hash {
        rand::random()
    }
}
