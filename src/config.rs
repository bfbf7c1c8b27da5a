use core::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::{sig::SigningConvention, types::Address, Error, Result};

/// How long to wait for the hub to see an on-chain deposit.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollPolicy {
    #[serde(rename = "intervalMs", deserialize_with = "millis")]
    pub interval: Duration,
    /// `None` polls until the hub catches up, however long it takes.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval: Duration::from_secs(2),
            max_attempts: Some(60),
        }
    }
}

impl PollPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        PollPolicy {
            interval,
            max_attempts: None,
        }
    }

    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        PollPolicy {
            interval,
            max_attempts: Some(max_attempts),
        }
    }

    pub(crate) fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

fn millis<'de, D: Deserializer<'de>>(d: D) -> core::result::Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
}

#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub hub_address: Address,
    /// ERC20 token held by channels with a token balance.
    #[serde(default)]
    pub token_address: Option<Address>,
    #[serde(default)]
    pub signing: SigningConvention,
    #[serde(default)]
    pub deposit_poll: PollPolicy,
    /// Seconds, passed to the contract when a channel is created.
    pub challenge_period: u64,
}

impl ClientConfig {
    pub fn new(hub_address: Address, challenge_period: u64) -> Self {
        ClientConfig {
            hub_address,
            token_address: None,
            signing: SigningConvention::default(),
            deposit_poll: PollPolicy::default(),
            challenge_period,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::validation("ClientConfig::from_json", e.to_string()))
    }
}
