use super::ChannelState;
use crate::{
    error::ensure,
    types::{Address, Balance, EMPTY_ROOT},
    validate, Error, ErrorKind, Result,
};

/// Funds moving between a ledger channel and a thread in a single update.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Bond {
    #[default]
    None,
    /// A thread opens: the bond leaves the ledger balances (+1 thread).
    Open(Balance),
    /// A thread closes: its final balances come back (-1 thread).
    Close(Balance),
}

/// Everything that may change the total of a ledger channel between two
/// consecutive states.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Adjustment {
    pub deposit: Balance,
    pub bond: Bond,
}

impl Adjustment {
    pub fn deposit(deposit: Balance) -> Self {
        Adjustment {
            deposit,
            bond: Bond::None,
        }
    }

    pub fn open_thread(bond: Balance) -> Self {
        Adjustment {
            deposit: Balance::ZERO,
            bond: Bond::Open(bond),
        }
    }

    pub fn close_thread(bond: Balance) -> Self {
        Adjustment {
            deposit: Balance::ZERO,
            bond: Bond::Close(bond),
        }
    }
}

/// Checks that `proposed` may follow `current` (or open a channel if there
/// is no current state) when signed by `signer`, and returns it.
///
/// Nothing is signed here: this runs before any signature is produced.
pub fn propose_channel_update(
    current: Option<&ChannelState>,
    proposed: ChannelState,
    signer: Address,
    adjustment: Adjustment,
) -> Result<ChannelState> {
    const METHOD: &str = "propose_channel_update";

    ensure!(
        proposed.is_party(&signer),
        ChannelUpdate,
        METHOD,
        "invalid signer {}",
        signer
    );

    match current {
        None => check_genesis(&proposed, &adjustment)?,
        Some(current) => check_transition(current, &proposed, &adjustment)?,
    }

    Ok(proposed)
}

fn check_genesis(proposed: &ChannelState, adjustment: &Adjustment) -> Result<()> {
    const METHOD: &str = "propose_channel_update";
    let err = |msg: &str| Err(Error::new(ErrorKind::ChannelOpen, METHOD, msg));

    if proposed.nonce != 0 {
        err("an opening state must have nonce 0")
    } else if proposed.open_thread_count != 0 {
        err("an opening state cannot have open threads")
    } else if !proposed.thread_root_hash.is_empty_root() {
        err("an opening state must have the empty thread root")
    } else if !validate::is_valid_party(&proposed.party_a)
        || !validate::is_valid_party(&proposed.party_hub)
    {
        err("parties cannot be the zero address")
    } else if !validate::are_distinct_parties(&proposed.party_a, &proposed.party_hub) {
        err("cannot open a channel with yourself")
    } else if proposed.is_closing {
        err("an opening state cannot be closing")
    } else if adjustment.bond != Bond::None {
        err("an opening state cannot move a thread bond")
    } else {
        Ok(())
    }
}

fn check_transition(
    current: &ChannelState,
    proposed: &ChannelState,
    adjustment: &Adjustment,
) -> Result<()> {
    const METHOD: &str = "propose_channel_update";
    let err = |msg: String| Err(Error::new(ErrorKind::ChannelUpdate, METHOD, msg));

    let expected_count = match adjustment.bond {
        Bond::None => Some(current.open_thread_count),
        Bond::Open(_) => current.open_thread_count.checked_add(1),
        Bond::Close(_) => current.open_thread_count.checked_sub(1),
    };

    if current.is_closing {
        err("current state is closing, no further updates are possible".into())
    } else if proposed.channel_id != current.channel_id {
        err(format!(
            "channel id {} does not match {}",
            proposed.channel_id, current.channel_id
        ))
    } else if proposed.party_a != current.party_a || proposed.party_hub != current.party_hub {
        err("channel parties cannot change".into())
    } else if Some(proposed.nonce) != current.nonce.checked_add(1) {
        err(format!(
            "nonce must be {} + 1, got {}",
            current.nonce, proposed.nonce
        ))
    } else if expected_count != Some(proposed.open_thread_count) {
        err(format!(
            "thread count {} -> {} does not match the bond {:?}",
            current.open_thread_count, proposed.open_thread_count, adjustment.bond
        ))
    } else if (proposed.open_thread_count == 0) != (proposed.thread_root_hash == EMPTY_ROOT) {
        err("thread root does not match the open thread count".into())
    } else {
        check_conservation(current, proposed, adjustment)
    }
}

fn check_conservation(
    current: &ChannelState,
    proposed: &ChannelState,
    adjustment: &Adjustment,
) -> Result<()> {
    const METHOD: &str = "propose_channel_update";
    let overflow = || Error::new(ErrorKind::ChannelUpdate, METHOD, "balance over- or underflow");

    let before = current.total().ok_or_else(overflow)?;
    let after = proposed.total().ok_or_else(overflow)?;
    let with_deposit = before.checked_add(&adjustment.deposit).ok_or_else(overflow)?;
    let expected = match adjustment.bond {
        Bond::None => Some(with_deposit),
        Bond::Open(bond) => with_deposit.checked_sub(&bond),
        Bond::Close(bond) => with_deposit.checked_add(&bond),
    }
    .ok_or_else(overflow)?;

    ensure!(
        after == expected,
        ChannelUpdate,
        METHOD,
        "balances are not conserved: expected total {:?}, got {:?}",
        expected,
        after
    );
    Ok(())
}
