use super::ThreadState;
use crate::{
    error::ensure,
    types::{Address, Balance},
    Error, ErrorKind, Result,
};

/// Builds the thread state following `current` with the given balances.
///
/// `nonce_offset` is 1 for a single payment; batched payments to the same
/// thread use increasing offsets relative to the same `current`.
pub fn propose_thread_update(
    current: &ThreadState,
    balance_a: Balance,
    balance_b: Balance,
    signer: Address,
    nonce_offset: u64,
) -> Result<ThreadState> {
    const METHOD: &str = "propose_thread_update";
    let err = |msg: String| Err(Error::new(ErrorKind::ThreadUpdate, METHOD, msg));

    ensure!(
        signer == current.party_a,
        ThreadUpdate,
        METHOD,
        "only the sender {} can update the thread, not {}",
        current.party_a,
        signer
    );
    ensure!(nonce_offset >= 1, ThreadUpdate, METHOD, "nonce offset must be at least 1");

    let nonce = match current.nonce.checked_add(nonce_offset) {
        Some(n) => n,
        None => return err("nonce overflow".into()),
    };
    let proposed = ThreadState {
        nonce,
        balance_a,
        balance_b,
        ..*current
    };

    if proposed.total().is_none() || proposed.total() != current.total() {
        err(format!(
            "thread total must stay {:?}, got {:?} + {:?}",
            current.total(),
            balance_a,
            balance_b
        ))
    } else if balance_b.eth < current.balance_b.eth || balance_b.token < current.balance_b.token {
        err(format!(
            "receiver balance cannot decrease from {:?} to {:?}",
            current.balance_b, balance_b
        ))
    } else {
        Ok(proposed)
    }
}
