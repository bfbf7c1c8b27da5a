//! Handles the creation and verification of (Ethereum) Signatures.
//!
//! Two backends produce identical signatures: `k256` (pure Rust, default) and
//! `secp256k1` (bindings to libsecp256k1). If both features are enabled the
//! `secp256k1` backend is used.

use crate::{
    types::{Address, Hash, Signature},
    Error, ErrorKind,
};
use serde::Deserialize;
use sha3::{Digest, Keccak256};

#[cfg(feature = "k256")]
mod k256;
#[cfg(feature = "secp256k1")]
mod secp256k1;

#[cfg(feature = "secp256k1")]
pub use self::secp256k1::{recover_signer, Signer};

#[cfg(all(feature = "k256", not(feature = "secp256k1")))]
pub use self::k256::{recover_signer, Signer};

#[cfg(not(any(feature = "k256", feature = "secp256k1")))]
compile_error!("enable one of the signer backends: `k256` or `secp256k1`");


/// Which digest the wallet back end actually signs.
///
/// Different wallets disagree on whether they add the
/// `\x19Ethereum Signed Message:\n32` prefix themselves. With
/// [Personal][SigningConvention::Personal] we add it before signing the 32
/// byte fingerprint, which is what the on-chain verifier expects. With
/// [Raw][SigningConvention::Raw] the fingerprint is signed as is, because the
/// back end adds the prefix on its own.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SigningConvention {
    #[default]
    Personal,
    Raw,
}

impl SigningConvention {
    /// The digest that goes into ECDSA for a given fingerprint.
    pub fn digest(self, hash: Hash) -> Hash {
        match self {
            SigningConvention::Personal => hash_to_eth_signed_msg_hash(hash),
            SigningConvention::Raw => hash,
        }
    }
}

/// Add the `\x19Ethereum Signed Message\n<length>` prefix to hash.
///
/// This is the format expected by the Solidity contracts.
pub fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding of a string and bytes32, no need for the serializer
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}

/// Ethereum address of an uncompressed SEC1 public key (`0x04 || x || y`).
fn address_from_uncompressed(pk_bytes: &[u8; 65]) -> Address {
    // Throw away the first byte, which is not part of the public key. It is
    // added by the SEC1 encoding.
    let hash: [u8; 32] = Keccak256::digest(&pk_bytes[1..]).into();

    let mut addr = Address([0; 20]);
    addr.0.copy_from_slice(&hash[32 - 20..]);
    addr
}

/// Undo the `+ 27` the EVM expects on `v`.
fn recovery_id(method: &'static str, sig: &Signature) -> Result<u8, Error> {
    match sig.v() {
        27 | 28 => Ok(sig.v() - 27),
        v => Err(Error::new(
            ErrorKind::InvalidSignature,
            method,
            format!("v must be 27 or 28, got {}", v),
        )),
    }
}

fn checked_address(method: &'static str, addr: Address) -> Result<Address, Error> {
    if addr.is_zero() {
        Err(Error::new(
            ErrorKind::InvalidSignature,
            method,
            "recovered the zero address",
        ))
    } else {
        Ok(addr)
    }
}
