//! Signer using the k256 Rust crate (implementation of ecdsa in Rust).

use crate::{
    types::{Address, Hash, Signature},
    Error, ErrorKind,
};
use k256::{
    ecdsa::{
        recoverable,
        signature::{hazmat::PrehashSigner, Signature as k256Signature},
        SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
};

use super::{address_from_uncompressed, checked_address, recovery_id, SigningConvention};

impl From<k256::ecdsa::Error> for Error {
    fn from(e: k256::ecdsa::Error) -> Self {
        Error::new(ErrorKind::InvalidSignature, "ecdsa", e.to_string())
    }
}

fn address_of(key: &VerifyingKey) -> Result<Address, Error> {
    let pk_bytes: [u8; 65] = key
        .to_encoded_point(false)
        .as_bytes()
        .try_into()
        .map_err(|_| Error::new(ErrorKind::InvalidSignature, "address_of", "unexpected public key length"))?;
    Ok(address_from_uncompressed(&pk_bytes))
}

#[derive(Debug, Clone)]
pub struct Signer {
    key: SigningKey,
    addr: Address,
    convention: SigningConvention,
}

impl Signer {
    /// Fresh random key.
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let key = SigningKey::random(&mut *rng);
        // A freshly generated key always has a valid public key.
        let addr = address_of(&key.verifying_key()).unwrap_or_default();
        Self {
            key,
            addr,
            convention: SigningConvention::default(),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let key = SigningKey::from_bytes(bytes).map_err(|e| {
            Error::validation("from_secret_bytes", format!("invalid private key: {}", e))
        })?;
        let addr = address_of(&key.verifying_key())?;
        Ok(Self {
            key,
            addr,
            convention: SigningConvention::default(),
        })
    }

    pub fn with_convention(mut self, convention: SigningConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn convention(&self) -> SigningConvention {
        self.convention
    }

    pub fn sign_eth(&self, msg: Hash) -> Result<Signature, Error> {
        let hash = self.convention.digest(msg);

        let sig: recoverable::Signature = self.key.sign_prehash(&hash.0)?;

        // This Signature type already has the format we need: 65 bytes
        // containing r, s and v in this order. We still have to add 27 to v
        // for the signature to be valid in the EVM.
        let mut sig_bytes: [u8; 65] = sig.as_bytes().try_into().map_err(|_| {
            Error::new(ErrorKind::InvalidSignature, "sign_eth", "unexpected signature length")
        })?;
        debug_assert!(sig_bytes[32] & 0x80 == 0);
        sig_bytes[64] += 27;

        Ok(Signature(sig_bytes))
    }

    pub fn recover_signer(&self, msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
        recover_signer(msg, eth_sig, self.convention)
    }
}

/// Address whose key produced `eth_sig` over `msg` under `convention`.
pub fn recover_signer(
    msg: Hash,
    eth_sig: Signature,
    convention: SigningConvention,
) -> Result<Address, Error> {
    const METHOD: &str = "recover_signer";
    let hash = convention.digest(msg);

    let mut sig_bytes: [u8; 65] = eth_sig.0;
    sig_bytes[64] = recovery_id(METHOD, &eth_sig)?;

    let sig = recoverable::Signature::from_bytes(&sig_bytes)
        .map_err(|e| Error::new(ErrorKind::InvalidSignature, METHOD, e.to_string()))?;

    let verifying_key = sig
        .recover_verifying_key_from_digest_bytes(&hash.0.into())
        .map_err(|e| Error::new(ErrorKind::InvalidSignature, METHOD, e.to_string()))?;
    checked_address(METHOD, address_of(&verifying_key)?)
}
