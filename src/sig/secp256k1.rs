//! Signer using libsecp256k1 through the secp256k1 crate.

use crate::{
    types::{Address, Hash, Signature},
    Error, ErrorKind,
};
use secp256k1::{
    self,
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey,
};

use super::{address_from_uncompressed, checked_address, recovery_id, SigningConvention};

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Error::new(ErrorKind::InvalidSignature, "ecdsa", e.to_string())
    }
}

impl From<PublicKey> for Address {
    fn from(pk: PublicKey) -> Self {
        address_from_uncompressed(&pk.serialize_uncompressed())
    }
}

#[derive(Debug, Clone)]
pub struct Signer {
    secp: Secp256k1<All>,
    sk: SecretKey,
    addr: Address,
    convention: SigningConvention,
}

impl Signer {
    /// Fresh random key.
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let secp = Secp256k1::new();
        let sk = SecretKey::new(rng);
        let addr = PublicKey::from_secret_key(&secp, &sk).into();
        Self {
            secp,
            sk,
            addr,
            convention: SigningConvention::default(),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(bytes).map_err(|e| {
            Error::validation("from_secret_bytes", format!("invalid private key: {}", e))
        })?;
        let addr = PublicKey::from_secret_key(&secp, &sk).into();
        Ok(Self {
            secp,
            sk,
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

    /// Sign a hash using a Ethereum 65-byte recoverable signature.
    pub fn sign_eth(&self, msg: Hash) -> Result<Signature, Error> {
        let hash = self.convention.digest(msg);

        // We have to use sign_ecdsa_recoverable because the smart contract must be
        // able to recover the address. This gives us the additional information
        // needed for v.
        let sig = self
            .secp
            .sign_ecdsa_recoverable(&Message::from_slice(&hash.0)?, &self.sk);
        let (v, rs) = sig.serialize_compact();

        // EIP-2 makes signatures with a non-canonical s invalid, libsecp256k1
        // only produces canonical ones.
        debug_assert!(rs[32] & 0x80 == 0);

        // yParity offset by 27, no EIP-155 chain id (OpenZeppelin's ECDSA
        // does not accept those).
        let v: u8 = 27 + v.to_i32() as u8;

        Ok(Signature::new(&rs, v))
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

    let v = recovery_id(METHOD, &eth_sig)?;
    let recid = RecoveryId::from_i32(v.into())?;
    let sig = RecoverableSignature::from_compact(&eth_sig.0[..64], recid)?;

    let secp = Secp256k1::verification_only();
    let pk = secp
        .recover_ecdsa(&Message::from_slice(&hash.0)?, &sig)
        .map_err(|e| Error::new(ErrorKind::InvalidSignature, METHOD, e.to_string()))?;

    checked_address(METHOD, pk.into())
}
