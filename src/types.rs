use core::{fmt::Debug, str::FromStr};

use rand::{distributions::Standard, prelude::Distribution};
use serde::{Deserialize, Deserializer, Serialize};
use uint::construct_uint;

use crate::{validate, Error};

macro_rules! impl_hex_fmt {
    ($T:ident) => {
        impl Debug for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("0x")?;
                for b in self.0 {
                    f.write_fmt(format_args!("{:02x}", b))?;
                }
                Ok(())
            }
        }

        impl core::fmt::Display for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                Debug::fmt(self, f)
            }
        }
    };
}

/// Fixed-size byte strings.
///
/// Human readable formats (JSON towards the hub) see a `0x` prefixed hex
/// string, the packed encoder sees the raw bytes without any padding.
macro_rules! bytesN {
    ( $T:ident, $N:literal, $parse:path ) => {
        #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
        pub struct $T(pub [u8; $N]);

        impl $T {
            pub const LEN: usize = $N;

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $T {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                if serializer.is_human_readable() {
                    serializer.collect_str(self)
                } else {
                    serializer.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> Deserialize<'de> for $T {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        impl FromStr for $T {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $parse(s, "from_str")
            }
        }

        impl Distribution<$T> for Standard {
            fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> $T {
                let mut bytes = [0u8; $N];
                rng.fill(&mut bytes[..]);
                $T(bytes)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self([0; $N])
            }
        }

        impl_hex_fmt!($T);
    };
}

bytesN!(Hash, 32, validate::parse_hash);
bytesN!(Address, 20, validate::parse_address);
bytesN!(Signature, 65, validate::parse_signature);

/// Root of a ledger channel without open threads and the padding leaf of the
/// thread Merkle tree.
pub const EMPTY_ROOT: Hash = Hash([0; 32]);

impl Hash {
    pub fn is_empty_root(&self) -> bool {
        *self == EMPTY_ROOT
    }
}

impl Address {
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 20]
    }
}

impl Signature {
    pub fn new(rs: &[u8; 64], v: u8) -> Self {
        let mut sig: Signature = Signature([0; 65]);
        sig.0[..64].copy_from_slice(rs);
        sig.0[64] = v;
        sig
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }
}

// Own type instead of primitive_types::U256: we need raw 32-byte big endian
// output for the packed encoding and decimal strings towards the hub.
construct_uint! {
    pub struct U256(4);
}

impl Serialize for U256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            let mut bytes = [0u8; 32];
            self.to_big_endian(&mut bytes);
            serializer.serialize_bytes(&bytes)
        }
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        validate::parse_amount(&s, "deserialize").map_err(serde::de::Error::custom)
    }
}

impl Distribution<U256> for Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> U256 {
        let buf: [u8; 32] = rng.gen();
        U256::from_big_endian(&buf)
    }
}

/// Amount held in both denominations of a channel.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Balance {
    pub eth: U256,
    pub token: U256,
}

impl Balance {
    pub const ZERO: Balance = Balance {
        eth: U256([0; 4]),
        token: U256([0; 4]),
    };

    pub fn new(eth: impl Into<U256>, token: impl Into<U256>) -> Self {
        Self {
            eth: eth.into(),
            token: token.into(),
        }
    }

    pub fn eth(eth: impl Into<U256>) -> Self {
        Self::new(eth, 0u64)
    }

    pub fn token(token: impl Into<U256>) -> Self {
        Self::new(0u64, token)
    }

    pub fn is_zero(&self) -> bool {
        self.eth.is_zero() && self.token.is_zero()
    }

    pub fn checked_add(&self, rhs: &Balance) -> Option<Balance> {
        Some(Balance {
            eth: self.eth.checked_add(rhs.eth)?,
            token: self.token.checked_add(rhs.token)?,
        })
    }

    pub fn checked_sub(&self, rhs: &Balance) -> Option<Balance> {
        Some(Balance {
            eth: self.eth.checked_sub(rhs.eth)?,
            token: self.token.checked_sub(rhs.token)?,
        })
    }

    /// True if both denominations are at least those of `other`.
    pub fn covers(&self, other: &Balance) -> bool {
        self.eth >= other.eth && self.token >= other.token
    }
}
