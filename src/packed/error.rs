//! Error type and Return values used by the packed Serializer.

use serde::ser;

/// Represents all possible errors that can happen during Serialization.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The struct contains a type that has no fixed-width Solidity
    /// counterpart in tightly packed encoding.
    ///
    /// For example floating point numbers, options, enums and maps. Instead of
    /// guessing a representation (which the on-chain verifier would then have
    /// to guess in the same way) we refuse to encode them.
    #[error("type is not representable in packed encoding: {0}")]
    TypeNotRepresentable(&'static str),
    /// Representable in Solidity, but not implemented by this Serializer
    /// (currently only used for sequences, which Solidity pads per element).
    #[error("type is not yet implemented: {0}")]
    TypeNotYetSupported(&'static str),
    /// Raised by a `Serialize` implementation through [ser::Error::custom].
    #[error("{0}")]
    Custom(String),
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: core::fmt::Display,
    {
        Error::Custom(msg.to_string())
    }
}

/// Alias for `Result` using the [Error] returned by the Serializer.
pub type Result<T> = core::result::Result<T, Error>;
