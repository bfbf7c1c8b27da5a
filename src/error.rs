//! The single error type returned by every fallible operation.
//!
//! Instead of one type per failure site, errors carry an [ErrorKind] tag, the
//! name of the operation that produced them, a numeric status code (stable per
//! kind unless overridden) and, for on-chain failures, the transaction hash
//! so the caller can investigate independently.

use core::fmt::{self, Display};

use crate::types::Hash;

/// What went wrong, independent of where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input. Raised before any network or signing call, never
    /// worth retrying.
    Validation,
    ChannelOpen,
    ChannelUpdate,
    ChannelClose,
    ThreadOpen,
    ThreadUpdate,
    ThreadClose,
    /// A signature did not recover to a well-formed or expected address.
    InvalidSignature,
    /// An on-chain call was not broadcast or not mined.
    Contract,
    /// The channel or thread does not exist (yet). Many callers treat this as
    /// an answer rather than a failure.
    NotFound,
    /// The hub could not be reached or answered with something unusable.
    Hub,
    /// A caller supplied bound was exhausted while waiting.
    Timeout,
}

impl ErrorKind {
    pub fn default_status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 200,
            ErrorKind::Contract => 300,
            ErrorKind::NotFound => 404,
            ErrorKind::Hub => 500,
            ErrorKind::Timeout => 504,
            ErrorKind::ChannelOpen => 600,
            ErrorKind::ChannelUpdate => 601,
            ErrorKind::ChannelClose => 602,
            ErrorKind::ThreadOpen => 650,
            ErrorKind::ThreadUpdate => 651,
            ErrorKind::ThreadClose => 652,
            ErrorKind::InvalidSignature => 700,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation error",
            ErrorKind::ChannelOpen => "channel open error",
            ErrorKind::ChannelUpdate => "channel update error",
            ErrorKind::ChannelClose => "channel close error",
            ErrorKind::ThreadOpen => "thread open error",
            ErrorKind::ThreadUpdate => "thread update error",
            ErrorKind::ThreadClose => "thread close error",
            ErrorKind::InvalidSignature => "invalid signature",
            ErrorKind::Contract => "contract error",
            ErrorKind::NotFound => "not found",
            ErrorKind::Hub => "hub error",
            ErrorKind::Timeout => "timed out",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{method}: {kind} ({status_code}): {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub method: &'static str,
    pub status_code: u16,
    pub message: String,
    pub tx_hash: Option<Hash>,
}

impl Error {
    pub fn new(kind: ErrorKind, method: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            method,
            status_code: kind.default_status_code(),
            message: message.into(),
            tx_hash: None,
        }
    }

    pub fn validation(method: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, method, message)
    }

    pub fn not_found(method: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, method, message)
    }

    pub fn contract(method: &'static str, message: impl Into<String>, tx_hash: Option<Hash>) -> Self {
        Self::new(ErrorKind::Contract, method, message).with_tx_hash(tx_hash)
    }

    pub fn with_tx_hash(mut self, tx_hash: Option<Hash>) -> Self {
        self.tx_hash = tx_hash;
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Alias for `Result` using the crate wide [Error].
pub type Result<T> = core::result::Result<T, Error>;

/// Shorthand for early returns: `ensure!(cond, Kind, "method", "msg {}", x)`.
macro_rules! ensure {
    ($cond:expr, $kind:ident, $method:expr, $($msg:tt)+) => {
        if !$cond {
            return Err($crate::error::Error::new(
                $crate::error::ErrorKind::$kind,
                $method,
                format!($($msg)+),
            ));
        }
    };
}
pub(crate) use ensure;
