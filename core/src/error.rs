use thiserror::Error;

use crate::identity::Address;

/// Escrow-related errors.
///
/// Every variant names the account (and, where relevant, the check) that
/// rejected the transaction, so callers can tell a retryable condition from
/// a permanent rejection. See [`EscrowError::is_retryable`].
#[derive(Debug, Error, PartialEq)]
pub enum EscrowError {
    /// The transition requires a signature from `expected`.
    #[error("invalid authorization: {expected} must sign this transition")]
    InvalidAuthorization { expected: Address },

    /// No live offer record at the address (never opened, or already resolved).
    #[error("offer record {0} not found or already resolved")]
    RecordNotFound(Address),

    /// An account claiming to belong to an offer failed a binding check.
    #[error("account {account} is not bound to this offer: {check}")]
    RecordBindingMismatch {
        account: Address,
        check: BindingCheck,
    },

    #[error("insufficient balance in {account}: available {available}, required {required}")]
    InsufficientBalance {
        account: Address,
        available: u64,
        required: u64,
    },

    /// Zero amounts are never valid offer terms.
    #[error("invalid amount: {field} must be non-zero")]
    InvalidAmount { field: &'static str },

    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(Address),

    #[error("account {0} already exists")]
    AccountAlreadyExists(Address),

    #[error("address derivation failed: {0}")]
    DerivationFailed(#[from] DerivationError),

    /// Payer cannot cover the storage deposit of a new account.
    #[error("insufficient lamports in {account} for deposit: available {available}, required {required}")]
    InsufficientLamports {
        account: Address,
        available: u64,
        required: u64,
    },

    #[error("holding {account} is not the ({owner}, {asset}) holding")]
    HoldingMismatch {
        account: Address,
        owner: Address,
        asset: Address,
    },

    #[error("unknown asset {0}")]
    UnknownAsset(Address),

    #[error("decimals mismatch for asset {asset}: expected {expected}, got {actual}")]
    DecimalsMismatch {
        asset: Address,
        expected: u8,
        actual: u8,
    },

    #[error("invalid decimals: {0}")]
    InvalidDecimals(u8),

    #[error("cannot close {0}: balance is non-zero")]
    NonZeroBalance(Address),

    #[error("invalid signature for signer {0}")]
    InvalidSignature(Address),

    /// The signer has committed other transactions since this one was signed,
    /// or this very transaction was already processed.
    #[error("stale sequence for signer {signer}: expected {expected}, got {actual}")]
    StaleSequence {
        signer: Address,
        expected: u64,
        actual: u64,
    },

    /// Another transaction committed a change to this account first.
    #[error("write conflict on {0}: state changed since the transaction was prepared")]
    Conflict(Address),

    #[error("invalid account data in {0}")]
    InvalidAccountData(Address),

    #[error("identity error: {0}")]
    Identity(IdentityError),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl EscrowError {
    /// Whether resubmitting (possibly with fresh parameters such as a new
    /// nonce, or after funding an account) can succeed.
    ///
    /// `Conflict` is retryable only in the sense that the caller should
    /// re-read state: the record it targeted has most likely been resolved.
    /// `StaleSequence` is not: the signed transaction itself is spent, and
    /// only a newly signed one can go through.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_)
                | Self::AccountAlreadyExists(_)
                | Self::DerivationFailed(_)
                | Self::InsufficientBalance { .. }
                | Self::InsufficientLamports { .. }
        )
    }
}

/// Which binding check rejected an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingCheck {
    /// The account is not owned by the escrow program.
    ProgramOwner,
    /// The account data is not an offer record.
    Layout,
    /// Re-deriving from (owner, nonce, bump) does not yield the address.
    Derivation,
    /// The offer names a different owner than the one supplied.
    Owner,
    /// The vault is missing or not controlled by the record.
    Vault,
    /// The offer's terms differ from the ones the taker signed.
    Terms,
}

impl std::fmt::Display for BindingCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ProgramOwner => "not owned by the escrow program",
            Self::Layout => "not an offer record",
            Self::Derivation => "address does not derive from (owner, nonce, bump)",
            Self::Owner => "owner does not match the record",
            Self::Vault => "vault is missing or not controlled by the record",
            Self::Terms => "terms differ from the signed ones",
        };
        f.write_str(s)
    }
}

/// Errors that might occur while parsing into an [`Address`].
#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("cannot parse identity from empty string")]
    EmptyIdentity,

    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Errors from program address derivation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerivationError {
    #[error("too many seeds: {0}")]
    MaxSeedsExceeded(usize),

    #[error("seed longer than 32 bytes: {0}")]
    MaxSeedLengthExceeded(usize),

    /// The digest is a valid curve point, so it could have a private key.
    #[error("seeds produce an on-curve address")]
    OnCurve,

    #[error("no viable bump seed found")]
    NoViableBump,
}

impl From<IdentityError> for EscrowError {
    fn from(value: IdentityError) -> Self {
        Self::Identity(value)
    }
}

impl From<bincode::error::EncodeError> for EscrowError {
    fn from(value: bincode::error::EncodeError) -> Self {
        Self::Encoding(value.to_string())
    }
}
