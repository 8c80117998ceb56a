use swapcrow_core::{EscrowError, IdentityError};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Escrow error: {0}")]
    Escrow(#[from] EscrowError),
    #[error("Keypair error: {0}")]
    Keypair(String),
    #[error("No keypair named {0:?}")]
    UnknownKey(String),
    #[error("Invalid address: {0}")]
    Address(#[from] IdentityError),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for ClientError {
    fn from(value: anyhow::Error) -> Self {
        Self::Storage(format!("{value:#}"))
    }
}
