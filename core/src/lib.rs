/// Asset definitions (mints) and holdings
pub mod asset;
/// Program-derived addresses of records, vaults and holdings
pub mod pda;
/// Escrow state machine: Open, Fulfill, Cancel
pub mod escrow;
/// Identities of parties and accounts
pub mod identity;
/// Read-side views and JSON file helpers
pub mod interface;
/// Versioned account store and transaction overlay
pub mod ledger;
/// Well-known program ids
pub mod programs;
/// Signed transactions and their execution
pub mod transaction;
/// Checked movement of holdings
pub mod transfer;

pub mod error;
pub use error::{BindingCheck, DerivationError, EscrowError, IdentityError};

#[cfg(feature = "json")]
mod serde;

pub use asset::{Holding, Mint};
pub use escrow::{fetch_offer, Offer, OpenArgs, SwapTerms};
pub use identity::{Address, Keypair, Signature};
pub use interface::{EscrowState, OfferView};
pub use ledger::{Account, ChangeSet, Ledger, TxContext};
pub use transaction::{Instruction, Message, Receipt, Transaction};

pub type Result<T> = std::result::Result<T, EscrowError>;
