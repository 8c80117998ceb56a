//! Read-side types and JSON (de)serialization of ledger snapshots and keys.

#[cfg(feature = "json")]
use std::fs::File;
#[cfg(feature = "json")]
use std::path::Path;

#[cfg(feature = "json")]
use anyhow::Context;
#[cfg(feature = "json")]
use serde::de::DeserializeOwned;
#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};

use crate::asset::{Holding, Mint};
use crate::escrow::{fetch_offer, Offer, SwapTerms};
use crate::identity::Address;
use crate::ledger::Ledger;
use crate::pda::vault_address;
use crate::Result;

/// Reads a JSON-encoded file from the given `path` and deserializes into type `T`.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file cannot be opened, read, or parsed.
///
/// # Examples
///
/// ```ignore
/// # use swapcrow_core::interface::load_escrow_data;
/// # use swapcrow_core::Ledger;
///
/// let ledger: Ledger = load_escrow_data("./ledger.json").unwrap();
/// ```
#[cfg(feature = "json")]
pub fn load_escrow_data<P, T>(path: P) -> anyhow::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("loading escrow data: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parsing JSON from {:?}", path))
}

/// Writes `data` (serializable) as pretty-printed JSON to the given `path`,
/// creating parent directories as needed.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file cannot be created or data cannot be serialized.
#[cfg(feature = "json")]
pub fn save_escrow_data<P, T>(path: P, data: &T) -> anyhow::Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("creating file {:?}", path))?;
    serde_json::to_writer_pretty(file, data)
        .with_context(|| format!("serializing to JSON to {:?}", path))
}

/// Lifecycle of an offer.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowState {
    /// Record and vault exist; awaiting a taker or cancellation.
    Open,
    /// Taker paid; vault released and closed.
    Fulfilled,
    /// Owner reclaimed the vault; record closed.
    Cancelled,
}

/// An offer as shown to users: the record plus where its vault lives and
/// what it currently holds.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferView {
    pub record: Address,
    pub vault: Address,
    /// Units locked in the vault.
    pub locked: u64,
    #[cfg_attr(feature = "json", serde(flatten))]
    pub offer: Offer,
    pub state: EscrowState,
}

impl OfferView {
    /// Reads the live offer at `record`.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_offer`]; resolved offers are gone from the ledger and
    /// report [`crate::EscrowError::RecordNotFound`].
    pub fn load(ledger: &Ledger, record: &Address) -> Result<Self> {
        let offer = fetch_offer(ledger, record)?;
        let vault = vault_address(record, &offer.asset_offered)?;
        let locked = ledger
            .load::<Holding>(&vault)?
            .map_or(0, |holding| holding.amount);
        Ok(Self {
            record: *record,
            vault,
            locked,
            offer,
            state: EscrowState::Open,
        })
    }

    /// Terms a taker signs to fulfill this offer as it stands.
    pub fn terms(&self) -> SwapTerms {
        self.offer.terms(self.locked)
    }

    /// One-line summary, rendering amounts with each asset's decimals.
    pub fn summary(&self, ledger: &Ledger) -> String {
        let human = |asset: &Address, amount: u64| match ledger.load::<Mint>(asset) {
            Ok(Some(mint)) => mint.to_human(amount),
            _ => amount.to_string(),
        };
        format!(
            "{} offers {} of {} for {} of {}",
            self.offer.owner,
            human(&self.offer.asset_offered, self.locked),
            self.offer.asset_offered,
            human(&self.offer.asset_requested, self.offer.amount_requested),
            self.offer.asset_requested,
        )
    }
}
