//! Escrow state machine: Open, Fulfill and Cancel.
//!
//! An offer lives at the program-derived address of `(owner, nonce)` and
//! controls a vault, the record's own holding of the offered asset. Open
//! creates both; Fulfill and Cancel each empty the vault, close it and
//! retire the record, so exactly one of them can ever succeed per offer.
//! Every transition runs inside a single [`TxContext`], which is committed
//! as a whole or not at all.

use bincode::{Decode, Encode};
#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::asset::Holding;
use crate::error::BindingCheck;
use crate::identity::Address;
use crate::ledger::{AccountState, Ledger, TxContext};
use crate::pda::{holding_address, record_address, vault_address, verify_record_address};
use crate::programs::ESCROW_PROGRAM;
use crate::transfer::{self, load_holding, load_mint, Transfer};
use crate::{EscrowError, Result};

/// Persisted state of one open offer.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Offer {
    /// Maker who opened the offer.
    pub owner: Address,
    /// Distinguishes simultaneous offers of the same owner.
    pub nonce: u64,
    /// Asset locked in the vault.
    pub asset_offered: Address,
    /// Asset the owner wants in return.
    pub asset_requested: Address,
    /// Units of `asset_requested` a taker must pay.
    pub amount_requested: u64,
    /// Bump that re-derives the record address from `(owner, nonce)`.
    pub bump: u8,
    /// Identity that funded the record and vault deposits; receives them back.
    pub rent_payer: Address,
}

impl AccountState for Offer {
    const DISCRIMINATOR: u8 = 1;
    const SPACE: usize = 1 + 32 + 8 + 32 + 32 + 8 + 1 + 32;
    const PROGRAM: Address = ESCROW_PROGRAM;
}

/// Terms of a new offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct OpenArgs {
    pub nonce: u64,
    pub asset_offered: Address,
    pub asset_requested: Address,
    pub amount_requested: u64,
    pub amount_offered: u64,
}

/// What a taker agrees to when fulfilling: the vault it receives and the price it pays.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct SwapTerms {
    pub asset_offered: Address,
    pub amount_offered: u64,
    pub asset_requested: Address,
    pub amount_requested: u64,
}

impl Offer {
    /// Terms of this offer with `locked` units in its vault.
    pub fn terms(&self, locked: u64) -> SwapTerms {
        SwapTerms {
            asset_offered: self.asset_offered,
            amount_offered: locked,
            asset_requested: self.asset_requested,
            amount_requested: self.amount_requested,
        }
    }
}

/// Identities whose signatures were verified for the current transaction.
#[derive(Debug, Clone, Copy)]
pub struct Signers<'a>(pub &'a [Address]);

impl Signers<'_> {
    pub fn require(&self, who: &Address) -> Result<()> {
        if self.0.contains(who) {
            Ok(())
        } else {
            Err(EscrowError::InvalidAuthorization { expected: *who })
        }
    }
}

/// Opens an offer: creates the record and vault and locks `amount_offered`.
///
/// `payer` funds both deposits and is recorded as the refund target.
///
/// # Errors
///
/// - [`EscrowError::InvalidAmount`] for a zero amount.
/// - [`EscrowError::AccountAlreadyExists`] if `(owner, nonce)` already has a record.
/// - [`EscrowError::InsufficientBalance`] if the owner cannot fund the vault.
pub fn open(
    ctx: &mut TxContext<'_>,
    signers: Signers<'_>,
    owner: &Address,
    payer: &Address,
    args: &OpenArgs,
) -> Result<Address> {
    signers.require(owner)?;
    signers.require(payer)?;
    if args.amount_offered == 0 {
        return Err(EscrowError::InvalidAmount {
            field: "amount_offered",
        });
    }
    if args.amount_requested == 0 {
        return Err(EscrowError::InvalidAmount {
            field: "amount_requested",
        });
    }
    let offered = load_mint(ctx, &args.asset_offered)?;
    load_mint(ctx, &args.asset_requested)?;

    let (record, bump) = record_address(owner, args.nonce)?;
    if !ctx.is_vacant(&record) {
        return Err(EscrowError::AccountAlreadyExists(record));
    }
    let vault = vault_address(&record, &args.asset_offered)?;
    if !ctx.is_vacant(&vault) {
        return Err(EscrowError::AccountAlreadyExists(vault));
    }

    let source = holding_address(owner, &args.asset_offered)?;
    let available = load_holding(ctx, &source, owner, &args.asset_offered)?
        .map_or(0, |h| h.amount);
    if available < args.amount_offered {
        return Err(EscrowError::InsufficientBalance {
            account: source,
            available,
            required: args.amount_offered,
        });
    }

    let offer = Offer {
        owner: *owner,
        nonce: args.nonce,
        asset_offered: args.asset_offered,
        asset_requested: args.asset_requested,
        amount_requested: args.amount_requested,
        bump,
        rent_payer: *payer,
    };
    ctx.create(payer, &record, &offer)?;
    ctx.create(payer, &vault, &Holding::empty(record, args.asset_offered))?;

    transfer::transfer_checked(
        ctx,
        &Transfer {
            asset: args.asset_offered,
            decimals: offered.decimals,
            source,
            authority: *owner,
            recipient: record,
            payer: *payer,
            amount: args.amount_offered,
        },
    )?;

    info!(
        %record, %owner, nonce = args.nonce,
        amount_offered = args.amount_offered,
        amount_requested = args.amount_requested,
        "offer opened"
    );
    Ok(record)
}

/// Fulfills the offer at `record`: pays the owner and releases the vault to `taker`.
///
/// # Errors
///
/// - [`EscrowError::RecordNotFound`] if the record is absent or already resolved.
/// - [`EscrowError::RecordBindingMismatch`] if the record or vault fails a
///   binding check, including a record that belongs to another owner or
///   whose terms differ from `terms`.
/// - [`EscrowError::InsufficientBalance`] if the taker cannot pay.
pub fn fulfill(
    ctx: &mut TxContext<'_>,
    signers: Signers<'_>,
    taker: &Address,
    owner: &Address,
    record: &Address,
    terms: &SwapTerms,
) -> Result<()> {
    signers.require(taker)?;
    let (offer, vault, locked) = load_bound_offer(ctx, record)?;
    if offer.owner != *owner {
        return Err(EscrowError::RecordBindingMismatch {
            account: *record,
            check: BindingCheck::Owner,
        });
    }
    // the address of a resolved offer can be reopened with other terms
    if offer.terms(locked.amount) != *terms {
        return Err(EscrowError::RecordBindingMismatch {
            account: *record,
            check: BindingCheck::Terms,
        });
    }
    let requested = load_mint(ctx, &offer.asset_requested)?;
    let offered = load_mint(ctx, &offer.asset_offered)?;

    let payment = holding_address(taker, &offer.asset_requested)?;
    transfer::transfer_checked(
        ctx,
        &Transfer {
            asset: offer.asset_requested,
            decimals: requested.decimals,
            source: payment,
            authority: *taker,
            recipient: offer.owner,
            payer: *taker,
            amount: offer.amount_requested,
        },
    )?;
    debug!(%record, %taker, amount = offer.amount_requested, "taker paid owner");

    release(ctx, record, &vault, &offer, &locked, offered.decimals, taker, taker)?;

    info!(%record, %owner, %taker, released = locked.amount, "offer fulfilled");
    Ok(())
}

/// Cancels the offer at `record`, returning the vault to its owner.
///
/// # Errors
///
/// - [`EscrowError::RecordNotFound`] if the record is absent or already resolved.
/// - [`EscrowError::InvalidAuthorization`] if `owner` did not open the offer.
pub fn cancel(
    ctx: &mut TxContext<'_>,
    signers: Signers<'_>,
    owner: &Address,
    record: &Address,
) -> Result<()> {
    signers.require(owner)?;
    let (offer, vault, locked) = load_bound_offer(ctx, record)?;
    if offer.owner != *owner {
        return Err(EscrowError::InvalidAuthorization {
            expected: offer.owner,
        });
    }
    let offered = load_mint(ctx, &offer.asset_offered)?;

    // the owner's holding may have been closed since Open; the record deposit
    // is refunded before it is re-created
    release(
        ctx,
        record,
        &vault,
        &offer,
        &locked,
        offered.decimals,
        &offer.owner,
        &offer.owner,
    )?;

    info!(%record, %owner, refunded = locked.amount, "offer cancelled");
    Ok(())
}

/// Reads the offer at `record` without modifying anything.
pub fn fetch_offer(ledger: &Ledger, record: &Address) -> Result<Offer> {
    let mut ctx = ledger.begin();
    load_bound_offer(&mut ctx, record).map(|(offer, _, _)| offer)
}

/// Loads the record at `address` and its vault, verifying that the record
/// is a genuine escrow account for its stored `(owner, nonce, bump)` and that
/// the vault is controlled by it.
fn load_bound_offer(
    ctx: &mut TxContext<'_>,
    address: &Address,
) -> Result<(Offer, Address, Holding)> {
    let mismatch = |account: &Address, check| EscrowError::RecordBindingMismatch {
        account: *account,
        check,
    };
    let Some(account) = ctx.get(address) else {
        return Err(EscrowError::RecordNotFound(*address));
    };
    if account.owner != ESCROW_PROGRAM {
        return Err(mismatch(address, BindingCheck::ProgramOwner));
    }
    let offer =
        Offer::unpack(address, &account.data).map_err(|_| mismatch(address, BindingCheck::Layout))?;
    if !verify_record_address(&offer.owner, offer.nonce, offer.bump, address) {
        return Err(mismatch(address, BindingCheck::Derivation));
    }

    let vault = vault_address(address, &offer.asset_offered)?;
    let locked = load_holding(ctx, &vault, address, &offer.asset_offered)
        .ok()
        .flatten()
        .ok_or_else(|| mismatch(&vault, BindingCheck::Vault))?;
    Ok((offer, vault, locked))
}

// Retires the record, moves the vault to `recipient` and closes it. Both
// deposits go back to the rent payer; `payer` funds a missing recipient holding.
#[allow(clippy::too_many_arguments)]
fn release(
    ctx: &mut TxContext<'_>,
    record: &Address,
    vault: &Address,
    offer: &Offer,
    locked: &Holding,
    decimals: u8,
    recipient: &Address,
    payer: &Address,
) -> Result<()> {
    let record_deposit = ctx.close(record, &offer.rent_payer)?;
    transfer::transfer_checked(
        ctx,
        &Transfer {
            asset: offer.asset_offered,
            decimals,
            source: *vault,
            authority: *record,
            recipient: *recipient,
            payer: *payer,
            amount: locked.amount,
        },
    )?;
    let vault_deposit = transfer::close_holding(ctx, vault, &offer.rent_payer, record)?;
    debug!(
        %record, rent_payer = %offer.rent_payer,
        refunded = vault_deposit.saturating_add(record_deposit),
        "record and vault closed"
    );
    Ok(())
}
