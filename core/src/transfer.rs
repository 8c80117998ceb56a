//! Transfer adapter: checked movement of holdings inside a transaction.

use tracing::trace;

use crate::asset::{Holding, Mint};
use crate::identity::Address;
use crate::ledger::{AccountState, TxContext};
use crate::pda::holding_address;
use crate::programs::TOKEN_PROGRAM;
use crate::{EscrowError, Result};

/// A checked transfer of `amount` units of `asset`.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub asset: Address,
    /// Decimals the caller expects `asset` to have.
    pub decimals: u8,
    /// Holding being debited.
    pub source: Address,
    /// Identity (or record address) authorizing the debit.
    pub authority: Address,
    /// Identity credited; its canonical holding is created if absent.
    pub recipient: Address,
    /// Funds the deposit of the recipient holding, if it has to be created.
    pub payer: Address,
    pub amount: u64,
}

/// Loads the mint of `asset`.
pub fn load_mint(ctx: &mut TxContext<'_>, asset: &Address) -> Result<Mint> {
    ctx.load::<Mint>(asset)
        .ok()
        .flatten()
        .ok_or(EscrowError::UnknownAsset(*asset))
}

/// Loads the holding at `address`, checking that it is `owner`'s holding of `asset`.
///
/// Returns `None` if the address is vacant: no account, or only lamports.
pub fn load_holding(
    ctx: &mut TxContext<'_>,
    address: &Address,
    owner: &Address,
    asset: &Address,
) -> Result<Option<Holding>> {
    let mismatch = || EscrowError::HoldingMismatch {
        account: *address,
        owner: *owner,
        asset: *asset,
    };
    let account = match ctx.get(address) {
        Some(account) if !account.is_bare() => account,
        _ => return Ok(None),
    };
    if account.owner != TOKEN_PROGRAM {
        return Err(mismatch());
    }
    let holding = Holding::unpack(address, &account.data).map_err(|_| mismatch())?;
    if holding.owner != *owner || holding.asset != *asset {
        return Err(mismatch());
    }
    Ok(Some(holding))
}

/// Creates `owner`'s canonical holding of `asset` unless it already exists.
///
/// Idempotent; an existing holding at the canonical address must be exactly
/// that holding. Lamports sent to the address beforehand are adopted into
/// the new holding's deposit.
pub fn create_holding_if_absent(
    ctx: &mut TxContext<'_>,
    payer: &Address,
    owner: &Address,
    asset: &Address,
) -> Result<Address> {
    let address = holding_address(owner, asset)?;
    if load_holding(ctx, &address, owner, asset)?.is_none() {
        load_mint(ctx, asset)?;
        ctx.create(payer, &address, &Holding::empty(*owner, *asset))?;
        trace!(%address, %owner, %asset, "created holding");
    }
    Ok(address)
}

/// Moves `amount` from `source` into the recipient's canonical holding.
///
/// # Errors
///
/// - [`EscrowError::DecimalsMismatch`] if `decimals` is not the mint's.
/// - [`EscrowError::InvalidAuthorization`] if `authority` does not own `source`.
/// - [`EscrowError::InsufficientBalance`] if `source` holds less than `amount`.
/// - [`EscrowError::ArithmeticOverflow`] if the credit exceeds `u64::MAX`.
pub fn transfer_checked(ctx: &mut TxContext<'_>, t: &Transfer) -> Result<Address> {
    let mint = load_mint(ctx, &t.asset)?;
    if mint.decimals != t.decimals {
        return Err(EscrowError::DecimalsMismatch {
            asset: t.asset,
            expected: mint.decimals,
            actual: t.decimals,
        });
    }

    let mut source = match ctx.load::<Holding>(&t.source) {
        Ok(Some(holding)) if holding.asset == t.asset => holding,
        Ok(None) => {
            return Err(EscrowError::InsufficientBalance {
                account: t.source,
                available: 0,
                required: t.amount,
            })
        }
        _ => {
            return Err(EscrowError::HoldingMismatch {
                account: t.source,
                owner: t.authority,
                asset: t.asset,
            })
        }
    };
    if source.owner != t.authority {
        return Err(EscrowError::InvalidAuthorization {
            expected: source.owner,
        });
    }
    source.amount = source
        .amount
        .checked_sub(t.amount)
        .ok_or(EscrowError::InsufficientBalance {
            account: t.source,
            available: source.amount,
            required: t.amount,
        })?;
    ctx.store(&t.source, &source)?;

    let destination = create_holding_if_absent(ctx, &t.payer, &t.recipient, &t.asset)?;
    let mut holding = load_holding(ctx, &destination, &t.recipient, &t.asset)?
        .ok_or(EscrowError::InvalidAccountData(destination))?;
    holding.amount = holding
        .amount
        .checked_add(t.amount)
        .ok_or(EscrowError::ArithmeticOverflow(destination))?;
    ctx.store(&destination, &holding)?;

    trace!(from = %t.source, to = %destination, amount = t.amount, "transfer");
    Ok(destination)
}

/// Closes an empty holding, sending its deposit to `destination`.
pub fn close_holding(
    ctx: &mut TxContext<'_>,
    address: &Address,
    destination: &Address,
    authority: &Address,
) -> Result<u64> {
    let holding = ctx
        .load::<Holding>(address)?
        .ok_or(EscrowError::InvalidAccountData(*address))?;
    if holding.owner != *authority {
        return Err(EscrowError::InvalidAuthorization {
            expected: holding.owner,
        });
    }
    if holding.amount != 0 {
        return Err(EscrowError::NonZeroBalance(*address));
    }
    ctx.close(address, destination)
}

/// Issues `amount` new units of `asset` to `recipient`; only the mint
/// authority may do this.
pub fn mint_to(
    ctx: &mut TxContext<'_>,
    asset: &Address,
    authority: &Address,
    recipient: &Address,
    payer: &Address,
    amount: u64,
) -> Result<Address> {
    let mut mint = load_mint(ctx, asset)?;
    if mint.authority != *authority {
        return Err(EscrowError::InvalidAuthorization {
            expected: mint.authority,
        });
    }
    mint.supply = mint
        .supply
        .checked_add(amount)
        .ok_or(EscrowError::ArithmeticOverflow(*asset))?;
    ctx.store(asset, &mint)?;

    let destination = create_holding_if_absent(ctx, payer, recipient, asset)?;
    let mut holding = load_holding(ctx, &destination, recipient, asset)?
        .ok_or(EscrowError::InvalidAccountData(destination))?;
    holding.amount = holding
        .amount
        .checked_add(amount)
        .ok_or(EscrowError::ArithmeticOverflow(destination))?;
    ctx.store(&destination, &holding)?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;
    use crate::ledger::{rent_exempt_minimum, Account, Ledger};

    fn addr(n: u8) -> Address {
        Keypair::from_seed([n; 32]).address()
    }

    // alice holds 100 units of a 6-decimal asset; both parties have lamports
    fn setup() -> (Ledger, Address, Address, Address) {
        let (alice, bob, asset) = (addr(1), addr(2), addr(3));
        let mut ledger = Ledger::new();
        ledger.airdrop(&alice, 10_000_000).unwrap();
        ledger.airdrop(&bob, 10_000_000).unwrap();
        ledger.create_mint(&asset, &alice, 6).unwrap();
        ledger.mint_to(&asset, &alice, &alice, 100).unwrap();
        (ledger, alice, bob, asset)
    }

    fn transfer(from: Address, to: Address, asset: Address, amount: u64) -> Transfer {
        Transfer {
            asset,
            decimals: 6,
            source: holding_address(&from, &asset).unwrap(),
            authority: from,
            recipient: to,
            payer: to,
            amount,
        }
    }

    #[test]
    fn transfer_creates_recipient_holding() {
        let (mut ledger, alice, bob, asset) = setup();
        let bob_lamports = ledger.lamports(&bob);

        let mut ctx = ledger.begin();
        let dest = transfer_checked(&mut ctx, &transfer(alice, bob, asset, 40)).unwrap();
        let changes = ctx.into_changes();
        ledger.commit(changes).unwrap();

        assert_eq!(dest, holding_address(&bob, &asset).unwrap());
        assert_eq!(ledger.holding_balance(&alice, &asset), Some(60));
        assert_eq!(ledger.holding_balance(&bob, &asset), Some(40));
        assert_eq!(
            ledger.lamports(&bob),
            bob_lamports - rent_exempt_minimum(Holding::SPACE)
        );
    }

    #[test]
    fn transfer_rejects_insufficient_balance() {
        let (ledger, alice, bob, asset) = setup();
        let mut ctx = ledger.begin();
        assert_eq!(
            transfer_checked(&mut ctx, &transfer(alice, bob, asset, 101)),
            Err(EscrowError::InsufficientBalance {
                account: holding_address(&alice, &asset).unwrap(),
                available: 100,
                required: 101,
            })
        );
        // bob has no holding at all
        assert!(matches!(
            transfer_checked(&mut ctx, &transfer(bob, alice, asset, 1)),
            Err(EscrowError::InsufficientBalance { available: 0, .. })
        ));
    }

    #[test]
    fn transfer_rejects_wrong_authority_and_decimals() {
        let (ledger, alice, bob, asset) = setup();
        let mut ctx = ledger.begin();

        let mut t = transfer(alice, bob, asset, 1);
        t.authority = bob;
        assert_eq!(
            transfer_checked(&mut ctx, &t),
            Err(EscrowError::InvalidAuthorization { expected: alice })
        );

        let mut t = transfer(alice, bob, asset, 1);
        t.decimals = 9;
        assert!(matches!(
            transfer_checked(&mut ctx, &t),
            Err(EscrowError::DecimalsMismatch { expected: 6, actual: 9, .. })
        ));
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let (mut ledger, alice, bob, asset) = setup();
        // only reachable with a corrupted ledger: supply caps every holding
        let bob_holding = holding_address(&bob, &asset).unwrap();
        let full = Holding {
            asset,
            owner: bob,
            amount: u64::MAX,
        };
        ledger.insert_account(
            bob_holding,
            Account {
                lamports: rent_exempt_minimum(Holding::SPACE),
                owner: TOKEN_PROGRAM,
                data: full.pack().unwrap(),
            },
        );
        let mut ctx = ledger.begin();
        assert_eq!(
            transfer_checked(&mut ctx, &transfer(alice, bob, asset, 1)),
            Err(EscrowError::ArithmeticOverflow(bob_holding))
        );
    }

    #[test]
    fn supply_overflow_is_rejected() {
        let (ledger, alice, _, asset) = setup();
        let mut ctx = ledger.begin();
        assert_eq!(
            mint_to(&mut ctx, &asset, &alice, &alice, &alice, u64::MAX),
            Err(EscrowError::ArithmeticOverflow(asset))
        );
    }

    #[test]
    fn self_transfer_is_a_no_op() {
        let (mut ledger, alice, _, asset) = setup();
        let mut ctx = ledger.begin();
        transfer_checked(&mut ctx, &transfer(alice, alice, asset, 30)).unwrap();
        let changes = ctx.into_changes();
        ledger.commit(changes).unwrap();
        assert_eq!(ledger.holding_balance(&alice, &asset), Some(100));
    }

    #[test]
    fn lamports_at_holding_address_are_adopted() {
        let (mut ledger, alice, bob, asset) = setup();
        let dusted = holding_address(&bob, &asset).unwrap();
        ledger.airdrop(&dusted, 1).unwrap();
        let bob_lamports = ledger.lamports(&bob);

        let mut ctx = ledger.begin();
        assert_eq!(load_holding(&mut ctx, &dusted, &bob, &asset), Ok(None));
        transfer_checked(&mut ctx, &transfer(alice, bob, asset, 1)).unwrap();
        let changes = ctx.into_changes();
        ledger.commit(changes).unwrap();

        assert_eq!(ledger.holding_balance(&bob, &asset), Some(1));
        assert_eq!(ledger.lamports(&dusted), rent_exempt_minimum(Holding::SPACE));
        assert_eq!(
            ledger.lamports(&bob),
            bob_lamports - rent_exempt_minimum(Holding::SPACE) + 1
        );
    }

    #[test]
    fn foreign_account_at_holding_address_is_rejected() {
        let (mut ledger, alice, bob, asset) = setup();
        // alice's holding state planted at bob's canonical address
        let squat = holding_address(&bob, &asset).unwrap();
        ledger.insert_account(
            squat,
            Account {
                lamports: rent_exempt_minimum(Holding::SPACE),
                owner: TOKEN_PROGRAM,
                data: Holding::empty(alice, asset).pack().unwrap(),
            },
        );

        let mut ctx = ledger.begin();
        assert_eq!(
            transfer_checked(&mut ctx, &transfer(alice, bob, asset, 1)),
            Err(EscrowError::HoldingMismatch {
                account: squat,
                owner: bob,
                asset,
            })
        );
    }

    #[test]
    fn close_requires_empty_holding() {
        let (ledger, alice, bob, asset) = setup();
        let holding = holding_address(&alice, &asset).unwrap();
        let mut ctx = ledger.begin();
        assert_eq!(
            close_holding(&mut ctx, &holding, &alice, &alice),
            Err(EscrowError::NonZeroBalance(holding))
        );
        assert_eq!(
            close_holding(&mut ctx, &holding, &bob, &bob),
            Err(EscrowError::InvalidAuthorization { expected: alice })
        );
    }

    #[test]
    fn only_mint_authority_issues() {
        let (ledger, alice, bob, asset) = setup();
        let mut ctx = ledger.begin();
        assert_eq!(
            mint_to(&mut ctx, &asset, &bob, &bob, &bob, 1),
            Err(EscrowError::InvalidAuthorization { expected: alice })
        );
    }
}
