//! The keyed account store that hosts offers, vaults and holdings.
//!
//! Transactions never mutate the [`Ledger`] directly. They run against a
//! [`TxContext`] overlay that reads through to a snapshot and buffers writes;
//! the resulting [`ChangeSet`] carries the version of every account the
//! transaction touched and [`Ledger::commit`] applies it only if none of those
//! versions moved in the meantime. A failed transaction is simply dropped.
//!
//! Versions are never forgotten, not even when an account is closed: a change
//! set that saw an address empty must not commit after something was created
//! and closed there again. The version map therefore grows with every address
//! ever written.

use std::collections::BTreeMap;

use bincode::{Decode, Encode};
#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};

use crate::asset::{Holding, Mint};
use crate::identity::Address;
use crate::pda::holding_address;
use crate::programs::SYSTEM_PROGRAM;
use crate::{transfer, EscrowError, Result};

/// Per-account storage overhead, in bytes, charged on top of the data length.
pub const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;
pub const LAMPORTS_PER_BYTE_YEAR: u64 = 3_480;
pub const EXEMPTION_THRESHOLD_YEARS: u64 = 2;

/// Deposit required to keep an account with `data_len` bytes alive.
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (ACCOUNT_STORAGE_OVERHEAD + data_len as u64)
        * LAMPORTS_PER_BYTE_YEAR
        * EXEMPTION_THRESHOLD_YEARS
}

/// A single ledger account.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    /// Native balance; for program accounts this is the storage deposit.
    pub lamports: u64,
    /// Program allowed to modify `data`.
    pub owner: Address,
    #[cfg_attr(feature = "json", serde(with = "hex::serde"))]
    pub data: Vec<u8>,
}

impl Account {
    /// A plain identity (wallet) account.
    pub fn system(lamports: u64) -> Self {
        Self {
            lamports,
            owner: SYSTEM_PROGRAM,
            data: Vec::new(),
        }
    }

    /// Holds nothing but lamports.
    pub fn is_bare(&self) -> bool {
        self.owner == SYSTEM_PROGRAM && self.data.is_empty()
    }
}

fn layout() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Typed state stored in a program-owned account.
///
/// Layout is a one-byte discriminator followed by the fixed-width bincode
/// encoding of the state.
pub trait AccountState: Encode + Decode<()> + Sized {
    const DISCRIMINATOR: u8;
    /// Encoded length, discriminator included.
    const SPACE: usize;
    /// Program owning accounts of this type.
    const PROGRAM: Address;

    fn pack(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(Self::SPACE);
        data.push(Self::DISCRIMINATOR);
        data.extend(bincode::encode_to_vec(self, layout())?);
        Ok(data)
    }

    fn unpack(address: &Address, data: &[u8]) -> Result<Self> {
        let invalid = || EscrowError::InvalidAccountData(*address);
        match data.split_first() {
            Some((disc, rest)) if *disc == Self::DISCRIMINATOR && data.len() == Self::SPACE => {
                let (state, _) = bincode::decode_from_slice(rest, layout()).map_err(|_| invalid())?;
                Ok(state)
            }
            _ => Err(invalid()),
        }
    }

    /// Decodes `account`, requiring it to be owned by [`Self::PROGRAM`].
    fn from_account(address: &Address, account: &Account) -> Result<Self> {
        if account.owner != Self::PROGRAM {
            return Err(EscrowError::InvalidAccountData(*address));
        }
        Self::unpack(address, &account.data)
    }
}

/// In-memory ledger: `Address -> Account`, a per-key version counter and
/// the next expected sequence number of every signer.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    accounts: BTreeMap<Address, Account>,
    /// Kept for closed accounts too; see the module docs.
    versions: BTreeMap<Address, u64>,
    #[cfg_attr(feature = "json", serde(default))]
    sequences: BTreeMap<Address, u64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Lamports held at `address`; zero if absent.
    pub fn lamports(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.lamports)
    }

    /// Sum of all lamports. Transactions never create or destroy lamports.
    pub fn total_lamports(&self) -> u128 {
        self.accounts.values().map(|a| a.lamports as u128).sum()
    }

    /// Monotonic write counter of `address`.
    ///
    /// Survives account deletion, so an address that was created and closed
    /// again never returns to the version an earlier change set observed.
    pub fn version(&self, address: &Address) -> u64 {
        self.versions.get(address).copied().unwrap_or(0)
    }

    /// Sequence number the next transaction signed by `signer` must carry.
    pub fn sequence(&self, signer: &Address) -> u64 {
        self.sequences.get(signer).copied().unwrap_or(0)
    }

    /// Decodes the typed state at `address`.
    pub fn load<T: AccountState>(&self, address: &Address) -> Result<Option<T>> {
        self.accounts
            .get(address)
            .map(|account| T::from_account(address, account))
            .transpose()
    }

    /// Writes `account` outside of any transaction (genesis and tooling only).
    pub fn insert_account(&mut self, address: Address, account: Account) {
        *self.versions.entry(address).or_insert(0) += 1;
        self.accounts.insert(address, account);
    }

    /// Faucet: credits `lamports` to `to`, creating an identity account if needed.
    pub fn airdrop(&mut self, to: &Address, lamports: u64) -> Result<()> {
        let mut ctx = self.begin();
        ctx.credit_lamports(to, lamports)?;
        let changes = ctx.into_changes();
        self.commit(changes)
    }

    /// Opens a transaction overlay over the current state.
    pub fn begin(&self) -> TxContext<'_> {
        TxContext {
            base: self,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Applies `changes` atomically, or nothing at all if any touched
    /// account was modified after the change set was prepared.
    ///
    /// # Errors
    ///
    /// [`EscrowError::Conflict`] naming the first stale account or signer.
    pub fn commit(&mut self, changes: ChangeSet) -> Result<()> {
        if let Some((address, _)) = changes
            .reads
            .iter()
            .find(|(address, seen)| self.version(address) != **seen)
        {
            return Err(EscrowError::Conflict(*address));
        }
        if let Some((signer, _)) = changes
            .sequences
            .iter()
            .find(|(signer, seen)| self.sequence(signer) != **seen)
        {
            return Err(EscrowError::Conflict(*signer));
        }
        for (signer, seen) in changes.sequences {
            self.sequences.insert(signer, seen.saturating_add(1));
        }
        for (address, account) in changes.writes {
            *self.versions.entry(address).or_insert(0) += 1;
            match account {
                Some(account) => self.accounts.insert(address, account),
                None => self.accounts.remove(&address),
            };
        }
        Ok(())
    }
}

/// Genesis and query helpers for assets.
impl Ledger {
    /// Registers a new asset at `asset` (deposit funded by the faucet).
    pub fn create_mint(
        &mut self,
        asset: &Address,
        authority: &Address,
        decimals: u8,
    ) -> Result<()> {
        let mut ctx = self.begin();
        if ctx.exists(asset) {
            return Err(EscrowError::AccountAlreadyExists(*asset));
        }
        let mint = Mint::new(*authority, decimals)?;
        ctx.set(
            asset,
            Account {
                lamports: rent_exempt_minimum(Mint::SPACE),
                owner: Mint::PROGRAM,
                data: mint.pack()?,
            },
        );
        let changes = ctx.into_changes();
        self.commit(changes)
    }

    /// Issues `amount` units of `asset` to `recipient`. If the recipient has
    /// no holding yet, the faucet funds its deposit.
    pub fn mint_to(
        &mut self,
        asset: &Address,
        authority: &Address,
        recipient: &Address,
        amount: u64,
    ) -> Result<()> {
        let mut ctx = self.begin();
        let holding = holding_address(recipient, asset)?;
        if ctx.is_vacant(&holding) {
            ctx.credit_lamports(recipient, rent_exempt_minimum(Holding::SPACE))?;
        }
        transfer::mint_to(&mut ctx, asset, authority, recipient, recipient, amount)?;
        let changes = ctx.into_changes();
        self.commit(changes)
    }

    pub fn mint(&self, asset: &Address) -> Option<Mint> {
        self.load::<Mint>(asset).ok().flatten()
    }

    /// Balance of `owner`'s canonical holding of `asset`, `None` if it does not exist.
    pub fn holding_balance(&self, owner: &Address, asset: &Address) -> Option<u64> {
        let address = holding_address(owner, asset).ok()?;
        self.load::<Holding>(&address).ok().flatten().map(|h| h.amount)
    }
}

/// Buffered writes plus the versions they were computed against.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    reads: BTreeMap<Address, u64>,
    writes: BTreeMap<Address, Option<Account>>,
    sequences: BTreeMap<Address, u64>,
}

impl ChangeSet {
    /// Consumes sequence number `seen` of `signer` when this change set commits.
    pub fn advance_sequence(&mut self, signer: &Address, seen: u64) {
        self.sequences.insert(*signer, seen);
    }
}

/// Read-through, write-buffering view of a [`Ledger`] for one transaction.
pub struct TxContext<'a> {
    base: &'a Ledger,
    reads: BTreeMap<Address, u64>,
    writes: BTreeMap<Address, Option<Account>>,
}

impl TxContext<'_> {
    fn touch(&mut self, address: &Address) {
        let base = self.base;
        self.reads
            .entry(*address)
            .or_insert_with(|| base.version(address));
    }

    pub fn get(&mut self, address: &Address) -> Option<Account> {
        self.touch(address);
        match self.writes.get(address) {
            Some(pending) => pending.clone(),
            None => self.base.accounts.get(address).cloned(),
        }
    }

    pub fn exists(&mut self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    /// Whether a program account can be created at `address`: nothing lives
    /// there, or only lamports sent to it by anyone.
    pub fn is_vacant(&mut self, address: &Address) -> bool {
        self.get(address).map_or(true, |account| account.is_bare())
    }

    pub fn set(&mut self, address: &Address, account: Account) {
        self.touch(address);
        self.writes.insert(*address, Some(account));
    }

    fn delete(&mut self, address: &Address) {
        self.touch(address);
        self.writes.insert(*address, None);
    }

    /// Typed state at `address`, `None` if the account does not exist.
    pub fn load<T: AccountState>(&mut self, address: &Address) -> Result<Option<T>> {
        self.get(address)
            .map(|account| T::from_account(address, &account))
            .transpose()
    }

    /// Overwrites the state of an existing account, keeping its lamports.
    pub fn store<T: AccountState>(&mut self, address: &Address, state: &T) -> Result<()> {
        let mut account = self
            .get(address)
            .ok_or(EscrowError::InvalidAccountData(*address))?;
        account.data = state.pack()?;
        self.set(address, account);
        Ok(())
    }

    /// Creates a program account at `address`, funding its deposit from `payer`.
    ///
    /// Lamports already sitting at a vacant `address` are kept and count
    /// towards the deposit; `payer` only covers the shortfall.
    ///
    /// # Errors
    ///
    /// [`EscrowError::AccountAlreadyExists`] if `address` is not vacant;
    /// [`EscrowError::InsufficientLamports`] if `payer` cannot cover the deposit.
    pub fn create<T: AccountState>(
        &mut self,
        payer: &Address,
        address: &Address,
        state: &T,
    ) -> Result<()> {
        let present = match self.get(address) {
            None => 0,
            Some(account) if account.is_bare() => account.lamports,
            Some(_) => return Err(EscrowError::AccountAlreadyExists(*address)),
        };
        let deposit = rent_exempt_minimum(T::SPACE);
        let shortfall = deposit.saturating_sub(present);
        if shortfall > 0 {
            self.debit_lamports(payer, shortfall)?;
        }
        self.set(
            address,
            Account {
                lamports: present + shortfall,
                owner: T::PROGRAM,
                data: state.pack()?,
            },
        );
        Ok(())
    }

    /// Removes `address`, moving all of its lamports to `destination`.
    pub fn close(&mut self, address: &Address, destination: &Address) -> Result<u64> {
        if address == destination {
            return Err(EscrowError::InvalidAccountData(*address));
        }
        let account = self
            .get(address)
            .ok_or(EscrowError::InvalidAccountData(*address))?;
        self.credit_lamports(destination, account.lamports)?;
        self.delete(address);
        Ok(account.lamports)
    }

    pub fn debit_lamports(&mut self, address: &Address, lamports: u64) -> Result<()> {
        let insufficient = |available| EscrowError::InsufficientLamports {
            account: *address,
            available,
            required: lamports,
        };
        let mut account = self.get(address).ok_or_else(|| insufficient(0))?;
        account.lamports = account
            .lamports
            .checked_sub(lamports)
            .ok_or_else(|| insufficient(account.lamports))?;
        self.set(address, account);
        Ok(())
    }

    /// Credits `lamports`, creating an identity account at `address` if absent.
    pub fn credit_lamports(&mut self, address: &Address, lamports: u64) -> Result<()> {
        let mut account = self.get(address).unwrap_or_else(|| Account::system(0));
        account.lamports = account
            .lamports
            .checked_add(lamports)
            .ok_or(EscrowError::ArithmeticOverflow(*address))?;
        self.set(address, account);
        Ok(())
    }

    pub fn into_changes(self) -> ChangeSet {
        ChangeSet {
            reads: self.reads,
            writes: self.writes,
            sequences: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    fn addr(n: u8) -> Address {
        Keypair::from_seed([n; 32]).address()
    }

    #[test]
    fn rent_grows_with_size() {
        assert_eq!(rent_exempt_minimum(0), 128 * 3_480 * 2);
        assert!(rent_exempt_minimum(165) > rent_exempt_minimum(82));
    }

    #[test]
    fn uncommitted_changes_are_invisible() {
        let mut ledger = Ledger::new();
        ledger.airdrop(&addr(1), 1_000).unwrap();

        let before = ledger.clone();
        let mut ctx = ledger.begin();
        ctx.debit_lamports(&addr(1), 400).unwrap();
        ctx.credit_lamports(&addr(2), 400).unwrap();
        assert_eq!(ctx.get(&addr(1)).unwrap().lamports, 600);
        drop(ctx);

        assert_eq!(ledger, before);
    }

    #[test]
    fn commit_applies_and_bumps_versions() {
        let mut ledger = Ledger::new();
        ledger.airdrop(&addr(1), 1_000).unwrap();
        assert_eq!(ledger.version(&addr(1)), 1);

        let mut ctx = ledger.begin();
        ctx.debit_lamports(&addr(1), 400).unwrap();
        ctx.credit_lamports(&addr(2), 400).unwrap();
        let changes = ctx.into_changes();
        ledger.commit(changes).unwrap();

        assert_eq!(ledger.lamports(&addr(1)), 600);
        assert_eq!(ledger.lamports(&addr(2)), 400);
        assert_eq!(ledger.version(&addr(1)), 2);
        assert_eq!(ledger.total_lamports(), 1_000);
    }

    #[test]
    fn stale_change_set_conflicts() {
        let mut ledger = Ledger::new();
        ledger.airdrop(&addr(1), 1_000).unwrap();

        let first = {
            let mut ctx = ledger.begin();
            ctx.debit_lamports(&addr(1), 1_000).unwrap();
            ctx.credit_lamports(&addr(2), 1_000).unwrap();
            ctx.into_changes()
        };
        let second = {
            let mut ctx = ledger.begin();
            ctx.debit_lamports(&addr(1), 1_000).unwrap();
            ctx.credit_lamports(&addr(3), 1_000).unwrap();
            ctx.into_changes()
        };

        ledger.commit(first).unwrap();
        let after_first = ledger.clone();
        assert_eq!(ledger.commit(second), Err(EscrowError::Conflict(addr(1))));
        assert_eq!(ledger, after_first);
    }

    #[test]
    fn closed_address_keeps_its_version() {
        let mut ledger = Ledger::new();
        let stale = {
            let mut ctx = ledger.begin();
            assert!(!ctx.exists(&addr(1)));
            ctx.credit_lamports(&addr(2), 5).unwrap();
            ctx.into_changes()
        };

        ledger.airdrop(&addr(1), 10).unwrap();
        let mut ctx = ledger.begin();
        ctx.close(&addr(1), &addr(3)).unwrap();
        let changes = ctx.into_changes();
        ledger.commit(changes).unwrap();

        assert!(ledger.account(&addr(1)).is_none());
        assert_eq!(ledger.version(&addr(1)), 2);
        assert_eq!(ledger.commit(stale), Err(EscrowError::Conflict(addr(1))));
    }

    #[test]
    fn sequences_advance_once() {
        let mut ledger = Ledger::new();
        let prepare = |ledger: &Ledger| {
            let mut changes = ledger.begin().into_changes();
            changes.advance_sequence(&addr(1), ledger.sequence(&addr(1)));
            changes
        };
        let first = prepare(&ledger);
        let second = prepare(&ledger);

        ledger.commit(first).unwrap();
        assert_eq!(ledger.sequence(&addr(1)), 1);
        assert_eq!(ledger.commit(second), Err(EscrowError::Conflict(addr(1))));
        assert_eq!(ledger.sequence(&addr(1)), 1);
    }

    #[test]
    fn create_adopts_lamports_at_a_vacant_address() {
        let mut ledger = Ledger::new();
        let owner = addr(1);
        let asset = addr(2);
        let holding = holding_address(&owner, &asset).unwrap();
        ledger.airdrop(&addr(3), rent_exempt_minimum(Holding::SPACE)).unwrap();
        ledger.airdrop(&holding, 1).unwrap();

        let mut ctx = ledger.begin();
        assert!(ctx.is_vacant(&holding));
        ctx.create(&addr(3), &holding, &Holding::empty(owner, asset))
            .unwrap();
        assert!(!ctx.is_vacant(&holding));
        assert_eq!(
            ctx.get(&holding).unwrap().lamports,
            rent_exempt_minimum(Holding::SPACE)
        );
        assert_eq!(ctx.get(&addr(3)).unwrap().lamports, 1);
        assert_eq!(
            ctx.create(&addr(3), &holding, &Holding::empty(owner, asset)),
            Err(EscrowError::AccountAlreadyExists(holding))
        );
    }

    #[test]
    fn debit_beyond_balance_fails() {
        let mut ledger = Ledger::new();
        ledger.airdrop(&addr(1), 10).unwrap();
        let mut ctx = ledger.begin();
        assert_eq!(
            ctx.debit_lamports(&addr(1), 11),
            Err(EscrowError::InsufficientLamports {
                account: addr(1),
                available: 10,
                required: 11,
            })
        );
        assert_eq!(
            ctx.debit_lamports(&addr(9), 1),
            Err(EscrowError::InsufficientLamports {
                account: addr(9),
                available: 0,
                required: 1,
            })
        );
    }

    #[test]
    fn close_moves_lamports() {
        let mut ledger = Ledger::new();
        ledger.airdrop(&addr(1), 500).unwrap();
        let mut ctx = ledger.begin();
        assert_eq!(ctx.close(&addr(1), &addr(2)).unwrap(), 500);
        assert!(!ctx.exists(&addr(1)));
        assert_eq!(ctx.get(&addr(2)).unwrap().lamports, 500);
        assert!(ctx.close(&addr(2), &addr(2)).is_err());
    }
}
