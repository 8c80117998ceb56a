//! Asset definitions (mints) and the per-(owner, asset) holdings of them.

use bincode::{Decode, Encode};
#[cfg(feature = "json")]
use serde::{Deserialize, Serialize};

use crate::identity::Address;
use crate::ledger::AccountState;
use crate::programs::TOKEN_PROGRAM;
use crate::{EscrowError, Result};

/// Largest number of decimals an amount can be rendered with.
pub const MAX_DECIMALS: u8 = 19;

/// Definition of a fungible asset. Amounts are integral smallest units.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Mint {
    /// Only identity allowed to issue new units.
    pub authority: Address,
    pub decimals: u8,
    /// Total units in circulation.
    pub supply: u64,
}

impl AccountState for Mint {
    const DISCRIMINATOR: u8 = 2;
    const SPACE: usize = 1 + 32 + 1 + 8;
    const PROGRAM: Address = TOKEN_PROGRAM;
}

impl Mint {
    pub fn new(authority: Address, decimals: u8) -> Result<Self> {
        if decimals > MAX_DECIMALS {
            return Err(EscrowError::InvalidDecimals(decimals));
        }
        Ok(Self {
            authority,
            decimals,
            supply: 0,
        })
    }

    /// Renders `amount` smallest units as a fixed-point decimal (e.g. "1.500000000").
    pub fn to_human(&self, amount: u64) -> String {
        format_amount(amount, self.decimals)
    }
}

// Format smallest-unit integer into a fixed-width decimal.
fn format_amount(amount: u64, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let ten_pow = 10u128.pow(decimals as u32);
    let amount = amount as u128;
    let whole = amount / ten_pow;
    let rem = amount % ten_pow;
    format!("{}.{:0>width$}", whole, rem, width = decimals as usize)
}

/// Balance of one asset held by one owner.
///
/// Lives at [`crate::pda::holding_address`]`(owner, asset)`. For a vault the
/// owner is the offer record address, so only the escrow program acting for
/// that record can move the funds.
#[cfg_attr(feature = "json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Holding {
    pub asset: Address,
    /// Authority allowed to debit this holding.
    pub owner: Address,
    pub amount: u64,
}

impl AccountState for Holding {
    const DISCRIMINATOR: u8 = 3;
    const SPACE: usize = 1 + 32 + 32 + 8;
    const PROGRAM: Address = TOKEN_PROGRAM;
}

impl Holding {
    pub fn empty(owner: Address, asset: Address) -> Self {
        Self {
            asset,
            owner,
            amount: 0,
        }
    }
}
