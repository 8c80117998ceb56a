//! Program-derived addresses.
//!
//! An address is derived as `SHA-256(seeds || program_id || "ProgramDerivedAddress")`
//! and is only accepted when the digest is *not* a point on the ed25519 curve,
//! so no private key can ever sign for it. The canonical address for a seed
//! set is found by appending a one-byte bump, searched from 255 downwards;
//! the bump is stored alongside the state so later transitions re-derive in
//! a single hash instead of repeating the search.
//!
//! - offer record: `["escrow", owner, nonce_le]` under [`ESCROW_PROGRAM`]
//! - holding: `[owner, TOKEN_PROGRAM, asset]` under [`ASSOCIATED_HOLDING_PROGRAM`]
//! - vault: the holding of the *record address* for the offered asset

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::DerivationError;
use crate::identity::Address;
use crate::programs::{ASSOCIATED_HOLDING_PROGRAM, ESCROW_PROGRAM, TOKEN_PROGRAM};

/// Seed prefix of offer records.
pub const ESCROW_SEED: &[u8] = b"escrow";

pub const MAX_SEEDS: usize = 16;
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Derives an address from `seeds` (bump included, if any) under `program_id`.
///
/// # Errors
///
/// Returns [`DerivationError::OnCurve`] if the digest lands on the curve.
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<Address, DerivationError> {
    if seeds.len() > MAX_SEEDS {
        return Err(DerivationError::MaxSeedsExceeded(seeds.len()));
    }
    let mut hasher = Sha256::new();
    for seed in seeds {
        if seed.len() > MAX_SEED_LEN {
            return Err(DerivationError::MaxSeedLengthExceeded(seed.len()));
        }
        hasher.update(seed);
    }
    hasher.update(program_id.as_ref());
    hasher.update(PDA_MARKER);

    let address = Address(hasher.finalize().into());
    if address.is_on_curve() {
        return Err(DerivationError::OnCurve);
    }
    Ok(address)
}

/// Finds the canonical `(address, bump)` for `seeds` under `program_id`.
///
/// # Errors
///
/// [`DerivationError::NoViableBump`] if all 256 bumps land on the curve;
/// the caller has to pick different seeds (e.g. a new nonce).
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<(Address, u8), DerivationError> {
    if seeds.len() >= MAX_SEEDS {
        return Err(DerivationError::MaxSeedsExceeded(seeds.len() + 1));
    }
    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);
        match create_program_address(&with_bump, program_id) {
            Ok(address) => return Ok((address, bump)),
            Err(DerivationError::OnCurve) => {}
            Err(e) => return Err(e),
        }
    }
    Err(DerivationError::NoViableBump)
}

/// Canonical offer record address and bump for `(owner, nonce)`.
pub fn record_address(owner: &Address, nonce: u64) -> Result<(Address, u8), DerivationError> {
    find_program_address(
        &[ESCROW_SEED, owner.as_ref(), &nonce.to_le_bytes()],
        &ESCROW_PROGRAM,
    )
}

/// Re-derives the record address with a stored bump and compares it against
/// `claimed` in constant time.
pub fn verify_record_address(owner: &Address, nonce: u64, bump: u8, claimed: &Address) -> bool {
    let derived = create_program_address(
        &[ESCROW_SEED, owner.as_ref(), &nonce.to_le_bytes(), &[bump]],
        &ESCROW_PROGRAM,
    );
    match derived {
        Ok(address) => address.0[..].ct_eq(&claimed.0[..]).into(),
        Err(_) => false,
    }
}

/// Canonical holding address of `owner` for `asset`.
pub fn holding_address(owner: &Address, asset: &Address) -> Result<Address, DerivationError> {
    find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM.as_ref(), asset.as_ref()],
        &ASSOCIATED_HOLDING_PROGRAM,
    )
    .map(|(address, _)| address)
}

/// Vault of the offer at `record`: the record's own holding of the offered asset.
pub fn vault_address(
    record: &Address,
    asset_offered: &Address,
) -> Result<Address, DerivationError> {
    holding_address(record, asset_offered)
}
