//! Well-known program ids. Every non-identity account is owned by one of these.

use crate::identity::Address;

/// The system program: owner of identity accounts, source of deposits.
pub const SYSTEM_PROGRAM: Address = Address::new([0u8; 32]);

/// Token program: owner of mints and holdings.
pub const TOKEN_PROGRAM: Address = Address::new([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
    237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// Associated-holding program: namespace under which the canonical
/// (owner, asset) holding address is derived.
pub const ASSOCIATED_HOLDING_PROGRAM: Address = Address::new([
    140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131, 11, 90, 19, 153, 218,
    255, 16, 132, 4, 142, 123, 216, 219, 233, 248, 89,
]);

/// Escrow program: owner of offer records.
pub const ESCROW_PROGRAM: Address = Address::new([
    116, 18, 219, 85, 181, 220, 126, 79, 23, 92, 212, 111, 16, 36, 137, 99, 150, 1, 128, 172, 237,
    97, 29, 190, 24, 241, 92, 33, 4, 21, 245, 147,
]);
