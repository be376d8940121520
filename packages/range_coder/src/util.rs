//! Constants and integer helpers shared by the encoder and decoder.

/// Number of bits emitted or consumed by one renormalization step.
pub const EC_SYM_BITS: u32 = 8;
/// Total number of bits in each of the state registers.
pub const EC_CODE_BITS: u32 = 32;
/// Largest value a single output symbol can hold.
pub const EC_SYM_MAX: u32 = (1 << EC_SYM_BITS) - 1;
/// Shift that moves a symbol into the high-order position of `val`.
pub const EC_CODE_SHIFT: u32 = EC_CODE_BITS - EC_SYM_BITS - 1;
/// Carry bit of the high-order range symbol.
pub const EC_CODE_TOP: u32 = 1 << (EC_CODE_BITS - 1);
/// Low-order bit of the high-order range symbol. `rng` is kept above this.
pub const EC_CODE_BOT: u32 = EC_CODE_TOP >> EC_SYM_BITS;
/// Bits available for the last, partial symbol in the code field.
pub const EC_CODE_EXTRA: u32 = (EC_CODE_BITS - 2) % EC_SYM_BITS + 1;
/// Bits of a uniform integer that are range coded; the rest are raw bits.
pub const EC_UINT_BITS: u32 = 8;
/// Width of the raw-bit window.
pub const EC_WINDOW_SIZE: u32 = u32::BITS;
/// Most raw bits that can be written or read in one call.
pub const EC_MAX_RAW_BITS: u32 = EC_WINDOW_SIZE - EC_SYM_BITS + 1;
/// Resolution of `ec_tell_frac()`: 3 means 1/8th bits.
pub const BITRES: u32 = 3;

/// Number of bits needed to represent `x`, or 0 when `x == 0`.
///
/// Matches libopus `EC_ILOG()`: `ilog(1) == 1`,
/// `ilog(255) == 8`, `ilog(256) == 9`.
#[must_use]
pub const fn ilog(x: u32) -> u32 {
    u32::BITS - x.leading_zeros()
}
