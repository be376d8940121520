use crate::util::{BITRES, ilog};

/// Thresholds for the 1/8th-bit step of `ec_tell_frac()`.
const TELL_FRAC_CORRECTION: [u32; 8] = [35733, 38967, 42495, 46340, 50535, 55109, 60097, 65535];

/// Registers common to the range encoder and decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// Number of values in the current range.
    pub rng: u32,
    /// Decoder: top of the range minus the coded value, minus one.
    /// Encoder: low end of the range.
    pub val: u32,
    /// Raw bits waiting at the end of the buffer.
    pub end_window: u32,
    /// Valid bits in `end_window`.
    pub end_bits: u32,
    /// Whole bits read or written, excluding partial bits in the range coder.
    pub nbits_total: u32,
}

impl Registers {
    pub const fn tell(&self) -> u32 {
        self.nbits_total.saturating_sub(ilog(self.rng))
    }

    /// Bits used so far in 1/8th bit units.
    ///
    /// Uses a linear estimate of `log2(rng)` refined by one table lookup,
    /// so it is always slightly larger than the exact value.
    pub const fn tell_frac(&self) -> u32 {
        let nbits = self.nbits_total << BITRES;
        let l = ilog(self.rng);
        let r = self.rng >> (l - 16);
        let mut b = (r >> 12) - 8;
        if r > TELL_FRAC_CORRECTION[b as usize] {
            b += 1;
        }
        nbits.saturating_sub((l << BITRES) + b)
    }
}
