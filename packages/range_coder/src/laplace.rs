//! Laplace-distributed signed integers over a 15-bit total.
//!
//! Zero takes `fs` of the 32768 slots. The remaining mass decays
//! geometrically by `decay / 16384` per step, split evenly between the
//! positive and negative value of each magnitude, and ends in a flat tail
//! where every magnitude keeps at least `LAPLACE_MINP` slots. Used by CELT
//! for coarse band energies (RFC 6716 Section 4.3.2.1).

use crate::range::{RangeDecoder, RangeEncoder};

const LAPLACE_LOG_MINP: u32 = 0;
const LAPLACE_MINP: u32 = 1 << LAPLACE_LOG_MINP;
const LAPLACE_NMIN: u32 = 16;
const LAPLACE_FTB: u32 = 15;
const LAPLACE_FT: u32 = 1 << LAPLACE_FTB;

/// Slots given to magnitude one (both signs together), before the minimum.
const fn freq1(fs0: u32, decay: u32) -> u32 {
    let ft = LAPLACE_FT - LAPLACE_MINP * (2 * LAPLACE_NMIN) - fs0;
    (ft * (16384 - decay)) >> 15
}

/// Encodes `value` and returns the value actually written.
///
/// Magnitudes past the end of the tail are clamped, so the result may be
/// smaller in magnitude than `value`. The decoder returns the clamped value.
///
/// # Panics
///
/// * In debug builds, if `fs` or `decay` leave no room for the interval
///   (`fs` must be below 32768 and `decay` below 16384)
#[allow(clippy::cast_possible_wrap)]
pub fn ec_laplace_encode(enc: &mut RangeEncoder, value: i32, fs: u32, decay: u32) -> i32 {
    debug_assert!(fs > 0 && fs < LAPLACE_FT, "fs {fs} out of range");
    debug_assert!(decay < 16384, "decay {decay} out of range");

    let mut fl = 0;
    let mut fs = fs;
    let mut coded = value;

    if value != 0 {
        let negative = value < 0;
        let sign = u32::from(negative);
        let magnitude = value.unsigned_abs();

        fl = fs;
        fs = freq1(fs, decay);

        let mut i = 1;
        while fs > 0 && i < magnitude {
            fs *= 2;
            fl += fs + 2 * LAPLACE_MINP;
            fs = (fs * decay) >> 15;
            i += 1;
        }

        if fs == 0 {
            let ndi_max = (LAPLACE_FT - fl + LAPLACE_MINP - 1) >> LAPLACE_LOG_MINP;
            let ndi_max = (ndi_max + sign) >> 1;
            let di = (magnitude - i).min(ndi_max.saturating_sub(1));

            fl += (2 * di + 1 - sign) * LAPLACE_MINP;
            fs = LAPLACE_MINP.min(LAPLACE_FT - fl);

            let clamped = (i + di) as i32;
            coded = if negative { -clamped } else { clamped };
        } else {
            fs += LAPLACE_MINP;
            if !negative {
                fl += fs;
            }
        }

        debug_assert!(fl + fs <= LAPLACE_FT);
        debug_assert!(fs > 0);
    }

    enc.ec_encode_bin(fl, fl + fs, LAPLACE_FTB);
    coded
}

/// Decodes a value written by [`ec_laplace_encode`] with the same `fs` and
/// `decay`.
#[allow(clippy::cast_possible_wrap)]
pub fn ec_laplace_decode(dec: &mut RangeDecoder<'_>, fs: u32, decay: u32) -> i32 {
    debug_assert!(fs > 0 && fs < LAPLACE_FT, "fs {fs} out of range");
    debug_assert!(decay < 16384, "decay {decay} out of range");

    let fm = dec.ec_decode_bin(LAPLACE_FTB);
    let mut fl = 0;
    let mut fs = fs;
    let mut val: i32 = 0;

    if fm >= fs {
        val += 1;
        fl = fs;
        fs = freq1(fs, decay) + LAPLACE_MINP;

        while fs > LAPLACE_MINP && fm >= fl + 2 * fs {
            fs *= 2;
            fl += fs;
            fs = ((fs - 2 * LAPLACE_MINP) * decay) >> 15;
            fs += LAPLACE_MINP;
            val += 1;
        }

        if fs <= LAPLACE_MINP {
            let di = (fm - fl) >> (LAPLACE_LOG_MINP + 1);
            val += di as i32;
            fl += 2 * di * LAPLACE_MINP;
        }

        if fm < fl + fs {
            val = -val;
        } else {
            fl += fs;
        }
    }

    dec.ec_dec_update(fl, (fl + fs).min(LAPLACE_FT), LAPLACE_FT);
    val
}
