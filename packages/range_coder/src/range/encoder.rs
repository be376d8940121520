use crate::error::{Error, Result};
use crate::range::buffer::CodeBuffer;
use crate::range::state::Registers;
use crate::util::{
    EC_CODE_BITS, EC_CODE_BOT, EC_CODE_SHIFT, EC_CODE_TOP, EC_MAX_RAW_BITS, EC_SYM_BITS,
    EC_SYM_MAX, EC_UINT_BITS, EC_WINDOW_SIZE, ilog,
};

/// Range encoder for entropy coding Opus-style frames.
///
/// Implements the range encoder described in RFC 6716 Section 5.1, the mirror of
/// [`RangeDecoder`](crate::range::RangeDecoder). Range-coded bytes are written
/// from the front of a fixed-size buffer and raw bits from the back; the two
/// meet in the middle.
///
/// Per-symbol calls never fail. A buffer that turns out to be too small records
/// a [`Error::BufferFull`] fault that stays set for the life of the encoder and
/// is returned by [`Self::status`], [`Self::ec_enc_done`] and [`Self::finish`].
///
/// The encoder is `Clone`: saving a copy before a trial encoding and assigning
/// it back rolls the stream back to that point.
///
/// # Examples
///
/// ```rust
/// # use moosicbox_range_coder::range::{RangeDecoder, RangeEncoder};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut encoder = RangeEncoder::new(8);
/// encoder.ec_enc_bit_logp(true, 1);
/// encoder.ec_enc_uint(42, 100);
/// let frame = encoder.finish()?;
///
/// let mut decoder = RangeDecoder::new(&frame);
/// assert!(decoder.ec_dec_bit_logp(1));
/// assert_eq!(decoder.ec_dec_uint(100), 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RangeEncoder {
    buffer: CodeBuffer<Vec<u8>>,
    regs: Registers,
    // Output byte awaiting carry propagation, none before the first one
    rem: Option<u8>,
    // Number of 0xFF bytes buffered behind `rem`
    ext: u32,
    done: bool,
    error: Option<Error>,
}

impl RangeEncoder {
    /// Creates an encoder writing into a zeroed buffer of `size` bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::with_buffer(vec![0; size])
    }

    /// Creates an encoder writing into `buf`. Its length is the frame capacity.
    #[must_use]
    pub fn with_buffer(buf: Vec<u8>) -> Self {
        Self {
            buffer: CodeBuffer::new(buf),
            regs: Registers {
                rng: EC_CODE_TOP,
                val: 0,
                end_window: 0,
                end_bits: 0,
                nbits_total: EC_CODE_BITS + 1,
            },
            rem: None,
            ext: 0,
            done: false,
            error: None,
        }
    }

    fn set_error(&mut self, error: Error) {
        if self.error.is_none() {
            log::debug!("Range encoder fault: {error}");
            self.error = Some(error);
        }
    }

    fn check(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.set_error(e);
        }
    }

    /// Outputs a symbol with its carry bit.
    ///
    /// A byte of 0xFF can still be changed by a later carry, so runs of them are
    /// only counted until a byte arrives that settles the carry.
    #[allow(clippy::cast_possible_truncation)]
    fn carry_out(&mut self, c: u32) {
        if c == EC_SYM_MAX {
            self.ext += 1;
            return;
        }

        let carry = c >> EC_SYM_BITS;

        if let Some(rem) = self.rem {
            let result = self.buffer.write_byte((u32::from(rem) + carry) as u8);
            self.check(result);
        }

        if self.ext > 0 {
            let sym = ((EC_SYM_MAX + carry) & EC_SYM_MAX) as u8;
            while self.ext > 0 {
                let result = self.buffer.write_byte(sym);
                self.check(result);
                self.ext -= 1;
            }
        }

        self.rem = Some((c & EC_SYM_MAX) as u8);
    }

    fn normalize(&mut self) {
        while self.regs.rng <= EC_CODE_BOT {
            self.carry_out(self.regs.val >> EC_CODE_SHIFT);
            self.regs.val = (self.regs.val << EC_SYM_BITS) & (EC_CODE_TOP - 1);
            self.regs.rng <<= EC_SYM_BITS;
            self.regs.nbits_total += EC_SYM_BITS;
        }
    }

    /// Encodes the interval `[fl, fh)` out of `ft` per RFC 6716 Section 5.1.1.
    ///
    /// `ft` must not exceed 2^16 and `fl < fh <= ft`.
    pub fn ec_encode(&mut self, fl: u32, fh: u32, ft: u32) {
        debug_assert!(fl < fh && fh <= ft, "invalid interval [{fl}, {fh}) of {ft}");
        let r = self.regs.rng / ft;

        if fl > 0 {
            self.regs.val = self
                .regs
                .val
                .wrapping_add(self.regs.rng.wrapping_sub(r.wrapping_mul(ft - fl)));
            self.regs.rng = r.wrapping_mul(fh - fl);
        } else {
            self.regs.rng = self.regs.rng.wrapping_sub(r.wrapping_mul(ft - fh));
        }

        self.normalize();
    }

    /// Equivalent to `ec_encode()` with `ft = 1 << bits`.
    pub fn ec_encode_bin(&mut self, fl: u32, fh: u32, bits: u32) {
        debug_assert!(bits <= 16, "bits must not exceed 16");
        let ft = 1_u32 << bits;
        debug_assert!(fl < fh && fh <= ft, "invalid interval [{fl}, {fh}) of {ft}");
        let r = self.regs.rng >> bits;

        if fl > 0 {
            self.regs.val = self
                .regs
                .val
                .wrapping_add(self.regs.rng.wrapping_sub(r.wrapping_mul(ft - fl)));
            self.regs.rng = r.wrapping_mul(fh - fl);
        } else {
            self.regs.rng = self.regs.rng.wrapping_sub(r.wrapping_mul(ft - fh));
        }

        self.normalize();
    }

    /// Encodes a bit whose probability of being `true` is `1/(1<<logp)`.
    pub fn ec_enc_bit_logp(&mut self, bit: bool, logp: u32) {
        let r = self.regs.rng;
        let s = r >> logp;
        let rest = r - s;

        if bit {
            self.regs.val = self.regs.val.wrapping_add(rest);
            self.regs.rng = s;
        } else {
            self.regs.rng = rest;
        }

        self.normalize();
    }

    /// Encodes symbol `s` using an inverse CDF table with `ft = 1 << ftb`.
    ///
    /// The table must be strictly decreasing and terminated by 0.
    ///
    /// # Panics
    ///
    /// * If `s` is not a valid index into `icdf`
    pub fn ec_enc_icdf(&mut self, s: usize, icdf: &[u8], ftb: u32) {
        self.encode_icdf(s, icdf, ftb);
    }

    /// Encodes symbol `s` using a 16-bit inverse CDF table.
    ///
    /// Same semantics as [`Self::ec_enc_icdf`] with `ftb` up to 16.
    ///
    /// # Panics
    ///
    /// * If `s` is not a valid index into `icdf`
    pub fn ec_enc_icdf_u16(&mut self, s: usize, icdf: &[u16], ftb: u32) {
        self.encode_icdf(s, icdf, ftb);
    }

    fn encode_icdf<T: Copy + Into<u32>>(&mut self, s: usize, icdf: &[T], ftb: u32) {
        debug_assert!(
            icdf.last().is_some_and(|&x| Into::<u32>::into(x) == 0),
            "icdf table must be terminated by 0"
        );
        let r = self.regs.rng >> ftb;
        let above: u32 = icdf[s].into();

        if s > 0 {
            let below: u32 = icdf[s - 1].into();
            self.regs.val = self
                .regs
                .val
                .wrapping_add(self.regs.rng.wrapping_sub(r.wrapping_mul(below)));
            self.regs.rng = r.wrapping_mul(below - above);
        } else {
            self.regs.rng = self.regs.rng.wrapping_sub(r.wrapping_mul(above));
        }

        self.normalize();
    }

    /// Encodes `fl` uniformly over `[0, ft)` per RFC 6716 Section 5.1.4.
    ///
    /// Only the top 8 bits of `ft - 1` are range coded; the rest are written as
    /// raw bits.
    pub fn ec_enc_uint(&mut self, fl: u32, ft: u32) {
        debug_assert!(fl < ft, "{fl} is out of range for ft {ft}");
        let max = ft - 1;
        let ftb = ilog(max);

        if ftb <= EC_UINT_BITS {
            self.ec_encode(fl, fl + 1, ft);
            return;
        }

        let raw_bits = ftb - EC_UINT_BITS;
        let ft_high = (max >> raw_bits) + 1;
        let fl_high = fl >> raw_bits;
        self.ec_encode(fl_high, fl_high + 1, ft_high);
        self.ec_enc_bits(fl & ((1_u32 << raw_bits) - 1), raw_bits);
    }

    /// Appends `bits` raw bits of `fl` to the end of the frame per RFC 6716
    /// Section 5.1.3.
    ///
    /// Only the low `bits` bits of `fl` are written. At most 25 bits can be
    /// written at once.
    #[allow(clippy::cast_possible_truncation)]
    pub fn ec_enc_bits(&mut self, fl: u32, bits: u32) {
        debug_assert!(
            bits <= EC_MAX_RAW_BITS,
            "cannot encode more than {EC_MAX_RAW_BITS} bits at once"
        );
        if bits == 0 {
            return;
        }

        let mut window = self.regs.end_window;
        let mut used = self.regs.end_bits;

        if used + bits > EC_WINDOW_SIZE {
            loop {
                let result = self.buffer.write_byte_at_end((window & EC_SYM_MAX) as u8);
                self.check(result);
                window >>= EC_SYM_BITS;
                used -= EC_SYM_BITS;
                if used < EC_SYM_BITS {
                    break;
                }
            }
        }

        window |= (fl & ((1_u32 << bits) - 1)) << used;
        used += bits;

        self.regs.end_window = window;
        self.regs.end_bits = used;
        self.regs.nbits_total += bits;
    }

    /// Overwrites the first `nbits` bits of the frame with `val`.
    ///
    /// Lets stream-level flags be decided after encoding has started. The bits
    /// can only be patched once at least `nbits` bits have been range coded;
    /// otherwise a [`Error::PatchInitialBits`] fault is recorded.
    #[allow(clippy::cast_possible_truncation)]
    pub fn ec_enc_patch_initial_bits(&mut self, val: u32, nbits: u32) {
        debug_assert!(nbits <= EC_SYM_BITS, "cannot patch more than one byte");
        let shift = EC_SYM_BITS - nbits;
        let mask = ((1_u32 << nbits) - 1) << shift;
        let val = val & ((1_u32 << nbits) - 1);

        if self.buffer.offs() > 0 {
            // The first byte has been written
            let first = self.buffer.byte_mut(0);
            *first = ((u32::from(*first) & !mask) | (val << shift)) as u8;
        } else if let Some(rem) = self.rem {
            // The first byte is still waiting for carry propagation
            self.rem = Some(((u32::from(rem) & !mask) | (val << shift)) as u8);
        } else if self.regs.rng <= (EC_CODE_TOP >> nbits) {
            // The renormalization loop has never run
            self.regs.val =
                (self.regs.val & !(mask << EC_CODE_SHIFT)) | (val << (EC_CODE_SHIFT + shift));
        } else {
            self.set_error(Error::PatchInitialBits { nbits });
        }
    }

    /// Shrinks the frame to `size` bytes, moving the raw bits written so far to
    /// the new end of the frame.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` - if `size` is smaller than the bytes already written
    ///   or larger than the underlying buffer
    pub fn ec_enc_shrink(&mut self, size: usize) -> Result<()> {
        log::trace!(
            "Shrinking range encoder frame from {} to {size} bytes",
            self.buffer.storage()
        );
        self.buffer.shrink(size)
    }

    /// Finishes the frame per RFC 6716 Section 5.1.5.
    ///
    /// Outputs the fewest bits that make the decoder reproduce every symbol
    /// regardless of the bytes that follow, flushes the buffered carry byte and
    /// raw bits, and zeroes the unused space between them. No symbol may be
    /// encoded afterwards. Calling it again only returns the status.
    ///
    /// # Errors
    ///
    /// * `BufferFull` - if the frame did not fit in the buffer
    /// * `PatchInitialBits` - if an earlier patch request could not be applied
    #[allow(clippy::cast_possible_truncation)]
    pub fn ec_enc_done(&mut self) -> Result<()> {
        if self.done {
            return self.status();
        }
        self.done = true;

        let rng = self.regs.rng;
        let val = self.regs.val;

        let mut l = EC_CODE_BITS - ilog(rng);
        let mut msk = (EC_CODE_TOP - 1) >> l;
        let mut end = (val + msk) & !msk;

        if (end | msk) >= val + rng {
            l += 1;
            msk >>= 1;
            end = (val + msk) & !msk;
        }

        let mut remaining = l;
        while remaining > 0 {
            self.carry_out(end >> EC_CODE_SHIFT);
            end = (end << EC_SYM_BITS) & (EC_CODE_TOP - 1);
            remaining = remaining.saturating_sub(EC_SYM_BITS);
        }
        // Bits left unused in the last range-coded byte
        let spare = l.div_ceil(EC_SYM_BITS) * EC_SYM_BITS - l;

        if self.rem.is_some() || self.ext > 0 {
            self.carry_out(0);
        }

        let mut window = self.regs.end_window;
        let mut used = self.regs.end_bits;

        while used >= EC_SYM_BITS {
            let result = self.buffer.write_byte_at_end((window & EC_SYM_MAX) as u8);
            self.check(result);
            window >>= EC_SYM_BITS;
            used -= EC_SYM_BITS;
        }

        if self.error.is_none() {
            self.buffer.clear_gap();

            if used > 0 {
                let storage = self.buffer.storage();
                let end_offs = self.buffer.end_offs();

                if end_offs >= storage {
                    // No room at all for the leftover raw bits
                    self.set_error(Error::BufferFull { storage });
                } else {
                    if self.buffer.offs() + end_offs >= storage && spare < used {
                        // Keep only the raw bits that fit beside the range coder data
                        window &= (1_u32 << spare) - 1;
                        self.set_error(Error::BufferFull { storage });
                    }
                    *self.buffer.byte_mut(storage - end_offs - 1) |= window as u8;
                }
            }
        }

        log::trace!(
            "Finished range encoder frame: range_bytes={} end_bytes={} storage={}",
            self.buffer.offs(),
            self.buffer.end_offs(),
            self.buffer.storage()
        );

        self.status()
    }

    /// Finishes the frame and returns its bytes.
    ///
    /// # Errors
    ///
    /// * `BufferFull` - if the frame did not fit in the buffer
    /// * `PatchInitialBits` - if an earlier patch request could not be applied
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.ec_enc_done()?;
        let storage = self.buffer.storage();
        let mut frame = self.buffer.into_inner();
        frame.truncate(storage);
        Ok(frame)
    }

    /// Returns the number of whole bits encoded so far.
    #[must_use]
    pub const fn ec_tell(&self) -> u32 {
        self.regs.tell()
    }

    /// Returns the number of bits encoded so far in 1/8 bit units.
    #[must_use]
    pub const fn ec_tell_frac(&self) -> u32 {
        self.regs.tell_frac()
    }

    /// Number of range-coded bytes written at the front of the frame.
    #[must_use]
    pub const fn ec_range_bytes(&self) -> usize {
        self.buffer.offs()
    }

    /// Returns the current range. Read after the last symbol, this is the final
    /// range the decoder must reach for the same frame.
    #[must_use]
    pub const fn ec_get_range(&self) -> u32 {
        self.regs.rng
    }

    /// Current frame size in bytes.
    #[must_use]
    pub const fn storage(&self) -> usize {
        self.buffer.storage()
    }

    /// The frame as written so far.
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        self.buffer.bytes()
    }

    /// Returns the first fault recorded while encoding.
    ///
    /// # Errors
    ///
    /// * `BufferFull` - if the frame did not fit in the buffer
    /// * `PatchInitialBits` - if a patch request could not be applied
    pub fn status(&self) -> Result<()> {
        self.error.clone().map_or(Ok(()), Err)
    }

    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
