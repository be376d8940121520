use crate::error::{Error, Result};
use crate::range::buffer::CodeBuffer;
use crate::range::state::Registers;
use crate::util::{
    EC_CODE_BITS, EC_CODE_BOT, EC_CODE_EXTRA, EC_CODE_TOP, EC_MAX_RAW_BITS, EC_SYM_BITS,
    EC_SYM_MAX, EC_UINT_BITS, EC_WINDOW_SIZE, ilog,
};

/// Range decoder for entropy decoding in Opus packets.
///
/// Implements the range decoder specified in RFC 6716 Section 4.1. The range decoder
/// maintains an internal state consisting of a value and range, and provides methods
/// for decoding symbols from compressed bitstreams using arithmetic coding.
///
/// The decoder reads from the beginning of the buffer for range-coded symbols and
/// from the end of the buffer for raw bits, allowing efficient use of packet space.
///
/// Truncated or corrupt input never makes the decoder fail: bytes past the end of
/// the buffer read as zero and decoding completes with wrong symbols. The only
/// corruption signal is the bound check in [`Self::ec_dec_uint`], reported by
/// [`Self::status`].
///
/// # Examples
///
/// ```rust
/// # use moosicbox_range_coder::range::RangeDecoder;
/// let packet = vec![0x80, 0x00, 0x00, 0x00];
/// let mut decoder = RangeDecoder::new(&packet);
///
/// // Decode a bit with 50% probability
/// let bit = decoder.ec_dec_bit_logp(1);
/// assert!(decoder.status().is_ok());
/// # let _ = bit;
/// ```
#[derive(Debug, Clone)]
pub struct RangeDecoder<'a> {
    buffer: CodeBuffer<&'a [u8]>,
    regs: Registers,
    // Normalization factor saved by ec_decode() for ec_dec_update()
    ext: u32,
    // Last byte read from the front; its low bit has not been consumed yet
    rem: u8,
    error: Option<Error>,
}

impl<'a> RangeDecoder<'a> {
    /// Creates a new range decoder and initializes it per RFC 6716 Section 4.1.1.
    ///
    /// The first byte is read ahead so that, after the initial normalization, the
    /// decoder registers line up with a freshly initialized encoder.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        let mut buffer = CodeBuffer::new(data);
        let rem = buffer.read_byte();
        let rng = 1_u32 << EC_CODE_EXTRA;

        let mut decoder = Self {
            buffer,
            regs: Registers {
                rng,
                val: rng - 1 - u32::from(rem >> (EC_SYM_BITS - EC_CODE_EXTRA)),
                end_window: 0,
                end_bits: 0,
                // ec_tell() subtracts partial bits from this; normalization adds
                // the remaining whole symbols so both sides agree.
                nbits_total: EC_CODE_BITS + 1
                    - ((EC_CODE_BITS - EC_CODE_EXTRA) / EC_SYM_BITS) * EC_SYM_BITS,
            },
            ext: 0,
            rem,
            error: None,
        };

        decoder.normalize();

        decoder
    }

    fn normalize(&mut self) {
        while self.regs.rng <= EC_CODE_BOT {
            self.regs.nbits_total += EC_SYM_BITS;
            self.regs.rng <<= EC_SYM_BITS;

            let prev = u32::from(self.rem);
            self.rem = self.buffer.read_byte();
            let sym =
                ((prev << EC_SYM_BITS) | u32::from(self.rem)) >> (EC_SYM_BITS - EC_CODE_EXTRA);

            self.regs.val =
                ((self.regs.val << EC_SYM_BITS) + (EC_SYM_MAX & !sym)) & (EC_CODE_TOP - 1);
        }
    }

    fn set_error(&mut self, error: Error) {
        if self.error.is_none() {
            log::debug!("Range decoder fault: {error}");
            self.error = Some(error);
        }
    }

    /// Decodes a symbol with cumulative frequency `ft` per RFC 6716 Section 4.1.2.
    ///
    /// Returns a value in `[0, ft)`. The caller maps it to a symbol interval
    /// `[fl, fh)` containing it and must then call [`Self::ec_dec_update`].
    ///
    /// # Panics
    ///
    /// * If `ft` is zero or larger than the current range (`ft` must not exceed 2^16)
    pub fn ec_decode(&mut self, ft: u32) -> u32 {
        debug_assert!(ft > 0, "ft must be positive");
        self.ext = self.regs.rng / ft;
        let s = self.regs.val / self.ext;
        ft - (s + 1).min(ft)
    }

    /// Decodes a binary symbol per RFC 6716 Section 4.1.3.1.
    ///
    /// Equivalent to `ec_decode()` with `ft = 1 << ftb`.
    pub fn ec_decode_bin(&mut self, ftb: u32) -> u32 {
        debug_assert!(ftb <= 16, "ftb must not exceed 16");
        let ft = 1_u32 << ftb;
        self.ext = self.regs.rng >> ftb;
        let s = self.regs.val / self.ext;
        ft - (s + 1).min(ft)
    }

    /// Updates decoder state after decoding a symbol per RFC 6716 Section 4.1.2.
    ///
    /// `(fl, fh, ft)` must be the interval containing the value returned by the
    /// preceding [`Self::ec_decode`] or [`Self::ec_decode_bin`] call; `ft` must be
    /// the same total (`1 << ftb` for the binary form).
    pub fn ec_dec_update(&mut self, fl: u32, fh: u32, ft: u32) {
        debug_assert!(fl < fh && fh <= ft, "invalid interval [{fl}, {fh}) of {ft}");
        let s = self.ext.wrapping_mul(ft - fh);

        self.regs.val = self.regs.val.wrapping_sub(s);
        self.regs.rng = if fl > 0 {
            self.ext.wrapping_mul(fh - fl)
        } else {
            self.regs.rng.wrapping_sub(s)
        };

        self.normalize();
    }

    /// Decodes a single bit with probability `1/(1<<logp)` per RFC 6716 Section 4.1.3.2.
    pub fn ec_dec_bit_logp(&mut self, logp: u32) -> bool {
        let r = self.regs.rng;
        let d = self.regs.val;
        let s = r >> logp;
        let bit = d < s;

        if bit {
            self.regs.rng = s;
        } else {
            self.regs.val = d - s;
            self.regs.rng = r - s;
        }

        self.normalize();

        bit
    }

    /// Decodes a symbol using an inverse CDF table per RFC 6716 Section 4.1.3.3.
    ///
    /// ICDF tables MUST be terminated with a value of 0, as specified in RFC 6716
    /// Section 4.1.3.3: "the table is terminated by a value of 0 (where fh\[k\] == ft)."
    /// This terminating zero represents the point where the cumulative distribution
    /// reaches `ft = 1 << ftb`.
    ///
    /// The RFC documents provide probability distribution functions (PDFs). To use
    /// them with `ec_dec_icdf`, they must be converted to ICDF format with the
    /// mandatory terminating zero appended.
    ///
    /// # Panics
    ///
    /// * If `icdf` is not terminated by 0
    pub fn ec_dec_icdf(&mut self, icdf: &[u8], ftb: u32) -> usize {
        self.decode_icdf(icdf, ftb)
    }

    /// Decodes a symbol using a 16-bit ICDF table (for high-precision PDFs).
    ///
    /// Same semantics as [`Self::ec_dec_icdf`] with `ftb` up to 16.
    ///
    /// # Panics
    ///
    /// * If `icdf` is not terminated by 0
    pub fn ec_dec_icdf_u16(&mut self, icdf: &[u16], ftb: u32) -> usize {
        self.decode_icdf(icdf, ftb)
    }

    fn decode_icdf<T: Copy + Into<u32>>(&mut self, icdf: &[T], ftb: u32) -> usize {
        debug_assert!(
            icdf.last().is_some_and(|&x| Into::<u32>::into(x) == 0),
            "icdf table must be terminated by 0"
        );

        let mut s = self.regs.rng;
        let d = self.regs.val;
        let r = s >> ftb;

        // Find the first k where d >= r * icdf[k]
        let mut k = 0;
        let mut t;
        loop {
            t = s;
            s = r.wrapping_mul(icdf[k].into());
            if d >= s {
                break;
            }
            k += 1;
        }

        self.regs.val = d - s;
        self.regs.rng = t - s;
        self.normalize();

        k
    }

    /// Extracts raw bits from the end of the frame per RFC 6716 Section 4.1.4.
    ///
    /// Reads bits backwards from the end of the buffer, independent of range coder
    /// state. At most 25 bits can be read at once.
    pub fn ec_dec_bits(&mut self, bits: u32) -> u32 {
        debug_assert!(
            bits <= EC_MAX_RAW_BITS,
            "cannot decode more than {EC_MAX_RAW_BITS} bits at once"
        );

        let mut window = self.regs.end_window;
        let mut available = self.regs.end_bits;

        if available < bits {
            loop {
                window |= u32::from(self.buffer.read_byte_from_end()) << available;
                available += EC_SYM_BITS;
                if available > EC_WINDOW_SIZE - EC_SYM_BITS {
                    break;
                }
            }
        }

        let result = window & ((1_u32 << bits) - 1);

        self.regs.end_window = window >> bits;
        self.regs.end_bits = available - bits;
        self.regs.nbits_total += bits;

        result
    }

    /// Decodes a uniformly distributed integer in range `[0, ft)` per RFC 6716 Section 4.1.5.
    ///
    /// When the decoded value is `>= ft` the frame is corrupt: the value is clamped
    /// to `ft - 1` and a [`Error::Corrupt`] fault is recorded, so the caller may keep
    /// decoding or abort after checking [`Self::status`].
    pub fn ec_dec_uint(&mut self, ft: u32) -> u32 {
        debug_assert!(ft > 0, "ft must be positive");
        let max = ft - 1;
        let ftb = ilog(max);

        if ftb <= EC_UINT_BITS {
            let t = self.ec_decode(ft);
            self.ec_dec_update(t, t + 1, ft);
            return t;
        }

        let raw_bits = ftb - EC_UINT_BITS;
        let ft_high = (max >> raw_bits) + 1;
        let t_high = self.ec_decode(ft_high);
        self.ec_dec_update(t_high, t_high + 1, ft_high);

        let t = (t_high << raw_bits) | self.ec_dec_bits(raw_bits);
        if t <= max {
            return t;
        }

        self.set_error(Error::Corrupt { value: t, max });
        max
    }

    /// Returns the number of whole bits decoded so far.
    ///
    /// This is a conservative estimate: it rounds up the partial bits still held by
    /// the range and matches the encoder's `ec_tell()` at the same point.
    #[must_use]
    pub const fn ec_tell(&self) -> u32 {
        self.regs.tell()
    }

    /// Returns the number of bits decoded with fractional precision.
    ///
    /// The result is in units of 1/8 bit and never exceeds `ec_tell() * 8`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use moosicbox_range_coder::range::RangeDecoder;
    /// let packet = vec![0x80, 0x00, 0x00, 0x00];
    /// let decoder = RangeDecoder::new(&packet);
    ///
    /// let bits_frac = decoder.ec_tell_frac(); // In 1/8 bit units
    /// let bits_whole = decoder.ec_tell();
    /// assert!(bits_frac <= bits_whole * 8);
    /// ```
    #[must_use]
    pub const fn ec_tell_frac(&self) -> u32 {
        self.regs.tell_frac()
    }

    /// Returns the current range value.
    ///
    /// This is the current size of the coding interval. After the last symbol of a
    /// frame it equals the encoder's final range.
    #[must_use]
    pub const fn ec_get_range(&self) -> u32 {
        self.regs.rng
    }

    /// Returns the current read position in the buffer.
    ///
    /// This is the byte offset for forward reading (range-coded symbols).
    /// Does not include bytes read from the end for raw bits.
    #[must_use]
    pub const fn get_position(&self) -> usize {
        self.buffer.offs()
    }

    /// Size of the buffer being decoded.
    #[must_use]
    pub const fn storage(&self) -> usize {
        self.buffer.storage()
    }

    /// Returns the first fault recorded while decoding.
    ///
    /// # Errors
    ///
    /// * `Corrupt` - if `ec_dec_uint()` decoded an out-of-range value
    pub fn status(&self) -> Result<()> {
        self.error.clone().map_or(Ok(()), Err)
    }

    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_new_with_empty_buffer_reads_zeros() {
        let decoder = RangeDecoder::new(&[]);
        assert_eq!(decoder.get_position(), 0);
        assert_eq!(decoder.storage(), 0);
        assert!(decoder.ec_get_range() > EC_CODE_BOT);
        assert!(decoder.status().is_ok());
    }

    #[test]
    fn test_initialization_values() {
        let data = vec![0b1010_1010, 0x00, 0x00, 0x00];
        let decoder = RangeDecoder::new(&data);
        assert_eq!(decoder.ec_get_range(), EC_CODE_TOP);
        assert_eq!(decoder.get_position(), 4);
        assert_eq!(decoder.ec_tell(), 1);
    }

    #[test]
    fn test_ec_decode() {
        let data = vec![0b1010_1010, 0x00, 0x00, 0x00, 0x00];
        let mut decoder = RangeDecoder::new(&data);

        let fs = decoder.ec_decode(256);
        assert!(fs < 256);
    }

    #[test]
    fn test_ec_decode_bin_matches_ec_decode() {
        let data = vec![0b1010_1010, 0x13, 0x57, 0x9B, 0xDF];
        let mut by_total = RangeDecoder::new(&data);
        let mut by_bits = RangeDecoder::new(&data);

        assert_eq!(by_total.ec_decode(256), by_bits.ec_decode_bin(8));
    }

    #[test]
    fn test_ec_dec_bit_logp_returns_true() {
        let data = vec![0xFF, 0x00, 0x00, 0x00, 0x00];
        let mut decoder = RangeDecoder::new(&data);
        assert!(decoder.ec_dec_bit_logp(1));
    }

    #[test]
    fn test_ec_dec_bit_logp_returns_false() {
        let data = vec![0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut decoder = RangeDecoder::new(&data);
        assert!(!decoder.ec_dec_bit_logp(1));
    }

    #[test_case(vec![0xFF, 0x00, 0x00, 0x00, 0x00], 1, true ; "logp_1_returns_true")]
    #[test_case(vec![0xFF, 0x00, 0x00, 0x00, 0x00], 4, true ; "logp_4_returns_true")]
    #[test_case(vec![0xFF, 0x00, 0x00, 0x00, 0x00], 8, true ; "logp_8_returns_true")]
    #[test_case(vec![0x00, 0xFF, 0xFF, 0xFF, 0xFF], 1, false ; "logp_1_returns_false")]
    #[test_case(vec![0x00, 0xFF, 0xFF, 0xFF, 0xFF], 4, false ; "logp_4_returns_false")]
    #[test_case(vec![0x00, 0xFF, 0xFF, 0xFF, 0xFF], 8, false ; "logp_8_returns_false")]
    #[allow(clippy::needless_pass_by_value)]
    fn test_ec_dec_bit_logp_with_various_inputs(data: Vec<u8>, logp: u32, expected: bool) {
        let mut decoder = RangeDecoder::new(&data);
        assert_eq!(decoder.ec_dec_bit_logp(logp), expected);
    }

    #[test]
    fn test_ec_dec_bit_logp_matches_two_phase_decode() {
        let data = vec![0x5A, 0xC3, 0x3C, 0xA5, 0x0F, 0xF0];
        let mut fused = RangeDecoder::new(&data);
        let mut two_phase = RangeDecoder::new(&data);

        for logp in [1, 2, 3, 1, 15, 4] {
            let ft = 1_u32 << logp;
            let fs = two_phase.ec_decode_bin(logp);
            let expected = fs >= ft - 1;
            if expected {
                two_phase.ec_dec_update(ft - 1, ft, ft);
            } else {
                two_phase.ec_dec_update(0, ft - 1, ft);
            }

            assert_eq!(fused.ec_dec_bit_logp(logp), expected);
            assert_eq!(fused.ec_get_range(), two_phase.ec_get_range());
        }
    }

    #[test]
    fn test_ec_dec_icdf() {
        let data = vec![0b1010_1010, 0x00, 0x00, 0x00, 0x00];
        let mut decoder = RangeDecoder::new(&data);

        let icdf = [252_u8, 200, 100, 0];
        let symbol = decoder.ec_dec_icdf(&icdf, 8);
        assert!(symbol < 4);
    }

    #[test]
    fn test_ec_dec_icdf_with_terminating_zero() {
        let data = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let mut decoder = RangeDecoder::new(&data);

        let icdf_with_terminator = [100_u8, 50, 25, 0];
        let k = decoder.ec_dec_icdf(&icdf_with_terminator, 8);
        assert!(k < icdf_with_terminator.len());
    }

    #[test]
    fn test_ec_dec_icdf_first_symbol() {
        let data = vec![0x00, 0x00, 0x00, 0x00];
        let mut decoder = RangeDecoder::new(&data);

        let icdf = [200_u8, 150, 100, 50, 0];
        assert_eq!(decoder.ec_dec_icdf(&icdf, 8), 0);
    }

    #[test]
    fn test_ec_dec_icdf_last_symbol() {
        let data = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let mut decoder = RangeDecoder::new(&data);

        let icdf = [200_u8, 150, 100, 50, 0];
        assert_eq!(decoder.ec_dec_icdf(&icdf, 8), 4);
    }

    #[test]
    fn test_ec_dec_icdf_u16_first_symbol() {
        let data = vec![0x00, 0x00, 0x00, 0x00, 0x00];
        let mut decoder = RangeDecoder::new(&data);

        let icdf: [u16; 3] = [50000, 25000, 0];
        assert_eq!(decoder.ec_dec_icdf_u16(&icdf, 16), 0);
    }

    #[test]
    fn test_ec_dec_icdf_u16_matches_u8_table() {
        let data = vec![0x5A, 0xC3, 0x3C, 0xA5, 0x0F];
        let mut narrow = RangeDecoder::new(&data);
        let mut wide = RangeDecoder::new(&data);

        let icdf_u8 = [200_u8, 100, 40, 0];
        let icdf_u16 = [200_u16, 100, 40, 0];

        assert_eq!(
            narrow.ec_dec_icdf(&icdf_u8, 8),
            wide.ec_dec_icdf_u16(&icdf_u16, 8)
        );
        assert_eq!(narrow.ec_get_range(), wide.ec_get_range());
    }

    #[test]
    fn test_ec_dec_bits_zero() {
        let data = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let mut decoder = RangeDecoder::new(&data);
        assert_eq!(decoder.ec_dec_bits(0), 0);
    }

    #[test]
    fn test_ec_dec_bits_backward_reading() {
        let data = vec![0x00, 0x00, 0x00, 0xAA];
        let mut decoder = RangeDecoder::new(&data);
        assert_eq!(decoder.ec_dec_bits(8), 0xAA);
    }

    #[test]
    fn test_ec_dec_bits_lsb_first_within_byte() {
        let data = vec![0x00, 0x00, 0x00, 0b1010_1010];
        let mut decoder = RangeDecoder::new(&data);

        assert_eq!(decoder.ec_dec_bits(1), 0);
        assert_eq!(decoder.ec_dec_bits(1), 1);
        assert_eq!(decoder.ec_dec_bits(1), 0);
        assert_eq!(decoder.ec_dec_bits(1), 1);
    }

    #[test]
    fn test_ec_dec_bits_multi_byte_backward() {
        let data = vec![0x00, 0x00, 0x12, 0x34];
        let mut decoder = RangeDecoder::new(&data);
        assert_eq!(decoder.ec_dec_bits(16), 0x1234);
    }

    #[test]
    fn test_ec_dec_bits_window_management() {
        let data = vec![0x00, 0x00, 0xFF, 0x00];
        let mut decoder = RangeDecoder::new(&data);

        assert_eq!(decoder.ec_dec_bits(4), 0x0);
        assert_eq!(decoder.ec_dec_bits(4), 0x0);
        assert_eq!(decoder.ec_dec_bits(8), 0xFF);
    }

    #[test]
    fn test_ec_dec_bits_max() {
        let data = vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut decoder = RangeDecoder::new(&data);
        assert_eq!(decoder.ec_dec_bits(25), (1_u32 << 25) - 1);
    }

    #[test]
    fn test_ec_dec_bits_independent_from_range_coder() {
        let data = vec![0xAA, 0x55, 0xFF, 0x00, 0x12, 0x34];
        let mut decoder = RangeDecoder::new(&data);

        let position_before = decoder.get_position();
        let range_before = decoder.ec_get_range();

        assert_eq!(decoder.ec_dec_bits(8), 0x34);
        assert_eq!(decoder.get_position(), position_before);
        assert_eq!(decoder.ec_get_range(), range_before);

        let symbol = decoder.ec_decode(16);
        assert!(symbol < 16);
    }

    #[test]
    fn test_ec_dec_bits_advances_tell() {
        let data = vec![0xAA, 0x55, 0xFF, 0x00, 0x12, 0x34];
        let mut decoder = RangeDecoder::new(&data);

        let tell_before = decoder.ec_tell();
        decoder.ec_dec_bits(11);
        assert_eq!(decoder.ec_tell(), tell_before + 11);
    }

    #[test]
    fn test_read_beyond_buffer_returns_zero() {
        let data = vec![0xFF, 0xFF];
        let mut decoder = RangeDecoder::new(&data);

        assert_eq!(decoder.ec_dec_bits(8), 0xFF);
        assert_eq!(decoder.ec_dec_bits(8), 0xFF);
        assert_eq!(decoder.ec_dec_bits(8), 0x00);
        assert!(decoder.status().is_ok());
    }

    #[test]
    fn test_ec_dec_uint_small() {
        let data = vec![0b1010_1010, 0x00, 0x00, 0x00, 0x00];
        let mut decoder = RangeDecoder::new(&data);
        assert!(decoder.ec_dec_uint(256) < 256);
    }

    #[test]
    fn test_ec_dec_uint_large_ft() {
        let data = vec![0xAA, 0x55, 0xFF, 0x00, 0x00, 0x00, 0x00];
        let mut decoder = RangeDecoder::new(&data);
        assert!(decoder.ec_dec_uint(10000) < 10000);
    }

    #[test]
    fn test_ec_dec_uint_ft_one() {
        let data = vec![0x00, 0x00, 0x00, 0x00];
        let mut decoder = RangeDecoder::new(&data);

        let range_before = decoder.ec_get_range();
        assert_eq!(decoder.ec_dec_uint(1), 0);
        assert_eq!(decoder.ec_get_range(), range_before);
    }

    #[test]
    fn test_ec_dec_uint_out_of_range_is_clamped_and_sticky() {
        // All-ones input decodes the highest symbol of the coded part and a one
        // from the raw part: ft = 257 needs one raw bit and ft_high = 129, so
        // the value 128 << 1 | 1 = 257 exceeds the maximum of 256.
        let data = vec![0xFF; 5];
        let mut decoder = RangeDecoder::new(&data);

        assert_eq!(decoder.ec_dec_uint(257), 256);
        assert_eq!(
            decoder.status(),
            Err(Error::Corrupt {
                value: 257,
                max: 256
            })
        );

        // Decoding continues and the fault stays recorded
        decoder.ec_dec_bit_logp(1);
        assert!(decoder.has_error());
    }

    #[test]
    fn test_ec_tell_after_operations() {
        let data = vec![0xAA, 0x55, 0xFF, 0x00, 0x12, 0x34, 0x56, 0x78];
        let mut decoder = RangeDecoder::new(&data);

        let tell_before = decoder.ec_tell_frac();

        let _ = decoder.ec_decode(256);
        decoder.ec_dec_update(10, 20, 256);

        assert!(decoder.ec_tell_frac() > tell_before);
    }

    #[test]
    fn test_ec_tell_frac_precision() {
        let data = vec![0xAA, 0x55, 0xFF, 0x00, 0x00, 0x00];
        let decoder = RangeDecoder::new(&data);

        let tell = decoder.ec_tell();
        let tell_frac = decoder.ec_tell_frac();

        assert!(tell_frac <= tell * 8);
        assert!(tell_frac + 8 >= tell * 8);
    }
}
