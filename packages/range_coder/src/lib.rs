#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Binary range coder used by the Opus codec (RFC 6716).
//!
//! A [`RangeEncoder`] turns a sequence of symbols, each drawn from a known
//! frequency distribution, into a compact byte string. A [`RangeDecoder`]
//! given the same distributions in the same order recovers the symbols.
//! Raw bits can be mixed in; they are packed from the end of the frame.
//!
//! ```rust
//! use moosicbox_range_coder::{RangeDecoder, RangeEncoder};
//!
//! # fn main() -> Result<(), moosicbox_range_coder::Error> {
//! let mut encoder = RangeEncoder::new(16);
//! encoder.ec_encode(3, 5, 10);
//! encoder.ec_enc_bits(0b101, 3);
//! let frame = encoder.finish()?;
//!
//! let mut decoder = RangeDecoder::new(&frame);
//! let fs = decoder.ec_decode(10);
//! assert!((3..5).contains(&fs));
//! decoder.ec_dec_update(3, 5, 10);
//! assert_eq!(decoder.ec_dec_bits(3), 0b101);
//! # Ok(())
//! # }
//! ```

pub mod error;
#[cfg(feature = "laplace")]
pub mod laplace;
pub mod range;
pub mod util;

pub use error::{Error, Result};
pub use range::{RangeDecoder, RangeEncoder};
