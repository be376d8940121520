//! Range encoder and decoder (RFC 6716 Section 4.1 and 5.1).
//!
//! Both sides share a single fixed-size buffer layout: range-coded bytes are
//! written and read from the front, raw bits from the back.

mod buffer;
mod decoder;
mod encoder;
mod state;

pub use decoder::RangeDecoder;
pub use encoder::RangeEncoder;
