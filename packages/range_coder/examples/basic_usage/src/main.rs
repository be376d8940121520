#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Basic range coder example.
//!
//! Encodes a small frame mixing every kind of symbol the coder supports,
//! then decodes it again and checks that both sides agree on the final range.

use moosicbox_range_coder::{
    RangeDecoder, RangeEncoder,
    laplace::{ec_laplace_decode, ec_laplace_encode},
};

/// Two-bit frame type, coded with an inverse CDF (probabilities 1/2, 1/4, 1/4)
const FRAME_TYPE_ICDF: [u8; 3] = [2, 1, 0];

const ENERGY_FS: u32 = 72 << 7;
const ENERGY_DECAY: u32 = 127 << 6;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let energies = [0, 2, -1, -3, 5, 0, 1];

    println!("=== Encoding ===");

    let mut encoder = RangeEncoder::new(32);
    encoder.ec_enc_bit_logp(false, 15); // silence flag
    encoder.ec_enc_icdf(1, &FRAME_TYPE_ICDF, 2);
    encoder.ec_enc_uint(1234, 10_000);
    for &energy in &energies {
        ec_laplace_encode(&mut encoder, energy, ENERGY_FS, ENERGY_DECAY);
    }
    encoder.ec_enc_bits(0b1_0110, 5);

    println!("  Bits used: {}", encoder.ec_tell());
    println!("  Bits used (1/8 bit): {}", encoder.ec_tell_frac());

    let final_range = encoder.ec_get_range();
    let frame = encoder.finish()?;
    println!("  Frame: {frame:02x?}");

    println!("\n=== Decoding ===");

    let mut decoder = RangeDecoder::new(&frame);
    let silence = decoder.ec_dec_bit_logp(15);
    let frame_type = decoder.ec_dec_icdf(&FRAME_TYPE_ICDF, 2);
    let value = decoder.ec_dec_uint(10_000);
    let decoded: Vec<i32> = energies
        .iter()
        .map(|_| ec_laplace_decode(&mut decoder, ENERGY_FS, ENERGY_DECAY))
        .collect();
    let raw = decoder.ec_dec_bits(5);
    decoder.status()?;

    println!("  Silence: {silence}");
    println!("  Frame type: {frame_type}");
    println!("  Uniform value: {value}");
    println!("  Energies: {decoded:?}");
    println!("  Raw bits: {raw:05b}");
    println!(
        "  Final range matches: {}",
        decoder.ec_get_range() == final_range
    );

    Ok(())
}
