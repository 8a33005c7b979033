//! Poseidon parameters shared by the accumulator and the root commitment.
//!
//! Field: BLS12-381 Fr (255 bits)
//! Rate: 2, Capacity: 1
//! Security: 128 bits

use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::{BigInteger, PrimeField};
use std::sync::OnceLock;

static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

pub(crate) fn config() -> &'static PoseidonConfig<Fr> {
    CONFIG.get_or_init(build_config)
}

fn build_config() -> PoseidonConfig<Fr> {
    let prime_bits: u64 = 255;
    let rate: usize = 2;
    let capacity: usize = 1;
    let full_rounds: u64 = 8;
    let partial_rounds: u64 = 57;
    let alpha: u64 = 5;
    let skip_matrices: u64 = 0;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        rate,
        full_rounds,
        partial_rounds,
        skip_matrices,
    );

    PoseidonConfig::new(
        full_rounds as usize,
        partial_rounds as usize,
        alpha,
        mds,
        ark,
        rate,
        capacity,
    )
}

/// Domain-separated Poseidon over 32-byte chunks
pub(crate) fn hash(domain: u64, inputs: &[&[u8; 32]]) -> [u8; 32] {
    let mut sponge = PoseidonSponge::new(config());
    sponge.absorb(&Fr::from(domain));
    for input in inputs {
        sponge.absorb(&Fr::from_le_bytes_mod_order(*input));
    }
    let result: Fr = sponge.squeeze_field_elements(1)[0];
    field_to_bytes(result)
}

pub(crate) fn field_to_bytes(f: Fr) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_le();
    let mut arr = [0u8; 32];
    arr[..bytes.len()].copy_from_slice(&bytes);
    arr
}
