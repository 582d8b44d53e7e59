//! Random value helpers shared by the rule library.

use rand::Rng;
use rand::seq::SliceRandom;

/// Bounded random offset in `[-amplitude, amplitude]`.
///
/// A spread is drawn first from `[0, distribution]` and capped at
/// `amplitude`; the offset is then uniform in `[-spread, spread]`. Small
/// distributions therefore concentrate offsets near zero. `distribution`
/// defaults to `amplitude` when unset or non-positive.
pub fn distributed_random<R: Rng + ?Sized>(
    rng: &mut R,
    amplitude: f64,
    distribution: Option<f64>,
) -> f64 {
    if !amplitude.is_finite() || amplitude <= 0.0 {
        return 0.0;
    }
    let distribution = match distribution {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => amplitude,
    };
    let spread = rng.random_range(0.0..=distribution).min(amplitude);
    if spread <= 0.0 {
        return 0.0;
    }
    rng.random_range(-spread..=spread)
}

/// Fisher-Yates shuffle in place.
pub fn shuffle<T, R: Rng + ?Sized>(values: &mut [T], rng: &mut R) {
    values.shuffle(rng);
}

/// Derive a stable per-table seed from a run seed.
pub fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
