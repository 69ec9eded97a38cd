//! Curated prime sequence used to size every hash table in the interop core.
//!
//! Bucket array lengths are always chosen from a fixed ascending table of primes to
//! reduce clustering when hash codes share common factors. The table and the growth
//! rules are load-bearing: [`get_prime`] and [`expand_prime`] must stay deterministic
//! because wrapper-cache sizing (and the tests that pin it) depend on the exact values.

use crate::{Error, Result};

/// Ascending table of primes used for bucket array sizing.
///
/// Each entry is roughly 1.2x the previous one, so repeated doubling lands close to
/// (but never below) the requested size while keeping resize counts logarithmic.
const PRIMES: &[usize] = &[
    3, 7, 11, 17, 23, 29, 37, 47, 59, 71, 89, 107, 131, 163, 197, 239, 293, 353, 431, 521, 631,
    761, 919, 1103, 1327, 1597, 1931, 2333, 2801, 3371, 4049, 4861, 5839, 7013, 8419, 10103,
    12143, 14591, 17519, 21023, 25229, 30293, 36353, 43627, 52361, 62851, 75431, 90523, 108631,
    130363, 156437, 187751, 225307, 270371, 324449, 389357, 467237, 560689, 672827, 807403,
    968897, 1162687, 1395263, 1674319, 2009191, 2411033, 2893249, 3471899, 4166287, 4999559,
    5999471, 7199369,
];

/// Largest bucket array length the prime machinery will produce.
///
/// This is the largest prime below the maximum array length the original runtime
/// supported; requests beyond it are a configuration defect, not a runtime condition.
pub const MAX_PRIME_ARRAY_LENGTH: usize = 0x7FEF_FFFD;

fn is_prime(candidate: usize) -> bool {
    if candidate & 1 == 0 {
        return candidate == 2;
    }

    let mut divisor = 3;
    while divisor * divisor <= candidate {
        if candidate % divisor == 0 {
            return false;
        }
        divisor += 2;
    }

    true
}

/// Returns the smallest supported prime greater than or equal to `min`.
///
/// Values inside the curated table are returned directly; beyond the table the next
/// odd prime is found by trial division (still bounded by [`MAX_PRIME_ARRAY_LENGTH`]).
///
/// # Errors
///
/// [`Error::CapacityOverflow`] if `min` exceeds [`MAX_PRIME_ARRAY_LENGTH`].
///
/// # Examples
///
/// ```rust
/// use combridge::collections::primes::get_prime;
///
/// assert_eq!(get_prime(100).unwrap(), 107);
/// assert_eq!(get_prime(0).unwrap(), 3);
/// ```
pub fn get_prime(min: usize) -> Result<usize> {
    if min > MAX_PRIME_ARRAY_LENGTH {
        return Err(Error::CapacityOverflow);
    }

    for &prime in PRIMES {
        if prime >= min {
            return Ok(prime);
        }
    }

    let mut candidate = min | 1;
    while candidate <= MAX_PRIME_ARRAY_LENGTH {
        if is_prime(candidate) {
            return Ok(candidate);
        }
        candidate += 2;
    }

    Err(Error::CapacityOverflow)
}

/// Returns the bucket array length to grow to from `old_size`.
///
/// Doubles `old_size` and rounds up to the next supported prime. When doubling would
/// pass [`MAX_PRIME_ARRAY_LENGTH`] (and the table had not already reached it), the
/// result clamps to [`MAX_PRIME_ARRAY_LENGTH`] so growth remains possible up to the
/// hard bound.
///
/// # Errors
///
/// [`Error::CapacityOverflow`] if `old_size` already reached the hard bound.
///
/// # Examples
///
/// ```rust
/// use combridge::collections::primes::expand_prime;
///
/// assert_eq!(expand_prime(107).unwrap(), 239);
/// ```
pub fn expand_prime(old_size: usize) -> Result<usize> {
    let new_size = old_size.saturating_mul(2);

    if new_size > MAX_PRIME_ARRAY_LENGTH {
        if old_size >= MAX_PRIME_ARRAY_LENGTH {
            return Err(Error::CapacityOverflow);
        }
        return Ok(MAX_PRIME_ARRAY_LENGTH);
    }

    get_prime(new_size)
}
