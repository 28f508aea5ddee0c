//! Public tracking codes.
//!
//! Codes are 8 characters drawn uniformly from `A-Z0-9`. They are not
//! checked against existing orders; a collision simply makes the lookup
//! return the first matching order.

use rand::Rng;

pub const TRACKING_ID_LENGTH: usize = 8;

const TRACKING_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates a tracking code using the thread-local RNG.
pub fn generate_tracking_id() -> String {
    generate_tracking_id_with(&mut rand::thread_rng())
}

pub fn generate_tracking_id_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..TRACKING_ID_LENGTH)
        .map(|_| TRACKING_ID_ALPHABET[rng.gen_range(0..TRACKING_ID_ALPHABET.len())] as char)
        .collect()
}

/// True for strings shaped like a tracking code.
pub fn is_tracking_id(candidate: &str) -> bool {
    candidate.len() == TRACKING_ID_LENGTH
        && candidate
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}
