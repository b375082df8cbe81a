//! Per-line diagnostics: bit parity and an additive checksum.
//!
//! These values are observational only. They are written to the daemon log
//! and never influence routing, delivery, or retransmission.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Modulus applied to the additive checksum.
const CHECKSUM_MODULUS: u64 = 0xFFFF_FFFF;

/// Parity of the total number of one bits in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    Even,
    Odd,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Even => write!(f, "even"),
            Self::Odd => write!(f, "odd"),
        }
    }
}

/// Classification of one received payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Parity of `ones`.
    pub parity: Parity,
    /// Total number of set bits across the payload.
    pub ones: u64,
    /// Sum of all bytes, modulo `0xFFFF_FFFF`.
    pub checksum: u64,
}

/// Classifies a payload. Pure; an empty payload is even with checksum 0.
pub fn classify(payload: &[u8]) -> Diagnostics {
    let ones: u64 = payload.iter().map(|b| u64::from(b.count_ones())).sum();
    let checksum = payload
        .iter()
        .fold(0u64, |acc, b| (acc + u64::from(*b)) % CHECKSUM_MODULUS);

    Diagnostics {
        parity: if ones % 2 == 0 { Parity::Even } else { Parity::Odd },
        ones,
        checksum,
    }
}
