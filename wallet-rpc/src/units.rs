//! Display-unit / atomic-unit conversion
//!
//! The wire carries decimal display units; the daemon accounts in integer
//! atomic units (1e12 per display unit). Conversion happens only at this
//! edge so rounding can never compound in transit.

/// Atomic units per display unit.
pub const ATOMIC_PER_COIN: u64 = 1_000_000_000_000;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AmountError {
    #[error("amount is not a finite number")]
    NotFinite,

    #[error("amount must be positive")]
    NotPositive,

    #[error("amount is below one atomic unit")]
    TooSmall,
}

/// Convert display units to atomic units, rounding to the nearest atomic
/// unit so daemon-reported values round-trip exactly through the wire.
pub fn to_atomic(amount: f64) -> u64 {
    (amount * ATOMIC_PER_COIN as f64).round() as u64
}

/// Convert atomic units to display units.
pub fn from_atomic(atomic: u64) -> f64 {
    atomic as f64 / ATOMIC_PER_COIN as f64
}

/// Validate a user-supplied amount before any workflow step runs.
pub fn validate_amount(amount: f64) -> Result<u64, AmountError> {
    if !amount.is_finite() {
        return Err(AmountError::NotFinite);
    }
    if amount <= 0.0 {
        return Err(AmountError::NotPositive);
    }
    let atomic = to_atomic(amount);
    if atomic == 0 {
        return Err(AmountError::TooSmall);
    }
    Ok(atomic)
}

/// Format an atomic amount for display, full precision.
pub fn format_amount(atomic: u64) -> String {
    format!("{:.12}", from_atomic(atomic))
}
