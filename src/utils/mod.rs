//! Shared utilities.

pub mod decimal;
pub mod time;

pub use decimal::{clamp_decimal, fraction_of, percent_of, safe_div};
pub use time::saturating_seconds;
