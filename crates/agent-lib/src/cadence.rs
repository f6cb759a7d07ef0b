//! Cadence token parsing
//!
//! A cadence token is a positive integer magnitude followed by exactly one
//! unit character: `s` (seconds), `m` (minutes), `h` (hours) or `d` (days).
//! Anything else is rejected; a bad token is a fatal configuration error,
//! not a retryable one.

use std::time::Duration;

use thiserror::Error;

/// Error produced when a cadence token cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cadence token {token:?}: {reason}")]
pub struct CadenceError {
    token: String,
    reason: &'static str,
}

impl CadenceError {
    fn new(token: &str, reason: &'static str) -> Self {
        Self {
            token: token.to_string(),
            reason,
        }
    }
}

/// Parse a cadence token into the inter-cycle delay.
pub fn parse_cadence(token: &str) -> Result<Duration, CadenceError> {
    let Some(unit) = token.chars().last() else {
        return Err(CadenceError::new(token, "token is empty"));
    };

    let magnitude = &token[..token.len() - unit.len_utf8()];
    if magnitude.is_empty() {
        return Err(CadenceError::new(token, "missing magnitude"));
    }
    let magnitude: u64 = magnitude
        .parse()
        .map_err(|_| CadenceError::new(token, "magnitude is not a positive integer"))?;
    if magnitude == 0 {
        return Err(CadenceError::new(token, "magnitude must be positive"));
    }

    let scale = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return Err(CadenceError::new(token, "unrecognized unit")),
    };

    let seconds = magnitude
        .checked_mul(scale)
        .ok_or_else(|| CadenceError::new(token, "cadence is out of range"))?;

    Ok(Duration::from_secs(seconds))
}
