use tracing::warn;

use crate::error::{Error, Result};

/// Weight multiplier between two adjacent version components.
const COMPONENT_BASE: u64 = 100;

/// Encodes a dotted version string (e.g. `1.2.3`) into a comparable integer.
///
/// Components are weighted `1, 100, 100², …` from the rightmost one, so
/// `1.2.3` encodes to `10203`. Ordering is only preserved while every
/// component stays below 100; larger components are accepted but logged.
///
/// # Errors
///
/// Returns [`Error::Format`] if a component is not a non-negative integer or
/// if the encoded value does not fit in 32 bits.
pub fn encode_version(version: &str) -> Result<u32> {
    let format_error = |reason: String| Error::Format {
        version: version.to_string(),
        reason,
    };

    let mut weight: u64 = 1;
    let mut encoded: u64 = 0;

    for component in version.split('.').rev() {
        let value: u64 = component
            .parse()
            .map_err(|_| format_error(format!("component '{component}' is not a number")))?;

        if value >= COMPONENT_BASE {
            warn!(
                version,
                component = value,
                "Version component exceeds two digits, version ordering is not preserved"
            );
        }

        encoded = value
            .checked_mul(weight)
            .and_then(|v| v.checked_add(encoded))
            .ok_or_else(|| format_error("encoded value overflows".to_string()))?;
        weight = weight.saturating_mul(COMPONENT_BASE);
    }

    u32::try_from(encoded).map_err(|_| format_error(format!("{encoded} does not fit in 32 bits")))
}
