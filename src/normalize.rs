//! Turns the model's raw answer into a whole-unit amount.

use crate::error::NormalizationError;
use crate::schema::CanonicalValue;

const GROUP_SEPARATOR: char = ',';

/// Drop the leading unit symbol, strip group separators and parse what is left.
///
/// Signs, decimal points and whitespace are rejected rather than coerced.
pub fn normalize(raw: &str) -> Result<CanonicalValue, NormalizationError> {
    let mut chars = raw.chars();
    chars.next();
    let remainder: String = chars.filter(|c| *c != GROUP_SEPARATOR).collect();

    if remainder.is_empty() {
        return Err(NormalizationError::Empty);
    }
    if !remainder.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NormalizationError::InvalidDigits { remainder });
    }

    CanonicalValue::from_decimal(&remainder).ok_or(NormalizationError::Overflow)
}
