//! Local checks for the optional national tax-id field (CPF layout).
//!
//! Everything here is decidable offline. Only values that survive the
//! precheck are worth a round trip to the external verification service.

use std::fmt;

/// Number of digits in a well-formed id.
pub const NATIONAL_ID_DIGITS: usize = 11;

/// Normalized, digits-only id that passed every local rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NationalIdDigits(String);

impl NationalIdDigits {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NationalIdDigits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecheckRejection {
    WrongLength(usize),
    RepeatedDigits,
    CheckDigitMismatch,
}

impl fmt::Display for PrecheckRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongLength(len) => {
                write!(f, "expected {NATIONAL_ID_DIGITS} digits, got {len}")
            }
            Self::RepeatedDigits => f.write_str("all digits are the same"),
            Self::CheckDigitMismatch => f.write_str("check digits do not match"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precheck {
    /// Nothing entered; the field is optional.
    Empty,
    /// Obviously invalid, no network call needed.
    Rejected(PrecheckRejection),
    /// Locally plausible; ask the external service.
    NeedsRemote(NationalIdDigits),
}

/// Strip masks and separators (`123.456.789-09` -> `12345678909`).
#[must_use]
pub fn normalize_digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

#[must_use]
pub fn precheck(raw: &str) -> Precheck {
    if raw.trim().is_empty() {
        return Precheck::Empty;
    }

    let digits = normalize_digits(raw);
    if digits.len() != NATIONAL_ID_DIGITS {
        return Precheck::Rejected(PrecheckRejection::WrongLength(digits.len()));
    }

    let bytes = digits.as_bytes();
    if bytes.iter().all(|b| *b == bytes[0]) {
        return Precheck::Rejected(PrecheckRejection::RepeatedDigits);
    }

    let values: Vec<u32> = bytes.iter().map(|b| u32::from(b - b'0')).collect();
    if check_digit(&values[..9]) != values[9] || check_digit(&values[..10]) != values[10] {
        return Precheck::Rejected(PrecheckRejection::CheckDigitMismatch);
    }

    Precheck::NeedsRemote(NationalIdDigits(digits))
}

/// Mod-11 check digit over `prefix`, weights descending from `len + 1` to 2.
fn check_digit(prefix: &[u32]) -> u32 {
    let top = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(i, d)| d * (top - i as u32))
        .sum();
    let rem = (sum * 10) % 11;
    if rem == 10 { 0 } else { rem }
}
