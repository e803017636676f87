//! Scalar payload parsing shared by every encoding

use crate::error::DecodeError;
use crate::types::UnixSeconds;

/// Which literal pair a decoder accepts for booleans.
///
/// The two sets are never mixed within one encoding: single-topic messages
/// use [`BoolLiterals::Words`], compact strings use [`BoolLiterals::Digits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoolLiterals {
    /// `"true"` / `"false"`
    #[default]
    Words,
    /// `"1"` / `"0"`
    Digits,
}

impl BoolLiterals {
    pub fn format(self, value: bool) -> &'static str {
        match (self, value) {
            (BoolLiterals::Words, true) => "true",
            (BoolLiterals::Words, false) => "false",
            (BoolLiterals::Digits, true) => "1",
            (BoolLiterals::Digits, false) => "0",
        }
    }

    pub fn parse(self, s: &str) -> Result<bool, DecodeError> {
        match (self, s) {
            (BoolLiterals::Words, "true") | (BoolLiterals::Digits, "1") => Ok(true),
            (BoolLiterals::Words, "false") | (BoolLiterals::Digits, "0") => Ok(false),
            _ => Err(DecodeError::InvalidBool(s.to_string())),
        }
    }
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Decimal 0..=255, ASCII digits only
pub fn parse_byte(s: &str) -> Result<u8, DecodeError> {
    if !is_decimal(s) {
        return Err(DecodeError::InvalidByte(s.to_string()));
    }
    s.parse::<u8>().map_err(|_| DecodeError::InvalidByte(s.to_string()))
}

/// Decimal unsigned 32-bit seconds
pub fn parse_timestamp(s: &str) -> Result<UnixSeconds, DecodeError> {
    if !is_decimal(s) {
        return Err(DecodeError::InvalidTimestamp(s.to_string()));
    }
    s.parse::<UnixSeconds>()
        .map_err(|_| DecodeError::InvalidTimestamp(s.to_string()))
}

/// Entity id inside a path. Range against capacity is the model's job.
pub fn parse_id(s: &str) -> Result<u8, DecodeError> {
    if !is_decimal(s) {
        return Err(DecodeError::InvalidId(s.to_string()));
    }
    s.parse::<u8>().map_err(|_| DecodeError::InvalidId(s.to_string()))
}
