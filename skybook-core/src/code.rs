use crate::BookingError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CODE_PREFIX: &str = "VN_";
pub const CODE_SUFFIX_LEN: usize = 6;

/// Human-facing booking reference, `VN_` followed by six ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookingCode(String);

impl BookingCode {
    pub fn parse(raw: &str) -> Result<Self, BookingError> {
        let suffix = raw
            .strip_prefix(CODE_PREFIX)
            .ok_or_else(|| BookingError::InvalidArgument(format!("booking code '{}' lacks {} prefix", raw, CODE_PREFIX)))?;

        if suffix.len() != CODE_SUFFIX_LEN || !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BookingError::InvalidArgument(format!(
                "booking code '{}' must end in {} alphanumeric characters",
                raw, CODE_SUFFIX_LEN
            )));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BookingCode {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BookingCode::parse(&value)
    }
}

impl From<BookingCode> for String {
    fn from(code: BookingCode) -> Self {
        code.0
    }
}

/// Source of fresh booking codes. Uniqueness is enforced by the ledger, not here.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> BookingCode;
}

/// Uniform draw over `[a-zA-Z0-9]`, 62^6 possible suffixes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> BookingCode {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CODE_SUFFIX_LEN)
            .map(char::from)
            .collect();
        BookingCode(format!("{}{}", CODE_PREFIX, suffix))
    }
}
