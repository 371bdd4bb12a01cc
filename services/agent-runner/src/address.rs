//! Validated account address handling
//!
//! Every externally supplied address (deposit wallets, contract targets,
//! scanned payment recipients) passes through this one parser.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A hex account address, stored in lowercase canonical form.
///
/// Accepted input format: `0x` followed by exactly 40 hex digits, any
/// case. No other encodings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AddressParseError {
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("address must be 40 hex digits, got {0} characters")]
    BadLength(usize),

    #[error("address contains non-hex characters: {0}")]
    NotHex(String),
}

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive an address from raw public key bytes: last 20 bytes of the
    /// SHA-256 digest, hex encoded.
    pub fn from_public_key(key: &[u8]) -> Self {
        let digest = Sha256::digest(key);
        let tail = &digest[digest.len() - 20..];
        Address(format!("0x{}", hex::encode(tail)))
    }

    /// Find the first valid address token in free-form text (e.g. scanned
    /// payment QR payloads). Tokens are split on non-alphanumeric
    /// boundaries and each candidate goes through the normal parser.
    pub fn scan_text(text: &str) -> Option<Address> {
        text.split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(|tok| tok.parse().ok())
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| AddressParseError::MissingPrefix(s.to_string()))?;

        if body.len() != 40 {
            return Err(AddressParseError::BadLength(body.len()));
        }
        if !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressParseError::NotHex(s.to_string()));
        }

        Ok(Address(format!("0x{}", body.to_ascii_lowercase())))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}
