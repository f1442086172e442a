use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MembershipError, MembershipResult};

/// Length of a canonical address including the `0x` prefix
const ADDRESS_LEN: usize = 42;

/// A wallet address in canonical lower-case form (`0x` + 40 hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and normalise an address. Surrounding whitespace is ignored
    /// and hex digits are lower-cased.
    pub fn parse(raw: &str) -> MembershipResult<Self> {
        let normalized = raw.trim().to_ascii_lowercase();

        let valid = normalized.len() == ADDRESS_LEN
            && normalized.starts_with("0x")
            && normalized[2..].bytes().all(|b| b.is_ascii_hexdigit());

        if !valid {
            return Err(MembershipError::Validation(format!(
                "invalid wallet address: {}",
                raw
            )));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = MembershipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = MembershipError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lowercases_mixed_case() {
        let addr = Address::parse("0xABCDEF0123456789abcdef0123456789ABCDEF01").unwrap();
        assert_eq!(addr.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn parse_trims_whitespace() {
        let addr = Address::parse("  0x00000000000000000000000000000000000000aa ").unwrap();
        assert_eq!(addr.as_str(), "0x00000000000000000000000000000000000000aa");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in [
            "",
            "0x",
            "abcdef0123456789abcdef0123456789abcdef0123",
            "0xabcdef0123456789abcdef0123456789abcdef0",
            "0xabcdef0123456789abcdef0123456789abcdef012",
            "0xzzcdef0123456789abcdef0123456789abcdef01",
        ] {
            assert!(
                matches!(Address::parse(raw), Err(MembershipError::Validation(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn deserializes_through_validation() {
        let ok: Address =
            serde_json::from_str("\"0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA\"").unwrap();
        assert_eq!(ok.as_str(), "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

        let bad: Result<Address, _> = serde_json::from_str("\"not-an-address\"");
        assert!(bad.is_err());
    }
}
