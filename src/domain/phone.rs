use crate::error::BillingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A Kenyan mobile number in the `2547XXXXXXXX` / `2541XXXXXXXX` form the
/// STK push API expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, BillingError> {
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        // `+` is only allowed in front of the country code.
        let subscriber = cleaned
            .strip_prefix("+254")
            .or_else(|| cleaned.strip_prefix("254"))
            .or_else(|| cleaned.strip_prefix('0'))
            .unwrap_or_default();

        let valid = subscriber.len() == 9
            && subscriber.chars().all(|c| c.is_ascii_digit())
            && (subscriber.starts_with('7') || subscriber.starts_with('1'));

        if valid {
            Ok(Self(format!("254{subscriber}")))
        } else {
            Err(BillingError::validation(format!(
                "Invalid mobile number: {raw}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PhoneNumber {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
