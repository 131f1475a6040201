//! Fiscal year pairs such as `2023-2024`.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A validated `YYYY-YYYY` tax year whose end year is its start year plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxYear {
    start: u16,
}

/// Why a tax year string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaxYearError {
    #[error("tax year '{0}' must have the form YYYY-YYYY")]
    Format(String),
    #[error("tax year '{0}' must span consecutive years (end = start + 1)")]
    NotConsecutive(String),
}

impl TaxYear {
    #[must_use]
    pub const fn start_year(self) -> u16 {
        self.start
    }

    #[must_use]
    pub const fn end_year(self) -> u16 {
        self.start + 1
    }
}

fn four_digits(part: &str) -> Option<u16> {
    if part.len() == 4 && part.bytes().all(|b| b.is_ascii_digit()) {
        part.parse().ok()
    } else {
        None
    }
}

impl FromStr for TaxYear {
    type Err = TaxYearError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .and_then(|(a, b)| Some((four_digits(a)?, four_digits(b)?)))
            .ok_or_else(|| TaxYearError::Format(s.to_string()))?;

        if u32::from(end) != u32::from(start) + 1 {
            return Err(TaxYearError::NotConsecutive(s.to_string()));
        }

        Ok(Self { start })
    }
}

impl TryFrom<String> for TaxYear {
    type Error = TaxYearError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaxYear> for String {
    fn from(value: TaxYear) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TaxYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:04}", self.start_year(), self.end_year())
    }
}

#[cfg(test)]
mod tests {
    use super::{TaxYear, TaxYearError};
    use proptest::prelude::*;

    #[test]
    fn accepts_consecutive_years() {
        let year: TaxYear = "2023-2024".parse().unwrap();
        assert_eq!(year.start_year(), 2023);
        assert_eq!(year.end_year(), 2024);
        assert_eq!(year.to_string(), "2023-2024");
    }

    #[test]
    fn rejects_malformed_and_gapped_years() {
        assert!(matches!(
            "2023".parse::<TaxYear>(),
            Err(TaxYearError::Format(_))
        ));
        assert!(matches!(
            "2023-24".parse::<TaxYear>(),
            Err(TaxYearError::Format(_))
        ));
        assert!(matches!(
            "2023/2024".parse::<TaxYear>(),
            Err(TaxYearError::Format(_))
        ));
        assert!(matches!(
            "+023-2024".parse::<TaxYear>(),
            Err(TaxYearError::Format(_))
        ));
        assert!(matches!(
            "2023-2025".parse::<TaxYear>(),
            Err(TaxYearError::NotConsecutive(_))
        ));
        assert!(matches!(
            "2024-2023".parse::<TaxYear>(),
            Err(TaxYearError::NotConsecutive(_))
        ));
    }

    #[test]
    fn serde_uses_string_form() {
        let year: TaxYear = "2021-2022".parse().unwrap();
        assert_eq!(serde_json::to_string(&year).unwrap(), "\"2021-2022\"");
        assert!(serde_json::from_str::<TaxYear>("\"2021-2023\"").is_err());
    }

    proptest! {
        #[test]
        fn parse_succeeds_iff_end_is_start_plus_one(start in 1000u16..9999, end in 1000u16..=9999) {
            let raw = format!("{start:04}-{end:04}");
            let parsed = raw.parse::<TaxYear>();
            prop_assert_eq!(parsed.is_ok(), u32::from(end) == u32::from(start) + 1);
            if let Ok(year) = parsed {
                prop_assert_eq!(year.to_string(), raw);
            }
        }
    }
}
