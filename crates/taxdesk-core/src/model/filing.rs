use super::tax_year::TaxYear;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Store-assigned filing identifier.
pub type FilingId = i64;
/// Client profile identifier.
pub type ClientId = i64;
/// User identifier (customers, CAs and admins share one id space).
pub type UserId = i64;

/// The three kinds of filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingType {
    Individual,
    Business,
    CapitalGains,
}

impl FilingType {
    pub const ALL: [Self; 3] = [Self::Individual, Self::Business, Self::CapitalGains];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Business => "business",
            Self::CapitalGains => "capital_gains",
        }
    }
}

/// The five lifecycle states of a filing.
///
/// Allowed moves between them live in [`crate::lifecycle`]; nothing else
/// decides whether a status change is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    Draft,
    InProgress,
    UnderReview,
    Completed,
    Rejected,
}

impl FilingStatus {
    pub const ALL: [Self; 5] = [
        Self::Draft,
        Self::InProgress,
        Self::UnderReview,
        Self::Completed,
        Self::Rejected,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::UnderReview => "under_review",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

/// Work priority of a filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// One tax-filing case for one client, tax year and filing type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filing {
    pub id: FilingId,
    pub client_id: ClientId,
    pub tax_year: TaxYear,
    pub filing_type: FilingType,
    pub status: FilingStatus,
    pub priority: Priority,
    pub assigned_ca_id: Option<UserId>,
    pub due_date: Option<NaiveDate>,
    pub income: Option<serde_json::Value>,
    pub deductions: Option<serde_json::Value>,
    pub summary: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

/// A fully validated filing ready to be inserted by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFiling {
    pub client_id: ClientId,
    pub tax_year: TaxYear,
    pub filing_type: FilingType,
    pub priority: Priority,
    pub assigned_ca_id: Option<UserId>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at_us: i64,
}

/// One recorded status change of a filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub filing_id: FilingId,
    pub from_status: FilingStatus,
    pub to_status: FilingStatus,
    pub note: Option<String>,
    pub changed_at_us: i64,
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {expected}: '{got}'")]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for FilingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase().replace('-', "_")
}

impl FromStr for FilingType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "individual" => Ok(Self::Individual),
            "business" => Ok(Self::Business),
            "capital_gains" => Ok(Self::CapitalGains),
            _ => Err(ParseEnumError {
                expected: "filing type",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for FilingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "draft" => Ok(Self::Draft),
            "in_progress" => Ok(Self::InProgress),
            "under_review" => Ok(Self::UnderReview),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}
