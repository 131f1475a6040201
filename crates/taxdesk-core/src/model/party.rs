//! Read-only views of clients and professionals consulted by the engine.

use super::filing::{ClientId, ParseEnumError, UserId, normalize};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Account role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Ca,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Ca => "ca",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "customer" => Ok(Self::Customer),
            "ca" => Ok(Self::Ca),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseEnumError {
                expected: "role",
                got: s.to_string(),
            }),
        }
    }
}

/// A client tax profile as resolved by the client directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    /// CA seeded onto every new filing for this client.
    pub default_ca_id: Option<UserId>,
}

/// A user as resolved by the professional directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professional {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
}

impl Professional {
    /// Why this user may not hold a filing assignment right now, if anything.
    #[must_use]
    pub fn assignment_refusal(&self) -> Option<String> {
        if self.role != Role::Ca {
            Some(format!("role is {}, not ca", self.role))
        } else if !self.is_active {
            Some("user is inactive".to_string())
        } else {
            None
        }
    }
}
