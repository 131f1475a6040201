use crate::lifecycle::InvalidTransition;
use crate::model::{FilingId, FilingStatus};
use crate::store::StoreError;
use std::fmt;

/// Machine-readable error codes for presentation layers and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ValidationFailed,
    FilingNotFound,
    ClientNotFound,
    UserNotFound,
    DuplicateFiling,
    ConcurrentUpdate,
    InvalidStateTransition,
    InvalidAssignee,
    NoAssignment,
    NotDeletable,
    StoreUnavailable,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ValidationFailed => "E1002",
            Self::FilingNotFound => "E2001",
            Self::ClientNotFound => "E2002",
            Self::UserNotFound => "E2003",
            Self::DuplicateFiling => "E3001",
            Self::ConcurrentUpdate => "E3002",
            Self::InvalidStateTransition => "E4001",
            Self::InvalidAssignee => "E4002",
            Self::NoAssignment => "E4003",
            Self::NotDeletable => "E4004",
            Self::StoreUnavailable => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ValidationFailed => "Invalid input",
            Self::FilingNotFound => "Filing not found",
            Self::ClientNotFound => "Client not found",
            Self::UserNotFound => "User not found",
            Self::DuplicateFiling => "Filing already exists",
            Self::ConcurrentUpdate => "Filing changed concurrently",
            Self::InvalidStateTransition => "Invalid status transition",
            Self::InvalidAssignee => "User cannot be assigned",
            Self::NoAssignment => "No CA assigned",
            Self::NotDeletable => "Filing cannot be deleted",
            Self::StoreUnavailable => "Filing store unavailable",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .taxdesk/config.toml and retry."),
            Self::ValidationFailed => Some("Tax years look like 2023-2024; check required fields."),
            Self::FilingNotFound | Self::ClientNotFound | Self::UserNotFound => None,
            Self::DuplicateFiling => {
                Some("Each client has one filing per tax year and filing type.")
            }
            Self::ConcurrentUpdate => Some("Reload the filing and retry the change."),
            Self::InvalidStateTransition => Some(
                "Follow valid transitions: draft -> in_progress -> under_review -> completed.",
            ),
            Self::InvalidAssignee => Some("Only active users with the CA role can be assigned."),
            Self::NoAssignment => None,
            Self::NotDeletable => Some("Only draft filings can be deleted."),
            Self::StoreUnavailable => Some("Retry after the database is reachable again."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// What kind of record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Filing,
    Client,
    User,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Filing => "filing",
            Self::Client => "client",
            Self::User => "user",
        })
    }
}

/// Failures returned by every engine operation.
#[derive(Debug, thiserror::Error)]
pub enum FilingError {
    /// Malformed or missing required input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced filing, client or user does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    /// Duplicate filing, or an optimistic-concurrency race that was lost.
    #[error("conflict: {message}")]
    Conflict { message: String, duplicate: bool },

    /// Requested status is not an allowed next status.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Target user is not an active CA.
    #[error("user {user_id} cannot be assigned: {reason}")]
    InvalidAssignee { user_id: i64, reason: String },

    /// Unassign requested while nothing is assigned.
    #[error("filing {0} has no assigned CA")]
    NoAssignment(FilingId),

    /// Operation not permitted in the filing's current status.
    #[error("filing {filing_id} is {status}: {message}")]
    IllegalState {
        filing_id: FilingId,
        status: FilingStatus,
        message: String,
    },

    /// The store failed or timed out; retryable.
    #[error("filing store unavailable: {0}")]
    Unavailable(String),

    /// Unexpected internal fault.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl FilingError {
    /// Machine-readable code associated with this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::NotFound { entity, .. } => match entity {
                Entity::Filing => ErrorCode::FilingNotFound,
                Entity::Client => ErrorCode::ClientNotFound,
                Entity::User => ErrorCode::UserNotFound,
            },
            Self::Conflict {
                duplicate: true, ..
            } => ErrorCode::DuplicateFiling,
            Self::Conflict { .. } => ErrorCode::ConcurrentUpdate,
            Self::InvalidTransition(_) => ErrorCode::InvalidStateTransition,
            Self::InvalidAssignee { .. } => ErrorCode::InvalidAssignee,
            Self::NoAssignment(_) => ErrorCode::NoAssignment,
            Self::IllegalState { .. } => ErrorCode::NotDeletable,
            Self::Unavailable(_) => ErrorCode::StoreUnavailable,
            Self::Internal(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Stable snake-case failure kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::InvalidAssignee { .. } => "invalid_assignee",
            Self::NoAssignment(_) => "no_assignment",
            Self::IllegalState { .. } => "illegal_state",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_)
                | Self::Conflict {
                    duplicate: false,
                    ..
                }
        )
    }

    pub(crate) const fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub(crate) fn duplicate(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            duplicate: true,
        }
    }

    pub(crate) fn lost_race(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            duplicate: false,
        }
    }
}

impl From<InvalidTransition> for FilingError {
    fn from(err: InvalidTransition) -> Self {
        Self::InvalidTransition(err.to_string())
    }
}

impl From<StoreError> for FilingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => Self::duplicate(message),
            StoreError::Unavailable(message) => Self::Unavailable(message),
            StoreError::Internal(source) => Self::Internal(source),
        }
    }
}
