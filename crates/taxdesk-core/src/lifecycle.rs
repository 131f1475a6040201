//! Filing status state machine.
//!
//! The whole rule set is the [`TRANSITIONS`] table. `completed` is terminal
//! and `draft` is the state every filing is created in.

use crate::model::FilingStatus;

/// Allowed next states for each current state.
pub const TRANSITIONS: &[(FilingStatus, &[FilingStatus])] = &[
    (
        FilingStatus::Draft,
        &[FilingStatus::InProgress, FilingStatus::Rejected],
    ),
    (
        FilingStatus::InProgress,
        &[
            FilingStatus::UnderReview,
            FilingStatus::Draft,
            FilingStatus::Rejected,
        ],
    ),
    (
        FilingStatus::UnderReview,
        &[
            FilingStatus::Completed,
            FilingStatus::InProgress,
            FilingStatus::Rejected,
        ],
    ),
    (FilingStatus::Completed, &[]),
    (
        FilingStatus::Rejected,
        &[FilingStatus::Draft, FilingStatus::InProgress],
    ),
];

/// Status assigned to every newly created filing.
pub const INITIAL_STATUS: FilingStatus = FilingStatus::Draft;

/// Error returned when a status change is not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move filing from {from} to {to}: {reason}")]
pub struct InvalidTransition {
    pub from: FilingStatus,
    pub to: FilingStatus,
    pub reason: &'static str,
}

/// Statuses reachable in one step from `from`.
#[must_use]
pub fn allowed_next(from: FilingStatus) -> &'static [FilingStatus] {
    for (status, next) in TRANSITIONS {
        if *status == from {
            return *next;
        }
    }
    &[]
}

#[must_use]
pub fn is_terminal(status: FilingStatus) -> bool {
    allowed_next(status).is_empty()
}

/// Validate a move from `from` to `to` against the transition table.
///
/// # Errors
///
/// Returns [`InvalidTransition`] when `to` is not an allowed next state.
pub fn check_transition(from: FilingStatus, to: FilingStatus) -> Result<(), InvalidTransition> {
    if allowed_next(from).contains(&to) {
        return Ok(());
    }

    let reason = if is_terminal(from) {
        "status is terminal"
    } else if from == to {
        "no-op transition is not allowed"
    } else {
        "transition not allowed by filing lifecycle rules"
    };

    Err(InvalidTransition { from, to, reason })
}

/// Whether a filing in `status` may be deleted.
#[must_use]
pub fn is_deletable(status: FilingStatus) -> bool {
    status == INITIAL_STATUS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FilingStatus::{Completed, Draft, InProgress, Rejected, UnderReview};
    use proptest::prelude::*;

    #[test]
    fn table_covers_every_status_once() {
        for status in FilingStatus::ALL {
            let rows = TRANSITIONS.iter().filter(|(s, _)| *s == status).count();
            assert_eq!(rows, 1, "status {status} must appear exactly once");
        }
    }

    #[test]
    fn allowed_transitions() {
        for (from, to) in [
            (Draft, InProgress),
            (Draft, Rejected),
            (InProgress, UnderReview),
            (InProgress, Draft),
            (InProgress, Rejected),
            (UnderReview, Completed),
            (UnderReview, InProgress),
            (UnderReview, Rejected),
            (Rejected, Draft),
            (Rejected, InProgress),
        ] {
            assert!(check_transition(from, to).is_ok(), "{from} -> {to}");
        }
    }

    #[test]
    fn rejected_transitions() {
        assert!(matches!(
            check_transition(UnderReview, Draft),
            Err(InvalidTransition {
                from: UnderReview,
                to: Draft,
                ..
            })
        ));
        assert!(check_transition(Draft, UnderReview).is_err());
        assert!(check_transition(Draft, Completed).is_err());
        assert!(check_transition(Rejected, Completed).is_err());
        assert!(check_transition(Rejected, UnderReview).is_err());
    }

    #[test]
    fn completed_is_terminal() {
        assert!(is_terminal(Completed));
        for to in FilingStatus::ALL {
            let err = check_transition(Completed, to).unwrap_err();
            assert_eq!(err.reason, "status is terminal");
        }
    }

    #[test]
    fn same_state_is_a_noop_error() {
        let err = check_transition(InProgress, InProgress).unwrap_err();
        assert_eq!(err.reason, "no-op transition is not allowed");
    }

    #[test]
    fn only_draft_is_deletable() {
        for status in FilingStatus::ALL {
            assert_eq!(is_deletable(status), status == Draft);
        }
    }

    fn any_status() -> impl Strategy<Value = FilingStatus> {
        prop::sample::select(FilingStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn check_agrees_with_table(from in any_status(), to in any_status()) {
            let listed = TRANSITIONS
                .iter()
                .any(|(s, next)| *s == from && next.contains(&to));
            prop_assert_eq!(check_transition(from, to).is_ok(), listed);
        }

        #[test]
        fn accepted_walks_never_leave_completed(requests in prop::collection::vec(any_status(), 0..40)) {
            let mut current = INITIAL_STATUS;
            for next in requests {
                let was_completed = current == Completed;
                if check_transition(current, next).is_ok() {
                    prop_assert!(!was_completed);
                    current = next;
                }
            }
        }
    }
}
