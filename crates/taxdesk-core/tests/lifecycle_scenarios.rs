//! End-to-end engine scenarios against a file-backed store.
//!
//! - create, walk to review, refuse a move the table does not allow
//! - assign, reassign, unassign, unassign again
//! - tax-year acceptance
//! - deletion only while in draft

use taxdesk_core::model::{Client, FilingStatus, Professional, Role};
use taxdesk_core::{
    CreateFiling, EngineConfig, Entity, FilingEngine, FilingError, FilingFilter, SqliteStore,
    StatsScope,
};
use tempfile::TempDir;

type Engine<'a> = FilingEngine<&'a SqliteStore, &'a SqliteStore, &'a SqliteStore>;

fn open_store() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = SqliteStore::open(&dir.path().join("taxdesk.sqlite3")).expect("open store");

    for (id, role, is_active) in [
        (9, Role::Ca, true),
        (11, Role::Ca, true),
        (13, Role::Ca, false),
        (21, Role::Customer, true),
    ] {
        store
            .upsert_professional(
                &Professional {
                    id,
                    name: format!("user {id}"),
                    role,
                    is_active,
                },
                0,
            )
            .expect("seed professional");
    }
    store
        .upsert_client(
            &Client {
                id: 5,
                name: "Meera Iyer".to_string(),
                default_ca_id: None,
            },
            0,
        )
        .expect("seed client");

    (dir, store)
}

fn engine(store: &SqliteStore) -> Engine<'_> {
    FilingEngine::new(store, store, store, EngineConfig::default())
}

fn individual(tax_year: &str) -> CreateFiling {
    CreateFiling {
        client_id: Some(5),
        tax_year: Some(tax_year.to_string()),
        filing_type: Some("individual".to_string()),
        ..CreateFiling::default()
    }
}

#[test]
fn scenario_create_review_and_refuse_back_to_draft() {
    let (_dir, store) = open_store();
    let engine = engine(&store);

    let filing = engine
        .create_filing(individual("2023-2024"))
        .expect("create filing");
    assert_eq!(filing.status, FilingStatus::Draft);

    engine
        .transition(
            filing.id,
            FilingStatus::InProgress,
            Some("documents collected"),
        )
        .expect("draft -> in_progress");
    let reviewed = engine
        .transition(
            filing.id,
            FilingStatus::UnderReview,
            Some("ready for review"),
        )
        .expect("in_progress -> under_review");
    assert_eq!(reviewed.status, FilingStatus::UnderReview);

    let err = engine
        .transition(filing.id, FilingStatus::Draft, None)
        .expect_err("under_review -> draft is not in the table");
    assert!(matches!(err, FilingError::InvalidTransition(_)));
    assert_eq!(err.code().code(), "E4001");

    let back = engine
        .transition(filing.id, FilingStatus::InProgress, Some("needs rework"))
        .expect("under_review -> in_progress is in the table");
    assert_eq!(back.status, FilingStatus::InProgress);
    assert_eq!(
        back.notes.as_deref(),
        Some("documents collected\nready for review\nneeds rework")
    );

    let walk: Vec<_> = engine
        .status_history(filing.id)
        .expect("history")
        .into_iter()
        .map(|change| (change.from_status, change.to_status))
        .collect();
    assert_eq!(
        walk,
        vec![
            (FilingStatus::Draft, FilingStatus::InProgress),
            (FilingStatus::InProgress, FilingStatus::UnderReview),
            (FilingStatus::UnderReview, FilingStatus::InProgress),
        ]
    );
}

#[test]
fn scenario_assign_reassign_unassign() {
    let (_dir, store) = open_store();
    let engine = engine(&store);
    let filing = engine
        .create_filing(individual("2023-2024"))
        .expect("create filing");

    let assigned = engine.assign_ca(filing.id, 9).expect("assign 9");
    assert_eq!(assigned.assigned_ca_id, Some(9));

    let reassigned = engine.assign_ca(filing.id, 11).expect("reassign 11");
    assert_eq!(reassigned.assigned_ca_id, Some(11));

    let cleared = engine.unassign_ca(filing.id).expect("unassign");
    assert_eq!(cleared.assigned_ca_id, None);

    let err = engine.unassign_ca(filing.id).expect_err("second unassign");
    assert!(matches!(err, FilingError::NoAssignment(_)));
}

#[test]
fn assignment_eligibility() {
    let (_dir, store) = open_store();
    let engine = engine(&store);
    let filing = engine
        .create_filing(individual("2023-2024"))
        .expect("create filing");

    for user in [13, 21] {
        let err = engine.assign_ca(filing.id, user).expect_err("ineligible");
        assert!(matches!(err, FilingError::InvalidAssignee { .. }));
    }
    let err = engine.assign_ca(filing.id, 99).expect_err("unknown user");
    assert!(matches!(
        err,
        FilingError::NotFound {
            entity: Entity::User,
            id: 99
        }
    ));
    assert_eq!(
        engine.get_filing(filing.id).expect("get").assigned_ca_id,
        None
    );
}

#[test]
fn tax_year_acceptance() {
    let (_dir, store) = open_store();
    let engine = engine(&store);

    for rejected in ["2023-2025", "2023", "2023-2023", "23-24", "2023/2024", " 2023-2024"] {
        let err = engine
            .create_filing(individual(rejected))
            .expect_err(rejected);
        assert!(
            matches!(err, FilingError::Validation(_)),
            "{rejected}: {err:?}"
        );
    }

    for accepted in ["2023-2024", "1999-2000"] {
        engine.create_filing(individual(accepted)).expect(accepted);
    }
}

#[test]
fn deletion_only_in_draft() {
    let (_dir, store) = open_store();
    let engine = engine(&store);

    let keep = engine
        .create_filing(individual("2022-2023"))
        .expect("create");
    engine
        .transition(keep.id, FilingStatus::InProgress, None)
        .expect("start");
    let err = engine.delete_filing(keep.id).expect_err("in progress");
    assert!(matches!(err, FilingError::IllegalState { .. }));
    assert_eq!(err.code().code(), "E4004");

    let drop = engine
        .create_filing(individual("2023-2024"))
        .expect("create");
    engine.delete_filing(drop.id).expect("delete draft");

    let page = engine
        .list_filings(FilingFilter::default())
        .expect("list");
    assert_eq!(page.total, 1);
    assert_eq!(page.filings[0].id, keep.id);

    let stats = engine.statistics(StatsScope::default()).expect("stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_status[&FilingStatus::InProgress], 1);
}

#[test]
fn store_survives_reopen() {
    let (dir, store) = open_store();
    let id = engine(&store)
        .create_filing(individual("2023-2024"))
        .expect("create")
        .id;
    drop(store);

    let reopened = SqliteStore::open(&dir.path().join("taxdesk.sqlite3")).expect("reopen");
    let filing = engine(&reopened).get_filing(id).expect("still there");
    assert_eq!(filing.tax_year.to_string(), "2023-2024");
}
