//! Provider integration tests.
//!
//! Tests:
//! - Batch atomicity and back references
//! - Alternatives: first success wins, all-fail commits nothing
//! - Record routing and argument resolution through real queries
//! - Transaction context nesting and re-entry

mod common;

use std::sync::Arc;
use std::thread;

use common::{note, set, TestFixture, NOTES, SUMMARIES, TAGS};
use rowgate::provider::{ContentValues, OperationResult, WriteOperation};
use rowgate::query::{arguments, ArgValue, QueryArguments, SortDirection, COUNT_COLUMN};
use rowgate::route::{Identifier, RouteTable};
use rowgate::selection;
use rowgate::StoreError;
use rusqlite::types::Value;

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

#[test]
fn test_batch_failure_leaves_no_rows() {
    let fixture = TestFixture::new();
    let group = vec![
        WriteOperation::insert(NOTES, note("a")),
        WriteOperation::insert(NOTES, note("b")),
        WriteOperation::insert(NOTES, note("a")),
    ];

    let err = fixture.provider.apply_batch(&group).unwrap_err();

    assert!(matches!(err, StoreError::OperationFailure { index: 2, .. }));
    assert!(fixture.titles().is_empty());
    assert!(fixture.deliveries().is_empty());
}

#[test]
fn test_batch_success_delivers_once() {
    let fixture = TestFixture::new();
    let group = vec![
        WriteOperation::insert(NOTES, note("a")),
        WriteOperation::insert(NOTES, note("b")),
    ];

    let results = fixture.provider.apply_batch(&group).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(fixture.titles(), vec!["a", "b"]);
    assert_eq!(fixture.deliveries(), vec![set(&[NOTES, SUMMARIES])]);
}

#[test]
fn test_back_reference_links_rows() {
    let fixture = TestFixture::new();
    let group = vec![
        WriteOperation::insert(NOTES, note("tagged")),
        WriteOperation::insert(
            TAGS,
            ContentValues::new()
                .put("name", "work")
                .put_back_reference("note_id", 0),
        ),
    ];

    let results = fixture.provider.apply_batch(&group).unwrap();
    let OperationResult::Inserted { id: note_id, .. } = &results[0] else {
        panic!("expected insert result, got {:?}", results[0]);
    };

    let tags = fixture
        .provider
        .query(TAGS, Some(&["note_id".to_string()]), &QueryArguments::new())
        .unwrap();
    assert_eq!(tags.rows, vec![vec![Value::Integer(*note_id)]]);

    // The tag insert adds tags and notes; the note insert adds summaries.
    assert_eq!(fixture.deliveries(), vec![set(&[NOTES, SUMMARIES, TAGS])]);
}

#[test]
fn test_alternatives_first_success_wins() {
    let fixture = TestFixture::new();
    fixture.provider.insert(NOTES, note("taken")).unwrap();

    let groups = vec![
        vec![WriteOperation::insert(NOTES, note("taken"))],
        vec![WriteOperation::insert(NOTES, note("second"))],
        vec![WriteOperation::insert(NOTES, note("third"))],
    ];
    let outcome = fixture.provider.apply_alternatives(&groups).unwrap();

    assert_eq!(outcome.index, 1);
    assert_eq!(fixture.titles(), vec!["taken", "second"]);
}

#[test]
fn test_alternatives_clean_first_group_notifies() {
    let fixture = TestFixture::new();
    let groups = vec![
        vec![WriteOperation::insert(NOTES, note("first"))],
        vec![WriteOperation::insert(NOTES, note("second"))],
    ];

    let outcome = fixture.provider.apply_alternatives(&groups).unwrap();

    assert_eq!(outcome.index, 0);
    assert_eq!(fixture.deliveries(), vec![set(&[NOTES, SUMMARIES])]);
}

#[test]
fn test_failed_alternative_does_not_suppress_winner_notification() {
    let fixture = TestFixture::new();
    fixture.provider.insert(NOTES, note("taken")).unwrap();

    let groups = vec![
        vec![WriteOperation::insert(NOTES, note("taken"))],
        vec![WriteOperation::insert(NOTES, note("second"))],
    ];
    let outcome = fixture.provider.apply_alternatives(&groups).unwrap();

    assert_eq!(outcome.index, 1);
    assert_eq!(fixture.titles(), vec!["taken", "second"]);
    let deliveries = fixture.deliveries();
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[1], set(&[NOTES, SUMMARIES]));
}

#[test]
fn test_alternatives_all_failing() {
    let fixture = TestFixture::new();
    fixture.provider.insert(NOTES, note("taken")).unwrap();

    let groups = vec![
        vec![
            WriteOperation::insert(NOTES, note("partial")),
            WriteOperation::insert(NOTES, note("taken")),
        ],
        vec![WriteOperation::delete(NOTES).with_expected_count(10)],
    ];
    let err = fixture.provider.apply_alternatives(&groups).unwrap_err();

    assert!(matches!(err, StoreError::NoGroupSucceeded { attempted: 2 }));
    assert_eq!(fixture.titles(), vec!["taken"]);
    assert_eq!(fixture.deliveries().len(), 1);
}

#[test]
fn test_alternatives_infrastructure_failure_skips_remaining_groups() {
    let fixture = TestFixture::new();
    fixture.provider.insert(NOTES, note("taken")).unwrap();

    // Cap the file at its current size so any new page fails with SQLITE_FULL.
    fixture
        .provider
        .database()
        .writer()
        .unwrap()
        .pragma_update(None, "max_page_count", 1)
        .unwrap();

    let groups = vec![
        vec![WriteOperation::insert(NOTES, note(&"x".repeat(256 * 1024)))],
        vec![WriteOperation::delete(NOTES).with_selection("title = ?", &["taken"])],
    ];
    let err = fixture.provider.apply_alternatives(&groups).unwrap_err();

    assert!(matches!(err, StoreError::Infrastructure(_)), "got {err:?}");
    assert!(err.is_infrastructure());
    assert_eq!(fixture.titles(), vec!["taken"]);
    assert_eq!(fixture.deliveries().len(), 1);
}

#[test]
fn test_panicking_transaction_does_not_block_later_writes() {
    let fixture = TestFixture::new();

    let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        fixture
            .provider
            .run_in_transaction(|tx| -> Result<(), StoreError> {
                tx.insert(NOTES, note("lost"))?;
                panic!("transaction body panicked");
            })
    }));
    assert!(panicked.is_err());

    fixture.provider.insert(NOTES, note("kept")).unwrap();

    assert_eq!(fixture.titles(), vec!["kept"]);
    assert_eq!(fixture.deliveries(), vec![set(&[NOTES, SUMMARIES])]);
}

#[test]
fn test_alternatives_update_if_version_matches_else_insert() {
    let fixture = TestFixture::new();
    fixture.provider.insert(NOTES, note("doc")).unwrap();

    let groups = |version: &str| {
        vec![
            vec![WriteOperation::update(
                NOTES,
                ContentValues::new().put("status", "edited"),
            )
            .with_selection("title = ? AND version = ?", &["doc", version])
            .with_expected_count(1)],
            vec![WriteOperation::insert(NOTES, note("doc (conflict)"))],
        ]
    };

    let stale = fixture.provider.apply_alternatives(&groups("7")).unwrap();
    assert_eq!(stale.index, 1);

    let current = fixture.provider.apply_alternatives(&groups("1")).unwrap();
    assert_eq!(current.index, 0);
    assert_eq!(current.results, vec![OperationResult::Affected { count: 1 }]);
}

#[test]
fn test_alternatives_unrecognized_identifier_aborts_before_running() {
    let fixture = TestFixture::new();
    let groups = vec![
        vec![WriteOperation::insert(NOTES, note("never"))],
        vec![WriteOperation::insert("content://notes.provider/missing", note("x"))],
    ];

    let err = fixture.provider.apply_alternatives(&groups).unwrap_err();

    assert!(matches!(err, StoreError::UnrecognizedIdentifier(_)));
    assert!(fixture.titles().is_empty());
}

#[test]
fn test_assert_operation_guards_group() {
    let fixture = TestFixture::new();
    let group = vec![
        WriteOperation::assert_count(NOTES, 0).with_selection("title = ?", &["unique"]),
        WriteOperation::insert(NOTES, note("unique")),
    ];

    fixture.provider.apply_batch(&group).unwrap();
    let err = fixture.provider.apply_batch(&group).unwrap_err();

    assert!(matches!(err, StoreError::OperationFailure { index: 0, .. }));
    assert_eq!(fixture.titles(), vec!["unique"]);
}

#[test]
fn test_record_routing_restricts_update() {
    let fixture = TestFixture::new();
    fixture
        .provider
        .insert("content://notes.provider/notes/42", note("answer"))
        .unwrap();
    fixture.provider.insert(NOTES, note("other")).unwrap();

    let record = "content://notes.provider/notes/42";
    let changed = fixture
        .provider
        .update(
            record,
            ContentValues::new().put("status", "done"),
            Some("status = ?"),
            &["active"],
        )
        .unwrap();
    assert_eq!(changed, 1);

    let again = fixture
        .provider
        .update(
            record,
            ContentValues::new().put("status", "done"),
            Some("status = ?"),
            &["active"],
        )
        .unwrap();
    assert_eq!(again, 0);

    let statuses = fixture
        .provider
        .query(
            NOTES,
            Some(&["status".to_string()]),
            &QueryArguments::new().with_sort_sql("_id"),
        )
        .unwrap();
    assert_eq!(statuses.rows, vec![vec![text("done")], vec![text("active")]]);
}

#[test]
fn test_record_selection_shape() {
    let identifier = Identifier::parse("content://notes.provider/notes/42").unwrap();
    let route = common::routes().match_identifier(&identifier).unwrap();

    let sel = selection::build(&route, &identifier, Some("status = ?"), &["active".to_string()])
        .unwrap();

    assert_eq!(sel.clause, "_id = ? AND (status = ?)");
    assert_eq!(sel.args, vec!["42".to_string(), "active".to_string()]);
}

#[test]
fn test_invalid_limit_does_not_block_sort() {
    let fixture = TestFixture::new();
    for title in ["c", "a", "b"] {
        fixture.provider.insert(NOTES, note(title)).unwrap();
    }

    let args = QueryArguments::new()
        .with_limit(-1)
        .with_sort_columns(&["title"], SortDirection::Asc);
    let result = fixture
        .provider
        .query(NOTES, Some(&["title".to_string()]), &args)
        .unwrap();

    assert!(!result.honored_arguments.contains(arguments::LIMIT));
    assert!(result.honored_arguments.contains(arguments::SORT_COLUMNS));
    assert_eq!(result.rows, vec![vec![text("a")], vec![text("b")], vec![text("c")]]);
}

#[test]
fn test_legacy_limit_and_argument_precedence() {
    let fixture = TestFixture::new();
    for title in ["a", "b", "c", "d"] {
        fixture.provider.insert(NOTES, note(title)).unwrap();
    }

    let legacy = fixture
        .provider
        .query("content://notes.provider/notes?limit=2", None, &QueryArguments::new())
        .unwrap();
    assert_eq!(legacy.len(), 2);

    let overridden = fixture
        .provider
        .query(
            "content://notes.provider/notes?limit=2",
            None,
            &QueryArguments::new().with_limit(3),
        )
        .unwrap();
    assert_eq!(overridden.len(), 3);

    let paged = fixture
        .provider
        .query(
            NOTES,
            Some(&["title".to_string()]),
            &QueryArguments::new()
                .with_offset_and_limit(1, 2)
                .with_sort_sql("title"),
        )
        .unwrap();
    assert_eq!(paged.rows, vec![vec![text("b")], vec![text("c")]]);
}

#[test]
fn test_offset_without_limit_is_dropped() {
    let fixture = TestFixture::new();
    for title in ["a", "b"] {
        fixture.provider.insert(NOTES, note(title)).unwrap();
    }

    let mut args = QueryArguments::new();
    args.insert(arguments::OFFSET, ArgValue::Int(1));
    let result = fixture.provider.query(NOTES, None, &args).unwrap();

    assert_eq!(result.len(), 2);
    assert!(!result.honored_arguments.contains(arguments::OFFSET));
}

#[test]
fn test_count_projection_and_notification_identifier() {
    let fixture = TestFixture::new();
    fixture
        .provider
        .bulk_insert(NOTES, &[note("a"), note("b"), note("c")])
        .unwrap();

    let result = fixture
        .provider
        .query(
            "content://notes.provider/notes/2",
            Some(&[COUNT_COLUMN.to_string()]),
            &QueryArguments::new(),
        )
        .unwrap();

    assert_eq!(result.count(), Some(1));
    assert_eq!(result.notification_identifier.to_string(), NOTES);
}

#[test]
fn test_bulk_insert_is_atomic() {
    let fixture = TestFixture::new();
    let err = fixture
        .provider
        .bulk_insert(NOTES, &[note("a"), note("b"), note("a")])
        .unwrap_err();

    assert!(err.is_operation_failure());
    assert!(fixture.titles().is_empty());
}

#[test]
fn test_query_only_route_rejects_writes() {
    let fixture = TestFixture::new();
    let err = fixture
        .provider
        .delete(SUMMARIES, None, &[])
        .unwrap_err();

    assert!(matches!(err, StoreError::OperationNotAllowed { .. }));
}

#[test]
fn test_transaction_sees_its_own_writes() {
    let fixture = TestFixture::new();
    let count = fixture
        .provider
        .run_in_transaction(|tx| {
            tx.insert(NOTES, note("pending"))?;
            let result = tx.query(NOTES, Some(&[COUNT_COLUMN.to_string()]), &QueryArguments::new())?;
            Ok(result.count())
        })
        .unwrap();

    assert_eq!(count, Some(1));
}

#[test]
fn test_failed_closure_rolls_back() {
    let fixture = TestFixture::new();
    let err = fixture
        .provider
        .run_in_transaction(|tx| {
            tx.insert(NOTES, note("doomed"))?;
            Err::<(), _>(StoreError::InvalidArgument("caller changed its mind".into()))
        })
        .unwrap_err();

    assert!(matches!(err, StoreError::InvalidArgument(_)));
    assert!(fixture.titles().is_empty());
    assert!(fixture.deliveries().is_empty());
}

#[test]
fn test_provider_write_inside_transaction_is_rejected() {
    let fixture = TestFixture::new();
    let err = fixture
        .provider
        .run_in_transaction(|_| fixture.provider.insert(NOTES, note("reentrant")))
        .unwrap_err();

    assert!(matches!(err, StoreError::TransactionInProgress));
}

#[test]
fn test_concurrent_writers_serialize() {
    let fixture = Arc::new(TestFixture::new());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let fixture = Arc::clone(&fixture);
            thread::spawn(move || {
                for i in 0..10 {
                    fixture
                        .provider
                        .insert(NOTES, note(&format!("w{worker}-{i}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(fixture.titles().len(), 40);
    assert_eq!(fixture.deliveries().len(), 40);
}
