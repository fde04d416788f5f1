use repokit_core::repo::FieldSpec;
use repokit_core::{
    Database, DatabaseError, ErrorKind, Record, RepoError, RepoResult, Repository, TableSchema,
};
use std::panic::{catch_unwind, AssertUnwindSafe};

const ITEM_FIELDS: &[FieldSpec] = &[FieldSpec::fillable("name")];
static ITEMS: TableSchema = TableSchema::new("items", ITEM_FIELDS).with_timestamps(false);

fn setup() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);")
        .unwrap();
    db
}

fn item(name: &str) -> Record {
    Record::new().with("name", name)
}

#[test]
fn nested_transactions_issue_one_begin_and_one_commit() {
    let db = setup();
    let repo = Repository::try_new(&db, &ITEMS).unwrap();

    let ids = repo
        .transaction(|| {
            let first = repo.create(&item("outer"))?;
            let second = repo.transaction(|| {
                assert_eq!(db.transaction_level(), 2);
                repo.create(&item("inner"))
            })?;
            Ok(vec![first, second])
        })
        .unwrap();

    assert_eq!(ids.len(), 2);
    assert_eq!(db.transaction_level(), 0);
    let counters = db.transaction_counters();
    assert_eq!((counters.begins, counters.commits, counters.rollbacks), (1, 1, 0));
    assert_eq!(repo.count(&Record::new()).unwrap(), 2);
}

#[test]
fn inner_failure_rolls_back_everything_and_returns_original_error() {
    let db = setup();
    let repo = Repository::try_new(&db, &ITEMS).unwrap();

    let result: RepoResult<()> = repo.transaction(|| {
        repo.create(&item("kept?"))?;
        repo.transaction(|| {
            repo.create(&item("dup"))?;
            repo.create(&item("dup"))?;
            Ok(())
        })
    });

    let err = result.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ConstraintViolation));
    assert_eq!(db.transaction_level(), 0);
    assert_eq!(db.transaction_counters().rollbacks, 1);
    assert_eq!(repo.count(&Record::new()).unwrap(), 0);
}

#[test]
fn caller_error_type_is_returned_untouched() {
    let db = setup();

    let result: Result<(), RepoError> = db.transaction(|| {
        Err(RepoError::InvalidData("callback refused".to_string()))
    });

    assert!(matches!(result, Err(RepoError::InvalidData(message)) if message == "callback refused"));
    assert!(!db.in_transaction());
}

#[test]
fn manual_begin_commit_and_rollback_follow_nesting_rules() {
    let db = setup();

    db.begin_transaction().unwrap();
    db.begin_transaction().unwrap();
    db.commit().unwrap();
    assert_eq!(db.transaction_level(), 1);
    db.rollback().unwrap();
    assert_eq!(db.transaction_level(), 0);

    let counters = db.transaction_counters();
    assert_eq!((counters.begins, counters.commits, counters.rollbacks), (1, 0, 1));
}

#[test]
fn commit_without_transaction_is_rejected() {
    let db = setup();
    let err: DatabaseError = db.commit().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransactionFailed);
    assert_eq!(err.code(), 500);
}

#[test]
fn rollback_when_idle_is_a_noop() {
    let db = setup();
    db.rollback().unwrap();
    assert_eq!(db.transaction_counters().rollbacks, 0);
}

#[test]
fn panic_inside_transaction_rolls_back() {
    let db = setup();
    let repo = Repository::try_new(&db, &ITEMS).unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _: RepoResult<()> = repo.transaction(|| {
            repo.create(&item("doomed"))?;
            panic!("callback blew up");
        });
    }));

    assert!(outcome.is_err());
    assert_eq!(db.transaction_level(), 0);
    assert_eq!(db.transaction_counters().rollbacks, 1);
    assert_eq!(repo.count(&Record::new()).unwrap(), 0);
}

#[test]
fn reconnect_and_migrations_are_rejected_inside_transaction() {
    let db = setup();
    db.begin_transaction().unwrap();

    assert_eq!(
        db.reconnect().unwrap_err().kind(),
        ErrorKind::TransactionFailed
    );
    assert_eq!(
        db.run_migrations().unwrap_err().kind(),
        ErrorKind::TransactionFailed
    );

    db.rollback().unwrap();
    assert!(db.reconnect().is_ok());
}
