use std::fs;

use harvester_core::Checkpoint;
use harvester_engine::{CheckpointError, CheckpointStore, MissingCheckpoint};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[test]
fn load_reads_trimmed_integer() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("last_post.num"), "99\n").unwrap();

    let store = CheckpointStore::new(temp.path(), MissingCheckpoint::Fail);
    assert_eq!(store.load().unwrap(), Checkpoint::new(99));
}

#[test]
fn missing_file_is_an_error_unless_first_run() {
    let temp = TempDir::new().unwrap();

    let strict = CheckpointStore::new(temp.path(), MissingCheckpoint::Fail);
    let err = strict.load().unwrap_err();
    assert!(matches!(err, CheckpointError::Missing(_)));
    assert!(err.is_configuration());

    let first_run = CheckpointStore::new(temp.path(), MissingCheckpoint::StartFromZero);
    assert_eq!(first_run.load().unwrap(), Checkpoint::ZERO);
    assert!(!first_run.path().exists());
}

#[test]
fn garbage_content_is_reported_with_its_path() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("last_post.num"), "ninety-nine").unwrap();

    let store = CheckpointStore::new(temp.path(), MissingCheckpoint::StartFromZero);
    let err = store.load().unwrap_err();
    assert!(matches!(err, CheckpointError::Unparsable { .. }));
    assert!(err.to_string().contains("last_post.num"));
}

#[test]
fn save_overwrites_with_exact_integer_text() {
    let temp = TempDir::new().unwrap();
    let store = CheckpointStore::new(temp.path(), MissingCheckpoint::StartFromZero);

    store.save(Checkpoint::new(99)).unwrap();
    store.save(Checkpoint::new(105)).unwrap();

    assert_eq!(fs::read_to_string(store.path()).unwrap(), "105");
    assert_eq!(store.load().unwrap(), Checkpoint::new(105));
}

#[test]
fn save_refuses_to_move_backwards() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("last_post.num"), "105").unwrap();
    let store = CheckpointStore::new(temp.path(), MissingCheckpoint::Fail);

    let err = store.save(Checkpoint::new(99)).unwrap_err();
    assert!(matches!(
        err,
        CheckpointError::Regression { current, requested }
            if current == Checkpoint::new(105) && requested == Checkpoint::new(99)
    ));
    assert_eq!(fs::read_to_string(store.path()).unwrap(), "105");
}
