//! State persistence integration tests

use speakdrill::store::{self, AppState, JsonFileStore, PracticeSession, SentenceRecord, Store};
use speakdrill::Error;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_missing_file_is_fresh_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("state.json"));

    assert!(store.load().unwrap().is_none());
    assert_eq!(store::load_state(&store).unwrap(), AppState::default());
}

#[test]
fn test_null_and_empty_files_are_fresh_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = JsonFileStore::new(&path);

    std::fs::write(&path, "null").unwrap();
    assert_eq!(store::load_state(&store).unwrap(), AppState::default());

    std::fs::write(&path, "  \n").unwrap();
    assert_eq!(store::load_state(&store).unwrap(), AppState::default());
}

#[test]
fn test_malformed_file_is_error_and_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = JsonFileStore::new(&path);

    std::fs::write(&path, "{\"sessions\": [").unwrap();
    let err = assert_err!(store::load_state(&store));
    assert!(matches!(err, Error::Store(_)));

    std::fs::write(&path, "{\"sessions\": 42}").unwrap();
    assert!(matches!(store::load_state(&store), Err(Error::Store(_))));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"sessions\": 42}");
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));

    let mut state = AppState::default();
    state.categories.rename(2, "Holidays").unwrap();
    let mut session = PracticeSession::new("Small talk");
    session.sentences.push(SentenceRecord {
        text: "Nice weather today.".to_string(),
        translation: "Schönes Wetter heute.".to_string(),
        category: 0,
        score: Some(91),
    });
    state.add_session(session);

    assert_ok!(store::save_state(&store, &state));
    let loaded = assert_ok!(store::load_state(&store));
    assert_eq!(loaded, state);

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("\"Holidays\""));
}

#[test]
fn test_save_replaces_previous_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("state.json"));

    let mut state = AppState::default();
    state.add_session(PracticeSession::new("first"));
    store::save_state(&store, &state).unwrap();

    let id = state.sessions[0].id.clone();
    state.remove_session(&id);
    store::save_state(&store, &state).unwrap();

    assert!(store::load_state(&store).unwrap().sessions.is_empty());
    // Only the state file remains; no temp files left behind
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
