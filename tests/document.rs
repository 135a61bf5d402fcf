//! Document import/export integration tests

use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use speakdrill::document::{self, HEADER};
use speakdrill::store::{AppState, AudioRef, Categories, PracticeSession, SentenceRecord};
use speakdrill::Error;

fn sample_state() -> AppState {
    let mut state = AppState::default();
    state.categories.rename(1, "Office | Meetings").unwrap();

    let mut food = PracticeSession::new("Ordering food");
    food.sentences = vec![
        SentenceRecord {
            text: "I'd like the soup, please.".to_string(),
            translation: "Ich hätte gern die Suppe.".to_string(),
            category: 0,
            score: Some(87),
        },
        SentenceRecord {
            text: "Could we have\nthe bill?".to_string(),
            translation: String::new(),
            category: 2,
            score: None,
        },
    ];
    food.recordings = vec![AudioRef {
        sentence: 1,
        path: PathBuf::from("recordings/food 2.wav"),
        mime_type: "audio/wav".to_string(),
    }];
    state.add_session(food);

    let mut travel = PracticeSession::new(r"Trains \ stations");
    travel.timestamp = Utc.with_ymd_and_hms(2024, 11, 5, 8, 30, 0).unwrap();
    state.add_session(travel);

    state
}

#[test]
fn test_export_import_preserves_history() {
    let state = sample_state();

    let bytes = document::export_state(&state);
    assert!(String::from_utf8_lossy(&bytes).starts_with(HEADER));

    let parsed = document::import_state(&bytes).unwrap();
    assert_eq!(parsed.sessions, state.sessions);
    assert_eq!(parsed.categories.as_ref(), Some(&state.categories));

    let mut fresh = AppState::default();
    assert_eq!(parsed.apply_to(&mut fresh), 2);
    assert_eq!(fresh, state);
}

#[test]
fn test_round_trip_keeps_spaces_and_padding() {
    let mut state = AppState::default();
    state.categories = Categories::new([" a".to_string(), "b".to_string(), "c ".to_string()]);

    let mut session = PracticeSession::new("  padded topic ");
    session.sentences.push(SentenceRecord {
        text: " leading and trailing ".to_string(),
        translation: "  ".to_string(),
        category: 1,
        score: Some(100),
    });
    session.recordings = vec![
        AudioRef {
            sentence: 0,
            path: PathBuf::from("rec.webm"),
            mime_type: "audio/webm; codecs=opus".to_string(),
        },
        AudioRef {
            sentence: 0,
            path: PathBuf::from(" lead.wav"),
            mime_type: "audio/wav".to_string(),
        },
    ];
    state.add_session(session);

    let parsed = document::import_state(&document::export_state(&state)).unwrap();
    assert_eq!(parsed.sessions, state.sessions);
    assert_eq!(parsed.categories, Some(state.categories.clone()));

    let recordings = &parsed.sessions[0].recordings;
    assert_eq!(recordings[0].mime_type, "audio/webm; codecs=opus");
    assert_eq!(recordings[0].path, PathBuf::from("rec.webm"));
    assert_eq!(recordings[1].path, PathBuf::from(" lead.wav"));
}

#[test]
fn test_import_skips_known_sessions() {
    let state = sample_state();
    let bytes = document::export_state(&state);

    let mut existing = state.clone();
    let added = document::import_state(&bytes).unwrap().apply_to(&mut existing);

    assert_eq!(added, 0);
    assert_eq!(existing.sessions.len(), 2);
}

#[test]
fn test_missing_record_end_rejects_everything() {
    let text = format!(
        "{HEADER}\n\
         RECORD_START\nID: a\nTopic: first\nRECORD_END\n\
         RECORD_START\nID: b\nTopic: second\n#1: unfinished\n"
    );

    let err = document::import_state(text.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::Import { line: 6, .. }), "{err}");

    // The complete first record is not imported either
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.txt");
    std::fs::write(&path, &text).unwrap();
    assert!(document::read_document(&path).is_err());
}

#[test]
fn test_rejects_other_versions() {
    let err = document::import_state(b"SPEAKDRILL_EXPORT v9\n").unwrap_err();
    assert!(matches!(err, Error::Import { line: 1, .. }));

    let err = document::import_state(b"").unwrap_err();
    assert!(matches!(err, Error::Import { .. }));
}

#[test]
fn test_missing_timestamp_defaults_to_now() {
    let before = Utc::now();
    let text = format!("{HEADER}\nRECORD_START\nID: x\nTopic: Weather\nRECORD_END\n");

    let parsed = document::import_state(text.as_bytes()).unwrap();
    assert_eq!(parsed.sessions.len(), 1);
    assert!(parsed.sessions[0].timestamp >= before);
    assert!(parsed.categories.is_none());
}

#[test]
fn test_tolerates_bom_and_crlf() {
    let text = format!("\u{feff}{HEADER}\r\nCategories: A | B | C\r\nRECORD_START\r\nID: x\r\nTopic: T\r\nRECORD_END\r\n");

    let parsed = document::import_state(text.as_bytes()).unwrap();
    assert_eq!(parsed.sessions[0].topic, "T");
    assert_eq!(
        parsed.categories,
        Some(Categories::new(["A", "B", "C"].map(String::from)))
    );
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.txt");
    let state = sample_state();

    document::write_document(&path, &state).unwrap();
    let parsed = document::read_document(&path).unwrap();
    assert_eq!(parsed.sessions, state.sessions);

    let missing = document::read_document(&dir.path().join("nope.txt"));
    assert!(matches!(missing, Err(Error::Io(_))));
}
