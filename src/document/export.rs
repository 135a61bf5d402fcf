//! Document export

use std::fmt::{self, Write};

use chrono::SecondsFormat;

use super::{HEADER, RECORD_END, RECORD_START, escape};
use crate::store::{AppState, PracticeSession};

/// Render `state` as a marker-grammar document
#[must_use]
pub fn export_state(state: &AppState) -> Vec<u8> {
    let mut out = String::new();
    // fmt::Write for String never fails
    let _ = render(&mut out, state);
    out.into_bytes()
}

fn render(out: &mut String, state: &AppState) -> fmt::Result {
    writeln!(out, "{HEADER}")?;

    let labels: Vec<String> = state.categories.labels().iter().map(|l| escape(l)).collect();
    writeln!(out, "Categories: {}", labels.join(" | "))?;

    for session in &state.sessions {
        write_session(out, session)?;
    }
    Ok(())
}

fn write_session(out: &mut String, session: &PracticeSession) -> fmt::Result {
    writeln!(out, "{RECORD_START}")?;
    writeln!(out, "ID: {}", escape(&session.id))?;
    writeln!(
        out,
        "Timestamp: {}",
        session.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    )?;
    writeln!(out, "Topic: {}", escape(&session.topic))?;

    for (i, sentence) in session.sentences.iter().enumerate() {
        writeln!(out, "#{}: {}", i + 1, escape(&sentence.text))?;
        writeln!(out, "Translation: {}", escape(&sentence.translation))?;
        writeln!(out, "Category: {}", sentence.category)?;
        if let Some(score) = sentence.score {
            writeln!(out, "Score: {score}")?;
        }
    }

    for recording in &session.recordings {
        writeln!(
            out,
            "Recording #{}: {} | {}",
            recording.sentence + 1,
            escape(&recording.mime_type),
            escape(&recording.path.to_string_lossy())
        )?;
    }

    writeln!(out, "{RECORD_END}")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::store::SentenceRecord;

    #[test]
    fn test_export_layout() {
        let mut state = AppState::default();
        state.add_session(PracticeSession {
            id: "s1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            topic: "Food".to_string(),
            sentences: vec![SentenceRecord {
                text: "Soup,\nplease".to_string(),
                translation: "Suppe, bitte".to_string(),
                category: 2,
                score: None,
            }],
            recordings: vec![crate::store::AudioRef {
                sentence: 0,
                path: "rec/a b.webm".into(),
                mime_type: "audio/webm; codecs=opus".to_string(),
            }],
        });

        let text = String::from_utf8(export_state(&state)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "SPEAKDRILL_EXPORT v1",
                "Categories: Everyday | Work | Travel",
                "RECORD_START",
                "ID: s1",
                "Timestamp: 2025-03-01T10:00:00Z",
                "Topic: Food",
                "#1: Soup,\\nplease",
                "Translation: Suppe, bitte",
                "Category: 2",
                "Recording #1: audio/webm; codecs=opus | rec/a b.webm",
                "RECORD_END",
            ]
        );
    }
}
