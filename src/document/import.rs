//! Document import
//!
//! Parsing is driven strictly by the record markers. Nothing is returned
//! unless the whole document parses.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::{HEADER, ParsedState, RECORD_END, RECORD_START, split_list, unescape};
use crate::store::{AudioRef, Categories, PracticeSession, SentenceRecord};
use crate::{Error, Result};

/// Parse a marker-grammar document
///
/// Records without a timestamp are stamped with the import time.
///
/// # Errors
///
/// Returns `Error::Import` if the header is missing, a record marker is
/// unpaired, a required field is absent, or any line cannot be parsed
pub fn import_state(bytes: &[u8]) -> Result<ParsedState> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::import(0, format!("not UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')));

    match lines.by_ref().find(|(_, line)| !line.trim().is_empty()) {
        Some((_, line)) if line.trim() == HEADER => {}
        Some((n, line)) if line.starts_with("SPEAKDRILL_EXPORT") => {
            return Err(Error::import(n, format!("unsupported version: {}", line.trim())));
        }
        Some((n, _)) => return Err(Error::import(n, format!("missing {HEADER} header"))),
        None => return Err(Error::import(1, "document is empty")),
    }

    let mut sessions = Vec::new();
    let mut categories = None;
    let mut open: Option<RecordBuilder> = None;

    for (n, line) in lines {
        let trimmed = line.trim();

        match open.take() {
            None => match trimmed {
                "" => {}
                RECORD_START => open = Some(RecordBuilder::new(n)),
                RECORD_END => return Err(Error::import(n, "RECORD_END without RECORD_START")),
                _ => {
                    let (key, value) = split_field(n, line)?;
                    if key != "Categories" {
                        return Err(Error::import(n, format!("unexpected `{key}` outside a record")));
                    }
                    if categories.is_some() {
                        return Err(Error::import(n, "duplicate Categories line"));
                    }
                    categories = Some(parse_categories(n, value)?);
                }
            },
            Some(mut record) => match trimmed {
                RECORD_START => {
                    return Err(Error::import(
                        n,
                        format!("RECORD_START before RECORD_END of record at line {}", record.start_line),
                    ));
                }
                RECORD_END => sessions.push(record.finish(n)?),
                "" => open = Some(record),
                _ => {
                    record.field(n, line)?;
                    open = Some(record);
                }
            },
        }
    }

    if let Some(record) = open {
        return Err(Error::import(record.start_line, "record has no RECORD_END"));
    }

    tracing::debug!(sessions = sessions.len(), "document parsed");
    Ok(ParsedState {
        sessions,
        categories,
    })
}

/// Split `Key: value`; the value keeps its escapes
fn split_field(line_no: usize, line: &str) -> Result<(&str, &str)> {
    let (key, value) = line
        .split_once(':')
        .ok_or_else(|| Error::import(line_no, format!("expected `Key: value`, found `{line}`")))?;
    Ok((key.trim(), value.strip_prefix(' ').unwrap_or(value)))
}

fn text_value(line_no: usize, raw: &str) -> Result<String> {
    unescape(raw).ok_or_else(|| Error::import(line_no, "invalid escape sequence"))
}

fn parse_categories(line_no: usize, raw: &str) -> Result<Categories> {
    let labels = split_list(raw)
        .into_iter()
        .map(|part| text_value(line_no, part))
        .collect::<Result<Vec<_>>>()?;
    Categories::try_from(labels).map_err(|reason| Error::import(line_no, reason))
}

/// 1-based index after a `#`
fn parse_ordinal(line_no: usize, raw: &str) -> Result<usize> {
    raw.strip_prefix('#')
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .ok_or_else(|| Error::import(line_no, format!("invalid sentence number `{raw}`")))
}

/// Fields of the record being read
struct RecordBuilder {
    start_line: usize,
    id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    topic: Option<String>,
    sentences: Vec<SentenceRecord>,
    recordings: Vec<(usize, AudioRef)>,
}

impl RecordBuilder {
    const fn new(start_line: usize) -> Self {
        Self {
            start_line,
            id: None,
            timestamp: None,
            topic: None,
            sentences: Vec::new(),
            recordings: Vec::new(),
        }
    }

    fn current_sentence(&mut self, line_no: usize, key: &str) -> Result<&mut SentenceRecord> {
        self.sentences
            .last_mut()
            .ok_or_else(|| Error::import(line_no, format!("`{key}` before any sentence")))
    }

    fn field(&mut self, line_no: usize, line: &str) -> Result<()> {
        let (key, raw) = split_field(line_no, line)?;

        match key {
            "ID" => set_once(line_no, key, &mut self.id, text_value(line_no, raw)?)?,
            "Topic" => set_once(line_no, key, &mut self.topic, text_value(line_no, raw)?)?,
            "Timestamp" => {
                let parsed = DateTime::parse_from_rfc3339(raw.trim())
                    .map_err(|e| Error::import(line_no, format!("invalid timestamp: {e}")))?
                    .with_timezone(&Utc);
                set_once(line_no, key, &mut self.timestamp, parsed)?;
            }
            "Translation" => {
                let value = text_value(line_no, raw)?;
                self.current_sentence(line_no, key)?.translation = value;
            }
            "Category" => {
                let category = raw
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|c| *c < Categories::COUNT)
                    .ok_or_else(|| Error::import(line_no, format!("invalid category `{raw}`")))?;
                self.current_sentence(line_no, key)?.category = category;
            }
            "Score" => {
                let score = raw
                    .trim()
                    .parse::<u8>()
                    .ok()
                    .filter(|s| *s <= 100)
                    .ok_or_else(|| Error::import(line_no, format!("invalid score `{raw}`")))?;
                self.current_sentence(line_no, key)?.score = Some(score);
            }
            _ if key.starts_with('#') => {
                let ordinal = parse_ordinal(line_no, key)?;
                if ordinal != self.sentences.len() + 1 {
                    return Err(Error::import(
                        line_no,
                        format!("expected sentence #{}, found {key}", self.sentences.len() + 1),
                    ));
                }
                self.sentences.push(SentenceRecord {
                    text: text_value(line_no, raw)?,
                    translation: String::new(),
                    category: 0,
                    score: None,
                });
            }
            _ if key.starts_with("Recording ") => {
                let ordinal = parse_ordinal(line_no, key.trim_start_matches("Recording ").trim())?;
                let [mime, path] = split_list(raw)[..] else {
                    return Err(Error::import(line_no, "recording needs `<mime> | <path>`"));
                };
                self.recordings.push((
                    line_no,
                    AudioRef {
                        sentence: ordinal - 1,
                        path: PathBuf::from(text_value(line_no, path)?),
                        mime_type: text_value(line_no, mime)?,
                    },
                ));
            }
            _ => return Err(Error::import(line_no, format!("unknown field `{key}`"))),
        }

        Ok(())
    }

    fn finish(self, end_line: usize) -> Result<PracticeSession> {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::import(end_line, format!("record at line {} has no ID", self.start_line)))?;
        let topic = self
            .topic
            .ok_or_else(|| Error::import(end_line, format!("record at line {} has no Topic", self.start_line)))?;

        let sentence_count = self.sentences.len();
        let recordings = self
            .recordings
            .into_iter()
            .map(|(line_no, recording)| {
                if recording.sentence < sentence_count {
                    Ok(recording)
                } else {
                    Err(Error::import(
                        line_no,
                        format!("recording refers to missing sentence #{}", recording.sentence + 1),
                    ))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PracticeSession {
            id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            topic,
            sentences: self.sentences,
            recordings,
        })
    }
}

fn set_once<T>(line_no: usize, key: &str, slot: &mut Option<T>, value: T) -> Result<()> {
    if slot.is_some() {
        return Err(Error::import(line_no, format!("duplicate {key}")));
    }
    *slot = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ParsedState> {
        import_state(text.as_bytes())
    }

    #[test]
    fn test_minimal_record() {
        let parsed = parse("SPEAKDRILL_EXPORT v1\nRECORD_START\nID: a\nTopic: Travel plans\nRECORD_END\n").unwrap();
        assert_eq!(parsed.sessions.len(), 1);
        assert_eq!(parsed.sessions[0].topic, "Travel plans");
        assert!(parsed.categories.is_none());
    }

    #[test]
    fn test_missing_header() {
        let err = parse("RECORD_START\nID: a\nTopic: x\nRECORD_END\n").unwrap_err();
        assert!(matches!(err, Error::Import { line: 1, .. }));

        let err = parse("SPEAKDRILL_EXPORT v9\n").unwrap_err();
        assert!(err.to_string().contains("unsupported version"));
    }

    #[test]
    fn test_missing_start_marker() {
        let err = parse("SPEAKDRILL_EXPORT v1\nID: a\nTopic: x\nRECORD_END\n").unwrap_err();
        assert!(matches!(err, Error::Import { line: 2, .. }));
    }

    #[test]
    fn test_nested_start_rejected() {
        let err = parse(
            "SPEAKDRILL_EXPORT v1\nRECORD_START\nID: a\nTopic: x\nRECORD_START\nID: b\nTopic: y\nRECORD_END\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Import { line: 5, .. }));
    }

    #[test]
    fn test_required_fields() {
        let err = parse("SPEAKDRILL_EXPORT v1\nRECORD_START\nTopic: x\nRECORD_END\n").unwrap_err();
        assert!(err.to_string().contains("no ID"));

        let err = parse("SPEAKDRILL_EXPORT v1\nRECORD_START\nID: a\nRECORD_END\n").unwrap_err();
        assert!(err.to_string().contains("no Topic"));
    }

    #[test]
    fn test_sentence_fields() {
        let parsed = parse(
            "SPEAKDRILL_EXPORT v1\r\n\
             Categories: A | B\\|C | D\r\n\
             RECORD_START\r\n\
             ID: a\r\n\
             Topic: x\r\n\
             #1: Hello\r\n\
             Translation: Hallo\r\n\
             Category: 1\r\n\
             Score: 95\r\n\
             #2: Bye\r\n\
             Recording #2: audio/wav | /tmp/my file.wav\r\n\
             RECORD_END\r\n",
        )
        .unwrap();

        let categories = parsed.categories.unwrap();
        assert_eq!(categories.labels(), &["A", "B|C", "D"]);

        let session = &parsed.sessions[0];
        assert_eq!(session.sentences.len(), 2);
        assert_eq!(session.sentences[0].translation, "Hallo");
        assert_eq!(session.sentences[0].category, 1);
        assert_eq!(session.sentences[0].score, Some(95));
        assert_eq!(session.sentences[1].score, None);
        assert_eq!(session.recordings[0].sentence, 1);
        assert_eq!(session.recordings[0].path, PathBuf::from("/tmp/my file.wav"));
    }

    #[test]
    fn test_bad_values_rejected() {
        for body in [
            "#2: skipped one",
            "Translation: orphan",
            "#1: x\nCategory: 3",
            "#1: x\nScore: 101",
            "Timestamp: yesterday",
            "#1: x\nRecording #4: audio/wav | a.wav",
            "#1: x\nRecording #1: audio/wav a.wav",
            "Mystery: field",
        ] {
            let doc = format!("SPEAKDRILL_EXPORT v1\nRECORD_START\nID: a\nTopic: t\n{body}\nRECORD_END\n");
            assert!(
                matches!(parse(&doc), Err(Error::Import { .. })),
                "accepted: {body}"
            );
        }
    }
}
