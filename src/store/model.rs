//! Persisted application state

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything the app keeps between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    /// Newest first
    #[serde(default)]
    pub sessions: Vec<PracticeSession>,
    #[serde(default)]
    pub categories: Categories,
}

impl AppState {
    /// Add or replace a session, keeping newest first
    pub fn add_session(&mut self, session: PracticeSession) {
        self.sessions.retain(|s| s.id != session.id);
        self.sessions.push(session);
        self.sort();
    }

    /// Remove a session by id
    pub fn remove_session(&mut self, id: &str) -> Option<PracticeSession> {
        let pos = self.sessions.iter().position(|s| s.id == id)?;
        Some(self.sessions.remove(pos))
    }

    /// Look up a session by id
    #[must_use]
    pub fn session(&self, id: &str) -> Option<&PracticeSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Add sessions whose ids are not present yet, returning how many were added
    pub fn merge_sessions<I>(&mut self, sessions: I) -> usize
    where
        I: IntoIterator<Item = PracticeSession>,
    {
        let mut added = 0;
        for session in sessions {
            if self.session(&session.id).is_none() {
                self.sessions.push(session);
                added += 1;
            }
        }
        self.sort();
        added
    }

    fn sort(&mut self) {
        self.sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
}

/// One practice run on a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SessionFields")]
pub struct PracticeSession {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    #[serde(default)]
    pub sentences: Vec<SentenceRecord>,
    #[serde(default)]
    pub recordings: Vec<AudioRef>,
}

impl PracticeSession {
    /// New empty session stamped now
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            topic: topic.into(),
            sentences: Vec::new(),
            recordings: Vec::new(),
        }
    }

    /// Mean of the scored sentences
    #[must_use]
    pub fn average_score(&self) -> Option<f32> {
        let scores: Vec<f32> = self
            .sentences
            .iter()
            .filter_map(|s| s.score.map(f32::from))
            .collect();
        if scores.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(scores.iter().sum::<f32>() / scores.len() as f32)
    }
}

/// A practiced sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SentenceFields")]
pub struct SentenceRecord {
    pub text: String,
    #[serde(default)]
    pub translation: String,
    /// Index into [`Categories`]
    #[serde(default)]
    pub category: usize,
    /// Pronunciation score 0-100, if evaluated
    #[serde(default)]
    pub score: Option<u8>,
}

/// Stored form of [`PracticeSession`], checked before use
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFields {
    id: String,
    timestamp: DateTime<Utc>,
    topic: String,
    #[serde(default)]
    sentences: Vec<SentenceRecord>,
    #[serde(default)]
    recordings: Vec<AudioRef>,
}

impl TryFrom<SessionFields> for PracticeSession {
    type Error = String;

    fn try_from(fields: SessionFields) -> Result<Self, Self::Error> {
        if fields.id.trim().is_empty() {
            return Err("session id is blank".to_string());
        }
        if let Some(orphan) = fields
            .recordings
            .iter()
            .find(|r| r.sentence >= fields.sentences.len())
        {
            return Err(format!(
                "session {} has a recording for missing sentence {}",
                fields.id, orphan.sentence
            ));
        }

        Ok(Self {
            id: fields.id,
            timestamp: fields.timestamp,
            topic: fields.topic,
            sentences: fields.sentences,
            recordings: fields.recordings,
        })
    }
}

/// Stored form of [`SentenceRecord`], checked before use
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentenceFields {
    text: String,
    #[serde(default)]
    translation: String,
    #[serde(default)]
    category: usize,
    #[serde(default)]
    score: Option<u8>,
}

impl TryFrom<SentenceFields> for SentenceRecord {
    type Error = String;

    fn try_from(fields: SentenceFields) -> Result<Self, Self::Error> {
        if fields.category >= Categories::COUNT {
            return Err(format!("category {} out of range", fields.category));
        }
        if let Some(score) = fields.score.filter(|s| *s > 100) {
            return Err(format!("score {score} out of range"));
        }

        Ok(Self {
            text: fields.text,
            translation: fields.translation,
            category: fields.category,
            score: fields.score,
        })
    }
}

/// A learner recording stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioRef {
    /// Index of the sentence this recording belongs to
    pub sentence: usize,
    pub path: PathBuf,
    pub mime_type: String,
}

const CATEGORY_COUNT: usize = 3;

/// Exactly three user-editable category labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Categories([String; CATEGORY_COUNT]);

impl Categories {
    pub const COUNT: usize = CATEGORY_COUNT;

    #[must_use]
    pub const fn new(labels: [String; Self::COUNT]) -> Self {
        Self(labels)
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Rename one category
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an out-of-range index or a blank label
    pub fn rename(&mut self, index: usize, label: &str) -> crate::Result<()> {
        let label = label.trim();
        if label.is_empty() {
            return Err(crate::Error::InvalidInput("category label is empty".to_string()));
        }
        let slot = self.0.get_mut(index).ok_or_else(|| {
            crate::Error::InvalidInput(format!("category {index} out of range"))
        })?;
        *slot = label.to_string();
        Ok(())
    }
}

impl Default for Categories {
    fn default() -> Self {
        Self([
            "Everyday".to_string(),
            "Work".to_string(),
            "Travel".to_string(),
        ])
    }
}

impl TryFrom<Vec<String>> for Categories {
    type Error = String;

    fn try_from(labels: Vec<String>) -> Result<Self, Self::Error> {
        let count = labels.len();
        let labels: [String; Self::COUNT] = labels
            .try_into()
            .map_err(|_| format!("expected {} category labels, found {count}", Self::COUNT))?;
        Ok(Self(labels))
    }
}

impl From<Categories> for Vec<String> {
    fn from(categories: Categories) -> Self {
        categories.0.into()
    }
}
