//! Clip sources: turn playlist entries into decoded clips

use std::sync::Arc;

use async_trait::async_trait;

use super::playlist::{ClipDescriptor, ClipKind};
use crate::ai::AiClient;
use crate::voice::{Clip, TTS_SAMPLE_RATE};
use crate::{Error, Result};

/// Produces the clip for a playlist entry
#[async_trait]
pub trait ClipSource: Send + Sync {
    /// Fetch or synthesize, then decode
    ///
    /// # Errors
    ///
    /// Returns error if synthesis, reading or decoding fails
    async fn fetch(&self, descriptor: &ClipDescriptor) -> Result<Clip>;
}

/// Speech from the AI client, recordings from disk
pub struct StandardClipSource {
    ai: Arc<AiClient>,
}

impl StandardClipSource {
    #[must_use]
    pub const fn new(ai: Arc<AiClient>) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl ClipSource for StandardClipSource {
    async fn fetch(&self, descriptor: &ClipDescriptor) -> Result<Clip> {
        let clip = match &descriptor.kind {
            ClipKind::Speech { text, voice } => {
                let pcm = self.ai.synthesize_speech(text, voice).await?;
                Clip::from_pcm16(&pcm, TTS_SAMPLE_RATE)?
            }
            ClipKind::Recording { path, detune } => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    Error::Decode(format!("failed to read {}: {e}", path.display()))
                })?;
                Clip::from_recording(&bytes)?.with_detune(*detune)
            }
        };

        Ok(clip.with_rate(descriptor.rate))
    }
}
