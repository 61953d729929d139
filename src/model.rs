//! # Model
//!
//! Messages handed between pipeline stages. Each stage gets a struct carrying
//! exactly the fields it needs; values move from one queue to the next and are
//! never shared.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::path::PathBuf;

/// Who asked for something, and where to answer.
///
/// `text_channel` is `None` for feedback-only plays (sound effects triggered by
/// plain chat messages); those never produce a chat reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRef {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub text_channel: Option<ChannelId>,
    /// Voice channel the requester was in when the request was made.
    pub voice_channel: Option<ChannelId>,
}

impl SessionRef {
    pub fn new(guild_id: GuildId, user_id: UserId) -> Self {
        Self {
            guild_id,
            user_id,
            text_channel: None,
            voice_channel: None,
        }
    }

    pub fn with_text_channel(mut self, channel: ChannelId) -> Self {
        self.text_channel = Some(channel);
        self
    }

    pub fn with_voice_channel(mut self, channel: ChannelId) -> Self {
        self.voice_channel = Some(channel);
        self
    }

    /// Same requester, but without a channel to answer in.
    pub fn quiet(mut self) -> Self {
        self.text_channel = None;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Music,
    SoundEffect,
}

/// A resolved, playable local audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    locator: PathBuf,
    kind: TrackKind,
    requester: SessionRef,
    requested_at: DateTime<Utc>,
}

impl Track {
    pub fn new(title: String, locator: PathBuf, kind: TrackKind, requester: SessionRef) -> Self {
        Self {
            title,
            locator,
            kind,
            requester,
            requested_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Path of the file the voice output streams.
    pub fn locator(&self) -> &PathBuf {
        &self.locator
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn requester(&self) -> &SessionRef {
        &self.requester
    }

    pub fn guild_id(&self) -> GuildId {
        self.requester.guild_id
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

/// A remote play request whose link already yielded a video id.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    pub requester: SessionRef,
    pub url: String,
    pub video_id: String,
}

/// Everything the downloader needs to fetch one audio stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub requester: SessionRef,
    pub url: String,
    pub video_id: String,
    pub format_id: String,
}

/// Subset of the yt-dlp info JSON this crate reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Seconds; absent for live streams.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Only present at the top level when the media is a single stream.
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub is_live: Option<bool>,
    #[serde(default)]
    pub formats: Vec<MediaFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaFormat {
    pub format_id: String,
}

impl MediaInfo {
    /// Live or otherwise continuous content: flagged live, or a streaming
    /// protocol marker without a fixed duration.
    pub fn is_live(&self) -> bool {
        self.is_live.unwrap_or(false) || (self.protocol.is_some() && self.duration.is_none())
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown")
    }
}
