//! Error types for the request pipeline and session controls.
//!
//! Every pipeline error is local to one request: stage loops report it to the
//! requester and keep running. Nothing here is retried automatically.

use thiserror::Error;

/// Failures of a single play request, from submission to playback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// No video id could be read from the link
    #[error("invalid link: {0}")]
    InvalidLink(String),

    /// Remote metadata lookup failed (usually transient)
    #[error("metadata unavailable for {url}: {reason}")]
    MetadataUnavailable { url: String, reason: String },

    /// Live or continuous streams
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),

    /// External fetch process failed
    #[error("download failed for {video_id}: {reason}")]
    DownloadFailed { video_id: String, reason: String },

    /// Download reported success but no matching file was found
    #[error("no cached file matches {0} after download")]
    CacheReconcile(String),

    #[error("no local file named {0}")]
    LocalFileNotFound(String),

    #[error("no sound effect named {0}")]
    SoundEffectNotFound(String),

    #[error(transparent)]
    Access(#[from] AccessError),

    /// Voice output refused to start the track
    #[error("playback failed for {title}: {reason}")]
    Playback { title: String, reason: String },

    /// The pipeline stopped before the request reached a session
    #[error("pipeline is shutting down")]
    ShuttingDown,
}

impl PipelineError {
    /// Text shown to the requester in chat.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::InvalidLink(_) => "That link looks invalid to me.".to_string(),
            PipelineError::MetadataUnavailable { .. } => {
                "I could not download the video's meta data... maybe try again in a few seconds."
                    .to_string()
            }
            PipelineError::UnsupportedContent(_) => "Live streams are not supported yet.".to_string(),
            PipelineError::DownloadFailed { .. } => {
                "I ran into an error during download... maybe try again in a few seconds.".to_string()
            }
            PipelineError::CacheReconcile(_) => {
                "Something went wrong while preparing that track.".to_string()
            }
            PipelineError::LocalFileNotFound(_) => {
                "I need a Youtube link or file path to play.".to_string()
            }
            PipelineError::SoundEffectNotFound(_) => {
                "Couldn't find the sound effect you were looking for...".to_string()
            }
            PipelineError::Access(error) => error.user_message().to_string(),
            PipelineError::Playback { title, .. } => format!("I couldn't play {}, skipping it.", title),
            PipelineError::ShuttingDown => {
                "I'm shutting down, so I dropped that request. Try again in a bit.".to_string()
            }
        }
    }
}

/// Precondition failures on who may control a session.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("requester is not in a voice channel")]
    NotInVoiceChannel,

    #[error("requester is in a different voice channel than the bot")]
    WrongChannel,

    #[error("bot is not connected to a voice channel")]
    BotNotConnected,

    #[error("could not join the voice channel")]
    JoinFailed,
}

impl AccessError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AccessError::NotInVoiceChannel => "You're not in a voice channel, silly. :eyes:",
            AccessError::WrongChannel => {
                "I'm not taking orders from someone outside of our voice channel."
            }
            AccessError::BotNotConnected => "I'm not playing anything. :eyes:",
            AccessError::JoinFailed => "I couldn't join your voice channel.",
        }
    }
}

/// Session control (pause, skip, volume, ...) failures. None of them change state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("no playback session for this guild")]
    NothingPlaying,

    #[error("nothing is currently playing")]
    NotPlaying,

    #[error("playback is not paused")]
    NotPaused,

    #[error("volume {0} is outside 0..=100")]
    VolumeOutOfRange(u32),

    #[error("session closed")]
    SessionClosed,
}

impl ControlError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ControlError::Access(error) => error.user_message(),
            ControlError::NothingPlaying | ControlError::SessionClosed => {
                "I'm not even playing anything. :eyes:"
            }
            ControlError::NotPlaying => "Nothing is playing right now.",
            ControlError::NotPaused => "I'm not paused.",
            ControlError::VolumeOutOfRange(_) => "Please enter a number ranging from 0 to 100.",
        }
    }
}

/// Errors reported by a voice output backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    #[error("not connected to voice in this guild")]
    NotConnected,

    #[error("track error: {0}")]
    Track(String),
}

/// A cache filename that does not follow `<title>_<videoID>.mp3`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilenameError {
    #[error("{0} is not an .mp3 file")]
    NotMp3(String),

    #[error("{0} is too short to carry a video id")]
    TooShort(String),

    #[error("{0} has no '_' before its video id")]
    MissingSeparator(String),

    #[error("{0} does not end in a valid video id")]
    InvalidVideoId(String),
}
