use std::fmt;

use crate::error::PipelineError;

/// Where in the request path an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Checks done before anything is queued.
    Submission,
    Resolution,
    Download,
    Cache,
    Playback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Submission => "submission",
            Stage::Resolution => "resolution",
            Stage::Download => "download",
            Stage::Cache => "cache",
            Stage::Playback => "playback",
        };
        f.write_str(name)
    }
}

/// Observable pipeline activity. Every dropped request shows up here.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// An item was pushed onto the stage's queue.
    Entered { stage: Stage },
    /// A remote request was served from the cache without resolving.
    CacheHit { video_id: String },
    Completed { stage: Stage },
    /// The item was discarded and its requester notified.
    Dropped { stage: Stage, error: PipelineError },
}
