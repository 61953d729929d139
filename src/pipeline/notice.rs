use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::PipelineError;
use crate::model::SessionRef;

/// User-facing feedback about one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Preparing {
        title: String,
        duration: Option<Duration>,
    },
    AddedToQueue {
        title: String,
    },
    NowPlaying {
        title: String,
    },
    Failed(PipelineError),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Preparing {
                title,
                duration: Some(duration),
            } => write!(
                f,
                "Preparing {} ({})...",
                title,
                humantime::format_duration(*duration)
            ),
            Notice::Preparing { title, duration: None } => write!(f, "Preparing {}...", title),
            Notice::AddedToQueue { title } => write!(f, "Added {} to the queue.", title),
            Notice::NowPlaying { title } => write!(f, "Now playing: {}", title),
            Notice::Failed(error) => f.write_str(&error.user_message()),
        }
    }
}

/// Delivers notices to whoever made a request.
///
/// Implementations stay silent for requesters without a text channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, requester: &SessionRef, notice: Notice);
}
