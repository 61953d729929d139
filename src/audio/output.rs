use async_trait::async_trait;
use serenity::model::id::GuildId;
use tokio::sync::mpsc;

use super::sequencer::SessionCommand;
use crate::error::{AccessError, OutputError};
use crate::model::{SessionRef, Track};

/// The voice connection a session streams into.
///
/// `play` replaces whatever the guild is currently streaming. The backend must
/// call [`TrackEndNotifier::notify`] once the stream ends, whether it finished
/// or was stopped.
#[async_trait]
pub trait VoiceOutput: Send + Sync {
    async fn play(
        &self,
        guild_id: GuildId,
        track: &Track,
        volume: f32,
        on_end: TrackEndNotifier,
    ) -> Result<(), OutputError>;

    async fn set_volume(&self, guild_id: GuildId, volume: f32) -> Result<(), OutputError>;

    async fn pause(&self, guild_id: GuildId) -> Result<(), OutputError>;

    async fn resume(&self, guild_id: GuildId) -> Result<(), OutputError>;

    /// Stops the current stream, keeping the connection.
    async fn stop(&self, guild_id: GuildId) -> Result<(), OutputError>;

    /// Leaves the voice channel.
    async fn leave(&self, guild_id: GuildId) -> Result<(), OutputError>;
}

/// Voice-membership checks on requesters.
#[async_trait]
pub trait VoiceGate: Send + Sync {
    /// Play requests: join the requester's channel if the bot is not
    /// connected; refuse if it is connected elsewhere.
    async fn ensure_joined(&self, requester: &SessionRef) -> Result<(), AccessError>;

    /// Session controls: the requester must share the bot's channel.
    async fn check_same_channel(&self, requester: &SessionRef) -> Result<(), AccessError>;

    /// Join or move to the requester's channel.
    async fn join(&self, requester: &SessionRef) -> Result<(), AccessError>;
}

/// Reports the end of one specific stream back to its session.
///
/// Carries the generation of the play it belongs to, so ends of streams that
/// were already replaced are ignored.
#[derive(Debug, Clone)]
pub struct TrackEndNotifier {
    commands: mpsc::UnboundedSender<SessionCommand>,
    generation: u64,
}

impl TrackEndNotifier {
    pub(crate) fn new(commands: mpsc::UnboundedSender<SessionCommand>, generation: u64) -> Self {
        Self {
            commands,
            generation,
        }
    }

    pub fn notify(&self) {
        // La sesión pudo haber terminado; no hay nada que avisar
        let _ = self.commands.send(SessionCommand::TrackEnded {
            generation: self.generation,
        });
    }
}
