use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::output::{TrackEndNotifier, VoiceOutput};
use super::queue::{LoopMode, SessionQueue};
use super::volume::{from_percent, ramp_steps, to_percent, MAX_VOLUME_PERCENT};
use crate::error::{ControlError, PipelineError};
use crate::model::{Track, TrackKind};
use crate::pipeline::{Notice, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// Session controls issued by users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Pause,
    Resume,
    Skip,
    SetLoop(LoopMode),
    SetVolume(u8),
    Volume,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Paused,
    Resumed,
    Skipped { next: Option<String> },
    LoopSet(LoopMode),
    VolumeChanged { from: u8, to: u8 },
    Volume(u8),
    Stopped,
}

type ControlReply = oneshot::Sender<Result<ControlOutcome, ControlError>>;

pub(crate) enum SessionCommand {
    Enqueue(Track),
    TrackEnded { generation: u64 },
    Control(Control, ControlReply),
}

/// One guild's playback: its queue, loop mode, volume and the active stream.
///
/// Runs as its own task and is only reachable through its command channel, so
/// every mutation of the session is serialised.
pub struct PlaybackSequencer {
    guild_id: GuildId,
    queue: SessionQueue,
    state: PlaybackState,
    volume: f32,
    generation: u64,
    volume_step: Duration,
    output: Arc<dyn VoiceOutput>,
    notifier: Arc<dyn Notifier>,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl PlaybackSequencer {
    fn new(
        guild_id: GuildId,
        settings: SessionSettings,
        output: Arc<dyn VoiceOutput>,
        notifier: Arc<dyn Notifier>,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self {
            guild_id,
            queue: SessionQueue::new(),
            state: PlaybackState::Idle,
            volume: settings.default_volume,
            generation: 0,
            volume_step: settings.volume_step,
            output,
            notifier,
            commands,
        }
    }

    async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<SessionCommand>,
        cancel: CancellationToken,
    ) {
        debug!(guild = %self.guild_id, "🎛️ Sesión creada");

        loop {
            let command = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = inbox.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                SessionCommand::Enqueue(track) => self.enqueue(track).await,
                SessionCommand::TrackEnded { generation } => self.on_track_ended(generation).await,
                SessionCommand::Control(control, reply) => {
                    let result = self.control(control).await;
                    let _ = reply.send(result);
                    if control == Control::Stop {
                        break;
                    }
                }
            }
        }

        debug!(guild = %self.guild_id, "🛑 Sesión destruida");
    }

    async fn enqueue(&mut self, track: Track) {
        let requester = *track.requester();
        let title = track.title().to_string();
        self.queue.push(track);

        match self.state {
            PlaybackState::Idle => {
                self.queue.start();
                self.play_current(true).await;
            }
            PlaybackState::Playing => {
                self.notifier
                    .notify(&requester, Notice::AddedToQueue { title })
                    .await;
            }
            PlaybackState::Paused => {
                debug!(guild = %self.guild_id, "📥 Encolado en pausa: {}", title);
            }
        }
    }

    async fn on_track_ended(&mut self, generation: u64) {
        if generation != self.generation || self.state == PlaybackState::Idle {
            debug!(guild = %self.guild_id, generation, "Fin de track obsoleto ignorado");
            return;
        }

        // Only music repeats under song loop; a finished sound effect hands over
        let repeating = self.queue.loop_mode() == LoopMode::Song
            && self.queue.current().map(Track::kind) == Some(TrackKind::Music);
        self.queue.advance();
        self.play_current(!repeating).await;
    }

    /// Starts the active track, dropping tracks the output refuses until one
    /// plays or the queue runs dry.
    async fn play_current(&mut self, announce: bool) {
        while let Some(track) = self.queue.current() {
            let title = track.title().to_string();
            let requester = *track.requester();
            let kind = track.kind();

            self.generation += 1;
            let on_end = TrackEndNotifier::new(self.commands.clone(), self.generation);

            match self
                .output
                .play(self.guild_id, track, self.volume, on_end)
                .await
            {
                Ok(()) => {
                    self.state = PlaybackState::Playing;
                    info!(guild = %self.guild_id, "🎵 Reproduciendo: {}", title);
                    if announce && kind == TrackKind::Music {
                        self.notifier
                            .notify(&requester, Notice::NowPlaying { title })
                            .await;
                    }
                    return;
                }
                Err(e) => {
                    error!(guild = %self.guild_id, error = %e, "❌ No se pudo reproducir: {}", title);
                    let reason = e.to_string();
                    self.notifier
                        .notify(
                            &requester,
                            Notice::Failed(PipelineError::Playback { title, reason }),
                        )
                        .await;
                    self.queue.drop_current();
                }
            }
        }

        self.state = PlaybackState::Idle;
    }

    async fn control(&mut self, control: Control) -> Result<ControlOutcome, ControlError> {
        match control {
            Control::Pause => {
                if self.state != PlaybackState::Playing {
                    return Err(ControlError::NotPlaying);
                }
                self.log_output_error(self.output.pause(self.guild_id).await);
                self.state = PlaybackState::Paused;
                info!(guild = %self.guild_id, "⏸️ Reproducción pausada");
                Ok(ControlOutcome::Paused)
            }
            Control::Resume => {
                if self.state != PlaybackState::Paused {
                    return Err(ControlError::NotPaused);
                }
                self.log_output_error(self.output.resume(self.guild_id).await);
                self.state = PlaybackState::Playing;
                info!(guild = %self.guild_id, "▶️ Reproducción reanudada");
                Ok(ControlOutcome::Resumed)
            }
            Control::Skip => {
                if self.state == PlaybackState::Idle {
                    return Err(ControlError::NotPlaying);
                }
                // Invalida el evento de fin del track que se detiene
                self.generation += 1;
                self.log_output_error(self.output.stop(self.guild_id).await);
                self.queue.skip();
                self.play_current(true).await;
                info!(guild = %self.guild_id, "⏭️ Track saltado");
                Ok(ControlOutcome::Skipped {
                    next: self.queue.current().map(|t| t.title().to_string()),
                })
            }
            Control::SetLoop(mode) => {
                self.queue.set_loop_mode(mode);
                Ok(ControlOutcome::LoopSet(mode))
            }
            Control::SetVolume(target) => {
                if target > MAX_VOLUME_PERCENT {
                    return Err(ControlError::VolumeOutOfRange(u32::from(target)));
                }
                let from = to_percent(self.volume);
                self.ramp_volume(from, target).await;
                self.volume = from_percent(target);
                info!(guild = %self.guild_id, "🔊 Volumen ajustado a {}%", target);
                Ok(ControlOutcome::VolumeChanged { from, to: target })
            }
            Control::Volume => Ok(ControlOutcome::Volume(to_percent(self.volume))),
            Control::Stop => {
                self.generation += 1;
                self.log_output_error(self.output.stop(self.guild_id).await);
                self.log_output_error(self.output.leave(self.guild_id).await);
                self.queue.clear();
                self.state = PlaybackState::Idle;
                info!(guild = %self.guild_id, "⏹️ Reproducción detenida");
                Ok(ControlOutcome::Stopped)
            }
        }
    }

    /// Steps the live volume one percent at a time. The caller waits for the
    /// whole ramp; with nothing streaming the stored volume just changes.
    async fn ramp_volume(&self, from: u8, to: u8) {
        if self.state == PlaybackState::Idle {
            return;
        }

        for step in ramp_steps(from, to) {
            if let Err(e) = self.output.set_volume(self.guild_id, from_percent(step)).await {
                warn!(guild = %self.guild_id, error = %e, "⚠️ Rampa de volumen interrumpida");
                return;
            }
            tokio::time::sleep(self.volume_step).await;
        }
    }

    fn log_output_error(&self, result: Result<(), crate::error::OutputError>) {
        if let Err(e) = result {
            warn!(guild = %self.guild_id, error = %e, "⚠️ Error de salida de voz");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub default_volume: f32,
    pub volume_step: Duration,
}

#[derive(Clone)]
struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    /// Text channel of the request that started the session.
    text_channel: Option<ChannelId>,
}

/// Guild → sequencer map. Sessions are created on first enqueue and removed
/// on stop.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    settings: SessionSettings,
    output: Arc<dyn VoiceOutput>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionRegistry {
    pub fn new(
        settings: SessionSettings,
        output: Arc<dyn VoiceOutput>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
            output,
            notifier,
            cancel,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Hands a track to its guild's sequencer, creating the session if needed.
    ///
    /// Fails with `ShuttingDown` once the sessions were cancelled.
    pub fn enqueue(&self, track: Track) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::ShuttingDown);
        }

        let guild_id = track.guild_id();
        let text_channel = track.requester().text_channel;
        let mut command = SessionCommand::Enqueue(track);

        // A session that stopped between lookup and send is replaced once
        for _ in 0..2 {
            let handle = self
                .sessions
                .entry(guild_id)
                .or_insert_with(|| self.spawn(guild_id, text_channel))
                .clone();

            match handle.commands.send(command) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    self.sessions
                        .remove_if(&guild_id, |_, h| h.commands.same_channel(&handle.commands));
                    command = returned;
                }
            }
        }

        error!(guild = %guild_id, "❌ No se pudo entregar el track a la sesión");
        Err(PipelineError::ShuttingDown)
    }

    pub async fn control(
        &self,
        guild_id: GuildId,
        control: Control,
    ) -> Result<ControlOutcome, ControlError> {
        let handle = self
            .sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .ok_or(ControlError::NothingPlaying)?;

        if control == Control::Stop {
            self.sessions
                .remove_if(&guild_id, |_, h| h.commands.same_channel(&handle.commands));
        }

        let (reply, response) = oneshot::channel();
        handle
            .commands
            .send(SessionCommand::Control(control, reply))
            .map_err(|_| ControlError::SessionClosed)?;
        response.await.map_err(|_| ControlError::SessionClosed)?
    }

    /// Leaves voice in a guild that has no session.
    pub async fn leave(&self, guild_id: GuildId) {
        if let Err(e) = self.output.leave(guild_id).await {
            debug!(guild = %guild_id, error = %e, "Nada que abandonar");
        }
    }

    pub fn has_session(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    /// Text channel the guild's session was started from.
    pub fn text_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.sessions
            .get(&guild_id)
            .and_then(|entry| entry.value().text_channel)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Waits for every session task after the shared token was cancelled.
    pub async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        futures::future::join_all(tasks).await;
        self.sessions.clear();
    }

    fn spawn(&self, guild_id: GuildId, text_channel: Option<ChannelId>) -> SessionHandle {
        let (commands, inbox) = mpsc::unbounded_channel();
        let sequencer = PlaybackSequencer::new(
            guild_id,
            self.settings,
            self.output.clone(),
            self.notifier.clone(),
            commands.clone(),
        );

        let task = tokio::spawn(sequencer.run(inbox, self.cancel.child_token()));
        self.tasks.lock().push(task);

        SessionHandle {
            commands,
            text_channel,
        }
    }
}
