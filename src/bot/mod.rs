//! # Bot Module
//!
//! Serenity adapter: turns prefix commands into pipeline submissions and
//! session controls, and posts [`Notice`]s back to text channels.

pub mod commands;

use async_trait::async_trait;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId},
    http::Http,
};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::audio::ControlOutcome;
use crate::error::ControlError;
use crate::model::SessionRef;
use crate::pipeline::{Notice, Notifier, PipelineCoordinator};
use crate::sources::is_remote_link;
pub use commands::{outcome_message, Command};

pub struct Handler {
    coordinator: Arc<PipelineCoordinator>,
    prefix: String,
}

impl Handler {
    pub fn new(coordinator: Arc<PipelineCoordinator>, prefix: impl Into<String>) -> Self {
        Self {
            coordinator,
            prefix: prefix.into(),
        }
    }

    async fn dispatch(&self, ctx: &Context, msg: &Message, requester: SessionRef, command: Command) {
        debug!(guild = %requester.guild_id, "Comando recibido: {:?}", command);
        let coordinator = &self.coordinator;

        let reply = match command {
            Command::Play(arg) => {
                if is_remote_link(&arg) {
                    coordinator.submit_remote(requester, &arg).await;
                } else {
                    coordinator.submit_local(requester, &arg).await;
                }
                None
            }
            Command::SoundEffect(name) => {
                coordinator.submit_sound_effect(requester, &name).await;
                None
            }
            Command::Join => Some(match coordinator.join(requester).await {
                Ok(()) => "Coming! :wave:".to_string(),
                Err(e) => e.user_message().to_string(),
            }),
            Command::Volume => Some(control_reply(coordinator.volume(requester).await)),
            Command::SetVolume(percent) => {
                Some(control_reply(coordinator.set_volume(requester, percent).await))
            }
            Command::Skip => Some(control_reply(coordinator.skip(requester).await)),
            Command::Loop(mode) => Some(control_reply(coordinator.set_loop(requester, mode).await)),
            Command::Pause => Some(control_reply(coordinator.pause(requester).await)),
            Command::Resume => Some(control_reply(coordinator.resume(requester).await)),
            Command::Stop => Some(control_reply(coordinator.stop(requester).await)),
            Command::Usage(text) => Some(text.to_string()),
        };

        if let Some(reply) = reply {
            if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
                error!("Error al enviar respuesta: {:?}", e);
            }
        }
    }

    /// Plain messages naming a sound effect play it silently, but only in the
    /// text channel that started the guild's session.
    async fn feedback_sound(&self, requester: SessionRef, channel: ChannelId, content: &str) {
        let session_channel = self.coordinator.session_channel(requester.guild_id);
        let Some(name) = feedback_candidate(&self.prefix, content, session_channel, channel) else {
            return;
        };

        if self.coordinator.library().find_sound_effect(name).await.is_some() {
            self.coordinator
                .submit_sound_effect(requester.quiet(), name)
                .await;
        }
    }
}

/// The sound effect name a plain message asks for, if it may trigger one.
fn feedback_candidate<'a>(
    prefix: &str,
    content: &'a str,
    session_channel: Option<ChannelId>,
    channel: ChannelId,
) -> Option<&'a str> {
    let name = content.trim();
    if name.is_empty() || name.starts_with(prefix) || session_channel != Some(channel) {
        return None;
    }
    Some(name)
}

fn control_reply(result: Result<ControlOutcome, ControlError>) -> String {
    match result {
        Ok(outcome) => outcome_message(&outcome),
        Err(e) => e.user_message().to_string(),
    }
}

fn voice_channel_of(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let mut requester =
            SessionRef::new(guild_id, msg.author.id).with_text_channel(msg.channel_id);
        if let Some(channel) = voice_channel_of(&ctx, guild_id, msg.author.id) {
            requester = requester.with_voice_channel(channel);
        }

        match Command::parse(&self.prefix, &msg.content) {
            Some(command) => self.dispatch(&ctx, &msg, requester, command).await,
            None => {
                self.feedback_sound(requester, msg.channel_id, &msg.content)
                    .await
            }
        }
    }
}

/// Posts notices to the requester's text channel.
pub struct ChannelNotifier {
    http: Arc<Http>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, requester: &SessionRef, notice: Notice) {
        let Some(channel) = requester.text_channel else {
            return;
        };
        if let Err(e) = channel.say(&self.http, notice.to_string()).await {
            error!(guild = %requester.guild_id, "Error al enviar aviso: {:?}", e);
        }
    }
}
