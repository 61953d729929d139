//! The four stage loops and the queues between them.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{PipelineEvent, Stage};
use super::notice::{Notice, Notifier};
use crate::audio::SessionRegistry;
use crate::cache::CacheWriter;
use crate::error::PipelineError;
use crate::model::{DownloadJob, ResolutionRequest, SessionRef, Track};
use crate::sources::{select_audio_format, Downloader, MetadataResolver};

/// Sending half of a stage queue. Pushing reports the item as entering `stage`.
pub(crate) struct Outbox<T> {
    stage: Stage,
    sender: mpsc::UnboundedSender<T>,
    events: broadcast::Sender<PipelineEvent>,
}

impl<T> Outbox<T> {
    pub(crate) fn channel(
        stage: Stage,
        events: broadcast::Sender<PipelineEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                stage,
                sender,
                events,
            },
            receiver,
        )
    }
}

impl<T> Clone for Outbox<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage,
            sender: self.sender.clone(),
            events: self.events.clone(),
        }
    }
}

/// Where a stage puts what it produced. A closed queue gives the item back.
pub(crate) trait Handoff<T>: Send + Sync {
    fn hand_off(&self, item: T) -> Result<(), T>;
}

impl<T: Send> Handoff<T> for Outbox<T> {
    fn hand_off(&self, item: T) -> Result<(), T> {
        if let Err(mpsc::error::SendError(item)) = self.sender.send(item) {
            warn!(stage = %self.stage, "⚠️ Cola cerrada, el pipeline se está deteniendo");
            return Err(item);
        }
        let _ = self.events.send(PipelineEvent::Entered { stage: self.stage });
        Ok(())
    }
}

/// End of the line: the playback stage hands tracks to sessions itself.
pub(crate) struct Terminal;

impl Handoff<()> for Terminal {
    fn hand_off(&self, _item: ()) -> Result<(), ()> {
        Ok(())
    }
}

/// Shared by every stage loop: how failures reach the requester and the bus.
#[derive(Clone)]
pub(crate) struct StageContext {
    pub notifier: Arc<dyn Notifier>,
    pub events: broadcast::Sender<PipelineEvent>,
}

impl StageContext {
    /// Discards an item: logs it, publishes `Dropped`, and tells the requester.
    pub(crate) async fn drop_item(&self, stage: Stage, requester: &SessionRef, error: PipelineError) {
        match &error {
            PipelineError::CacheReconcile(_) | PipelineError::Playback { .. } => {
                error!(stage = %stage, guild = %requester.guild_id, error = %error, "❌ Petición descartada")
            }
            _ => {
                warn!(stage = %stage, guild = %requester.guild_id, error = %error, "⚠️ Petición descartada")
            }
        }

        let _ = self.events.send(PipelineEvent::Dropped {
            stage,
            error: error.clone(),
        });
        self.notifier.notify(requester, Notice::Failed(error)).await;
    }
}

/// One step of the pipeline.
#[async_trait]
pub(crate) trait StageWorker: Send + Sync + 'static {
    type Item: Send + 'static;
    type Output: Send + 'static;

    const STAGE: Stage;

    fn requester(item: &Self::Item) -> SessionRef;

    async fn process(&self, item: Self::Item) -> Result<Self::Output, PipelineError>;
}

/// Pulls items one at a time until cancelled or the queue closes.
///
/// Cancellation is only observed while waiting; an item already dequeued is
/// processed to completion and its requester is still told about a failure.
/// Items still queued when the loop stops are dropped as `ShuttingDown`, and
/// so is an output the next queue no longer accepts.
pub(crate) async fn run_stage<W, H>(
    worker: W,
    mut inbox: mpsc::UnboundedReceiver<W::Item>,
    next: H,
    ctx: StageContext,
    cancel: CancellationToken,
) where
    W: StageWorker,
    H: Handoff<W::Output>,
{
    info!(stage = %W::STAGE, "🚀 Etapa iniciada");

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = inbox.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let requester = W::requester(&item);
        match worker.process(item).await {
            Ok(output) => {
                let _ = ctx.events.send(PipelineEvent::Completed { stage: W::STAGE });
                if next.hand_off(output).is_err() {
                    ctx.drop_item(W::STAGE, &requester, PipelineError::ShuttingDown)
                        .await;
                }
            }
            Err(error) => ctx.drop_item(W::STAGE, &requester, error).await,
        }
    }

    inbox.close();
    while let Ok(item) = inbox.try_recv() {
        ctx.drop_item(W::STAGE, &W::requester(&item), PipelineError::ShuttingDown)
            .await;
    }

    info!(stage = %W::STAGE, "🛑 Etapa detenida");
}

/// Metadata lookup and format choice.
pub(crate) struct ResolutionStage {
    pub resolver: Arc<dyn MetadataResolver>,
    pub notifier: Arc<dyn Notifier>,
}

#[async_trait]
impl StageWorker for ResolutionStage {
    type Item = ResolutionRequest;
    type Output = DownloadJob;

    const STAGE: Stage = Stage::Resolution;

    fn requester(item: &ResolutionRequest) -> SessionRef {
        item.requester
    }

    async fn process(&self, request: ResolutionRequest) -> Result<DownloadJob, PipelineError> {
        let info = self.resolver.resolve(&request.url).await.map_err(|e| {
            PipelineError::MetadataUnavailable {
                url: request.url.clone(),
                reason: format!("{:#}", e),
            }
        })?;

        if info.is_live() {
            return Err(PipelineError::UnsupportedContent(request.url));
        }

        let format_id = select_audio_format(&info.formats);
        debug!(video_id = %request.video_id, format_id, "🔍 Metadatos obtenidos");

        self.notifier
            .notify(
                &request.requester,
                Notice::Preparing {
                    title: info.display_title().to_string(),
                    duration: info
                        .duration
                        .filter(|secs| secs.is_finite() && *secs >= 0.0)
                        .map(|secs| Duration::from_secs(secs.round() as u64)),
                },
            )
            .await;

        Ok(DownloadJob {
            requester: request.requester,
            url: request.url,
            video_id: request.video_id,
            format_id: format_id.to_string(),
        })
    }
}

/// Runs the external fetch command.
pub(crate) struct DownloadStage {
    pub downloader: Arc<dyn Downloader>,
}

#[async_trait]
impl StageWorker for DownloadStage {
    type Item = DownloadJob;
    type Output = DownloadJob;

    const STAGE: Stage = Stage::Download;

    fn requester(item: &DownloadJob) -> SessionRef {
        item.requester
    }

    async fn process(&self, job: DownloadJob) -> Result<DownloadJob, PipelineError> {
        info!(video_id = %job.video_id, format_id = %job.format_id, "⬇️ Descargando");
        match self.downloader.fetch(&job).await {
            Ok(()) => Ok(job),
            Err(e) => Err(PipelineError::DownloadFailed {
                video_id: job.video_id,
                reason: format!("{:#}", e),
            }),
        }
    }
}

/// Indexes finished downloads. The only stage that writes the cache index.
pub(crate) struct CacheStage {
    pub writer: CacheWriter,
}

#[async_trait]
impl StageWorker for CacheStage {
    type Item = DownloadJob;
    type Output = Track;

    const STAGE: Stage = Stage::Cache;

    fn requester(item: &DownloadJob) -> SessionRef {
        item.requester
    }

    async fn process(&self, job: DownloadJob) -> Result<Track, PipelineError> {
        let track = self.writer.reconcile(job).await?;
        info!("💾 Guardado en caché: {}", track.title());
        Ok(track)
    }
}

/// Hands ready tracks to their guild's session.
pub(crate) struct PlaybackStage {
    pub sessions: Arc<SessionRegistry>,
}

#[async_trait]
impl StageWorker for PlaybackStage {
    type Item = Track;
    type Output = ();

    const STAGE: Stage = Stage::Playback;

    fn requester(item: &Track) -> SessionRef {
        *item.requester()
    }

    async fn process(&self, track: Track) -> Result<(), PipelineError> {
        let waited = Utc::now() - track.requested_at();
        debug!(
            guild = %track.guild_id(),
            waited_ms = waited.num_milliseconds(),
            "📥 Track listo para la sesión: {}",
            track.title()
        );
        self.sessions.enqueue(track)
    }
}
