use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::timeout;

use tapedeck::audio::{ControlOutcome, LoopMode, TrackEndNotifier, VoiceGate, VoiceOutput};
use tapedeck::error::{AccessError, ControlError, OutputError, PipelineError};
use tapedeck::model::{DownloadJob, MediaFormat, MediaInfo, SessionRef, Track};
use tapedeck::pipeline::{Notice, Notifier, PipelineEvent, Stage};
use tapedeck::sources::{Downloader, MetadataResolver, TagReader};
use tapedeck::{Collaborators, Config, PipelineCoordinator};

const GUILD: GuildId = GuildId::new(100);
const WAIT: Duration = Duration::from_secs(5);

struct FakeResolver {
    calls: AtomicUsize,
}

#[async_trait]
impl MetadataResolver for FakeResolver {
    async fn resolve(&self, url: &str) -> anyhow::Result<MediaInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(MediaInfo {
            id: None,
            title: Some(format!("Title of {}", url)),
            duration: Some(180.0),
            protocol: Some("https".into()),
            is_live: Some(false),
            formats: vec![MediaFormat {
                format_id: "251".into(),
            }],
        })
    }
}

/// Pretends to be yt-dlp: drops `Downloaded_<id>.mp3` into the cache directory.
///
/// With `hold` set, each fetch waits for `release` after signalling `started`.
struct FakeDownloader {
    cache_dir: PathBuf,
    calls: AtomicUsize,
    fail: bool,
    hold: bool,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn fetch(&self, job: &DownloadJob) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hold {
            self.started.notify_one();
            self.release.notified().await;
        }
        if self.fail {
            anyhow::bail!("exit status: 1");
        }
        let path = self.cache_dir.join(format!("Downloaded_{}.mp3", job.video_id));
        tokio::fs::write(path, b"").await?;
        Ok(())
    }
}

struct NoTags;

#[async_trait]
impl TagReader for NoTags {
    async fn title(&self, _path: &Path) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

struct FakeOutput {
    plays: mpsc::UnboundedSender<(String, PathBuf)>,
    current: Mutex<Option<TrackEndNotifier>>,
    volumes: Mutex<Vec<f32>>,
    left: AtomicBool,
}

impl FakeOutput {
    fn finish_current(&self) {
        if let Some(on_end) = self.current.lock().take() {
            on_end.notify();
        }
    }
}

#[async_trait]
impl VoiceOutput for FakeOutput {
    async fn play(
        &self,
        _guild_id: GuildId,
        track: &Track,
        _volume: f32,
        on_end: TrackEndNotifier,
    ) -> Result<(), OutputError> {
        *self.current.lock() = Some(on_end);
        let _ = self
            .plays
            .send((track.title().to_string(), track.locator().clone()));
        Ok(())
    }

    async fn set_volume(&self, _guild_id: GuildId, volume: f32) -> Result<(), OutputError> {
        self.volumes.lock().push(volume);
        Ok(())
    }

    async fn pause(&self, _guild_id: GuildId) -> Result<(), OutputError> {
        Ok(())
    }

    async fn resume(&self, _guild_id: GuildId) -> Result<(), OutputError> {
        Ok(())
    }

    async fn stop(&self, _guild_id: GuildId) -> Result<(), OutputError> {
        self.current.lock().take();
        Ok(())
    }

    async fn leave(&self, _guild_id: GuildId) -> Result<(), OutputError> {
        self.left.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeGate {
    deny: AtomicBool,
}

#[async_trait]
impl VoiceGate for FakeGate {
    async fn ensure_joined(&self, _requester: &SessionRef) -> Result<(), AccessError> {
        self.check()
    }

    async fn check_same_channel(&self, _requester: &SessionRef) -> Result<(), AccessError> {
        self.check()
    }

    async fn join(&self, _requester: &SessionRef) -> Result<(), AccessError> {
        Ok(())
    }
}

impl FakeGate {
    fn check(&self) -> Result<(), AccessError> {
        if self.deny.load(Ordering::SeqCst) {
            Err(AccessError::WrongChannel)
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, _requester: &SessionRef, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

struct Harness {
    coordinator: PipelineCoordinator,
    events: broadcast::Receiver<PipelineEvent>,
    plays: mpsc::UnboundedReceiver<(String, PathBuf)>,
    resolver: Arc<FakeResolver>,
    downloader: Arc<FakeDownloader>,
    output: Arc<FakeOutput>,
    gate: Arc<FakeGate>,
    notifier: Arc<RecordingNotifier>,
    root: tempfile::TempDir,
}

struct Setup {
    cached: Vec<&'static str>,
    music: Vec<&'static str>,
    failing_downloads: bool,
    held_downloads: bool,
    default_volume: f32,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            cached: Vec::new(),
            music: Vec::new(),
            failing_downloads: false,
            held_downloads: false,
            default_volume: 0.5,
        }
    }
}

async fn harness(setup: Setup) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let cache_dir = root.path().join("cache");
    let music_dir = root.path().join("music");
    std::fs::create_dir_all(&cache_dir).unwrap();
    std::fs::create_dir_all(&music_dir).unwrap();
    for name in &setup.cached {
        std::fs::write(cache_dir.join(name), b"").unwrap();
    }
    for name in &setup.music {
        std::fs::write(music_dir.join(name), b"").unwrap();
    }

    let config = Config {
        cache_dir: cache_dir.clone(),
        music_dir,
        sfx_dir: root.path().join("sfx"),
        default_volume: setup.default_volume,
        volume_step: Duration::from_millis(10),
        ..Config::default()
    };

    let (plays_tx, plays) = mpsc::unbounded_channel();
    let resolver = Arc::new(FakeResolver {
        calls: AtomicUsize::new(0),
    });
    let downloader = Arc::new(FakeDownloader {
        cache_dir,
        calls: AtomicUsize::new(0),
        fail: setup.failing_downloads,
        hold: setup.held_downloads,
        started: Notify::new(),
        release: Notify::new(),
    });
    let output = Arc::new(FakeOutput {
        plays: plays_tx,
        current: Mutex::new(None),
        volumes: Mutex::new(Vec::new()),
        left: AtomicBool::new(false),
    });
    let gate = Arc::new(FakeGate::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let coordinator = PipelineCoordinator::start(
        &config,
        Collaborators {
            resolver: resolver.clone(),
            downloader: downloader.clone(),
            tag_reader: Arc::new(NoTags),
            output: output.clone(),
            gate: gate.clone(),
            notifier: notifier.clone(),
        },
    )
    .await;
    let events = coordinator.subscribe();

    Harness {
        coordinator,
        events,
        plays,
        resolver,
        downloader,
        output,
        gate,
        notifier,
        root,
    }
}

fn requester() -> SessionRef {
    SessionRef::new(GUILD, UserId::new(7))
        .with_text_channel(ChannelId::new(8))
        .with_voice_channel(ChannelId::new(9))
}

async fn next_play(h: &mut Harness) -> (String, PathBuf) {
    timeout(WAIT, h.plays.recv())
        .await
        .expect("nothing started playing")
        .expect("output dropped")
}

async fn wait_for(h: &mut Harness, wanted: impl Fn(&PipelineEvent) -> bool) {
    timeout(WAIT, async {
        loop {
            match h.events.recv().await {
                Ok(event) if wanted(&event) => return,
                Ok(_) => {}
                Err(e) => panic!("event bus failed: {}", e),
            }
        }
    })
    .await
    .expect("event never published")
}

fn drain(events: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn cached_video_plays_without_resolving_or_downloading() {
    let mut h = harness(Setup {
        cached: vec!["MySong_dQw4w9WgXcQ.mp3"],
        ..Setup::default()
    })
    .await;

    h.coordinator
        .submit_remote(requester(), "https://youtu.be/dQw4w9WgXcQ")
        .await;

    let (title, locator) = next_play(&mut h).await;
    assert_eq!(title, "MySong");
    assert_eq!(
        locator,
        h.root.path().join("cache").join("MySong_dQw4w9WgXcQ.mp3")
    );
    assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 0);

    let events = drain(&mut h.events);
    assert_eq!(
        events[0],
        PipelineEvent::CacheHit {
            video_id: "dQw4w9WgXcQ".into()
        }
    );
    assert!(!events.contains(&PipelineEvent::Entered {
        stage: Stage::Resolution
    }));
}

#[tokio::test]
async fn invalid_link_queues_nothing() {
    let mut h = harness(Setup::default()).await;

    h.coordinator
        .submit_remote(requester(), "https://example.com/notube")
        .await;

    assert_eq!(
        drain(&mut h.events),
        vec![PipelineEvent::Dropped {
            stage: Stage::Submission,
            error: PipelineError::InvalidLink("https://example.com/notube".into()),
        }]
    );
    assert_eq!(
        *h.notifier.notices.lock(),
        vec![Notice::Failed(PipelineError::InvalidLink(
            "https://example.com/notube".into()
        ))]
    );
    assert!(!h.coordinator.has_session(GUILD));
}

#[tokio::test]
async fn uncached_video_goes_through_every_stage() {
    let mut h = harness(Setup::default()).await;

    h.coordinator
        .submit_remote(requester(), "https://www.youtube.com/watch?v=aaaaaaaaaaa")
        .await;

    let (title, _) = next_play(&mut h).await;
    assert_eq!(title, "Downloaded");
    assert!(h.coordinator.cache().contains("aaaaaaaaaaa"));

    let entered: Vec<Stage> = drain(&mut h.events)
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::Entered { stage } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        entered,
        vec![Stage::Resolution, Stage::Download, Stage::Cache, Stage::Playback]
    );
    assert!(h.notifier.notices.lock().iter().any(|notice| matches!(
        notice,
        Notice::Preparing { duration: Some(d), .. } if *d == Duration::from_secs(180)
    )));
}

#[tokio::test]
async fn concurrent_identical_requests_download_twice() {
    let mut h = harness(Setup::default()).await;
    let url = "https://youtu.be/bbbbbbbbbbb";

    h.coordinator.submit_remote(requester(), url).await;
    h.coordinator.submit_remote(requester(), url).await;

    for _ in 0..2 {
        wait_for(&mut h, |event| {
            *event == PipelineEvent::Completed {
                stage: Stage::Download,
            }
        })
        .await;
    }
    assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn download_failure_is_reported_and_dropped() {
    let mut h = harness(Setup {
        failing_downloads: true,
        ..Setup::default()
    })
    .await;

    h.coordinator
        .submit_remote(requester(), "https://youtu.be/ccccccccccc")
        .await;

    wait_for(&mut h, |event| {
        matches!(
            event,
            PipelineEvent::Dropped {
                stage: Stage::Download,
                error: PipelineError::DownloadFailed { .. },
            }
        )
    })
    .await;

    let notices = h.notifier.notices.lock().clone();
    let failure = notices
        .iter()
        .find(|notice| matches!(notice, Notice::Failed(_)))
        .expect("requester was not told");
    assert_eq!(
        failure.to_string(),
        "I ran into an error during download... maybe try again in a few seconds."
    );
    assert!(!h.coordinator.cache().contains("ccccccccccc"));
}

#[tokio::test]
async fn local_tracks_play_in_request_order() {
    let mut h = harness(Setup {
        music: vec!["A.mp3", "B.mp3", "C.wav"],
        ..Setup::default()
    })
    .await;

    for name in ["A", "B", "C"] {
        h.coordinator.submit_local(requester(), name).await;
    }

    assert_eq!(next_play(&mut h).await.0, "A");
    h.output.finish_current();
    assert_eq!(next_play(&mut h).await.0, "B");
    h.output.finish_current();
    assert_eq!(next_play(&mut h).await.0, "C");
    h.output.finish_current();

    assert_eq!(
        h.coordinator.pause(requester()).await,
        Err(ControlError::NotPlaying)
    );
    assert!(h.plays.try_recv().is_err());
}

#[tokio::test]
async fn playlist_loop_cycles_through_the_queue() {
    let mut h = harness(Setup {
        music: vec!["A.mp3", "B.mp3"],
        ..Setup::default()
    })
    .await;

    h.coordinator.submit_local(requester(), "A").await;
    h.coordinator.submit_local(requester(), "B").await;
    assert_eq!(
        h.coordinator.set_loop(requester(), LoopMode::Playlist).await,
        Ok(ControlOutcome::LoopSet(LoopMode::Playlist))
    );

    let mut order = vec![next_play(&mut h).await.0];
    for _ in 0..3 {
        h.output.finish_current();
        order.push(next_play(&mut h).await.0);
    }
    assert_eq!(order, vec!["A", "B", "A", "B"]);
}

#[tokio::test]
async fn volume_ramps_down_one_percent_at_a_time() {
    let mut h = harness(Setup {
        music: vec!["A.mp3"],
        default_volume: 0.7,
        ..Setup::default()
    })
    .await;
    h.coordinator.submit_local(requester(), "A").await;
    next_play(&mut h).await;

    tokio::time::pause();
    let started = tokio::time::Instant::now();
    let outcome = h.coordinator.set_volume(requester(), 40).await;

    assert_eq!(outcome, Ok(ControlOutcome::VolumeChanged { from: 70, to: 40 }));
    assert!(started.elapsed() >= Duration::from_millis(300));

    let percents: Vec<u32> = h
        .output
        .volumes
        .lock()
        .iter()
        .map(|v| (v * 100.0).round() as u32)
        .collect();
    assert_eq!(percents, (40..70).rev().collect::<Vec<u32>>());
}

#[tokio::test]
async fn out_of_range_volume_is_rejected() {
    let h = harness(Setup::default()).await;
    assert_eq!(
        h.coordinator.set_volume(requester(), 101).await,
        Err(ControlError::VolumeOutOfRange(101))
    );
}

#[tokio::test]
async fn controls_from_outside_the_channel_change_nothing() {
    let mut h = harness(Setup {
        music: vec!["A.mp3"],
        ..Setup::default()
    })
    .await;
    h.coordinator.submit_local(requester(), "A").await;
    next_play(&mut h).await;

    h.gate.deny.store(true, Ordering::SeqCst);
    assert_eq!(
        h.coordinator.stop(requester()).await,
        Err(ControlError::Access(AccessError::WrongChannel))
    );
    assert!(h.coordinator.has_session(GUILD));
    assert!(!h.output.left.load(Ordering::SeqCst));
}

#[tokio::test]
async fn volume_query_and_change_require_the_same_channel() {
    let mut h = harness(Setup {
        music: vec!["A.mp3"],
        ..Setup::default()
    })
    .await;
    h.coordinator.submit_local(requester(), "A").await;
    next_play(&mut h).await;

    h.gate.deny.store(true, Ordering::SeqCst);
    assert_eq!(
        h.coordinator.volume(requester()).await,
        Err(ControlError::Access(AccessError::WrongChannel))
    );
    // Channel check comes before the range check
    assert_eq!(
        h.coordinator.set_volume(requester(), 140).await,
        Err(ControlError::Access(AccessError::WrongChannel))
    );
    assert!(h.output.volumes.lock().is_empty());

    h.gate.deny.store(false, Ordering::SeqCst);
    assert_eq!(
        h.coordinator.volume(requester()).await,
        Ok(ControlOutcome::Volume(50))
    );
}

#[tokio::test]
async fn session_remembers_the_channel_it_was_started_from() {
    let mut h = harness(Setup {
        music: vec!["A.mp3"],
        ..Setup::default()
    })
    .await;
    assert_eq!(h.coordinator.session_channel(GUILD), None);

    h.coordinator.submit_local(requester(), "A").await;
    next_play(&mut h).await;

    assert_eq!(h.coordinator.session_channel(GUILD), Some(ChannelId::new(8)));
}

#[tokio::test]
async fn stop_destroys_the_session_and_leaves() {
    let mut h = harness(Setup {
        music: vec!["A.mp3", "B.mp3"],
        ..Setup::default()
    })
    .await;
    h.coordinator.submit_local(requester(), "A").await;
    h.coordinator.submit_local(requester(), "B").await;
    next_play(&mut h).await;

    assert_eq!(
        h.coordinator.stop(requester()).await,
        Ok(ControlOutcome::Stopped)
    );
    assert!(!h.coordinator.has_session(GUILD));
    assert!(h.output.left.load(Ordering::SeqCst));
    assert_eq!(
        h.coordinator.skip(requester()).await,
        Err(ControlError::NothingPlaying)
    );

    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn missing_local_file_is_reported() {
    let mut h = harness(Setup::default()).await;

    h.coordinator.submit_local(requester(), "nope").await;

    assert_eq!(
        drain(&mut h.events),
        vec![PipelineEvent::Dropped {
            stage: Stage::Submission,
            error: PipelineError::LocalFileNotFound("nope".into()),
        }]
    );
}

#[tokio::test]
async fn download_in_flight_at_shutdown_still_reaches_the_requester() {
    let mut h = harness(Setup {
        held_downloads: true,
        ..Setup::default()
    })
    .await;

    h.coordinator
        .submit_remote(requester(), "https://youtu.be/ddddddddddd")
        .await;
    timeout(WAIT, h.downloader.started.notified())
        .await
        .expect("download never started");

    // Cancel first, then let the dequeued download finish
    let downloader = h.downloader.clone();
    tokio::join!(h.coordinator.shutdown(), async move {
        downloader.release.notify_one()
    });

    assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 1);
    assert!(drain(&mut h.events).iter().any(|event| matches!(
        event,
        PipelineEvent::Dropped {
            error: PipelineError::ShuttingDown,
            ..
        }
    )));
    assert!(h
        .notifier
        .notices
        .lock()
        .contains(&Notice::Failed(PipelineError::ShuttingDown)));
    assert!(!h.coordinator.cache().contains("ddddddddddd"));
    assert!(h.plays.try_recv().is_err());
}

#[tokio::test]
async fn requests_after_shutdown_are_refused_out_loud() {
    let mut h = harness(Setup {
        music: vec!["A.mp3"],
        ..Setup::default()
    })
    .await;
    h.coordinator.shutdown().await;

    h.coordinator
        .submit_remote(requester(), "https://youtu.be/eeeeeeeeeee")
        .await;
    h.coordinator.submit_local(requester(), "A").await;

    let refused = PipelineEvent::Dropped {
        stage: Stage::Submission,
        error: PipelineError::ShuttingDown,
    };
    assert_eq!(drain(&mut h.events), vec![refused.clone(), refused]);
    assert_eq!(
        *h.notifier.notices.lock(),
        vec![
            Notice::Failed(PipelineError::ShuttingDown),
            Notice::Failed(PipelineError::ShuttingDown),
        ]
    );
}
