use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder replaced by the chosen format id in the download command.
pub const FORMAT_ID_SLOT: &str = "{format_id}";
/// Placeholder replaced by the source URL in the download command.
pub const URL_SLOT: &str = "{url}";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Paths
    pub cache_dir: PathBuf,
    pub music_dir: PathBuf,
    pub sfx_dir: PathBuf,

    // Audio
    pub default_volume: f32,
    pub volume_step: Duration,

    // yt-dlp
    pub ytdlp_path: String,
    pub download_command: Vec<String>,

    // Rendimiento
    pub worker_threads: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cache_dir: PathBuf = std::env::var("CACHE_DIR")
            .unwrap_or_else(|_| "./temp".to_string())
            .into();
        let ytdlp_path = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());

        let download_command = match std::env::var("DOWNLOAD_COMMAND") {
            Ok(val) if !val.trim().is_empty() => val.split_whitespace().map(str::to_string).collect(),
            _ => default_download_command(&ytdlp_path, &cache_dir),
        };

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),

            music_dir: std::env::var("MUSIC_DIR")
                .unwrap_or_else(|_| "./music".to_string())
                .into(),
            sfx_dir: std::env::var("SFX_DIR")
                .unwrap_or_else(|_| "./sfx".to_string())
                .into(),

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            volume_step: Duration::from_millis(
                std::env::var("VOLUME_STEP_MS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            ),

            worker_threads: match std::env::var("WORKER_THREADS") {
                Ok(val) if !val.trim().is_empty() => val.parse()?,
                _ => num_cpus::get(),
            },

            cache_dir,
            ytdlp_path,
            download_command,
        };

        // The downloader writes here; the other directories are read-only libraries
        std::fs::create_dir_all(&config.cache_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - The download command must contain both `{format_id}` and `{url}`
    /// - At least one worker thread
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.download_command.is_empty() {
            anyhow::bail!("Download command must not be empty");
        }

        for slot in [FORMAT_ID_SLOT, URL_SLOT] {
            if !self.download_command.iter().any(|arg| arg.contains(slot)) {
                anyhow::bail!("Download command is missing the {} placeholder", slot);
            }
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Paths: cache={} music={} sfx={}\n  \
            Audio: {}% default vol, {}ms ramp step\n  \
            Download: {}\n  \
            Workers: {}",
            self.command_prefix,
            self.cache_dir.display(),
            self.music_dir.display(),
            self.sfx_dir.display(),
            (self.default_volume * 100.0).round() as u32,
            self.volume_step.as_millis(),
            self.download_command.join(" "),
            self.worker_threads,
        )
    }
}

/// yt-dlp invocation extracting mp3 audio into the cache directory, named
/// `<title>_<videoID>.mp3`.
pub fn default_download_command(ytdlp_path: &str, cache_dir: &std::path::Path) -> Vec<String> {
    let output_template = cache_dir.join("%(title)s_%(id)s.%(ext)s");
    vec![
        ytdlp_path.to_string(),
        "--no-playlist".to_string(),
        "--quiet".to_string(),
        "--no-warnings".to_string(),
        "--extract-audio".to_string(),
        "--audio-format".to_string(),
        "mp3".to_string(),
        "--output".to_string(),
        output_template.to_string_lossy().into_owned(),
        "--format".to_string(),
        FORMAT_ID_SLOT.to_string(),
        URL_SLOT.to_string(),
    ]
}

/// Default configuration values.
///
/// Used by tests and as the base for [`Config::load`].
impl Default for Config {
    fn default() -> Self {
        let cache_dir = PathBuf::from("./temp");
        Self {
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            download_command: default_download_command("yt-dlp", &cache_dir),
            cache_dir,
            music_dir: "./music".into(),
            sfx_dir: "./sfx".into(),

            default_volume: 0.5,
            volume_step: Duration::from_millis(10),

            ytdlp_path: "yt-dlp".to_string(),

            worker_threads: num_cpus::get(),
        }
    }
}
