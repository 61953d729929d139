use anyhow::Result;
use async_trait::async_trait;
use std::process::Stdio;
use tracing::{debug, info, warn};

use super::{Downloader, MetadataResolver};
use crate::config::{FORMAT_ID_SLOT, URL_SLOT};
use crate::model::{DownloadJob, MediaInfo};

/// Metadata lookup through `yt-dlp -J`.
pub struct YtDlpResolver {
    binary: String,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl MetadataResolver for YtDlpResolver {
    async fn resolve(&self, url: &str) -> Result<MediaInfo> {
        debug!("🔍 Extrayendo metadatos: {}", url);

        let output = tokio::process::Command::new(&self.binary)
            .args([
                "--dump-single-json",
                "--no-playlist",
                "--skip-download",
                "--quiet",
                "--no-warnings",
            ])
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp info failed: {}", error.trim());
        }

        let info: MediaInfo = serde_json::from_slice(&output.stdout)?;
        info!("📋 Metadatos obtenidos: {}", info.display_title());
        Ok(info)
    }
}

/// Runs the configured fetch command with the job's format id and URL filled in.
///
/// Only the exit status counts; stdout and stderr are discarded.
pub struct CommandDownloader {
    template: Vec<String>,
}

impl CommandDownloader {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }

    /// The argument vector for one job, program name first.
    pub fn command_line(&self, job: &DownloadJob) -> Vec<String> {
        self.template
            .iter()
            .map(|arg| {
                arg.replace(FORMAT_ID_SLOT, &job.format_id)
                    .replace(URL_SLOT, &job.url)
            })
            .collect()
    }
}

#[async_trait]
impl Downloader for CommandDownloader {
    async fn fetch(&self, job: &DownloadJob) -> Result<()> {
        let argv = self.command_line(job);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("empty download command"))?;

        debug!("⬇️ Ejecutando: {}", argv.join(" "));

        let status = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            warn!("❌ Descarga falló para {}: {}", job.video_id, status);
            anyhow::bail!("download command exited with {}", status);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionRef;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{GuildId, UserId};

    fn job() -> DownloadJob {
        DownloadJob {
            requester: SessionRef::new(GuildId::new(1), UserId::new(1)),
            url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            video_id: "dQw4w9WgXcQ".to_string(),
            format_id: "251".to_string(),
        }
    }

    #[test]
    fn test_command_line_fills_both_slots() {
        let downloader = CommandDownloader::new(vec![
            "yt-dlp".to_string(),
            "-f".to_string(),
            FORMAT_ID_SLOT.to_string(),
            URL_SLOT.to_string(),
        ]);
        assert_eq!(
            downloader.command_line(&job()),
            vec!["yt-dlp", "-f", "251", "https://youtu.be/dQw4w9WgXcQ"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides_success() {
        let ok = CommandDownloader::new(vec!["true".into(), FORMAT_ID_SLOT.into(), URL_SLOT.into()]);
        assert!(ok.fetch(&job()).await.is_ok());

        let failing =
            CommandDownloader::new(vec!["false".into(), FORMAT_ID_SLOT.into(), URL_SLOT.into()]);
        assert!(failing.fetch(&job()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_program_is_a_failure() {
        let downloader = CommandDownloader::new(vec![
            "definitely-not-a-real-binary-xyz".into(),
            URL_SLOT.into(),
        ]);
        assert!(downloader.fetch(&job()).await.is_err());
    }
}
