//! Server configuration loaded from the environment.

use crate::application::pipeline::GopStrategy;
use crate::application::scheduler::SchedulerSettings;
use std::env;
use std::path::PathBuf;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Where uploaded sources wait for their turn
    pub upload_dir: PathBuf,
    /// Where finished containers are kept until they expire
    pub download_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub gop_strategy: GopStrategy,
}

impl ServerConfig {
    /// Load configuration from environment variables, reading `.env` first.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let max_upload_bytes = lookup("MAX_UPLOAD_BYTES")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let gop_strategy = match lookup("GOP_STRATEGY").as_deref() {
            Some("probe") => GopStrategy::FrameProbe,
            _ => GopStrategy::StartCodeScan,
        };

        Self {
            addr: text("ADDR", "127.0.0.1"),
            port: text("PORT", "3000"),
            upload_dir: PathBuf::from(text("UPLOAD_DIR", "./uploads")),
            download_dir: PathBuf::from(text("DOWNLOAD_DIR", "./downloads")),
            max_upload_bytes,
            ffmpeg_bin: PathBuf::from(text("FFMPEG_BIN", "ffmpeg")),
            ffprobe_bin: PathBuf::from(text("FFPROBE_BIN", "ffprobe")),
            gop_strategy,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            artifact_dir: self.download_dir.clone(),
            ..SchedulerSettings::default()
        }
    }
}
