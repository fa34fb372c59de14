//! 下载批次相关的数据模型定义。
//!
//! 包含下载请求、批次选项、作业、作业结果以及运行器事件等核心数据结构。

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::JobError;

/// One target parsed from the batch text: the video URL plus an optional referer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub url: String,
    pub referer: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, referer: Option<String>) -> Self {
        Self {
            url: url.into(),
            referer: referer.filter(|r| !r.is_empty()),
        }
    }
}

/// Output container requested from the download tool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Webm,
    Mkv,
    Avi,
    Best,
    Worst,
}

impl VideoFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
            VideoFormat::Mkv => "mkv",
            VideoFormat::Avi => "avi",
            VideoFormat::Best => "best",
            VideoFormat::Worst => "worst",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(VideoFormat::Mp4),
            "webm" => Ok(VideoFormat::Webm),
            "mkv" => Ok(VideoFormat::Mkv),
            "avi" => Ok(VideoFormat::Avi),
            "best" => Ok(VideoFormat::Best),
            "worst" => Ok(VideoFormat::Worst),
            other => Err(format!("unknown format: {other}")),
        }
    }
}

/// Quality selector passed verbatim to `-f`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum Quality {
    #[default]
    #[serde(rename = "best")]
    #[value(name = "best")]
    Best,
    #[serde(rename = "worst")]
    #[value(name = "worst")]
    Worst,
    #[serde(rename = "720p")]
    #[value(name = "720p")]
    P720,
    #[serde(rename = "480p")]
    #[value(name = "480p")]
    P480,
    #[serde(rename = "360p")]
    #[value(name = "360p")]
    P360,
    #[serde(rename = "bestvideo+bestaudio")]
    #[value(name = "bestvideo+bestaudio")]
    BestVideoBestAudio,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::Worst => "worst",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
            Quality::BestVideoBestAudio => "bestvideo+bestaudio",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" => Ok(Quality::Best),
            "worst" => Ok(Quality::Worst),
            "720p" => Ok(Quality::P720),
            "480p" => Ok(Quality::P480),
            "360p" => Ok(Quality::P360),
            "bestvideo+bestaudio" => Ok(Quality::BestVideoBestAudio),
            other => Err(format!("unknown quality: {other}")),
        }
    }
}

/// Options chosen once per batch and applied to every request in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub format: VideoFormat,
    pub quality: Quality,
    pub subtitles: bool,
    pub audio_only: bool,
    pub no_playlist: bool,
    pub output_dir: PathBuf,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            format: VideoFormat::default(),
            quality: Quality::default(),
            subtitles: false,
            audio_only: false,
            no_playlist: false,
            output_dir: PathBuf::from("./downloads"),
        }
    }
}

/// One external-tool invocation. `index` is zero-based and follows submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub argv: Vec<String>,
    pub index: usize,
    pub total: usize,
}

impl Job {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    /// 1-based number used in user-facing messages.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub index: usize,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed,
    Stopped,
    /// The download tool could not be launched; remaining jobs never started.
    Aborted,
}

/// Everything the runner reports back to its caller, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RunnerEvent {
    JobStarted { index: usize, total: usize },
    Log(String),
    Progress(u8),
    Error(JobError),
    JobFinished(JobOutcome),
    Finished(BatchOutcome),
}
