//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};
use crate::download::models::{DownloadOptions, Quality, VideoFormat};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    // 下载选项
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub format: VideoFormat,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub subtitles: bool,
    #[serde(default)]
    pub audio_only: bool,
    #[serde(default)]
    pub no_playlist: bool,

    // 外部工具
    #[serde(default)]
    pub ytdlp_path: String,
    #[serde(default)]
    pub ffmpeg_path: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    // 文件管理
    #[serde(default = "default_true")]
    pub cleanup_partial_files: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: VideoFormat::default(),
            quality: Quality::default(),
            subtitles: false,
            audio_only: false,
            no_playlist: false,
            ytdlp_path: String::new(),
            ffmpeg_path: String::new(),
            probe_timeout_secs: default_probe_timeout_secs(),
            cleanup_partial_files: default_true(),
        }
    }
}

impl Config {
    pub fn download_options(&self) -> DownloadOptions {
        let dir = self.output_dir.trim();
        DownloadOptions {
            format: self.format,
            quality: self.quality,
            subtitles: self.subtitles,
            audio_only: self.audio_only,
            no_playlist: self.no_playlist,
            output_dir: if dir.is_empty() {
                PathBuf::from(default_output_dir())
            } else {
                PathBuf::from(dir)
            },
        }
    }

    pub fn ytdlp_override(&self) -> Option<&Path> {
        non_empty_path(&self.ytdlp_path)
    }

    pub fn ffmpeg_override(&self) -> Option<&Path> {
        non_empty_path(&self.ffmpeg_path)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}

fn non_empty_path(raw: &str) -> Option<&Path> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| Path::new(raw))
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 10] = [
            FieldMeta {
                name: "output_dir",
                description: "视频保存目录（不存在时自动创建）",
            },
            FieldMeta {
                name: "format",
                description: "输出容器, 可选: [mp4, webm, mkv, avi, best, worst]; best 表示不转码",
            },
            FieldMeta {
                name: "quality",
                description: "画质, 可选: [best, worst, 720p, 480p, 360p, bestvideo+bestaudio]",
            },
            FieldMeta {
                name: "subtitles",
                description: "是否下载全部语言字幕",
            },
            FieldMeta {
                name: "audio_only",
                description: "仅下载音频并转为 mp3（忽略 format 与 quality）",
            },
            FieldMeta {
                name: "no_playlist",
                description: "链接属于播放列表时只下载该视频",
            },
            FieldMeta {
                name: "ytdlp_path",
                description: "yt-dlp 可执行文件路径（留空自动查找）",
            },
            FieldMeta {
                name: "ffmpeg_path",
                description: "ffmpeg 可执行文件路径（留空自动查找，仅用于诊断）",
            },
            FieldMeta {
                name: "probe_timeout_secs",
                description: "检测工具版本的超时时间（秒）",
            },
            FieldMeta {
                name: "cleanup_partial_files",
                description: "下载失败后是否删除 .part/.ytdl 等临时文件",
            },
        ];
        &FIELDS
    }
}

fn default_output_dir() -> String {
    "./downloads".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}
