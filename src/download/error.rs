//! 下载流程错误类型。
//!
//! `DownloadError` 在批次开始前同步返回给调用方；`JobError` 在执行过程中通过事件通道异步上报。

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("no URL given: enter at least one URL")]
    EmptyInput,
    #[error("a batch is already running")]
    AlreadyRunning,
    #[error("cannot create output directory {path}: {source}")]
    OutputDir { path: PathBuf, source: io::Error },
    #[error("download tool is not available: {0}")]
    ToolUnavailable(String),
    #[error("failed to spawn runner thread: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobError {
    /// Launching the tool failed; nothing after this job will run.
    #[error("download tool not found ({program}): {message}; no further videos will be downloaded")]
    ToolNotFound { program: String, message: String },
    #[error("download of video {} failed: exit code {}", .index + 1, display_code(.code))]
    JobExecutionFailed { index: usize, code: Option<i32> },
    #[error("unexpected error in video {}: {message}", .index + 1)]
    Unexpected { index: usize, message: String },
}

impl JobError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, JobError::ToolNotFound { .. })
    }

    pub fn job_index(&self) -> Option<usize> {
        match self {
            JobError::ToolNotFound { .. } => None,
            JobError::JobExecutionFailed { index, .. } | JobError::Unexpected { index, .. } => {
                Some(*index)
            }
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "terminated by signal".to_string(),
    }
}
