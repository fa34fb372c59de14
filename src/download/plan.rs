//! 批次准备：解析输入、校验、创建输出目录、为每个请求生成作业。
//!
//! 这里的错误在批次开始前同步返回，不会产生任何子进程。

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::command::build_argv;
use super::error::DownloadError;
use super::input_parser::{ParsedBatch, parse_batch};
use super::models::{DownloadOptions, DownloadRequest, Job};

/// Everything the runner needs for one batch.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub jobs: Vec<Job>,
    pub output_dir: PathBuf,
    /// Remove `*.part` and friends from `output_dir` after a failed job.
    pub cleanup_partial_files: bool,
    /// Informational parser notes, replayed on the log channel at batch start.
    pub notes: Vec<String>,
}

impl BatchPlan {
    pub fn new(jobs: Vec<Job>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs,
            output_dir: output_dir.into(),
            cleanup_partial_files: true,
            notes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Numbers argument vectors in submission order.
pub fn jobs_from_argv(argvs: Vec<Vec<String>>) -> Vec<Job> {
    let total = argvs.len();
    argvs
        .into_iter()
        .enumerate()
        .map(|(index, argv)| Job { argv, index, total })
        .collect()
}

pub fn plan_jobs(tool: &Path, requests: &[DownloadRequest], options: &DownloadOptions) -> Vec<Job> {
    jobs_from_argv(
        requests
            .iter()
            .map(|req| build_argv(tool, req, options))
            .collect(),
    )
}

pub fn prepare_batch(
    parsed: ParsedBatch,
    options: &DownloadOptions,
    tool: &Path,
) -> Result<BatchPlan, DownloadError> {
    if parsed.is_empty() {
        return Err(DownloadError::EmptyInput);
    }

    ensure_output_dir(&options.output_dir)?;

    let jobs = plan_jobs(tool, &parsed.requests, options);
    for job in &jobs {
        debug!(target: "plan", index = job.index, argv = ?job.argv, "作业已生成");
    }
    info!(
        target: "plan",
        jobs = jobs.len(),
        output = %options.output_dir.display(),
        "批次准备完成"
    );

    let mut plan = BatchPlan::new(jobs, options.output_dir.clone());
    plan.notes = parsed.notes;
    Ok(plan)
}

pub fn prepare_from_text(
    raw: &str,
    options: &DownloadOptions,
    tool: &Path,
) -> Result<BatchPlan, DownloadError> {
    prepare_batch(parse_batch(raw), options, tool)
}

fn ensure_output_dir(dir: &Path) -> Result<(), DownloadError> {
    fs::create_dir_all(dir).map_err(|source| DownloadError::OutputDir {
        path: dir.to_path_buf(),
        source,
    })
}
