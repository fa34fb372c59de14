//! 进度解析与整体进度聚合。
//!
//! 单个视频的百分比来自下载工具的 `[download] xx.x%` 输出行；
//! 整体进度 = (作业序号 * 100 + 视频百分比) / 作业总数，截断取整，批次内单调不减。

use std::sync::OnceLock;

use regex::Regex;

static RE_PERCENT: OnceLock<Regex> = OnceLock::new();

fn re_percent() -> &'static Regex {
    RE_PERCENT.get_or_init(|| Regex::new(r"(\d+\.?\d*)%").expect("compile RE_PERCENT"))
}

/// Extracts the current video's percentage from a tool output line.
///
/// Only lines carrying the `[download]` marker and a `%` sign count.
pub fn parse_video_percent(line: &str) -> Option<f64> {
    if !line.contains("[download]") || !line.contains('%') {
        return None;
    }
    let caps = re_percent().captures(line)?;
    caps.get(1)?.as_str().parse::<f64>().ok()
}

pub fn overall_percent(index: usize, total: usize, video_percent: f64) -> u8 {
    if total == 0 {
        return 0;
    }
    let video = video_percent.clamp(0.0, 100.0);
    let value = ((index as f64 * 100.0) + video) / total as f64;
    value.clamp(0.0, 100.0) as u8
}

pub fn job_boundary_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (((index + 1) * 100) / total).min(100) as u8
}

/// Tracks the last emitted value so the batch-level percentage never goes backwards.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    total: usize,
    last: Option<u8>,
}

impl ProgressAggregator {
    pub fn new(total: usize) -> Self {
        Self { total, last: None }
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }

    /// Feeds one output line of job `index`; returns the value to report, if any.
    pub fn observe_line(&mut self, index: usize, line: &str) -> Option<u8> {
        let video = parse_video_percent(line)?;
        self.accept(overall_percent(index, self.total, video))
    }

    /// Job `index` ended (either way); the boundary value supersedes line-level values.
    pub fn complete_job(&mut self, index: usize) -> Option<u8> {
        self.accept(job_boundary_percent(index, self.total))
    }

    // A tool that downloads video and audio streams separately restarts at 0%;
    // such regressions are dropped instead of reported.
    fn accept(&mut self, value: u8) -> Option<u8> {
        match self.last {
            Some(last) if value < last => None,
            _ => {
                self.last = Some(value);
                Some(value)
            }
        }
    }
}
