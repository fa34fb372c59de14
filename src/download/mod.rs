//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（DownloadRequest / Job / RunnerEvent 等）
//! - `error`：批次前置错误与作业错误
//! - `input_parser`：批次文本解析（URL 与可选 referer）
//! - `command`：为单个请求生成下载工具参数
//! - `progress`：工具输出中的百分比解析与整体进度聚合
//! - `plan`：批次准备：校验、建目录、生成作业
//! - `runner`：后台串行执行作业并发送事件

pub mod command;
pub mod error;
pub mod input_parser;
pub mod models;
pub mod plan;
pub mod progress;
pub mod runner;

pub use error::{DownloadError, JobError};
pub use models::{BatchOutcome, DownloadOptions, DownloadRequest, RunnerEvent};
pub use runner::JobRunner;
