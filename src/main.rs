//! video-batch-dl：无界面的视频批量下载命令行。
//!
//! 启动流程：解析参数 → 初始化日志 → 加载 `config.yml` → 定位并探测 yt-dlp →
//! 解析批次文本 → 后台执行并在终端渲染事件。Ctrl-C 会停止当前批次。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{info, warn};

use video_batch_dl::base_system::config::load_or_create_with_base;
use video_batch_dl::base_system::context::Config;
use video_batch_dl::base_system::logging::{LogOptions, LogSystem};
use video_batch_dl::base_system::tool_paths::{
    ResolvedTool, ToolKind, ToolStatus, probe_tool, resolve_tool,
};
use video_batch_dl::download::input_parser::parse_batch;
use video_batch_dl::download::models::{DownloadOptions, Quality, VideoFormat};
use video_batch_dl::download::plan::prepare_batch;
use video_batch_dl::download::{DownloadError, JobRunner};
use video_batch_dl::ui::console::{RenderMode, render_events};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "video-batch-dl")]
#[command(about = "Batch video downloader driving yt-dlp")]
struct Cli {
    /// 视频链接，可写成 `URL:REFERER`；多个链接依次下载
    urls: Vec<String>,

    /// 从文件读取批次文本（逗号或换行分隔）；`-` 表示标准输入
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// 输出容器（覆盖配置文件）
    #[arg(long, value_enum)]
    format: Option<VideoFormat>,

    /// 画质（覆盖配置文件）
    #[arg(long, value_enum)]
    quality: Option<Quality>,

    /// 下载全部语言字幕
    #[arg(long, default_value_t = false)]
    subs: bool,

    /// 仅下载音频（mp3）
    #[arg(long, default_value_t = false)]
    audio_only: bool,

    /// 播放列表链接只下载单个视频
    #[arg(long, default_value_t = false)]
    no_playlist: bool,

    /// 保存目录（覆盖配置文件）
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// yt-dlp 可执行文件路径（覆盖配置文件与自动查找）
    #[arg(long)]
    ytdlp: Option<PathBuf>,

    /// 以 JSON 行输出事件，便于其他程序读取
    #[arg(long, default_value_t = false)]
    json: bool,

    /// 检测 yt-dlp 与 ffmpeg 是否可用后退出
    #[arg(long, default_value_t = false)]
    check_tools: bool,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.version {
        println!("video-batch-dl v{VERSION}");
        return Ok(ExitCode::SUCCESS);
    }

    let data_dir = cli.data_dir.as_deref();
    let _log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let config = load_or_create_with_base::<Config>(data_dir).context("load config.yml")?;

    if cli.check_tools {
        return Ok(check_tools(&cli, &config));
    }

    let parsed = parse_batch(&read_batch_text(&cli)?);
    if parsed.is_empty() {
        return Err(DownloadError::EmptyInput.into());
    }

    let options = apply_overrides(&cli, config.download_options());
    let tool = resolve_tool(ToolKind::YtDlp, ytdlp_override(&cli, &config));
    let status = probe_tool(&tool, config.probe_timeout())
        .map_err(|err| DownloadError::ToolUnavailable(err.to_string()))?;

    let mut plan = prepare_batch(parsed, &options, &status.program)?;
    plan.cleanup_partial_files = config.cleanup_partial_files;

    let (runner, events) = JobRunner::with_channel();
    let runner = Arc::new(runner);
    {
        let runner = Arc::clone(&runner);
        ctrlc::set_handler(move || runner.stop()).context("install Ctrl-C handler")?;
    }

    runner.start(plan)?;
    let mode = if cli.json {
        RenderMode::Json
    } else {
        RenderMode::Human
    };
    let summary = render_events(&events, mode)?;
    runner.wait();

    info!(
        target: "startup",
        succeeded = summary.succeeded,
        failed = summary.failed,
        outcome = ?summary.outcome,
        "批次结束"
    );
    Ok(if summary.had_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: true,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}

fn ytdlp_override<'a>(cli: &'a Cli, config: &'a Config) -> Option<&'a Path> {
    cli.ytdlp.as_deref().or_else(|| config.ytdlp_override())
}

fn apply_overrides(cli: &Cli, mut options: DownloadOptions) -> DownloadOptions {
    if let Some(format) = cli.format {
        options.format = format;
    }
    if let Some(quality) = cli.quality {
        options.quality = quality;
    }
    if let Some(dir) = &cli.output {
        options.output_dir = dir.clone();
    }
    options.subtitles |= cli.subs;
    options.audio_only |= cli.audio_only;
    options.no_playlist |= cli.no_playlist;
    options
}

/// Positional URLs, then the `--input` file; stdin when neither is given or the file is `-`.
fn read_batch_text(cli: &Cli) -> Result<String> {
    let mut parts = Vec::new();
    if !cli.urls.is_empty() {
        parts.push(cli.urls.join(","));
    }
    match cli.input.as_deref() {
        Some(path) if path == Path::new("-") => parts.push(read_stdin()?),
        Some(path) => parts.push(
            fs::read_to_string(path)
                .with_context(|| format!("read input file {}", path.display()))?,
        ),
        None if parts.is_empty() => parts.push(read_stdin()?),
        None => {}
    }
    Ok(parts.join("\n"))
}

fn read_stdin() -> Result<String> {
    io::read_to_string(io::stdin()).context("read batch from stdin")
}

fn check_tools(cli: &Cli, config: &Config) -> ExitCode {
    let timeout = config.probe_timeout();
    let ytdlp = resolve_tool(ToolKind::YtDlp, ytdlp_override(cli, config));
    let ffmpeg = resolve_tool(ToolKind::Ffmpeg, config.ffmpeg_override());

    let ytdlp_ok = report_tool(&ytdlp, probe_tool(&ytdlp, timeout).map_err(|e| e.to_string()));
    // ffmpeg is only called by yt-dlp itself; a missing one is a warning.
    if !report_tool(&ffmpeg, probe_tool(&ffmpeg, timeout).map_err(|e| e.to_string())) {
        warn!(target: "tools", "未检测到 ffmpeg，转码与音频提取可能失败");
    }

    if ytdlp_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn report_tool(tool: &ResolvedTool, probe: Result<ToolStatus, String>) -> bool {
    let name = tool.kind.command_name();
    match probe {
        Ok(status) => {
            println!(
                "✓ {name} {} ({}, {:?})",
                status.version,
                status.program.display(),
                status.source
            );
            true
        }
        Err(err) => {
            println!("✗ {name}: {err}");
            false
        }
    }
}
