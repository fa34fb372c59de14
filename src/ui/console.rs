//! 终端事件渲染：进度条 + 日志行，或逐行 JSON 输出。

use std::io::{self, Write};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::download::models::{BatchOutcome, RunnerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Progress bar on stderr, tool output and status lines on stdout.
    Human,
    /// One serialized event per stdout line.
    Json,
}

/// What the caller needs after the batch: how it ended and whether anything failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: Option<BatchOutcome>,
    pub errors: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, event: &RunnerEvent) {
        match event {
            RunnerEvent::Error(_) => self.errors += 1,
            RunnerEvent::JobFinished(outcome) if outcome.succeeded => self.succeeded += 1,
            RunnerEvent::JobFinished(_) => self.failed += 1,
            RunnerEvent::Finished(outcome) => self.outcome = Some(*outcome),
            _ => {}
        }
    }

    pub fn had_errors(&self) -> bool {
        self.errors > 0 || self.outcome != Some(BatchOutcome::Completed)
    }
}

/// Renders events until the terminal `Finished` event (or until the runner goes away).
pub fn render_events(events: &Receiver<RunnerEvent>, mode: RenderMode) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    let bar = match mode {
        RenderMode::Human => Some(batch_bar()),
        RenderMode::Json => None,
    };

    for event in events.iter() {
        summary.record(&event);
        match &bar {
            Some(bar) => render_human(bar, &event),
            None => render_json(&event)?,
        }
        if matches!(event, RunnerEvent::Finished(_)) {
            break;
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
        print_summary(&summary);
    }
    Ok(summary)
}

fn batch_bar() -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template("{msg} [{elapsed_precise}] {wide_bar} {pos}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    bar.set_style(style);
    bar.set_message("准备中");
    bar
}

fn render_human(bar: &ProgressBar, event: &RunnerEvent) {
    match event {
        RunnerEvent::JobStarted { index, total } => {
            let status = format!("正在下载第 {}/{} 个视频", index + 1, total);
            bar.suspend(|| println!("{status}"));
            bar.set_message(status);
        }
        RunnerEvent::Log(line) => bar.suspend(|| println!("{line}")),
        RunnerEvent::Progress(pct) => bar.set_position(u64::from(*pct)),
        RunnerEvent::Error(err) => bar.suspend(|| eprintln!("✗ {err}")),
        RunnerEvent::JobFinished(_) => {}
        RunnerEvent::Finished(outcome) => {
            let text = match outcome {
                BatchOutcome::Completed => "全部作业已处理",
                BatchOutcome::Stopped => "下载已停止",
                BatchOutcome::Aborted => "下载工具不可用，批次已中止",
            };
            bar.set_message(text);
        }
    }
}

fn render_json(event: &RunnerEvent) -> Result<()> {
    let line = serde_json::to_string(event).context("serialize runner event")?;
    let mut out = io::stdout().lock();
    writeln!(out, "{line}").context("write event")?;
    out.flush().context("flush stdout")
}

fn print_summary(summary: &RunSummary) {
    let ending = match summary.outcome {
        Some(BatchOutcome::Completed) => "完成",
        Some(BatchOutcome::Stopped) => "已停止",
        Some(BatchOutcome::Aborted) => "已中止",
        None => "意外结束",
    };
    println!(
        "批次{ending}: 成功 {} 个, 失败 {} 个",
        summary.succeeded, summary.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::error::JobError;
    use crate::download::models::JobOutcome;

    fn finished(index: usize, succeeded: bool) -> RunnerEvent {
        RunnerEvent::JobFinished(JobOutcome {
            index,
            exit_code: Some(if succeeded { 0 } else { 1 }),
            succeeded,
        })
    }

    #[test]
    fn summary_counts_jobs_and_errors() {
        let mut summary = RunSummary::default();
        for event in [
            RunnerEvent::JobStarted { index: 0, total: 2 },
            RunnerEvent::Progress(50),
            finished(0, true),
            RunnerEvent::Error(JobError::JobExecutionFailed {
                index: 1,
                code: Some(1),
            }),
            finished(1, false),
            RunnerEvent::Finished(BatchOutcome::Completed),
        ] {
            summary.record(&event);
        }
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.outcome, Some(BatchOutcome::Completed));
        assert!(summary.had_errors());
    }

    #[test]
    fn clean_batch_has_no_errors() {
        let mut summary = RunSummary::default();
        summary.record(&finished(0, true));
        summary.record(&RunnerEvent::Finished(BatchOutcome::Completed));
        assert!(!summary.had_errors());
    }

    #[test]
    fn stopped_or_missing_outcome_counts_as_failure() {
        let mut summary = RunSummary::default();
        assert!(summary.had_errors());
        summary.record(&RunnerEvent::Finished(BatchOutcome::Stopped));
        assert!(summary.had_errors());
    }

    #[test]
    fn render_stops_at_finished() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(RunnerEvent::Progress(100)).expect("send");
        tx.send(RunnerEvent::Finished(BatchOutcome::Completed))
            .expect("send");
        tx.send(RunnerEvent::Log("after".into())).expect("send");

        let summary = render_events(&rx, RenderMode::Json).expect("render");
        assert_eq!(summary.outcome, Some(BatchOutcome::Completed));
        assert_eq!(rx.len(), 1);
    }
}
