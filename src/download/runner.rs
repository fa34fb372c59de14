//! 批次执行器：在后台线程中逐个运行下载作业。
//!
//! 作业严格串行；每个子进程的 stdout/stderr 按行读取并转成事件，
//! 事件经 crossbeam 通道按顺序送回调用方。`stop()` 会直接结束当前子进程，
//! 且不再启动后续作业。

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{self as channel, Receiver, Sender, select};
use tracing::{debug, info, warn};

use super::error::{DownloadError, JobError};
use super::models::{
    BatchOutcome, DownloadOptions, DownloadRequest, Job, JobOutcome, RunnerEvent,
};
use super::plan::{BatchPlan, prepare_batch};
use super::progress::ProgressAggregator;
use crate::base_system::file_cleaner::remove_partial_downloads;
use crate::base_system::process::merged_output_command;
use crate::base_system::tool_paths::ToolStatus;
use crate::download::input_parser::ParsedBatch;

/// Shared between the caller's thread and the batch worker.
struct BatchControl {
    cancel: AtomicBool,
    running: AtomicBool,
    active: Mutex<Option<Child>>,
    wake_tx: Sender<()>,
}

impl BatchControl {
    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn active(&self) -> MutexGuard<'_, Option<Child>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct JobRunner {
    events: Sender<RunnerEvent>,
    current: Mutex<Option<Arc<BatchControl>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobRunner {
    pub fn new(events: Sender<RunnerEvent>) -> Self {
        Self {
            events,
            current: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Runner plus an unbounded receiver for its events.
    pub fn with_channel() -> (Self, Receiver<RunnerEvent>) {
        let (tx, rx) = channel::unbounded();
        (Self::new(tx), rx)
    }

    pub fn is_running(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Builds the batch from parsed requests and starts it.
    pub fn start_requests(
        &self,
        requests: Vec<DownloadRequest>,
        options: &DownloadOptions,
        tool: &ToolStatus,
    ) -> Result<(), DownloadError> {
        let parsed = ParsedBatch {
            requests,
            notes: Vec::new(),
        };
        let plan = prepare_batch(parsed, options, &tool.program)?;
        self.start(plan)
    }

    /// Starts executing `plan` on a background thread and returns immediately.
    pub fn start(&self, plan: BatchPlan) -> Result<(), DownloadError> {
        if plan.is_empty() {
            return Err(DownloadError::EmptyInput);
        }

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .map(|c| c.running.load(Ordering::SeqCst))
            .unwrap_or(false)
        {
            return Err(DownloadError::AlreadyRunning);
        }

        // The previous worker has already cleared `running`; reap it.
        if let Some(handle) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = handle.join();
        }

        let (wake_tx, wake_rx) = channel::bounded(1);
        let control = Arc::new(BatchControl {
            cancel: AtomicBool::new(false),
            running: AtomicBool::new(true),
            active: Mutex::new(None),
            wake_tx,
        });

        let events = self.events.clone();
        let ctrl = Arc::clone(&control);
        let handle = thread::Builder::new()
            .name("batch-runner".to_string())
            .spawn(move || run_batch(plan, &ctrl, &events, &wake_rx))
            .map_err(DownloadError::Spawn)?;

        *current = Some(control);
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Kills the running tool and prevents further jobs. No-op when idle.
    pub fn stop(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(ctrl) = current.as_ref() else {
            return;
        };
        if !ctrl.running.load(Ordering::SeqCst) {
            return;
        }
        if ctrl.cancel.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(target: "runner", "收到停止请求");
        if let Some(child) = ctrl.active().as_mut() {
            if let Err(err) = child.kill() {
                debug!(target: "runner", "结束子进程失败（可能已退出）: {err}");
            }
        }
        let _ = ctrl.wake_tx.try_send(());
    }

    /// Blocks until the current batch worker exits.
    pub fn wait(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

enum JobEnd {
    Exited(Option<i32>),
    LaunchFailed(std::io::Error),
    Broken(std::io::Error),
    /// `stop()` landed while the job was running; the child has been killed and reaped.
    Cancelled,
}

fn emit(events: &Sender<RunnerEvent>, event: RunnerEvent) {
    // A caller that dropped its receiver just stops listening.
    let _ = events.send(event);
}

fn run_batch(
    plan: BatchPlan,
    ctrl: &BatchControl,
    events: &Sender<RunnerEvent>,
    wake_rx: &Receiver<()>,
) {
    let total = plan.len();
    let mut progress = ProgressAggregator::new(total);
    let mut outcome = BatchOutcome::Completed;

    info!(target: "runner", jobs = total, "开始执行批次");
    for note in &plan.notes {
        emit(events, RunnerEvent::Log(note.clone()));
    }
    emit(events, RunnerEvent::Log(format!("开始下载 {total} 个视频")));

    for job in &plan.jobs {
        if ctrl.is_cancelled() {
            outcome = BatchOutcome::Stopped;
            break;
        }

        emit(
            events,
            RunnerEvent::JobStarted {
                index: job.index,
                total: job.total,
            },
        );
        emit(events, RunnerEvent::Log(format!("执行: {}", job.argv.join(" "))));

        match execute_job(job, ctrl, events, &mut progress, wake_rx) {
            JobEnd::Cancelled => {
                outcome = BatchOutcome::Stopped;
                break;
            }
            JobEnd::LaunchFailed(err) => {
                warn!(target: "runner", program = job.program(), "无法启动下载工具: {err}");
                emit(
                    events,
                    RunnerEvent::Error(JobError::ToolNotFound {
                        program: job.program().to_string(),
                        message: err.to_string(),
                    }),
                );
                outcome = BatchOutcome::Aborted;
                break;
            }
            JobEnd::Exited(code) => {
                let succeeded = code == Some(0);
                if succeeded {
                    info!(target: "runner", job = job.number(), "视频下载完成");
                    emit(
                        events,
                        RunnerEvent::Log(format!("✓ 第 {} 个视频下载完成", job.number())),
                    );
                } else {
                    warn!(target: "runner", job = job.number(), ?code, "视频下载失败");
                    emit(
                        events,
                        RunnerEvent::Error(JobError::JobExecutionFailed {
                            index: job.index,
                            code,
                        }),
                    );
                    if plan.cleanup_partial_files {
                        clean_partials(&plan.output_dir, events);
                    }
                }
                emit(
                    events,
                    RunnerEvent::JobFinished(JobOutcome {
                        index: job.index,
                        exit_code: code,
                        succeeded,
                    }),
                );
            }
            JobEnd::Broken(err) => {
                warn!(target: "runner", job = job.number(), "作业执行异常: {err}");
                report_unexpected(events, job, err.to_string());
            }
        }

        if let Some(pct) = progress.complete_job(job.index) {
            emit(events, RunnerEvent::Progress(pct));
        }
    }

    ctrl.running.store(false, Ordering::SeqCst);
    info!(target: "runner", ?outcome, "批次结束");
    emit(events, RunnerEvent::Finished(outcome));
}

fn report_unexpected(events: &Sender<RunnerEvent>, job: &Job, message: String) {
    emit(
        events,
        RunnerEvent::Error(JobError::Unexpected {
            index: job.index,
            message,
        }),
    );
    emit(
        events,
        RunnerEvent::JobFinished(JobOutcome {
            index: job.index,
            exit_code: None,
            succeeded: false,
        }),
    );
}

fn clean_partials(dir: &Path, events: &Sender<RunnerEvent>) {
    match remove_partial_downloads(dir) {
        Ok(removed) => {
            for path in removed {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                emit(events, RunnerEvent::Log(format!("已删除临时文件: {name}")));
            }
        }
        Err(err) => debug!(target: "runner", dir = %dir.display(), "清理临时文件失败: {err}"),
    }
}

fn execute_job(
    job: &Job,
    ctrl: &BatchControl,
    events: &Sender<RunnerEvent>,
    progress: &mut ProgressAggregator,
    wake_rx: &Receiver<()>,
) -> JobEnd {
    let (mut command, output) = match merged_output_command(job.program(), job.args()) {
        Ok(pair) => pair,
        Err(err) => return JobEnd::Broken(err),
    };
    let spawned = command.spawn();
    // The command still owns the write ends of the pipe; EOF needs them closed.
    drop(command);
    let child = match spawned {
        Ok(child) => child,
        Err(err) => return JobEnd::LaunchFailed(err),
    };
    debug!(target: "runner", job = job.number(), pid = child.id(), "子进程已启动");

    // At most one line in flight between the reader and this thread.
    let (line_tx, line_rx) = channel::bounded::<String>(1);
    spawn_line_reader(output, line_tx);

    {
        let mut active = ctrl.active();
        *active = Some(child);
        if ctrl.is_cancelled() {
            if let Some(child) = active.as_mut() {
                let _ = child.kill();
            }
        }
    }

    loop {
        select! {
            recv(line_rx) -> msg => match msg {
                Ok(line) => {
                    let pct = progress.observe_line(job.index, &line);
                    emit(events, RunnerEvent::Log(line));
                    if let Some(pct) = pct {
                        emit(events, RunnerEvent::Progress(pct));
                    }
                }
                Err(_) => break,
            },
            recv(wake_rx) -> _wake => break,
        }
    }

    // Only the worker takes the child out, so it is always present here.
    let Some(mut child) = ctrl.active().take() else {
        return JobEnd::Cancelled;
    };
    if ctrl.is_cancelled() {
        let _ = child.kill();
        let _ = child.wait();
        return JobEnd::Cancelled;
    }
    match child.wait() {
        Ok(status) => JobEnd::Exited(status.code()),
        Err(err) => JobEnd::Broken(err),
    }
}

/// Forwards output as soon as a segment ends at `\n` or `\r`.
///
/// Progress redraws end in a bare `\r`, so they are delivered while the tool is
/// still running. Segments are decoded lossily and trimmed; blank ones are skipped.
fn spawn_line_reader<R: Read + Send + 'static>(reader: R, tx: Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut pending = Vec::new();
        loop {
            let chunk = match reader.fill_buf() {
                Ok([]) => break,
                Ok(chunk) => chunk,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            };
            let (used, complete) = match chunk.iter().position(|&b| matches!(b, b'\n' | b'\r')) {
                Some(pos) => {
                    pending.extend_from_slice(&chunk[..pos]);
                    (pos + 1, true)
                }
                None => {
                    pending.extend_from_slice(chunk);
                    (chunk.len(), false)
                }
            };
            reader.consume(used);
            if complete && !forward_segment(&tx, &mut pending) {
                return;
            }
        }
        forward_segment(&tx, &mut pending);
    });
}

/// Sends the buffered segment and clears it; false once the receiver is gone.
fn forward_segment(tx: &Sender<String>, pending: &mut Vec<u8>) -> bool {
    let delivered = {
        let text = String::from_utf8_lossy(pending);
        let line = text.trim();
        line.is_empty() || tx.send(line.to_string()).is_ok()
    };
    pending.clear();
    delivered
}
