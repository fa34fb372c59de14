//! 外部工具（yt-dlp / ffmpeg）定位与可用性探测。
//!
//! 查找顺序：配置覆盖路径 → 程序同目录的打包版本 → 项目目录 `modules/` → 系统 PATH → 裸命令名。
//! 探测结果以 `ToolStatus` 显式返回，由调用方传入下载核心，不保存为全局状态。

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::process::piped_command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// The video download tool.
    YtDlp,
    /// The media transcoder the download tool calls for recode/extract steps.
    Ffmpeg,
}

impl ToolKind {
    pub fn command_name(self) -> &'static str {
        match self {
            ToolKind::YtDlp => "yt-dlp",
            ToolKind::Ffmpeg => "ffmpeg",
        }
    }

    pub fn file_name(self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.command_name())
        } else {
            self.command_name().to_string()
        }
    }

    fn version_arg(self) -> &'static str {
        match self {
            ToolKind::YtDlp => "--version",
            ToolKind::Ffmpeg => "-version",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    Override,
    Bundled,
    Project,
    SystemPath,
    /// Nothing found; the bare name is left for process launch to resolve (or fail).
    BareName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTool {
    pub kind: ToolKind,
    pub program: PathBuf,
    pub source: ToolSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub kind: ToolKind,
    pub program: PathBuf,
    pub source: ToolSource,
    pub version: String,
}

#[derive(Debug, Error)]
pub enum ToolProbeError {
    #[error("{program} could not be launched: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} did not answer within {secs}s")]
    Timeout { program: String, secs: u64 },
    #[error("{program} exited with {code:?} while reporting its version")]
    Failed { program: String, code: Option<i32> },
}

/// Directories searched before PATH.
#[derive(Debug, Clone, Default)]
pub struct SearchDirs {
    /// Directory of the running executable (bundled tools live next to it).
    pub exe_dir: Option<PathBuf>,
    /// Project root holding `modules/Scripts` or `modules/bin`.
    pub project_dir: Option<PathBuf>,
}

impl SearchDirs {
    pub fn from_env() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        let project_dir = std::env::current_dir().ok();
        Self {
            exe_dir,
            project_dir,
        }
    }
}

pub fn resolve_tool(kind: ToolKind, override_path: Option<&Path>) -> ResolvedTool {
    resolve_tool_in(kind, override_path, &SearchDirs::from_env())
}

pub fn resolve_tool_in(
    kind: ToolKind,
    override_path: Option<&Path>,
    dirs: &SearchDirs,
) -> ResolvedTool {
    let found = |program: PathBuf, source: ToolSource| ResolvedTool {
        kind,
        program,
        source,
    };

    if let Some(path) = override_path.filter(|p| !p.as_os_str().is_empty()) {
        return found(path.to_path_buf(), ToolSource::Override);
    }

    let file_name = kind.file_name();
    if let Some(dir) = dirs.exe_dir.as_deref() {
        let candidate = dir.join(&file_name);
        if candidate.is_file() {
            return found(candidate, ToolSource::Bundled);
        }
    }

    if let Some(root) = dirs.project_dir.as_deref() {
        for sub in ["Scripts", "bin"] {
            let candidate = root.join("modules").join(sub).join(&file_name);
            if candidate.is_file() {
                return found(candidate, ToolSource::Project);
            }
        }
    }

    if let Ok(path) = which::which(kind.command_name()) {
        return found(path, ToolSource::SystemPath);
    }

    debug!(target: "tools", tool = kind.command_name(), "未找到可执行文件，回退到命令名");
    found(PathBuf::from(kind.command_name()), ToolSource::BareName)
}

/// Runs the tool's version command; the first non-empty stdout line is its version.
pub fn probe_tool(tool: &ResolvedTool, timeout: Duration) -> Result<ToolStatus, ToolProbeError> {
    let program = tool.program.to_string_lossy().into_owned();
    let mut child = piped_command(&tool.program, [tool.kind.version_arg()])
        .spawn()
        .map_err(|source| ToolProbeError::Launch {
            program: program.clone(),
            source,
        })?;

    // Drain both pipes while polling; a chatty tool would otherwise block on a full pipe.
    let (out_tx, out_rx) = channel::bounded::<Vec<u8>>(1);
    let stdout = child.stdout.take();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout {
            let _ = out.read_to_end(&mut buf);
        }
        let _ = out_tx.send(buf);
    });
    if let Some(mut err) = child.stderr.take() {
        thread::spawn(move || {
            let _ = io::copy(&mut err, &mut io::sink());
        });
    }

    let deadline = Instant::now() + timeout;
    let timed_out = |program: String| ToolProbeError::Timeout {
        program,
        secs: timeout.as_secs(),
    };
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(timed_out(program));
            }
            Ok(None) => thread::sleep(Duration::from_millis(50)),
            Err(source) => return Err(ToolProbeError::Launch { program, source }),
        }
    };
    if !status.success() {
        return Err(ToolProbeError::Failed {
            program,
            code: status.code(),
        });
    }

    // A leftover grandchild may still hold stdout open.
    let remaining = deadline
        .saturating_duration_since(Instant::now())
        .max(Duration::from_millis(200));
    let stdout = match out_rx.recv_timeout(remaining) {
        Ok(bytes) => bytes,
        Err(_) => return Err(timed_out(program)),
    };

    let text = String::from_utf8_lossy(&stdout);
    let version = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown")
        .to_string();

    info!(target: "tools", tool = tool.kind.command_name(), %version, path = %program, "工具可用");
    Ok(ToolStatus {
        kind: tool.kind,
        program: tool.program.clone(),
        source: tool.source,
        version,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn override_wins_even_if_missing() {
        let dirs = SearchDirs::default();
        let tool = resolve_tool_in(ToolKind::YtDlp, Some(Path::new("/custom/yt")), &dirs);
        assert_eq!(tool.source, ToolSource::Override);
        assert_eq!(tool.program, PathBuf::from("/custom/yt"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let exe_dir = tempfile::tempdir().expect("tempdir");
        let bundled = exe_dir.path().join(ToolKind::YtDlp.file_name());
        fs::write(&bundled, b"").expect("write");
        let dirs = SearchDirs {
            exe_dir: Some(exe_dir.path().to_path_buf()),
            project_dir: None,
        };
        let tool = resolve_tool_in(ToolKind::YtDlp, Some(Path::new("")), &dirs);
        assert_eq!(tool.source, ToolSource::Bundled);
        assert_eq!(tool.program, bundled);
    }

    #[test]
    fn bundled_before_project() {
        let exe_dir = tempfile::tempdir().expect("tempdir");
        let project = tempfile::tempdir().expect("tempdir");
        let name = ToolKind::Ffmpeg.file_name();
        let scripts = project.path().join("modules").join("Scripts");
        fs::create_dir_all(&scripts).expect("mkdir");
        fs::write(scripts.join(&name), b"").expect("write");

        let mut dirs = SearchDirs {
            exe_dir: Some(exe_dir.path().to_path_buf()),
            project_dir: Some(project.path().to_path_buf()),
        };
        let tool = resolve_tool_in(ToolKind::Ffmpeg, None, &dirs);
        assert_eq!(tool.source, ToolSource::Project);
        assert_eq!(tool.program, scripts.join(&name));

        fs::write(exe_dir.path().join(&name), b"").expect("write");
        let tool = resolve_tool_in(ToolKind::Ffmpeg, None, &dirs);
        assert_eq!(tool.source, ToolSource::Bundled);

        dirs.exe_dir = None;
        let tool = resolve_tool_in(ToolKind::Ffmpeg, None, &dirs);
        assert_eq!(tool.source, ToolSource::Project);
    }

    #[test]
    fn probe_reports_launch_failure() {
        let tool = ResolvedTool {
            kind: ToolKind::YtDlp,
            program: PathBuf::from("/definitely/not/here/yt-dlp"),
            source: ToolSource::Override,
        };
        let err = probe_tool(&tool, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ToolProbeError::Launch { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn probe_reads_first_line_as_version() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("fake-yt-dlp");
        fs::write(&script, "#!/bin/sh\necho\necho 2024.08.06\necho extra\n").expect("write");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");

        let tool = ResolvedTool {
            kind: ToolKind::YtDlp,
            program: script.clone(),
            source: ToolSource::Override,
        };
        let status = probe_tool(&tool, Duration::from_secs(10)).expect("probe");
        assert_eq!(status.version, "2024.08.06");
        assert_eq!(status.program, script);
    }

    #[cfg(unix)]
    #[test]
    fn probe_survives_output_larger_than_a_pipe_buffer() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("chatty");
        fs::write(
            &script,
            "#!/bin/sh\necho 2025.01.01\nhead -c 300000 /dev/zero | tr '\\0' x\nhead -c 300000 /dev/zero >&2\necho\n",
        )
        .expect("write");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");

        let tool = ResolvedTool {
            kind: ToolKind::YtDlp,
            program: script,
            source: ToolSource::Override,
        };
        let begun = Instant::now();
        let status = probe_tool(&tool, Duration::from_secs(5)).expect("probe");
        assert_eq!(status.version, "2025.01.01");
        assert!(begun.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn probe_times_out_on_hung_tool() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("hung");
        fs::write(&script, "#!/bin/sh\nexec sleep 30\n").expect("write");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");

        let tool = ResolvedTool {
            kind: ToolKind::YtDlp,
            program: script,
            source: ToolSource::Override,
        };
        let err = probe_tool(&tool, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, ToolProbeError::Timeout { .. }));
    }
}
