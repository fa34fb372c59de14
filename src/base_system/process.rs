//! 子进程构建：后台运行外部工具时不弹出控制台窗口。

use std::ffi::OsStr;
use std::io::{self, PipeReader};
use std::process::{Command, Stdio};

/// A `Command` for `program` that never attaches a visible console window.
pub fn background_command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    configure_for_background(&mut cmd);
    cmd
}

/// Background command with stdin closed and stdout/stderr piped back to us.
pub fn piped_command<I, S>(program: impl AsRef<OsStr>, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = background_command(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Background command whose stdout and stderr share one pipe, so lines keep the
/// order the child wrote them in.
///
/// The returned `Command` owns the write ends; drop it after spawning or the
/// reader never sees EOF.
pub fn merged_output_command<I, S>(
    program: impl AsRef<OsStr>,
    args: I,
) -> io::Result<(Command, PipeReader)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let (reader, writer) = io::pipe()?;
    let mut cmd = background_command(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    Ok((cmd, reader))
}

#[cfg(windows)]
fn configure_for_background(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn configure_for_background(_cmd: &mut Command) {}
