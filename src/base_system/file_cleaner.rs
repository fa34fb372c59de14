//! 下载失败后的临时文件清理。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Leftovers of an interrupted download tool run: `*.part`, `*.part-Frag*`, `*.ytdl`, `*.temp`.
pub fn is_partial_download(name: &str) -> bool {
    name.ends_with(".part")
        || name.contains(".part-Frag")
        || name.ends_with(".ytdl")
        || name.ends_with(".temp")
}

/// Removes partial download files directly inside `dir` and returns the removed paths.
///
/// Individual removal failures are skipped.
pub fn remove_partial_downloads(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in fs::read_dir(dir.as_ref())?.filter_map(|e| e.ok()) {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_partial_download(name) {
            continue;
        }
        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(err) => debug!(target: "cleanup", path = %path.display(), "跳过无法删除的临时文件: {err}"),
        }
    }
    removed.sort();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_tool_leftovers() {
        assert!(is_partial_download("video.mp4.part"));
        assert!(is_partial_download("video.mp4.part-Frag12"));
        assert!(is_partial_download("video.mp4.ytdl"));
        assert!(is_partial_download("video.temp"));
        assert!(!is_partial_download("video.mp4"));
        assert!(!is_partial_download("partial.txt"));
    }

    #[test]
    fn removes_only_partial_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["a.mp4", "a.mp4.part", "b.webm.part-Frag3", "c.ytdl", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").expect("write");
        }
        fs::create_dir(dir.path().join("sub.part")).expect("mkdir");

        let removed = remove_partial_downloads(dir.path()).expect("cleanup");
        let names: Vec<String> = removed
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        assert_eq!(names, ["a.mp4.part", "b.webm.part-Frag3", "c.ytdl"]);
        assert!(dir.path().join("a.mp4").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("sub.part").exists());
    }

    #[test]
    fn empty_dir_removes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(remove_partial_downloads(dir.path()).expect("cleanup").is_empty());
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(remove_partial_downloads(dir.path().join("gone")).is_err());
    }
}
