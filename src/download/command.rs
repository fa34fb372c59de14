//! 下载工具命令行构建。
//!
//! 参数顺序固定，相同的 (请求, 选项) 必然得到逐字节相同的 argv。

use std::path::Path;

use super::models::{DownloadOptions, DownloadRequest, VideoFormat};

/// Filename template handed to the tool; title and extension only.
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

const ROBUSTNESS_FLAGS: [&str; 11] = [
    "--no-warnings",
    "--no-check-certificates",
    "--restrict-filenames",
    "--windows-filenames",
    "--fragment-retries",
    "5",
    "--retries",
    "3",
    "--file-access-retries",
    "5",
    "--no-continue",
];

pub fn build_argv(tool: &Path, request: &DownloadRequest, options: &DownloadOptions) -> Vec<String> {
    let mut argv: Vec<String> = vec![
        tool.to_string_lossy().into_owned(),
        request.url.clone(),
    ];

    if options.audio_only {
        push_all(
            &mut argv,
            &["-f", "bestaudio/best", "--extract-audio", "--audio-format", "mp3"],
        );
    } else {
        push_all(&mut argv, &["-f", options.quality.as_str()]);
        if options.format != VideoFormat::Best {
            push_all(&mut argv, &["--recode-video", options.format.as_str()]);
        }
    }

    if options.subtitles {
        push_all(&mut argv, &["--write-subs", "--sub-lang", "all"]);
    }

    if let Some(referer) = request.referer.as_deref() {
        push_all(&mut argv, &["--referer", referer]);
    }

    let output = options.output_dir.join(OUTPUT_TEMPLATE);
    argv.push("-o".to_string());
    argv.push(output.to_string_lossy().into_owned());

    push_all(&mut argv, &ROBUSTNESS_FLAGS);

    if options.no_playlist {
        argv.push("--no-playlist".to_string());
    }

    argv
}

fn push_all(argv: &mut Vec<String>, items: &[&str]) {
    argv.extend(items.iter().map(|s| s.to_string()));
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::download::models::Quality;

    fn options() -> DownloadOptions {
        DownloadOptions {
            output_dir: PathBuf::from("out"),
            ..DownloadOptions::default()
        }
    }

    fn args(argv: &[String]) -> Vec<&str> {
        argv.iter().map(String::as_str).collect()
    }

    fn tail_flags() -> Vec<&'static str> {
        vec![
            "--no-warnings",
            "--no-check-certificates",
            "--restrict-filenames",
            "--windows-filenames",
            "--fragment-retries",
            "5",
            "--retries",
            "3",
            "--file-access-retries",
            "5",
            "--no-continue",
        ]
    }

    #[test]
    fn default_options_build_full_command() {
        let req = DownloadRequest::new("https://a.com/v", None);
        let argv = build_argv(Path::new("yt-dlp"), &req, &options());
        let out = PathBuf::from("out")
            .join(OUTPUT_TEMPLATE)
            .to_string_lossy()
            .into_owned();

        let mut expected = vec![
            "yt-dlp",
            "https://a.com/v",
            "-f",
            "best",
            "--recode-video",
            "mp4",
            "-o",
            out.as_str(),
        ];
        expected.extend(tail_flags());
        assert_eq!(args(&argv), expected);
    }

    #[test]
    fn audio_only_ignores_format_and_quality() {
        let req = DownloadRequest::new("https://a.com/v", None);
        for (format, quality) in [
            (VideoFormat::Mkv, Quality::P720),
            (VideoFormat::Best, Quality::Worst),
            (VideoFormat::Avi, Quality::BestVideoBestAudio),
        ] {
            let opts = DownloadOptions {
                format,
                quality,
                audio_only: true,
                ..options()
            };
            let argv = build_argv(Path::new("yt-dlp"), &req, &opts);
            assert_eq!(
                &args(&argv)[2..7],
                ["-f", "bestaudio/best", "--extract-audio", "--audio-format", "mp3"]
            );
            assert!(!argv.iter().any(|a| a == "--recode-video"));
            assert!(!argv.iter().any(|a| a == quality.as_str()));
        }
    }

    #[test]
    fn best_format_skips_recode() {
        let req = DownloadRequest::new("https://a.com/v", None);
        let opts = DownloadOptions {
            format: VideoFormat::Best,
            quality: Quality::P480,
            ..options()
        };
        let argv = build_argv(Path::new("yt-dlp"), &req, &opts);
        assert_eq!(&args(&argv)[2..5], ["-f", "480p", "-o"]);
    }

    #[test]
    fn subtitles_referer_and_playlist_flags_in_order() {
        let req = DownloadRequest::new("https://a.com/v", Some("https://ref.com".into()));
        let opts = DownloadOptions {
            subtitles: true,
            no_playlist: true,
            format: VideoFormat::Webm,
            ..options()
        };
        let argv = build_argv(Path::new("/opt/yt-dlp"), &req, &opts);
        let out = PathBuf::from("out")
            .join(OUTPUT_TEMPLATE)
            .to_string_lossy()
            .into_owned();
        let a = args(&argv);
        assert_eq!(a[0], "/opt/yt-dlp");
        assert_eq!(
            &a[2..13],
            [
                "-f",
                "best",
                "--recode-video",
                "webm",
                "--write-subs",
                "--sub-lang",
                "all",
                "--referer",
                "https://ref.com",
                "-o",
                out.as_str(),
            ]
        );
        assert_eq!(&a[13..24], tail_flags().as_slice());
        assert_eq!(a.last().copied(), Some("--no-playlist"));
        assert_eq!(a.len(), 25);
    }

    #[test]
    fn same_input_gives_same_argv() {
        let req = DownloadRequest::new("https://a.com/v", Some("https://r.com".into()));
        let opts = DownloadOptions {
            subtitles: true,
            ..options()
        };
        let first = build_argv(Path::new("yt-dlp"), &req, &opts);
        let second = build_argv(Path::new("yt-dlp"), &req, &opts);
        assert_eq!(first, second);
    }
}
