//! 批量输入解析：把用户粘贴的文本拆成 (URL, referer) 列表。
//!
//! 分隔符为逗号或换行；每个片段可选地在冒号后携带 referer，
//! URL 本身含冒号，因此拆分规则较为特殊，见 `parse_token`。

use tracing::info;

use super::models::DownloadRequest;

const VIMEO_EMBED: &str = "player.vimeo.com/video/";
const PROTOCOL_PREFIX_LEN: usize = 8; // len("https://")

/// Parser output: requests in input order plus informational notes for the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBatch {
    pub requests: Vec<DownloadRequest>,
    pub notes: Vec<String>,
}

impl ParsedBatch {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

pub fn parse_batch(raw: &str) -> ParsedBatch {
    let mut out = ParsedBatch::default();
    let normalized = raw.replace("\r\n", "\n").replace('\n', ",");

    for token in normalized.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let request = parse_token(token);
        if let Some(note) = vimeo_note(&request) {
            info!(target: "input", url = %request.url, "{note}");
            out.notes.push(note);
        }
        out.requests.push(request);
    }
    out
}

/// Splits one token into URL and referer.
///
/// - more than two colons and `:http` after the leading `https://`: split at the
///   last `:http` (when it sits past position 8);
/// - exactly one colon and no `http://`/`https://` prefix: split at that colon;
/// - otherwise the whole token is the URL.
pub fn parse_token(token: &str) -> DownloadRequest {
    let token = token.trim();
    let colons = token.matches(':').count();

    if colons > 2 {
        let tail = token.as_bytes().get(PROTOCOL_PREFIX_LEN..).unwrap_or_default();
        if contains(tail, b":http") {
            if let Some(pos) = token.rfind(":http") {
                if pos > PROTOCOL_PREFIX_LEN {
                    let url = token[..pos].trim();
                    let referer = token[pos + 1..].trim();
                    return DownloadRequest::new(url, Some(referer.to_string()));
                }
            }
        }
    } else if colons == 1 && !token.starts_with("http://") && !token.starts_with("https://") {
        if let Some((url, referer)) = token.split_once(':') {
            return DownloadRequest::new(url.trim(), Some(referer.trim().to_string()));
        }
    }

    DownloadRequest::new(token, None)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn vimeo_note(request: &DownloadRequest) -> Option<String> {
    if request.url.contains(VIMEO_EMBED) {
        let referer = request.referer.as_deref().unwrap_or("(none)");
        return Some(format!(
            "Vimeo 嵌入视频: 使用 {} 作为下载地址, referer: {referer}",
            request.url
        ));
    }
    match request.referer.as_deref() {
        Some(referer) if request.url.contains("vimeo.com") && referer.contains("vimeo.com") => {
            Some(format!(
                "Vimeo 链接: 使用 {} 作为下载地址, referer 同为 Vimeo 页面: {referer}",
                request.url
            ))
        }
        _ => None,
    }
}
