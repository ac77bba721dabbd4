//! Inbound attachment download into the local media cache.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::QqError;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// Message ids are long; only a prefix goes into the file name.
const MESSAGE_ID_PREFIX_CHARS: usize = 16;

/// Build the HTTP client used for attachment downloads.
pub fn download_client() -> Result<reqwest::Client, QqError> {
    Ok(reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?)
}

/// Target file name: `qq_<message id prefix>_<index><ext>`.
///
/// The extension comes from the attachment's filename; `.bin` when it has none.
pub fn cache_file_name(message_id: &str, index: usize, filename_hint: Option<&str>) -> String {
    let ext = filename_hint
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .and_then(|f| Path::new(f).extension())
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_else(|| ".bin".to_string());

    let mid: String = if message_id.is_empty() {
        "msg".to_string()
    } else {
        message_id.chars().take(MESSAGE_ID_PREFIX_CHARS).collect()
    };
    let mid = sanitize(&mid);

    format!("qq_{mid}_{index}{ext}")
}

/// Keep file names portable: anything outside `[A-Za-z0-9._-]` becomes `_`.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

/// Download `url` into `media_dir` and return the local path.
///
/// Not retried. Returns `None` on any failure (non-success status, body over
/// `max_bytes`, network or filesystem error); the reason is logged and no
/// file is left behind.
pub async fn download_attachment(
    client: &reqwest::Client,
    media_dir: &Path,
    url: &str,
    filename_hint: Option<&str>,
    message_id: &str,
    index: usize,
    max_bytes: u64,
) -> Option<PathBuf> {
    let path = media_dir.join(cache_file_name(message_id, index, filename_hint));
    match fetch_to(client, url, &path, max_bytes).await {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(url, error = %e, "QQ: attachment download failed");
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "QQ: could not remove partial download");
                }
            }
            None
        }
    }
}

async fn fetch_to(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
    max_bytes: u64,
) -> Result<(), QqError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let mut resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(QqError::Api {
            status: status.as_u16(),
            message: format!("attachment fetch returned {status}"),
        });
    }

    // Size guard: the declared length first, then what actually arrives.
    if let Some(size) = resp.content_length() {
        if size > max_bytes {
            return Err(QqError::TooLarge { size, max: max_bytes });
        }
    }

    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = resp.chunk().await? {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(QqError::TooLarge {
                size: written,
                max: max_bytes,
            });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}
