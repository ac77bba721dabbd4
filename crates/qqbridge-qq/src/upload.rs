//! Local file → public URL via the operator's upload command.
//!
//! The platform cannot ingest local files, so a configured shell command is
//! asked to publish the file and print its URL.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

const PATH_PLACEHOLDER: &str = "{path}";

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("valid URL regex"))
}

/// Single-quote `s` for `sh`, escaping embedded single quotes.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Build the shell command line for `path`.
pub fn build_command_line(command: &str, path: &Path) -> String {
    let quoted = shell_quote(&path.to_string_lossy());
    if command.contains(PATH_PLACEHOLDER) {
        command.replace(PATH_PLACEHOLDER, &quoted)
    } else {
        format!("{command} {quoted}")
    }
}

/// First http(s) URL in `output`, if any.
pub fn extract_url(output: &str) -> Option<String> {
    url_regex().find(output).map(|m| m.as_str().to_string())
}

/// Run the upload command for `path` and return the URL it printed.
///
/// Returns `None` when the command cannot be spawned, exceeds `timeout`
/// (the child is killed) or prints no URL. Failures are logged, never raised.
pub async fn upload_to_public_url(command: &str, path: &Path, timeout: Duration) -> Option<String> {
    let command_line = build_command_line(command, path);
    debug!(command = %command_line, "QQ: running media upload command");

    let child = match Command::new("sh")
        .arg("-c")
        .arg(&command_line)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "QQ: media upload command failed to spawn");
            return None;
        }
    };

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(error = %e, "QQ: media upload command failed");
            return None;
        }
        Err(_elapsed) => {
            warn!(timeout_secs = timeout.as_secs(), "QQ: media upload command timed out");
            return None;
        }
    };

    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    match extract_url(&combined) {
        Some(url) => Some(url),
        None => {
            let preview: String = combined.chars().take(200).collect();
            warn!(
                exit = ?output.status.code(),
                output = %preview,
                "QQ: media upload command returned no URL"
            );
            None
        }
    }
}
