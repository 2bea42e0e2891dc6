//! Web-facing tool adapters: page fetch, file download, JSON POST

use serde_json::Value;
use tracing::{debug, info};

use crate::sandbox::capabilities::BROWSER_USER_AGENT;
use crate::tools::{ToolError, ToolRegistry};

impl ToolRegistry {
    /// Fetch a quiz page and return its HTML, truncated to the configured
    /// budget so a huge page cannot drown the conversation. Remembers the URL
    /// as the context for subsequent `run_code` calls.
    pub(crate) async fn get_rendered_html(&self, url: &str) -> Result<String, ToolError> {
        info!(url, "fetching page");
        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;

        self.set_current_url(url);
        debug!(url, bytes = body.len(), "page fetched");

        Ok(truncate_to(body, self.max_page_bytes))
    }

    /// Download a file under the configured files directory and report the
    /// filename the model should pass to `transcribe_audio`.
    pub(crate) async fn download_file(&self, url: &str) -> Result<String, ToolError> {
        info!(url, "downloading file");
        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        let filename = filename_from_url(url);
        tokio::fs::create_dir_all(&self.files_dir).await?;
        let path = self.files_dir.join(&filename);
        tokio::fs::write(&path, &bytes).await?;

        info!(url, filename = %filename, bytes = bytes.len(), "file saved");
        Ok(format!("Saved {} ({} bytes).", filename, bytes.len()))
    }

    /// POST a JSON payload and hand the raw server reply back to the model.
    pub(crate) async fn post_request(
        &self,
        url: &str,
        payload: &Value,
    ) -> Result<String, ToolError> {
        info!(url, "posting payload");
        let response = self
            .http
            .post(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(url, status = status.as_u16(), "server replied");

        Ok(format!("Server response (status {}):\n{}", status.as_u16(), body))
    }
}

/// Derive a local filename from the URL path, falling back to a generated
/// name when the path has no usable last segment.
fn filename_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let candidate = without_query.rsplit('/').next().unwrap_or("");
    if candidate.is_empty() || candidate.contains("..") {
        format!("download-{}", uuid::Uuid::now_v7())
    } else {
        candidate.to_string()
    }
}

/// Cut a string at the byte budget without splitting a UTF-8 character.
fn truncate_to(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n[... page truncated; focus on the relevant forms and instructions ...]");
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/files/audio.mp3"),
            "audio.mp3"
        );
        assert_eq!(
            filename_from_url("https://example.com/files/audio.mp3?token=abc"),
            "audio.mp3"
        );
        assert!(filename_from_url("https://example.com/files/").starts_with("download-"));
    }

    #[test]
    fn test_filename_rejects_traversal() {
        assert!(filename_from_url("https://example.com/..%2f..").starts_with("download-"));
    }

    #[test]
    fn test_truncate_to_respects_budget() {
        let text = "a".repeat(100);
        let result = truncate_to(text.clone(), 40);
        assert!(result.starts_with(&"a".repeat(40)));
        assert!(result.contains("truncated"));

        assert_eq!(truncate_to(text.clone(), 100), text);
    }

    #[test]
    fn test_truncate_to_keeps_char_boundary() {
        let text = "héllo wörld".repeat(10);
        let result = truncate_to(text, 7);
        assert!(result.contains("truncated"));
    }
}
