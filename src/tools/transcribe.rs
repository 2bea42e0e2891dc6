//! Audio transcription via the provider's whisper endpoint

use serde::Deserialize;
use tracing::info;

use crate::tools::{ToolError, ToolRegistry};

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl ToolRegistry {
    /// Transcribe a previously downloaded audio file into text.
    ///
    /// The filename must be one returned by `download_file`; paths outside
    /// the files directory are rejected before touching the filesystem.
    pub(crate) async fn transcribe_audio(&self, filename: &str) -> Result<String, ToolError> {
        if filename.contains('/') || filename.contains("..") {
            return Err(ToolError::Transcription(format!(
                "invalid filename {filename:?}; pass the name returned by download_file"
            )));
        }

        let path = self.files_dir.join(filename);
        if !path.exists() {
            return Err(ToolError::Transcription(format!(
                "file {filename} does not exist; did you download it first?"
            )));
        }
        let data = tokio::fs::read(&path).await?;

        info!(filename, bytes = data.len(), "transcribing audio");

        let part = reqwest::multipart::Part::bytes(data).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone())
            .text("response_format", "json")
            .text("temperature", "0");

        let endpoint = format!("{}/openai/v1/audio/transcriptions", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ToolError::Transcription(format!(
                "provider returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&body)
            .map_err(|e| ToolError::Transcription(format!("unexpected reply: {e}")))?;
        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use crate::tools::tests::test_registry;
    use crate::tools::ToolError;

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let registry = test_registry();
        let err = registry
            .transcribe_audio("../../etc/passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Transcription(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_reported() {
        let registry = test_registry();
        let err = registry.transcribe_audio("nope.mp3").await.unwrap_err();
        assert!(err.to_string().contains("did you download it first"));
    }
}
