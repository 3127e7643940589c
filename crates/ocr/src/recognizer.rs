//! Image text recognition

use crate::errors::{OcrError, Result};
use async_trait::async_trait;
use invoiceflow_common::config::OcrConfig;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tracing::{debug, instrument};

/// Turns image bytes into text
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String>;
}

/// Runs the `tesseract` binary, feeding the image on stdin
pub struct TesseractCli {
    binary: String,
    language: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(&config.tesseract_path, &config.language)
    }
}

#[async_trait]
impl TextRecognizer for TesseractCli {
    #[instrument(skip(self, image), fields(size = image.len(), language = %self.language))]
    async fn recognize(&self, image: &[u8]) -> Result<String> {
        let mut cmd = TokioCommand::new(&self.binary);
        cmd.args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| OcrError::Recognition {
            message: format!("Failed to start {}: {}", self.binary, e),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).await?;
            // Closing stdin lets tesseract start reading
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OcrError::Recognition {
                message: format!(
                    "{} exited with {}: {}",
                    self.binary,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.len(), "Recognition complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_a_recognition_error() {
        let recognizer = TesseractCli::new("/nonexistent/tesseract-binary", "fra");
        let result = recognizer.recognize(&[0x89, 0x50, 0x4E, 0x47]).await;
        assert!(matches!(result, Err(OcrError::Recognition { .. })));
    }

    #[test]
    fn test_from_config_defaults() {
        let recognizer = TesseractCli::from_config(&OcrConfig::default());
        assert_eq!(recognizer.binary, "tesseract");
        assert_eq!(recognizer.language, "fra");
    }
}
