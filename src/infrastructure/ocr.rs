//! Challenge text recognition
//!
//! The browser fetch hands the challenge image to a [`ChallengeSolver`]
//! when a block page appears. The shipped solver pipes the image through
//! the system `tesseract` binary.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    /// Read the characters shown in a challenge image
    async fn solve(&self, image: &[u8]) -> Result<String>;
}

/// Keep only the characters a text challenge can contain
pub fn normalize_challenge_text(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Clone)]
pub struct TesseractSolver {
    binary: String,
}

impl TesseractSolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl ChallengeSolver for TesseractSolver {
    async fn solve(&self, image: &[u8]) -> Result<String> {
        // Single text line, image on stdin, text on stdout
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "--psm", "7"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.binary))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("OCR process has no stdin"))?;
        stdin.write_all(image).await.context("Failed to send image to OCR")?;
        drop(stdin);

        let output = child.wait_with_output().await.context("OCR process failed")?;
        if !output.status.success() {
            return Err(anyhow!("OCR exited with {}", output.status));
        }

        let text = normalize_challenge_text(&String::from_utf8_lossy(&output.stdout));
        debug!("OCR read {} characters", text.len());
        if text.is_empty() {
            return Err(anyhow!("OCR produced no text"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_challenge_text() {
        assert_eq!(normalize_challenge_text(" ab c-9x\n"), "ABC9X");
        assert_eq!(normalize_challenge_text("\n\u{c}"), "");
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let solver = TesseractSolver::new("/nonexistent/tesseract-binary");
        assert!(solver.solve(b"not an image").await.is_err());
    }
}
