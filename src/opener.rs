use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Opens a URL in a new top-level browser context
#[async_trait]
pub trait UrlOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;
}

/// Hands URLs to a desktop launcher such as `xdg-open`
pub struct SystemOpener {
    program: String,
}

impl SystemOpener {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl UrlOpener for SystemOpener {
    async fn open(&self, url: &str) -> Result<()> {
        tracing::info!("Opening {} with {}", url, self.program);

        let output = Command::new(&self.program)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        Ok(())
    }
}
