use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::error::SnippetError;
use crate::repositories::SnippetRepository;

/// Destination for copied snippet code
#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<()>;
}

/// Clipboard kept in process memory
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
    failing: AtomicBool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contents(&self) -> Option<String> {
        self.contents.lock().await.clone()
    }

    /// Make subsequent writes fail, e.g. to simulate a denied permission
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn write_text(&self, text: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("clipboard access denied"));
        }
        *self.contents.lock().await = Some(text.to_string());
        Ok(())
    }
}

/// Pipes text into a system clipboard command such as `pbcopy` or `xclip`
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_seconds: u64,
}

impl CommandClipboard {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout_seconds: 5,
        }
    }

    async fn pipe(&self, text: &str) -> Result<std::process::Output> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn clipboard command {}", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .context("open clipboard command stdin")?;
        stdin
            .write_all(text.as_bytes())
            .await
            .context("write text to clipboard command")?;
        drop(stdin);

        child
            .wait_with_output()
            .await
            .context("wait for clipboard command")
    }
}

#[async_trait]
impl Clipboard for CommandClipboard {
    #[instrument(skip(self, text))]
    async fn write_text(&self, text: &str) -> Result<()> {
        debug!("Copying {} bytes with {}", text.len(), self.program);

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_seconds),
            self.pipe(text),
        )
        .await
        .context("run clipboard command within timeout")??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Clipboard command failed with stderr: {}", stderr);
            return Err(anyhow!("clipboard command failed: {}", stderr.trim()))
                .context("copy text to clipboard");
        }
        Ok(())
    }
}

/// The copy action: clipboard write followed by a best-effort usage bump
pub struct ClipboardService {
    clipboard: Arc<dyn Clipboard>,
    repository: Arc<SnippetRepository>,
}

impl ClipboardService {
    pub fn new(clipboard: Arc<dyn Clipboard>, repository: Arc<SnippetRepository>) -> Self {
        Self {
            clipboard,
            repository,
        }
    }

    #[instrument(skip(self))]
    pub async fn copy_snippet(&self, id: Uuid) -> Result<(), SnippetError> {
        let snippet = self
            .repository
            .get(id)
            .await
            .ok_or(SnippetError::NotFound(id))?;

        self.clipboard
            .write_text(&snippet.code)
            .await
            .map_err(|e| {
                error!("Clipboard write failed: {:#}", e);
                SnippetError::Clipboard(format!("{:#}", e))
            })?;

        self.repository.increment_copy_count(id).await;
        Ok(())
    }
}
