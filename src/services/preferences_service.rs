use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::domain::{Preferences, Theme};

/// JSON file holding the local user preferences
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored preferences, or the defaults when the file is missing or unreadable
    pub async fn load(&self) -> Preferences {
        match self.read().await {
            Ok(Some(preferences)) => preferences,
            Ok(None) => {
                debug!("No preferences at {}, using defaults", self.path.display());
                Preferences::default()
            }
            Err(e) => {
                warn!("Ignoring preferences at {}: {:#}", self.path.display(), e);
                Preferences::default()
            }
        }
    }

    async fn read(&self) -> Result<Option<Preferences>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("read preferences file"),
        };
        let preferences = serde_json::from_str(&contents).context("parse preferences JSON")?;
        Ok(Some(preferences))
    }

    pub async fn save(&self, preferences: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context("create preferences directory")?;
        }
        let json = serde_json::to_string_pretty(preferences).context("serialize preferences")?;
        tokio::fs::write(&self.path, json)
            .await
            .context("write preferences file")?;
        debug!("Saved preferences to {}", self.path.display());
        Ok(())
    }

    /// Persist a new theme, keeping the other preferences
    pub async fn set_theme(&self, theme: Theme) -> Result<Preferences> {
        let mut preferences = self.load().await;
        preferences.theme = theme;
        self.save(&preferences).await?;
        Ok(preferences)
    }
}
