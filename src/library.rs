//! "My videos" bookkeeping: a local JSON list of exported-video metadata.
//! This is editor-side state, not part of the compositor contract.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use crate::error::ReelsmithResult;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    pub slide_count: usize,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
    /// Container format of the exported file ("mp4", "webm").
    pub format: String,
}

impl VideoRecord {
    pub fn new(
        title: impl Into<String>,
        slide_count: usize,
        path: impl Into<PathBuf>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            slide_count,
            created_at: Utc::now(),
            path: path.into(),
            format: format.into(),
        }
    }
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct VideoLibrary {
    pub videos: Vec<VideoRecord>,
}

impl VideoLibrary {
    pub fn load(path: &Path) -> ReelsmithResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)
            .with_context(|| format!("read video library '{}'", path.display()))?;
        let library = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse video library '{}'", path.display()))?;
        Ok(library)
    }

    pub fn save(&self, path: &Path) -> ReelsmithResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create library dir '{}'", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(self).context("serialize video library")?;
        std::fs::write(path, json)
            .with_context(|| format!("write video library '{}'", path.display()))?;
        Ok(())
    }

    pub fn add(&mut self, record: VideoRecord) {
        self.videos.push(record);
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}
