// In-memory channel repository backed by CSV files loaded at startup
use crate::application::channel_repository::{ChannelInfo, ChannelRepository};
use crate::domain::channel::{Channel, ChannelSet, ChannelSource};
use crate::error::{ReportError, Result};
use crate::infrastructure::csv_loader::load_csv_file;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Default)]
pub struct InMemoryChannelRepository {
    files: DashMap<String, Arc<ChannelSet>>,
}

impl InMemoryChannelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file_id: impl Into<String>, channels: ChannelSet) {
        self.files.insert(file_id.into(), Arc::new(channels));
    }

    /// Load every `*.csv` in `dir`. Unreadable files are logged and skipped.
    pub async fn load_dir(dir: &Path) -> Result<Self> {
        let repository = Self::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_csv = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            let Some(file_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !is_csv {
                continue;
            }
            match load_csv_file(&path).await {
                Ok(channels) => {
                    tracing::debug!("Loaded {} channels from {}", channels.len(), path.display());
                    repository.insert(file_id, channels);
                }
                Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
            }
        }
        tracing::info!("Loaded {} data files from {}", repository.files.len(), dir.display());
        Ok(repository)
    }

    fn file(&self, file_id: &str) -> Result<Arc<ChannelSet>> {
        self.files
            .get(file_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ReportError::FileNotFound {
                file_id: file_id.to_string(),
            })
    }
}

#[async_trait]
impl ChannelRepository for InMemoryChannelRepository {
    async fn list_files(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.files.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_channels(&self, file_id: &str) -> Result<Vec<ChannelInfo>> {
        Ok(self.file(file_id)?.iter().map(ChannelInfo::from_channel).collect())
    }

    async fn get_series(&self, file_id: &str, channel: &str) -> Result<Channel> {
        self.file(file_id)?
            .channel(channel)
            .cloned()
            .ok_or_else(|| ReportError::ChannelNotFound {
                channel: channel.to_string(),
            })
    }

    async fn snapshot(&self, file_id: &str) -> Result<Arc<ChannelSet>> {
        self.file(file_id)
    }
}
