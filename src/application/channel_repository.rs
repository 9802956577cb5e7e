// Repository trait for channel data access
use crate::domain::channel::{Channel, ChannelSet};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Listing entry for one channel of a file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
}

impl ChannelInfo {
    pub fn from_channel(channel: &Channel) -> Self {
        Self {
            name: channel.name().to_string(),
            unit: channel.unit().map(str::to_string),
            samples: channel.samples().len(),
            start: channel.first().map(|s| s.time),
            end: channel.last().map(|s| s.time),
        }
    }
}

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Ids of every loaded file
    async fn list_files(&self) -> Result<Vec<String>>;

    /// Channels available in a file; `FileNotFound` if the id is unknown
    async fn list_channels(&self, file_id: &str) -> Result<Vec<ChannelInfo>>;

    /// One channel of a file
    async fn get_series(&self, file_id: &str, channel: &str) -> Result<Channel>;

    /// Immutable view of every channel in a file, shared by concurrent scans
    async fn snapshot(&self, file_id: &str) -> Result<Arc<ChannelSet>>;

    /// Channel names of a file, used to validate wizard input
    async fn channel_names(&self, file_id: &str) -> Result<Vec<String>> {
        Ok(self
            .list_channels(file_id)
            .await?
            .into_iter()
            .map(|info| info.name)
            .collect())
    }
}
