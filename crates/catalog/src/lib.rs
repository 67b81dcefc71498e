use async_trait::async_trait;
use futures_util::future::try_join_all;
use ocean_player_core::Track;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod audius;
mod saved;

pub use audius::AudiusClient;
pub use saved::{SavedTracks, LIBRARY_KEY};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid catalog base url {base:?}: {reason}")]
    InvalidBase { base: String, reason: String },
    #[error("Audius request failed: {status}")]
    Status {
        status: reqwest::StatusCode,
        details: String,
    },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrendingWindow {
    #[default]
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "year")]
    Year,
    #[serde(rename = "allTime")]
    AllTime,
}

impl TrendingWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendingWindow::Week => "week",
            TrendingWindow::Month => "month",
            TrendingWindow::Year => "year",
            TrendingWindow::AllTime => "allTime",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            "alltime" | "all" => Some(Self::AllTime),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch_trending(
        &self,
        limit: u32,
        offset: u32,
        window: TrendingWindow,
    ) -> Result<Vec<Track>, CatalogError>;

    /// A blank query yields an empty list without touching the network.
    async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<Vec<Track>, CatalogError>;

    async fn fetch_by_id(&self, id: &str) -> Result<Option<Track>, CatalogError>;

    fn stream_url(&self, id: &str) -> String;
}

/// Fetches the first `cap` ids concurrently. Ids the catalog does not know are
/// skipped; any other failure fails the whole batch.
pub async fn fetch_many(
    catalog: &dyn Catalog,
    ids: &[String],
    cap: usize,
) -> Result<Vec<Track>, CatalogError> {
    let lookups = ids.iter().take(cap).map(|id| catalog.fetch_by_id(id));
    let found = try_join_all(lookups).await?;
    Ok(found.into_iter().flatten().collect())
}
