use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArtworkSize {
    Small,
    Medium,
    Large,
}

impl ArtworkSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtworkSize::Small => "150x150",
            ArtworkSize::Medium => "480x480",
            ArtworkSize::Large => "1000x1000",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Artwork {
    #[serde(rename = "150x150", default)]
    pub small: Option<String>,
    #[serde(rename = "480x480", default)]
    pub medium: Option<String>,
    #[serde(rename = "1000x1000", default)]
    pub large: Option<String>,
}

impl Artwork {
    /// Requested size first, then whatever variant exists (small, medium, large).
    pub fn url(&self, size: ArtworkSize) -> Option<&str> {
        let preferred = match size {
            ArtworkSize::Small => &self.small,
            ArtworkSize::Medium => &self.medium,
            ArtworkSize::Large => &self.large,
        };
        preferred
            .as_deref()
            .or(self.small.as_deref())
            .or(self.medium.as_deref())
            .or(self.large.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Artist {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub user: Option<Artist>,
    #[serde(default)]
    pub artwork: Option<Artwork>,
    /// Length in seconds as reported by the catalog.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub play_count: Option<u64>,
    #[serde(default)]
    pub favorite_count: Option<u64>,
    #[serde(default)]
    pub permalink: Option<String>,
}

impl Track {
    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// The identifier, treating an empty string the same as a missing one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub fn title_or_default(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("Untitled")
    }

    pub fn artist_name(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.name.as_deref())
    }

    pub fn artwork_url(&self, size: ArtworkSize) -> Option<&str> {
        self.artwork.as_ref().and_then(|a| a.url(size))
    }
}
