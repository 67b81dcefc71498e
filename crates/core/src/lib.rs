pub mod config;
pub mod model;
pub mod time;
pub mod urls;

pub use config::{AppConfig, BackendKind, CatalogConfig, LibraryConfig, PlayerConfig};
pub use model::{Artist, Artwork, ArtworkSize, Track};
pub use time::{format_time, progress_pct};
