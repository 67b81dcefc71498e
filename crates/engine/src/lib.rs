pub mod controller;
pub mod hub;
pub mod service;

pub use controller::{Deferred, Phase, PlayOptions, PlaybackController, Snapshot};
pub use hub::{StateHub, Subscription};
pub use service::{PlayerError, PlayerHandle, PlayerService};
