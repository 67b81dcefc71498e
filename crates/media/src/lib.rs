//! Media session driver.
//!
//! A [`MediaBackend`] is the native playback handle: it accepts a source, starts
//! and stops output and reports what happened through [`NativeEvent`]s. The
//! [`MediaSession`] owns exactly one backend and turns its raw event stream
//! into the small [`MediaEvent`] vocabulary the controller understands,
//! dropping anything that belongs to a source it has since replaced.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

#[cfg_attr(not(feature = "rodio"), allow(dead_code))]
mod audio_thread;
mod null;
mod simulated;

#[cfg(feature = "rodio")]
mod rodio_backend;

pub use null::NullBackend;
pub use simulated::SimulatedBackend;

#[cfg(feature = "rodio")]
pub use rodio_backend::RodioBackend;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayError {
    #[error("playback was blocked: {0}")]
    Blocked(String),
    #[error("no audio output available")]
    NoOutput,
    #[error("no source loaded")]
    NoSource,
    #[error("source failed: {0}")]
    Source(String),
    #[error("play request was dropped by the backend")]
    Dropped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NativeEventKind {
    Play,
    Pause,
    TimeUpdate(f64),
    LoadedMetadata(f64),
    Ended,
    Waiting,
    CanPlay,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeEvent {
    pub source_id: u64,
    pub kind: NativeEventKind,
}

impl NativeEvent {
    pub fn new(source_id: u64, kind: NativeEventKind) -> Self {
        Self { source_id, kind }
    }
}

pub type EventSender = mpsc::UnboundedSender<NativeEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<NativeEvent>;
pub type PlayRequest = oneshot::Receiver<Result<(), PlayError>>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Resolve a play request immediately, for backends that know the answer up front.
pub fn resolved(result: Result<(), PlayError>) -> PlayRequest {
    let (tx, rx) = oneshot::channel();
    let _ = tx.send(result);
    rx
}

pub trait MediaBackend: Send {
    fn name(&self) -> &'static str;
    /// `None` clears the source. Events emitted for this source carry `source_id`.
    fn set_source(&mut self, source_id: u64, url: Option<&str>);
    fn play(&mut self) -> PlayRequest;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn set_current_time(&mut self, seconds: f64);
    fn duration(&self) -> Option<f64>;
    fn set_volume(&mut self, volume: f64);
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Started,
    Stopped,
    TimeUpdated(f64),
    MetadataReady(f64),
    Ended,
    Buffering,
    BufferingDone,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Started,
    NotStarted(PlayError),
    Superseded,
}

#[derive(Debug)]
pub struct PendingPlay {
    generation: u64,
    rx: PlayRequest,
}

impl PendingPlay {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn wait(self) -> (u64, Result<(), PlayError>) {
        let result = self.rx.await.unwrap_or(Err(PlayError::Dropped));
        (self.generation, result)
    }
}

pub fn clamp_volume(volume: f64) -> f64 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn usable_duration(value: Option<f64>) -> Option<f64> {
    value.filter(|d| d.is_finite() && *d > 0.0)
}

pub struct MediaSession {
    backend: Box<dyn MediaBackend>,
    generation: u64,
    known_duration: Option<f64>,
    pending_seek: Option<f64>,
    volume: f64,
}

impl MediaSession {
    pub fn new(mut backend: Box<dyn MediaBackend>, volume: f64) -> Self {
        let volume = clamp_volume(volume);
        backend.set_volume(volume);
        Self {
            backend,
            generation: 0,
            known_duration: None,
            pending_seek: None,
            volume,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Assign a new source. Everything still in flight for older sources is void from here on.
    pub fn load(&mut self, url: &str) -> u64 {
        self.generation += 1;
        self.known_duration = None;
        self.pending_seek = None;
        debug!(generation = self.generation, backend = self.backend.name(), %url, "loading source");
        self.backend.set_source(self.generation, Some(url));
        self.generation
    }

    pub fn play(&mut self) -> PendingPlay {
        PendingPlay {
            generation: self.generation,
            rx: self.backend.play(),
        }
    }

    pub fn pause(&mut self) {
        if !self.backend.is_paused() {
            self.backend.pause();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.backend.is_paused()
    }

    pub fn duration(&self) -> Option<f64> {
        usable_duration(self.backend.duration()).or(self.known_duration)
    }

    /// Returns the position actually requested from the backend.
    pub fn seek(&mut self, seconds: f64) -> f64 {
        let target = if seconds.is_finite() {
            seconds.max(0.0)
        } else {
            0.0
        };
        let applied = match self.duration() {
            Some(duration) => {
                self.pending_seek = None;
                target.min(duration)
            }
            None => {
                self.pending_seek = Some(target);
                target
            }
        };
        self.backend.set_current_time(applied);
        applied
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f64) -> f64 {
        self.volume = clamp_volume(volume);
        self.backend.set_volume(self.volume);
        self.volume
    }

    pub fn settle(&self, generation: u64, result: Result<(), PlayError>) -> PlayOutcome {
        if generation != self.generation {
            trace!(generation, current = self.generation, "discarding superseded play result");
            return PlayOutcome::Superseded;
        }
        match result {
            Ok(()) => PlayOutcome::Started,
            Err(err) => {
                warn!(error = %err, generation, "playback did not start");
                PlayOutcome::NotStarted(err)
            }
        }
    }

    pub fn normalize(&mut self, event: NativeEvent) -> Option<MediaEvent> {
        if event.source_id != self.generation {
            trace!(
                source_id = event.source_id,
                current = self.generation,
                "dropping event from replaced source"
            );
            return None;
        }

        let normalized = match event.kind {
            NativeEventKind::Play => MediaEvent::Started,
            NativeEventKind::Pause => MediaEvent::Stopped,
            NativeEventKind::TimeUpdate(position) => {
                MediaEvent::TimeUpdated(if position.is_finite() { position } else { 0.0 })
            }
            NativeEventKind::LoadedMetadata(duration) => {
                let duration = usable_duration(Some(duration));
                if let Some(d) = duration {
                    self.known_duration = Some(d);
                    if let Some(pending) = self.pending_seek.take() {
                        if pending > d {
                            debug!(pending, duration = d, "reclamping seek issued before metadata");
                            self.backend.set_current_time(d);
                        }
                    }
                }
                MediaEvent::MetadataReady(duration.unwrap_or(0.0))
            }
            NativeEventKind::Ended => MediaEvent::Ended,
            NativeEventKind::Waiting => MediaEvent::Buffering,
            NativeEventKind::CanPlay => MediaEvent::BufferingDone,
            NativeEventKind::Error(reason) => MediaEvent::Failed(reason),
        };
        Some(normalized)
    }

    /// Stop output and drop the source. The session stays usable afterwards.
    pub fn release(&mut self) {
        self.pause();
        self.generation += 1;
        self.known_duration = None;
        self.pending_seek = None;
        self.backend.set_source(self.generation, None);
        debug!(backend = self.backend.name(), "media session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        sources: Vec<(u64, Option<String>)>,
        seeks: Vec<f64>,
        volume: f64,
        paused: bool,
        pauses: usize,
        duration: Option<f64>,
    }

    struct Recorder(Arc<Mutex<Calls>>);

    impl MediaBackend for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn set_source(&mut self, source_id: u64, url: Option<&str>) {
            let mut c = self.0.lock().unwrap();
            c.sources.push((source_id, url.map(str::to_string)));
            c.paused = true;
        }

        fn play(&mut self) -> PlayRequest {
            self.0.lock().unwrap().paused = false;
            resolved(Ok(()))
        }

        fn pause(&mut self) {
            let mut c = self.0.lock().unwrap();
            c.paused = true;
            c.pauses += 1;
        }

        fn is_paused(&self) -> bool {
            self.0.lock().unwrap().paused
        }

        fn set_current_time(&mut self, seconds: f64) {
            self.0.lock().unwrap().seeks.push(seconds);
        }

        fn duration(&self) -> Option<f64> {
            self.0.lock().unwrap().duration
        }

        fn set_volume(&mut self, volume: f64) {
            self.0.lock().unwrap().volume = volume;
        }
    }

    fn session() -> (MediaSession, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls {
            paused: true,
            ..Calls::default()
        }));
        (
            MediaSession::new(Box::new(Recorder(calls.clone())), 0.5),
            calls,
        )
    }

    #[test]
    fn events_from_replaced_sources_are_dropped() {
        let (mut s, _) = session();
        let first = s.load("https://a");
        let second = s.load("https://b");

        assert_eq!(s.normalize(NativeEvent::new(first, NativeEventKind::Ended)), None);
        assert_eq!(
            s.normalize(NativeEvent::new(second, NativeEventKind::Play)),
            Some(MediaEvent::Started)
        );
    }

    #[test]
    fn seek_without_metadata_only_clamps_at_zero_then_reclamps() {
        let (mut s, calls) = session();
        let gen = s.load("https://a");

        assert_eq!(s.seek(-4.0), 0.0);
        assert_eq!(s.seek(500.0), 500.0);

        let ev = s.normalize(NativeEvent::new(gen, NativeEventKind::LoadedMetadata(200.0)));
        assert_eq!(ev, Some(MediaEvent::MetadataReady(200.0)));
        assert_eq!(calls.lock().unwrap().seeks, vec![0.0, 500.0, 200.0]);

        assert_eq!(s.seek(260.0), 200.0);
    }

    #[test]
    fn late_play_results_are_superseded() {
        let (mut s, _) = session();
        let old = s.load("https://a");
        s.load("https://b");

        assert_eq!(s.settle(old, Ok(())), PlayOutcome::Superseded);
        assert_eq!(
            s.settle(s.generation(), Err(PlayError::Blocked("autoplay".into()))),
            PlayOutcome::NotStarted(PlayError::Blocked("autoplay".into()))
        );
    }

    #[test]
    fn volume_is_clamped_and_applied_live() {
        let (mut s, calls) = session();
        assert_eq!(calls.lock().unwrap().volume, 0.5);

        assert_eq!(s.set_volume(1.5), 1.0);
        assert_eq!(calls.lock().unwrap().volume, 1.0);
        assert_eq!(s.set_volume(-0.2), 0.0);
        assert_eq!(s.set_volume(f64::NAN), 0.0);
        assert_eq!(calls.lock().unwrap().sources.len(), 0);
    }

    #[test]
    fn pause_is_idempotent_and_release_clears_source() {
        let (mut s, calls) = session();
        s.load("https://a");
        s.pause();
        assert_eq!(calls.lock().unwrap().pauses, 0);

        let _ = s.play();
        s.pause();
        s.pause();
        assert_eq!(calls.lock().unwrap().pauses, 1);

        s.release();
        let c = calls.lock().unwrap();
        assert_eq!(c.sources.last(), Some(&(2, None)));
    }
}
