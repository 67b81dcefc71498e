use ocean_player_core::{progress_pct, urls, Track};
use ocean_player_media::{
    MediaEvent, MediaSession, NativeEvent, PendingPlay, PlayError, PlayOutcome,
};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayOptions {
    pub autoplay: bool,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self { autoplay: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub current_track: Option<Track>,
    pub queue: Vec<Track>,
    pub is_playing: bool,
    pub is_loading: bool,
    pub position: f64,
    pub duration: f64,
    pub progress_pct: f64,
    pub volume: f64,
    pub phase: Phase,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            current_track: None,
            queue: Vec::new(),
            is_playing: false,
            is_loading: false,
            position: 0.0,
            duration: 0.0,
            progress_pct: 0.0,
            volume: 0.0,
            phase: Phase::Idle,
        }
    }
}

/// A queued track waiting to be started outside the code path that dequeued it.
///
/// It only runs if nobody started a track by hand in the meantime.
#[derive(Debug, Clone, PartialEq)]
pub struct Deferred {
    epoch: u64,
    track: Track,
}

impl Deferred {
    pub fn track(&self) -> &Track {
        &self.track
    }
}

pub struct PlaybackController {
    session: MediaSession,
    api_base: String,
    current_track: Option<Track>,
    queue: VecDeque<Track>,
    is_playing: bool,
    is_loading: bool,
    position: f64,
    duration: f64,
    phase: Phase,
    manual_epoch: u64,
}

impl PlaybackController {
    pub fn new(session: MediaSession, api_base: impl Into<String>) -> Self {
        Self {
            session,
            api_base: api_base.into(),
            current_track: None,
            queue: VecDeque::new(),
            is_playing: false,
            is_loading: false,
            position: 0.0,
            duration: 0.0,
            phase: Phase::Idle,
            manual_epoch: 0,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.session.backend_name()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref()
    }

    pub fn queue(&self) -> impl Iterator<Item = &Track> {
        self.queue.iter()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn progress_pct(&self) -> f64 {
        progress_pct(self.position, self.duration)
    }

    /// Start `track` on behalf of the user. Cancels any queued auto-advance still in flight.
    pub fn play_track(&mut self, track: Track, options: PlayOptions) -> Option<PendingPlay> {
        if track.id().is_none() {
            debug!("ignoring play request for a track without an id");
            return None;
        }
        self.manual_epoch += 1;
        self.start_track(track, options)
    }

    fn start_track(&mut self, track: Track, options: PlayOptions) -> Option<PendingPlay> {
        let id = track.id()?.to_string();
        let url = urls::stream_url(&self.api_base, &id);
        info!(track_id = %id, title = track.title_or_default(), autoplay = options.autoplay, "loading track");

        self.current_track = Some(track);
        self.is_loading = true;
        self.position = 0.0;
        self.duration = 0.0;
        self.session.load(&url);
        self.is_playing = !self.session.is_paused();
        self.phase = Phase::Loading;

        if options.autoplay {
            Some(self.session.play())
        } else {
            self.is_loading = false;
            self.phase = Phase::Paused;
            None
        }
    }

    /// Plays or pauses depending on what the native handle is doing right now.
    pub fn toggle_play(&mut self) -> Option<PendingPlay> {
        self.current_track.as_ref()?;
        if self.session.is_paused() {
            Some(self.session.play())
        } else {
            self.session.pause();
            None
        }
    }

    pub fn seek(&mut self, target: f64) {
        let target = if target.is_finite() { target } else { 0.0 };
        let known = self
            .session
            .duration()
            .or((self.duration > 0.0).then_some(self.duration));
        let clamped = match known {
            Some(duration) => target.clamp(0.0, duration),
            None => target.max(0.0),
        };
        self.position = self.session.seek(clamped);
    }

    pub fn play_next(&mut self) -> Option<Deferred> {
        let next = self.queue.pop_front()?;
        Some(self.defer(next))
    }

    pub fn add_to_queue(&mut self, track: Track) {
        if track.id().is_none() {
            debug!("ignoring queue request for a track without an id");
            return;
        }
        self.queue.push_back(track);
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    pub fn set_volume(&mut self, volume: f64) -> f64 {
        self.session.set_volume(volume)
    }

    fn defer(&self, track: Track) -> Deferred {
        Deferred {
            epoch: self.manual_epoch,
            track,
        }
    }

    pub fn run_deferred(&mut self, deferred: Deferred) -> Option<PendingPlay> {
        if deferred.epoch != self.manual_epoch {
            info!(
                track_id = deferred.track.id().unwrap_or_default(),
                "dropping queued track; playback was changed by hand"
            );
            return None;
        }
        self.start_track(deferred.track, PlayOptions::default())
    }

    pub fn handle_native(&mut self, event: NativeEvent) -> Option<Deferred> {
        let event = self.session.normalize(event)?;
        self.handle_event(event)
    }

    pub fn handle_event(&mut self, event: MediaEvent) -> Option<Deferred> {
        match event {
            MediaEvent::Started => {
                if self.current_track.is_some() {
                    self.is_playing = true;
                    self.phase = Phase::Playing;
                    // Ended zeroes the clock; a replay of the same source sends no new metadata.
                    if self.duration <= 0.0 {
                        if let Some(duration) = self.session.duration() {
                            self.duration = duration;
                        }
                    }
                }
            }
            MediaEvent::Stopped => {
                self.is_playing = false;
                if self.phase == Phase::Playing {
                    self.phase = Phase::Paused;
                }
            }
            MediaEvent::TimeUpdated(position) => {
                self.position = if self.duration > 0.0 {
                    position.clamp(0.0, self.duration)
                } else {
                    position.max(0.0)
                };
            }
            MediaEvent::MetadataReady(duration) => {
                self.duration = duration;
                if duration > 0.0 {
                    self.position = self.position.min(duration);
                }
            }
            MediaEvent::Ended => {
                self.is_playing = false;
                self.position = 0.0;
                self.duration = 0.0;
                self.phase = Phase::Ended;
                if let Some(next) = self.queue.pop_front() {
                    debug!(track_id = next.id().unwrap_or_default(), "auto-advancing to next queued track");
                    return Some(self.defer(next));
                }
            }
            MediaEvent::Buffering => self.is_loading = true,
            MediaEvent::BufferingDone => self.is_loading = false,
            MediaEvent::Failed(reason) => {
                warn!(%reason, "media session reported an error");
                self.is_loading = false;
                self.is_playing = false;
                if self.current_track.is_some() {
                    self.phase = Phase::Paused;
                }
            }
        }
        None
    }

    pub fn resolve_play(&mut self, generation: u64, result: Result<(), PlayError>) -> PlayOutcome {
        let outcome = self.session.settle(generation, result);
        match &outcome {
            PlayOutcome::Started => {
                self.is_loading = false;
            }
            PlayOutcome::NotStarted(_) => {
                self.is_loading = false;
                self.is_playing = false;
                if self.current_track.is_some() {
                    self.phase = Phase::Paused;
                }
            }
            PlayOutcome::Superseded => {}
        }
        outcome
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            current_track: self.current_track.clone(),
            queue: self.queue.iter().cloned().collect(),
            is_playing: self.is_playing,
            is_loading: self.is_loading,
            position: self.position,
            duration: self.duration,
            progress_pct: self.progress_pct(),
            volume: self.session.volume(),
            phase: self.phase,
        }
    }

    /// Stops output and clears the source. Called once when the service winds down.
    pub fn shutdown(&mut self) {
        self.session.release();
        self.current_track = None;
        self.is_playing = false;
        self.is_loading = false;
        self.position = 0.0;
        self.duration = 0.0;
        self.phase = Phase::Idle;
    }
}
