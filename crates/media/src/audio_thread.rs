//! Command loop of the audio thread, kept apart from the output device so it
//! can be driven directly.

use crate::{EventSender, NativeEvent, NativeEventKind, PlayError};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub(crate) type PlayReply = oneshot::Sender<Result<(), PlayError>>;

pub(crate) enum AudioCmd {
    Load { source_id: u64, url: Option<String> },
    Fetched { source_id: u64, result: Result<Vec<u8>, String> },
    Play(PlayReply),
    Pause,
    Seek(f64),
    Volume(f32),
    Quit,
}

/// What the backend handle can read without a round trip to the thread.
#[derive(Debug)]
pub(crate) struct Status {
    pub has_source: bool,
    pub paused: bool,
    pub duration: Option<f64>,
}

pub(crate) type StatusHandle = Arc<Mutex<Status>>;

pub(crate) fn new_status() -> StatusHandle {
    Arc::new(Mutex::new(Status {
        has_source: false,
        paused: true,
        duration: None,
    }))
}

pub(crate) fn lock(status: &StatusHandle) -> MutexGuard<'_, Status> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `None` when the target does not fit in a `Duration`.
pub(crate) fn seek_target(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds.max(0.0)).ok()
}

/// One decoded source attached to the output.
pub(crate) trait Voice {
    fn play(&self);
    fn pause(&self);
    fn is_paused(&self) -> bool;
    fn stop(&self);
    /// True once everything appended has been played.
    fn empty(&self) -> bool;
    fn position(&self) -> Duration;
    fn try_seek(&self, target: Duration) -> Result<(), String>;
    fn set_volume(&self, volume: f32);
}

pub(crate) trait Output {
    type Voice: Voice;

    /// Decode `bytes` into a paused voice. Also returns the total length when known.
    fn open(&mut self, bytes: &Arc<Vec<u8>>, volume: f32) -> Result<(Self::Voice, Option<f64>), String>;
}

pub(crate) type Fetcher = Arc<dyn Fn(&str) -> Result<Vec<u8>, String> + Send + Sync>;

pub(crate) struct AudioThread<O: Output> {
    output: O,
    tx: Sender<AudioCmd>,
    status: StatusHandle,
    events: EventSender,
    fetcher: Fetcher,
    source_id: u64,
    bytes: Option<Arc<Vec<u8>>>,
    voice: Option<O::Voice>,
    loading: bool,
    waiters: Vec<PlayReply>,
    volume: f32,
}

impl<O: Output> AudioThread<O> {
    pub(crate) fn new(
        output: O,
        tx: Sender<AudioCmd>,
        status: StatusHandle,
        events: EventSender,
        fetcher: Fetcher,
    ) -> Self {
        Self {
            output,
            tx,
            status,
            events,
            fetcher,
            source_id: 0,
            bytes: None,
            voice: None,
            loading: false,
            waiters: Vec::new(),
            volume: 1.0,
        }
    }

    fn emit(&self, kind: NativeEventKind) {
        let _ = self.events.send(NativeEvent::new(self.source_id, kind));
    }

    pub(crate) fn run(mut self, rx: Receiver<AudioCmd>, tick: Duration) {
        loop {
            match rx.recv_timeout(tick) {
                Ok(AudioCmd::Quit) => {
                    if let Some(voice) = self.voice.take() {
                        voice.stop();
                    }
                    break;
                }
                Ok(cmd) => self.handle(cmd),
                Err(RecvTimeoutError::Timeout) => self.poll_progress(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    pub(crate) fn handle(&mut self, cmd: AudioCmd) {
        match cmd {
            AudioCmd::Load { source_id, url } => self.load(source_id, url),
            AudioCmd::Fetched { source_id, result } => {
                if source_id != self.source_id {
                    return;
                }
                self.loading = false;
                match result {
                    Ok(bytes) => {
                        let bytes = Arc::new(bytes);
                        self.bytes = Some(bytes.clone());
                        match self.attach(&bytes) {
                            Ok(duration) => {
                                lock(&self.status).duration = duration;
                                if let Some(d) = duration {
                                    self.emit(NativeEventKind::LoadedMetadata(d));
                                }
                                self.emit(NativeEventKind::CanPlay);
                                if !self.waiters.is_empty() {
                                    self.start();
                                }
                            }
                            Err(reason) => self.fail(reason),
                        }
                    }
                    Err(reason) => self.fail(reason),
                }
            }
            AudioCmd::Play(reply) => {
                if self.voice.is_none() {
                    if let Some(bytes) = self.bytes.clone() {
                        // Replaying after the end: rebuild from the downloaded bytes.
                        if let Err(reason) = self.attach(&bytes) {
                            let _ = reply.send(Err(PlayError::Source(reason)));
                            return;
                        }
                    }
                }
                self.waiters.push(reply);
                if self.voice.is_some() {
                    self.start();
                } else if !self.loading {
                    lock(&self.status).paused = true;
                    for waiter in self.waiters.drain(..) {
                        let _ = waiter.send(Err(PlayError::NoSource));
                    }
                }
            }
            AudioCmd::Pause => {
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Err(PlayError::Dropped));
                }
                if let Some(voice) = &self.voice {
                    if !voice.is_paused() {
                        voice.pause();
                        self.emit(NativeEventKind::Pause);
                    }
                }
            }
            AudioCmd::Seek(seconds) => self.seek(seconds),
            AudioCmd::Volume(volume) => {
                self.volume = volume;
                if let Some(voice) = &self.voice {
                    voice.set_volume(volume);
                }
            }
            AudioCmd::Quit => {}
        }
    }

    fn seek(&mut self, seconds: f64) {
        let Some(voice) = &self.voice else {
            return;
        };
        let known = lock(&self.status).duration;
        let target = match (seek_target(seconds), known.and_then(seek_target)) {
            (Some(target), Some(end)) => target.min(end),
            (Some(target), None) => target,
            (None, Some(end)) => end,
            (None, None) => {
                warn!(seconds, "seek target out of range; ignored");
                return;
            }
        };
        if let Err(err) = voice.try_seek(target) {
            warn!(error = %err, seconds, "seek not supported by this source");
            return;
        }
        self.emit(NativeEventKind::TimeUpdate(target.as_secs_f64()));
    }

    fn load(&mut self, source_id: u64, url: Option<String>) {
        if let Some(voice) = self.voice.take() {
            let was_playing = !voice.is_paused();
            voice.stop();
            self.source_id = source_id;
            if was_playing {
                self.emit(NativeEventKind::Pause);
            }
        }
        self.source_id = source_id;
        self.bytes = None;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(PlayError::Source("interrupted by a new load".to_string())));
        }

        let Some(url) = url else {
            self.loading = false;
            return;
        };

        self.loading = true;
        self.emit(NativeEventKind::Waiting);
        let tx = self.tx.clone();
        let fetcher = self.fetcher.clone();
        thread::spawn(move || {
            let result = fetcher(&url);
            let _ = tx.send(AudioCmd::Fetched { source_id, result });
        });
    }

    fn attach(&mut self, bytes: &Arc<Vec<u8>>) -> Result<Option<f64>, String> {
        let (voice, duration) = self.output.open(bytes, self.volume)?;
        self.voice = Some(voice);
        Ok(duration)
    }

    fn start(&mut self) {
        let Some(voice) = &self.voice else {
            return;
        };
        if voice.is_paused() {
            voice.play();
            self.emit(NativeEventKind::Play);
        }
        lock(&self.status).paused = false;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    fn fail(&mut self, reason: String) {
        debug!(source_id = self.source_id, %reason, "source failed");
        self.voice = None;
        lock(&self.status).paused = true;
        self.emit(NativeEventKind::Error(reason.clone()));
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(PlayError::Source(reason.clone())));
        }
    }

    pub(crate) fn poll_progress(&mut self) {
        let Some(voice) = &self.voice else {
            return;
        };
        if voice.is_paused() {
            return;
        }
        if voice.empty() {
            let end = lock(&self.status)
                .duration
                .unwrap_or_else(|| voice.position().as_secs_f64());
            self.voice = None;
            lock(&self.status).paused = true;
            self.emit(NativeEventKind::TimeUpdate(end));
            self.emit(NativeEventKind::Pause);
            self.emit(NativeEventKind::Ended);
            return;
        }
        self.emit(NativeEventKind::TimeUpdate(voice.position().as_secs_f64()));
    }
}
