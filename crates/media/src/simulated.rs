use crate::{resolved, EventSender, MediaBackend, NativeEvent, NativeEventKind, PlayError, PlayRequest};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug)]
struct Clock {
    source_id: u64,
    has_source: bool,
    paused: bool,
    position: f64,
    duration: Option<f64>,
    volume: f64,
}

struct Shared {
    clock: Mutex<Clock>,
    events: EventSender,
}

impl Shared {
    fn clock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, source_id: u64, kind: NativeEventKind) {
        let _ = self.events.send(NativeEvent::new(source_id, kind));
    }
}

/// A media element driven by a tokio timer instead of an audio device.
///
/// Every source is treated as `track_len` long. Metadata arrives on the first
/// `play`, time advances by one tick per `tick` while playing, and the source
/// ends (pause + ended) when the clock reaches the end.
pub struct SimulatedBackend {
    shared: Arc<Shared>,
    track_len: f64,
    ticker: JoinHandle<()>,
}

impl SimulatedBackend {
    /// Must be called from within a tokio runtime.
    pub fn spawn(events: EventSender, track_len: Duration, tick: Duration) -> Self {
        let shared = Arc::new(Shared {
            clock: Mutex::new(Clock {
                source_id: 0,
                has_source: false,
                paused: true,
                position: 0.0,
                duration: None,
                volume: 1.0,
            }),
            events,
        });

        let tick = tick.max(Duration::from_millis(10));
        let ticker_shared = shared.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.tick().await;
            loop {
                interval.tick().await;
                advance(&ticker_shared, tick.as_secs_f64());
            }
        });

        Self {
            shared,
            track_len: track_len.as_secs_f64().max(1.0),
            ticker,
        }
    }

    pub fn position(&self) -> f64 {
        self.shared.clock().position
    }

    pub fn volume(&self) -> f64 {
        self.shared.clock().volume
    }
}

fn advance(shared: &Shared, step: f64) {
    let mut clock = shared.clock();
    if !clock.has_source || clock.paused {
        return;
    }
    let Some(duration) = clock.duration else {
        return;
    };

    clock.position = (clock.position + step).min(duration);
    let id = clock.source_id;
    shared.emit(id, NativeEventKind::TimeUpdate(clock.position));

    if clock.position >= duration {
        clock.paused = true;
        trace!(source_id = id, "simulated source reached the end");
        shared.emit(id, NativeEventKind::Pause);
        shared.emit(id, NativeEventKind::Ended);
    }
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

impl MediaBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn set_source(&mut self, source_id: u64, url: Option<&str>) {
        let mut clock = self.shared.clock();
        let was_playing = clock.has_source && !clock.paused;
        clock.source_id = source_id;
        clock.has_source = url.is_some();
        clock.paused = true;
        clock.position = 0.0;
        clock.duration = None;
        if was_playing {
            self.shared.emit(source_id, NativeEventKind::Pause);
        }
    }

    fn play(&mut self) -> PlayRequest {
        let mut clock = self.shared.clock();
        if !clock.has_source {
            return resolved(Err(PlayError::NoSource));
        }
        let id = clock.source_id;

        if clock.duration.is_none() {
            clock.duration = Some(self.track_len);
            self.shared.emit(id, NativeEventKind::Waiting);
            self.shared
                .emit(id, NativeEventKind::LoadedMetadata(self.track_len));
            self.shared.emit(id, NativeEventKind::CanPlay);
        }

        if clock.duration.is_some_and(|d| clock.position >= d) {
            clock.position = 0.0;
        }

        if clock.paused {
            clock.paused = false;
            self.shared.emit(id, NativeEventKind::Play);
        }
        resolved(Ok(()))
    }

    fn pause(&mut self) {
        let mut clock = self.shared.clock();
        if clock.has_source && !clock.paused {
            clock.paused = true;
            self.shared.emit(clock.source_id, NativeEventKind::Pause);
        }
    }

    fn is_paused(&self) -> bool {
        self.shared.clock().paused
    }

    fn set_current_time(&mut self, seconds: f64) {
        let mut clock = self.shared.clock();
        if !clock.has_source {
            return;
        }
        let upper = clock.duration.unwrap_or(f64::MAX);
        clock.position = seconds.clamp(0.0, upper);
        self.shared
            .emit(clock.source_id, NativeEventKind::TimeUpdate(clock.position));
    }

    fn duration(&self) -> Option<f64> {
        self.shared.clock().duration
    }

    fn set_volume(&mut self, volume: f64) {
        self.shared.clock().volume = volume;
    }
}
