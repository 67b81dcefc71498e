use crate::controller::{Deferred, PlayOptions, PlaybackController, Snapshot};
use crate::hub::{StateHub, Subscription};
use ocean_player_core::Track;
use ocean_player_media::{EventReceiver, PendingPlay, PlayError, PlayOutcome};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error("playback service is not running")]
    NotMounted,
}

enum Command {
    PlayTrack(Track, PlayOptions),
    TogglePlay,
    Seek(f64),
    PlayNext,
    AddToQueue(Track),
    ClearQueue,
    SetVolume(f64),
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown(oneshot::Sender<()>),
}

enum Internal {
    PlayResolved {
        generation: u64,
        result: Result<(), PlayError>,
    },
    Deferred(Deferred),
}

type InternalSender = mpsc::UnboundedSender<Internal>;

/// Cloneable access to a running [`PlayerService`].
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<Command>,
    hub: StateHub,
}

impl PlayerHandle {
    fn send(&self, cmd: Command) -> Result<(), PlayerError> {
        self.tx.send(cmd).map_err(|_| PlayerError::NotMounted)
    }

    pub fn play_track(&self, track: Track) -> Result<(), PlayerError> {
        self.play_track_with(track, PlayOptions::default())
    }

    pub fn play_track_with(&self, track: Track, options: PlayOptions) -> Result<(), PlayerError> {
        self.send(Command::PlayTrack(track, options))
    }

    pub fn toggle_play(&self) -> Result<(), PlayerError> {
        self.send(Command::TogglePlay)
    }

    pub fn seek(&self, seconds: f64) -> Result<(), PlayerError> {
        self.send(Command::Seek(seconds))
    }

    pub fn play_next(&self) -> Result<(), PlayerError> {
        self.send(Command::PlayNext)
    }

    pub fn add_to_queue(&self, track: Track) -> Result<(), PlayerError> {
        self.send(Command::AddToQueue(track))
    }

    pub fn clear_queue(&self) -> Result<(), PlayerError> {
        self.send(Command::ClearQueue)
    }

    pub fn set_volume(&self, volume: f64) -> Result<(), PlayerError> {
        self.send(Command::SetVolume(volume))
    }

    /// State after every command sent so far through this handle has been applied.
    pub async fn snapshot(&self) -> Result<Snapshot, PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| PlayerError::NotMounted)
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        self.hub.latest()
    }

    pub fn subscribe<F>(&self, observer: F) -> Result<Subscription, PlayerError>
    where
        F: Fn(&Arc<Snapshot>) + Send + Sync + 'static,
    {
        if !self.is_running() {
            return Err(PlayerError::NotMounted);
        }
        Ok(self.hub.subscribe(observer))
    }

    pub fn watch(&self) -> Result<watch::Receiver<Arc<Snapshot>>, PlayerError> {
        if !self.is_running() {
            return Err(PlayerError::NotMounted);
        }
        Ok(self.hub.watch())
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    pub async fn shutdown(&self) -> Result<(), PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown(reply))?;
        rx.await.map_err(|_| PlayerError::NotMounted)
    }
}

/// The task that owns the controller. Every operation, native event and play
/// resolution is applied on it, one at a time.
pub struct PlayerService {
    handle: PlayerHandle,
    task: JoinHandle<()>,
}

impl PlayerService {
    /// Must be called from within a tokio runtime.
    pub fn spawn(controller: PlaybackController, events: EventReceiver) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = StateHub::new(controller.snapshot());
        info!(backend = controller.backend_name(), "playback service started");
        let task = tokio::spawn(run(controller, rx, events, hub.clone()));
        Self {
            handle: PlayerHandle { tx, hub },
            task,
        }
    }

    pub fn handle(&self) -> PlayerHandle {
        self.handle.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.handle.shutdown().await;
        let _ = self.task.await;
    }
}

async fn run(
    mut controller: PlaybackController,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: EventReceiver,
    hub: StateHub,
) {
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<Internal>();
    let mut reply_on_exit = None;

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Shutdown(reply)) => {
                    reply_on_exit = Some(reply);
                    break;
                }
                Some(cmd) => apply(&mut controller, cmd, &internal_tx),
                None => {
                    debug!("every player handle was dropped");
                    break;
                }
            },
            Some(event) = events.recv() => {
                if let Some(deferred) = controller.handle_native(event) {
                    let _ = internal_tx.send(Internal::Deferred(deferred));
                }
            }
            Some(msg) = internal_rx.recv() => match msg {
                Internal::PlayResolved { generation, result } => {
                    if let PlayOutcome::NotStarted(reason) = controller.resolve_play(generation, result) {
                        debug!(%reason, "play request settled without output");
                    }
                }
                Internal::Deferred(deferred) => {
                    let pending = controller.run_deferred(deferred);
                    await_play(pending, &internal_tx);
                }
            },
        }
        hub.publish(controller.snapshot());
    }

    drop(commands);
    controller.shutdown();
    hub.publish(controller.snapshot());
    info!("playback service stopped");
    if let Some(reply) = reply_on_exit {
        let _ = reply.send(());
    }
}

fn apply(controller: &mut PlaybackController, cmd: Command, internal: &InternalSender) {
    match cmd {
        Command::PlayTrack(track, options) => {
            let pending = controller.play_track(track, options);
            await_play(pending, internal);
        }
        Command::TogglePlay => {
            let pending = controller.toggle_play();
            await_play(pending, internal);
        }
        Command::Seek(seconds) => controller.seek(seconds),
        Command::PlayNext => {
            if let Some(deferred) = controller.play_next() {
                let _ = internal.send(Internal::Deferred(deferred));
            }
        }
        Command::AddToQueue(track) => controller.add_to_queue(track),
        Command::ClearQueue => controller.clear_queue(),
        Command::SetVolume(volume) => {
            controller.set_volume(volume);
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(controller.snapshot());
        }
        Command::Shutdown(_) => {}
    }
}

fn await_play(pending: Option<PendingPlay>, internal: &InternalSender) {
    let Some(pending) = pending else {
        return;
    };
    let tx = internal.clone();
    tokio::spawn(async move {
        let (generation, result) = pending.wait().await;
        let _ = tx.send(Internal::PlayResolved { generation, result });
    });
}

#[cfg(test)]
mod tests {
    use super::{PlayerError, PlayerService};
    use crate::controller::{Phase, PlaybackController};
    use ocean_player_core::Track;
    use ocean_player_media::{event_channel, MediaSession, NullBackend, SimulatedBackend};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn simulated(track_secs: u64) -> PlayerService {
        let (tx, rx) = event_channel();
        let backend =
            SimulatedBackend::spawn(tx, Duration::from_secs(track_secs), Duration::from_secs(1));
        let session = MediaSession::new(Box::new(backend), 0.9);
        PlayerService::spawn(PlaybackController::new(session, "https://api.test"), rx)
    }

    fn track(id: &str) -> Track {
        Track::with_id(id, format!("Track {id}"))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn plays_then_advances_through_the_queue() {
        let service = simulated(2);
        let player = service.handle();

        player.play_track(track("a")).unwrap();
        player.add_to_queue(track("b")).unwrap();
        settle().await;

        let snap = player.snapshot().await.unwrap();
        assert_eq!(snap.current_track.as_ref().and_then(|t| t.id()), Some("a"));
        assert!(snap.is_playing);
        assert!(!snap.is_loading);
        assert_eq!(snap.duration, 2.0);
        assert_eq!(snap.phase, Phase::Playing);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let snap = player.snapshot().await.unwrap();
        assert_eq!(snap.current_track.as_ref().and_then(|t| t.id()), Some("b"));
        assert!(snap.queue.is_empty());
        assert!(snap.is_playing);

        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn observers_follow_state_changes() {
        let service = simulated(30);
        let player = service.handle();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = player
            .subscribe(move |s| {
                let id = s.current_track.as_ref().and_then(|t| t.id()).map(str::to_string);
                sink.lock().unwrap().push((id, s.is_playing));
            })
            .unwrap();

        player.play_track(track("a")).unwrap();
        settle().await;
        player.toggle_play().unwrap();
        settle().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&(None, false)));
        assert!(seen.contains(&(Some("a".to_string()), true)));
        assert_eq!(seen.last(), Some(&(Some("a".to_string()), false)));
    }

    #[tokio::test(start_paused = true)]
    async fn seek_and_volume_are_reflected() {
        let service = simulated(100);
        let player = service.handle();
        player.play_track(track("a")).unwrap();
        settle().await;

        player.seek(250.0).unwrap();
        player.set_volume(1.5).unwrap();
        let snap = player.snapshot().await.unwrap();
        assert_eq!(snap.position, 100.0);
        assert_eq!(snap.volume, 1.0);

        player.seek(-3.0).unwrap();
        assert_eq!(player.snapshot().await.unwrap().position, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_is_absorbed() {
        let (_tx, rx) = event_channel();
        let session = MediaSession::new(Box::new(NullBackend::new()), 0.9);
        let service = PlayerService::spawn(PlaybackController::new(session, "https://api.test"), rx);
        let player = service.handle();

        player.play_track(track("a")).unwrap();
        settle().await;

        let snap = player.snapshot().await.unwrap();
        assert!(!snap.is_playing);
        assert!(!snap.is_loading);
        assert_eq!(snap.phase, Phase::Paused);
        assert_eq!(snap.current_track.as_ref().and_then(|t| t.id()), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn handle_reports_not_mounted_after_shutdown() {
        let service = simulated(30);
        let player = service.handle();
        player.play_track(track("a")).unwrap();
        settle().await;

        player.shutdown().await.unwrap();
        assert!(!player.is_running());
        assert_eq!(player.play_track(track("b")), Err(PlayerError::NotMounted));
        assert_eq!(player.snapshot().await, Err(PlayerError::NotMounted));
        assert!(player.subscribe(|_| {}).is_err());

        let last = player.latest();
        assert!(last.current_track.is_none());
        assert_eq!(last.phase, Phase::Idle);
    }
}
