use crate::audio_thread::{self, lock, AudioCmd, AudioThread, Fetcher, Output, StatusHandle, Voice};
use crate::{resolved, EventSender, MediaBackend, PlayError, PlayRequest};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use std::io::Cursor;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;

/// Real audio output. A dedicated thread owns the rodio stream and sink; the
/// stream URL is downloaded on a helper thread (redirects are followed by reqwest).
pub struct RodioBackend {
    tx: Sender<AudioCmd>,
    status: StatusHandle,
    join: Option<JoinHandle<()>>,
}

impl RodioBackend {
    pub fn spawn(events: EventSender, tick: Duration) -> Result<Self, PlayError> {
        let (tx, rx) = mpsc::channel::<AudioCmd>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), PlayError>>();
        let status = audio_thread::new_status();

        let thread_tx = tx.clone();
        let thread_status = status.clone();
        let join = thread::Builder::new()
            .name("ocean-audio".to_string())
            .spawn(move || {
                let mut stream = match OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(PlayError::Source(err.to_string())));
                        return;
                    }
                };
                // rodio prints to stderr when the stream drops; that would garble the terminal.
                stream.log_on_drop(false);
                let _ = ready_tx.send(Ok(()));
                let fetcher: Fetcher = Arc::new(fetch);
                AudioThread::new(RodioOutput { stream }, thread_tx, thread_status, events, fetcher).run(rx, tick);
            })
            .map_err(|err| PlayError::Source(err.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                tx,
                status,
                join: Some(join),
            }),
            Ok(Err(err)) => {
                let _ = join.join();
                Err(err)
            }
            Err(_) => Err(PlayError::NoOutput),
        }
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        let _ = self.tx.send(AudioCmd::Quit);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl MediaBackend for RodioBackend {
    fn name(&self) -> &'static str {
        "rodio"
    }

    fn set_source(&mut self, source_id: u64, url: Option<&str>) {
        {
            let mut status = lock(&self.status);
            status.has_source = url.is_some();
            status.paused = true;
            status.duration = None;
        }
        let _ = self.tx.send(AudioCmd::Load {
            source_id,
            url: url.map(str::to_string),
        });
    }

    fn play(&mut self) -> PlayRequest {
        {
            let mut status = lock(&self.status);
            if !status.has_source {
                return resolved(Err(PlayError::NoSource));
            }
            status.paused = false;
        }
        let (reply, rx) = oneshot::channel();
        if self.tx.send(AudioCmd::Play(reply)).is_err() {
            lock(&self.status).paused = true;
            return resolved(Err(PlayError::NoOutput));
        }
        rx
    }

    fn pause(&mut self) {
        lock(&self.status).paused = true;
        let _ = self.tx.send(AudioCmd::Pause);
    }

    fn is_paused(&self) -> bool {
        lock(&self.status).paused
    }

    fn set_current_time(&mut self, seconds: f64) {
        let _ = self.tx.send(AudioCmd::Seek(seconds));
    }

    fn duration(&self) -> Option<f64> {
        lock(&self.status).duration
    }

    fn set_volume(&mut self, volume: f64) {
        let _ = self.tx.send(AudioCmd::Volume(volume as f32));
    }
}

struct RodioOutput {
    stream: OutputStream,
}

impl Output for RodioOutput {
    type Voice = Sink;

    fn open(&mut self, bytes: &Arc<Vec<u8>>, volume: f32) -> Result<(Sink, Option<f64>), String> {
        let decoder = Decoder::new(Cursor::new(bytes.as_ref().clone()))
            .map_err(|err| format!("failed to decode stream: {err}"))?;
        let duration = decoder.total_duration().map(|d| d.as_secs_f64());

        let sink = Sink::connect_new(self.stream.mixer());
        sink.set_volume(volume);
        sink.append(decoder);
        sink.pause();
        Ok((sink, duration))
    }
}

impl Voice for Sink {
    fn play(&self) {
        Sink::play(self);
    }

    fn pause(&self) {
        Sink::pause(self);
    }

    fn is_paused(&self) -> bool {
        Sink::is_paused(self)
    }

    fn stop(&self) {
        Sink::stop(self);
    }

    fn empty(&self) -> bool {
        Sink::empty(self)
    }

    fn position(&self) -> Duration {
        self.get_pos()
    }

    fn try_seek(&self, target: Duration) -> Result<(), String> {
        Sink::try_seek(self, target).map_err(|err| err.to_string())
    }

    fn set_volume(&self, volume: f32) {
        Sink::set_volume(self, volume);
    }
}

fn fetch(url: &str) -> Result<Vec<u8>, String> {
    let response = reqwest::blocking::get(url).map_err(|err| err.to_string())?;
    let response = response.error_for_status().map_err(|err| err.to_string())?;
    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|err| err.to_string())
}
