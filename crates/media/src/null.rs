use crate::{resolved, MediaBackend, PlayError, PlayRequest};

/// Backend for machines without an output device: sources are accepted, playback never starts.
#[derive(Debug, Default)]
pub struct NullBackend {
    source: Option<u64>,
    position: f64,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn set_source(&mut self, source_id: u64, url: Option<&str>) {
        self.source = url.map(|_| source_id);
        self.position = 0.0;
    }

    fn play(&mut self) -> PlayRequest {
        if self.source.is_none() {
            return resolved(Err(PlayError::NoSource));
        }
        resolved(Err(PlayError::NoOutput))
    }

    fn pause(&mut self) {}

    fn is_paused(&self) -> bool {
        true
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.position = seconds;
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn set_volume(&mut self, _volume: f64) {}
}
