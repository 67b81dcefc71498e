use crate::{build_session, catalog_client, library_store, print_tracks};
use anyhow::{Context, Result};
use ocean_player_catalog::{fetch_many, AudiusClient, Catalog, SavedTracks, TrendingWindow};
use ocean_player_core::{format_time, AppConfig, Track};
use ocean_player_engine::{PlaybackController, PlayerHandle, PlayerService, Snapshot};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const SKIP_SECS: f64 = 10.0;

const HELP: &str = "\
commands:
  play <id> | play #<n>   start a track (n = number from the last listing)
  queue <id> | queue #<n> add a track to the queue
  next                    play the next queued track
  p | toggle              play / pause
  seek <secs>             jump to a position
  ff | rw                 skip 10s forward / back
  vol <0..1>              set volume
  clear                   empty the queue
  status                  show what is playing
  trending [window]       week, month, year or allTime
  search <query>          search the catalog
  save [<id> | #<n>]      save or unsave a track (default: current)
  library                 list saved tracks
  help                    this text
  quit                    exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Id(String),
    Listed(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Play(Target),
    Queue(Target),
    Next,
    Toggle,
    Seek(f64),
    Skip(f64),
    Volume(f64),
    Clear,
    Status,
    Trending(TrendingWindow),
    Search(String),
    Save(Option<Target>),
    Library,
    Help,
    Quit,
}

fn parse_target(arg: &str) -> Result<Target, String> {
    if let Some(n) = arg.strip_prefix('#') {
        return match n.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Target::Listed(n)),
            _ => Err(format!("not a listing number: {arg}")),
        };
    }
    Ok(Target::Id(arg.to_string()))
}

fn parse_number(arg: &str, what: &str) -> Result<f64, String> {
    arg.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("{what} must be a number, got {arg:?}"))
}

/// `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match (word.to_ascii_lowercase().as_str(), rest) {
        ("play", "") | ("queue", "") => return Err(format!("usage: {word} <id> | {word} #<n>")),
        ("play", arg) => Input::Play(parse_target(arg)?),
        ("queue", arg) => Input::Queue(parse_target(arg)?),
        ("next", _) => Input::Next,
        ("p" | "toggle" | "pause", _) => Input::Toggle,
        ("seek", arg) => Input::Seek(parse_number(arg, "seek position")?),
        ("ff", _) => Input::Skip(SKIP_SECS),
        ("rw", _) => Input::Skip(-SKIP_SECS),
        ("vol" | "volume", arg) => Input::Volume(parse_number(arg, "volume")?),
        ("clear", _) => Input::Clear,
        ("status", _) => Input::Status,
        ("trending", "") => Input::Trending(TrendingWindow::default()),
        ("trending", arg) => Input::Trending(
            TrendingWindow::parse(arg).ok_or_else(|| format!("unknown trending window {arg:?}"))?,
        ),
        ("search", "") => return Err("usage: search <query>".to_string()),
        ("search", query) => Input::Search(query.to_string()),
        ("save", "") => Input::Save(None),
        ("save", arg) => Input::Save(Some(parse_target(arg)?)),
        ("library", _) => Input::Library,
        ("help" | "?", _) => Input::Help,
        ("quit" | "exit" | "q", _) => Input::Quit,
        _ => return Err(format!("unknown command {word:?}; type `help`")),
    };
    Ok(Some(input))
}

/// `▶ Title — Artist  1:05 / 3:20`
pub fn now_playing_line(snap: &Snapshot) -> Option<String> {
    let track = snap.current_track.as_ref()?;
    let marker = if snap.is_playing { "▶" } else { "⏸" };
    Some(format!(
        "{marker} {} — {}  {} / {}",
        track.title_or_default(),
        track.artist_name().unwrap_or("Unknown artist"),
        format_time(snap.position),
        format_time(snap.duration)
    ))
}

type NowPlayingKey = (Option<String>, bool);

fn now_playing_key(snap: &Snapshot) -> NowPlayingKey {
    (
        snap.current_track
            .as_ref()
            .and_then(|t| t.id())
            .map(str::to_string),
        snap.is_playing,
    )
}

/// Prints a line whenever the track or the play state changes, not on every tick.
fn now_playing_printer() -> impl Fn(&Arc<Snapshot>) + Send + Sync + 'static {
    let last: Mutex<Option<NowPlayingKey>> = Mutex::new(None);
    move |snap: &Arc<Snapshot>| {
        let key = now_playing_key(snap);
        let mut last = last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if last.as_ref() == Some(&key) {
            return;
        }
        *last = Some(key);
        if let Some(line) = now_playing_line(snap) {
            println!("{line}");
        }
    }
}

struct Repl {
    player: PlayerHandle,
    catalog: AudiusClient,
    store: SavedTracks,
    listing: Vec<Track>,
    trending_limit: u32,
    search_limit: u32,
    library_cap: usize,
}

impl Repl {
    async fn resolve(&self, target: Target) -> Result<Option<Track>> {
        match target {
            Target::Listed(n) => {
                let track = self.listing.get(n - 1).cloned();
                if track.is_none() {
                    println!("No entry #{n} in the last listing.");
                }
                Ok(track)
            }
            Target::Id(id) => {
                if let Some(track) = self.listing.iter().find(|t| t.id() == Some(id.as_str())) {
                    return Ok(Some(track.clone()));
                }
                let track = self.catalog.fetch_by_id(&id).await?;
                if track.is_none() {
                    println!("Track {id} not found.");
                }
                Ok(track)
            }
        }
    }

    fn show_listing(&mut self, tracks: Vec<Track>) {
        if tracks.is_empty() {
            println!("No results.");
        }
        print_tracks(&tracks);
        self.listing = tracks;
    }

    async fn execute(&mut self, input: Input) -> Result<()> {
        match input {
            Input::Play(target) => {
                if let Some(track) = self.resolve(target).await? {
                    self.player.play_track(track)?;
                }
            }
            Input::Queue(target) => {
                if let Some(track) = self.resolve(target).await? {
                    println!("Queued {}", track.title_or_default());
                    self.player.add_to_queue(track)?;
                }
            }
            Input::Next => {
                if self.player.snapshot().await?.queue.is_empty() {
                    println!("Queue is empty.");
                }
                self.player.play_next()?;
            }
            Input::Toggle => self.player.toggle_play()?,
            Input::Seek(secs) => self.player.seek(secs)?,
            Input::Skip(delta) => {
                let position = self.player.snapshot().await?.position;
                self.player.seek(position + delta)?;
            }
            Input::Volume(volume) => self.player.set_volume(volume)?,
            Input::Clear => self.player.clear_queue()?,
            Input::Status => print_status(&self.player.snapshot().await?),
            Input::Trending(window) => {
                let tracks = self
                    .catalog
                    .fetch_trending(self.trending_limit, 0, window)
                    .await?;
                self.show_listing(tracks);
            }
            Input::Search(query) => {
                let tracks = self.catalog.search(&query, self.search_limit, 0).await?;
                self.show_listing(tracks);
            }
            Input::Save(target) => {
                let track = match target {
                    Some(target) => self.resolve(target).await?,
                    None => self.player.snapshot().await?.current_track,
                };
                let Some(id) = track.as_ref().and_then(|t| t.id()) else {
                    println!("Nothing to save.");
                    return Ok(());
                };
                if self.store.toggle(id) {
                    println!("Saved {id}");
                } else {
                    println!("Removed {id}");
                }
            }
            Input::Library => {
                let ids = self.store.load();
                println!("{} saved", ids.len());
                let tracks = fetch_many(&self.catalog, &ids, self.library_cap).await?;
                self.show_listing(tracks);
            }
            Input::Help => println!("{HELP}"),
            Input::Quit => {}
        }
        Ok(())
    }
}

fn print_status(snap: &Snapshot) {
    match now_playing_line(snap) {
        Some(line) => println!("{line}  ({:.0}%)", snap.progress_pct),
        None => println!("Nothing playing."),
    }
    println!(
        "state: {:?}{}  volume: {:.0}%",
        snap.phase,
        if snap.is_loading { " (loading)" } else { "" },
        snap.volume * 100.0
    );
    if snap.queue.is_empty() {
        println!("queue: empty");
    } else {
        println!("queue:");
        print_tracks(&snap.queue);
    }
}

pub async fn run(cfg: AppConfig) -> Result<()> {
    let catalog = catalog_client(&cfg)?;
    let (events_tx, events_rx) = ocean_player_media::event_channel();
    let session = build_session(&cfg.player, events_tx)?;
    let controller = PlaybackController::new(session, catalog.api_base());
    let service = PlayerService::spawn(controller, events_rx);
    let player = service.handle();
    let _now_playing = player.subscribe(now_playing_printer())?;

    info!(catalog = %cfg.api_base, backend = ?cfg.player.backend, "ocean-player started");
    println!("ocean-player ready. Type `help` for commands.");

    let mut repl = Repl {
        player,
        catalog,
        store: library_store(&cfg),
        listing: Vec::new(),
        trending_limit: cfg.catalog.trending_limit,
        search_limit: cfg.catalog.search_limit,
        library_cap: cfg.catalog.library_fetch_cap,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(input)) => {
                        if let Err(err) = repl.execute(input).await {
                            warn!(error = %err, "command failed");
                            println!("error: {err:#}");
                        }
                    }
                    Err(msg) => println!("{msg}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{now_playing_line, parse, Input, Target};
    use ocean_player_catalog::TrendingWindow;
    use ocean_player_core::Track;
    use ocean_player_engine::Snapshot;

    #[test]
    fn parses_transport_commands() {
        assert_eq!(parse("  "), Ok(None));
        assert_eq!(parse("play D7KyD"), Ok(Some(Input::Play(Target::Id("D7KyD".into())))));
        assert_eq!(parse("queue #3"), Ok(Some(Input::Queue(Target::Listed(3)))));
        assert_eq!(parse("P"), Ok(Some(Input::Toggle)));
        assert_eq!(parse("seek 42.5"), Ok(Some(Input::Seek(42.5))));
        assert_eq!(parse("rw"), Ok(Some(Input::Skip(-10.0))));
        assert_eq!(parse("vol 0.3"), Ok(Some(Input::Volume(0.3))));
        assert_eq!(parse("quit"), Ok(Some(Input::Quit)));
    }

    #[test]
    fn parses_catalog_commands() {
        assert_eq!(
            parse("trending allTime"),
            Ok(Some(Input::Trending(TrendingWindow::AllTime)))
        );
        assert_eq!(parse("trending"), Ok(Some(Input::Trending(TrendingWindow::Week))));
        assert_eq!(
            parse("search  daft   punk "),
            Ok(Some(Input::Search("daft   punk".into())))
        );
        assert_eq!(parse("save"), Ok(Some(Input::Save(None))));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("play").is_err());
        assert!(parse("play #0").is_err());
        assert!(parse("seek soon").is_err());
        assert!(parse("vol NaN").is_err());
        assert!(parse("trending decade").is_err());
        assert!(parse("dance").is_err());
    }

    #[test]
    fn now_playing_line_formats_clock() {
        assert_eq!(now_playing_line(&Snapshot::default()), None);

        let snap = Snapshot {
            current_track: Some(Track::with_id("a", "Tidal")),
            is_playing: true,
            position: 65.0,
            duration: 200.0,
            ..Snapshot::default()
        };
        assert_eq!(
            now_playing_line(&snap).as_deref(),
            Some("▶ Tidal — Unknown artist  1:05 / 3:20")
        );
    }
}
