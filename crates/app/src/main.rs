use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ocean_player_catalog::{fetch_many, AudiusClient, Catalog, SavedTracks, TrendingWindow};
use ocean_player_core::{format_time, AppConfig, BackendKind, PlayerConfig, Track};
use ocean_player_media::{EventSender, MediaBackend, MediaSession, NullBackend, SimulatedBackend};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod repl;

#[derive(Parser, Debug)]
#[command(
    name = "ocean-player",
    about = "Stream trending and searched Audius tracks from the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive player reading commands from stdin.
    Run,
    Trending {
        /// week, month, year or allTime.
        #[arg(long, default_value = "week")]
        window: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    Search {
        #[arg(required = true)]
        query: Vec<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    Track {
        id: String,
    },
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    Doctor,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum LibraryAction {
    List,
    /// Append ids that are not saved yet.
    Add {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Toggle { id: String },
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run);
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    if let Commands::Config {
        action: ConfigAction::Init,
    } = cmd
    {
        init_config(&cfg_path)?;
        println!("Initialized config at {}", cfg_path.display());
        return Ok(());
    }

    let cfg = load_or_default(&cfg_path)?;
    init_logging(&cfg.log_level);

    match cmd {
        Commands::Run => repl::run(cfg).await,
        Commands::Trending {
            window,
            limit,
            offset,
        } => {
            let Some(window) = TrendingWindow::parse(&window) else {
                bail!("unknown trending window {window:?}; use week, month, year or allTime");
            };
            let catalog = catalog_client(&cfg)?;
            let limit = limit.unwrap_or(cfg.catalog.trending_limit);
            let tracks = catalog.fetch_trending(limit, offset, window).await?;
            print_tracks(&tracks);
            Ok(())
        }
        Commands::Search {
            query,
            limit,
            offset,
        } => {
            let catalog = catalog_client(&cfg)?;
            let limit = limit.unwrap_or(cfg.catalog.search_limit);
            let tracks = catalog.search(&query.join(" "), limit, offset).await?;
            if tracks.is_empty() {
                println!("No results.");
            }
            print_tracks(&tracks);
            Ok(())
        }
        Commands::Track { id } => {
            let catalog = catalog_client(&cfg)?;
            match catalog.fetch_by_id(&id).await? {
                Some(track) => print_track_details(&track, &catalog, &library_store(&cfg)),
                None => println!("Track not found."),
            }
            Ok(())
        }
        Commands::Library { action } => library(&cfg, action).await,
        Commands::Doctor => doctor(&cfg, &cfg_path).await,
        Commands::Config { .. } => Ok(()),
    }
}

async fn library(cfg: &AppConfig, action: LibraryAction) -> Result<()> {
    let store = library_store(cfg);
    match action {
        LibraryAction::List => {
            let ids = store.load();
            println!("{} saved", ids.len());
            if ids.is_empty() {
                println!("Your library is empty. Save tracks with `library toggle <id>` or `save` in the player.");
                return Ok(());
            }
            let catalog = catalog_client(cfg)?;
            let tracks = fetch_many(&catalog, &ids, cfg.catalog.library_fetch_cap)
                .await
                .context("failed to load library")?;
            print_tracks(&tracks);
        }
        LibraryAction::Add { ids } => {
            let saved = store.add(ids);
            println!("{} saved", saved.len());
        }
        LibraryAction::Toggle { id } => {
            if store.toggle(&id) {
                println!("Saved {id}");
            } else {
                println!("Removed {id}");
            }
        }
        LibraryAction::Clear => {
            store.clear();
            println!("Library cleared");
        }
    }
    Ok(())
}

async fn doctor(cfg: &AppConfig, cfg_path: &Path) -> Result<()> {
    println!("== ocean-player doctor ==");
    println!(
        "Config: {} ({})",
        cfg_path.display(),
        if cfg_path.exists() { "found" } else { "defaults" }
    );
    println!("Catalog: {}", cfg.api_base);

    match catalog_client(cfg) {
        Ok(catalog) => match catalog.fetch_trending(1, 0, TrendingWindow::Week).await {
            Ok(_) => println!("Catalog reachable: yes"),
            Err(err) => println!("Catalog reachable: no ({err})"),
        },
        Err(err) => println!("Catalog client: {err:#}"),
    }

    let (events, _rx) = ocean_player_media::event_channel();
    match build_backend(&cfg.player, events) {
        Ok(backend) => println!("Playback backend: {}", backend.name()),
        Err(err) => println!("Playback backend: unavailable ({err:#})"),
    }

    let store = library_store(cfg);
    println!(
        "Library: {} ({} saved)",
        store.path().display(),
        store.load().len()
    );

    Ok(())
}

fn catalog_client(cfg: &AppConfig) -> Result<AudiusClient> {
    AudiusClient::new(
        &cfg.api_base,
        Duration::from_millis(cfg.catalog.request_timeout_ms),
    )
    .context("failed to build catalog client")
}

fn library_store(cfg: &AppConfig) -> SavedTracks {
    let base = cfg
        .library
        .data_dir
        .clone()
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    SavedTracks::in_dir(&base)
}

fn build_backend(cfg: &PlayerConfig, events: EventSender) -> Result<Box<dyn MediaBackend>> {
    let tick = Duration::from_millis(cfg.tick_ms.max(10));
    let backend: Box<dyn MediaBackend> = match cfg.backend {
        BackendKind::Simulated => Box::new(SimulatedBackend::spawn(
            events,
            Duration::from_secs(cfg.simulated_track_secs),
            tick,
        )),
        BackendKind::Null => Box::new(NullBackend::new()),
        BackendKind::Rodio => rodio_backend(events, tick)?,
    };
    Ok(backend)
}

#[cfg(feature = "audio")]
fn rodio_backend(events: EventSender, tick: Duration) -> Result<Box<dyn MediaBackend>> {
    let backend = ocean_player_media::RodioBackend::spawn(events, tick)
        .context("failed to open the default audio output")?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "audio"))]
fn rodio_backend(_events: EventSender, _tick: Duration) -> Result<Box<dyn MediaBackend>> {
    bail!("built without audio output; rebuild with `--features audio` or set player.backend = \"simulated\"")
}

fn build_session(cfg: &PlayerConfig, events: EventSender) -> Result<MediaSession> {
    let backend = build_backend(cfg, events)?;
    Ok(MediaSession::new(backend, cfg.initial_volume))
}

fn track_line(track: &Track) -> String {
    let duration = track
        .duration
        .map(|secs| format_time(secs as f64))
        .unwrap_or_else(|| "-:--".to_string());
    format!(
        "{} — {}  [{}]  ({})",
        track.title_or_default(),
        track.artist_name().unwrap_or("Unknown artist"),
        duration,
        track.id().unwrap_or("no id")
    )
}

fn print_tracks(tracks: &[Track]) {
    for (index, track) in tracks.iter().enumerate() {
        println!("{:>3}. {}", index + 1, track_line(track));
    }
}

fn print_track_details(track: &Track, catalog: &dyn Catalog, store: &SavedTracks) {
    println!("{}", track_line(track));
    if let Some(genre) = track.genre.as_deref().filter(|g| !g.is_empty()) {
        println!("genre: {genre}");
    }
    if let Some(plays) = track.play_count {
        println!("plays: {plays}");
    }
    if let Some(favorites) = track.favorite_count {
        println!("favorites: {favorites}");
    }
    if let Some(art) = track.artwork_url(ocean_player_core::ArtworkSize::Medium) {
        println!("artwork: {art}");
    }
    if let Some(id) = track.id() {
        println!("stream: {}", catalog.stream_url(id));
        println!("saved: {}", if store.contains(id) { "yes" } else { "no" });
    }
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("ocean-player").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // stdout belongs to the interactive player.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("OCEAN_PLAYER_API_BASE") {
        if !v.trim().is_empty() {
            cfg.api_base = v.trim().to_string();
        }
    }
    if let Some(v) = lookup("OCEAN_PLAYER_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
    if let Some(v) = lookup("OCEAN_PLAYER_BACKEND") {
        if let Some(kind) = BackendKind::parse(&v) {
            cfg.player.backend = kind;
        }
    }
    if let Some(v) = lookup("OCEAN_PLAYER_VOLUME") {
        if let Ok(parsed) = v.trim().parse::<f64>() {
            cfg.player.initial_volume = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_overrides, init_config, load_or_default, track_line};
    use ocean_player_core::{AppConfig, BackendKind, Track};
    use std::collections::HashMap;

    #[test]
    fn overrides_apply_only_valid_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OCEAN_PLAYER_API_BASE", " https://node.example/ "),
            ("OCEAN_PLAYER_LOG_LEVEL", "  "),
            ("OCEAN_PLAYER_BACKEND", "null"),
            ("OCEAN_PLAYER_VOLUME", "loud"),
        ]);
        let mut cfg = AppConfig::default();
        apply_overrides(&mut cfg, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.api_base, "https://node.example/");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.player.backend, BackendKind::Null);
        assert_eq!(cfg.player.initial_volume, 0.9);
    }

    #[test]
    fn config_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(load_or_default(&path).is_ok());

        init_config(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("api_base"));

        std::fs::write(&path, "log_level = [").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn track_line_tolerates_sparse_tracks() {
        let mut track = Track::with_id("D7KyD", "Tidal");
        track.duration = Some(212);
        assert_eq!(track_line(&track), "Tidal — Unknown artist  [3:32]  (D7KyD)");
        assert_eq!(
            track_line(&Track::default()),
            "Untitled — Unknown artist  [-:--]  (no id)"
        );
    }
}
