use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use overlay_bridge_chat::{Announcer, ChatBridge, ChatTransport};
use overlay_bridge_core::store::keys;
use overlay_bridge_core::urls::{authorize_url, MODIFY_SCOPE, READ_SCOPES};
use overlay_bridge_core::{now_ms, AppConfig, FileStore, NowPlaying, QueueEntry, TypedStore};
use overlay_bridge_engine::{
    NowPlayingPoller, OverlaySelector, OverlayStyle, PollerConfig, QueueFetcher, RenderState,
    TokenManager,
};
use overlay_bridge_providers::{PlaybackApi, SpotifyClient, TokenProxyClient};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "overlay-bridge",
    about = "Spotify now playing -> overlay + chat bridge"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of the persistent key-value store.
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run,
    Status,
    /// Console chat bridge: commands on stdin, replies on stdout.
    Chat,
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    Disconnect,
    Doctor,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum AuthAction {
    /// Print the authorization URL to open in a browser.
    Url,
    /// Exchange the code from the redirect for tokens.
    Exchange { code: String },
    /// Force one token refresh.
    Refresh,
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

    let (cfg, ignored) = load_or_default(&cfg_path)?;
    init_logging(&cfg.log_level);
    for (var, value) in &ignored {
        warn!(var, value = %value, "ignoring unparsable environment override");
    }
    let store_dir = cli
        .store
        .or_else(|| cfg.store_dir.clone())
        .unwrap_or_else(default_store_dir);

    match cmd {
        Commands::Run => run(cfg, &store_dir).await,
        Commands::Status => status(&store_dir),
        Commands::Chat => chat(cfg, &store_dir).await,
        Commands::Auth { action } => auth(&cfg, &store_dir, action).await,
        Commands::Disconnect => {
            let (_, tokens) = build_clients(&cfg, open_store(&store_dir)?)?;
            tokens.disconnect().context("failed to remove credentials")?;
            println!("Disconnected.");
            Ok(())
        }
        Commands::Doctor => doctor(&cfg, &cfg_path, &store_dir).await,
        Commands::Config { .. } => Ok(()),
    }
}

async fn run(cfg: AppConfig, store_dir: &Path) -> Result<()> {
    let store = open_store(store_dir)?;
    let (api, tokens) = build_clients(&cfg, store.clone())?;
    let queue = Arc::new(QueueFetcher::new(
        Arc::clone(&api),
        Arc::clone(&tokens),
        store.clone(),
        cfg.queue_limit,
    ));
    let mut queue_rx = queue.subscribe();
    let poller = NowPlayingPoller::new(
        PollerConfig::from_app_config(&cfg),
        api,
        tokens,
        queue,
        store,
    );
    let handle = poller.spawn();
    let mut render_rx = handle.render();
    let mut status_rx = handle.status();
    let selector = OverlaySelector::from_config(&cfg.overlay);

    info!(
        store = %store_dir.display(),
        style = selector.style.name(),
        theme = selector.theme.name(),
        position = selector.position.name(),
        "overlay-bridge started"
    );

    let mut render = render_rx.borrow_and_update().clone();
    let mut upcoming = queue_rx.borrow_and_update().clone();
    draw(&selector, &render, &upcoming);

    loop {
        tokio::select! {
            changed = render_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                render = render_rx.borrow_and_update().clone();
                draw(&selector, &render, &upcoming);
            }
            changed = queue_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                upcoming = queue_rx.borrow_and_update().clone();
                if shows_queue(selector.style) {
                    draw(&selector, &render, &upcoming);
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                info!(?status, "poller status changed");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    handle.stop().await;
    Ok(())
}

fn shows_queue(style: OverlayStyle) -> bool {
    matches!(style, OverlayStyle::Queue | OverlayStyle::MediaStack | OverlayStyle::Ai)
}

fn draw(selector: &OverlaySelector, state: &RenderState, queue: &[QueueEntry]) {
    match selector.present(state, queue) {
        Some(view) => print!("{view}"),
        None => println!("(nothing playing)"),
    }
}

#[derive(Serialize)]
struct StatusReport {
    store: String,
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_expires_in_s: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    now_playing: Option<NowPlaying>,
    queue: Vec<QueueEntry>,
}

fn status(store_dir: &Path) -> Result<()> {
    let store = open_store(store_dir)?;
    let expires_at: Option<u64> = store
        .get_string(keys::TOKEN_EXPIRES_AT)?
        .and_then(|v| v.trim().parse().ok());
    let report = StatusReport {
        store: store_dir.display().to_string(),
        connected: store.get_string(keys::ACCESS_TOKEN)?.is_some(),
        token_expires_in_s: expires_at.map(|at| (at as i64 - now_ms() as i64) / 1_000),
        now_playing: store.get_json(keys::NOW_PLAYING)?,
        queue: store.get_json(keys::QUEUE)?.unwrap_or_default(),
    };
    print!("{}", toml::to_string_pretty(&report)?);
    Ok(())
}

struct ConsoleTransport;

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send(&self, message: &str) -> Result<()> {
        let mut out = tokio::io::stdout();
        out.write_all(message.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }
}

async fn chat(cfg: AppConfig, store_dir: &Path) -> Result<()> {
    let store = open_store(store_dir)?;
    let (api, _) = build_clients(&cfg, store.clone())?;
    let bridge = ChatBridge::new(store.clone(), api, cfg.chat.clone());
    let mut announcer = Announcer::new(store);
    let transport = ConsoleTransport;

    let mut announce = tokio::time::interval(Duration::from_millis(
        cfg.intervals.announce_poll_ms.max(1_000),
    ));
    announce.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!(
        channel = cfg.chat.channel.as_deref().unwrap_or("console"),
        auto_announce = cfg.chat.auto_announce,
        song_requests = cfg.chat.song_requests,
        "chat bridge started"
    );

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read chat input")? else {
                    break;
                };
                if let Err(err) = bridge.serve(&transport, &line).await {
                    warn!(error = %err, "failed to send chat reply");
                }
            }
            _ = announce.tick(), if cfg.chat.auto_announce => {
                if let Some(message) = announcer.check() {
                    if let Err(err) = transport.send(&message).await {
                        warn!(error = %err, "failed to send announcement");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }
    Ok(())
}

async fn auth(cfg: &AppConfig, store_dir: &Path, action: AuthAction) -> Result<()> {
    match action {
        AuthAction::Url => {
            let mut scopes = READ_SCOPES.to_vec();
            if cfg.chat.song_requests {
                scopes.push(MODIFY_SCOPE);
            }
            let state: [u8; 16] = rand::random();
            let state: String = state.iter().map(|b| format!("{b:02x}")).collect();
            let url = authorize_url(
                &cfg.spotify.accounts_base,
                &cfg.spotify.client_id,
                &cfg.spotify.redirect_uri,
                &scopes,
                &state,
            )
            .context("invalid accounts_base in config")?;
            println!("{url}");
            Ok(())
        }
        AuthAction::Exchange { code } => {
            let (_, tokens) = build_clients(cfg, open_store(store_dir)?)?;
            let creds = tokens
                .authorize(code.trim())
                .await
                .context("authorization code exchange failed")?;
            match creds.expires_at {
                Some(at) => println!(
                    "Connected. Access token valid for {}s.",
                    at.saturating_sub(now_ms()) / 1_000
                ),
                None => println!("Connected."),
            }
            Ok(())
        }
        AuthAction::Refresh => {
            let (_, tokens) = build_clients(cfg, open_store(store_dir)?)?;
            match tokens.refresh().await {
                Ok(_) => {
                    println!("Access token refreshed.");
                    Ok(())
                }
                Err(err) if err.requires_reauthorization() => {
                    bail!("{err}; run `overlay-bridge auth url` to connect again")
                }
                Err(err) => Err(err).context("token refresh failed"),
            }
        }
    }
}

async fn doctor(cfg: &AppConfig, cfg_path: &Path, store_dir: &Path) -> Result<()> {
    println!("== overlay-bridge doctor ==");
    println!(
        "Config: {} ({})",
        cfg_path.display(),
        if cfg_path.exists() { "found" } else { "defaults" }
    );
    if cfg.spotify.client_id == AppConfig::default().spotify.client_id {
        println!("Spotify client id: not configured (set OVERLAY_BRIDGE_CLIENT_ID)");
    }
    println!(
        "Overlay: style={} theme={} position={}",
        cfg.overlay.style, cfg.overlay.theme, cfg.overlay.position
    );

    let store = match open_store(store_dir) {
        Ok(store) => {
            println!("Store: {} (writable)", store_dir.display());
            store
        }
        Err(err) => {
            println!("Store: {} ({err:#})", store_dir.display());
            return Ok(());
        }
    };

    let (api, tokens) = build_clients(cfg, store)?;
    let Some(token) = tokens.access_token() else {
        println!("Spotify: not connected");
        return Ok(());
    };
    match api.currently_playing(&token).await {
        Ok(Some(snapshot)) => match snapshot.item {
            Some(track) => println!(
                "Spotify: connected, {} {} - {}",
                if snapshot.is_playing { "playing" } else { "paused" },
                track.artists.join(", "),
                track.name
            ),
            None => println!("Spotify: connected, no track item"),
        },
        Ok(None) => println!("Spotify: connected, no active playback session"),
        Err(err) if err.is_token_expired() => {
            println!("Spotify: access token expired (run `overlay-bridge auth refresh`)")
        }
        Err(err) => println!("Spotify: request failed: {err}"),
    }
    Ok(())
}

fn build_clients(
    cfg: &AppConfig,
    store: TypedStore,
) -> Result<(Arc<dyn PlaybackApi>, Arc<TokenManager>)> {
    let timeout = Duration::from_millis(cfg.intervals.request_timeout_ms);
    let api = SpotifyClient::new(cfg.spotify.api_base.clone(), timeout)
        .context("failed to build playback client")?;
    let endpoint = TokenProxyClient::new(
        cfg.spotify.refresh_url.clone(),
        cfg.spotify.exchange_url.clone(),
        timeout,
    )
    .context("failed to build token client")?;
    let tokens = TokenManager::new(store, Arc::new(endpoint));
    Ok((Arc::new(api), Arc::new(tokens)))
}

fn open_store(dir: &Path) -> Result<TypedStore> {
    let store = FileStore::open(dir)
        .with_context(|| format!("failed to open store at {}", dir.display()))?;
    Ok(TypedStore::new(Arc::new(store)))
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("overlay-bridge").join("config.toml")
}

fn default_store_dir() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("overlay-bridge").join("store")
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

/// Also returns the environment overrides that were set but could not be
/// parsed, so they can be reported once logging is up.
fn load_or_default(path: &Path) -> Result<(AppConfig, Vec<(&'static str, String)>)> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    let ignored = apply_env_overrides(&mut cfg, env_value);
    Ok((cfg, ignored))
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn apply_env_overrides(
    cfg: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<(&'static str, String)> {
    let mut ignored = Vec::new();
    if let Some(v) = lookup("OVERLAY_BRIDGE_LOG_LEVEL") {
        cfg.log_level = v;
    }
    if let Some(v) = lookup("OVERLAY_BRIDGE_CLIENT_ID") {
        cfg.spotify.client_id = v;
    }
    if let Some(v) = lookup("OVERLAY_BRIDGE_STORE_DIR") {
        cfg.store_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("OVERLAY_BRIDGE_POLL_MS") {
        match v.trim().parse::<u64>() {
            Ok(ms) => cfg.intervals.poll_ms = ms,
            Err(_) => ignored.push(("OVERLAY_BRIDGE_POLL_MS", v)),
        }
    }
    if let Some(v) = lookup("OVERLAY_BRIDGE_STYLE") {
        cfg.overlay.style = v;
    }
    if let Some(v) = lookup("OVERLAY_BRIDGE_THEME") {
        cfg.overlay.theme = v;
    }
    ignored
}
