//! rbridge - R analysis backend supervisor and upload proxy
//!
//! Launches an R Plumber API as a child process, proxies dataset uploads
//! from the browser client to it, and optionally asks Gemini for insights
//! on the backend's summary.
//!
//! Exit codes:
//!   0 - Clean shutdown
//!   1 - Startup error (invalid arguments, config, bind failure)

mod backend;
mod cli;
mod config;
mod error;
mod gemini;
mod routes;

use anyhow::{Context, Result};
use backend::Supervisor;
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use routes::AppState;
use axum::Router;
use std::future::{Future, IntoFuture};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How long in-flight requests may keep running after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("rbridge v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", redacted(&args));

    if let Err(e) = run(args).await {
        error!("Startup failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .rbridge.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE_NAME);
        std::process::exit(1);
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Set GOOGLE_API_KEY in the environment to enable AI insights.");
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` directives,
/// when set, refine the level chosen on the command line.
fn init_logging(args: &Args) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(args.log_level(), directives.as_deref());

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn log_filter(level: Level, directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .parse_lossy(directives.unwrap_or_default())
}

/// Args for debug logging, without the API key.
fn redacted(args: &Args) -> Args {
    let mut args = args.clone();
    if args.api_key.is_some() {
        args.api_key = Some("<redacted>".to_string());
    }
    args
}

/// Start the backend, serve until a shutdown signal, then stop the backend.
async fn run(args: Args) -> Result<()> {
    let workdir = match args.workdir {
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to resolve working directory")?,
    };

    let mut config = load_config(&args, &workdir)?;
    config.merge_with_args(&args);

    // Handlers are registered before the backend starts so a signal during
    // the startup wait still stops the child.
    let mut shutdown = Box::pin(shutdown_signal()?);

    // Dropping the supervisor stops the child, so an early return below
    // still tears the backend down.
    let mut supervisor = Supervisor::new(&config.backend, workdir.clone());
    if config.backend.launch {
        tokio::select! {
            _ = supervisor.start() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested during backend startup");
                supervisor.stop();
                return Ok(());
            }
        }
    } else {
        info!(
            "Backend launch disabled; expecting R backend at {}",
            config.backend.base_url()
        );
    }

    let state = AppState::from_config(&config, &workdir)?;
    match state.gemini {
        Some(ref gemini) => info!("🤖 Gemini insights enabled ({})", gemini.model()),
        None => warn!("GOOGLE_API_KEY not set; AI insights disabled"),
    }
    let app = routes::router(Arc::new(state));

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;

    println!(
        "🦀 rbridge running on http://{}",
        listener.local_addr().context("Failed to read bound address")?
    );

    let served = serve_until(listener, app, shutdown, SHUTDOWN_GRACE).await;

    info!("Exiting...");
    supervisor.stop();

    served.context("HTTP server error")
}

/// Serve `app` until `shutdown` resolves, then give in-flight requests at
/// most `grace` to finish.
async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    grace: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (fired_tx, fired_rx) = tokio::sync::oneshot::channel::<()>();
    let signal = async move {
        shutdown.await;
        let _ = fired_tx.send(());
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .into_future();

    let drain_deadline = async move {
        // The sender only drops unsent once the server has already returned.
        if fired_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        served = server => served,
        _ = drain_deadline => {
            warn!(
                "In-flight requests still running after {:?}; shutting down anyway",
                grace
            );
            Ok(())
        }
    }
}

/// Registers Ctrl+C and, on Unix, SIGTERM handlers immediately. The returned
/// future resolves when either arrives.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to listen for Ctrl+C")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("Shutdown initiated (Ctrl+C received)"),
            _ = terminate.recv() => info!("Shutdown initiated (SIGTERM received)"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c().context("Failed to listen for Ctrl+C")?;

    Ok(async move {
        ctrl_c.recv().await;
        info!("Shutdown initiated (Ctrl+C received)");
    })
}

/// Load configuration from the explicit path, the default file, or defaults.
fn load_config(args: &Args, workdir: &Path) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default(workdir) {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::time::Instant;

    async fn hanging_server() -> (TcpListener, Router, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/slow", listener.local_addr().unwrap());
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        (listener, app, url)
    }

    #[tokio::test]
    async fn test_serve_until_bounds_drain_of_hung_request() {
        let (listener, app, url) = hanging_server().await;
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve_until(
            listener,
            app,
            async {
                let _ = stop_rx.await;
            },
            Duration::from_millis(300),
        ));

        let request = tokio::spawn(async move {
            reqwest::Client::builder()
                .no_proxy()
                .build()
                .unwrap()
                .get(url)
                .send()
                .await
        });
        // Let the request reach the handler.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let signalled = Instant::now();
        stop_tx.send(()).unwrap();
        let served = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server kept draining past the grace period")
            .unwrap();

        assert!(served.is_ok());
        assert!(signalled.elapsed() < Duration::from_secs(2));
        request.abort();
    }

    #[tokio::test]
    async fn test_serve_until_returns_promptly_when_idle() {
        let (listener, app, _) = hanging_server().await;
        let started = Instant::now();
        let served = serve_until(listener, app, async {}, Duration::from_secs(10)).await;

        assert!(served.is_ok());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_log_filter_uses_cli_level_by_default() {
        let filter = log_filter(Level::WARN, None);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_log_filter_honours_directives() {
        let filter = log_filter(Level::WARN, Some("debug"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
