use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use subway_board::advisory::source::{MessageSource, SheetSource, spawn_feed_refresh};
use subway_board::api::{self, RenderOptions};
use subway_board::board::BoardEngine;
use subway_board::clock::SystemTimeSource;
use subway_board::config::{self, Config, RemoteTarget};
use subway_board::error::AppError;
use subway_board::runtime::{TickTask, spawn_recurring};
use subway_board::state::AppState;

fn remote_source(config: &Config) -> Result<Option<SheetSource>, AppError> {
    let Some(target) = config.remote_target()? else {
        return Ok(None);
    };
    let timeout = config.remote_timeout();
    let source = match target {
        RemoteTarget::Url(url) => SheetSource::new(&url, timeout)?,
        RemoteTarget::GoogleSheet {
            sheet_id,
            sheet_name,
        } => SheetSource::google_sheet(&sheet_id, &sheet_name, timeout)?,
    };
    Ok(Some(source))
}

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "subway-board starting"
    );

    // Incomplete schedules and unknown zones stop us here.
    let board_config = Arc::new(config.board_config()?);
    tracing::info!(
        timezone = %board_config.timezone,
        base_advisories = board_config.base_advisories.len(),
        conditional_advisories = board_config.conditional_advisories.len(),
        "Board configuration validated"
    );

    let state = Arc::new(RwLock::new(AppState::new()));

    let _feed_handle = match remote_source(&config)? {
        Some(source) => {
            let interval = config.remote_refresh_interval();
            tracing::info!(
                source = %source.describe(),
                interval_secs = interval.as_secs(),
                timeout_secs = config.remote_timeout().as_secs(),
                "Starting remote advisory refresh"
            );
            Some(spawn_feed_refresh(source, Arc::clone(&state), interval))
        }
        None => {
            tracing::info!("Remote advisories disabled, using configured messages");
            None
        }
    };

    let stop_flag = Arc::new(AtomicBool::new(false));
    let engine = BoardEngine::new(Arc::clone(&board_config));
    let clock = SystemTimeSource::new(board_config.timezone);
    let tick_task = TickTask::new(engine, clock, Arc::clone(&state), config.tick_interval());
    let _tick_handle = spawn_recurring(tick_task, Arc::clone(&stop_flag));

    let render = RenderOptions {
        zero_as_letter_o: config.zero_as_letter_o(),
    };
    let app = api::router(Arc::clone(&state), render);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    // Signal tick thread to stop
    stop_flag.store(true, Ordering::Relaxed);

    Ok(())
}
