use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use graphscene::{
    CameraSnapshot, EngineCommand, ForegroundOptions, GraphTile, SceneEngine, SceneEvent, SceneStats,
};
use notify::{Event, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tower_http::services::ServeDir;
use tracing::{debug, warn};

/// Engine clock resolution
const TICK: Duration = Duration::from_millis(16);

/// Minimum gap between PNG writes (~30 Hz)
const WRITE_INTERVAL: Duration = Duration::from_millis(33);

/// Scene events kept for `GET /events`
const EVENT_BACKLOG: usize = 256;

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>graphscene</title></head>
<body style="margin:0;background:#0b0b10">
<img id="frame" src="frame.png" alt="scene">
<script>
setInterval(() => {
  document.getElementById("frame").src = "frame.png?t=" + Date.now();
}, 100);
</script>
</body>
</html>
"#;

type SharedEngine = Arc<Mutex<Box<dyn SceneEngine>>>;

#[derive(Clone)]
struct AppState {
    engine: SharedEngine,
    events: Arc<Mutex<VecDeque<SceneEvent>>>,
}

#[derive(Debug, Serialize)]
struct CommandReply {
    applied: bool,
}

async fn post_command(State(state): State<AppState>, Json(command): Json<EngineCommand>) -> Json<CommandReply> {
    let mut engine = state.engine.lock().await;
    let applied = command.apply(&mut **engine);
    Json(CommandReply { applied })
}

async fn get_camera(State(state): State<AppState>) -> Json<CameraSnapshot> {
    Json(state.engine.lock().await.camera())
}

async fn get_stats(State(state): State<AppState>) -> Json<SceneStats> {
    Json(state.engine.lock().await.stats())
}

/// Drain the buffered scene events
async fn get_events(State(state): State<AppState>) -> Json<Vec<SceneEvent>> {
    Json(state.events.lock().await.drain(..).collect())
}

/// Advance the engine on a fixed tick and write the frame when it changed
async fn render_loop(state: AppState, frame_path: PathBuf) {
    let events = state.engine.lock().await.events();
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_write: Option<Instant> = None;
    let mut pending = false;
    // Idle ticks advance the engine clock by one tick only, so a redraw after
    // a quiet spell does not read as one slow frame.
    let mut clock_ms = 0.0;
    let mut last_frame: Option<Instant> = None;

    loop {
        ticker.tick().await;
        let mut engine = state.engine.lock().await;
        if engine.needs_redraw() {
            clock_ms += match last_frame {
                Some(t) => t.elapsed().as_secs_f64() * 1000.0,
                None => TICK.as_secs_f64() * 1000.0,
            };
            engine.frame(clock_ms);
            last_frame = Some(Instant::now());
            pending = true;
        } else {
            last_frame = None;
        }

        let fresh: Vec<SceneEvent> = events.try_iter().collect();
        if !fresh.is_empty() {
            let mut backlog = state.events.lock().await;
            for event in fresh {
                debug!(?event, "scene event");
                backlog.push_back(event);
            }
            while backlog.len() > EVENT_BACKLOG {
                backlog.pop_front();
            }
        }

        if pending && last_write.is_none_or(|t| t.elapsed() >= WRITE_INTERVAL) {
            match engine.save_png(&frame_path) {
                Ok(()) => {
                    pending = false;
                    last_write = Some(Instant::now());
                }
                Err(e) => warn!(error = %e, path = %frame_path.display(), "failed to write frame"),
            }
        }
    }
}

/// Start the development server with tile hot reload
pub async fn serve(engine: Box<dyn SceneEngine>, tile: &Path, output: &Path, port: u16) -> anyhow::Result<()> {
    std::fs::create_dir_all(output)?;
    let index = output.join("index.html");
    if !index.exists() {
        std::fs::write(&index, INDEX_HTML)?;
    }

    let state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        events: Arc::new(Mutex::new(VecDeque::new())),
    };
    tokio::spawn(render_loop(state.clone(), output.join("frame.png")));

    // Create channel for file change notifications
    let (tx, mut rx) = mpsc::channel::<()>(1);
    let tile_name = tile.file_name().map(|n| n.to_os_string());

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, _>| {
        if let Ok(event) = res {
            let touches_tile = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == tile_name);
            if touches_tile && (event.kind.is_modify() || event.kind.is_create()) {
                let _ = tx.blocking_send(());
            }
        }
    })?;

    // Watch the tile's parent directory so editors that replace the file still trigger
    let watch_path = tile
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;

    let tile_for_reload = tile.to_path_buf();
    let engine_for_reload = state.engine.clone();
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            // Debounce: wait a bit for rapid changes to settle
            tokio::time::sleep(Duration::from_millis(100)).await;
            while rx.try_recv().is_ok() {}

            match GraphTile::from_path(&tile_for_reload) {
                Ok(tile) => {
                    let nodes = tile.count();
                    engine_for_reload
                        .lock()
                        .await
                        .set_foreground(tile, ForegroundOptions::default());
                    println!("Reloaded tile ({nodes} nodes)");
                }
                Err(e) => eprintln!("Error reloading tile: {e}"),
            }
        }
    });

    let app = Router::new()
        .route("/command", post(post_command))
        .route("/camera", get(get_camera))
        .route("/stats", get(get_stats))
        .route("/events", get(get_events))
        .fallback_service(ServeDir::new(output))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("Development server running at http://localhost:{port}");
    println!("Watching {} for changes...", tile.display());
    println!("Press Ctrl+C to stop");

    // Keep watcher alive
    let _watcher = watcher;

    axum::serve(listener, app).await?;

    Ok(())
}
