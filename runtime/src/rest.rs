// Copyright 2026 PlaceRank Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for PlaceRank.
//!
//! Starts sweeps, streams their progress over SSE, and accepts control
//! signals. One sweep runs at a time; finished reports are kept in memory
//! for the life of the server.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use placerank::{BusinessProfile, Checkpoint, CheckpointReader, MapVariant, Vocabulary};

use crate::checker::RankChecker;
use crate::config::RuntimeConfig;
use crate::pool::SessionPool;
use crate::progress::{self, ProgressEventKind, ProgressSender};
use crate::sweep::control::{ControlAction, SweepControl};
use crate::sweep::{self, Sweep, SweepOptions, SweepReport};

/// State shared by every handler.
pub struct ServeState {
    pub config: RuntimeConfig,
    pub vocab: Vocabulary,
    pub pool: Arc<SessionPool>,
    pub progress: ProgressSender,
    pub reports: DashMap<String, SweepReport>,
    running: Mutex<Option<RunningSweep>>,
    last_sweep: Mutex<Option<String>>,
    started_at: Instant,
}

struct RunningSweep {
    sweep_id: String,
    business_id: String,
    control: SweepControl,
}

impl ServeState {
    pub fn new(config: RuntimeConfig, vocab: Vocabulary, pool: Arc<SessionPool>) -> Arc<Self> {
        let (progress, _) = progress::channel();
        Arc::new(Self {
            config,
            vocab,
            pool,
            progress,
            reports: DashMap::new(),
            running: Mutex::new(None),
            last_sweep: Mutex::new(None),
            started_at: Instant::now(),
        })
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningSweep>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn last_sweep(&self) -> MutexGuard<'_, Option<String>> {
        self.last_sweep.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<ServeState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/events", get(events_sse))
        .route("/api/v1/sweep", post(handle_sweep))
        .route("/api/v1/sweep/:id", get(handle_report))
        .route("/api/v1/control", post(handle_control))
        .layer(cors)
        .with_state(state)
}

/// Start the REST API server on the given port, bound to localhost.
pub async fn start(port: u16, state: Arc<ServeState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("REST API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message.into() } })),
    )
        .into_response()
}

// ── Handlers ────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn handle_status(State(state): State<Arc<ServeState>>) -> Json<Value> {
    let pool = state.pool.stats().await;
    let running = state
        .running()
        .as_ref()
        .map(|r| json!({ "sweep_id": r.sweep_id, "business_id": r.business_id, "control": r.control.snapshot() }));
    let last = state
        .last_sweep()
        .clone()
        .and_then(|id| state.reports.get(&id).map(|r| r.value().clone()));

    Json(json!({
        "running": running,
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "pool": pool,
        "last_report": last,
        "reports": state.reports.len(),
    }))
}

/// Server-Sent Events endpoint streaming sweep progress.
async fn events_sse(
    State(state): State<Arc<ServeState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.progress.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct SweepRequest {
    pub profile: BusinessProfile,
    /// Fixed keyword list; generated when absent.
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub budget: Option<usize>,
    #[serde(default)]
    pub prefer: Option<MapVariant>,
    #[serde(default)]
    pub target: Option<usize>,
    /// Continue from this business's checkpoint when one exists.
    #[serde(default)]
    pub resume: bool,
}

async fn handle_sweep(
    State(state): State<Arc<ServeState>>,
    Json(req): Json<SweepRequest>,
) -> Response {
    if let Err(e) = req.profile.validate() {
        return error(StatusCode::BAD_REQUEST, "E_INVALID_PROFILE", e.to_string());
    }

    let checkpoint = if req.resume {
        let path = Checkpoint::path_in(&state.config.checkpoint_dir, &req.profile.id);
        match path.exists().then(|| CheckpointReader::read_from_file(&path)).transpose() {
            Ok(cp) => cp,
            Err(e) => return error(StatusCode::BAD_REQUEST, "E_CHECKPOINT", e.to_string()),
        }
    } else {
        None
    };

    let sweep_id = uuid::Uuid::new_v4().to_string();
    let control = SweepControl::new();
    {
        let mut running = state.running();
        if let Some(r) = running.as_ref() {
            return error(
                StatusCode::CONFLICT,
                "E_BUSY",
                format!("sweep {} is already running", r.sweep_id),
            );
        }
        *running = Some(RunningSweep {
            sweep_id: sweep_id.clone(),
            business_id: req.profile.id.clone(),
            control: control.clone(),
        });
    }

    let task_state = Arc::clone(&state);
    let id = sweep_id.clone();
    tokio::spawn(async move {
        let result = run_request(&task_state, &id, req, checkpoint, control).await;
        match result {
            Ok(report) => {
                task_state.reports.insert(id.clone(), report);
                *task_state.last_sweep() = Some(id.clone());
            }
            Err(e) => {
                tracing::error!(sweep = %id, error = %format!("{e:#}"), "sweep failed");
                let mut seq = 0;
                progress::emit(
                    &Some(task_state.progress.clone()),
                    &id,
                    &mut seq,
                    ProgressEventKind::Warning {
                        message: format!("sweep failed: {e:#}"),
                    },
                );
            }
        }
        *task_state.running() = None;
    });

    (StatusCode::ACCEPTED, Json(json!({ "sweep_id": sweep_id }))).into_response()
}

async fn run_request(
    state: &ServeState,
    sweep_id: &str,
    req: SweepRequest,
    checkpoint: Option<Checkpoint>,
    control: SweepControl,
) -> anyhow::Result<SweepReport> {
    let cfg = &state.config;
    let (sweep_state, supply) = sweep::prepare(
        &req.profile,
        &state.vocab,
        req.keywords,
        req.budget,
        checkpoint,
        cfg.sweep.retry_capacity,
    )?;
    let checker = RankChecker::new(Arc::clone(&state.pool), cfg.fetch.clone(), &state.vocab, &req.profile)?;

    let mut options = SweepOptions::from_config(&cfg.sweep, Some(cfg.checkpoint_dir.clone()));
    options.preferred = req.prefer.unwrap_or(MapVariant::Current);
    options.target_hits = req.target;

    let sweep = Sweep {
        id: sweep_id.to_string(),
        profile: &req.profile,
        vocab: &state.vocab,
        probe: &checker,
        options: &options,
        control: &control,
        progress: Some(state.progress.clone()),
    };
    sweep.run(supply, sweep_state).await
}

async fn handle_report(State(state): State<Arc<ServeState>>, Path(id): Path<String>) -> Response {
    match state.reports.get(&id) {
        Some(report) => Json(report.value().clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "E_NOT_FOUND", format!("no report for sweep {id}")),
    }
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    action: ControlAction,
}

async fn handle_control(
    State(state): State<Arc<ServeState>>,
    Json(req): Json<ControlRequest>,
) -> Response {
    let running = state.running();
    match running.as_ref() {
        Some(r) => {
            r.control.apply(req.action);
            Json(json!({ "sweep_id": r.sweep_id, "control": r.control.snapshot() })).into_response()
        }
        None => error(StatusCode::CONFLICT, "E_IDLE", "no sweep is running"),
    }
}
