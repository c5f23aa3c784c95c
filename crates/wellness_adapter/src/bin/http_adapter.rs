#![forbid(unsafe_code)]

use std::{
    env,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use wellness_adapter::{
    AdapterHealthResponse, AdapterJobHealth, AdapterMutationResponse, AdapterRuntime,
    AggregateSectionAnalyticsRequest, AggregateSectionAnalyticsResponse,
    EngagementSummaryResponse, InteractionAdapterRequest, JobErrorResponse, LayoutFlagsRequest,
    LayoutViewResponse, MotivationResponse, OptimizeDashboardLayoutsResponse,
    ProfileAdapterRequest, SaveLayoutRequest,
};

type SharedRuntime = Arc<Mutex<AdapterRuntime>>;
type ErrorReply = (StatusCode, Json<AdapterMutationResponse>);
type JobErrorReply = (StatusCode, Json<JobErrorResponse>);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let bind = env::var("WELLNESS_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;
    let scheduler_enabled = parse_scheduler_enabled_from_env();
    let scheduler_interval_ms = parse_scheduler_interval_ms_from_env();

    let runtime = Arc::new(Mutex::new(AdapterRuntime::default_from_env()?));
    if scheduler_enabled {
        let runtime_for_worker = runtime.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(scheduler_interval_ms));
            loop {
                ticker.tick().await;
                let pass_result = match runtime_for_worker.lock() {
                    Ok(runtime) => runtime.run_scheduled_pass(Utc::now()),
                    Err(_) => Err("adapter runtime lock poisoned".to_string()),
                };
                match pass_result {
                    Ok(report) if report.all_ok() => info!("scheduled dashboard pass ok"),
                    Ok(report) => error!(?report, "scheduled dashboard pass had job failures"),
                    Err(err) => error!(error = %err, "scheduled dashboard pass failed"),
                }
            }
        });
    }

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/v1/jobs/aggregate-section-analytics",
            post(aggregate_section_analytics),
        )
        .route(
            "/v1/jobs/optimize-dashboard-layouts",
            post(optimize_dashboard_layouts),
        )
        .route("/v1/dashboard/interactions", post(record_interaction))
        .route("/v1/profiles", post(register_profile))
        .route(
            "/v1/dashboard/layout/:user_id",
            get(get_layout).put(save_layout),
        )
        .route("/v1/dashboard/layout/:user_id/flags", patch(update_flags))
        .route("/v1/dashboard/layout/:user_id/reset", post(reset_layout))
        .route("/v1/dashboard/engagement/:user_id", get(get_engagement))
        .route("/v1/motivation", get(get_motivation))
        .with_state(runtime);

    info!(
        %addr,
        scheduler_enabled,
        scheduler_interval_ms,
        "wellness_adapter_http listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}

fn parse_scheduler_enabled_from_env() -> bool {
    match env::var("WELLNESS_SCHEDULER_ENABLED") {
        Ok(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes"
        ),
        Err(_) => false,
    }
}

fn parse_scheduler_interval_ms_from_env() -> u64 {
    env::var("WELLNESS_SCHEDULER_INTERVAL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| (1_000..=86_400_000).contains(v))
        .unwrap_or(3_600_000)
}

fn lock(runtime: &SharedRuntime) -> Result<MutexGuard<'_, AdapterRuntime>, String> {
    runtime
        .lock()
        .map_err(|_| "adapter runtime lock poisoned".to_string())
}

fn rejected(status: StatusCode, reason: String) -> ErrorReply {
    (status, Json(AdapterMutationResponse::rejected(reason)))
}

fn job_failed(reason: String) -> JobErrorReply {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(JobErrorResponse::new(reason)),
    )
}

async fn healthz(
    State(runtime): State<SharedRuntime>,
) -> (StatusCode, Json<AdapterHealthResponse>) {
    match lock(&runtime).and_then(|runtime| runtime.health_report()) {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AdapterHealthResponse {
                status: "error".to_string(),
                outcome: "UNHEALTHY".to_string(),
                reason: Some(reason),
                jobs: AdapterJobHealth::default(),
            }),
        ),
    }
}

async fn aggregate_section_analytics(
    State(runtime): State<SharedRuntime>,
    body: Option<Json<AggregateSectionAnalyticsRequest>>,
) -> Result<Json<AggregateSectionAnalyticsResponse>, JobErrorReply> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    lock(&runtime)
        .and_then(|runtime| runtime.run_section_analytics_job(request, Utc::now()))
        .map(Json)
        .map_err(job_failed)
}

async fn optimize_dashboard_layouts(
    State(runtime): State<SharedRuntime>,
) -> Result<Json<OptimizeDashboardLayoutsResponse>, JobErrorReply> {
    lock(&runtime)
        .and_then(|runtime| runtime.run_layout_optimization_job(Utc::now()))
        .map(Json)
        .map_err(job_failed)
}

async fn record_interaction(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<InteractionAdapterRequest>,
) -> Result<(StatusCode, Json<AdapterMutationResponse>), ErrorReply> {
    let runtime = lock(&runtime).map_err(|r| rejected(StatusCode::INTERNAL_SERVER_ERROR, r))?;
    runtime
        .record_interaction(request, Utc::now())
        .map(|response| (StatusCode::CREATED, Json(response)))
        .map_err(|r| rejected(StatusCode::BAD_REQUEST, r))
}

async fn register_profile(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<ProfileAdapterRequest>,
) -> Result<(StatusCode, Json<AdapterMutationResponse>), ErrorReply> {
    let runtime = lock(&runtime).map_err(|r| rejected(StatusCode::INTERNAL_SERVER_ERROR, r))?;
    runtime
        .register_profile(request, Utc::now())
        .map(|response| (StatusCode::CREATED, Json(response)))
        .map_err(|r| rejected(StatusCode::BAD_REQUEST, r))
}

async fn get_layout(
    State(runtime): State<SharedRuntime>,
    Path(user_id): Path<String>,
) -> Result<Json<LayoutViewResponse>, ErrorReply> {
    let runtime = lock(&runtime).map_err(|r| rejected(StatusCode::INTERNAL_SERVER_ERROR, r))?;
    match runtime.layout_view(&user_id, Utc::now()) {
        Ok(Some(view)) => Ok(Json(view)),
        Ok(None) => Err(rejected(
            StatusCode::NOT_FOUND,
            format!("unknown user_id: {user_id}"),
        )),
        Err(reason) => Err(rejected(StatusCode::BAD_REQUEST, reason)),
    }
}

async fn save_layout(
    State(runtime): State<SharedRuntime>,
    Path(user_id): Path<String>,
    Json(request): Json<SaveLayoutRequest>,
) -> Result<Json<LayoutViewResponse>, ErrorReply> {
    let runtime = lock(&runtime).map_err(|r| rejected(StatusCode::INTERNAL_SERVER_ERROR, r))?;
    runtime
        .save_layout(&user_id, request, Utc::now())
        .map(Json)
        .map_err(|r| rejected(StatusCode::BAD_REQUEST, r))
}

async fn update_flags(
    State(runtime): State<SharedRuntime>,
    Path(user_id): Path<String>,
    Json(request): Json<LayoutFlagsRequest>,
) -> Result<Json<LayoutViewResponse>, ErrorReply> {
    let runtime = lock(&runtime).map_err(|r| rejected(StatusCode::INTERNAL_SERVER_ERROR, r))?;
    runtime
        .update_layout_flags(&user_id, request, Utc::now())
        .map(Json)
        .map_err(|r| rejected(StatusCode::BAD_REQUEST, r))
}

async fn reset_layout(
    State(runtime): State<SharedRuntime>,
    Path(user_id): Path<String>,
) -> Result<Json<LayoutViewResponse>, ErrorReply> {
    let runtime = lock(&runtime).map_err(|r| rejected(StatusCode::INTERNAL_SERVER_ERROR, r))?;
    runtime
        .reset_layout(&user_id, Utc::now())
        .map(Json)
        .map_err(|r| rejected(StatusCode::BAD_REQUEST, r))
}

async fn get_engagement(
    State(runtime): State<SharedRuntime>,
    Path(user_id): Path<String>,
) -> Result<Json<EngagementSummaryResponse>, ErrorReply> {
    let runtime = lock(&runtime).map_err(|r| rejected(StatusCode::INTERNAL_SERVER_ERROR, r))?;
    match runtime.engagement_view(&user_id, Utc::now()) {
        Ok(Some(view)) => Ok(Json(view)),
        Ok(None) => Err(rejected(
            StatusCode::NOT_FOUND,
            format!("unknown user_id: {user_id}"),
        )),
        Err(reason) => Err(rejected(StatusCode::BAD_REQUEST, reason)),
    }
}

async fn get_motivation(
    State(runtime): State<SharedRuntime>,
) -> Result<Json<MotivationResponse>, ErrorReply> {
    lock(&runtime)
        .and_then(|runtime| runtime.motivation_message())
        .map(Json)
        .map_err(|r| rejected(StatusCode::INTERNAL_SERVER_ERROR, r))
}
