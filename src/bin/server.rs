use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use bin_packer::instance::{Demand, Instance};
use bin_packer::solver::{SolveError, Solver, SolverConfig};
use bin_packer::types::{Rect, SolveReport};
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Deserialize, Serialize)]
struct SolveRequest {
    #[serde(default = "default_name")]
    name: String,
    bin: Rect,
    items: Vec<Demand>,
    #[serde(default)]
    config: SolverConfig,
}

fn default_name() -> String {
    "request".to_string()
}

async fn solve(
    Json(req): Json<SolveRequest>,
) -> Result<Json<SolveReport>, (StatusCode, String)> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /solve"
    );

    let instance = Instance::from_demands(req.name, req.bin, &req.items)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let solver = Solver::new(instance, req.config);

    let report = tokio::task::spawn_blocking(move || solver.solve())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| match e {
            SolveError::Instance(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            e => {
                tracing::error!(error = %e, "solve failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        })?;

    Ok(Json(report))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let app = Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/solve", post(solve))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    eprintln!("Listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
