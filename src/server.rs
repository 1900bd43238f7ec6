use axum::{Json, Router, http::StatusCode, routing::post};
use serde::Deserialize;

use crate::config::SolverConfig;
use crate::domain::{Schedule, TimetableInput};
use crate::error::SolveError;
use crate::solve::{self, SolveReport};
use crate::verify::{self, Violation};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    pub input: TimetableInput,
    #[serde(default)]
    pub config: SolverConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub input: TimetableInput,
    #[serde(default)]
    pub config: SolverConfig,
    pub schedule: Schedule,
}

async fn solve_handler(
    Json(request): Json<SolveRequest>,
) -> Result<Json<SolveReport>, (StatusCode, String)> {
    // the solve is CPU-bound, keep it off the async workers
    let result = tokio::task::spawn_blocking(move || {
        solve::solve(&request.input, &request.config)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match result {
        Ok(report) => Ok(Json(report)),
        Err(e @ SolveError::InvalidInput(_)) => Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn verify_handler(Json(request): Json<VerifyRequest>) -> Json<Vec<Violation>> {
    Json(verify::verify(&request.input, &request.config, &request.schedule))
}

pub async fn run_server() {
    let app = Router::new()
        .route("/v1/timetable/solve", post(solve_handler))
        .route("/v1/timetable/verify", post(verify_handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080")
        .await
        .unwrap();

    println!("Server running at http://{}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
