use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::resolver::{ErrorKind, TariffResolver};

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<TariffResolver>,
    pub request_timeout: Duration,
}

/// Raw query parameters. Numbers arrive as text so that malformed values get
/// the same JSON error body as every other bad request.
#[derive(Debug, Default, Deserialize)]
pub struct CalculateParams {
    #[serde(alias = "comuna")]
    pub region: Option<String>,
    pub watts: Option<String>,
    #[serde(alias = "horas")]
    pub hours: Option<String>,
    #[serde(alias = "dias")]
    pub days: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct CalculateRequest {
    region: String,
    watts: f64,
    hours: f64,
    days: f64,
}

fn parse_params(params: &CalculateParams) -> Option<CalculateRequest> {
    let number = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<f64>().ok());

    let region = params.region.as_deref().map(str::trim).filter(|r| !r.is_empty())?;
    Some(CalculateRequest {
        region: region.to_string(),
        watts: number(&params.watts)?,
        hours: number(&params.hours)?,
        days: number(&params.days)?,
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/tariffs/calculate", get(calculate))
        .with_state(state)
}

/// Serve the API on `bind_addr` until ctrl-c.
pub async fn serve(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr '{bind_addr}': {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "tariff API listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    Ok(())
}

async fn root() -> &'static str {
    "Tariff calculator API - operational"
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "success": false, "error": message.into() }))).into_response()
}

pub async fn calculate(State(state): State<AppState>, Query(params): Query<CalculateParams>) -> Response {
    let Some(req) = parse_params(&params) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "missing or invalid parameters (region, watts, hours, days)",
        );
    };

    let work = state.resolver.resolve(&req.region, req.watts, req.hours, req.days);
    let result = match tokio::time::timeout(state.request_timeout, work).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(region = %req.region, timeout = ?state.request_timeout, "calculate request timed out");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "request timed out");
        }
    };

    match result {
        Ok(simulation) => (StatusCode::OK, Json(json!({ "success": true, "data": simulation }))).into_response(),
        Err(e) => {
            let status = match e.kind() {
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::NoDataAvailable | ErrorKind::UpstreamFailure | ErrorKind::Store => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            if status.is_server_error() {
                tracing::error!(region = %req.region, error = %e, "calculate request failed");
            }
            error_response(status, e.to_string())
        }
    }
}
