use super::AppState;
use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Serialize)]
struct ComponentCheck {
    status: ComponentStatus,
    message: String,
    latency_ms: u64,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    status: ComponentStatus,
    checks: BTreeMap<&'static str, ComponentCheck>,
    timestamp: String,
}

/// Liveness: the process is up and serving requests
pub async fn liveness() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check
///
/// The entity store is critical: if it is unreachable the service reports
/// 503. The media store only degrades the service, since posts without
/// attachments keep working.
pub async fn readiness(state: web::Data<AppState>) -> impl Responder {
    let mut checks = BTreeMap::new();

    let start = Instant::now();
    let store_check = match state.store.ping().await {
        Ok(()) => ComponentCheck {
            status: ComponentStatus::Healthy,
            message: "entity store reachable".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        },
        Err(err) => ComponentCheck {
            status: ComponentStatus::Unhealthy,
            message: format!("entity store unreachable: {err}"),
            latency_ms: start.elapsed().as_millis() as u64,
        },
    };
    checks.insert("store", store_check);

    let start = Instant::now();
    let media_check = match state.media.health_check().await {
        Ok(()) => ComponentCheck {
            status: ComponentStatus::Healthy,
            message: "media store reachable".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        },
        Err(err) => ComponentCheck {
            status: ComponentStatus::Degraded,
            message: format!("media store unreachable: {err}"),
            latency_ms: start.elapsed().as_millis() as u64,
        },
    };
    checks.insert("media", media_check);

    let status = if checks
        .values()
        .any(|c| c.status == ComponentStatus::Unhealthy)
    {
        ComponentStatus::Unhealthy
    } else if checks.values().any(|c| c.status == ComponentStatus::Degraded) {
        ComponentStatus::Degraded
    } else {
        ComponentStatus::Healthy
    };
    let ready = status != ComponentStatus::Unhealthy;
    let body = ReadinessResponse {
        ready,
        status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    if ready {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
