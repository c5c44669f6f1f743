//! Optional read-only HTTP introspection surface (`admin` feature, SPEC_FULL
//! §2): `/healthz` and `/tenants`. The teacher's precedent for an additive,
//! feature-gated `axum` surface is `tower-shot::error::ShotError`'s
//! `IntoResponse` impl behind its own `axum` feature — we follow the same
//! "off by default, plain dependency when on" shape, just for a small router
//! instead of an error conversion.
//!
//! This is introspection only. The actual control/data plane wire surface is
//! an external collaborator per §1 ("the line-rate network front-end"); nothing
//! here accepts REG or GET/PUT traffic.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use flux_engine::TenantRegistry;
use serde::Serialize;

#[derive(Clone)]
pub struct AdminState {
    registry: Arc<TenantRegistry>,
}

impl AdminState {
    pub fn new(registry: Arc<TenantRegistry>) -> Self {
        Self { registry }
    }
}

/// A JSON-serializable view of a registered tenant. Kept separate from
/// `flux_engine::Tenant` rather than deriving `Serialize` there — the engine
/// crate stays free of a `serde` dependency it has no other use for.
#[derive(Debug, Serialize)]
struct TenantView {
    tenant_id: u64,
    latency_critical: bool,
    latency_us_slo: u32,
    iops_slo: u64,
    rw_ratio_pct: u8,
    scaled_iops_limit: f64,
    scaled_iopus_limit: f64,
    owner_worker: usize,
    conn_ref_count: u32,
}

impl From<flux_engine::Tenant> for TenantView {
    fn from(t: flux_engine::Tenant) -> Self {
        Self {
            tenant_id: t.tenant_id.0,
            latency_critical: t.is_latency_critical(),
            latency_us_slo: t.latency_us_slo,
            iops_slo: t.iops_slo,
            rw_ratio_pct: t.rw_ratio_pct,
            scaled_iops_limit: t.scaled_iops_limit,
            scaled_iopus_limit: t.scaled_iopus_limit,
            owner_worker: t.owner_worker.0,
            conn_ref_count: t.conn_ref_count,
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn tenants(State(state): State<AdminState>) -> Json<Vec<TenantView>> {
    let views = state
        .registry
        .list_tenants()
        .into_iter()
        .map(TenantView::from)
        .collect();
    Json(views)
}

/// Builds the admin router. Mount it on its own listener alongside, never in
/// place of, the data-plane front-end.
pub fn admin_router(registry: Arc<TenantRegistry>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/tenants", get(tenants))
        .with_state(AdminState::new(registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use flux_engine::{CostModel, DeviceModel, TenantId, WorkerId};
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthz_returns_ok() {
        let device = DeviceModel::unlimited();
        let registry = Arc::new(TenantRegistry::new(device, CostModel::fake()));
        let app = admin_router(registry);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tenants_lists_registered_flows() {
        let device = DeviceModel::from_points(vec![(500, 100_000.0, 100_000.0)]);
        let registry = Arc::new(TenantRegistry::new(device, CostModel::fake()));
        registry
            .register_flow(TenantId(1), 500, 500, 100, WorkerId(0))
            .unwrap();
        let app = admin_router(registry);

        let response = app
            .oneshot(Request::builder().uri("/tenants").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
