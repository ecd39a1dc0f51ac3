use axum::{
    Router, middleware,
    routing::{get, put},
};
use std::sync::Arc;

use crate::handlers::{
    ban_address, health_handler, list_bans, list_logs, metrics_handler, proxy_handler,
    unban_address,
};
use crate::middleware::guard;
use crate::state::AppState;

// Public port: everything goes through the guard, then upstream
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.gatekeeper),
            guard,
        ))
        .with_state(state)
}

pub fn admin(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/admin/bans", get(list_bans))
        .route("/admin/bans/{addr}", put(ban_address).delete(unban_address))
        .route("/admin/logs", get(list_logs))
        .with_state(state)
}
