use std::sync::Arc;
use crate::gatekeeper::Gatekeeper;
// app's shared state

pub struct AppState {
    pub client: reqwest::Client,
    pub upstream: String,            // where admitted requests go
    pub gatekeeper: Arc<Gatekeeper>, // ban list, rate counters, request log
}
