//! Request-perimeter guard for axum services.
//!
//! Every request passes through [`middleware::guard`], which rejects banned
//! addresses, counts hits per address in a fixed window, bans addresses that
//! go over the limit and logs requests matching the configured endpoints.
//! Ban list, rate counters and request log are JSON files that survive
//! restarts.

pub mod blocklist;
pub mod client_ip;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod geo;
pub mod handlers;
pub mod matcher;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod request_log;
pub mod routes;
pub mod state;
pub mod store;
pub mod user_agent;

pub use config::{GuardConfig, RateLimitConfig};
pub use gatekeeper::{Admission, Gatekeeper};
pub use rate_limit::{Decision, RateLimitEngine};
