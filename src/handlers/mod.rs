mod admin;
mod health;
mod metrics;
mod proxy;

pub use admin::{ban_address, list_bans, list_logs, unban_address, AdminError, BanStatus};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use proxy::proxy_handler;
