use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, register_counter, register_gauge};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gatekeeper_requests_total", "Total number of requests inspected").unwrap();
    pub static ref BLOCKED_TOTAL: Counter =
        register_counter!("gatekeeper_blocked_total", "Requests rejected from banned addresses").unwrap();
    pub static ref PROMOTIONS_TOTAL: Counter =
        register_counter!("gatekeeper_promotions_total", "Addresses banned for exceeding the rate limit").unwrap();
    pub static ref LOGGED_TOTAL: Counter =
        register_counter!("gatekeeper_logged_total", "Requests written to the request log").unwrap();
    pub static ref STORE_WRITE_FAILURES: Counter =
        register_counter!("gatekeeper_store_write_failures_total", "Failed writes to durable stores").unwrap();
    pub static ref BANNED_ADDRESSES: Gauge =
        register_gauge!("gatekeeper_banned_addresses", "Current number of banned addresses").unwrap();
    pub static ref TRACKED_ADDRESSES: Gauge =
        register_gauge!("gatekeeper_tracked_addresses", "Addresses with a live rate record").unwrap();
}
