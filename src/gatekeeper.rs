//! Per-request decision pipeline.
//!
//! A request moves through block check, rate check and classification:
//!
//! ```text
//! Received -> BlockCheck -> Blocked
//!                        -> RateCheck -> Classify -> Logged  -> Forwarded
//!                                                 -> Skipped -> Forwarded
//! ```
//!
//! A banned address stops at `BlockCheck` without being counted or logged.
//! When the rate check promotes an address, the ban applies from the next
//! request on; the request that crossed the limit still goes through.

use axum::http::HeaderMap;
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::GuardConfig;
use crate::error::StoreError;
use crate::geo::{GeoLookup, NoGeoLookup};
use crate::matcher;
use crate::metrics::{
    BANNED_ADDRESSES, BLOCKED_TOTAL, LOGGED_TOTAL, REQUEST_TOTAL, STORE_WRITE_FAILURES,
};
use crate::rate_limit::{Decision, RateLimitEngine};
use crate::request_log::{LogEntry, RequestLogStore, essential_headers};
use crate::user_agent::{BasicUserAgentDecoder, UserAgentDecoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Blocked,
    Admitted { log: bool },
}

pub struct Gatekeeper {
    engine: RateLimitEngine,
    log: RequestLogStore,
    config: GuardConfig,
    geo: Arc<dyn GeoLookup>,
    user_agents: Arc<dyn UserAgentDecoder>,
}

impl Gatekeeper {
    pub fn new(engine: RateLimitEngine, log: RequestLogStore, config: GuardConfig) -> Self {
        BANNED_ADDRESSES.set(engine.banned_count() as f64);
        Self {
            engine,
            log,
            config,
            geo: Arc::new(NoGeoLookup),
            user_agents: Arc::new(BasicUserAgentDecoder),
        }
    }

    // Stores live side by side in `data_dir`
    pub fn open(data_dir: &Path, config: GuardConfig) -> Self {
        Self::new(
            RateLimitEngine::open(data_dir),
            RequestLogStore::new(data_dir.join("requests.json")),
            config,
        )
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoLookup>) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_user_agents(mut self, decoder: Arc<dyn UserAgentDecoder>) -> Self {
        self.user_agents = decoder;
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Runs the block check, the rate check and classification for one
    /// request.
    ///
    /// Requests whose address could not be resolved skip the first two steps.
    pub fn admit(&self, addr: Option<&str>, method: &str, path: &str) -> Admission {
        REQUEST_TOTAL.inc();

        if self.rejects(addr) {
            debug!(method = %method, path = %path, "rejected banned address");
            return Admission::Blocked;
        }

        if let Some(addr) = addr {
            let decision = self.engine.observe(addr, &self.config.rate_limit_config);
            if decision == Decision::Promote {
                BANNED_ADDRESSES.set(self.engine.banned_count() as f64);
            }
        }

        Admission::Admitted {
            log: matcher::matches(method, path, &self.config.save_endpoints),
        }
    }

    /// Block check alone: true when `addr` is banned. Counts the rejection
    /// but touches neither the rate counter nor the request log.
    pub fn rejects(&self, addr: Option<&str>) -> bool {
        let Some(addr) = addr else { return false };
        if !self.engine.is_banned(addr) {
            return false;
        }
        BLOCKED_TOTAL.inc();
        debug!(addr = %addr, "banned address turned away");
        true
    }

    pub fn build_entry(
        &self,
        addr: Option<&str>,
        method: &str,
        endpoint: &str,
        headers: &HeaderMap,
        body: serde_json::Value,
    ) -> LogEntry {
        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|raw| self.user_agents.decode(raw));

        LogEntry {
            ip: addr.map(str::to_string),
            user_agent,
            geo: addr.and_then(|a| self.geo.lookup(a)),
            timestamp: Utc::now(),
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            body,
            headers: essential_headers(headers),
        }
    }

    // Write failures are logged; the request goes on regardless
    pub fn record(&self, entry: LogEntry) {
        match self.log.append(entry, self.config.max_size) {
            Ok(()) => LOGGED_TOTAL.inc(),
            Err(e) => {
                STORE_WRITE_FAILURES.inc();
                error!(error = %e, "failed to write request log entry");
            }
        }
    }

    pub fn is_banned(&self, addr: &str) -> bool {
        self.engine.is_banned(addr)
    }

    pub fn ban(&self, addr: &str) -> Result<bool, StoreError> {
        let result = self.engine.ban(addr);
        BANNED_ADDRESSES.set(self.engine.banned_count() as f64);
        result
    }

    pub fn unban(&self, addr: &str) -> Result<bool, StoreError> {
        let result = self.engine.unban(addr);
        BANNED_ADDRESSES.set(self.engine.banned_count() as f64);
        result
    }

    pub fn banned(&self) -> BTreeSet<String> {
        self.engine.banned()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.log.load_all()
    }

    pub fn engine(&self) -> &RateLimitEngine {
        &self.engine
    }
}
