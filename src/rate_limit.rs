//! Per-address request counting and promotion to the ban list.
//!
//! Counting uses a fixed window: a record's `first_request` is set when the
//! record is created and never moves. Once `now - first_request` exceeds the
//! window the record is dropped and the next hit starts a fresh one. This is
//! not a sliding log or a leaky bucket.
//!
//! Every observation sweeps the whole table for stale records before touching
//! the current address. That keeps the file small when clients go quiet, at
//! O(tracked addresses) per request; cardinality is bounded by the clients
//! active within one window.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::blocklist::PersistentSet;
use crate::config::RateLimitConfig;
use crate::error::StoreError;
use crate::metrics::{PROMOTIONS_TOTAL, STORE_WRITE_FAILURES, TRACKED_ADDRESSES};
use crate::store::{load_or_default, write_json};

// Rate record - requests seen from one address in the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRecord {
    pub count: u64,
    pub first_request: i64, // epoch millis
}

impl RateRecord {
    fn is_stale(&self, now_ms: i64, window_ms: u64) -> bool {
        let window = i64::try_from(window_ms).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.first_request) > window
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Promote,
}

/// Durable address -> [`RateRecord`] table.
///
/// The lock covers evict, increment and the file rewrite, so two concurrent
/// observations can never both read the same count.
pub struct SlidingWindowCounter {
    path: PathBuf,
    records: Mutex<HashMap<String, RateRecord>>,
}

impl SlidingWindowCounter {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records: HashMap<String, RateRecord> = load_or_default(&path, "rate counters");
        TRACKED_ADDRESSES.set(records.len() as f64);

        Self {
            path,
            records: Mutex::new(records),
        }
    }

    /// Counts one hit for `addr` at `now_ms`.
    ///
    /// Stale records for every address are removed first, then the current
    /// address is incremented (or started at 1). When the count passes
    /// `limit` the record is removed and [`Decision::Promote`] is returned;
    /// only the hit that crosses the limit sees `Promote`.
    pub fn observe_at(&self, addr: &str, window_ms: u64, limit: u64, now_ms: i64) -> Decision {
        self.observe_guarded(addr, window_ms, limit, now_ms, |_| false, |_| {})
    }

    // `is_banned` and `promote` run while the lock is held, so no other
    // observation of `addr` can land between the ban and the record removal
    fn observe_guarded(
        &self,
        addr: &str,
        window_ms: u64,
        limit: u64,
        now_ms: i64,
        is_banned: impl Fn(&str) -> bool,
        promote: impl FnOnce(&str),
    ) -> Decision {
        let mut records = self.records.lock();

        // evict globally before reading the current address
        records.retain(|_, record| !record.is_stale(now_ms, window_ms));

        let decision = if is_banned(addr) {
            // banned addresses are not tracked
            records.remove(addr);
            Decision::Continue
        } else {
            let record = records.entry(addr.to_string()).or_insert(RateRecord {
                count: 0,
                first_request: now_ms,
            });
            record.count += 1;

            if record.count > limit {
                records.remove(addr);
                promote(addr);
                Decision::Promote
            } else {
                Decision::Continue
            }
        };

        TRACKED_ADDRESSES.set(records.len() as f64);
        if let Err(e) = write_json(&self.path, &*records) {
            STORE_WRITE_FAILURES.inc();
            error!(error = %e, "failed to persist rate counters, in-memory state is ahead of disk");
        }

        decision
    }

    pub fn get(&self, addr: &str) -> Option<RateRecord> {
        self.records.lock().get(addr).copied()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Drop an address's counter (after an explicit ban)
    pub fn clear(&self, addr: &str) -> Result<bool, StoreError> {
        let mut records = self.records.lock();
        if records.remove(addr).is_none() {
            return Ok(false);
        }
        TRACKED_ADDRESSES.set(records.len() as f64);
        write_json(&self.path, &*records)?;
        Ok(true)
    }
}

/// Rate counting plus the ban list it promotes into.
///
/// All access to the two stores goes through here; nothing else holds them.
pub struct RateLimitEngine {
    counter: SlidingWindowCounter,
    bans: Arc<PersistentSet>,
}

impl RateLimitEngine {
    pub fn new(counter: SlidingWindowCounter, bans: Arc<PersistentSet>) -> Self {
        Self { counter, bans }
    }

    pub fn open(data_dir: &Path) -> Self {
        Self::new(
            SlidingWindowCounter::open(data_dir.join("rateLimit.json")),
            Arc::new(PersistentSet::open(data_dir.join("blockedIps.json"))),
        )
    }

    pub fn is_banned(&self, addr: &str) -> bool {
        self.bans.contains(addr)
    }

    pub fn observe(&self, addr: &str, config: &RateLimitConfig) -> Decision {
        self.observe_at(addr, config, Utc::now().timestamp_millis())
    }

    /// Counts a hit and bans `addr` when it crosses `config.limit`.
    ///
    /// An address already in the ban list is not counted. The ban is written
    /// under the counter lock, which makes the ban-list writer wait on the
    /// counter during a promotion (never the other way round).
    pub fn observe_at(&self, addr: &str, config: &RateLimitConfig, now_ms: i64) -> Decision {
        self.counter.observe_guarded(
            addr,
            config.window,
            config.limit,
            now_ms,
            |a| self.bans.contains(a),
            |a| {
                PROMOTIONS_TOTAL.inc();
                warn!(
                    addr = %a,
                    limit = config.limit,
                    window_ms = config.window,
                    "rate limit exceeded, banning address"
                );
                if let Err(e) = self.bans.add(a) {
                    STORE_WRITE_FAILURES.inc();
                    error!(addr = %a, error = %e, "ban applied in memory but not persisted");
                }
            },
        )
    }

    pub fn ban(&self, addr: &str) -> Result<bool, StoreError> {
        let added = self.bans.add(addr)?;
        if added {
            info!(addr = %addr, "address banned");
        }
        // a ban supersedes window tracking; the ban itself already took effect
        if let Err(e) = self.counter.clear(addr) {
            STORE_WRITE_FAILURES.inc();
            error!(addr = %addr, error = %e, "failed to persist rate counters after ban");
        }
        Ok(added)
    }

    pub fn unban(&self, addr: &str) -> Result<bool, StoreError> {
        let removed = self.bans.remove(addr)?;
        if removed {
            info!(addr = %addr, "address unbanned");
        }
        Ok(removed)
    }

    pub fn banned(&self) -> BTreeSet<String> {
        self.bans.all()
    }

    pub fn banned_count(&self) -> usize {
        self.bans.len()
    }

    pub fn counter(&self) -> &SlidingWindowCounter {
        &self.counter
    }
}
