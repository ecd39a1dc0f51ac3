//! Durable log of requests that matched a `saveEndpoints` rule.
//!
//! Rotation is destructive: once the file grows past `max_size` the next
//! append throws every earlier entry away and starts the log over with just
//! the new one. Nothing is archived.
//!
//! Below the limit, appends keep every existing entry as raw JSON, whatever
//! its shape. A file that is not a JSON array at all is left alone and the
//! append fails.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::geo::GeoInfo;
use crate::store::{file_len, load_or_default, read_json, write_json};
use crate::user_agent::UserAgent;

// Only these request headers are kept in a log entry
pub const ESSENTIAL_HEADERS: [&str; 4] = ["host", "referer", "content-type", "accept"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub ip: Option<String>,
    pub user_agent: Option<UserAgent>,
    pub geo: Option<GeoInfo>,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub endpoint: String,
    #[serde(default)]
    pub body: serde_json::Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

pub fn essential_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut kept = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str().to_ascii_lowercase();
        if !ESSENTIAL_HEADERS.contains(&name.as_str()) {
            continue;
        }
        let Ok(value) = value.to_str() else { continue };
        kept.entry(name)
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    kept
}

pub struct RequestLogStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RequestLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `entry`, wiping the log first if the file is over `max_size`
    /// bytes.
    pub fn append(&self, entry: LogEntry, max_size: u64) -> Result<(), StoreError> {
        let _guard = self.lock.lock();

        let oversize = match file_len(&self.path) {
            Ok(len) if len > max_size => {
                warn!(
                    path = %self.path.display(),
                    size = len,
                    max_size,
                    "request log over size limit, clearing it"
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "could not stat request log");
                false
            }
        };

        let mut entries: Vec<serde_json::Value> = if oversize {
            Vec::new()
        } else {
            match read_json(&self.path) {
                Ok(entries) => entries,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e),
            }
        };

        let entry = serde_json::to_value(&entry).map_err(|source| StoreError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        entries.push(entry);
        write_json(&self.path, &entries)
    }

    /// Every entry that decodes as a [`LogEntry`], in order. A missing or
    /// corrupt log reads as empty.
    pub fn load_all(&self) -> Vec<LogEntry> {
        let raw: Vec<serde_json::Value> = load_or_default(&self.path, "request log");
        let total = raw.len();
        let entries: Vec<LogEntry> = raw
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        if entries.len() < total {
            debug!(skipped = total - entries.len(), "request log entries in unknown shape");
        }
        entries
    }
}
