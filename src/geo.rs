use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use crate::error::StoreError;
use crate::store::read_json;

// Location metadata attached to logged requests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub ll: Option<[f64; 2]>,
}

/// Best-effort address -> location lookup. `None` when nothing is known.
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, addr: &str) -> Option<GeoInfo>;
}

pub struct NoGeoLookup;

impl GeoLookup for NoGeoLookup {
    fn lookup(&self, _addr: &str) -> Option<GeoInfo> {
        None
    }
}

/// Exact-address table, loaded from a JSON object of `address -> GeoInfo`.
#[derive(Debug, Default)]
pub struct StaticGeoLookup {
    table: HashMap<String, GeoInfo>,
}

impl StaticGeoLookup {
    pub fn new(table: HashMap<String, GeoInfo>) -> Self {
        Self { table }
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(read_json(path)?))
    }
}

impl GeoLookup for StaticGeoLookup {
    fn lookup(&self, addr: &str) -> Option<GeoInfo> {
        if is_local(addr) {
            return None;
        }
        self.table.get(addr).cloned()
    }
}

// Loopback, private and link-local ranges carry no location
fn is_local(addr: &str) -> bool {
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => {
            v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00 || v6.is_unicast_link_local()
        }
        Err(_) => false,
    }
}
