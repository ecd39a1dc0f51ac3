use serde::{Deserialize, Serialize};

// One logging rule: method ("*" for any) and path pattern with at most one '*'
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRule {
    pub method: String,
    pub endpoint: String,
}

impl EndpointRule {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn matches(&self, method: &str, path: &str) -> bool {
        (self.method == "*" || self.method == method) && pattern_matches(&self.endpoint, path)
    }
}

/// True if any rule accepts the request. No rules means nothing is logged.
pub fn matches(method: &str, path: &str, rules: &[EndpointRule]) -> bool {
    rules.iter().any(|rule| rule.matches(method, path))
}

// Whole-path match; a single '*' stands for any (possibly empty) run of characters
fn pattern_matches(pattern: &str, path: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == path,
        Some((prefix, suffix)) => {
            path.len() >= prefix.len() + suffix.len()
                && path.starts_with(prefix)
                && path.ends_with(suffix)
        }
    }
}
