use serde::{Deserialize, Serialize};

// Decoded User-Agent header; also reads entries written as {full, name, version, os}
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAgent {
    #[serde(alias = "full")]
    pub source: String,
    #[serde(alias = "name")]
    pub browser: Option<String>,
    pub version: Option<String>,
    pub os: Option<String>,
}

pub trait UserAgentDecoder: Send + Sync {
    fn decode(&self, raw: &str) -> UserAgent;
}

// Product tokens checked in order; Chrome UAs also carry "Safari", Edge and Opera carry "Chrome"
const BROWSERS: [(&str, &str); 8] = [
    ("Edg/", "Edge"),
    ("OPR/", "Opera"),
    ("Firefox/", "Firefox"),
    ("Chrome/", "Chrome"),
    ("Version/", "Safari"),
    ("curl/", "curl"),
    ("Wget/", "Wget"),
    ("PostmanRuntime/", "Postman"),
];

const SYSTEMS: [(&str, &str); 7] = [
    ("Windows", "Windows"),
    ("iPhone", "iOS"),
    ("iPad", "iOS"),
    ("Android", "Android"),
    ("Mac OS X", "macOS"),
    ("CrOS", "ChromeOS"),
    ("Linux", "Linux"),
];

/// Token-scanning decoder for the common desktop, mobile and CLI agents.
pub struct BasicUserAgentDecoder;

impl UserAgentDecoder for BasicUserAgentDecoder {
    fn decode(&self, raw: &str) -> UserAgent {
        let (browser, version) = BROWSERS
            .iter()
            .find_map(|(token, name)| {
                let start = raw.find(token)? + token.len();
                let version: String = raw[start..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '.')
                    .collect();
                Some((Some(name.to_string()), (!version.is_empty()).then_some(version)))
            })
            .unwrap_or((None, None));

        let os = SYSTEMS
            .iter()
            .find(|(token, _)| raw.contains(token))
            .map(|(_, name)| name.to_string());

        UserAgent {
            source: raw.to_string(),
            browser,
            version,
            os,
        }
    }
}
