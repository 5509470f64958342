//! Route records and the subscription parser that produces them.

pub mod loader;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use loader::load;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read route source {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch route source {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("route source {url} answered with status {status}")]
    FetchStatus { url: String, status: u16 },

    #[error("route source is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Protocols the proxy core is asked to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Hysteria2,
    Trojan,
    Vless,
    Ss,
    Vmess,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Hysteria2,
        Protocol::Trojan,
        Protocol::Vless,
        Protocol::Ss,
        Protocol::Vmess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Hysteria2 => "hysteria2",
            Protocol::Trojan => "trojan",
            Protocol::Vless => "vless",
            Protocol::Ss => "ss",
            Protocol::Vmess => "vmess",
        }
    }

    pub fn from_type(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == kind)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate upstream. Fields the tester does not understand are kept
/// in `extra` and written back verbatim into the proxy-core config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Protocol,
    pub server: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher: Option<String>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

#[derive(Deserialize)]
struct Subscription {
    #[serde(default)]
    proxies: Vec<serde_yaml::Value>,
}

/// Parse a Clash-style YAML document and keep the supported routes, in
/// input order, with unique names.
pub fn parse(data: &[u8]) -> Result<Vec<Route>, SourceError> {
    let doc: Subscription = serde_yaml::from_slice(data)?;

    let mut seen = HashSet::new();
    let mut routes = Vec::with_capacity(doc.proxies.len());

    for entry in doc.proxies {
        let kind = entry.get("type").and_then(|v| v.as_str()).unwrap_or_default();
        if Protocol::from_type(kind).is_none() {
            debug!(kind, "skipping unsupported route type");
            continue;
        }

        let route: Route = match serde_yaml::from_value(entry) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "skipping malformed route entry");
                continue;
            }
        };

        if !seen.insert(route.name.clone()) {
            warn!(route = %route.name, "duplicate route name, keeping the first");
            continue;
        }
        routes.push(route);
    }

    Ok(routes)
}
