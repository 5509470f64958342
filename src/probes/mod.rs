//! Probe battery: seven service checks sent through a worker's proxy port.
//!
//! API-style services get a bounded retry loop; streaming services get one
//! attempt. Every check is independent, and none of them can fail the route.

pub mod ai;
pub mod geo;
pub mod streaming;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ProbeConfig;
use crate::models::{ApiService, NodeTestResult, ServiceTest, StreamService, StreamTest};
use crate::source::Route;

pub(crate) const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub(crate) const MAC_UA: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("blocked ({status})")]
    Blocked { status: u16 },

    #[error("region blocked ({status})")]
    RegionBlocked { status: u16 },

    #[error("unsupported region: {0}")]
    UnsupportedRegion(&'static str),

    #[error("unexpected status: {0}")]
    UnexpectedStatus(u16),

    #[error("{0} not found")]
    MarkerNotFound(&'static str),

    /// No catalog tier was playable. Carries any region a page still reported.
    #[error("blocked (no catalog asset reachable)")]
    Unavailable { region: Option<String> },

    #[error("failed to build probe client: {0}")]
    Client(String),
}

/// Target URLs of every check. Overridable from the tuning file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub openai_trace: String,
    pub gemini_app: String,
    pub claude_login: String,
    pub netflix_full: String,
    pub netflix_originals: String,
    pub disney_home: String,
    pub youtube_home: String,
    pub max_home: String,
    pub geo_ip: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openai_trace: "https://chatgpt.com/cdn-cgi/trace".to_string(),
            gemini_app: "https://gemini.google.com/app".to_string(),
            claude_login: "https://claude.ai/login".to_string(),
            // Breaking Bad: licensed, only visible with the full catalog.
            netflix_full: "https://www.netflix.com/title/70143836".to_string(),
            // Squid Game: an original, visible in every supported region.
            netflix_originals: "https://www.netflix.com/title/81243996".to_string(),
            disney_home: "https://www.disneyplus.com/".to_string(),
            youtube_home: "https://www.youtube.com/".to_string(),
            max_home: "https://www.max.com/".to_string(),
            geo_ip: "http://ip-api.com/json/?fields=countryCode".to_string(),
        }
    }
}

/// Retry policy for API-style services.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl From<&ProbeConfig> for RetryPolicy {
    fn from(cfg: &ProbeConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            delay: Duration::from_millis(cfg.retry_delay_ms),
        }
    }
}

/// What a successful check learned.
#[derive(Debug, Default)]
pub(crate) struct Found {
    pub region: Option<String>,
    pub detail: Option<String>,
}

impl Found {
    pub fn in_region(region: Option<String>) -> Self {
        Self {
            region,
            detail: None,
        }
    }
}

/// Runs the battery for one worker. Built once; each route gets a fresh
/// [`ProbeSession`] so no pooled connection outlives a route switch.
#[derive(Debug, Clone)]
pub struct ProbeBattery {
    proxy: Option<String>,
    endpoints: Arc<Endpoints>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ProbeBattery {
    /// Fails only if no client can be built for `proxy`.
    pub fn new(
        proxy: Option<String>,
        endpoints: Arc<Endpoints>,
        cfg: &ProbeConfig,
    ) -> Result<Self, ProbeError> {
        let battery = Self {
            proxy,
            endpoints,
            retry: RetryPolicy::from(cfg),
            timeout: Duration::from_secs(cfg.timeout_secs),
        };
        battery.session()?;
        Ok(battery)
    }

    pub fn session(&self) -> Result<ProbeSession, ProbeError> {
        Ok(ProbeSession {
            client: self.client(Policy::default())?,
            no_redirect: self.client(Policy::none())?,
            endpoints: self.endpoints.clone(),
            retry: self.retry,
        })
    }

    fn client(&self, redirect: Policy) -> Result<reqwest::Client, ProbeError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(redirect)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30));
        builder = match &self.proxy {
            Some(url) => {
                let proxy =
                    reqwest::Proxy::all(url).map_err(|e| ProbeError::Client(e.to_string()))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };
        builder.build().map_err(|e| ProbeError::Client(e.to_string()))
    }

    /// Probe all seven services for the route currently selected on the
    /// worker's core.
    pub async fn run(&self, route: &Route) -> NodeTestResult {
        let start = Instant::now();

        let (tests, stream_tests) = match self.session() {
            Ok(session) => session.run_all().await,
            Err(e) => {
                warn!(route = %route.name, error = %e, "probe session unavailable");
                failed_maps(&e)
            }
        };

        NodeTestResult {
            node_name: route.name.clone(),
            node_type: route.kind.to_string(),
            server: route.server.clone(),
            tests,
            stream_tests,
            total_time_ms: elapsed_ms(start),
        }
    }
}

type ResultMaps = (
    BTreeMap<ApiService, ServiceTest>,
    BTreeMap<StreamService, StreamTest>,
);

fn failed_maps(err: &ProbeError) -> ResultMaps {
    let tests = ApiService::ALL
        .iter()
        .map(|s| {
            let mut t = ServiceTest::new(*s);
            t.attempts = 1;
            t.error = Some(err.to_string());
            (*s, t)
        })
        .collect();
    let stream_tests = StreamService::ALL
        .iter()
        .map(|s| {
            let mut t = StreamTest::new(*s);
            t.error = Some(err.to_string());
            (*s, t)
        })
        .collect();
    (tests, stream_tests)
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// HTTP clients bound to one route. `no_redirect` serves the checks that
/// inspect a redirect target instead of following it.
pub struct ProbeSession {
    pub(crate) client: reqwest::Client,
    pub(crate) no_redirect: reqwest::Client,
    pub(crate) endpoints: Arc<Endpoints>,
    retry: RetryPolicy,
}

impl ProbeSession {
    async fn run_all(&self) -> ResultMaps {
        let mut tests = BTreeMap::new();
        for service in ApiService::ALL {
            tests.insert(service, self.probe_api(service).await);
        }

        let mut stream_tests = BTreeMap::new();
        for service in StreamService::ALL {
            stream_tests.insert(service, self.probe_stream(service).await);
        }

        (tests, stream_tests)
    }

    /// Run an API-style check with up to `max_retries + 1` attempts.
    ///
    /// On eventual success the last pre-success error is kept in `error`.
    pub async fn probe_api(&self, service: ApiService) -> ServiceTest {
        let mut result = ServiceTest::new(service);
        let total = self.retry.max_retries.saturating_add(1);

        for attempt in 1..=total {
            result.attempts = attempt;

            let mut status = None;
            let start = Instant::now();
            let outcome = self.check_api(service, &mut status).await;
            result.response_time_ms = elapsed_ms(start);
            result.status_code = status;

            match outcome {
                Ok(found) => {
                    result.available = true;
                    result.country = found.region;
                    return result;
                }
                Err(e) => {
                    debug!(service = service.key(), attempt, error = %e, "check failed");
                    result.error = Some(e.to_string());
                    if attempt < total {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        result
    }

    /// Run a streaming check once.
    pub async fn probe_stream(&self, service: StreamService) -> StreamTest {
        let mut result = StreamTest::new(service);

        let start = Instant::now();
        let outcome = self.check_stream(service).await;
        result.response_time_ms = elapsed_ms(start);

        match outcome {
            Ok(found) => {
                result.available = true;
                result.region = found.region;
                result.details = found.detail;
            }
            Err(e) => {
                debug!(service = service.key(), error = %e, "stream check failed");
                result.error = Some(e.to_string());
                if let ProbeError::Unavailable { region } = e {
                    result.region = region;
                }
            }
        }

        result
    }

    async fn check_api(
        &self,
        service: ApiService,
        status: &mut Option<u16>,
    ) -> Result<Found, ProbeError> {
        match service {
            ApiService::OpenAi => self.check_openai(status).await,
            ApiService::Gemini => self.check_gemini(status).await,
            ApiService::Claude => self.check_claude(status).await,
        }
    }

    async fn check_stream(&self, service: StreamService) -> Result<Found, ProbeError> {
        match service {
            StreamService::Netflix => self.check_netflix().await,
            StreamService::Disney => self.check_disney().await,
            StreamService::Youtube => self.check_youtube().await,
            StreamService::Max => self.check_max().await,
        }
    }
}
