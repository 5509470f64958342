//! Client for the proxy core's external-controller API.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use super::CoreError;

/// Selector state as reported by `GET /proxies/<group>`.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupState {
    pub now: String,
    #[serde(default)]
    pub all: Vec<String>,
}

/// Switches the active member of the selector group. Does not retry and
/// does not wait for the switch to take effect.
#[derive(Debug, Clone)]
pub struct ControlClient {
    base: String,
    group: String,
    http: reqwest::Client,
}

impl ControlClient {
    pub fn new(api_port: u16, group: &str, timeout: Duration) -> Result<Self, CoreError> {
        Self::with_base(&format!("http://127.0.0.1:{}", api_port), group, timeout)
    }

    pub fn with_base(base: &str, group: &str, timeout: Duration) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Control {
                stage: "build client",
                source: e,
            })?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            group: group.to_string(),
            http,
        })
    }

    fn group_url(&self) -> String {
        format!("{}/proxies/{}", self.base, self.group)
    }

    /// Make `route` the sole selected member. Only `204 No Content` counts
    /// as success.
    pub async fn switch_to(&self, route: &str) -> Result<(), CoreError> {
        let resp = self
            .http
            .put(self.group_url())
            .json(&serde_json::json!({ "name": route }))
            .send()
            .await
            .map_err(|e| CoreError::SwitchFailed {
                route: route.to_string(),
                status: None,
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(CoreError::SwitchFailed {
            route: route.to_string(),
            status: Some(status.as_u16()),
            detail: body.trim().to_string(),
        })
    }

    /// Query the selector group.
    pub async fn group_state(&self) -> Result<GroupState, CoreError> {
        let resp = self
            .http
            .get(self.group_url())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::Control {
                stage: "query group",
                source: e,
            })?;
        resp.json::<GroupState>().await.map_err(|e| CoreError::Control {
            stage: "decode group",
            source: e,
        })
    }
}
